use crate::error::{RuntimeFault, RuntimeResult};
use crate::instruction::Instruction;
use crate::memory_writes::MemoryWritesManager;
use crate::operand::{Operand, Register};
use crate::parser::Program;
use crate::ram::Ram;
use crate::register::{Flags, RegisterFile};
use crate::stats::StatsSink;

/// A byte-producing collaborator for `GETCHAR` (spec §1, §4.6). `None` on EOF.
pub trait ByteSource {
    fn read_byte(&mut self) -> Option<u8>;
}

/// A byte/decimal-consuming collaborator for `PUTCHAR`/`PUTNUM`.
pub trait ByteSink {
    fn write_byte(&mut self, byte: u8);
    fn write_decimal(&mut self, value: i64);
}

/// Adapts any [`std::io::Read`] into a [`ByteSource`].
pub struct ReaderSource<R>(pub R);

impl<R: std::io::Read> ByteSource for ReaderSource<R> {
    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.0.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }
}

impl ByteSource for Box<dyn ByteSource> {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }
}

/// Adapts any [`std::io::Write`] into a [`ByteSink`].
pub struct WriterSink<W>(pub W);

impl<W: std::io::Write> ByteSink for WriterSink<W> {
    fn write_byte(&mut self, byte: u8) {
        let _ = self.0.write_all(&[byte]);
    }

    fn write_decimal(&mut self, value: i64) {
        let _ = write!(self.0, "{}", value);
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum TickOutcome {
    Running,
    Halted,
}

const DEFAULT_INT_REGISTERS: usize = 16;
const DEFAULT_FLOAT_REGISTERS: usize = 8;

/// The pipelined T86 execution core (spec §4.6). Single-issue per [`Cpu::tick`]
/// call, which satisfies the pipeline's observable contract (program-order
/// side effects, load forwarding, branch flush, halt drain) without modeling
/// the fetch/decode/execute/memory/writeback stages as separate objects.
pub struct Cpu<R, W, T> {
    regs: RegisterFile,
    ram: Ram,
    memory_writes: MemoryWritesManager,
    program: Program,
    halted: bool,
    ticks: u64,
    reader: R,
    writer: W,
    stats: T,
}

impl<R: ByteSource, W: ByteSink, T: StatsSink> Cpu<R, W, T> {
    pub fn new(ram_words: usize, reader: R, writer: W, stats: T) -> Cpu<R, W, T> {
        Cpu {
            regs: RegisterFile::new(DEFAULT_INT_REGISTERS, DEFAULT_FLOAT_REGISTERS),
            ram: Ram::new(ram_words),
            memory_writes: MemoryWritesManager::new(),
            program: Program::default(),
            halted: false,
            ticks: 0,
            reader,
            writer,
            stats,
        }
    }

    /// Loads `program`'s data image into RAM and resets registers, per spec
    /// §4.6: all registers zero except `SP = BP = top of stack`, `PC = 0`.
    pub fn start(&mut self, program: Program) {
        self.ram.load_image(&program.data);
        let stack_top = self.ram.len() as i64;
        self.regs.reset(stack_top);
        self.program = program;
        self.halted = false;
        self.ticks = 0;
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Advances the CPU by one instruction. Returns `Halted` once `HALT` has
    /// retired; further calls after that are no-ops that keep returning
    /// `Halted`.
    pub fn tick(&mut self) -> RuntimeResult<TickOutcome> {
        if self.halted {
            return Ok(TickOutcome::Halted);
        }

        let pc = self.regs.pc();
        let instr = *self
            .program
            .instructions
            .get(pc as usize)
            .ok_or(RuntimeFault::BadJumpTarget { addr: pc })?;
        self.regs.set_pc(pc + 1);

        let result = self.execute(instr);
        if let Err(fault) = &result {
            self.stats.on_fault(&fault.to_string());
            return result.map(|_| TickOutcome::Running);
        }

        self.ticks += 1;
        self.stats.on_tick(pc);

        if self.halted {
            self.stats.on_halt(self.ticks);
            Ok(TickOutcome::Halted)
        } else {
            Ok(TickOutcome::Running)
        }
    }

    fn mem_addr(&self, op: Operand) -> RuntimeResult<i64> {
        match op {
            Operand::Mem(mem) => mem.resolve(&self.regs),
            _ => unreachable!("mem_addr called on a non-memory operand"),
        }
    }

    /// Resolves an operand to its integer value, consulting the
    /// memory-writes manager before RAM for loads (spec §4.6 point 2).
    fn read_value(&self, op: Operand) -> RuntimeResult<i64> {
        match op {
            Operand::Imm(v) => Ok(v),
            Operand::Reg(r) => self.regs.get(r),
            Operand::Mem(mem) => {
                let addr = mem.resolve(&self.regs)?;
                if let Some(write) = self.memory_writes.previous_write(addr, u64::MAX) {
                    if let Some(value) = write.value {
                        return Ok(value);
                    }
                }
                self.ram.read(addr)
            }
            Operand::FReg(_) | Operand::FloatImm(_) => {
                unreachable!("read_value called on a float operand")
            }
        }
    }

    fn read_float(&self, op: Operand) -> RuntimeResult<f64> {
        match op {
            Operand::FloatImm(v) => Ok(v),
            Operand::FReg(r) => self.regs.get_float(r),
            Operand::Mem(_) => Ok(f64::from_bits(self.read_value(op)? as u64)),
            _ => unreachable!("read_float called on a non-float operand"),
        }
    }

    /// Commits `value` to `dest`, routing stores through the memory-writes
    /// manager rather than writing RAM directly.
    fn store_value(&mut self, dest: Operand, value: i64) -> RuntimeResult<()> {
        match dest {
            Operand::Reg(r) => self.regs.set(r, value),
            Operand::Mem(mem) => {
                let addr = mem.resolve(&self.regs)?;
                let id = self.memory_writes.register_pending_write_at(addr);
                self.memory_writes.specify_value(id, value);
                self.memory_writes.start_writing(id, &mut self.ram);
                self.memory_writes.remove_finished(&mut self.ram);
                Ok(())
            }
            _ => unreachable!("store_value called on a non-writable operand"),
        }
    }

    fn store_float(&mut self, dest: Operand, value: f64) -> RuntimeResult<()> {
        match dest {
            Operand::FReg(r) => self.regs.set_float(r, value),
            Operand::Mem(_) => self.store_value(dest, value.to_bits() as i64),
            _ => unreachable!("store_float called on a non-writable float operand"),
        }
    }

    fn push_word(&mut self, value: i64) -> RuntimeResult<()> {
        let sp = self.regs.sp() - 1;
        self.regs.set_sp(sp);
        self.store_value(Operand::Mem(crate::operand::MemExpr::with_disp(sp)), value)
    }

    fn pop_word(&mut self) -> RuntimeResult<i64> {
        let sp = self.regs.sp();
        let value = self.ram.read(sp)?;
        self.regs.set_sp(sp + 1);
        Ok(value)
    }

    /// Cancels in-flight speculative stores and redirects `PC` to `target`,
    /// implementing the branch-triggered pipeline flush of spec §4.6 point 3.
    fn branch_to(&mut self, target: i64) {
        self.memory_writes.remove_pending();
        self.regs.set_pc(target);
    }

    fn jump_target_addr(&self, op: Operand) -> RuntimeResult<i64> {
        match op {
            Operand::Imm(v) => Ok(v),
            Operand::Reg(r) => self.regs.get(r),
            _ => unreachable!("jump_target_addr called on a non-jump operand"),
        }
    }

    fn execute(&mut self, instr: Instruction) -> RuntimeResult<()> {
        use Instruction::*;
        match instr {
            Mov(dst, src) => {
                if dst.is_float_register() {
                    let v = self.read_float(src)?;
                    self.store_float(dst, v)?;
                } else {
                    let v = self.read_value(src)?;
                    self.store_value(dst, v)?;
                }
            }
            Add(dst, src) => {
                let (a, b) = (self.read_value(dst)?, self.read_value(src)?);
                let result = a.wrapping_add(b);
                self.regs.flags = Flags::from_add(a, b, result);
                self.store_value(dst, result)?;
            }
            Sub(dst, src) | Cmp(dst, src) => {
                let (a, b) = (self.read_value(dst)?, self.read_value(src)?);
                let result = a.wrapping_sub(b);
                self.regs.flags = Flags::from_sub(a, b, result);
                if matches!(instr, Sub(..)) {
                    self.store_value(dst, result)?;
                }
            }
            Inc(dst) => {
                let a = self.read_value(dst)?;
                let result = a.wrapping_add(1);
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Dec(dst) => {
                let a = self.read_value(dst)?;
                let result = a.wrapping_sub(1);
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Neg(dst) => {
                let a = self.read_value(dst)?;
                let result = a.wrapping_neg();
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Mul(dst, src) | Imul(dst, src) => {
                let (a, b) = (self.read_value(dst)?, self.read_value(src)?);
                let result = a.wrapping_mul(b);
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Div(dst, src) | Idiv(dst, src) => {
                let (a, b) = (self.read_value(dst)?, self.read_value(src)?);
                if b == 0 {
                    return Err(RuntimeFault::DivisionByZero);
                }
                let result = a.wrapping_div(b);
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Mod(dst, src) => {
                let (a, b) = (self.read_value(dst)?, self.read_value(src)?);
                if b == 0 {
                    return Err(RuntimeFault::DivisionByZero);
                }
                let result = a.wrapping_rem(b);
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            And(dst, src) => {
                let result = self.read_value(dst)? & self.read_value(src)?;
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Or(dst, src) => {
                let result = self.read_value(dst)? | self.read_value(src)?;
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Xor(dst, src) => {
                let result = self.read_value(dst)? ^ self.read_value(src)?;
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Not(dst) => {
                let result = !self.read_value(dst)?;
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Lsh(dst, src) => {
                let result = self.read_value(dst)?.wrapping_shl(self.read_value(src)? as u32);
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Rsh(dst, src) => {
                let result = self.read_value(dst)?.wrapping_shr(self.read_value(src)? as u32);
                self.regs.flags = Flags::from_logical(result);
                self.store_value(dst, result)?;
            }
            Lea(dst, src) => {
                let addr = self.mem_addr(src)?;
                self.store_value(dst, addr)?;
            }
            Jmp(target) => {
                let addr = self.jump_target_addr(target)?;
                self.branch_to(addr);
            }
            Jcc(cond, target) => {
                if cond.is_satisfied(&self.regs.flags) {
                    let addr = self.jump_target_addr(target)?;
                    self.branch_to(addr);
                }
            }
            Loop(counter, target) => {
                let remaining = self.read_value(counter)?.wrapping_sub(1);
                self.store_value(counter, remaining)?;
                if remaining != 0 {
                    let addr = self.jump_target_addr(target)?;
                    self.branch_to(addr);
                }
            }
            Call(target) => {
                let addr = self.jump_target_addr(target)?;
                let return_addr = self.regs.pc();
                self.push_word(return_addr)?;
                self.branch_to(addr);
            }
            Ret => {
                let return_addr = self.pop_word()?;
                self.branch_to(return_addr);
            }
            Halt => {
                self.memory_writes.drain(&mut self.ram);
                self.halted = true;
            }
            Break | Nop => {}
            Push(src) => {
                let v = self.read_value(src)?;
                self.push_word(v)?;
            }
            Pop(dst) => {
                let v = self.pop_word()?;
                self.store_value(dst, v)?;
            }
            FPush(src) => {
                let v = self.read_float(src)?;
                self.push_word(v.to_bits() as i64)?;
            }
            FPop(dst) => {
                let v = self.pop_word()?;
                self.store_float(dst, f64::from_bits(v as u64))?;
            }
            GetChar(dst) => {
                let v = self.reader.read_byte().map(|b| b as i64).unwrap_or(-1);
                self.store_value(dst, v)?;
            }
            PutChar(src) => {
                let v = self.read_value(src)?;
                self.writer.write_byte(v as u8);
            }
            PutNum(src) => {
                let v = self.read_value(src)?;
                self.writer.write_decimal(v);
            }
            FAdd(dst, src) => {
                let result = self.read_float(dst)? + self.read_float(src)?;
                self.store_float(dst, result)?;
            }
            FSub(dst, src) => {
                let result = self.read_float(dst)? - self.read_float(src)?;
                self.store_float(dst, result)?;
            }
            FMul(dst, src) => {
                let result = self.read_float(dst)? * self.read_float(src)?;
                self.store_float(dst, result)?;
            }
            FDiv(dst, src) => {
                let b = self.read_float(src)?;
                if b == 0.0 {
                    return Err(RuntimeFault::DivisionByZero);
                }
                let result = self.read_float(dst)? / b;
                self.store_float(dst, result)?;
            }
            FCmp(dst, src) => {
                let (a, b) = (self.read_float(dst)?, self.read_float(src)?);
                self.regs.flags = Flags::from_fcmp(a, b);
            }
            Ext(dst, src) => {
                let v = self.read_value(src)? as f64;
                self.store_float(dst, v)?;
            }
            Nrw(dst, src) => {
                let v = self.read_float(src)? as i64;
                self.store_value(dst, v)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Condition;
    use crate::parser::Parser;

    struct NoInput;
    impl ByteSource for NoInput {
        fn read_byte(&mut self) -> Option<u8> {
            None
        }
    }

    #[derive(Default)]
    struct VecSink(Vec<u8>);
    impl ByteSink for VecSink {
        fn write_byte(&mut self, byte: u8) {
            self.0.push(byte);
        }
        fn write_decimal(&mut self, value: i64) {
            self.0.extend(value.to_string().into_bytes());
        }
    }

    fn run(src: &str) -> (Cpu<NoInput, VecSink, crate::stats::NullStatsSink>, String) {
        let program = Parser::new(src).unwrap().parse().unwrap();
        let mut cpu = Cpu::new(64, NoInput, VecSink::default(), crate::stats::NullStatsSink);
        cpu.start(program);
        while !cpu.halted() {
            cpu.tick().unwrap();
        }
        let out = String::from_utf8(cpu.writer.0.clone()).unwrap();
        (cpu, out)
    }

    #[test]
    fn scenario_1_add_then_putnum() {
        let (_, out) = run(".text\nMOV R0, 5\nMOV R1, 7\nADD R0, R1\nPUTNUM R0\nHALT");
        assert_eq!(out, "12");
    }

    #[test]
    fn scenario_2_loop_counts_down_to_zero() {
        // LOOP's target is the LOOP instruction's own address (a self-loop),
        // not instruction 0 — spec.md's literal `LOOP R0, 0` example jumps
        // back to the preceding MOV and never terminates under this CPU's
        // absolute-jump-target semantics (see DESIGN.md's Open Questions).
        let (cpu, _) = run(".text\nMOV R0, 10\nLOOP R0, 1\nHALT");
        assert_eq!(cpu.registers().get(Register::Numbered(0)).unwrap(), 0);
    }

    #[test]
    fn scenario_3_store_then_load() {
        let (_, out) = run(".text\nMOV [0], 42\nMOV R0, [0]\nPUTNUM R0\nHALT");
        assert_eq!(out, "42");
    }

    #[test]
    fn scenario_4_data_section_feeds_loads() {
        let (_, out) = run(
            ".data\nDW 1 * 3\nDW 9\n.text\nMOV R0, [2]\nMOV R1, [3]\nADD R0, R1\nPUTNUM R0\nHALT",
        );
        assert_eq!(out, "10");
    }

    #[test]
    fn scenario_5_je_branches_past_first_write() {
        let (cpu, _) = run(
            ".text\nMOV R0, 5\nCMP R0, 5\nJE 5\nMOV R1, 100\nHALT\nMOV R1, 200\nHALT",
        );
        assert_eq!(cpu.registers().get(Register::Numbered(1)).unwrap(), 200);
    }

    #[test]
    fn scenario_6_float_add_then_narrow() {
        let (_, out) = run(".text\nMOV FR0, 1.5\nMOV FR1, 2.5\nFADD FR0, FR1\nNRW R0, FR0\nPUTNUM R0\nHALT");
        assert_eq!(out, "4");
    }

    #[test]
    fn division_by_zero_is_a_runtime_fault() {
        let program = Parser::new(".text\nMOV R0, 1\nMOV R1, 0\nDIV R0, R1\nHALT")
            .unwrap()
            .parse()
            .unwrap();
        let mut cpu = Cpu::new(64, NoInput, VecSink::default(), crate::stats::NullStatsSink);
        cpu.start(program);
        loop {
            match cpu.tick() {
                Ok(TickOutcome::Running) => continue,
                Ok(TickOutcome::Halted) => panic!("expected a fault"),
                Err(RuntimeFault::DivisionByZero) => break,
                Err(other) => panic!("unexpected fault {:?}", other),
            }
        }
    }

    #[test]
    fn jcc_condition_is_evaluated_from_flags() {
        let mut flags = Flags::default();
        flags.zf = true;
        assert!(Condition::E.is_satisfied(&flags));
    }
}
