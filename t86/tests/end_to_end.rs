//! Whole-pipeline scenarios from the public API only: parse a source string,
//! run it to completion, and check the resulting output/register state.
//! Mirrors the scenario table used to validate the reference implementation.

use t86::{ByteSink, ByteSource, Cpu, NullStatsSink, Parser, Register};

struct NoInput;
impl ByteSource for NoInput {
    fn read_byte(&mut self) -> Option<u8> {
        None
    }
}

struct ScriptedInput(std::vec::IntoIter<u8>);
impl ByteSource for ScriptedInput {
    fn read_byte(&mut self) -> Option<u8> {
        self.0.next()
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

fn run_to_halt(src: &str) -> (Cpu<NoInput, VecSink, NullStatsSink>, String) {
    let program = Parser::new(src).expect("lex").parse().expect("parse");
    let mut cpu = Cpu::new(64, NoInput, VecSink::default(), NullStatsSink);
    cpu.start(program);
    for _ in 0..10_000 {
        if cpu.halted() {
            break;
        }
        cpu.tick().expect("tick");
    }
    assert!(cpu.halted(), "program did not halt");
    let stdout = String::from_utf8(cpu.writer().0.clone()).unwrap();
    (cpu, stdout)
}

#[test]
fn scenario_add_and_print() {
    let (_, out) = run_to_halt(".text\nMOV R0, 5\nMOV R1, 7\nADD R0, R1\nPUTNUM R0\nHALT");
    assert_eq!(out, "12");
}

#[test]
fn scenario_loop_countdown_zeroes_counter() {
    // Target 1 is a self-loop on the LOOP instruction; spec.md's literal
    // `LOOP R0, 0` example targets the preceding MOV instead and never
    // terminates under this CPU's absolute-jump-target semantics (see
    // DESIGN.md's Open Questions).
    let (cpu, _) = run_to_halt(".text\nMOV R0, 10\nLOOP R0, 1\nHALT");
    assert_eq!(cpu.registers().get(Register::Numbered(0)).unwrap(), 0);
}

#[test]
fn scenario_store_then_load_same_address() {
    let (_, out) = run_to_halt(".text\nMOV [0], 42\nMOV R0, [0]\nPUTNUM R0\nHALT");
    assert_eq!(out, "42");
}

#[test]
fn scenario_data_section_repeat_count_feeds_ram() {
    let (_, out) = run_to_halt(
        ".data\nDW 1 * 3\nDW 9\n.text\nMOV R0, [2]\nMOV R1, [3]\nADD R0, R1\nPUTNUM R0\nHALT",
    );
    assert_eq!(out, "10");
}

#[test]
fn scenario_conditional_jump_skips_dead_branch() {
    let (cpu, _) = run_to_halt(
        ".text\nMOV R0, 5\nCMP R0, 5\nJE 5\nMOV R1, 100\nHALT\nMOV R1, 200\nHALT",
    );
    assert_eq!(cpu.registers().get(Register::Numbered(1)).unwrap(), 200);
}

#[test]
fn scenario_float_add_then_narrow_to_int() {
    let (_, out) = run_to_halt(
        ".text\nMOV FR0, 1.5\nMOV FR1, 2.5\nFADD FR0, FR1\nNRW R0, FR0\nPUTNUM R0\nHALT",
    );
    assert_eq!(out, "4");
}

#[test]
fn getchar_reads_from_the_injected_source() {
    let program = Parser::new(".text\nGETCHAR R0\nPUTCHAR R0\nHALT")
        .unwrap()
        .parse()
        .unwrap();
    let mut cpu = Cpu::new(64, ScriptedInput(vec![b'Z'].into_iter()), VecSink::default(), NullStatsSink);
    cpu.start(program);
    while !cpu.halted() {
        cpu.tick().unwrap();
    }
    assert_eq!(cpu.writer().0.as_slice(), b"Z");
}

#[test]
fn getchar_returns_minus_one_at_eof() {
    let program = Parser::new(".text\nGETCHAR R0\nPUTNUM R0\nHALT")
        .unwrap()
        .parse()
        .unwrap();
    let mut cpu = Cpu::new(64, NoInput, VecSink::default(), NullStatsSink);
    cpu.start(program);
    while !cpu.halted() {
        cpu.tick().unwrap();
    }
    assert_eq!(cpu.writer().0.as_slice(), b"-1");
}

#[test]
fn call_and_ret_round_trip_through_the_stack() {
    let (cpu, _) = run_to_halt(
        ".text\nCALL 3\nHALT\nNOP\nMOV R0, 99\nRET",
    );
    assert_eq!(cpu.registers().get(Register::Numbered(0)).unwrap(), 99);
}

#[test]
fn unknown_opcode_is_a_parse_error_not_a_panic() {
    let err = Parser::new(".text\nFROBNICATE R0").unwrap().parse();
    assert!(err.is_err());
}

#[test]
fn oversized_register_index_is_a_runtime_fault_not_a_panic() {
    let program = Parser::new(".text\nMOV R999, 5\nHALT").unwrap().parse().unwrap();
    let mut cpu = Cpu::new(64, NoInput, VecSink::default(), NullStatsSink);
    cpu.start(program);
    loop {
        match cpu.tick() {
            Ok(t86::TickOutcome::Running) => continue,
            Ok(t86::TickOutcome::Halted) => panic!("expected a fault, not a halt"),
            Err(t86::RuntimeFault::BadRegister { id: 999 }) => break,
            Err(other) => panic!("unexpected fault {:?}", other),
        }
    }
}

#[test]
fn out_of_range_jump_is_a_runtime_fault_not_a_panic() {
    let program = Parser::new(".text\nJMP 50\nHALT").unwrap().parse().unwrap();
    let mut cpu = Cpu::new(4, NoInput, VecSink::default(), NullStatsSink);
    cpu.start(program);
    loop {
        match cpu.tick() {
            Ok(t86::TickOutcome::Running) => continue,
            Ok(t86::TickOutcome::Halted) => panic!("expected a fault, not a halt"),
            Err(_) => break,
        }
    }
}
