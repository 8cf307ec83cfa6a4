use crate::error::{RuntimeFault, RuntimeResult};
use crate::operand::Register;

/// ZF (zero), SF (sign), CF (carry/unsigned borrow), OF (signed overflow).
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct Flags {
    pub zf: bool,
    pub sf: bool,
    pub cf: bool,
    pub of: bool,
}

impl Flags {
    pub fn from_add(a: i64, b: i64, result: i64) -> Flags {
        let (_, carry) = (a as u64).overflowing_add(b as u64);
        let overflow = ((a ^ result) & (b ^ result)) < 0;
        Flags {
            zf: result == 0,
            sf: result < 0,
            cf: carry,
            of: overflow,
        }
    }

    pub fn from_sub(a: i64, b: i64, result: i64) -> Flags {
        let (_, borrow) = (a as u64).overflowing_sub(b as u64);
        let overflow = ((a ^ b) & (a ^ result)) < 0;
        Flags {
            zf: result == 0,
            sf: result < 0,
            cf: borrow,
            of: overflow,
        }
    }

    pub fn from_logical(result: i64) -> Flags {
        Flags {
            zf: result == 0,
            sf: result < 0,
            cf: false,
            of: false,
        }
    }

    pub fn from_fcmp(a: f64, b: f64) -> Flags {
        if a.is_nan() || b.is_nan() {
            return Flags {
                zf: false,
                sf: false,
                cf: false,
                of: true,
            };
        }
        Flags {
            zf: a == b,
            sf: a < b,
            cf: false,
            of: false,
        }
    }
}

/// The integer registers `R0..Rn`, float registers `FR0..FRm`, `SP`/`BP`/`IP`,
/// and the flags register. Register count is fixed at construction time.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    int_regs: Vec<i64>,
    float_regs: Vec<f64>,
    sp: i64,
    bp: i64,
    ip: i64,
    pub flags: Flags,
}

impl RegisterFile {
    pub fn new(int_count: usize, float_count: usize) -> RegisterFile {
        RegisterFile {
            int_regs: vec![0; int_count],
            float_regs: vec![0.0; float_count],
            sp: 0,
            bp: 0,
            ip: 0,
            flags: Flags::default(),
        }
    }

    /// Reads `reg`. Fails if `reg` is a numbered register past the register
    /// file's configured width (spec §7's register-fault case; a syntactically
    /// valid `MOV R999, ...` must raise a `RuntimeFault`, not panic).
    pub fn get(&self, reg: Register) -> RuntimeResult<i64> {
        match reg {
            Register::Numbered(n) => self
                .int_regs
                .get(n as usize)
                .copied()
                .ok_or(RuntimeFault::BadRegister { id: n }),
            Register::Sp => Ok(self.sp),
            Register::Bp => Ok(self.bp),
            Register::Ip => Ok(self.ip),
        }
    }

    pub fn set(&mut self, reg: Register, value: i64) -> RuntimeResult<()> {
        match reg {
            Register::Numbered(n) => match self.int_regs.get_mut(n as usize) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(RuntimeFault::BadRegister { id: n }),
            },
            Register::Sp => {
                self.sp = value;
                Ok(())
            }
            Register::Bp => {
                self.bp = value;
                Ok(())
            }
            Register::Ip => {
                self.ip = value;
                Ok(())
            }
        }
    }

    pub fn get_float(&self, id: u32) -> RuntimeResult<f64> {
        self.float_regs
            .get(id as usize)
            .copied()
            .ok_or(RuntimeFault::BadRegister { id })
    }

    pub fn set_float(&mut self, id: u32, value: f64) -> RuntimeResult<()> {
        match self.float_regs.get_mut(id as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeFault::BadRegister { id }),
        }
    }

    pub fn pc(&self) -> i64 {
        self.ip
    }

    pub fn set_pc(&mut self, value: i64) {
        self.ip = value;
    }

    pub fn sp(&self) -> i64 {
        self.sp
    }

    pub fn set_sp(&mut self, value: i64) {
        self.sp = value;
    }

    pub fn bp(&self) -> i64 {
        self.bp
    }

    pub fn set_bp(&mut self, value: i64) {
        self.bp = value;
    }

    /// Resets all registers to zero, except `SP`/`BP` which are set to
    /// `stack_top` (spec §4.6: initial `SP = BP = top of stack`).
    pub fn reset(&mut self, stack_top: i64) {
        self.int_regs.iter_mut().for_each(|r| *r = 0);
        self.float_regs.iter_mut().for_each(|r| *r = 0.0);
        self.sp = stack_top;
        self.bp = stack_top;
        self.ip = 0;
        self.flags = Flags::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_sets_stack_registers_to_top() {
        let mut regs = RegisterFile::new(4, 2);
        regs.set(Register::Numbered(0), 99).unwrap();
        regs.reset(1024);
        assert_eq!(regs.get(Register::Numbered(0)).unwrap(), 0);
        assert_eq!(regs.sp(), 1024);
        assert_eq!(regs.bp(), 1024);
        assert_eq!(regs.pc(), 0);
    }

    #[test]
    fn out_of_range_register_is_a_runtime_fault() {
        let regs = RegisterFile::new(4, 2);
        assert!(matches!(
            regs.get(Register::Numbered(4)),
            Err(RuntimeFault::BadRegister { id: 4 })
        ));
    }

    #[test]
    fn add_flags_detect_zero() {
        let flags = Flags::from_add(5, -5, 0);
        assert!(flags.zf);
        assert!(!flags.sf);
    }

    #[test]
    fn fcmp_unordered_sets_overflow_only() {
        let flags = Flags::from_fcmp(f64::NAN, 1.0);
        assert!(!flags.zf);
        assert!(!flags.sf);
        assert!(flags.of);
    }
}
