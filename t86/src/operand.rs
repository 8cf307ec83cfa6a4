use crate::error::{ParseError, ParseResult, RuntimeResult};
use crate::lexer::SourceLoc;
use crate::register::RegisterFile;

/// A T86 integer register reference: a numbered general-purpose register, or one
/// of the three dedicated registers (stack pointer, base pointer, program counter).
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Register {
    Numbered(u32),
    Sp,
    Bp,
    Ip,
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Register::Numbered(n) => write!(f, "R{}", n),
            Register::Sp => write!(f, "SP"),
            Register::Bp => write!(f, "BP"),
            Register::Ip => write!(f, "IP"),
        }
    }
}

/// `[base + index*scale + disp]`. At most one base and one index register;
/// `scale` defaults to 1 and `disp` to 0 when omitted.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct MemExpr {
    pub base: Option<Register>,
    pub index: Option<Register>,
    pub scale: i64,
    pub disp: i64,
}

impl MemExpr {
    pub fn new() -> MemExpr {
        MemExpr {
            base: None,
            index: None,
            scale: 1,
            disp: 0,
        }
    }

    pub fn with_disp(disp: i64) -> MemExpr {
        MemExpr {
            disp,
            ..MemExpr::new()
        }
    }

    pub fn with_base(base: Register) -> MemExpr {
        MemExpr {
            base: Some(base),
            ..MemExpr::new()
        }
    }

    /// Adds `reg` as the base register. Fails if a base is already present
    /// (`R1 + R2 + R3` has no normalized `MemExpr` form).
    pub fn plus_base(mut self, reg: Register, loc: SourceLoc) -> ParseResult<MemExpr> {
        if self.base.is_some() {
            return Err(ParseError::new(
                loc,
                "memory expression can only have one base register",
            ));
        }
        self.base = Some(reg);
        Ok(self)
    }

    /// Adds `reg` as the index register with the given scale. Fails if an index
    /// is already present.
    pub fn plus_index(mut self, reg: Register, scale: i64, loc: SourceLoc) -> ParseResult<MemExpr> {
        if self.index.is_some() {
            return Err(ParseError::new(
                loc,
                "memory expression can only have one index register",
            ));
        }
        self.index = Some(reg);
        self.scale = scale;
        Ok(self)
    }

    pub fn plus_disp(mut self, disp: i64) -> MemExpr {
        self.disp += disp;
        self
    }

    /// Computes the effective address given the current register file contents.
    pub fn resolve(&self, regs: &RegisterFile) -> RuntimeResult<i64> {
        let mut addr = self.disp;
        if let Some(base) = self.base {
            addr += regs.get(base)?;
        }
        if let Some(index) = self.index {
            addr += regs.get(index)? * self.scale;
        }
        Ok(addr)
    }
}

/// A single operand: an immediate, a register (integer or float), or a memory
/// dereference expression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    Imm(i64),
    FloatImm(f64),
    Reg(Register),
    FReg(u32),
    Mem(MemExpr),
}

impl Operand {
    pub fn is_register(&self) -> bool {
        matches!(self, Operand::Reg(_))
    }

    pub fn is_float_register(&self) -> bool {
        matches!(self, Operand::FReg(_))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Operand::Imm(_))
    }

    pub fn is_float_value(&self) -> bool {
        matches!(self, Operand::FloatImm(_))
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Operand::Mem(_))
    }

    pub fn as_register(&self) -> Option<Register> {
        match self {
            Operand::Reg(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_float_register(&self) -> Option<u32> {
        match self {
            Operand::FReg(r) => Some(*r),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Operand::Imm(_) => "Imm",
            Operand::FloatImm(_) => "FloatImm",
            Operand::Reg(_) => "Reg",
            Operand::FReg(_) => "FReg",
            Operand::Mem(_) => "Mem",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_expr_normalizes_reg_plus_reg_times_scale() {
        let loc = SourceLoc::default();
        let expr = MemExpr::with_disp(2)
            .plus_base(Register::Numbered(1), loc)
            .unwrap()
            .plus_index(Register::Numbered(2), 4, loc)
            .unwrap();

        assert_eq!(expr.base, Some(Register::Numbered(1)));
        assert_eq!(expr.index, Some(Register::Numbered(2)));
        assert_eq!(expr.scale, 4);
        assert_eq!(expr.disp, 2);
    }

    #[test]
    fn mem_expr_rejects_second_base() {
        let loc = SourceLoc::default();
        let expr = MemExpr::with_base(Register::Numbered(1));
        assert!(expr.plus_base(Register::Numbered(2), loc).is_err());
    }

    #[test]
    fn mem_expr_rejects_second_index() {
        let loc = SourceLoc::default();
        let expr = MemExpr::new().plus_index(Register::Numbered(1), 1, loc).unwrap();
        assert!(expr.plus_index(Register::Numbered(2), 1, loc).is_err());
    }
}
