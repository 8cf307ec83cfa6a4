use std::fmt;

use crate::lexer::SourceLoc;

/// A malformed token, unexpected token, unknown opcode, or invalid operand shape
/// encountered while lexing or parsing. Carries the location it was raised at.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseError {
    pub loc: SourceLoc,
    pub message: String,
}

impl ParseError {
    pub fn new(loc: SourceLoc, message: impl Into<String>) -> ParseError {
        ParseError {
            loc,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]: {}", self.loc, self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// A fault raised while executing a well-formed program: division by zero, an
/// out-of-range memory access, a jump onto an invalid instruction address
/// (the realization of spec §7's "bad opcode reached via jump-to-data" under
/// this AST-typed instruction stream — there is no raw opcode byte to be bad,
/// only a program counter that no longer indexes a real instruction), or a
/// register index past the register file's configured width.
#[derive(thiserror::Error, Clone, Eq, PartialEq, Debug)]
pub enum RuntimeFault {
    #[error("division by zero")]
    DivisionByZero,

    #[error("memory access out of range at address {addr}")]
    BadMemoryAccess { addr: i64 },

    #[error("jump to invalid instruction address {addr}")]
    BadJumpTarget { addr: i64 },

    #[error("register index {id} is out of range")]
    BadRegister { id: u32 },
}

pub type RuntimeResult<T> = Result<T, RuntimeFault>;
