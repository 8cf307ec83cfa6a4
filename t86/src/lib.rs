//! Lexer, parser, and pipelined execution core for the T86 didactic assembly
//! virtual machine.
//!
//! The library has no I/O or configuration concerns of its own: `cpu` takes
//! its byte source/sink and statistics sink as generic collaborators, and the
//! `t86-cli` binary crate is the only consumer that touches the filesystem,
//! `stdin`/`stdout`, or process exit codes.

pub mod cpu;
pub mod error;
pub mod instruction;
pub mod lexer;
pub mod memory_writes;
pub mod operand;
pub mod parser;
pub mod ram;
pub mod register;
pub mod stats;

pub use cpu::{ByteSink, ByteSource, Cpu, ReaderSource, TickOutcome, WriterSink};
pub use error::{ParseError, ParseResult, RuntimeFault, RuntimeResult};
pub use instruction::{Condition, Instruction};
pub use lexer::{Lexer, SourceLoc, Token};
pub use memory_writes::{MemoryWrite, MemoryWritesManager, WriteId, WriteState};
pub use operand::{MemExpr, Operand, Register};
pub use parser::{Parser, Program};
pub use ram::{Ram, RamWriteId};
pub use register::{Flags, RegisterFile};
pub use stats::{NullStatsSink, StatsSink, TracingStatsSink};
