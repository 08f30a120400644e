/*!
## Rust Code Module

This Rust module defines the byte code format: operands, opcodes,
instruction records, the append-only [`ByteCode`] builder, decoding,
disassembly and persistence.

*/

/// Instruction index within one [`ByteCode`].
pub type Address = usize;

#[macro_use]
mod error;
mod bytecode;
mod instruction;
mod listing;
mod op;
mod opcode;
mod operand;
mod persist;

pub use bytecode::ByteCode;
pub use bytecode::Entry;
pub use bytecode::MAX_ALIGNMENT;
pub use error::Error;
pub use error::ErrorCode;
pub use instruction::Instruction;
pub use instruction::InstructionArray;
pub use instruction::Operands;
pub use listing::Listing;
pub use op::{
    BinaryOp, ChangeTypeOp, ComparisonOp, CopyOp, ExecuteOp, JumpIfOp, JumpOp, Op, Record,
    UnaryOp,
};
pub use opcode::Opcode;
pub use opcode::MAX_OPERANDS;
pub use operand::{Element, Layout, MemoryKind, Operand};
pub use persist::FORMAT_VERSION;
