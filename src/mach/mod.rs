/*!
## Rust Machine Module

This Rust module executes byte code. A [`Program`] is built once from
[`ByteCode`](crate::code::ByteCode) and shared; each [`Runtime`] walks it
against [`Memory`] it owns, calling into a [`FunctionTable`] for `Execute`.

*/

mod config;
mod function;
mod memory;
mod program;
mod runtime;
mod stack;

pub use config::Config;
pub use function::Function;
pub use function::FunctionTable;
pub use memory::Memory;
pub use memory::Registers;
pub use program::Program;
pub use runtime::Event;
pub use runtime::Runtime;
pub use runtime::State;
pub use stack::Stack;
