//! # graphvm
//!
//! A register byte code virtual machine for compiled visual-scripting
//! graphs.
//!
//! A compiler appends instructions to a [`code::ByteCode`], names its
//! entry points and finalizes it. The result can be saved with
//! `to_bytes` and loaded back with `from_bytes`. To run it, build a
//! [`mach::Program`], fill a [`mach::FunctionTable`] with host functions
//! and hand both to a [`mach::Runtime`] together with register memory.
//!
//! ```
//! use graphvm::code::{ByteCode, Layout, MemoryKind};
//! use graphvm::mach::{FunctionTable, Memory, Program, Registers, Runtime};
//! use std::sync::Arc;
//!
//! let mut regs = Registers::new();
//! let counter = regs.add(MemoryKind::Work, Layout::new(1, 8, 1));
//!
//! let mut code = ByteCode::new();
//! code.add_zero_op(counter);
//! code.add_increment_op(counter);
//! code.add_exit_op();
//! code.add_entry("main", 0);
//!
//! let program = Arc::new(Program::new(code).unwrap());
//! let functions = Arc::new(FunctionTable::with_builtins());
//! let mut runtime = Runtime::new(program, functions, regs);
//! runtime.run("main").unwrap();
//! assert_eq!(runtime.memory().read_int(counter), Ok(1));
//! ```
//!
//! The `graphvm` binary is a small monitor for saved byte code: it lists
//! instructions and runs entries against zeroed work registers.

pub mod code;
pub mod mach;
pub mod term;
