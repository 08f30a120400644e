#![allow(dead_code)]
use graphvm::code::{ByteCode, Layout, MemoryKind, Operand};
use graphvm::mach::{Event, FunctionTable, Program, Registers, Runtime};
use std::sync::Arc;

pub const INT: u32 = 1;
pub const BOOL: u32 = 2;

pub fn int() -> Layout {
    Layout::new(INT, 8, 1)
}

pub fn boolean() -> Layout {
    Layout::new(BOOL, 1, 1)
}

pub fn work(regs: &mut Registers) -> Operand {
    regs.add(MemoryKind::Work, int())
}

pub fn flag(regs: &mut Registers) -> Operand {
    regs.add(MemoryKind::Work, boolean())
}

pub fn literal(regs: &mut Registers, value: i64) -> Operand {
    let operand = regs.add(MemoryKind::Literal, int());
    regs.set_int(operand, value).unwrap();
    operand
}

pub fn runtime(code: ByteCode, regs: Registers) -> Runtime<Registers> {
    runtime_with(code, regs, FunctionTable::with_builtins())
}

pub fn runtime_with(code: ByteCode, regs: Registers, functions: FunctionTable) -> Runtime<Registers> {
    let program = Arc::new(Program::new(code).unwrap());
    Runtime::new(program, Arc::new(functions), regs)
}

pub fn exec(runtime: &mut Runtime<Registers>) -> String {
    exec_n(runtime, 5000)
}

/// Drive the runtime until it stops and describe what happened.
pub fn exec_n(runtime: &mut Runtime<Registers>, cycles: usize) -> String {
    let mut s = String::new();
    let mut prev_running = false;
    loop {
        let event = runtime.execute(cycles);
        match &event {
            Event::Stopped => break,
            Event::Exited => {
                s.push_str("EXITED\n");
                break;
            }
            Event::Interrupted(pc) => {
                s.push_str(&format!("INTERRUPTED IN {}\n", pc));
                break;
            }
            Event::HostError(error) => {
                s.push_str(&format!("?{}\n", error));
            }
            Event::Faulted(error) => {
                s.push_str(&format!("!{}\n", error));
                break;
            }
            Event::Running => {
                if prev_running {
                    s.push_str(&format!("{} Execution cycles exceeded.\n", cycles));
                    break;
                }
            }
        }
        prev_running = event == Event::Running;
    }
    s
}
