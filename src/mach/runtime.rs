use super::{Config, FunctionTable, Memory, Program, Stack};
use crate::code::{Address, Error, Op, Operand};
use crate::error;
use std::sync::Arc;

type Result<T> = std::result::Result<T, Error>;

/// ## Execution engine
///
/// Walks a shared [`Program`] against memory this runtime owns. Each
/// instruction makes exactly one transition: mutate memory and move to the
/// next instruction, or move the cursor somewhere else.
///
/// Work is handed out in slices with [`Runtime::execute`] so a host can
/// enforce a step budget or interrupt between instructions.

pub struct Runtime<M: Memory> {
    program: Arc<Program>,
    functions: Arc<FunctionTable>,
    memory: M,
    frames: Stack<Frame>,
    pc: Address,
    state: State,
    interrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No invocation started, or the last one was interrupted.
    Idle,
    Running,
    Exited,
    Faulted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Nothing to run. Call `start` first.
    Stopped,
    /// The cycle budget ran out. Call `execute` again to continue.
    Running,
    /// `Exit` was reached or the cursor ran off the end.
    Exited,
    /// Stopped by `interrupt` at this instruction.
    Interrupted(Address),
    /// A host function failed. The cursor has already moved past the call
    /// so calling `execute` again continues the invocation.
    HostError(Error),
    /// A defect in the byte code or memory. The invocation is over.
    Faulted(Error),
}

/// One active `BeginBlock`.
#[derive(Debug, Clone, Copy)]
struct Frame {
    body_start: Address,
    limit: i64,
    index: Operand,
}

enum Step {
    Next,
    Exit,
    HostError(Error),
}

impl<M: Memory> Runtime<M> {
    pub fn new(program: Arc<Program>, functions: Arc<FunctionTable>, memory: M) -> Runtime<M> {
        Runtime::with_config(program, functions, memory, &Config::default())
    }

    pub fn with_config(
        program: Arc<Program>,
        functions: Arc<FunctionTable>,
        memory: M,
        config: &Config,
    ) -> Runtime<M> {
        Runtime {
            program,
            functions,
            memory,
            frames: Stack::new(config.max_block_depth, "BLOCKS NESTED TOO DEEP"),
            pc: 0,
            state: State::Idle,
            interrupted: false,
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn into_memory(self) -> M {
        self.memory
    }

    pub fn pc(&self) -> Address {
        self.pc
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Number of blocks the cursor is currently inside.
    pub fn block_depth(&self) -> usize {
        self.frames.len()
    }

    /// Begin an invocation at a named entry.
    pub fn start(&mut self, entry: &str) -> Result<()> {
        let index = self.program.entry(entry)?;
        tracing::debug!(entry, index, "invocation start");
        self.start_at(index);
        Ok(())
    }

    pub fn start_at(&mut self, index: Address) {
        self.frames.clear();
        self.pc = index;
        self.state = State::Running;
        self.interrupted = false;
    }

    /// Stop the running invocation before its next instruction.
    pub fn interrupt(&mut self) {
        if self.state == State::Running {
            self.interrupted = true;
        }
    }

    /// Run an entry to completion. The first host error ends the run and is
    /// returned; the runtime stays `Running` so `execute` can pick it up.
    pub fn run(&mut self, entry: &str) -> Result<()> {
        self.start(entry)?;
        loop {
            match self.execute(usize::max_value()) {
                Event::Running => {}
                Event::Exited | Event::Stopped => return Ok(()),
                Event::Interrupted(_) => return Ok(()),
                Event::HostError(error) | Event::Faulted(error) => return Err(error),
            }
        }
    }

    /// Execute at most `cycles` instructions.
    pub fn execute(&mut self, cycles: usize) -> Event {
        if self.interrupted {
            self.interrupted = false;
            self.frames.clear();
            self.state = State::Idle;
            tracing::debug!(pc = self.pc, "invocation interrupted");
            return Event::Interrupted(self.pc);
        }
        if self.state != State::Running {
            return Event::Stopped;
        }
        for _ in 0..cycles {
            match self.step() {
                Ok(Step::Next) => {}
                Ok(Step::Exit) => {
                    self.state = State::Exited;
                    tracing::debug!(pc = self.pc, "invocation exited");
                    return Event::Exited;
                }
                Ok(Step::HostError(error)) => return Event::HostError(error),
                Err(error) => {
                    let error = error.in_instruction(self.pc);
                    tracing::warn!(%error, "invocation faulted");
                    self.state = State::Faulted;
                    return Event::Faulted(error);
                }
            }
        }
        Event::Running
    }

    fn step(&mut self) -> Result<Step> {
        let pc = self.pc;
        let program: &Program = &self.program;
        let instruction = match program.instructions().get(pc) {
            Some(instruction) => instruction,
            None => return Ok(Step::Exit),
        };
        let op = program.code().op(instruction)?;
        tracing::trace!(pc, opcode = %instruction.opcode, "dispatch");
        let memory = &mut self.memory;
        let mut next = pc + 1;
        match op {
            Op::Execute(call) => {
                let function = match self.functions.get(call.function) {
                    Some(function) => function,
                    None => return Err(error!(InvalidFunction, pc)),
                };
                let args = program.code().operands(instruction);
                let memory: &mut dyn Memory = memory;
                if let Err(error) = function(memory, args) {
                    self.pc = next;
                    return Ok(Step::HostError(error.in_instruction(pc)));
                }
            }
            Op::Zero(op) => memory.zero(op.arg)?,
            Op::False(op) => memory.write_bool(op.arg, false)?,
            Op::True(op) => memory.write_bool(op.arg, true)?,
            Op::Copy(op) => memory.copy(op.source, op.target)?,
            Op::Increment(op) => {
                let value = memory.read_int(op.arg)?;
                memory.write_int(op.arg, value.wrapping_add(1))?
            }
            Op::Decrement(op) => {
                let value = memory.read_int(op.arg)?;
                memory.write_int(op.arg, value.wrapping_sub(1))?
            }
            Op::Equals(op) => {
                let equal = memory.equals(op.a, op.b)?;
                memory.write_bool(op.result, equal)?
            }
            Op::NotEquals(op) => {
                let equal = memory.equals(op.a, op.b)?;
                memory.write_bool(op.result, !equal)?
            }
            Op::JumpAbsolute(_) | Op::JumpForward(_) | Op::JumpBackward(_) => {
                next = jump_target(&op, pc)?;
            }
            Op::JumpAbsoluteIf(jump) | Op::JumpForwardIf(jump) | Op::JumpBackwardIf(jump) => {
                if memory.read_bool(jump.condition)? == jump.polarity {
                    next = jump_target(&op, pc)?;
                }
            }
            Op::ChangeType(op) => memory.change_type(op.arg, op.layout)?,
            Op::Exit => return Ok(Step::Exit),
            Op::BeginBlock(op) => {
                let limit = memory.read_int(op.a)?;
                if limit <= 0 {
                    next = match program.block_end(pc) {
                        Some(end) => end + 1,
                        None => return Err(error!(UnbalancedBlock, pc)),
                    };
                } else {
                    self.frames.push(Frame {
                        body_start: pc + 1,
                        limit,
                        index: op.b,
                    })?;
                }
            }
            Op::EndBlock => {
                let frame = match self.frames.last() {
                    Some(frame) => *frame,
                    None => return Err(error!(UnbalancedBlock, pc)),
                };
                let index = memory.read_int(frame.index)?.wrapping_add(1);
                memory.write_int(frame.index, index)?;
                if index < frame.limit {
                    next = frame.body_start;
                } else {
                    self.frames.pop()?;
                }
            }
        }
        self.pc = next;
        Ok(Step::Next)
    }
}

fn jump_target(op: &Op, pc: Address) -> Result<Address> {
    match op.jump_target(pc) {
        Some(Some(target)) => Ok(target),
        _ => Err(error!(InvalidJumpTarget, pc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{ByteCode, ErrorCode, Layout, MemoryKind, Opcode};
    use crate::mach::Registers;

    fn int() -> Layout {
        Layout::new(1, 8, 1)
    }

    fn runtime(code: ByteCode, regs: Registers) -> Runtime<Registers> {
        let program = Arc::new(Program::new(code).unwrap());
        Runtime::new(program, Arc::new(FunctionTable::with_builtins()), regs)
    }

    #[test]
    fn test_end_of_stream_exits() {
        let mut regs = Registers::new();
        let r0 = regs.add(MemoryKind::Work, int());
        let mut code = ByteCode::new();
        code.add_increment_op(r0);
        let mut rt = runtime(code, regs);
        rt.start_at(0);
        assert_eq!(rt.execute(10), Event::Exited);
        assert_eq!(rt.state(), State::Exited);
        assert_eq!(rt.execute(10), Event::Stopped);
        assert_eq!(rt.memory().read_int(r0), Ok(1));
    }

    #[test]
    fn test_cycle_budget() {
        let mut regs = Registers::new();
        let r0 = regs.add(MemoryKind::Work, int());
        let mut code = ByteCode::new();
        code.add_increment_op(r0);
        code.add_jump_op(Opcode::JumpBackward, 1).unwrap();
        let mut rt = runtime(code, regs);
        rt.start_at(0);
        assert_eq!(rt.execute(7), Event::Running);
        assert_eq!(rt.memory().read_int(r0), Ok(4));
        assert_eq!(rt.pc(), 1);
        rt.interrupt();
        assert_eq!(rt.execute(7), Event::Interrupted(1));
        assert_eq!(rt.state(), State::Idle);
    }

    #[test]
    fn test_invalid_function_faults() {
        let mut code = ByteCode::new();
        code.add_execute_op(99, &[]).unwrap();
        let mut rt = runtime(code, Registers::new());
        rt.start_at(0);
        match rt.execute(10) {
            Event::Faulted(e) => {
                assert_eq!(e.code(), ErrorCode::InvalidFunction);
                assert_eq!(e.instruction(), Some(0));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(rt.state(), State::Faulted);
    }

    #[test]
    fn test_host_error_advances() {
        let mut regs = Registers::new();
        let r0 = regs.add(MemoryKind::Work, int());
        let mut code = ByteCode::new();
        code.add_execute_op(0, &[r0]).unwrap();
        code.add_increment_op(r0);
        let mut rt = runtime(code, regs);
        rt.start_at(0);
        match rt.execute(10) {
            Event::HostError(e) => assert_eq!(e.code(), ErrorCode::HostFailure),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(rt.pc(), 1);
        assert_eq!(rt.execute(10), Event::Exited);
        assert_eq!(rt.memory().read_int(r0), Ok(1));
    }

    #[test]
    fn test_write_to_literal_faults() {
        let mut regs = Registers::new();
        let lit = regs.add(MemoryKind::Literal, int());
        let mut code = ByteCode::new();
        code.add_exit_op();
        code.add_zero_op(lit);
        code.add_entry("main", 1);
        let mut rt = runtime(code, regs);
        let e = rt.run("main").unwrap_err();
        assert_eq!(e.code(), ErrorCode::ReadOnlyMemory);
        assert_eq!(e.instruction(), Some(1));
    }

    #[test]
    fn test_block_depth_is_bounded() {
        let mut regs = Registers::new();
        let count = regs.add(MemoryKind::Literal, int());
        regs.set_int(count, 1).unwrap();
        let i = regs.add(MemoryKind::Work, int());
        let j = regs.add(MemoryKind::Work, int());
        let mut code = ByteCode::new();
        code.add_begin_block_op(count, i);
        code.add_begin_block_op(count, j);
        code.add_end_block_op().unwrap();
        code.add_end_block_op().unwrap();
        let program = Arc::new(Program::new(code).unwrap());
        let config = Config {
            max_block_depth: 1,
            ..Config::default()
        };
        let functions = Arc::new(FunctionTable::new());
        let mut rt = Runtime::with_config(program, functions, regs, &config);
        rt.start_at(0);
        assert_eq!(rt.execute(1), Event::Running);
        assert_eq!(rt.block_depth(), 1);
        match rt.execute(1) {
            Event::Faulted(e) => assert_eq!(e.code(), ErrorCode::BlockOverflow),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_entry() {
        let mut code = ByteCode::new();
        code.add_exit_op();
        let mut rt = runtime(code, Registers::new());
        assert_eq!(rt.start("main").unwrap_err().code(), ErrorCode::EntryNotFound);
        assert_eq!(rt.execute(1), Event::Stopped);
    }
}
