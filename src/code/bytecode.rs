use super::instruction::HEADER_SIZE;
use super::op::{
    BinaryOp, ChangeTypeOp, ComparisonOp, CopyOp, ExecuteOp, JumpIfOp, JumpOp, UnaryOp,
};
use super::{
    Address, Error, Instruction, InstructionArray, Layout, Op, Opcode, Operand, Operands, Record,
    MAX_OPERANDS,
};
use crate::error;
use std::collections::HashMap;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

/// Largest alignment `align` accepts. Padding is recorded in one byte.
pub const MAX_ALIGNMENT: usize = 128;

/// ## Byte code container
///
/// A flat buffer of back-to-back records plus a table of named entry points.
/// Records are appended by a compiler through the `add_*_op` builder, each
/// call returning the byte offset of the record it wrote. Once finalized the
/// buffer is never edited: relative jumps are baked as instruction counts and
/// inserting anything would invalidate them.
///
/// Every record is `[opcode u8][padding u8][padding bytes][payload][operands]`.
/// The buffer can only be walked front to back; [`ByteCode::instructions`]
/// does that walk once and the runtime keeps the result.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ByteCode {
    buffer: Vec<u8>,
    num_instructions: usize,
    alignment: usize,
    entries: Vec<Entry>,
    open_blocks: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub instruction: Address,
}

impl ByteCode {
    pub fn new() -> ByteCode {
        ByteCode::default()
    }

    pub(super) fn from_parts(
        buffer: Vec<u8>,
        alignment: usize,
        entries: Vec<Entry>,
    ) -> Result<ByteCode> {
        let mut code = ByteCode {
            buffer,
            num_instructions: 0,
            alignment,
            entries,
            open_blocks: vec![],
        };
        code.num_instructions = code.instructions()?.len();
        Ok(code)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn num_instructions(&self) -> usize {
        self.num_instructions
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    // *** Builder

    fn emit<T: Record>(&mut self, opcode: Opcode, record: &T, operands: &[Operand]) -> usize {
        debug_assert_eq!(T::SIZE, opcode.payload_size());
        debug_assert_eq!(operands.len(), opcode.arity());
        let offset = self.buffer.len();
        let padding = padding_for(offset, self.alignment);
        self.buffer.push(opcode.to_u8());
        self.buffer.push(padding as u8);
        self.buffer.resize(self.buffer.len() + padding, 0);
        record.pack(&mut self.buffer);
        for operand in operands {
            operand.pack(&mut self.buffer);
        }
        self.num_instructions += 1;
        offset
    }

    fn emit_bare(&mut self, opcode: Opcode) -> usize {
        debug_assert_eq!(opcode.payload_size(), 0);
        let offset = self.buffer.len();
        let padding = padding_for(offset, self.alignment);
        self.buffer.push(opcode.to_u8());
        self.buffer.push(padding as u8);
        self.buffer.resize(self.buffer.len() + padding, 0);
        self.num_instructions += 1;
        offset
    }

    pub fn add_execute_op(&mut self, function: u32, operands: &[Operand]) -> Result<usize> {
        if operands.len() > MAX_OPERANDS {
            return Err(error!(TooManyOperands, self.num_instructions; "MAXIMUM IS 64"));
        }
        let opcode = Opcode::Execute(operands.len() as u8);
        Ok(self.emit(opcode, &ExecuteOp { function }, operands))
    }

    pub fn add_zero_op(&mut self, arg: Operand) -> usize {
        self.emit(Opcode::Zero, &UnaryOp { arg }, &[])
    }

    pub fn add_false_op(&mut self, arg: Operand) -> usize {
        self.emit(Opcode::BoolFalse, &UnaryOp { arg }, &[])
    }

    pub fn add_true_op(&mut self, arg: Operand) -> usize {
        self.emit(Opcode::BoolTrue, &UnaryOp { arg }, &[])
    }

    pub fn add_copy_op(&mut self, source: Operand, target: Operand) -> usize {
        self.emit(Opcode::Copy, &CopyOp { source, target }, &[])
    }

    pub fn add_increment_op(&mut self, arg: Operand) -> usize {
        self.emit(Opcode::Increment, &UnaryOp { arg }, &[])
    }

    pub fn add_decrement_op(&mut self, arg: Operand) -> usize {
        self.emit(Opcode::Decrement, &UnaryOp { arg }, &[])
    }

    pub fn add_equals_op(&mut self, a: Operand, b: Operand, result: Operand) -> usize {
        self.emit(Opcode::Equals, &ComparisonOp { a, b, result }, &[])
    }

    pub fn add_not_equals_op(&mut self, a: Operand, b: Operand, result: Operand) -> usize {
        self.emit(Opcode::NotEquals, &ComparisonOp { a, b, result }, &[])
    }

    /// `target` is an instruction index for `JumpAbsolute` and an instruction
    /// count for `JumpForward` and `JumpBackward`.
    pub fn add_jump_op(&mut self, opcode: Opcode, target: usize) -> Result<usize> {
        if !opcode.is_jump() {
            return Err(error!(NotAJump, self.num_instructions));
        }
        let target = self.jump_operand(target)?;
        Ok(self.emit(opcode, &JumpOp { target }, &[]))
    }

    pub fn add_jump_if_op(
        &mut self,
        opcode: Opcode,
        target: usize,
        condition: Operand,
        polarity: bool,
    ) -> Result<usize> {
        if !opcode.is_jump_if() {
            return Err(error!(NotAJump, self.num_instructions));
        }
        let target = self.jump_operand(target)?;
        let record = JumpIfOp {
            target,
            polarity,
            condition,
        };
        Ok(self.emit(opcode, &record, &[]))
    }

    fn jump_operand(&self, target: usize) -> Result<u32> {
        match u32::try_from(target) {
            Ok(target) => Ok(target),
            Err(_) => Err(error!(InvalidJumpTarget, self.num_instructions)),
        }
    }

    /// `capacity` is the byte size the compiler allocated for the register.
    /// A layout that needs more is refused here rather than truncated later.
    pub fn add_change_type_op(
        &mut self,
        arg: Operand,
        layout: Layout,
        capacity: usize,
    ) -> Result<usize> {
        if layout.footprint().map_or(true, |size| size > capacity) {
            return Err(error!(LayoutTooLarge, self.num_instructions));
        }
        Ok(self.emit(Opcode::ChangeType, &ChangeTypeOp { arg, layout }, &[]))
    }

    pub fn add_exit_op(&mut self) -> usize {
        self.emit_bare(Opcode::Exit)
    }

    pub fn add_begin_block_op(&mut self, count: Operand, index: Operand) -> usize {
        self.open_blocks.push(self.num_instructions);
        self.emit(Opcode::BeginBlock, &BinaryOp { a: count, b: index }, &[])
    }

    pub fn add_end_block_op(&mut self) -> Result<usize> {
        if self.open_blocks.pop().is_none() {
            return Err(error!(UnbalancedBlock, self.num_instructions; "END WITHOUT BEGIN"));
        }
        Ok(self.emit_bare(Opcode::EndBlock))
    }

    /// Register a named entry point. A name registered again moves to the
    /// new instruction.
    pub fn add_entry(&mut self, name: &str, instruction: Address) {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.instruction = instruction,
            None => self.entries.push(Entry {
                name: name.to_string(),
                instruction,
            }),
        }
    }

    pub fn find_entry_index(&self, name: &str) -> Option<Address> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.instruction)
    }

    /// Check everything that can only be known once the last record is in:
    /// every block closed, every jump landing inside the stream, every entry
    /// pointing at an instruction.
    ///
    /// Returns the decoded instructions and the block pairing from `link`
    /// so a caller that needs them does not walk the buffer again.
    pub fn finalize(&self) -> Result<(InstructionArray, HashMap<Address, Address>)> {
        if let Some(&begin) = self.open_blocks.last() {
            return Err(error!(UnbalancedBlock, begin; "BEGIN WITHOUT END"));
        }
        let instructions = self.instructions()?;
        let blocks = self.link(&instructions)?;
        tracing::debug!(
            instructions = self.num_instructions,
            bytes = self.buffer.len(),
            entries = self.entries.len(),
            "byte code finalized"
        );
        Ok((instructions, blocks))
    }

    /// Validate jumps and operands and pair every `BeginBlock` with the
    /// index of its `EndBlock`.
    pub fn link(&self, instructions: &InstructionArray) -> Result<HashMap<Address, Address>> {
        let count = instructions.len();
        let mut blocks = HashMap::new();
        let mut open: Vec<Address> = vec![];
        for (index, instruction) in instructions.iter().enumerate() {
            let op = self.op(instruction).map_err(|e| e.in_instruction(index))?;
            match op.jump_target(index) {
                Some(Some(target)) if target <= count => {}
                Some(_) => return Err(error!(InvalidJumpTarget, index)),
                None => {}
            }
            match op {
                Op::BeginBlock(_) => open.push(index),
                Op::EndBlock => match open.pop() {
                    Some(begin) => {
                        blocks.insert(begin, index);
                    }
                    None => return Err(error!(UnbalancedBlock, index; "END WITHOUT BEGIN")),
                },
                Op::Execute(_) => {
                    let operands = self.operands(instruction);
                    if operands.count() != instruction.opcode.arity() {
                        return Err(error!(InvalidOpcode, index; "MALFORMED OPERAND"));
                    }
                }
                _ => {}
            }
        }
        if let Some(begin) = open.pop() {
            return Err(error!(UnbalancedBlock, begin; "BEGIN WITHOUT END"));
        }
        for entry in &self.entries {
            if entry.instruction > count {
                return Err(error!(MalformedEntry; "ENTRY PAST END OF STREAM"));
            }
        }
        Ok(blocks)
    }

    /// Re-lay the buffer so every payload starts on an `alignment` boundary.
    /// Zero removes all padding. The padding of each record is stored in its
    /// header so decoding is the same either way.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        if alignment > MAX_ALIGNMENT || (alignment != 0 && !alignment.is_power_of_two()) {
            return Err(error!(InvalidAlignment));
        }
        if alignment == self.alignment {
            return Ok(());
        }
        let instructions = self.instructions()?;
        let mut buffer = Vec::with_capacity(self.buffer.len());
        for instruction in &instructions {
            let padding = padding_for(buffer.len(), alignment);
            buffer.push(instruction.opcode.to_u8());
            buffer.push(padding as u8);
            buffer.resize(buffer.len() + padding, 0);
            buffer.extend_from_slice(&self.buffer[instruction.payload_offset()..instruction.end()]);
        }
        tracing::debug!(
            from = self.alignment,
            to = alignment,
            bytes = buffer.len(),
            "byte code realigned"
        );
        self.buffer = buffer;
        self.alignment = alignment;
        Ok(())
    }

    // *** Consumer

    /// Decode the buffer into instruction descriptors, front to back.
    pub fn instructions(&self) -> Result<InstructionArray> {
        let mut instructions = Vec::with_capacity(self.num_instructions);
        let mut offset = 0;
        while offset < self.buffer.len() {
            let index = instructions.len();
            if offset + HEADER_SIZE > self.buffer.len() {
                return Err(error!(TruncatedByteCode, index));
            }
            let opcode = Opcode::from_u8(self.buffer[offset]);
            if opcode == Opcode::Invalid {
                return Err(error!(InvalidOpcode, index));
            }
            let instruction = Instruction {
                offset,
                opcode,
                padding: self.buffer[offset + 1],
            };
            if instruction.end() > self.buffer.len() {
                return Err(error!(TruncatedByteCode, index));
            }
            instructions.push(instruction);
            offset = instruction.end();
        }
        Ok(InstructionArray::new(instructions))
    }

    fn payload(&self, instruction: &Instruction) -> Result<&[u8]> {
        let start = instruction.payload_offset();
        let end = instruction.operands_offset();
        if end > self.buffer.len() {
            return Err(error!(TruncatedByteCode));
        }
        Ok(&self.buffer[start..end])
    }

    pub fn op_at<T: Record>(&self, instruction: &Instruction) -> Result<T> {
        debug_assert_eq!(T::SIZE, instruction.opcode.payload_size());
        T::unpack(self.payload(instruction)?)
    }

    pub fn op(&self, instruction: &Instruction) -> Result<Op> {
        Op::unpack(instruction.opcode, self.payload(instruction)?)
    }

    /// The operand array of an `Execute` record. Empty for anything else.
    pub fn operands(&self, instruction: &Instruction) -> Operands<'_> {
        let start = instruction.operands_offset();
        let end = instruction.end().min(self.buffer.len());
        if start >= end {
            return Operands::new(&[]);
        }
        Operands::new(&self.buffer[start..end])
    }
}

fn padding_for(offset: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return 0;
    }
    let misalignment = (offset + HEADER_SIZE) % alignment;
    (alignment - misalignment) % alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::ErrorCode;

    fn counter() -> ByteCode {
        let mut code = ByteCode::new();
        code.add_zero_op(Operand::work(0));
        code.add_begin_block_op(Operand::literal(0), Operand::work(1));
        code.add_increment_op(Operand::work(0));
        code.add_end_block_op().unwrap();
        code.add_exit_op();
        code
    }

    #[test]
    fn test_offsets_are_back_to_back() {
        let mut code = ByteCode::new();
        assert_eq!(code.add_zero_op(Operand::work(0)), 0);
        assert_eq!(code.add_exit_op(), 10);
        assert_eq!(code.add_copy_op(Operand::work(0), Operand::work(1)), 12);
        assert_eq!(code.len(), 30);
        assert_eq!(code.num_instructions(), 3);
    }

    #[test]
    fn test_execute_operand_count() {
        let mut code = ByteCode::new();
        let args = [Operand::work(1), Operand::work(2), Operand::external(0)];
        code.add_execute_op(7, &args).unwrap();
        let instructions = code.instructions().unwrap();
        assert_eq!(instructions[0].opcode, Opcode::Execute(3));
        let operands: Vec<Operand> = code.operands(&instructions[0]).collect();
        assert_eq!(operands, args);
        assert_eq!(
            code.op_at::<ExecuteOp>(&instructions[0]),
            Ok(ExecuteOp { function: 7 })
        );
    }

    #[test]
    fn test_too_many_operands() {
        let mut code = ByteCode::new();
        let args = vec![Operand::work(0); 65];
        let e = code.add_execute_op(0, &args).unwrap_err();
        assert_eq!(e.code(), ErrorCode::TooManyOperands);
        assert!(code.is_empty());
        assert!(code.add_execute_op(0, &args[..64]).is_ok());
    }

    #[test]
    fn test_end_without_begin() {
        let mut code = ByteCode::new();
        let e = code.add_end_block_op().unwrap_err();
        assert_eq!(e.code(), ErrorCode::UnbalancedBlock);
    }

    #[test]
    fn test_begin_without_end() {
        let mut code = ByteCode::new();
        code.add_begin_block_op(Operand::literal(0), Operand::work(0));
        let e = code.finalize().unwrap_err();
        assert_eq!(e.code(), ErrorCode::UnbalancedBlock);
        assert_eq!(e.instruction(), Some(0));
    }

    #[test]
    fn test_jump_past_end() {
        let mut code = ByteCode::new();
        code.add_jump_op(Opcode::JumpForward, 3).unwrap();
        code.add_exit_op();
        let e = code.finalize().unwrap_err();
        assert_eq!(e.code(), ErrorCode::InvalidJumpTarget);
        assert_eq!(e.instruction(), Some(0));
    }

    #[test]
    fn test_jump_to_end_of_stream() {
        let mut code = ByteCode::new();
        code.add_jump_op(Opcode::JumpAbsolute, 2).unwrap();
        code.add_exit_op();
        assert!(code.finalize().is_ok());
    }

    #[test]
    fn test_jump_before_start() {
        let mut code = ByteCode::new();
        code.add_exit_op();
        code.add_jump_if_op(Opcode::JumpBackwardIf, 2, Operand::work(0), true)
            .unwrap();
        let e = code.finalize().unwrap_err();
        assert_eq!(e.code(), ErrorCode::InvalidJumpTarget);
    }

    #[test]
    fn test_not_a_jump() {
        let mut code = ByteCode::new();
        assert_eq!(
            code.add_jump_op(Opcode::JumpForwardIf, 1).unwrap_err().code(),
            ErrorCode::NotAJump
        );
        assert_eq!(
            code.add_jump_if_op(Opcode::Exit, 1, Operand::work(0), true)
                .unwrap_err()
                .code(),
            ErrorCode::NotAJump
        );
    }

    #[test]
    fn test_change_type_must_fit() {
        let mut code = ByteCode::new();
        let layout = Layout::new(3, 4, 4);
        assert!(code.add_change_type_op(Operand::work(0), layout, 16).is_ok());
        let e = code
            .add_change_type_op(Operand::work(0), layout.sliced(2), 16)
            .unwrap_err();
        assert_eq!(e.code(), ErrorCode::LayoutTooLarge);
        assert_eq!(code.num_instructions(), 1);
    }

    #[test]
    fn test_change_type_size_overflow_refused() {
        let mut code = ByteCode::new();
        let huge = Layout::new(3, 1 << 31, 1 << 31).sliced(4);
        let e = code
            .add_change_type_op(Operand::work(0), huge, 16)
            .unwrap_err();
        assert_eq!(e.code(), ErrorCode::LayoutTooLarge);
        assert!(code.is_empty());
    }

    #[test]
    fn test_link_pairs_nested_blocks() {
        let mut code = ByteCode::new();
        code.add_begin_block_op(Operand::literal(0), Operand::work(0));
        code.add_begin_block_op(Operand::literal(1), Operand::work(1));
        code.add_end_block_op().unwrap();
        code.add_end_block_op().unwrap();
        let blocks = code.link(&code.instructions().unwrap()).unwrap();
        assert_eq!(blocks.get(&0), Some(&3));
        assert_eq!(blocks.get(&1), Some(&2));
    }

    #[test]
    fn test_entries_replace() {
        let mut code = counter();
        code.add_entry("update", 0);
        code.add_entry("init", 4);
        code.add_entry("update", 1);
        assert_eq!(code.find_entry_index("update"), Some(1));
        assert_eq!(code.find_entry_index("init"), Some(4));
        assert_eq!(code.find_entry_index("missing"), None);
        assert_eq!(code.entries().len(), 2);
    }

    #[test]
    fn test_align_pads_payloads() {
        let mut code = counter();
        let packed = code.instructions().unwrap();
        code.align(8).unwrap();
        let aligned = code.instructions().unwrap();
        assert_eq!(packed.len(), aligned.len());
        for (a, b) in packed.iter().zip(aligned.iter()) {
            assert_eq!(a.opcode, b.opcode);
            assert_eq!(b.payload_offset() % 8, 0);
            assert_eq!(code.op(b).unwrap(), counter().op(a).unwrap());
        }
        code.align(0).unwrap();
        assert_eq!(code, counter());
    }

    #[test]
    fn test_emit_after_align_stays_aligned() {
        let mut code = counter();
        code.align(16).unwrap();
        let offset = code.add_true_op(Operand::work(2));
        let instructions = code.instructions().unwrap();
        let last = instructions[instructions.len() - 1];
        assert_eq!(last.offset, offset);
        assert_eq!(last.payload_offset() % 16, 0);
    }

    #[test]
    fn test_bad_alignment() {
        let mut code = counter();
        assert_eq!(code.align(12).unwrap_err().code(), ErrorCode::InvalidAlignment);
        assert_eq!(code.align(256).unwrap_err().code(), ErrorCode::InvalidAlignment);
    }

    #[test]
    fn test_unknown_tag() {
        let code = ByteCode::from_parts(vec![200, 0], 0, vec![]);
        assert_eq!(code.unwrap_err().code(), ErrorCode::InvalidOpcode);
    }

    #[test]
    fn test_truncated_record() {
        let mut code = counter();
        code.buffer.truncate(code.buffer.len() - 5);
        assert_eq!(
            code.instructions().unwrap_err().code(),
            ErrorCode::TruncatedByteCode
        );
    }
}
