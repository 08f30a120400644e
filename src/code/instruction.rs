use super::{Address, Opcode, Operand, Record};

/// ## Decoded instruction
///
/// Where a record starts and what it is. The payload stays in the buffer
/// and is unpacked on demand with [`ByteCode::op`] or [`ByteCode::op_at`].
///
/// [`ByteCode::op`]: super::ByteCode::op
/// [`ByteCode::op_at`]: super::ByteCode::op_at

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub padding: u8,
}

pub const HEADER_SIZE: usize = 2;

impl Instruction {
    pub fn payload_offset(&self) -> usize {
        self.offset + HEADER_SIZE + self.padding as usize
    }

    pub fn operands_offset(&self) -> usize {
        self.payload_offset() + self.opcode.payload_size()
    }

    /// Total bytes of the record including header, padding and operands.
    pub fn size(&self) -> usize {
        HEADER_SIZE
            + self.padding as usize
            + self.opcode.payload_size()
            + self.opcode.arity() * Operand::SIZE
    }

    pub fn end(&self) -> usize {
        self.offset + self.size()
    }
}

/// Instructions in emission order, produced by one pass over a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionArray {
    instructions: Vec<Instruction>,
}

impl InstructionArray {
    pub(super) fn new(instructions: Vec<Instruction>) -> InstructionArray {
        InstructionArray { instructions }
    }
    pub fn len(&self) -> usize {
        self.instructions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
    pub fn get(&self, index: Address) -> Option<&Instruction> {
        self.instructions.get(index)
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

impl std::ops::Index<Address> for InstructionArray {
    type Output = Instruction;
    fn index(&self, index: Address) -> &Instruction {
        &self.instructions[index]
    }
}

impl<'a> IntoIterator for &'a InstructionArray {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;
    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

/// Operand array of an `Execute` record, read in place.
#[derive(Debug, Clone, Copy)]
pub struct Operands<'a> {
    bytes: &'a [u8],
}

impl<'a> Operands<'a> {
    pub(super) fn new(bytes: &'a [u8]) -> Operands<'a> {
        debug_assert_eq!(bytes.len() % Operand::SIZE, 0);
        Operands { bytes }
    }
    pub fn len(&self) -> usize {
        self.bytes.len() / Operand::SIZE
    }
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<Operand> {
        let at = index * Operand::SIZE;
        if at + Operand::SIZE > self.bytes.len() {
            return None;
        }
        Operand::unpack(&self.bytes[at..at + Operand::SIZE]).ok()
    }
}

impl<'a> Iterator for Operands<'a> {
    type Item = Operand;
    fn next(&mut self) -> Option<Operand> {
        if self.bytes.len() < Operand::SIZE {
            return None;
        }
        let (head, tail) = self.bytes.split_at(Operand::SIZE);
        self.bytes = tail;
        Operand::unpack(head).ok()
    }
}
