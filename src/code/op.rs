use super::{Error, Layout, Opcode, Operand};
use crate::error;

type Result<T> = std::result::Result<T, Error>;

/// ## Fixed size instruction payloads
///
/// Each opcode family stores one of these records after its header.
/// Records are packed and unpacked explicitly, little endian, so the
/// buffer never depends on the in-memory layout of a Rust struct.

pub trait Record: Sized {
    const SIZE: usize;
    fn pack(&self, out: &mut Vec<u8>);
    fn unpack(bytes: &[u8]) -> Result<Self>;
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn check_len<T: Record>(bytes: &[u8]) -> Result<()> {
    if bytes.len() < T::SIZE {
        Err(error!(TruncatedByteCode; "RECORD"))
    } else {
        Ok(())
    }
}

/// Header of `Execute(n)`. The `n` operands follow it in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOp {
    pub function: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryOp {
    pub arg: Operand,
}

/// Two operands. `BeginBlock` stores its count and index registers here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryOp {
    pub a: Operand,
    pub b: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOp {
    pub source: Operand,
    pub target: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonOp {
    pub a: Operand,
    pub b: Operand,
    pub result: Operand,
}

/// Absolute instruction index, or an instruction count for relative jumps.
/// The direction of a relative jump is part of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpOp {
    pub target: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpIfOp {
    pub target: u32,
    pub polarity: bool,
    pub condition: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeTypeOp {
    pub arg: Operand,
    pub layout: Layout,
}

impl Record for ExecuteOp {
    const SIZE: usize = 4;
    fn pack(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.function.to_le_bytes());
    }
    fn unpack(bytes: &[u8]) -> Result<Self> {
        check_len::<Self>(bytes)?;
        Ok(ExecuteOp {
            function: read_u32(bytes, 0),
        })
    }
}

impl Record for UnaryOp {
    const SIZE: usize = Operand::SIZE;
    fn pack(&self, out: &mut Vec<u8>) {
        self.arg.pack(out);
    }
    fn unpack(bytes: &[u8]) -> Result<Self> {
        Ok(UnaryOp {
            arg: Operand::unpack(bytes)?,
        })
    }
}

impl Record for BinaryOp {
    const SIZE: usize = Operand::SIZE * 2;
    fn pack(&self, out: &mut Vec<u8>) {
        self.a.pack(out);
        self.b.pack(out);
    }
    fn unpack(bytes: &[u8]) -> Result<Self> {
        check_len::<Self>(bytes)?;
        Ok(BinaryOp {
            a: Operand::unpack(bytes)?,
            b: Operand::unpack(&bytes[Operand::SIZE..])?,
        })
    }
}

impl Record for CopyOp {
    const SIZE: usize = Operand::SIZE * 2;
    fn pack(&self, out: &mut Vec<u8>) {
        self.source.pack(out);
        self.target.pack(out);
    }
    fn unpack(bytes: &[u8]) -> Result<Self> {
        check_len::<Self>(bytes)?;
        Ok(CopyOp {
            source: Operand::unpack(bytes)?,
            target: Operand::unpack(&bytes[Operand::SIZE..])?,
        })
    }
}

impl Record for ComparisonOp {
    const SIZE: usize = Operand::SIZE * 3;
    fn pack(&self, out: &mut Vec<u8>) {
        self.a.pack(out);
        self.b.pack(out);
        self.result.pack(out);
    }
    fn unpack(bytes: &[u8]) -> Result<Self> {
        check_len::<Self>(bytes)?;
        Ok(ComparisonOp {
            a: Operand::unpack(bytes)?,
            b: Operand::unpack(&bytes[Operand::SIZE..])?,
            result: Operand::unpack(&bytes[Operand::SIZE * 2..])?,
        })
    }
}

impl Record for JumpOp {
    const SIZE: usize = 4;
    fn pack(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.target.to_le_bytes());
    }
    fn unpack(bytes: &[u8]) -> Result<Self> {
        check_len::<Self>(bytes)?;
        Ok(JumpOp {
            target: read_u32(bytes, 0),
        })
    }
}

impl Record for JumpIfOp {
    const SIZE: usize = 8 + Operand::SIZE;
    fn pack(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.target.to_le_bytes());
        out.extend_from_slice(&[self.polarity as u8, 0, 0, 0]);
        self.condition.pack(out);
    }
    fn unpack(bytes: &[u8]) -> Result<Self> {
        check_len::<Self>(bytes)?;
        Ok(JumpIfOp {
            target: read_u32(bytes, 0),
            polarity: bytes[4] != 0,
            condition: Operand::unpack(&bytes[8..])?,
        })
    }
}

impl Record for ChangeTypeOp {
    const SIZE: usize = Operand::SIZE + 16;
    fn pack(&self, out: &mut Vec<u8>) {
        self.arg.pack(out);
        let layout = &self.layout;
        for field in &[
            layout.type_tag,
            layout.element_size,
            layout.element_count,
            layout.slice_count,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
    fn unpack(bytes: &[u8]) -> Result<Self> {
        check_len::<Self>(bytes)?;
        let at = Operand::SIZE;
        Ok(ChangeTypeOp {
            arg: Operand::unpack(bytes)?,
            layout: Layout {
                type_tag: read_u32(bytes, at),
                element_size: read_u32(bytes, at + 4),
                element_count: read_u32(bytes, at + 8),
                slice_count: read_u32(bytes, at + 12),
            },
        })
    }
}

/// One decoded instruction payload, dispatched with a single `match`.
/// Operands of `Execute` stay in the buffer; see [`ByteCode::operands`].
///
/// [`ByteCode::operands`]: super::ByteCode::operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Execute(ExecuteOp),
    Zero(UnaryOp),
    False(UnaryOp),
    True(UnaryOp),
    Copy(CopyOp),
    Increment(UnaryOp),
    Decrement(UnaryOp),
    Equals(ComparisonOp),
    NotEquals(ComparisonOp),
    JumpAbsolute(JumpOp),
    JumpForward(JumpOp),
    JumpBackward(JumpOp),
    JumpAbsoluteIf(JumpIfOp),
    JumpForwardIf(JumpIfOp),
    JumpBackwardIf(JumpIfOp),
    ChangeType(ChangeTypeOp),
    Exit,
    BeginBlock(BinaryOp),
    EndBlock,
}

impl Op {
    /// Decode the payload that follows a header with `opcode`.
    pub fn unpack(opcode: Opcode, payload: &[u8]) -> Result<Op> {
        use Opcode::*;
        Ok(match opcode {
            Execute(_) => Op::Execute(ExecuteOp::unpack(payload)?),
            Zero => Op::Zero(UnaryOp::unpack(payload)?),
            BoolFalse => Op::False(UnaryOp::unpack(payload)?),
            BoolTrue => Op::True(UnaryOp::unpack(payload)?),
            Copy => Op::Copy(CopyOp::unpack(payload)?),
            Increment => Op::Increment(UnaryOp::unpack(payload)?),
            Decrement => Op::Decrement(UnaryOp::unpack(payload)?),
            Equals => Op::Equals(ComparisonOp::unpack(payload)?),
            NotEquals => Op::NotEquals(ComparisonOp::unpack(payload)?),
            JumpAbsolute => Op::JumpAbsolute(JumpOp::unpack(payload)?),
            JumpForward => Op::JumpForward(JumpOp::unpack(payload)?),
            JumpBackward => Op::JumpBackward(JumpOp::unpack(payload)?),
            JumpAbsoluteIf => Op::JumpAbsoluteIf(JumpIfOp::unpack(payload)?),
            JumpForwardIf => Op::JumpForwardIf(JumpIfOp::unpack(payload)?),
            JumpBackwardIf => Op::JumpBackwardIf(JumpIfOp::unpack(payload)?),
            ChangeType => Op::ChangeType(ChangeTypeOp::unpack(payload)?),
            Exit => Op::Exit,
            BeginBlock => Op::BeginBlock(BinaryOp::unpack(payload)?),
            EndBlock => Op::EndBlock,
            Invalid => return Err(error!(InvalidOpcode)),
        })
    }

    /// Where control goes after the instruction at `index`, if it is a jump.
    /// Relative targets that leave the stream come back as `None`.
    pub fn jump_target(&self, index: usize) -> Option<Option<usize>> {
        let (base, target) = match self {
            Op::JumpAbsolute(op) => return Some(Some(op.target as usize)),
            Op::JumpAbsoluteIf(op) => return Some(Some(op.target as usize)),
            Op::JumpForward(op) => (index, op.target as isize),
            Op::JumpForwardIf(op) => (index, op.target as isize),
            Op::JumpBackward(op) => (index, -(op.target as isize)),
            Op::JumpBackwardIf(op) => (index, -(op.target as isize)),
            _ => return None,
        };
        let target = base as isize + target;
        if target < 0 {
            Some(None)
        } else {
            Some(Some(target as usize))
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Op::Execute(op) => write!(f, "FN#{}", op.function),
            Op::Zero(op) | Op::False(op) | Op::True(op) => write!(f, "{}", op.arg),
            Op::Increment(op) | Op::Decrement(op) => write!(f, "{}", op.arg),
            Op::Copy(op) => write!(f, "{} -> {}", op.source, op.target),
            Op::Equals(op) | Op::NotEquals(op) => {
                write!(f, "{}, {} -> {}", op.a, op.b, op.result)
            }
            Op::JumpAbsolute(op) => write!(f, "{}", op.target),
            Op::JumpForward(op) => write!(f, "+{}", op.target),
            Op::JumpBackward(op) => write!(f, "-{}", op.target),
            Op::JumpAbsoluteIf(op) => write!(f, "{} IF {}={}", op.target, op.condition, op.polarity),
            Op::JumpForwardIf(op) => write!(f, "+{} IF {}={}", op.target, op.condition, op.polarity),
            Op::JumpBackwardIf(op) => {
                write!(f, "-{} IF {}={}", op.target, op.condition, op.polarity)
            }
            Op::ChangeType(op) => write!(
                f,
                "{} TYPE {} SIZE {} COUNT {} SLICES {}",
                op.arg,
                op.layout.type_tag,
                op.layout.element_size,
                op.layout.element_count,
                op.layout.slice_count
            ),
            Op::Exit | Op::EndBlock => Ok(()),
            Op::BeginBlock(op) => write!(f, "COUNT {} INDEX {}", op.a, op.b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_match_opcode_table() {
        assert_eq!(ExecuteOp::SIZE, Opcode::Execute(0).payload_size());
        assert_eq!(UnaryOp::SIZE, Opcode::Zero.payload_size());
        assert_eq!(BinaryOp::SIZE, Opcode::BeginBlock.payload_size());
        assert_eq!(CopyOp::SIZE, Opcode::Copy.payload_size());
        assert_eq!(ComparisonOp::SIZE, Opcode::Equals.payload_size());
        assert_eq!(JumpOp::SIZE, Opcode::JumpForward.payload_size());
        assert_eq!(JumpIfOp::SIZE, Opcode::JumpForwardIf.payload_size());
        assert_eq!(ChangeTypeOp::SIZE, Opcode::ChangeType.payload_size());
    }

    #[test]
    fn test_jump_if_keeps_polarity() {
        let op = JumpIfOp {
            target: 12,
            polarity: false,
            condition: Operand::work(4),
        };
        let mut out = vec![];
        op.pack(&mut out);
        assert_eq!(out.len(), JumpIfOp::SIZE);
        assert_eq!(JumpIfOp::unpack(&out), Ok(op));
    }

    #[test]
    fn test_truncated_payload() {
        let e = ChangeTypeOp::unpack(&[0; 10]).unwrap_err();
        assert_eq!(e.code(), super::super::ErrorCode::TruncatedByteCode);
    }

    #[test]
    fn test_relative_jump_target() {
        let fwd = Op::JumpForward(JumpOp { target: 2 });
        assert_eq!(fwd.jump_target(1), Some(Some(3)));
        let back = Op::JumpBackward(JumpOp { target: 5 });
        assert_eq!(back.jump_target(2), Some(None));
        assert_eq!(Op::Exit.jump_target(0), None);
    }
}
