use super::op::{read_u16, read_u32, Record};
use super::Error;
use crate::error;

type Result<T> = std::result::Result<T, Error>;

/// ## Register address
///
/// An operand names a slot in external memory. It never carries a value;
/// the opcodes that reference it read and write through [`Memory`].
///
/// Wire format, 8 bytes little endian:
/// `[kind u8][element mode u8][register u16][element u32]`
///
/// [`Memory`]: crate::mach::Memory

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub memory: MemoryKind,
    pub register: u16,
    pub element: Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Scratch registers owned by one runtime.
    Work,
    /// Constants baked by the compiler. Read only.
    Literal,
    /// Host owned slots, e.g. node inputs and outputs.
    External,
}

/// Which part of a register the operand addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    /// Element 0, or the whole value for scalars.
    Whole,
    /// A fixed element index baked into the operand.
    Fixed(u32),
    /// The element index is the integer held in this work register.
    Indirect(u16),
}

impl Operand {
    pub fn work(register: u16) -> Operand {
        Operand {
            memory: MemoryKind::Work,
            register,
            element: Element::Whole,
        }
    }

    pub fn literal(register: u16) -> Operand {
        Operand {
            memory: MemoryKind::Literal,
            register,
            element: Element::Whole,
        }
    }

    pub fn external(register: u16) -> Operand {
        Operand {
            memory: MemoryKind::External,
            register,
            element: Element::Whole,
        }
    }

    pub fn at(self, element: u32) -> Operand {
        Operand {
            element: Element::Fixed(element),
            ..self
        }
    }

    pub fn at_register(self, index_register: u16) -> Operand {
        Operand {
            element: Element::Indirect(index_register),
            ..self
        }
    }
}

impl MemoryKind {
    fn from_u8(byte: u8) -> Option<MemoryKind> {
        match byte {
            0 => Some(MemoryKind::Work),
            1 => Some(MemoryKind::Literal),
            2 => Some(MemoryKind::External),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            MemoryKind::Work => 0,
            MemoryKind::Literal => 1,
            MemoryKind::External => 2,
        }
    }
}

impl Record for Operand {
    const SIZE: usize = 8;

    fn pack(&self, out: &mut Vec<u8>) {
        let (mode, element) = match self.element {
            Element::Whole => (0u8, 0u32),
            Element::Fixed(index) => (1, index),
            Element::Indirect(register) => (2, register as u32),
        };
        out.push(self.memory.to_u8());
        out.push(mode);
        out.extend_from_slice(&self.register.to_le_bytes());
        out.extend_from_slice(&element.to_le_bytes());
    }

    fn unpack(bytes: &[u8]) -> Result<Operand> {
        if bytes.len() < Self::SIZE {
            return Err(error!(TruncatedByteCode; "OPERAND"));
        }
        let memory = match MemoryKind::from_u8(bytes[0]) {
            Some(kind) => kind,
            None => return Err(error!(InvalidOpcode; "UNKNOWN MEMORY KIND")),
        };
        let register = read_u16(bytes, 2);
        let raw = read_u32(bytes, 4);
        let element = match bytes[1] {
            0 => Element::Whole,
            1 => Element::Fixed(raw),
            2 if raw <= u16::max_value() as u32 => Element::Indirect(raw as u16),
            _ => return Err(error!(InvalidOpcode; "UNKNOWN ELEMENT MODE")),
        };
        Ok(Operand {
            memory,
            register,
            element,
        })
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let prefix = match self.memory {
            MemoryKind::Work => "R",
            MemoryKind::Literal => "L",
            MemoryKind::External => "X",
        };
        match self.element {
            Element::Whole => write!(f, "{}{}", prefix, self.register),
            Element::Fixed(i) => write!(f, "{}{}[{}]", prefix, self.register, i),
            Element::Indirect(r) => write!(f, "{}{}[R{}]", prefix, self.register, r),
        }
    }
}

/// ## Register layout
///
/// What a register holds: a type tag chosen by the compiler plus the shape of
/// the storage. `ChangeType` rewrites this in place without moving bytes.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Layout {
    pub type_tag: u32,
    pub element_size: u32,
    pub element_count: u32,
    pub slice_count: u32,
}

impl Layout {
    pub fn new(type_tag: u32, element_size: u32, element_count: u32) -> Layout {
        Layout {
            type_tag,
            element_size,
            element_count,
            slice_count: 1,
        }
    }

    pub fn sliced(self, slice_count: u32) -> Layout {
        Layout {
            slice_count,
            ..self
        }
    }

    /// Number of addressable elements across all slices.
    /// `None` when it does not fit in a `usize`.
    pub fn elements(&self) -> Option<usize> {
        (self.element_count as usize).checked_mul(self.slice_count.max(1) as usize)
    }

    /// Bytes the layout needs. Zero slices still reserve one.
    /// `None` when the size does not fit in a `usize`.
    pub fn footprint(&self) -> Option<usize> {
        self.elements()?.checked_mul(self.element_size as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_wire_format() {
        let mut out = vec![];
        Operand::external(0x0102).at(7).pack(&mut out);
        assert_eq!(out, [2, 1, 0x02, 0x01, 7, 0, 0, 0]);
    }

    #[test]
    fn test_indirect_operand_unpacks() {
        let op = Operand::work(3).at_register(9);
        let mut out = vec![];
        op.pack(&mut out);
        assert_eq!(Operand::unpack(&out), Ok(op));
    }

    #[test]
    fn test_unknown_memory_kind() {
        let bytes = [9, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            Operand::unpack(&bytes).map_err(|e| e.code()),
            Err(super::super::ErrorCode::InvalidOpcode)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Operand::work(1).to_string(), "R1");
        assert_eq!(Operand::literal(2).at(3).to_string(), "L2[3]");
        assert_eq!(Operand::external(4).at_register(5).to_string(), "X4[R5]");
    }

    #[test]
    fn test_footprint() {
        assert_eq!(Layout::new(1, 4, 3).footprint(), Some(12));
        assert_eq!(Layout::new(1, 4, 3).sliced(0).footprint(), Some(12));
        assert_eq!(Layout::new(1, 4, 3).sliced(2).footprint(), Some(24));
        assert_eq!(Layout::new(1, 4, 3).sliced(2).elements(), Some(6));
    }

    #[test]
    fn test_footprint_overflow() {
        let huge = Layout::new(1, 1 << 31, 1 << 31).sliced(4);
        assert_eq!(huge.footprint(), None);
    }
}
