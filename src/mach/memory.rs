use crate::code::{Element, Error, Layout, MemoryKind, Operand};
use crate::error;

type Result<T> = std::result::Result<T, Error>;

/// ## Typed register memory
///
/// The runtime never touches register bytes itself. Every opcode resolves
/// its operands through this trait, so a host can back registers with
/// whatever storage it already has.
///
/// Values are assumed to be of the right type; the compiler guarantees it.

pub trait Memory {
    fn layout(&self, operand: Operand) -> Result<Layout>;
    /// Bytes allocated for the register, the ceiling for `change_type`.
    fn capacity(&self, operand: Operand) -> Result<usize>;
    fn read_bool(&self, operand: Operand) -> Result<bool>;
    fn write_bool(&mut self, operand: Operand, value: bool) -> Result<()>;
    fn read_int(&self, operand: Operand) -> Result<i64>;
    fn write_int(&mut self, operand: Operand, value: i64) -> Result<()>;
    fn zero(&mut self, operand: Operand) -> Result<()>;
    fn copy(&mut self, source: Operand, target: Operand) -> Result<()>;
    fn equals(&self, a: Operand, b: Operand) -> Result<bool>;
    fn change_type(&mut self, operand: Operand, layout: Layout) -> Result<()>;
}

/// One register: its current layout over a fixed allocation.
#[derive(Debug, Clone, Default, PartialEq)]
struct Register {
    layout: Layout,
    bytes: Vec<u8>,
}

/// ## Reference register store
///
/// Three banks of byte-backed registers, one per [`MemoryKind`].
/// Integers are little endian and sign extended from the element size;
/// booleans are one byte.
///
/// The host fills literal registers with `set_int` and `set_bool`; through
/// [`Memory`] they are read only.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registers {
    work: Vec<Register>,
    literal: Vec<Register>,
    external: Vec<Register>,
}

impl Registers {
    pub fn new() -> Registers {
        Registers::default()
    }

    /// Allocate a register sized for `layout`. A layout whose size does not
    /// fit in a `usize` gets no storage and every access to it fails.
    pub fn add(&mut self, memory: MemoryKind, layout: Layout) -> Operand {
        self.add_with_capacity(memory, layout, layout.footprint().unwrap_or(0))
    }

    /// Allocate a register with room to grow through `ChangeType`.
    pub fn add_with_capacity(
        &mut self,
        memory: MemoryKind,
        layout: Layout,
        capacity: usize,
    ) -> Operand {
        let bank = self.bank_mut(memory);
        let register = bank.len();
        debug_assert!(register <= u16::max_value() as usize);
        bank.push(Register {
            layout,
            bytes: vec![0; capacity],
        });
        Operand {
            memory,
            register: register as u16,
            element: Element::Whole,
        }
    }

    pub fn len(&self, memory: MemoryKind) -> usize {
        self.bank(memory).len()
    }

    /// Host side store, allowed on literal registers.
    pub fn set_int(&mut self, operand: Operand, value: i64) -> Result<()> {
        let (start, len) = self.element(operand)?;
        let register = self.register_mut(operand)?;
        write_le(&mut register.bytes[start..start + len], value);
        Ok(())
    }

    /// Host side store, allowed on literal registers.
    pub fn set_bool(&mut self, operand: Operand, value: bool) -> Result<()> {
        let (start, len) = self.element(operand)?;
        let register = self.register_mut(operand)?;
        write_bool(&mut register.bytes[start..start + len], value);
        Ok(())
    }

    fn bank(&self, memory: MemoryKind) -> &Vec<Register> {
        match memory {
            MemoryKind::Work => &self.work,
            MemoryKind::Literal => &self.literal,
            MemoryKind::External => &self.external,
        }
    }

    fn bank_mut(&mut self, memory: MemoryKind) -> &mut Vec<Register> {
        match memory {
            MemoryKind::Work => &mut self.work,
            MemoryKind::Literal => &mut self.literal,
            MemoryKind::External => &mut self.external,
        }
    }

    fn register(&self, operand: Operand) -> Result<&Register> {
        match self.bank(operand.memory).get(operand.register as usize) {
            Some(register) => Ok(register),
            None => Err(error!(InvalidRegister)),
        }
    }

    fn register_mut(&mut self, operand: Operand) -> Result<&mut Register> {
        match self.bank_mut(operand.memory).get_mut(operand.register as usize) {
            Some(register) => Ok(register),
            None => Err(error!(InvalidRegister)),
        }
    }

    fn writable(&mut self, operand: Operand) -> Result<&mut Register> {
        if operand.memory == MemoryKind::Literal {
            return Err(error!(ReadOnlyMemory));
        }
        self.register_mut(operand)
    }

    /// Byte range of the single element the operand addresses. The range
    /// always lies inside the register's bytes.
    fn element(&self, operand: Operand) -> Result<(usize, usize)> {
        let register = self.register(operand)?;
        let layout = register.layout;
        let index = match operand.element {
            Element::Whole => 0,
            Element::Fixed(index) => index as i64,
            Element::Indirect(index) => self.read_int(Operand::work(index))?,
        };
        let count = layout.elements().unwrap_or(usize::max_value());
        if index < 0 || index as u64 >= count as u64 {
            return Err(error!(ElementOutOfRange));
        }
        let size = layout.element_size as usize;
        let start = (index as usize).checked_mul(size);
        match start.and_then(|start| start.checked_add(size)) {
            Some(end) if end <= register.bytes.len() => Ok((end - size, size)),
            _ => Err(error!(ElementOutOfRange)),
        }
    }

    /// Byte range the operand covers: the whole footprint or one element.
    fn region(&self, operand: Operand) -> Result<(usize, usize)> {
        match operand.element {
            Element::Whole => {
                let register = self.register(operand)?;
                match register.layout.footprint() {
                    Some(size) if size <= register.bytes.len() => Ok((0, size)),
                    _ => Err(error!(LayoutTooLarge)),
                }
            }
            _ => self.element(operand),
        }
    }
}

impl Memory for Registers {
    fn layout(&self, operand: Operand) -> Result<Layout> {
        Ok(self.register(operand)?.layout)
    }

    fn capacity(&self, operand: Operand) -> Result<usize> {
        Ok(self.register(operand)?.bytes.len())
    }

    fn read_bool(&self, operand: Operand) -> Result<bool> {
        let (start, len) = self.element(operand)?;
        let bytes = &self.register(operand)?.bytes[start..start + len];
        Ok(bytes.iter().any(|&b| b != 0))
    }

    fn write_bool(&mut self, operand: Operand, value: bool) -> Result<()> {
        let (start, len) = self.element(operand)?;
        let register = self.writable(operand)?;
        write_bool(&mut register.bytes[start..start + len], value);
        Ok(())
    }

    fn read_int(&self, operand: Operand) -> Result<i64> {
        let (start, len) = self.element(operand)?;
        Ok(read_le(&self.register(operand)?.bytes[start..start + len]))
    }

    fn write_int(&mut self, operand: Operand, value: i64) -> Result<()> {
        let (start, len) = self.element(operand)?;
        let register = self.writable(operand)?;
        write_le(&mut register.bytes[start..start + len], value);
        Ok(())
    }

    fn zero(&mut self, operand: Operand) -> Result<()> {
        let (start, len) = self.region(operand)?;
        let register = self.writable(operand)?;
        for b in &mut register.bytes[start..start + len] {
            *b = 0;
        }
        Ok(())
    }

    fn copy(&mut self, source: Operand, target: Operand) -> Result<()> {
        let (from, from_len) = self.region(source)?;
        let (to, to_len) = self.region(target)?;
        let len = from_len.min(to_len);
        self.writable(target)?;
        let same = source.memory == target.memory && source.register == target.register;
        if same {
            let register = self.register_mut(target)?;
            register.bytes.copy_within(from..from + len, to);
            return Ok(());
        }
        let mut taken = std::mem::take(self.register_mut(target)?);
        let copied = match self.register(source) {
            Ok(register) => {
                taken.bytes[to..to + len].copy_from_slice(&register.bytes[from..from + len]);
                Ok(())
            }
            Err(e) => Err(e),
        };
        *self.register_mut(target)? = taken;
        copied
    }

    fn equals(&self, a: Operand, b: Operand) -> Result<bool> {
        let (a_start, a_len) = self.region(a)?;
        let (b_start, b_len) = self.region(b)?;
        if a_len != b_len {
            return Ok(false);
        }
        let a_bytes = &self.register(a)?.bytes[a_start..a_start + a_len];
        let b_bytes = &self.register(b)?.bytes[b_start..b_start + b_len];
        Ok(a_bytes == b_bytes)
    }

    fn change_type(&mut self, operand: Operand, layout: Layout) -> Result<()> {
        let register = self.writable(operand)?;
        if layout.footprint().map_or(true, |size| size > register.bytes.len()) {
            return Err(error!(LayoutTooLarge));
        }
        register.layout = layout;
        Ok(())
    }
}

fn read_le(bytes: &[u8]) -> i64 {
    let len = bytes.len().min(8);
    if len == 0 {
        return 0;
    }
    let mut raw = [0u8; 8];
    raw[..len].copy_from_slice(&bytes[..len]);
    let shift = 64 - 8 * len as u32;
    (i64::from_le_bytes(raw) << shift) >> shift
}

fn write_le(bytes: &mut [u8], value: i64) {
    let raw = value.to_le_bytes();
    let len = bytes.len().min(8);
    bytes[..len].copy_from_slice(&raw[..len]);
    let fill = if value < 0 { 0xff } else { 0 };
    for b in &mut bytes[len..] {
        *b = fill;
    }
}

fn write_bool(bytes: &mut [u8], value: bool) {
    for b in bytes.iter_mut() {
        *b = 0;
    }
    if let Some(first) = bytes.first_mut() {
        *first = value as u8;
    }
}
