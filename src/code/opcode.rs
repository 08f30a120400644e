/// ## Virtual machine instruction set
///
/// The graph virtual machine has no stack for values.
/// Every operation reads and writes registers in external memory.
///
/// For example: `for i in 0..5 { sum += 1 }` compiles to
/// `[BeginBlock(L0, R0), Increment(R1), EndBlock, Exit]`
///
/// The wire tag of `Execute(n)` is `n` itself, so the operand count of a
/// host call never needs its own field.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // *** Host calls
    /// Call a host function with `n` operands, 0..=64.
    Execute(u8),

    // *** Register mutation
    Zero,
    BoolFalse,
    BoolTrue,
    Copy,
    Increment,
    Decrement,

    // *** Comparison
    Equals,
    NotEquals,

    // *** Branch control
    JumpAbsolute,
    JumpForward,
    JumpBackward,
    JumpAbsoluteIf,
    JumpForwardIf,
    JumpBackwardIf,

    // *** Layout
    ChangeType,

    // *** Invocation control
    Exit,
    BeginBlock,
    EndBlock,

    /// Never emitted. Unknown tags decode to this.
    Invalid,
}

pub const MAX_OPERANDS: usize = 64;

const FIRST_FIXED_TAG: u8 = MAX_OPERANDS as u8 + 1;

impl Opcode {
    pub fn from_u8(tag: u8) -> Opcode {
        use Opcode::*;
        if tag < FIRST_FIXED_TAG {
            return Execute(tag);
        }
        match tag - FIRST_FIXED_TAG {
            0 => Zero,
            1 => BoolFalse,
            2 => BoolTrue,
            3 => Copy,
            4 => Increment,
            5 => Decrement,
            6 => Equals,
            7 => NotEquals,
            8 => JumpAbsolute,
            9 => JumpForward,
            10 => JumpBackward,
            11 => JumpAbsoluteIf,
            12 => JumpForwardIf,
            13 => JumpBackwardIf,
            14 => ChangeType,
            15 => Exit,
            16 => BeginBlock,
            17 => EndBlock,
            _ => Invalid,
        }
    }

    pub fn to_u8(self) -> u8 {
        use Opcode::*;
        let fixed = match self {
            Execute(n) => {
                debug_assert!(n as usize <= MAX_OPERANDS);
                return n;
            }
            Invalid => return u8::max_value(),
            Zero => 0,
            BoolFalse => 1,
            BoolTrue => 2,
            Copy => 3,
            Increment => 4,
            Decrement => 5,
            Equals => 6,
            NotEquals => 7,
            JumpAbsolute => 8,
            JumpForward => 9,
            JumpBackward => 10,
            JumpAbsoluteIf => 11,
            JumpForwardIf => 12,
            JumpBackwardIf => 13,
            ChangeType => 14,
            Exit => 15,
            BeginBlock => 16,
            EndBlock => 17,
        };
        FIRST_FIXED_TAG + fixed
    }

    /// Fixed payload bytes after the two byte header and its padding.
    /// The encoder grows the buffer by this and the decoder advances by it.
    pub fn payload_size(self) -> usize {
        use Opcode::*;
        match self {
            Execute(_) => 4,
            Zero | BoolFalse | BoolTrue | Increment | Decrement => 8,
            Copy | BeginBlock => 16,
            Equals | NotEquals => 24,
            JumpAbsolute | JumpForward | JumpBackward => 4,
            JumpAbsoluteIf | JumpForwardIf | JumpBackwardIf => 16,
            ChangeType => 24,
            Exit | EndBlock | Invalid => 0,
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Opcode::Execute(n) => n as usize,
            _ => 0,
        }
    }

    pub fn is_jump(self) -> bool {
        use Opcode::*;
        matches!(self, JumpAbsolute | JumpForward | JumpBackward)
    }

    pub fn is_jump_if(self) -> bool {
        use Opcode::*;
        matches!(self, JumpAbsoluteIf | JumpForwardIf | JumpBackwardIf)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Opcode::*;
        match self {
            Execute(n) => write!(f, "EXECUTE_{}", n),
            Zero => write!(f, "ZERO"),
            BoolFalse => write!(f, "FALSE"),
            BoolTrue => write!(f, "TRUE"),
            Copy => write!(f, "COPY"),
            Increment => write!(f, "INC"),
            Decrement => write!(f, "DEC"),
            Equals => write!(f, "EQ"),
            NotEquals => write!(f, "NOTEQ"),
            JumpAbsolute => write!(f, "JUMP"),
            JumpForward => write!(f, "JUMPFWD"),
            JumpBackward => write!(f, "JUMPBACK"),
            JumpAbsoluteIf => write!(f, "JUMPIF"),
            JumpForwardIf => write!(f, "JUMPFWDIF"),
            JumpBackwardIf => write!(f, "JUMPBACKIF"),
            ChangeType => write!(f, "CHANGETYPE"),
            Exit => write!(f, "EXIT"),
            BeginBlock => write!(f, "BEGIN"),
            EndBlock => write!(f, "END"),
            Invalid => write!(f, "INVALID"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tag_maps_back() {
        for tag in 0..=u8::max_value() {
            let opcode = Opcode::from_u8(tag);
            if opcode != Opcode::Invalid {
                assert_eq!(opcode.to_u8(), tag);
            }
        }
    }

    #[test]
    fn test_execute_tag_is_arity() {
        assert_eq!(Opcode::from_u8(0), Opcode::Execute(0));
        assert_eq!(Opcode::from_u8(64), Opcode::Execute(64));
        assert_eq!(Opcode::Execute(3).arity(), 3);
        assert_eq!(Opcode::from_u8(65), Opcode::Zero);
        assert_eq!(Opcode::from_u8(200), Opcode::Invalid);
    }
}
