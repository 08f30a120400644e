use super::Address;

#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    code: ErrorCode,
    instruction: Option<Address>,
    message: &'static str,
}

#[doc(hidden)]
#[macro_export]
macro_rules! error {
    ($err:ident) => {
        $crate::code::Error::new($crate::code::ErrorCode::$err)
    };
    ($err:ident, $instr:expr) => {
        $crate::code::Error::new($crate::code::ErrorCode::$err).in_instruction($instr)
    };
    ($err:ident; $msg:expr) => {
        $crate::code::Error::new($crate::code::ErrorCode::$err).message($msg)
    };
    ($err:ident, $instr:expr; $msg:expr) => {
        $crate::code::Error::new($crate::code::ErrorCode::$err)
            .in_instruction($instr)
            .message($msg)
    };
}

impl Error {
    pub fn new(code: ErrorCode) -> Error {
        Error {
            code,
            instruction: None,
            message: "",
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn instruction(&self) -> Option<Address> {
        self.instruction
    }

    /// Attach the instruction index. Errors raised deep inside memory access
    /// get their instruction from the runtime, so an existing one is kept.
    pub fn in_instruction(self, instruction: Address) -> Error {
        Error {
            instruction: self.instruction.or(Some(instruction)),
            ..self
        }
    }

    pub fn message(self, message: &'static str) -> Error {
        debug_assert_eq!(self.message.len(), 0);
        Error { message, ..self }
    }

    /// Construction and load errors mean the producer and consumer disagree
    /// about the format. They are never expected on a conforming path.
    pub fn is_format_defect(&self) -> bool {
        (self.code as u16) < 100
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Construction
    TooManyOperands = 1,
    InvalidJumpTarget = 2,
    UnbalancedBlock = 3,
    LayoutTooLarge = 4,
    NotAJump = 5,
    InvalidAlignment = 6,
    // Load
    BadMagic = 50,
    UnsupportedVersion = 51,
    TruncatedByteCode = 52,
    ChecksumMismatch = 53,
    InvalidOpcode = 54,
    MalformedEntry = 55,
    // Execution
    EntryNotFound = 100,
    InvalidFunction = 101,
    InvalidRegister = 102,
    ReadOnlyMemory = 103,
    ElementOutOfRange = 104,
    BlockOverflow = 105,
    HostFailure = 106,
    InternalError = 199,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error {{ {} }}", self.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ErrorCode::*;
        let code_str = match self.code {
            TooManyOperands => "TOO MANY OPERANDS",
            InvalidJumpTarget => "INVALID JUMP TARGET",
            UnbalancedBlock => "UNBALANCED BLOCK",
            LayoutTooLarge => "LAYOUT TOO LARGE",
            NotAJump => "NOT A JUMP",
            InvalidAlignment => "INVALID ALIGNMENT",
            BadMagic => "BAD MAGIC",
            UnsupportedVersion => "UNSUPPORTED VERSION",
            TruncatedByteCode => "TRUNCATED BYTE CODE",
            ChecksumMismatch => "CHECKSUM MISMATCH",
            InvalidOpcode => "INVALID OPCODE",
            MalformedEntry => "MALFORMED ENTRY",
            EntryNotFound => "ENTRY NOT FOUND",
            InvalidFunction => "INVALID FUNCTION",
            InvalidRegister => "INVALID REGISTER",
            ReadOnlyMemory => "READ ONLY MEMORY",
            ElementOutOfRange => "ELEMENT OUT OF RANGE",
            BlockOverflow => "BLOCK OVERFLOW",
            HostFailure => "HOST FAILURE",
            InternalError => "INTERNAL ERROR",
        };
        write!(f, "{}", code_str)?;
        if let Some(instruction) = self.instruction {
            write!(f, " IN {}", instruction)?;
        }
        if !self.message.is_empty() {
            write!(f, "; {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}
