use super::bytecode::MAX_ALIGNMENT;
use super::op::{read_u16, read_u32};
use super::{ByteCode, Entry, Error};
use crate::error;
use crc::crc32;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

/// Byte code file magic: "GVBC"
const MAGIC: &[u8; 4] = b"GVBC";

/// Bumped whenever the opcode tags or record sizes change.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 16;

impl ByteCode {
    /// Serialize buffer and entry table.
    ///
    /// `[magic][version u16][alignment u8][reserved u8][crc32 u32][len u32][buffer]`
    /// followed by `[count u32]` and `[name len u16][name][instruction u32]` per entry.
    ///
    /// Fails rather than write a length or index the loader would misread.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let buffer = self.as_bytes();
        let len = fits::<u32>(buffer.len(), error!(TruncatedByteCode; "BUFFER TOO LARGE"))?;
        let count = fits::<u32>(self.entries().len(), error!(MalformedEntry; "TOO MANY ENTRIES"))?;
        let mut out = Vec::with_capacity(HEADER_LEN + buffer.len() + 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.push(self.alignment() as u8);
        out.push(0);
        out.extend_from_slice(&crc32::checksum_ieee(buffer).to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(buffer);
        out.extend_from_slice(&count.to_le_bytes());
        for entry in self.entries() {
            let name = entry.name.as_bytes();
            let name_len = fits::<u16>(name.len(), error!(MalformedEntry; "NAME TOO LONG"))?;
            let instruction = fits::<u32>(
                entry.instruction,
                error!(MalformedEntry; "ENTRY PAST END OF STREAM"),
            )?;
            out.extend_from_slice(&name_len.to_le_bytes());
            out.extend_from_slice(name);
            out.extend_from_slice(&instruction.to_le_bytes());
        }
        Ok(out)
    }

    /// Load byte code, rejecting the whole blob on any defect.
    pub fn from_bytes(bytes: &[u8]) -> Result<ByteCode> {
        let mut reader = Reader { bytes, at: 0 };
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(error!(BadMagic));
        }
        let version = reader.u16()?;
        if version != FORMAT_VERSION {
            return Err(error!(UnsupportedVersion));
        }
        let alignment = reader.take(2)?[0] as usize;
        if alignment > MAX_ALIGNMENT || (alignment != 0 && !alignment.is_power_of_two()) {
            return Err(error!(InvalidAlignment));
        }
        let checksum = reader.u32()?;
        let len = reader.u32()? as usize;
        let buffer = reader.take(len)?;
        if crc32::checksum_ieee(buffer) != checksum {
            return Err(error!(ChecksumMismatch));
        }
        let count = reader.u32()? as usize;
        let mut entries = Vec::with_capacity(count.min(bytes.len()));
        for _ in 0..count {
            let name_len = reader.u16()? as usize;
            let name = match std::str::from_utf8(reader.take(name_len)?) {
                Ok(name) => name.to_string(),
                Err(_) => return Err(error!(MalformedEntry; "NAME IS NOT UTF-8")),
            };
            let instruction = reader.u32()? as usize;
            entries.push(Entry { name, instruction });
        }
        if reader.at != bytes.len() {
            return Err(error!(TruncatedByteCode; "TRAILING BYTES"));
        }
        let code = ByteCode::from_parts(buffer.to_vec(), alignment, entries)?;
        code.finalize()?;
        tracing::debug!(
            version,
            alignment,
            instructions = code.num_instructions(),
            "byte code loaded"
        );
        Ok(code)
    }

    /// Load and re-run the alignment pass if the stored alignment differs
    /// from the one this runtime prefers.
    pub fn from_bytes_aligned(bytes: &[u8], alignment: usize) -> Result<ByteCode> {
        let mut code = ByteCode::from_bytes(bytes)?;
        code.align(alignment)?;
        Ok(code)
    }
}

fn fits<T: TryFrom<usize>>(value: usize, error: Error) -> Result<T> {
    match T::try_from(value) {
        Ok(value) => Ok(value),
        Err(_) => Err(error),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = match self.at.checked_add(len) {
            Some(end) if end <= self.bytes.len() => end,
            _ => return Err(error!(TruncatedByteCode)),
        };
        let slice = &self.bytes[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(read_u16(self.take(2)?, 0))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(read_u32(self.take(4)?, 0))
    }
}

impl TryFrom<&[u8]> for ByteCode {
    type Error = Error;
    fn try_from(bytes: &[u8]) -> Result<ByteCode> {
        ByteCode::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{ErrorCode, Operand};

    fn sample() -> ByteCode {
        let mut code = ByteCode::new();
        code.add_zero_op(Operand::work(0));
        code.add_increment_op(Operand::work(0));
        code.add_exit_op();
        code.add_entry("main", 0);
        code.add_entry("bump", 1);
        code
    }

    #[test]
    fn test_load_what_was_saved() {
        let code = sample();
        let loaded = ByteCode::from_bytes(&code.to_bytes().unwrap()).unwrap();
        assert_eq!(loaded, code);
        assert_eq!(loaded.find_entry_index("bump"), Some(1));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        assert_eq!(ByteCode::from_bytes(&bytes).unwrap_err().code(), ErrorCode::BadMagic);
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = 9;
        assert_eq!(
            ByteCode::from_bytes(&bytes).unwrap_err().code(),
            ErrorCode::UnsupportedVersion
        );
    }

    #[test]
    fn test_every_truncation_rejected() {
        let bytes = sample().to_bytes().unwrap();
        for len in 0..bytes.len() {
            assert!(ByteCode::from_bytes(&bytes[..len]).is_err(), "len {}", len);
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.push(0);
        assert_eq!(
            ByteCode::from_bytes(&bytes).unwrap_err().code(),
            ErrorCode::TruncatedByteCode
        );
    }

    #[test]
    fn test_corrupt_buffer_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[HEADER_LEN + 3] ^= 0xff;
        assert_eq!(
            ByteCode::from_bytes(&bytes).unwrap_err().code(),
            ErrorCode::ChecksumMismatch
        );
    }

    #[test]
    fn test_long_entry_name_refused_on_save() {
        let mut code = sample();
        let name = "n".repeat(u16::max_value() as usize + 4);
        code.add_entry(&name, 0);
        let e = code.to_bytes().unwrap_err();
        assert_eq!(e.code(), ErrorCode::MalformedEntry);
        assert_eq!(e.to_string(), "MALFORMED ENTRY; NAME TOO LONG");
    }

    #[test]
    fn test_longest_entry_name_round_trips() {
        let mut code = sample();
        let name = "n".repeat(u16::max_value() as usize);
        code.add_entry(&name, 2);
        let loaded = ByteCode::from_bytes(&code.to_bytes().unwrap()).unwrap();
        assert_eq!(loaded.find_entry_index(&name), Some(2));
    }

    #[test]
    fn test_entry_out_of_range() {
        let mut code = sample();
        code.add_entry("far", 99);
        assert_eq!(
            ByteCode::from_bytes(&code.to_bytes().unwrap()).unwrap_err().code(),
            ErrorCode::MalformedEntry
        );
    }

    #[test]
    fn test_realign_on_load() {
        let bytes = sample().to_bytes().unwrap();
        let code = ByteCode::from_bytes_aligned(&bytes, 4).unwrap();
        assert_eq!(code.alignment(), 4);
        let again = ByteCode::from_bytes(&code.to_bytes().unwrap()).unwrap();
        assert_eq!(again.alignment(), 4);
        assert_eq!(again.instructions().unwrap().len(), 3);
    }
}
