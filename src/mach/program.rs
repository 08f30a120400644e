use super::Config;
use crate::code::{Address, ByteCode, Error, InstructionArray};
use crate::error;
use std::collections::HashMap;

type Result<T> = std::result::Result<T, Error>;

/// ## Executable program
///
/// Byte code plus everything the runtime derives from it once: the decoded
/// instruction array and the `BeginBlock` to `EndBlock` pairing. Immutable,
/// so one `Arc<Program>` can serve any number of runtimes.

#[derive(Debug)]
pub struct Program {
    code: ByteCode,
    instructions: InstructionArray,
    blocks: HashMap<Address, Address>,
}

impl Program {
    pub fn new(code: ByteCode) -> Result<Program> {
        let (instructions, blocks) = code.finalize()?;
        tracing::debug!(
            instructions = instructions.len(),
            blocks = blocks.len(),
            entries = code.entries().len(),
            "program built"
        );
        Ok(Program {
            code,
            instructions,
            blocks,
        })
    }

    /// Realign to the configured alignment before decoding.
    pub fn with_config(mut code: ByteCode, config: &Config) -> Result<Program> {
        code.align(config.alignment)?;
        Program::new(code)
    }

    pub fn code(&self) -> &ByteCode {
        &self.code
    }

    pub fn instructions(&self) -> &InstructionArray {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Index of the `EndBlock` closing the `BeginBlock` at `begin`.
    pub fn block_end(&self, begin: Address) -> Option<Address> {
        self.blocks.get(&begin).copied()
    }

    pub fn entry(&self, name: &str) -> Result<Address> {
        match self.code.find_entry_index(name) {
            Some(index) => Ok(index),
            None => Err(error!(EntryNotFound)),
        }
    }
}
