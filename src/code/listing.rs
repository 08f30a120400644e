use super::{Address, ByteCode, Error, InstructionArray, Op};

type Result<T> = std::result::Result<T, Error>;

/// ## Disassembly
///
/// One text line per instruction: index, byte offset, opcode and operands.
/// Entry points are reported next to the line they start at so a front end
/// can decorate them.

#[derive(Debug, Clone)]
pub struct Listing<'a> {
    code: &'a ByteCode,
    instructions: InstructionArray,
}

impl<'a> Listing<'a> {
    pub fn new(code: &'a ByteCode) -> Result<Listing<'a>> {
        Ok(Listing {
            code,
            instructions: code.instructions()?,
        })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The text of instruction `index` and the entries that start there.
    pub fn line(&self, index: Address) -> Option<(String, Vec<&'a str>)> {
        let instruction = self.instructions.get(index)?;
        let mut s = format!(
            "{:>5} {:>6}  {}",
            index, instruction.offset, instruction.opcode
        );
        match self.code.op(instruction) {
            Ok(Op::Execute(op)) => {
                let args: Vec<String> = self
                    .code
                    .operands(instruction)
                    .map(|arg| arg.to_string())
                    .collect();
                s.push_str(&format!(" FN#{}({})", op.function, args.join(", ")));
            }
            Ok(Op::Exit) | Ok(Op::EndBlock) => {}
            Ok(op) => s.push_str(&format!(" {}", op)),
            Err(e) => s.push_str(&format!(" ?{}", e)),
        }
        let names = self
            .code
            .entries()
            .iter()
            .filter(|entry| entry.instruction == index)
            .map(|entry| entry.name.as_str())
            .collect();
        Some((s, names))
    }
}

impl<'a> std::fmt::Display for Listing<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for index in 0..self.len() {
            if let Some((line, names)) = self.line(index) {
                for name in names {
                    writeln!(f, "{}:", name)?;
                }
                writeln!(f, "{}", line)?;
            }
        }
        Ok(())
    }
}
