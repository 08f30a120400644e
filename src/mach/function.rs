use super::Memory;
use crate::code::{Error, Operand, Operands};
use crate::error;

type Result<T> = std::result::Result<T, Error>;

/// A host callable. It receives the runtime's memory and the operand array
/// of the `Execute` instruction that invoked it.
pub type Function = Box<dyn Fn(&mut dyn Memory, Operands<'_>) -> Result<()> + Send + Sync>;

/// ## Host function table
///
/// `Execute` instructions name functions by index, so the order of
/// registration is part of the contract between compiler and host.
/// Fill the table before any runtime uses it.

#[derive(Default)]
pub struct FunctionTable {
    functions: Vec<(String, Function)>,
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.functions.iter().map(|(n, _)| n.as_str()).collect();
        write!(f, "FunctionTable {:?}", names)
    }
}

impl FunctionTable {
    pub fn new() -> FunctionTable {
        FunctionTable::default()
    }

    /// Table preloaded with the integer built-ins, in this order:
    /// `add sub mul min max less trace`.
    pub fn with_builtins() -> FunctionTable {
        let mut table = FunctionTable::new();
        table.register("add", |m, args| binary(m, args, |a, b| a.wrapping_add(b)));
        table.register("sub", |m, args| binary(m, args, |a, b| a.wrapping_sub(b)));
        table.register("mul", |m, args| binary(m, args, |a, b| a.wrapping_mul(b)));
        table.register("min", |m, args| binary(m, args, std::cmp::min));
        table.register("max", |m, args| binary(m, args, std::cmp::max));
        table.register("less", less);
        table.register("trace", trace);
        table
    }

    pub fn register<F>(&mut self, name: &str, function: F) -> u32
    where
        F: Fn(&mut dyn Memory, Operands<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.functions.push((name.to_string(), Box::new(function)));
        (self.functions.len() - 1) as u32
    }

    pub fn get(&self, index: u32) -> Option<&Function> {
        self.functions.get(index as usize).map(|(_, f)| f)
    }

    pub fn find(&self, name: &str) -> Option<u32> {
        self.functions
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| i as u32)
    }

    pub fn name(&self, index: u32) -> Option<&str> {
        self.functions.get(index as usize).map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn arg(args: &Operands<'_>, index: usize) -> Result<Operand> {
    match args.get(index) {
        Some(operand) => Ok(operand),
        None => Err(error!(HostFailure; "MISSING OPERAND")),
    }
}

/// `out = f(a, b)` over three operands.
fn binary(memory: &mut dyn Memory, args: Operands<'_>, f: fn(i64, i64) -> i64) -> Result<()> {
    let a = memory.read_int(arg(&args, 0)?)?;
    let b = memory.read_int(arg(&args, 1)?)?;
    memory.write_int(arg(&args, 2)?, f(a, b))
}

fn less(memory: &mut dyn Memory, args: Operands<'_>) -> Result<()> {
    let a = memory.read_int(arg(&args, 0)?)?;
    let b = memory.read_int(arg(&args, 1)?)?;
    memory.write_bool(arg(&args, 2)?, a < b)
}

fn trace(memory: &mut dyn Memory, args: Operands<'_>) -> Result<()> {
    for (index, operand) in args.enumerate() {
        let value = memory.read_int(operand)?;
        tracing::info!(index, %operand, value, "trace");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{ByteCode, ErrorCode, Layout, MemoryKind};
    use crate::mach::Registers;

    #[test]
    fn test_builtin_order() {
        let table = FunctionTable::with_builtins();
        assert_eq!(table.find("add"), Some(0));
        assert_eq!(table.find("less"), Some(5));
        assert_eq!(table.name(6), Some("trace"));
        assert_eq!(table.find("cos"), None);
    }

    #[test]
    fn test_builtins_against_registers() {
        let mut regs = Registers::new();
        let a = regs.add(MemoryKind::Work, Layout::new(1, 8, 1));
        let b = regs.add(MemoryKind::Work, Layout::new(1, 8, 1));
        let out = regs.add(MemoryKind::Work, Layout::new(1, 8, 1));
        regs.write_int(a, 6).unwrap();
        regs.write_int(b, 7).unwrap();
        let mut code = ByteCode::new();
        code.add_execute_op(0, &[a, b, out]).unwrap();
        code.add_execute_op(0, &[a]).unwrap();
        let instructions = code.instructions().unwrap();
        let table = FunctionTable::with_builtins();

        let mul = table.get(table.find("mul").unwrap()).unwrap();
        mul(&mut regs, code.operands(&instructions[0])).unwrap();
        assert_eq!(regs.read_int(out), Ok(42));

        let less = table.get(table.find("less").unwrap()).unwrap();
        less(&mut regs, code.operands(&instructions[0])).unwrap();
        assert_eq!(regs.read_bool(out), Ok(true));

        let add = table.get(0).unwrap();
        let e = add(&mut regs, code.operands(&instructions[1])).unwrap_err();
        assert_eq!(e.code(), ErrorCode::HostFailure);
    }
}
