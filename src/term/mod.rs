extern crate ansi_term;
extern crate ctrlc;
extern crate linefeed;
use crate::code::{ByteCode, Element, Layout, Listing, MemoryKind, Operand};
use crate::mach::{Config, Event, FunctionTable, Memory, Program, Registers, Runtime, State};
use ansi_term::Style;
use linefeed::{Completer, Completion, Interface, Prompter, ReadResult, Terminal};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bytes behind each monitor register, so `ChangeType` has room to grow.
const REGISTER_CAPACITY: usize = 64;

/// Monitor settings from the command line.
#[derive(Debug, Clone)]
pub struct Options {
    /// Registers allocated in each memory bank.
    pub registers: u16,
    /// Instructions executed between checks for Ctrl-C.
    pub cycles: usize,
    pub config: Config,
}

/// Read and validate a saved byte code file.
pub fn load(path: &Path, alignment: usize) -> Result<ByteCode, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let code = ByteCode::from_bytes_aligned(&bytes, alignment)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "loaded");
    Ok(code)
}

pub fn main(code: ByteCode, options: Options) {
    let interrupted = Arc::new(AtomicBool::new(false));
    let int_moved = interrupted.clone();
    if let Err(error) = ctrlc::set_handler(move || {
        int_moved.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(%error, "Ctrl-C handler not installed");
    }
    if let Err(error) = main_loop(code, options, interrupted) {
        eprintln!("{}", error);
    }
}

fn main_loop(code: ByteCode, options: Options, interrupted: Arc<AtomicBool>) -> std::io::Result<()> {
    let program = match Program::new(code) {
        Ok(program) => Arc::new(program),
        Err(error) => {
            eprintln!("{}", Style::new().bold().paint(error.to_string()));
            return Ok(());
        }
    };
    let functions = Arc::new(FunctionTable::with_builtins());
    let memory = registers(options.registers);
    let mut runtime = Runtime::with_config(program.clone(), functions, memory, &options.config);

    let command = Interface::new("graphvm")?;
    command.set_prompt("> ")?;
    command.set_completer(Arc::new(EntryCompleter::new(program.code())));
    let mut running = false;

    loop {
        if interrupted.load(Ordering::SeqCst) {
            runtime.interrupt();
            interrupted.store(false, Ordering::SeqCst);
        };
        if !running {
            let string = match command.read_line()? {
                ReadResult::Input(string) => string,
                ReadResult::Signal(_) | ReadResult::Eof => break,
            };
            match enter(&string, &mut runtime) {
                Reply::Quit => break,
                Reply::Run => running = true,
                Reply::Text(s) => command.write_fmt(format_args!("{}", s))?,
                Reply::Error(s) => {
                    command.write_fmt(format_args!("{}\n", Style::new().bold().paint(s)))?
                }
            }
            if !string.trim().is_empty() {
                command.add_history_unique(string);
            }
            continue;
        }
        match runtime.execute(options.cycles) {
            Event::Running => {}
            Event::Stopped => running = false,
            Event::Exited => {
                running = false;
                command.write_fmt(format_args!("EXITED IN {}\n", runtime.pc()))?;
            }
            Event::Interrupted(pc) => {
                running = false;
                command.write_fmt(format_args!("INTERRUPTED IN {}\n", pc))?;
            }
            Event::HostError(error) | Event::Faulted(error) => {
                running = false;
                command.write_fmt(format_args!(
                    "{}\n",
                    Style::new().bold().paint(error.to_string())
                ))?;
            }
        }
    }
    Ok(())
}

/// Work, literal and external banks of 64-bit integers.
fn registers(count: u16) -> Registers {
    let mut regs = Registers::new();
    let layout = Layout::new(0, 8, 1);
    for kind in &[MemoryKind::Work, MemoryKind::Literal, MemoryKind::External] {
        for _ in 0..count {
            regs.add_with_capacity(*kind, layout, REGISTER_CAPACITY);
        }
    }
    regs
}

enum Reply {
    Quit,
    Run,
    Text(String),
    Error(String),
}

fn enter(line: &str, runtime: &mut Runtime<Registers>) -> Reply {
    let mut words = line.split_whitespace();
    let verb = match words.next() {
        Some(verb) => verb.to_ascii_uppercase(),
        None => return Reply::Text(String::new()),
    };
    let args: Vec<&str> = words.collect();
    match verb.as_str() {
        "QUIT" | "EXIT" => Reply::Quit,
        "LIST" => list(runtime.program().code(), &args),
        "ENTRIES" => {
            let mut s = String::new();
            for entry in runtime.program().code().entries() {
                s.push_str(&format!("{:>5}  {}\n", entry.instruction, entry.name));
            }
            Reply::Text(s)
        }
        "RUN" => match args.first() {
            Some(name) => match runtime.start(name) {
                Ok(()) => Reply::Run,
                Err(error) => Reply::Error(error.to_string()),
            },
            None => Reply::Error("RUN WHICH ENTRY?".to_string()),
        },
        "CONT" => {
            if runtime.state() == State::Running {
                Reply::Run
            } else {
                Reply::Error("CAN'T CONTINUE".to_string())
            }
        }
        "REGS" => Reply::Text(dump(runtime.memory())),
        "SET" => set(runtime.memory_mut(), &args),
        _ => Reply::Error("UNKNOWN COMMAND".to_string()),
    }
}

/// `LIST [from [to]]` over instruction indices.
fn list(code: &ByteCode, args: &[&str]) -> Reply {
    let listing = match Listing::new(code) {
        Ok(listing) => listing,
        Err(error) => return Reply::Error(error.to_string()),
    };
    let mut bounds = [0, listing.len()];
    for (bound, arg) in bounds.iter_mut().zip(args) {
        match arg.parse::<usize>() {
            Ok(n) => *bound = n,
            Err(_) => return Reply::Error("BAD INSTRUCTION NUMBER".to_string()),
        }
    }
    if args.len() == 1 {
        bounds[1] = bounds[0] + 1;
    }
    let label = Style::new().bold();
    let mut s = String::new();
    for index in bounds[0]..bounds[1].min(listing.len()) {
        if let Some((line, names)) = listing.line(index) {
            for name in names {
                s.push_str(&format!("{}\n", label.paint(format!("{}:", name))));
            }
            s.push_str(&line);
            s.push('\n');
        }
    }
    Reply::Text(s)
}

fn dump(memory: &Registers) -> String {
    let mut s = String::new();
    for kind in &[MemoryKind::Work, MemoryKind::Literal, MemoryKind::External] {
        for register in 0..memory.len(*kind) {
            let operand = Operand {
                memory: *kind,
                register: register as u16,
                element: Element::Whole,
            };
            let layout = match memory.layout(operand) {
                Ok(layout) => layout,
                Err(_) => continue,
            };
            let room = match memory.capacity(operand) {
                Ok(capacity) => capacity / (layout.element_size.max(1) as usize),
                Err(_) => 0,
            };
            let count = layout
                .elements()
                .unwrap_or(usize::max_value())
                .max(1)
                .min(room.max(1))
                .min(u32::max_value() as usize) as u32;
            let values: Vec<String> = (0..count)
                .map(|i| match memory.read_int(operand.at(i)) {
                    Ok(value) => value.to_string(),
                    Err(_) => "?".to_string(),
                })
                .collect();
            s.push_str(&format!("{:<6} {}\n", operand.to_string(), values.join(" ")));
        }
    }
    s
}

/// `SET operand value` stores an integer, literals included.
fn set(memory: &mut Registers, args: &[&str]) -> Reply {
    let (operand, value) = match args {
        [operand, value] => (parse_operand(operand), value.parse::<i64>()),
        _ => return Reply::Error("SET OPERAND VALUE".to_string()),
    };
    match (operand, value) {
        (Some(operand), Ok(value)) => match memory.set_int(operand, value) {
            Ok(()) => Reply::Text(String::new()),
            Err(error) => Reply::Error(error.to_string()),
        },
        _ => Reply::Error("SET OPERAND VALUE".to_string()),
    }
}

/// `R3`, `L0` or `X12`.
fn parse_operand(s: &str) -> Option<Operand> {
    let mut chars = s.chars();
    let kind = match chars.next()?.to_ascii_uppercase() {
        'R' => MemoryKind::Work,
        'L' => MemoryKind::Literal,
        'X' => MemoryKind::External,
        _ => return None,
    };
    let register = chars.as_str().parse::<u16>().ok()?;
    Some(Operand {
        memory: kind,
        register,
        element: Element::Whole,
    })
}

struct EntryCompleter {
    names: Vec<String>,
}

impl EntryCompleter {
    fn new(code: &ByteCode) -> EntryCompleter {
        EntryCompleter {
            names: code.entries().iter().map(|e| e.name.clone()).collect(),
        }
    }
}

impl<Term: Terminal> Completer<Term> for EntryCompleter {
    fn complete(
        &self,
        word: &str,
        prompter: &Prompter<Term>,
        start: usize,
        _end: usize,
    ) -> Option<Vec<Completion>> {
        let verb = prompter.buffer()[..start].trim().to_ascii_uppercase();
        if verb != "RUN" {
            return None;
        }
        let completions: Vec<Completion> = self
            .names
            .iter()
            .filter(|name| name.starts_with(word))
            .map(|name| Completion::simple(name.clone()))
            .collect();
        if completions.is_empty() {
            None
        } else {
            Some(completions)
        }
    }
}
