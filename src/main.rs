//! # graphvm
//!
//! Monitor for saved graph byte code.
//!

use clap::Parser;
use graphvm::mach::Config;
use graphvm::term;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "graphvm")]
#[command(about = "List and run saved graph byte code")]
struct Cli {
    /// Byte code file written by `ByteCode::to_bytes`
    file: PathBuf,

    /// Registers allocated in each memory bank
    #[arg(long, default_value = "16")]
    registers: u16,

    /// Instructions executed between checks for Ctrl-C
    #[arg(long, default_value = "5000")]
    cycles: usize,

    /// Payload alignment to lay the byte code out for (0 = packed)
    #[arg(long, default_value = "0")]
    alignment: usize,

    /// Deepest block nesting before a run faults
    #[arg(long, default_value = "64", value_parser = clap::value_parser!(u16).range(1..))]
    max_block_depth: u16,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    let code = match term::load(&cli.file, cli.alignment) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}: {}", cli.file.display(), error);
            std::process::exit(1);
        }
    };
    let options = term::Options {
        registers: cli.registers,
        cycles: cli.cycles.max(1),
        config: Config {
            alignment: cli.alignment,
            max_block_depth: cli.max_block_depth as usize,
        },
    };
    term::main(code, options);
}
