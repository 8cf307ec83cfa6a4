use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser as ClapParser, Subcommand};
use t86::{Cpu, NullStatsSink, Parser, ReaderSource, RuntimeFault, StatsSink, TickOutcome, TracingStatsSink, WriterSink};

const DEFAULT_RAM_WORDS: usize = 1 << 16;

/// T86 didactic assembly virtual machine.
#[derive(ClapParser, Debug)]
#[command(name = "t86-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parses `file` as T86 assembly and runs it on the VM
    Run {
        /// T86 assembly source file to run
        file: PathBuf,

        /// Enable per-tick statistics logging
        #[arg(long)]
        stats: bool,

        /// Number of 64-bit words RAM is sized to
        #[arg(long, default_value_t = DEFAULT_RAM_WORDS)]
        ram_words: usize,

        /// Read GETCHAR input from this file instead of stdin
        #[arg(long)]
        stdin_file: Option<PathBuf>,
    },
}

#[derive(Debug)]
enum IoErrorContext {
    OpenInput,
    OpenStdinFile,
}

#[derive(Debug)]
enum CliError {
    Io(std::io::Error, IoErrorContext, PathBuf),
    Parse(t86::ParseError),
    Runtime(RuntimeFault),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(err, context, path) => write!(
                f,
                "{} \"{}\" failed: {}",
                match context {
                    IoErrorContext::OpenInput => "opening input file",
                    IoErrorContext::OpenStdinFile => "opening stdin file",
                },
                path.display(),
                err
            ),
            CliError::Parse(err) => write!(f, "parse error {}", err),
            CliError::Runtime(err) => write!(f, "runtime fault: {}", err),
        }
    }
}

/// Exit codes per spec §6: 0 success, 1 usage error, 2 parse error, 3 file
/// open error, non-zero (here 4) on runtime fault.
fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap's own formatted usage/help text, not one of `CliError`'s variants.
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(&cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ CliError::Io(..)) => {
            eprintln!("{}", err);
            ExitCode::from(3)
        }
        Err(err @ CliError::Parse(_)) => {
            eprintln!("{}", err);
            ExitCode::from(2)
        }
        Err(err @ CliError::Runtime(_)) => {
            eprintln!("{}", err);
            ExitCode::from(4)
        }
    }
}

fn run(command: &Command) -> Result<(), CliError> {
    let Command::Run {
        file,
        stats,
        ram_words,
        stdin_file,
    } = command;

    let source = read_source(file)?;
    let program = Parser::new(&source)
        .and_then(|mut p| p.parse())
        .map_err(CliError::Parse)?;

    let stdin: Box<dyn t86::ByteSource> = match stdin_file {
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| CliError::Io(err, IoErrorContext::OpenStdinFile, path.clone()))?;
            Box::new(ReaderSource(BufReader::new(file)))
        }
        None => Box::new(ReaderSource(io::stdin())),
    };
    let stdout = WriterSink(io::stdout());

    if *stats {
        run_cpu(*ram_words, stdin, stdout, TracingStatsSink, program)
    } else {
        run_cpu(*ram_words, stdin, stdout, NullStatsSink, program)
    }
    .map_err(CliError::Runtime)?;

    Ok(())
}

fn run_cpu<T: StatsSink>(
    ram_words: usize,
    stdin: Box<dyn t86::ByteSource>,
    stdout: WriterSink<io::Stdout>,
    stats: T,
    program: t86::Program,
) -> Result<(), RuntimeFault> {
    let mut cpu = Cpu::new(ram_words, stdin, stdout, stats);
    cpu.start(program);
    while !cpu.halted() {
        match cpu.tick() {
            Ok(TickOutcome::Running) | Ok(TickOutcome::Halted) => {}
            Err(fault) => return Err(fault),
        }
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String, CliError> {
    let file =
        File::open(path).map_err(|err| CliError::Io(err, IoErrorContext::OpenInput, path.to_owned()))?;
    let mut reader = BufReader::new(file);
    let mut source = String::new();
    reader
        .read_to_string(&mut source)
        .map_err(|err| CliError::Io(err, IoErrorContext::OpenInput, path.to_owned()))?;
    Ok(source)
}
