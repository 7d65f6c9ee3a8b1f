//! Clove CLI.
//!
//! The driver around the core pipeline: evaluate an expression or a file,
//! start a REPL, force a backend, run the differential compare mode, or
//! dump compiled bytecode.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use clove_runtime::{Backend, Limits};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use clove_compiler::{CloveError, Session, config};

#[derive(Parser)]
#[command(name = "clove")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Clove - a Clojure-family language in one binary", long_about = None)]
struct Cli {
    /// Read, evaluate, and print the result of EXPR.
    #[arg(short = 'e', value_name = "EXPR")]
    eval: Option<String>,

    /// Source file to load and evaluate.
    file: Option<PathBuf>,

    /// Run evaluator and VM on the input; exit 3 on divergence.
    #[arg(long)]
    compare: bool,

    /// Compile, print the chunks, and exit.
    #[arg(long)]
    dump_bytecode: bool,

    /// Force a single backend.
    #[arg(long, value_enum, default_value_t = BackendArg::Treewalk)]
    backend: BackendArg,

    /// TOML limits file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter (also honours CLOVE_LOG), e.g. "debug" or "clove_runtime=trace".
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Treewalk,
    Vm,
}

impl From<BackendArg> for Backend {
    fn from(b: BackendArg) -> Backend {
        match b {
            BackendArg::Treewalk => Backend::Treewalk,
            BackendArg::Vm => Backend::Vm,
        }
    }
}

fn init_tracing(filter: Option<&str>) {
    let env_filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_env("CLOVE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "clove", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    init_tracing(cli.log.as_deref());

    let limits = match &cli.config {
        Some(path) => match config::load_limits(path) {
            Ok(l) => l,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::from(2);
            }
        },
        None => Limits::default(),
    };

    let mut session = Session::with_backend(limits, cli.backend.into());

    let source: Option<Result<String, String>> = match (&cli.eval, &cli.file) {
        (Some(expr), _) => Some(Ok(expr.clone())),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .map_err(|e| format!("could not read {}: {}", path.display(), e)),
        ),
        (None, None) => None,
    };

    match source {
        Some(Err(msg)) => {
            eprintln!("error: {}", msg);
            ExitCode::from(2)
        }
        Some(Ok(src)) => run_source(&mut session, &src, &cli),
        None => repl(&mut session),
    }
}

fn run_source(session: &mut Session, src: &str, cli: &Cli) -> ExitCode {
    if cli.dump_bytecode {
        return match session.dump_bytecode_str(src) {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => report(e),
        };
    }
    let result = if cli.compare {
        session.compare_str(src)
    } else {
        session.eval_str(src)
    };
    match result {
        Ok(value) => {
            // Files are load-only; -e prints its result.
            if cli.eval.is_some() {
                println!("{}", session.print_value(value));
            }
            ExitCode::SUCCESS
        }
        Err(e) => report(e),
    }
}

fn report(e: CloveError) -> ExitCode {
    eprintln!("error: {}", e);
    ExitCode::from(e.exit_code() as u8)
}

fn repl(session: &mut Session) -> ExitCode {
    let mut editor = match rustyline::DefaultEditor::new() {
        Ok(ed) => ed,
        Err(e) => {
            eprintln!("error: could not start line editor: {}", e);
            return ExitCode::from(1);
        }
    };
    println!("Clove {} - :quit or ctrl-d to exit", env!("CARGO_PKG_VERSION"));
    loop {
        match editor.readline("clove> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == ":quit" {
                    return ExitCode::SUCCESS;
                }
                let _ = editor.add_history_entry(trimmed);
                match session.eval_str(trimmed) {
                    Ok(v) => println!("{}", session.print_value(v)),
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => return ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::from(1);
            }
        }
    }
}
