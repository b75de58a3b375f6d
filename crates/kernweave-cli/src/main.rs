//! kernweave - structured kernel source emission
//!
//! Usage:
//!   kernweave emit <unit.json>... [-o DIR]   Emit OpenCL C
//!   kernweave check <unit.json>...           Validate and emit in memory

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, error, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use kernweave_backend_opencl::{emit_unit_to_string, OpenClBackend};
use kernweave_core::ir::{CompilationUnit, UnitSource};
use kernweave_core::pipeline::{Backend, BackendInput, DebugConfig, EmitConfig};
use kernweave_core::CoreError;

#[derive(Parser)]
#[command(name = "kernweave", version)]
#[command(about = "Emit structured OpenCL C from annotated control-flow graphs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Emit one `.cl` file per compilation unit
    Emit {
        /// Compilation unit JSON files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        emit: EmitArgs,

        #[command(flatten)]
        debug: DebugArgs,
    },
    /// Validate and emit every unit without writing anything
    Check {
        /// Compilation unit JSON files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        emit: EmitArgs,
    },
}

#[derive(Args)]
struct EmitArgs {
    /// Drop the header and braces of the outermost loop
    #[arg(long)]
    unwrap_outermost_loop: bool,

    /// Emit a `// BLOCK n` comment at the start of every block
    #[arg(long)]
    trace_blocks: bool,

    /// Spaces per indentation level
    #[arg(long, default_value_t = 2)]
    indent: usize,
}

impl EmitArgs {
    fn config(&self) -> EmitConfig {
        EmitConfig {
            unwrap_outermost_loop: self.unwrap_outermost_loop,
            trace_blocks: self.trace_blocks,
            indent_width: self.indent,
        }
    }
}

#[derive(Args)]
struct DebugArgs {
    /// Dump each annotated graph as JSON to stderr
    #[arg(long)]
    dump_graph: bool,

    /// Only dump methods whose name matches
    #[arg(long)]
    method: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Emit {
            inputs,
            output,
            emit,
            debug,
        } => {
            let debug = DebugConfig {
                dump_graph: debug.dump_graph,
                method_filter: debug.method,
            };
            cmd_emit(&inputs, output.as_deref(), &emit.config(), &debug)
        }
        Command::Check { inputs, emit } => cmd_check(&inputs, &emit.config()),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // Fails only when a logger is already installed.
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}

fn load_unit(path: &Path) -> Result<CompilationUnit> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let unit = UnitSource::from_json(&text)
        .and_then(UnitSource::into_unit)
        .with_context(|| format!("loading {}", path.display()))?;
    debug!("loaded unit `{}` ({} method(s))", unit.name, unit.methods.len());
    Ok(unit)
}

fn dump_graphs(unit: &CompilationUnit, debug: &DebugConfig) -> Result<()> {
    if !debug.dump_graph {
        return Ok(());
    }
    for method in &unit.methods {
        if debug.should_dump(&method.name) {
            let json = serde_json::to_string_pretty(&method.graph)?;
            eprintln!("=== {}::{} ===\n{json}", unit.name, method.name);
        }
    }
    Ok(())
}

/// One-line explanation of a failed unit, pointing at the likely culprit.
fn describe_failure(unit: &str, err: &CoreError) -> String {
    let hint = if err.is_unsupported() {
        "the graph uses a control-flow shape the emitter cannot structure; \
         disable the optimization that produced it"
    } else if matches!(err.root(), CoreError::Structural { .. }) {
        "the graph annotations are inconsistent; this is a compiler bug, please report it"
    } else {
        "emission failed"
    };
    format!("unit `{unit}`: {err}\n  hint: {hint}")
}

fn cmd_emit(
    inputs: &[PathBuf],
    output: Option<&Path>,
    config: &EmitConfig,
    debug: &DebugConfig,
) -> Result<bool> {
    let units = inputs
        .iter()
        .map(|p| load_unit(p))
        .collect::<Result<Vec<_>>>()?;
    for unit in &units {
        dump_graphs(unit, debug)?;
    }

    let Some(output_dir) = output else {
        let mut ok = true;
        for unit in &units {
            match emit_unit_to_string(unit, config) {
                Ok(source) => print!("{source}"),
                Err(e) => {
                    error!("{}", describe_failure(&unit.name, &e));
                    ok = false;
                }
            }
        }
        return Ok(ok);
    };

    let backend = OpenClBackend;
    let report = backend
        .emit(BackendInput {
            units,
            output_dir: output_dir.to_path_buf(),
            config: config.clone(),
        })
        .with_context(|| format!("{} backend", backend.name()))?;
    for path in &report.written {
        println!("{}", path.display());
    }
    for failure in &report.failures {
        error!("{}", describe_failure(&failure.unit, &failure.error));
    }
    Ok(report.is_success())
}

fn cmd_check(inputs: &[PathBuf], config: &EmitConfig) -> Result<bool> {
    let mut ok = true;
    for path in inputs {
        let unit = match load_unit(path) {
            Ok(unit) => unit,
            Err(e) => {
                println!("{}: {e:#}", path.display());
                ok = false;
                continue;
            }
        };
        match emit_unit_to_string(&unit, config) {
            Ok(_) => println!("{}: ok", unit.name),
            Err(e) => {
                println!("{}", describe_failure(&unit.name, &e));
                ok = false;
            }
        }
    }
    Ok(ok)
}
