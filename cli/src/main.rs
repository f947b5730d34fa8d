#![deny(clippy::all)]

use anyhow::Context;
use log::info;
use mos65::error::CompilerError;
use mos65::vm::program::Program;
use mos65::vm::{flatten::flatten_and_link, interp::Interpreter, HardwareSpec, ProgramSpec};
use mos65::parse_and_check;
use serde::de::DeserializeOwned;
use std::{fs, path::PathBuf, process};
use structopt::StructOpt;

/// The sub-command to execute.
#[derive(Debug, StructOpt)]
enum Command {
    /// Parse and statically validate a source file, reporting any errors.
    #[structopt(name = "compile")]
    Compile {
        /// Path to the source code file
        #[structopt(parse(from_os_str), long = "source", short = "s")]
        source_path: PathBuf,
    },

    /// Load a flattened VM program and run it to completion.
    #[structopt(name = "run")]
    Run {
        /// Path to the hardware spec file, in JSON format. If not provided, a
        /// default hardware spec is used.
        #[structopt(parse(from_os_str), long = "hardware")]
        hardware_spec_path: Option<PathBuf>,
        /// Path to the program spec (queued input lines) file, in JSON
        /// format. If not provided, a default (empty) program spec is used.
        #[structopt(parse(from_os_str), long = "program")]
        program_spec_path: Option<PathBuf>,
        /// Path to a VM program, in JSON format (a serialized
        /// `mos65::vm::program::Program`; this CLI does not generate one
        /// from source, since the front end and VM are independent
        /// subsystems).
        #[structopt(parse(from_os_str), long = "vm-program")]
        vm_program_path: PathBuf,
        /// Path to a second VM program to run as the periodic timer
        /// handler, in JSON format.
        #[structopt(parse(from_os_str), long = "timer-program")]
        timer_program_path: Option<PathBuf>,
    },
}

/// mos65 executable, for parsing mos65 source and running mos65 VM programs
#[derive(Debug, StructOpt)]
#[structopt(name = "mos65")]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,
}

fn read_file(path: &PathBuf) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file {:?}", path))
}

/// Loads a hardware spec, program spec, or VM program from a file. If the
/// path is `None`, returns the default value instead.
fn load_spec<T: Default + DeserializeOwned>(path_opt: &Option<PathBuf>) -> anyhow::Result<T> {
    match path_opt {
        None => Ok(T::default()),
        Some(path) => {
            let spec_str = read_file(path)?;
            Ok(serde_json::from_str(&spec_str)?)
        }
    }
}

fn load_program(path: &PathBuf) -> anyhow::Result<Program> {
    let program_str = read_file(path)?;
    Ok(serde_json::from_str(&program_str)?)
}

/// Render a `CompilerError`'s inner diagnostics against `source`, one per
/// line, using each error's caret-highlighted rendering.
fn print_compiler_error(err: &CompilerError, source: &str) {
    match err {
        CompilerError::Parse(errors) => {
            for e in errors {
                eprintln!("{}", e.fmt_with_source(source));
            }
        }
        CompilerError::Type(errors) => {
            for e in errors {
                eprintln!("{}", e.fmt_with_source(source));
            }
        }
        CompilerError::Overflow(errors) => {
            for e in errors {
                eprintln!("{}", e.fmt_with_source(source));
            }
        }
        CompilerError::Compile(e) => {
            eprintln!("{}", e.fmt_with_source(source));
        }
    }
}

fn run(opt: Opt) -> anyhow::Result<()> {
    match opt.cmd {
        Command::Compile { source_path } => {
            let source = read_file(&source_path)?;
            match parse_and_check(&source, &source_path.to_string_lossy()) {
                Ok((ast, module)) => {
                    info!("parsed ok, {} top-level children", ast.node(module).children.len());
                    println!("OK");
                }
                Err(err) => {
                    print_compiler_error(&err, &source);
                    return Err(anyhow::anyhow!("compilation failed"));
                }
            }
        }

        Command::Run {
            hardware_spec_path,
            program_spec_path,
            vm_program_path,
            timer_program_path,
        } => {
            let hw_spec: HardwareSpec = load_spec(&hardware_spec_path)?;
            let program_spec: ProgramSpec = load_spec(&program_spec_path)?;

            let program = load_program(&vm_program_path)?;
            let timer_program = timer_program_path
                .as_ref()
                .map(load_program)
                .transpose()?;

            let main_flat = flatten_and_link(&program);
            let timer_flat = timer_program.as_ref().map(flatten_and_link);

            let memory = hw_spec.build_memory();
            let system = program_spec.build_system();

            let mut interp = Interpreter::new(main_flat, timer_flat, memory, system)
                .map_err(|e| anyhow::anyhow!(e))?;
            interp.run().map_err(|e| anyhow::anyhow!(e))?;

            println!(
                "Main stack depth: {}\nTimer stack depth: {}\nProgram completed",
                interp.main_stack_depth(),
                interp.timer_stack_depth(),
            );
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let exit_code = match run(Opt::from_args()) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("{:#}", err);
            1
        }
    };
    process::exit(exit_code);
}
