use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use log::debug;

use lazy_debugger::config::{BreakpointSpec, LaunchConfig};
use lazy_debugger::console::ConsolePrompt;
use lazy_debugger::{DebuggerCommand, Error, Interpreter, Result};

#[derive(Parser, Debug)]
#[command(name = "lazydbg", version, about = "Run a script under the statement-level debugger")]
struct Cli {
    /// Script to run. Overrides `program` from the launch configuration.
    program: Option<PathBuf>,

    /// Launch configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Breakpoint as FILE:LINE; repeatable.
    #[arg(short = 'b', long = "breakpoint", value_name = "FILE:LINE")]
    breakpoints: Vec<String>,

    #[arg(long)]
    stop_on_entry: bool,

    /// Run without the debugger.
    #[arg(long)]
    no_debug: bool,

    /// Compilation level restored when the debugger is disabled.
    #[arg(long, value_name = "LEVEL")]
    jit: Option<u32>,

    /// Log filter, e.g. `debug` or `lazy_debugger=trace`. Defaults to RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if let Some(filters) = &cli.log_level {
        logger.parse_filters(filters);
    }
    logger.init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("lazydbg: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn launch_config(cli: &Cli) -> Result<LaunchConfig> {
    let mut config = match &cli.config {
        Some(path) => LaunchConfig::load(path)?,
        None => LaunchConfig::default(),
    };

    if let Some(program) = &cli.program {
        config.program = Some(program.display().to_string());
    }
    if cli.stop_on_entry {
        config.stop_on_entry = true;
    }
    if cli.jit.is_some() {
        config.jit_level = cli.jit;
    }
    for spec in &cli.breakpoints {
        match BreakpointSpec::parse(spec) {
            Some(breakpoint) => config.breakpoints.push(breakpoint),
            None => eprintln!("Ignoring malformed breakpoint '{}'", spec),
        }
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = launch_config(&cli)?;
    let Some(program) = config.program.clone() else {
        return Err(Error::Runtime(lazy_debugger::error::RuntimeError::new(
            "no program given",
        )));
    };
    let text = fs::read_to_string(&program).map_err(|source| Error::Io {
        path: PathBuf::from(&program),
        source,
    })?;
    debug!("launching {} with {:?}", program, config);

    let mut interp = Interpreter::new();
    if let Some(level) = config.jit_level {
        interp.compiler_enable_jit(level);
    }
    let stdin = io::stdin();
    interp.set_prompt_handler(Rc::new(ConsolePrompt::new(stdin.lock(), io::stderr())));
    if !cli.no_debug {
        interp.enable_debugger();
    }

    interp.load_source(&program, &text)?;
    config.apply_breakpoints(&mut interp);
    if config.stop_on_entry {
        interp.set_command(DebuggerCommand::StepInto);
    }

    match interp.run_source(&program) {
        Ok(_) => Ok(()),
        Err(err @ Error::Runtime(_)) => {
            for frame in interp.last_error_stack().iter().rev() {
                eprintln!("  at {}:{} {}", frame.file, frame.line, frame.function_name);
            }
            Err(err)
        }
        Err(err) => Err(err),
    }
}
