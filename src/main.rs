//! wirelab - Main Entry Point
//!
//! One-shot front end over the framework: each invocation loads the
//! configuration, executes a single command and cleans up.

use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::process;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, Level};
use wirelab::observability::{init_logging, init_logging_from_env, LogFormat};
use wirelab::unit::builtin::register_builtins;
use wirelab::{
    Console, ConsoleReporter, Framework, FrameworkConfig, UnitRegistry, WirelabError,
    WirelabResult,
};

/// Pipeline orchestration for wireless security tooling
#[derive(Parser)]
#[command(name = "wirelab")]
#[command(about = "Compose and run wireless security units as pipelines")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "WIRELAB_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered units grouped by technology
    List {
        /// Only show units whose name, type or description contains PATTERN
        pattern: Option<String>,
    },
    /// List configured shortcuts
    Shortcuts { pattern: Option<String> },
    /// Show the parameters of a pipeline
    Args {
        /// Pipe-separated units or shortcuts, e.g. "ble_discover|ble_sniff"
        pipeline: String,
        /// Parameter assignment applied before display
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
    /// Describe every slot of a pipeline
    Info { pipeline: String },
    /// Load, configure and run a pipeline
    Run {
        pipeline: String,
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
    /// Show or change framework settings
    Config {
        key: Option<String>,
        value: Option<String>,
        /// Show every setting
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(FrameworkConfig::default_path);
    let config = match FrameworkConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {e}", config_path.display());
            process::exit(1);
        }
    };

    init_cli_logging(&config.settings.log_level, cli.verbose);
    info!(
        config = %config_path.display(),
        "Starting wirelab v{}",
        env!("CARGO_PKG_VERSION")
    );

    match execute(cli.command, config).await {
        Ok(0) => {}
        Ok(failures) => {
            info!(failures, "Command reported failures");
            process::exit(1);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            process::exit(1);
        }
    }
}

fn init_cli_logging(config_level: &str, verbose: u8) {
    let level = match verbose {
        0 => return init_logging_from_env(config_level),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let format = env::var("LOG_FORMAT").unwrap_or_default();
    let spans = env::var("LOG_SPANS").is_ok_and(|v| v.eq_ignore_ascii_case("true"));
    init_logging(level, LogFormat::parse(&format), spans);
}

fn build_console(config: FrameworkConfig) -> WirelabResult<Console<ConsoleReporter>> {
    let mut registry = UnitRegistry::new();
    register_builtins(&mut registry)?;
    let framework = Framework::new(config, registry)?;
    Ok(Console::new(framework, ConsoleReporter))
}

/// Run one command; returns the number of failures the console reported.
async fn execute(command: Commands, config: FrameworkConfig) -> WirelabResult<usize> {
    let mut console = build_console(config)?;

    match command {
        Commands::List { pattern } => console.list(pattern.as_deref().unwrap_or("")),
        Commands::Shortcuts { pattern } => console.shortcuts(pattern.as_deref().unwrap_or("")),
        Commands::Args { pipeline, set } => {
            let assignments = parse_assignments(&set)?;
            if load_and_set(&mut console, &pipeline, &assignments) {
                console.showargs();
            }
        }
        Commands::Info { pipeline } => {
            console.load(&pipeline);
            if console.failures() == 0 {
                console.info();
            }
        }
        Commands::Run { pipeline, set } => {
            let assignments = parse_assignments(&set)?;
            console = run_interruptible(console, pipeline, assignments).await?;
        }
        Commands::Config { key, value, show } => {
            let key = if show { None } else { key };
            console.config(key.as_deref(), value.as_deref());
        }
    }

    console.exit();
    Ok(console.failures())
}

/// Load `pipeline` and apply every assignment; false once anything failed.
fn load_and_set(
    console: &mut Console<ConsoleReporter>,
    pipeline: &str,
    assignments: &[(String, String)],
) -> bool {
    console.load(pipeline);
    if console.failures() > 0 {
        return false;
    }
    for (name, value) in assignments {
        console.set(name, value);
    }
    console.failures() == 0
}

/// Run on the blocking pool while SIGINT/SIGTERM cancel the in-flight stage.
async fn run_interruptible(
    mut console: Console<ConsoleReporter>,
    pipeline: String,
    assignments: Vec<(String, String)>,
) -> WirelabResult<Console<ConsoleReporter>> {
    let cancel = console.framework().cancel_token();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let mut handle = tokio::task::spawn_blocking(move || {
        if load_and_set(&mut console, &pipeline, &assignments) {
            console.run();
        }
        console
    });

    loop {
        tokio::select! {
            joined = &mut handle => {
                return joined.map_err(|e| WirelabError::internal_error(format!("Run task failed: {e}")));
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, interrupting pipeline");
                cancel.cancel();
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, interrupting pipeline");
                cancel.cancel();
            }
        }
    }
}

/// Split `NAME=VALUE` pairs (pure function)
fn parse_assignments(raw: &[String]) -> WirelabResult<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(WirelabError::invalid_input(format!(
                "expected NAME=VALUE, got '{pair}'"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let parsed = parse_assignments(&[
            "TARGET=AA:BB:CC:DD:EE:FF".to_string(),
            "ble_sniff2.FILTER=a=b".to_string(),
            "EMPTY=".to_string(),
        ])
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                ("TARGET".to_string(), "AA:BB:CC:DD:EE:FF".to_string()),
                ("ble_sniff2.FILTER".to_string(), "a=b".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_parse_assignments_rejects_malformed() {
        for raw in ["TARGET", "=value", " =x"] {
            let result = parse_assignments(&[raw.to_string()]);
            assert!(
                matches!(result, Err(WirelabError::InvalidInput { .. })),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn test_cli_parses_repeated_sets() {
        let cli = Cli::try_parse_from([
            "wirelab", "-vv", "run", "echo|wait", "-s", "wait2.SECONDS=0", "--set", "echo1.A=1",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run { pipeline, set } => {
                assert_eq!(pipeline, "echo|wait");
                assert_eq!(set, vec!["wait2.SECONDS=0", "echo1.A=1"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_config_show() {
        let cli = Cli::try_parse_from(["wirelab", "config", "--show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                key: None,
                value: None,
                show: true
            }
        ));
    }
}
