//! Scrap CLI - Command-line interface for Scrap block programs

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Once;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scrap_core::aot::build_executable;
use scrap_core::{ExecError, ExecResult, Executor, Program, ScrapConfig};
use tracing::info;

/// Configuration file picked up from the working directory
const DEFAULT_CONFIG: &str = "scrap.toml";

static TRACING_INIT: Once = Once::new();

#[derive(Parser)]
#[command(name = "scrap")]
#[command(version = scrap_core::VERSION)]
#[command(about = "Compile and run Scrap block programs", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./scrap.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log compiler and runtime activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a program in memory and run it
    Run {
        /// Path to the program file (JSON)
        file: PathBuf,

        /// Seed for the `random` block
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Build a program into a standalone executable
    Build {
        /// Path to the program file (JSON)
        file: PathBuf,

        /// Output executable path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pass -O2 to the C compiler driver
        #[arg(long)]
        release: bool,
    },

    /// Check that a program compiles without running it
    Check {
        /// Path to the program file (JSON)
        file: PathBuf,
    },
}

/// Install the stderr subscriber
///
/// Nothing is installed unless `RUST_LOG` is set or `verbose` is requested.
fn init_tracing(verbose: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if verbose {
            EnvFilter::new("scrap_core=debug,scrap_runtime=debug")
        } else {
            return;
        };
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .with(filter)
            .init();
    });
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { file, seed } => run_program(&file, config, seed),
        Commands::Build {
            file,
            output,
            release,
        } => {
            let mut config = config;
            config.build.optimize |= release;
            build_program(&file, &config, output)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { file } => {
            check_program(&file, config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ScrapConfig> {
    match path {
        Some(path) => ScrapConfig::load(path)
            .with_context(|| format!("Failed to load configuration '{}'", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => ScrapConfig::load(DEFAULT_CONFIG)
            .with_context(|| format!("Failed to load configuration '{}'", DEFAULT_CONFIG)),
        None => {
            let mut config = ScrapConfig::default();
            config.apply_env();
            Ok(config)
        }
    }
}

fn load_program(path: &Path) -> Result<Program> {
    Program::load(path).with_context(|| format!("Failed to load program '{}'", path.display()))
}

/// Compile and run a program on the worker thread, writing to stdout
fn run_program(path: &Path, config: ScrapConfig, seed: Option<u64>) -> Result<ExitCode> {
    let program = load_program(path)?;

    let mut executor = Executor::new(config);
    if let Some(seed) = seed {
        executor = executor.with_seed(seed);
    }
    let compiled = executor
        .compile(&program)
        .map_err(|err| anyhow::anyhow!("Compile error: {}", err.describe()))?;

    let report = executor
        .start(compiled, Box::new(io::stdout()))
        .and_then(|handle| handle.join())
        .map_err(|err| match err {
            ExecError::Compile(err) => anyhow::anyhow!("Compile error: {}", err.describe()),
            other => anyhow::Error::new(other),
        })?;

    info!(
        collections = report.stats.collections,
        memory_used = report.stats.memory_used,
        "run finished"
    );
    match report.result {
        ExecResult::Success => Ok(ExitCode::SUCCESS),
        ExecResult::Failure(message) => {
            eprintln!("Runtime error: {}", message);
            Ok(ExitCode::FAILURE)
        }
        ExecResult::Stopped => {
            eprintln!("Program stopped");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Build a standalone executable next to the program file
fn build_program(path: &Path, config: &ScrapConfig, output: Option<PathBuf>) -> Result<()> {
    let program = load_program(path)?;
    let output = output.unwrap_or_else(|| default_output(path));

    let built = build_executable(&program, &config.build, &output).map_err(|err| match err {
        scrap_core::aot::AotError::Compile(err) => {
            anyhow::anyhow!("Compile error: {}", err.describe())
        }
        other => anyhow::Error::new(other).context("Failed to build executable"),
    })?;

    println!("Built executable: {}", built.display());
    Ok(())
}

/// `dir/name.json` builds to `dir/name`
fn default_output(path: &Path) -> PathBuf {
    let stem = path.file_stem().map_or_else(|| "a.out".into(), |stem| stem.to_os_string());
    path.with_file_name(stem)
}

fn check_program(path: &Path, config: ScrapConfig) -> Result<()> {
    let program = load_program(path)?;
    Executor::new(config)
        .compile(&program)
        .map_err(|err| anyhow::anyhow!("Compile error: {}", err.describe()))?;

    println!("{}: ok", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const HELLO: &str = r#"{
        "chains": [ { "blocks": [
            { "id": "on_start" },
            { "id": "println", "args": [ { "text": "hi" } ] }
        ] } ]
    }"#;

    #[test]
    fn test_run_parses_seed() {
        let cli = Cli::try_parse_from(["scrap", "run", "prog.json", "--seed", "42"]).unwrap();
        match cli.command {
            Commands::Run { file, seed } => {
                assert_eq!(file, PathBuf::from("prog.json"));
                assert_eq!(seed, Some(42));
            }
            _ => panic!("Expected Run command"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_build_flags() {
        let args = ["scrap", "build", "prog.json", "-o", "out/prog", "--release", "-v"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Build { output, release, .. } => {
                assert_eq!(output, Some(PathBuf::from("out/prog")));
                assert!(release);
            }
            _ => panic!("Expected Build command"),
        }
        assert!(cli.verbose);
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["scrap", "check", "prog.json", "--config", "my.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        assert!(matches!(cli.command, Commands::Check { .. }));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["scrap"]).is_err());
    }

    #[test]
    fn test_default_output() {
        assert_eq!(default_output(Path::new("games/snake.json")), PathBuf::from("games/snake"));
        assert_eq!(default_output(Path::new("prog")), PathBuf::from("prog"));
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrap.toml");
        fs::write(&path, "[gc]\nmin_memory = 4096\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.gc.min_memory, 4096);

        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_check_program() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        fs::write(&good, HELLO).unwrap();
        check_program(&good, ScrapConfig::default()).unwrap();

        let bad = dir.path().join("bad.json");
        fs::write(
            &bad,
            r#"{ "chains": [ { "blocks": [ { "id": "on_start" }, { "id": "end" } ] } ] }"#,
        )
        .unwrap();
        let err = check_program(&bad, ScrapConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "Compile error: chain 0, block 1: Control stack underflow");
    }
}
