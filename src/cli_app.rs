//! Top-level CLI definition and dispatch.

use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use flate2::read::GzDecoder;
use serde_json::{Value, json};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use znode_restore::core::config::Config;
use znode_restore::core::errors::ZnrError;
use znode_restore::core::paths::ROOT;
use znode_restore::logger::jsonl::{JsonlConfig, JsonlWriter};
use znode_restore::restore::engine::{RestoreEngine, RestoreStats};
use znode_restore::store::dir::DirStore;
use znode_restore::store::memory::MemoryStore;

/// znode restore: replays a path-keyed JSON snapshot into a node store.
#[derive(Debug, Parser)]
#[command(
    name = "znr",
    author,
    version,
    about = "Restore a znode tree from a JSON snapshot",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Restore nodes from a snapshot.
    Restore(RestoreArgs),
    /// Inspect the effective configuration.
    Config(ConfigArgs),
    /// Generate shell completion scripts.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RestoreArgs {
    /// Snapshot file to read (`-` for stdin).
    #[arg(short = 'f', long, value_name = "FILE")]
    input: Option<PathBuf>,
    /// Input is gzip-compressed.
    #[arg(short = 'z', long)]
    compress: bool,
    /// Only restore nodes at or below this path.
    #[arg(long, value_name = "PATH")]
    root_path: Option<String>,
    /// Replace data and ACLs of nodes that already exist.
    #[arg(long)]
    overwrite_existing: bool,
    /// Create nodes with the open ACL instead of the recorded ones.
    #[arg(long)]
    no_acls: bool,
    /// Only restore paths fully matching one of these regexes.
    #[arg(long, value_name = "REGEX")]
    include: Vec<String>,
    /// Skip paths fully matching any of these regexes.
    #[arg(long, value_name = "REGEX")]
    exclude: Vec<String>,
    /// Mirror the restored tree into this directory.
    #[arg(long, value_name = "DIR", conflicts_with = "dry_run")]
    target_dir: Option<PathBuf>,
    /// Restore into an in-memory store and report what would be written.
    #[arg(long)]
    dry_run: bool,
    /// Digest auth user.
    #[arg(long, requires = "password")]
    user: Option<String>,
    /// Digest auth password.
    #[arg(long, requires = "user")]
    password: Option<String>,
    /// Append per-node activity to this JSONL file.
    #[arg(long, value_name = "PATH")]
    activity_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Snapshot, store, or environment failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<ZnrError> for CliError {
    fn from(err: ZnrError) -> Self {
        match err {
            ZnrError::InvalidConfig { .. }
            | ZnrError::MissingConfig { .. }
            | ZnrError::ConfigParse { .. } => Self::User(err.to_string()),
            ZnrError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Restore(args) => run_restore(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── restore ────────────────────

fn run_restore(cli: &Cli, args: &RestoreArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let result = execute_restore(cli, args);

    match (&result, mode) {
        (Ok(report), OutputMode::Human) => print_restore_human(report),
        (Ok(report), OutputMode::Json) => {
            let payload = json!({
                "command": "restore",
                "status": "ok",
                "target": report.target,
                "dry_run": report.dry_run,
                "nodes_in_store": report.nodes_in_store,
                "stats": serde_json::to_value(&report.stats)?,
            });
            write_json_line(&payload)?;
        }
        (Err(err), OutputMode::Json) => {
            let payload = json!({
                "command": "restore",
                "status": "error",
                "exit_code": err.exit_code(),
                "error": err.to_string(),
            });
            write_json_line(&payload)?;
        }
        (Err(_), OutputMode::Human) => {}
    }

    result.map(|_| ())
}

#[derive(Debug)]
struct RestoreReport {
    target: String,
    dry_run: bool,
    nodes_in_store: Option<usize>,
    stats: RestoreStats,
}

fn execute_restore(cli: &Cli, args: &RestoreArgs) -> Result<RestoreReport, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    apply_restore_args(&mut config, args);
    config.normalize();
    config.validate()?;

    init_tracing(cli, &config.logging.level);

    let hash = config.stable_hash()?;
    let mut engine = RestoreEngine::new(&config.restore)?.with_config_hash(hash);
    if let Some(path) = &config.logging.activity_log {
        engine = engine.with_activity_log(JsonlWriter::open(JsonlConfig::new(path)));
    }

    let reader = open_input(&config.input.path, config.input.compress)?;
    let credentials = config.auth.credentials();

    if args.dry_run {
        let mut store = MemoryStore::new();
        let stats = engine.run(reader, &mut store, credentials.as_ref())?;
        return Ok(RestoreReport {
            target: "memory".to_string(),
            dry_run: true,
            nodes_in_store: Some(store.len()),
            stats,
        });
    }

    let Some(target_dir) = config.store.target_dir.clone() else {
        return Err(CliError::User(
            "no target store: pass --target-dir DIR or --dry-run".to_string(),
        ));
    };
    let mut store = DirStore::open(&target_dir)
        .map_err(|err| CliError::from(ZnrError::store("open", ROOT, err)))?;
    let stats = engine.run(reader, &mut store, credentials.as_ref())?;
    Ok(RestoreReport {
        target: target_dir.display().to_string(),
        dry_run: false,
        nodes_in_store: None,
        stats,
    })
}

fn apply_restore_args(config: &mut Config, args: &RestoreArgs) {
    if let Some(input) = &args.input {
        config.input.path.clone_from(input);
    }
    config.input.compress |= args.compress;
    if let Some(root) = &args.root_path {
        config.restore.root_path.clone_from(root);
    }
    config.restore.overwrite_existing |= args.overwrite_existing;
    config.restore.no_acls |= args.no_acls;
    if !args.include.is_empty() {
        config.restore.include.clone_from(&args.include);
    }
    if !args.exclude.is_empty() {
        config.restore.exclude.clone_from(&args.exclude);
    }
    if let Some(dir) = &args.target_dir {
        config.store.target_dir = Some(dir.clone());
    }
    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        config.auth.user = Some(user.clone());
        config.auth.password = Some(password.clone());
    }
    if let Some(path) = &args.activity_log {
        config.logging.activity_log = Some(path.clone());
    }
}

fn open_input(path: &Path, compress: bool) -> Result<Box<dyn BufRead>, CliError> {
    let raw: Box<dyn Read> = if path.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(path).map_err(|source| ZnrError::io(path, source))?;
        Box::new(file)
    };

    if compress {
        Ok(Box::new(BufReader::new(GzDecoder::new(raw))))
    } else {
        Ok(Box::new(BufReader::new(raw)))
    }
}

fn init_tracing(cli: &Cli, configured_level: &str) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        configured_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!cli.no_color && io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn print_restore_human(report: &RestoreReport) {
    let stats = &report.stats;
    let heading = if report.dry_run {
        "Dry run complete".yellow().bold()
    } else {
        "Restore complete".green().bold()
    };
    println!("{heading} ({})", report.target);
    println!("  Records read:        {}", stats.records);
    println!("  Created:             {}", stats.created);
    println!("  Overwritten:         {}", stats.overwritten);
    println!("  Placeholders filled: {}", stats.placeholders_filled);
    if stats.conflicts_skipped > 0 {
        println!(
            "  Existing, skipped:   {}",
            stats.conflicts_skipped.to_string().yellow()
        );
    } else {
        println!("  Existing, skipped:   0");
    }
    println!(
        "  Filtered:            {} (ephemeral {}, outside root {}, excluded {}, not included {})",
        stats.skipped(),
        stats.skipped_ephemeral,
        stats.skipped_outside_root,
        stats.skipped_excluded,
        stats.skipped_not_included,
    );
    println!("  Paths materialized:  {}", stats.paths_materialized);
    if stats.races_tolerated > 0 {
        println!("  Create races:        {}", stats.races_tolerated);
    }
    println!("  Max depth:           {}", stats.max_depth);
    if let Some(count) = report.nodes_in_store {
        println!("  Nodes in store:      {count}");
    }
    println!("  Elapsed:             {} ms", stats.elapsed_ms);
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?.redacted();

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                let source = config
                    .source
                    .as_deref()
                    .map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string());

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {source}");
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": source,
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("ZNR_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
