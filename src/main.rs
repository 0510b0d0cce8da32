use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use history_replay::commit::CommitInformation;
use history_replay::config::Config;
use history_replay::engine::PopulationEngine;
use history_replay::error::RegistryError;
use history_replay::lock::BranchLock;
use history_replay::paths::PlatformPaths;
use history_replay::registry::{BranchState, Registry};
use history_replay::source::MemoryRepository;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "history-replay",
    version,
    long_version = env!("HISTORY_REPLAY_BUILD_INFO"),
    about = "Reconstruct git-ready commits from a versioned file repository"
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "HISTORY_REPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log every discovered commit
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one incremental population of a branch from a JSON snapshot
    Replay {
        /// Snapshot exported from the source repository
        #[arg(long)]
        snapshot: PathBuf,

        #[arg(long, default_value = "main")]
        branch: String,

        /// Folder below the snapshot root to walk, slash separated
        #[arg(long, default_value = "")]
        root: String,

        /// Registration store (overrides the configured path)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Print the commit plan as JSON
        #[arg(long)]
        json: bool,

        /// Leave the registration store untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the configuration as TOML
    Config {
        /// Print built-in defaults instead of the effective configuration
        #[arg(long)]
        default: bool,
    },
}

#[derive(Serialize)]
struct Plan<'a> {
    branch: &'a str,
    commits: Vec<&'a CommitInformation>,
    still_missing: Vec<&'a String>,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::new()?);
    };
    let mut config = Config::from_file(path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn replay(
    config: Config,
    snapshot: &Path,
    branch: &str,
    root: &str,
    registry_path: PathBuf,
    json: bool,
    dry_run: bool,
) -> Result<()> {
    let _lock = BranchLock::acquire_blocking(
        &PlatformPaths::lock_dir(),
        &registry_path,
        branch,
        Duration::from_secs(config.registry.lock_timeout_secs),
    )?
    .ok_or_else(|| RegistryError::BranchLocked(branch.to_string()))?;

    let source = MemoryRepository::from_file(snapshot)?;
    let root_folder = source
        .folder_by_path(root)
        .with_context(|| format!("Folder '{}' not found in snapshot", root))?;

    let registry = Registry::load(&registry_path)?;
    let state = registry.branch_state(branch);

    let mut engine = PopulationEngine::from_config(source, registry, &config)?;
    engine.set_initial_path_list(state.known_paths);
    if let Some(time) = state.last_commit_time {
        engine.set_last_commit_time(time);
    }

    engine.file_population(branch, &root_folder)?;

    if json {
        let plan = Plan {
            branch,
            commits: engine.commits().iter().map(|(info, _)| info).collect(),
            still_missing: engine.paths_still_missing().iter().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        for (info, _) in engine.commits().iter() {
            let marker = if info.file_delete { 'D' } else { 'M' };
            match &info.uname {
                Some(author) => println!("{} {} [{}]", marker, info, author),
                None => println!("{} {}", marker, info),
            }
        }
        for path in engine.paths_still_missing() {
            println!("? {}", path);
        }
    }

    if dry_run {
        return Ok(());
    }

    let last = engine.last_commit_time();
    let known_paths = engine.last_files().into_iter().collect();
    let mut registry = engine.into_registry();
    registry.set_branch_state(
        branch,
        BranchState {
            last_commit_time: (last != DateTime::<Utc>::UNIX_EPOCH).then_some(last),
            known_paths,
        },
    );
    registry.save(&registry_path)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Command::Config { default: true } => Config::default(),
        _ => load_config(cli.config.as_deref())?,
    };

    let level = if cli.verbose || config.engine.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Replay {
            snapshot,
            branch,
            root,
            registry,
            json,
            dry_run,
        } => {
            let mut config = config;
            config.engine.verbose |= cli.verbose;
            let registry_path = registry.unwrap_or_else(|| config.registry.path.clone());
            replay(
                config,
                &snapshot,
                &branch,
                &root,
                registry_path,
                json,
                dry_run,
            )
        }
        Command::Config { .. } => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
