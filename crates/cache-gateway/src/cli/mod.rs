pub mod config;
pub mod pid;

use clap::{Parser, Subcommand};

pub use config::ConfigCommand;

/// Self-hosted binary artifact cache server.
#[derive(Debug, Parser)]
#[command(name = "cache-server", version, about)]
pub struct Cli {
    /// Path to the INI config file (defaults to `$CACHE_SERVER_CONFIG` or
    /// `./cache-server.conf`).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the management endpoint: forks a detached child that runs it
    /// and returns as soon as the child is spawned.
    Listen,
    /// Stop the management endpoint.
    Stop,
    /// Internal: runs the management endpoint in the foreground. This is
    /// the detached child `listen` spawns; not meant to be run directly.
    #[command(name = "hidden-start-server", hide = true)]
    HiddenStartServer,
    /// Manage binary caches.
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Manage deployment agents.
    #[command(subcommand)]
    Agent(AgentCommand),
    /// Manage workspaces.
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Inspect and manage store paths.
    #[command(subcommand)]
    StorePath(StorePathCommand),
    /// Inspect the resolved configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Create a new cache: generates a keypair and an empty directory.
    Create {
        name: String,
        port: u16,
        #[arg(short, long, default_value_t = -1)]
        retention: i64,
    },
    /// Start a cache's substituter endpoint in the foreground.
    Start { name: String },
    /// Stop a running cache's substituter endpoint.
    Stop { name: String },
    /// Delete a cache (must not be referenced by a workspace or running).
    Delete { name: String },
    /// Print a cache's descriptor.
    Info { name: String },
    /// Rename or reconfigure a cache.
    Update {
        name: String,
        #[arg(short = 'n', long = "name")]
        new_name: Option<String>,
        #[arg(short = 'a', long)]
        access: Option<String>,
        #[arg(short = 'p', long)]
        port: Option<u16>,
        #[arg(short = 'r', long)]
        retention: Option<i64>,
    },
    /// List caches, optionally filtered by access.
    List {
        #[arg(short = 'p', long, conflicts_with = "public")]
        private: bool,
        #[arg(short = 'P', long)]
        public: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    Add { name: String, workspace: String },
    Remove { name: String },
    Info { name: String },
    List { workspace: String },
}

#[derive(Debug, Subcommand)]
pub enum WorkspaceCommand {
    Create { name: String, cache: String },
    Delete { name: String },
    Info { name: String },
    List,
    /// Point a workspace at a different cache.
    Cache { name: String, cache: String },
}

#[derive(Debug, Subcommand)]
pub enum StorePathCommand {
    List { cache: String },
    Delete { hash: String, cache: String },
    Info { hash: String, cache: String },
}

/// Resolve the config file path from `--config`, `$CACHE_SERVER_CONFIG`, or
/// the default `./cache-server.conf`.
pub fn config_path(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("CACHE_SERVER_CONFIG").ok())
        .unwrap_or_else(|| "cache-server.conf".to_string())
}
