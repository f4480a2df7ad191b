//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mailpoll", about = "Poll mail sources into a message index")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/mailpoll/config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll on a schedule until interrupted
    Daemon(DaemonOpts),
    /// Run one poll and print what arrived
    Poll(PollOpts),
    /// List the hook points and when they run
    Hooks,
}

#[derive(clap::Args, Default)]
pub struct DaemonOpts {
    /// Seconds between polls (overrides the config file)
    #[arg(long, env = "MAILPOLL_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,
}

#[derive(clap::Args, Default)]
pub struct PollOpts {
    /// Poll the sources left out of regular polls instead
    #[arg(long)]
    pub unusual: bool,
}

/// Default config path: `$XDG_CONFIG_HOME/mailpoll/config.toml`, falling
/// back to `$HOME/.config/mailpoll/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("mailpoll/config.toml");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/mailpoll/config.toml")
}
