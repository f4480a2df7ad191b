//! mailpoll: mail source poller binary.
//! Runs the poll pipeline in-process over the spool sources named in the
//! config file.

use clap::Parser;

mod cli;
mod cmd_hooks;
mod cmd_poll;
mod config;
mod daemon;
mod services;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let (config_path, required) = match args.config {
        Some(path) => (path, true),
        None => (cli::default_config_path(), false),
    };

    match args.command {
        cli::Command::Daemon(opts) => {
            init_tracing();
            let config = Config::load(&config_path, required)?;
            let interval = match opts.poll_interval {
                Some(0) => anyhow::bail!("--poll-interval must be at least 1 second"),
                Some(secs) => std::time::Duration::from_secs(secs),
                None => config.poll_interval(),
            };
            daemon::run_daemon(&config, interval).await?;
        }
        cli::Command::Poll(opts) => {
            init_tracing();
            let config = Config::load(&config_path, required)?;
            cmd_poll::cmd_poll(&config, &opts).await?;
        }
        cli::Command::Hooks => cmd_hooks::cmd_hooks(),
    }

    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("MAILPOLL_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}
