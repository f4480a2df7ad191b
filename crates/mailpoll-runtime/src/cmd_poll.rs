//! `mailpoll poll`: one sweep, then a summary on stdout.

use anyhow::Context;
use mailpoll_core::Source;
use mailpoll_engine::PollError;

use crate::cli::PollOpts;
use crate::config::Config;
use crate::services;

pub async fn cmd_poll(config: &Config, opts: &PollOpts) -> anyhow::Result<()> {
    let pipeline = services::build(config)?;
    let manager = pipeline.manager.clone();
    let unusual = opts.unusual;

    let counts = tokio::task::spawn_blocking(move || {
        if unusual {
            manager.poll_unusual()
        } else {
            manager.poll()
        }
    })
    .await
    .map_err(PollError::from)
    .and_then(|polled| polled)
    .context("poll failed")?;

    let Some(counts) = counts else {
        // Fresh manager: nothing else can be polling.
        anyhow::bail!("a poll is already in progress");
    };
    println!("{} new, {} to inbox", counts.num, counts.num_inbox);

    let new_labels = pipeline.labels.new_labels();
    if !new_labels.is_empty() {
        let names: Vec<&str> = new_labels.iter().map(|l| l.as_str()).collect();
        println!("new labels: {}", names.join(", "));
    }

    let broken: Vec<String> = pipeline
        .manager
        .sources()
        .sources()
        .iter()
        .filter(|s| s.error().is_some())
        .map(|s| s.uri().to_string())
        .collect();
    for uri in &broken {
        eprintln!("broken source: {uri}");
    }
    Ok(())
}
