//! gossipd — UDP gossip cluster node.
//!
//! Embeds the gossip engine in a poll(2)-driven event loop and exposes a
//! small stdin command interface for inspecting the cluster and publishing
//! payloads. Run `gossipd --help` for usage.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod node;
mod repl;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let example = config::NodeConfig::default_example();
            print!("{}", toml::to_string_pretty(&example)?);
        }
        Commands::Run { bind, seed } => {
            let mut cfg = if cli.config.exists() {
                config::NodeConfig::load(&cli.config)?
            } else {
                config::NodeConfig::default()
            };
            if let Some(bind) = bind {
                cfg.bind = bind;
            }
            if !seed.is_empty() {
                cfg.seeds = seed;
            }
            node::run(&cfg)?;
        }
    }

    Ok(())
}
