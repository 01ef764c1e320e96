//! CLI definitions for gossipd.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
    name = "gossipd",
    version,
    about = "UDP gossip cluster node\n\nJoin a peer-to-peer cluster, watch the membership converge, and broadcast payloads that spread epidemically to every reachable node.",
    long_about = None
)]
pub struct Cli {
    /// Path to node.toml config file
    #[clap(long, short, default_value = "node.toml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a cluster node (Ctrl-C or `quit` to stop)
    Run {
        /// Bind and advertise address, e.g. 192.168.1.10:6500. Don't use
        /// localhost or 0.0.0.0 in a real cluster — peers dial this address.
        #[clap(long)]
        bind: Option<String>,

        /// Seed node address (repeatable). With no seeds this node starts
        /// the cluster.
        #[clap(long)]
        seed: Vec<String>,
    },

    /// Print an example node.toml to stdout
    Init,
}
