use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// REAM node keeper
/// Pulse-driven cluster membership for a permissioned ledger
#[derive(Parser)]
#[command(name = "ream-nodekeeper")]
#[command(author = "REAM Team")]
#[command(version)]
#[command(about = "REAM node keeper - cluster membership and active-node view management")]
#[command(long_about = "
The node keeper maintains the active node set of a REAM ledger cluster.
Once per pulse it merges the join and leave claims gossiped during that
pulse and promotes the resulting view.

Usage examples:
  ream-nodekeeper keygen --output node.key
  ream-nodekeeper origin-claim --certificate cert.json --key node.key
  ream-nodekeeper run --config keeper.toml --certificate cert.json --pulses 5
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available commands for the node keeper CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Generate an Ed25519 node key
    Keygen {
        /// Where to write the PKCS#8 private key
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Print the signed join claim of the local node as JSON
    OriginClaim {
        /// Keeper configuration (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Node certificate (JSON)
        #[arg(long, value_name = "FILE")]
        certificate: PathBuf,

        /// PKCS#8 node key
        #[arg(short, long, value_name = "FILE")]
        key: PathBuf,
    },

    /// Drive membership rounds for a local node
    Run {
        /// Keeper configuration (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Node certificate (JSON)
        #[arg(long, value_name = "FILE")]
        certificate: PathBuf,

        /// PKCS#8 node key; a fresh key is generated when omitted
        #[arg(short, long, value_name = "FILE")]
        key: Option<PathBuf>,

        /// Number of pulses to run
        #[arg(short, long, default_value = "3")]
        pulses: u32,
    },
}
