//! Command-line interface for strictly_p2p.

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// Strictly P2P - tic-tac-toe against a peer over a direct TCP link
///
/// Start the same command on both machines, each pointing at the other.
/// The peers work out who listens and who dials on their own.
#[derive(Parser, Debug)]
#[command(name = "strictly_p2p")]
#[command(about = "Peer-to-peer tic-tac-toe over TCP", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Address of the other peer
    pub peer_address: String,

    /// Port both peers agree on (>= 5000)
    #[arg(value_parser = clap::value_parser!(u16).range(5000..))]
    pub port: u16,

    /// TOML file with rendezvous tuning
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Local IP to listen on
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Milliseconds to wait for the peer per attempt
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Give up after this many rendezvous attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,
}
