//! Strictly P2P - play tic-tac-toe against a peer
//!
//! Run the same command on both machines, each naming the other:
//!
//! ```text
//! host-a$ strictly_p2p host-b 5050
//! host-b$ strictly_p2p host-a 5050
//! ```

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use std::sync::Arc;
use strictly_p2p::{GameSession, PeerConfig, Presentation, TerminalPresentation, resolve_peer};
use tracing::{error, info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let code = match play(config).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = ?e, "Exiting");
            eprintln!("Error: {:#}", e);
            1
        }
    };

    // The stdin reader cannot be cancelled and would hold runtime shutdown
    // until the next line is typed.
    std::process::exit(code)
}

/// Merges the optional config file with command-line values.
#[instrument(skip(cli))]
fn load_config(cli: &Cli) -> Result<PeerConfig> {
    let mut config = match &cli.config {
        Some(path) => PeerConfig::from_file(path)
            .context("Failed to load config file")?
            .with_peer(cli.peer_address.clone(), cli.port),
        None => PeerConfig::new(cli.peer_address.clone(), cli.port),
    };

    if let Some(bind) = cli.bind {
        config = config.with_bind_address(bind);
    }
    if let Some(ms) = cli.poll_interval_ms {
        config = config.with_poll_interval_ms(ms);
    }
    if let Some(max) = cli.max_attempts {
        config = config.with_max_attempts(max);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Finds the peer and plays until the session ends.
#[instrument(skip(config), fields(peer = %config.peer_host(), port = config.port()))]
async fn play(config: PeerConfig) -> Result<()> {
    let terminal = Arc::new(TerminalPresentation::new());

    let peer = match resolve_peer(config.peer_host(), *config.port()).await {
        Ok(peer) => peer,
        Err(e) => {
            terminal.on_fatal_error(&e.kind.to_string()).await;
            return Err(e).context("Cannot start session");
        }
    };

    info!(%peer, "Looking for peer");
    let moves = terminal.spawn_input();
    let session = GameSession::connect(peer, &config.rendezvous_options(), terminal)
        .await
        .context("Cannot start session")?;

    let end = session.run(moves).await.context("Session failed")?;
    info!(%end, "Session finished");
    Ok(())
}
