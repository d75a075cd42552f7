//! Strictly P2P - tic-tac-toe between two peers over a direct TCP link
//!
//! Two identically configured processes find each other without a
//! coordinator, agree on who listens and who dials, and then play in
//! lock-step.
//!
//! # Architecture
//!
//! - **Net**: wire codec and leaderless rendezvous
//! - **Turn**: single-owner turn coordination between the two activities
//! - **Games**: tic-tac-toe board, rules and evaluation
//! - **Session**: composes the above and talks to a [`Presentation`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strictly_p2p::{GameSession, PeerConfig, TerminalPresentation, resolve_peer};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PeerConfig::new("192.168.1.20".to_string(), 5050);
//! let peer = resolve_peer(config.peer_host(), *config.port()).await?;
//!
//! let terminal = Arc::new(TerminalPresentation::new());
//! let moves = terminal.spawn_input();
//! let session = GameSession::connect(peer, &config.rendezvous_options(), terminal).await?;
//! session.run(moves).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod games;
mod presentation;
mod session;
mod terminal;
mod turn;

pub mod net;

// Crate-level exports - Configuration
pub use config::{ConfigError, MIN_PORT, PeerConfig};

// Crate-level exports - Networking
pub use net::{
    Channel, CodecError, RendezvousError, RendezvousErrorKind, RendezvousOptions, Role,
    WireReader, WireWriter, establish, resolve_peer,
};

// Crate-level exports - Session
pub use presentation::Presentation;
pub use session::{GameSession, SessionEnd, SessionError, SessionErrorKind};
pub use terminal::TerminalPresentation;
pub use turn::{Phase, Turn, TurnCoordinator};

// Crate-level exports - Game types (tic-tac-toe)
pub use games::tictactoe::{
    Board, GameState, Mark, Move, MoveError, Outcome, Position, Square, rules,
};
