//! Boundary between a game session and whatever shows it to a human.

use crate::games::tictactoe::{Mark, MoveError, Outcome, Position};
use crate::net::Role;

/// Receives session events and answers the replay question.
///
/// Implementations render the board, dialogs and so on. The session never
/// touches a window or a terminal itself. Local move intents go the other
/// way, through [`GameSession::submit_local_move`](crate::GameSession::submit_local_move).
#[async_trait::async_trait]
pub trait Presentation: Send + Sync + 'static {
    /// Rendezvous finished; roles and marks are fixed from here on.
    async fn on_connected(&self, role: Role, mark: Mark);

    /// A local move was applied and sent to the peer.
    async fn on_local_move_accepted(&self, position: Position);

    /// A local move was refused. Nothing changed and nothing was sent.
    async fn on_local_move_rejected(&self, position: Position, reason: &MoveError);

    /// The peer's move was received and applied.
    async fn on_remote_move_applied(&self, position: Position);

    /// The game ended.
    async fn on_outcome(&self, outcome: Outcome);

    /// The peer went away. The session is over.
    async fn on_disconnected(&self);

    /// Something unrecoverable happened. The session is over.
    async fn on_fatal_error(&self, reason: &str);

    /// Asks whether to play another game after [`on_outcome`](Self::on_outcome).
    async fn confirm_replay(&self) -> bool;
}
