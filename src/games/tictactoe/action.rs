//! Move intents and the reasons a move can be refused.

use super::{Mark, Position};
use serde::{Deserialize, Serialize};

/// A mark being placed at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// The mark making the move.
    pub mark: Mark,
    /// Where the mark goes.
    pub position: Position,
}

impl Move {
    /// Creates a new move.
    pub fn new(mark: Mark, position: Position) -> Self {
        Self { mark, position }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.mark, self.position.label())
    }
}

/// Why a move was refused.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// The square at the position is already occupied.
    #[display("Square {} is already occupied", _0)]
    SquareOccupied(Position),

    /// The mark does not own the turn.
    #[display("It's not {}'s turn", _0)]
    NotYourTurn(Mark),

    /// No game is being played right now.
    #[display("Game is already over")]
    GameOver,
}

impl std::error::Error for MoveError {}
