//! Board state and evaluation for a single game.

use super::position::Position;
use super::rules;
use super::types::{Board, Mark, Outcome};
use tracing::{debug, instrument};

/// Board plus the order in which squares were played.
///
/// `GameState` knows nothing about turns; whoever calls [`apply_move`]
/// decides which mark is allowed to move.
///
/// [`apply_move`]: GameState::apply_move
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameState {
    board: Board,
    history: Vec<Position>,
}

impl GameState {
    /// Creates an empty game.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Positions played so far, oldest first.
    pub fn history(&self) -> &[Position] {
        &self.history
    }

    /// Places `mark` at `pos`.
    ///
    /// Returns false and leaves the state untouched if the square is taken.
    #[instrument(skip(self))]
    pub fn apply_move(&mut self, pos: Position, mark: Mark) -> bool {
        if !self.board.place(pos, mark) {
            debug!("Square already occupied");
            return false;
        }
        self.history.push(pos);
        true
    }

    /// Evaluates the board: any complete line wins, a full board ties.
    #[instrument(skip(self))]
    pub fn evaluate(&self) -> Outcome {
        if let Some(winner) = rules::check_winner(&self.board) {
            Outcome::Win(winner)
        } else if rules::is_full(&self.board) {
            Outcome::Tie
        } else {
            Outcome::InProgress
        }
    }

    /// Clears the board for a new game.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        self.board = Board::new();
        self.history.clear();
    }
}
