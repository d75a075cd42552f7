mod action;
mod game;
mod position;
mod types;

pub mod rules;

pub use action::{Move, MoveError};
pub use game::GameState;
pub use position::Position;
pub use types::{Board, Mark, Outcome, Square};
