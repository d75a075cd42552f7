//! Turn coordination between the local and remote activities.
//!
//! The board, the turn owner and the game phase live in one [`Table`]
//! published through a [`tokio::sync::watch`] channel. The channel is both the
//! guard (every mutation happens inside a single `send_*` call) and the
//! condition (waiters re-check their predicate on every publish and sleep
//! otherwise). Nothing polls.

use crate::games::tictactoe::{Board, GameState, Mark, Move, MoveError, Outcome, Position};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// Lifecycle of the game behind the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Moves are accepted from the turn owner.
    Playing,
    /// Someone won or the board filled; waiting for a replay decision.
    Finished,
    /// The session is over. Terminal.
    Closed,
}

/// Result of waiting for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Turn {
    /// The local peer may move.
    Local,
    /// The remote peer may move.
    Remote,
    /// The session closed while waiting.
    Closed,
}

#[derive(Debug, Clone)]
struct Table {
    game: GameState,
    owner: Mark,
    phase: Phase,
}

impl Table {
    fn new() -> Self {
        Self {
            game: GameState::new(),
            owner: Mark::First,
            phase: Phase::Playing,
        }
    }

    fn apply(&mut self, mv: Move) -> Result<Outcome, MoveError> {
        if self.phase != Phase::Playing {
            return Err(MoveError::GameOver);
        }
        if self.owner != mv.mark {
            return Err(MoveError::NotYourTurn(mv.mark));
        }
        if !self.game.apply_move(mv.position, mv.mark) {
            return Err(MoveError::SquareOccupied(mv.position));
        }

        let outcome = self.game.evaluate();
        if outcome.is_over() {
            self.phase = Phase::Finished;
        }
        Ok(outcome)
    }
}

/// Shared turn state for one session.
#[derive(Debug)]
pub struct TurnCoordinator {
    local: Mark,
    table: watch::Sender<Table>,
}

impl TurnCoordinator {
    /// Creates a coordinator for the peer playing `local`.
    ///
    /// The game starts empty with [`Mark::First`] to move.
    pub fn new(local: Mark) -> Self {
        let (table, _) = watch::channel(Table::new());
        Self { local, table }
    }

    /// Mark played by this peer.
    pub fn local_mark(&self) -> Mark {
        self.local
    }

    /// Mark played by the other peer.
    pub fn remote_mark(&self) -> Mark {
        self.local.opponent()
    }

    /// Mark that currently owns the turn.
    pub fn owner(&self) -> Mark {
        self.table.borrow().owner
    }

    /// Whether the local peer may move right now.
    pub fn is_local_turn(&self) -> bool {
        let table = self.table.borrow();
        table.phase == Phase::Playing && table.owner == self.local
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.table.borrow().phase
    }

    /// Whether the session has closed.
    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    /// Snapshot of the board.
    pub fn board(&self) -> Board {
        self.table.borrow().game.board().clone()
    }

    /// Outcome of the current board.
    pub fn outcome(&self) -> Outcome {
        self.table.borrow().game.evaluate()
    }

    /// Applies a move by the local peer. The turn stays local until
    /// [`hand_off_to_remote`](Self::hand_off_to_remote).
    #[instrument(skip(self))]
    pub fn apply_local(&self, position: Position) -> Result<Outcome, MoveError> {
        self.apply(Move::new(self.local, position))
    }

    /// Applies a move received from the peer. The turn stays remote until
    /// [`hand_off_to_local`](Self::hand_off_to_local).
    #[instrument(skip(self))]
    pub fn apply_remote(&self, position: Position) -> Result<Outcome, MoveError> {
        self.apply(Move::new(self.remote_mark(), position))
    }

    fn apply(&self, mv: Move) -> Result<Outcome, MoveError> {
        let mut result = Err(MoveError::GameOver);
        self.table.send_if_modified(|table| {
            result = table.apply(mv);
            result.is_ok()
        });
        debug!(%mv, ?result, "Move applied");
        result
    }

    /// Gives the turn to the remote peer, waking the remote listener.
    #[instrument(skip(self))]
    pub fn hand_off_to_remote(&self) -> bool {
        self.hand_off(self.remote_mark())
    }

    /// Gives the turn back to the local peer.
    #[instrument(skip(self))]
    pub fn hand_off_to_local(&self) -> bool {
        self.hand_off(self.local)
    }

    fn hand_off(&self, to: Mark) -> bool {
        let moved = self.table.send_if_modified(|table| {
            if table.phase != Phase::Playing || table.owner == to {
                return false;
            }
            table.owner = to;
            true
        });
        debug!(%to, moved, "Turn handoff");
        moved
    }

    /// Suspends until the remote peer owns the turn or the session closes.
    pub async fn wait_for_remote_turn(&self) -> Turn {
        self.wait_for(self.remote_mark()).await
    }

    /// Suspends until the local peer owns the turn or the session closes.
    pub async fn wait_for_local_turn(&self) -> Turn {
        self.wait_for(self.local).await
    }

    async fn wait_for(&self, mark: Mark) -> Turn {
        let mut rx = self.table.subscribe();
        let seen = rx
            .wait_for(|table| {
                table.phase == Phase::Closed
                    || (table.phase == Phase::Playing && table.owner == mark)
            })
            .await;

        match seen {
            Ok(table) if table.phase != Phase::Closed => {
                if mark == self.local {
                    Turn::Local
                } else {
                    Turn::Remote
                }
            }
            _ => Turn::Closed,
        }
    }

    /// Suspends until the session closes.
    pub async fn wait_for_closed(&self) {
        let mut rx = self.table.subscribe();
        let _ = rx.wait_for(|table| table.phase == Phase::Closed).await;
    }

    /// Clears the board for another game; [`Mark::First`] opens again.
    #[instrument(skip(self))]
    pub fn restart(&self) -> bool {
        let restarted = self.table.send_if_modified(|table| {
            if table.phase == Phase::Closed {
                return false;
            }
            table.game.reset();
            table.owner = Mark::First;
            table.phase = Phase::Playing;
            true
        });
        if restarted {
            info!("Board reset for a new game");
        }
        restarted
    }

    /// Ends the session and wakes every waiter.
    #[instrument(skip(self))]
    pub fn close(&self) {
        self.table.send_if_modified(|table| {
            if table.phase == Phase::Closed {
                return false;
            }
            table.phase = Phase::Closed;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_millis(200);

    #[test]
    fn test_first_mark_opens() {
        let first = TurnCoordinator::new(Mark::First);
        let second = TurnCoordinator::new(Mark::Second);

        assert!(first.is_local_turn());
        assert!(!second.is_local_turn());
        assert_eq!(second.owner(), Mark::First);
    }

    #[test]
    fn test_owner_alternates_only_after_handoff() {
        let turns = TurnCoordinator::new(Mark::First);

        assert_eq!(turns.apply_local(Position::TopLeft), Ok(Outcome::InProgress));
        assert_eq!(turns.owner(), Mark::First);
        assert!(turns.hand_off_to_remote());
        assert_eq!(turns.owner(), Mark::Second);

        assert_eq!(turns.apply_remote(Position::Center), Ok(Outcome::InProgress));
        assert_eq!(turns.owner(), Mark::Second);
        assert!(turns.hand_off_to_local());
        assert_eq!(turns.owner(), Mark::First);
    }

    #[test]
    fn test_out_of_turn_move_leaves_state_alone() {
        let turns = TurnCoordinator::new(Mark::Second);
        let board = turns.board();

        assert_eq!(
            turns.apply_local(Position::Center),
            Err(MoveError::NotYourTurn(Mark::Second))
        );
        assert_eq!(turns.board(), board);
        assert_eq!(turns.owner(), Mark::First);
    }

    #[test]
    fn test_occupied_square_keeps_turn() {
        let turns = TurnCoordinator::new(Mark::First);
        turns.apply_local(Position::Center).unwrap();
        turns.hand_off_to_remote();

        assert_eq!(
            turns.apply_remote(Position::Center),
            Err(MoveError::SquareOccupied(Position::Center))
        );
        assert_eq!(turns.owner(), Mark::Second);
    }

    #[test]
    fn test_win_finishes_game_and_blocks_handoff() {
        let turns = TurnCoordinator::new(Mark::First);
        for (local, remote) in [(0, 4), (1, 3)] {
            turns.apply_local(Position::from_index(local).unwrap()).unwrap();
            turns.hand_off_to_remote();
            turns.apply_remote(Position::from_index(remote).unwrap()).unwrap();
            turns.hand_off_to_local();
        }

        assert_eq!(turns.apply_local(Position::TopRight), Ok(Outcome::Win(Mark::First)));
        assert_eq!(turns.phase(), Phase::Finished);
        assert!(!turns.hand_off_to_remote());
        assert_eq!(turns.apply_local(Position::BottomRight), Err(MoveError::GameOver));
    }

    #[test]
    fn test_restart_returns_turn_to_first() {
        let turns = TurnCoordinator::new(Mark::Second);
        turns.apply_remote(Position::Center).unwrap();
        turns.hand_off_to_local();

        assert!(turns.restart());
        assert_eq!(turns.owner(), Mark::First);
        assert_eq!(turns.board(), Board::new());
        assert_eq!(turns.phase(), Phase::Playing);
    }

    #[test]
    fn test_closed_is_terminal() {
        let turns = TurnCoordinator::new(Mark::First);
        turns.close();

        assert!(!turns.restart());
        assert!(!turns.is_local_turn());
        assert_eq!(turns.apply_local(Position::Center), Err(MoveError::GameOver));
    }

    #[tokio::test]
    async fn test_remote_wait_released_by_handoff() {
        let turns = Arc::new(TurnCoordinator::new(Mark::First));
        let waiter = {
            let turns = Arc::clone(&turns);
            tokio::spawn(async move { turns.wait_for_remote_turn().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        turns.apply_local(Position::Center).unwrap();
        turns.hand_off_to_remote();

        let turn = timeout(WAIT, waiter).await.unwrap().unwrap();
        assert_eq!(turn, Turn::Remote);
    }

    #[tokio::test]
    async fn test_remote_wait_stays_blocked_during_local_turn() {
        let turns = TurnCoordinator::new(Mark::First);
        turns.apply_local(Position::Center).unwrap();

        assert!(timeout(WAIT, turns.wait_for_remote_turn()).await.is_err());
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let turns = Arc::new(TurnCoordinator::new(Mark::First));
        let waiter = {
            let turns = Arc::clone(&turns);
            tokio::spawn(async move { turns.wait_for_remote_turn().await })
        };

        tokio::task::yield_now().await;
        turns.close();

        let turn = timeout(WAIT, waiter).await.unwrap().unwrap();
        assert_eq!(turn, Turn::Closed);
    }

    #[tokio::test]
    async fn test_closed_wait_released_by_close() {
        let turns = Arc::new(TurnCoordinator::new(Mark::Second));
        let waiter = {
            let turns = Arc::clone(&turns);
            tokio::spawn(async move { turns.wait_for_closed().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        turns.close();
        timeout(WAIT, waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closed_wait_ignores_restart_and_handoff() {
        let turns = TurnCoordinator::new(Mark::First);
        turns.apply_local(Position::Center).unwrap();
        turns.hand_off_to_remote();
        turns.restart();

        assert!(timeout(WAIT, turns.wait_for_closed()).await.is_err());
    }

    #[tokio::test]
    async fn test_local_wait_returns_immediately_when_owned() {
        let turns = TurnCoordinator::new(Mark::First);
        let turn = timeout(WAIT, turns.wait_for_local_turn()).await.unwrap();
        assert_eq!(turn, Turn::Local);
    }
}
