//! A game session between this process and one remote peer.
//!
//! After rendezvous two activities run side by side:
//!
//! - the remote listener, a spawned task that waits for the peer's turn,
//!   reads its move, applies it and hands the turn back;
//! - the local-input handler ([`GameSession::run`]), which reacts to move
//!   intents from the presentation and sends accepted moves to the peer.
//!
//! Both go through the same [`TurnCoordinator`], so only the turn owner can
//! ever touch the board.

use crate::games::tictactoe::{Board, Mark, MoveError, Outcome, Position};
use crate::net::codec::{CodecError, WireReader, WireWriter};
use crate::net::rendezvous::{Channel, RendezvousError, RendezvousOptions, Role, establish};
use crate::presentation::Presentation;
use crate::turn::{Turn, TurnCoordinator};
use derive_more::{Display, Error};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, warn};

/// How a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SessionEnd {
    /// A player declined to play again, or input ended.
    #[display("Session closed")]
    Declined,
    /// The peer's stream ended.
    #[display("Peer disconnected")]
    PeerDisconnected,
}

/// What went wrong in a session.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionErrorKind {
    /// The session never started.
    #[display("{}", _0)]
    Rendezvous(String),

    /// A locally accepted move could not be sent; the boards may diverge.
    #[display("Failed to send move: {}", _0)]
    Transmission(CodecError),

    /// The peer's move could not be read.
    #[display("Failed to read move: {}", _0)]
    Receive(CodecError),

    /// The peer sent a move our board cannot accept.
    #[display("Peer sent an illegal move: {}", _0)]
    Protocol(MoveError),

    /// The remote listener task died.
    #[display("Remote listener stopped: {}", _0)]
    Listener(String),
}

/// Session error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Session error: {} at {}:{}", kind, file, line)]
pub struct SessionError {
    /// What went wrong.
    #[error(not(source))]
    pub kind: SessionErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SessionError {
    /// Creates a new session error with caller location tracking.
    #[track_caller]
    pub fn new(kind: SessionErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<RendezvousError> for SessionError {
    #[track_caller]
    fn from(err: RendezvousError) -> Self {
        Self::new(SessionErrorKind::Rendezvous(err.to_string()))
    }
}

/// State shared by the local handler and the remote listener.
struct SessionCore<P> {
    role: Role,
    peer: SocketAddr,
    turns: TurnCoordinator,
    writer: Mutex<WireWriter<OwnedWriteHalf>>,
    presentation: Arc<P>,
}

impl<P: Presentation> SessionCore<P> {
    #[instrument(skip(self), fields(role = %self.role))]
    async fn submit_local_move(&self, position: Position) -> Result<bool, SessionError> {
        // Held until the handoff so a second intent sees the new owner.
        let mut writer = self.writer.lock().await;

        let outcome = match self.turns.apply_local(position) {
            Ok(outcome) => outcome,
            Err(reason) => {
                drop(writer);
                warn!(%reason, "Local move rejected");
                self.presentation
                    .on_local_move_rejected(position, &reason)
                    .await;
                return Ok(false);
            }
        };

        if let Err(e) = writer.write_move(position).await {
            drop(writer);
            let err = SessionError::new(SessionErrorKind::Transmission(e));
            return Err(self.fail(err).await);
        }
        info!(%position, "Local move sent");
        self.presentation.on_local_move_accepted(position).await;

        if outcome.is_over() {
            drop(writer);
            self.finish_game(outcome).await;
        } else {
            self.turns.hand_off_to_remote();
        }
        Ok(true)
    }

    #[instrument(skip_all, fields(role = %self.role, peer = %self.peer))]
    async fn listen(
        self: Arc<Self>,
        mut reader: WireReader<OwnedReadHalf>,
    ) -> Result<SessionEnd, SessionError> {
        loop {
            if self.turns.wait_for_remote_turn().await == Turn::Closed {
                debug!("Session closed, listener stopping");
                return Ok(SessionEnd::Declined);
            }

            debug!("Waiting for peer's move");
            let read = tokio::select! {
                read = reader.read_move() => read,
                () = self.turns.wait_for_closed() => {
                    debug!("Session closed during peer's turn, listener stopping");
                    return Ok(SessionEnd::Declined);
                }
            };
            let position = match read {
                Ok(position) => position,
                Err(_) if self.turns.is_closed() => return Ok(SessionEnd::Declined),
                Err(CodecError::Disconnected) => {
                    warn!("Peer disconnected");
                    self.turns.close();
                    self.presentation.on_disconnected().await;
                    return Ok(SessionEnd::PeerDisconnected);
                }
                Err(e) => {
                    let err = SessionError::new(SessionErrorKind::Receive(e));
                    return Err(self.fail(err).await);
                }
            };

            let outcome = match self.turns.apply_remote(position) {
                Ok(outcome) => outcome,
                Err(MoveError::GameOver) if self.turns.is_closed() => {
                    debug!(%position, "Move arrived after close, dropped");
                    return Ok(SessionEnd::Declined);
                }
                Err(reason) => {
                    let err = SessionError::new(SessionErrorKind::Protocol(reason));
                    return Err(self.fail(err).await);
                }
            };
            info!(%position, "Remote move applied");
            self.presentation.on_remote_move_applied(position).await;

            if outcome.is_over() {
                if !self.finish_game(outcome).await {
                    return Ok(SessionEnd::Declined);
                }
            } else {
                self.turns.hand_off_to_local();
            }
        }
    }

    /// Reports the outcome and asks for a replay. Returns true if a new
    /// game started.
    async fn finish_game(&self, outcome: Outcome) -> bool {
        info!(%outcome, "Game over");
        self.presentation.on_outcome(outcome).await;

        if self.presentation.confirm_replay().await {
            self.turns.restart()
        } else {
            info!("Replay declined, closing session");
            self.close().await;
            false
        }
    }

    async fn close(&self) {
        self.turns.close();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(error = %e, "Shutdown of closed stream failed");
        }
    }

    async fn fail(&self, err: SessionError) -> SessionError {
        error!(error = %err, "Session failed");
        self.close().await;
        self.presentation.on_fatal_error(&err.kind.to_string()).await;
        err
    }
}

/// A running game against one peer.
pub struct GameSession<P: Presentation> {
    core: Arc<SessionCore<P>>,
    listener: JoinHandle<Result<SessionEnd, SessionError>>,
}

impl<P: Presentation> GameSession<P> {
    /// Finds the peer, agrees on roles and starts the session.
    ///
    /// A rendezvous failure is reported to the presentation as fatal.
    #[instrument(skip(options, presentation))]
    pub async fn connect(
        peer: SocketAddr,
        options: &RendezvousOptions,
        presentation: Arc<P>,
    ) -> Result<Self, SessionError> {
        match establish(peer, options).await {
            Ok((channel, role)) => Ok(Self::start(channel, role, presentation).await),
            Err(e) => {
                error!(error = %e, "Rendezvous failed");
                presentation.on_fatal_error(&e.kind.to_string()).await;
                Err(e.into())
            }
        }
    }

    /// Starts a session over an established channel.
    #[instrument(skip(channel, presentation))]
    pub async fn start(channel: Channel, role: Role, presentation: Arc<P>) -> Self {
        presentation.on_connected(role, role.mark()).await;

        let peer = channel.peer_addr();
        let (reader, writer) = channel.into_wire();
        let core = Arc::new(SessionCore {
            role,
            peer,
            turns: TurnCoordinator::new(role.mark()),
            writer: Mutex::new(writer),
            presentation,
        });
        let listener = tokio::spawn(Arc::clone(&core).listen(reader));
        info!(%peer, %role, mark = %role.mark(), "Session started");

        Self { core, listener }
    }

    /// This peer's role.
    pub fn role(&self) -> Role {
        self.core.role
    }

    /// This peer's mark.
    pub fn local_mark(&self) -> Mark {
        self.core.turns.local_mark()
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.core.peer
    }

    /// Snapshot of the board.
    pub fn board(&self) -> Board {
        self.core.turns.board()
    }

    /// Outcome of the current board.
    pub fn outcome(&self) -> Outcome {
        self.core.turns.outcome()
    }

    /// Whether the local peer may move right now.
    pub fn is_local_turn(&self) -> bool {
        self.core.turns.is_local_turn()
    }

    /// Whether the session is over.
    pub fn is_closed(&self) -> bool {
        self.core.turns.is_closed()
    }

    /// Suspends until the local peer may move or the session closes.
    pub async fn wait_for_local_turn(&self) -> Turn {
        self.core.turns.wait_for_local_turn().await
    }

    /// Offers a local move.
    ///
    /// Returns `Ok(false)` if the move was refused (not our turn, square
    /// taken, game over); the presentation is told why. Fails only if an
    /// accepted move could not be sent, which ends the session.
    pub async fn submit_local_move(&self, position: Position) -> Result<bool, SessionError> {
        self.core.submit_local_move(position).await
    }

    /// Ends the session from this side.
    ///
    /// The remote listener stops even if it is waiting for the peer's move.
    pub async fn close(&self) {
        self.core.close().await;
    }

    /// Waits for the remote listener to finish.
    pub async fn finished(self) -> Result<SessionEnd, SessionError> {
        settle(self.listener.await)
    }

    /// Handles local move intents until the session ends.
    ///
    /// Dropping every sender of `moves` closes the session.
    #[instrument(skip_all, fields(role = %self.core.role))]
    pub async fn run(
        self,
        mut moves: mpsc::UnboundedReceiver<Position>,
    ) -> Result<SessionEnd, SessionError> {
        let Self { core, mut listener } = self;
        loop {
            tokio::select! {
                joined = &mut listener => return settle(joined),
                next = moves.recv() => match next {
                    Some(position) => {
                        if let Err(e) = core.submit_local_move(position).await {
                            listener.abort();
                            return Err(e);
                        }
                        if core.turns.is_closed() {
                            return settle(listener.await);
                        }
                    }
                    None => {
                        info!("Input closed, leaving session");
                        core.close().await;
                        return settle(listener.await);
                    }
                },
            }
        }
    }
}

fn settle(
    joined: Result<Result<SessionEnd, SessionError>, JoinError>,
) -> Result<SessionEnd, SessionError> {
    joined.map_err(|e| SessionError::new(SessionErrorKind::Listener(e.to_string())))?
}
