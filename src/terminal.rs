//! Line-based terminal presentation.
//!
//! Prints the board to stdout and reads moves and replay answers from stdin.
//! One input task owns stdin: while a replay question is open the next line
//! answers it, otherwise lines are parsed as moves.

use crate::games::tictactoe::{Board, Mark, MoveError, Outcome, Position};
use crate::net::Role;
use crate::presentation::Presentation;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, instrument};

/// Parses a yes/no answer.
pub fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct View {
    board: Board,
    local: Option<Mark>,
}

/// Presentation that plays in a terminal.
#[derive(Debug, Default)]
pub struct TerminalPresentation {
    view: Mutex<View>,
    pending_answer: Mutex<Option<oneshot::Sender<bool>>>,
}

impl TerminalPresentation {
    /// Creates a terminal presentation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts reading stdin and returns the stream of move intents.
    ///
    /// The stream ends when stdin does.
    #[instrument(skip(self))]
    pub fn spawn_input(self: &Arc<Self>) -> mpsc::UnboundedReceiver<Position> {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if this.answer(&line).await {
                    continue;
                }
                match Position::parse_input(&line) {
                    Some(position) => {
                        if tx.send(position).is_err() {
                            break;
                        }
                    }
                    None => println!("Type 1-9 or a square name such as 'center'."),
                }
            }
            debug!("Input ended");
            if let Some(pending) = this.pending_answer.lock().await.take() {
                let _ = pending.send(false);
            }
        });
        rx
    }

    /// Feeds a line to an open replay question. Returns false if none is open.
    async fn answer(&self, line: &str) -> bool {
        let mut pending = self.pending_answer.lock().await;
        let Some(tx) = pending.take() else {
            return false;
        };
        match parse_answer(line) {
            Some(yes) => {
                let _ = tx.send(yes);
            }
            None => {
                println!("Please answer y or n.");
                *pending = Some(tx);
            }
        }
        true
    }

    async fn place(&self, position: Position, local: bool) {
        let mut view = self.view.lock().await;
        if let Some(mark) = view.local {
            let mark = if local { mark } else { mark.opponent() };
            view.board.place(position, mark);
        }
        println!("\n{}\n", view.board.display());
    }
}

#[async_trait::async_trait]
impl Presentation for TerminalPresentation {
    async fn on_connected(&self, role: Role, mark: Mark) {
        let mut view = self.view.lock().await;
        view.local = Some(mark);
        let order = match role {
            Role::Acceptor => "former",
            Role::Initiator => "latter",
        };
        println!("Connected ({}), you play {}.", order, mark);
        println!("\n{}\n", view.board.display());
        if mark == Mark::First {
            println!("Your move.");
        } else {
            println!("Waiting for your counterpart...");
        }
    }

    async fn on_local_move_accepted(&self, position: Position) {
        self.place(position, true).await;
        println!("Waiting for your counterpart...");
    }

    async fn on_local_move_rejected(&self, position: Position, reason: &MoveError) {
        println!("{} refused: {}", position, reason);
    }

    async fn on_remote_move_applied(&self, position: Position) {
        println!("Counterpart played {}.", position);
        self.place(position, false).await;
        println!("Your move.");
    }

    async fn on_outcome(&self, outcome: Outcome) {
        println!("{}", outcome);
    }

    async fn on_disconnected(&self) {
        println!("Counterpart disconnected.");
    }

    async fn on_fatal_error(&self, reason: &str) {
        eprintln!("Fatal: {}", reason);
    }

    async fn confirm_replay(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        *self.pending_answer.lock().await = Some(tx);
        println!("Want to play again? [y/n]");

        let again = rx.await.unwrap_or(false);
        if again {
            let mut view = self.view.lock().await;
            view.board = Board::new();
            println!("\n{}\n", view.board.display());
        } else {
            println!("Thanks for playing.");
        }
        again
    }
}
