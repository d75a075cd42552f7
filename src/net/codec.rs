//! Wire format for the peer link.
//!
//! Two message kinds travel over the TCP stream, both fixed-shape so no
//! extra framing is needed:
//!
//! ```text
//! Greeting:  +--------+--------+----...----+
//!            | len (u16 BE)    | UTF-8     |
//!            +--------+--------+----...----+
//!
//! Move:      +--------+--------+--------+--------+
//!            | cell index (i32 BE, 0-8)          |
//!            +--------+--------+--------+--------+
//! ```
//!
//! The greeting is sent once by the initiating peer right after connecting;
//! every applied move is sent by the peer that made it.

use crate::games::tictactoe::Position;
use derive_more::{Display, Error};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

/// Greeting the initiating peer sends during the handshake.
pub const DEFAULT_GREETING: &str = "Hello!";

/// Largest greeting the length prefix can describe.
pub const MAX_GREETING_LEN: usize = u16::MAX as usize;

/// Errors reading or writing wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum CodecError {
    /// The stream ended while a message was expected.
    #[display("Peer disconnected")]
    Disconnected,

    /// Transport failure.
    #[display("I/O error: {}", _0)]
    Io(#[error(not(source))] String),

    /// A move arrived with an index outside the board.
    #[display("Cell index {} is outside 0-8", _0)]
    CellOutOfRange(#[error(not(source))] i32),

    /// A greeting too long for its length prefix.
    #[display("Greeting of {} bytes exceeds the {} byte limit", _0, MAX_GREETING_LEN)]
    GreetingTooLong(#[error(not(source))] usize),

    /// A greeting whose bytes are not UTF-8.
    #[display("Greeting is not valid UTF-8")]
    InvalidGreeting,
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => CodecError::Disconnected,
            _ => CodecError::Io(err.to_string()),
        }
    }
}

/// Reading side of the wire codec.
#[derive(Debug)]
pub struct WireReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    /// Wraps a byte stream.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the handshake greeting.
    #[instrument(skip(self))]
    pub async fn read_greeting(&mut self) -> Result<String, CodecError> {
        let len = self.inner.read_u16().await? as usize;
        let mut bytes = vec![0u8; len];
        self.inner.read_exact(&mut bytes).await?;
        let greeting = String::from_utf8(bytes).map_err(|_| CodecError::InvalidGreeting)?;
        debug!(%greeting, "Greeting received");
        Ok(greeting)
    }

    /// Reads one move, suspending until it arrives or the stream ends.
    #[instrument(skip(self))]
    pub async fn read_move(&mut self) -> Result<Position, CodecError> {
        let index = self.inner.read_i32().await?;
        let pos = Position::from_wire(index).ok_or(CodecError::CellOutOfRange(index))?;
        debug!(index, "Move received");
        Ok(pos)
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writing side of the wire codec.
#[derive(Debug)]
pub struct WireWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> WireWriter<W> {
    /// Wraps a byte stream.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes the handshake greeting.
    #[instrument(skip(self))]
    pub async fn write_greeting(&mut self, greeting: &str) -> Result<(), CodecError> {
        let len = u16::try_from(greeting.len())
            .map_err(|_| CodecError::GreetingTooLong(greeting.len()))?;
        self.inner.write_u16(len).await?;
        self.inner.write_all(greeting.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Writes one move and flushes it.
    #[instrument(skip(self))]
    pub async fn write_move(&mut self, pos: Position) -> Result<(), CodecError> {
        self.inner.write_i32(pos.to_wire()).await?;
        self.inner.flush().await?;
        debug!(index = pos.to_wire(), "Move sent");
        Ok(())
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Closes the writing half so the peer observes end-of-stream.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_move_survives_the_wire() {
        let (a, b) = duplex(64);
        let mut writer = WireWriter::new(a);
        let mut reader = WireReader::new(b);

        for pos in [Position::TopLeft, Position::Center, Position::BottomRight] {
            writer.write_move(pos).await.unwrap();
            assert_eq!(reader.read_move().await.unwrap(), pos);
        }
    }

    #[tokio::test]
    async fn test_move_is_four_big_endian_bytes() {
        let (a, b) = duplex(64);
        let mut writer = WireWriter::new(a);
        writer.write_move(Position::BottomCenter).await.unwrap();
        drop(writer);

        let mut raw = Vec::new();
        let mut b = b;
        b.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, vec![0, 0, 0, 7]);
    }

    #[tokio::test]
    async fn test_greeting_layout() {
        let (a, b) = duplex(64);
        let mut writer = WireWriter::new(a);
        writer.write_greeting(DEFAULT_GREETING).await.unwrap();
        drop(writer);

        let mut raw = Vec::new();
        let mut b = b;
        b.read_to_end(&mut raw).await.unwrap();
        assert_eq!(&raw[..2], &[0, 6]);
        assert_eq!(&raw[2..], b"Hello!");
    }

    #[tokio::test]
    async fn test_greeting_then_move() {
        let (a, b) = duplex(64);
        let mut writer = WireWriter::new(a);
        let mut reader = WireReader::new(b);

        writer.write_greeting(DEFAULT_GREETING).await.unwrap();
        writer.write_move(Position::Center).await.unwrap();

        assert_eq!(reader.read_greeting().await.unwrap(), DEFAULT_GREETING);
        assert_eq!(reader.read_move().await.unwrap(), Position::Center);
    }

    #[tokio::test]
    async fn test_end_of_stream_is_disconnect() {
        let (a, b) = duplex(64);
        drop(a);
        let mut reader = WireReader::new(b);
        assert_eq!(reader.read_move().await, Err(CodecError::Disconnected));
    }

    #[tokio::test]
    async fn test_truncated_move_is_disconnect() {
        let (mut a, b) = duplex(64);
        a.write_all(&[0, 0]).await.unwrap();
        drop(a);
        let mut reader = WireReader::new(b);
        assert_eq!(reader.read_move().await, Err(CodecError::Disconnected));
    }

    #[tokio::test]
    async fn test_out_of_range_index_rejected() {
        let (mut a, b) = duplex(64);
        a.write_i32(9).await.unwrap();
        a.write_i32(-1).await.unwrap();
        let mut reader = WireReader::new(b);
        assert_eq!(reader.read_move().await, Err(CodecError::CellOutOfRange(9)));
        assert_eq!(reader.read_move().await, Err(CodecError::CellOutOfRange(-1)));
    }

    #[tokio::test]
    async fn test_shutdown_signals_peer() {
        let (a, b) = duplex(64);
        let mut writer = WireWriter::new(a);
        let mut reader = WireReader::new(b);

        writer.write_move(Position::TopRight).await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(reader.read_move().await.unwrap(), Position::TopRight);
        assert_eq!(reader.read_move().await, Err(CodecError::Disconnected));
    }

    #[tokio::test]
    async fn test_oversized_greeting_rejected() {
        let (a, _b) = duplex(64);
        let mut writer = WireWriter::new(a);
        let greeting = "x".repeat(MAX_GREETING_LEN + 1);
        assert_eq!(
            writer.write_greeting(&greeting).await,
            Err(CodecError::GreetingTooLong(MAX_GREETING_LEN + 1))
        );
    }
}
