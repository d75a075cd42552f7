//! Leaderless rendezvous between two peers.
//!
//! Both peers run the same code with each other's address and one agreed
//! port. The state machine below decides who listens and who dials:
//!
//! ```text
//!            bind(port)
//!           /          \
//!      ok  /            \  err
//!         v              v
//!   +-----------+    +-------------+
//!   |  Racing   |    |   Dialing   |---- connect ok ----> Initiator
//!   +-----------+    +-------------+
//!     |       |
//!     |       +-- connect ok (only if we order above the peer) --> Initiator
//!     +-- accept within poll interval --> Acceptor
//! ```
//!
//! A peer holding the listener dials out only when its route-local IP is
//! strictly greater than the peer's IP. Two listeners therefore never dial
//! each other, and a peer never dials its own listener when both run on
//! one host.
//!
//! The ordering only works if both peers see the same pair of addresses.
//! Across NAT, or on a multi-homed host whose route-local address is not the
//! one the peer was given, each side can find itself the lower one; then
//! neither dials and, with no `max_attempts`, both wait forever. Pin the
//! address the peer knows you by with `bind_address`, or bound the wait
//! with `max_attempts`.

use super::codec::{CodecError, DEFAULT_GREETING, WireReader, WireWriter};
use crate::games::tictactoe::Mark;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

/// Default wait for an incoming connection per attempt.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Which side of the TCP connection this peer ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Role {
    /// Accepted the connection; moves first.
    Acceptor,
    /// Dialed the peer.
    Initiator,
}

impl Role {
    /// Mark played by this role.
    pub fn mark(self) -> Mark {
        match self {
            Role::Acceptor => Mark::First,
            Role::Initiator => Mark::Second,
        }
    }
}

/// Tuning for [`establish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousOptions {
    /// Local IP to listen on; unspecified address of the peer's family if unset.
    pub bind_address: Option<IpAddr>,
    /// Bounded wait for accept, and for each outgoing connect.
    pub poll_interval: Duration,
    /// Give up after this many rounds. Unbounded if unset.
    pub max_attempts: Option<u32>,
    /// Greeting written by the initiator.
    pub greeting: String,
}

impl Default for RendezvousOptions {
    fn default() -> Self {
        Self {
            bind_address: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

/// What went wrong during rendezvous.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RendezvousErrorKind {
    /// The peer host did not resolve to any address.
    #[display("Cannot resolve peer address {}", _0)]
    Unresolvable(String),

    /// The listening socket failed while accepting.
    #[display("Accept failed: {}", _0)]
    Accept(String),

    /// No connection within the configured number of attempts.
    #[display("No connection after {} attempts", _0)]
    Exhausted(u32),

    /// Greeting could not be exchanged.
    #[display("Handshake failed: {}", _0)]
    Handshake(CodecError),
}

/// Rendezvous error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Rendezvous error: {} at {}:{}", kind, file, line)]
pub struct RendezvousError {
    /// What went wrong.
    #[error(not(source))]
    pub kind: RendezvousErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl RendezvousError {
    /// Creates a new rendezvous error with caller location tracking.
    #[track_caller]
    pub fn new(kind: RendezvousErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// A connected, handshake-complete link to the peer.
#[derive(Debug)]
pub struct Channel {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Channel {
    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Splits the link into its codec halves.
    pub fn into_wire(self) -> (WireReader<OwnedReadHalf>, WireWriter<OwnedWriteHalf>) {
        let (read, write) = self.stream.into_split();
        (WireReader::new(read), WireWriter::new(write))
    }
}

/// Resolves the peer host name, failing fatally if it has no address.
#[instrument]
pub async fn resolve_peer(host: &str, port: u16) -> Result<SocketAddr, RendezvousError> {
    let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        RendezvousError::new(RendezvousErrorKind::Unresolvable(format!("{}: {}", host, e)))
    })?;

    let addr = addrs.next().ok_or_else(|| {
        RendezvousError::new(RendezvousErrorKind::Unresolvable(host.to_string()))
    })?;
    debug!(%addr, "Resolved peer");
    Ok(addr)
}

/// Connects to `peer`, agreeing on roles and exchanging the greeting.
#[instrument(skip(options), fields(poll_ms = options.poll_interval.as_millis() as u64))]
pub async fn establish(
    peer: SocketAddr,
    options: &RendezvousOptions,
) -> Result<(Channel, Role), RendezvousError> {
    let bind_ip = options
        .bind_address
        .unwrap_or_else(|| unspecified_for(peer.ip()));

    let (mut stream, role) = match TcpListener::bind(SocketAddr::new(bind_ip, peer.port())).await {
        Ok(listener) => {
            info!(addr = %SocketAddr::new(bind_ip, peer.port()), "Listening for peer");
            let dial = may_dial(bind_ip, peer).await;
            race(&listener, peer, dial, options).await?
        }
        Err(e) => {
            info!(error = %e, "Port unavailable, dialing peer");
            (dial_until_connected(peer, options).await?, Role::Initiator)
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        warn!(error = %e, "Could not disable Nagle");
    }

    handshake(&mut stream, role, &options.greeting).await?;
    info!(%role, mark = %role.mark(), "Rendezvous complete");

    Ok((Channel { stream, peer }, role))
}

/// Whether a peer listening on `local` should also dial `peer`.
pub fn dials_out(local: IpAddr, peer: IpAddr) -> bool {
    local > peer
}

fn unspecified_for(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// Decides whether the listening side should also dial.
async fn may_dial(bind_ip: IpAddr, peer: SocketAddr) -> bool {
    match route_local_ip(bind_ip, peer).await {
        Ok(local) => {
            let dial = dials_out(local, peer.ip());
            debug!(%local, peer_ip = %peer.ip(), dial, "Tie-break decided");
            dial
        }
        Err(e) => {
            warn!(error = %e, "Cannot determine local address, accepting only");
            false
        }
    }
}

/// Local address the OS would use to reach `peer`. No packets are sent.
async fn route_local_ip(bind_ip: IpAddr, peer: SocketAddr) -> std::io::Result<IpAddr> {
    if !bind_ip.is_unspecified() {
        return Ok(bind_ip);
    }
    let probe = UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await?;
    probe.connect(peer).await?;
    Ok(probe.local_addr()?.ip())
}

fn check_attempts(attempt: u32, options: &RendezvousOptions) -> Result<(), RendezvousError> {
    match options.max_attempts {
        Some(max) if attempt > max => {
            warn!(max, "Giving up on rendezvous");
            Err(RendezvousError::new(RendezvousErrorKind::Exhausted(max)))
        }
        _ => Ok(()),
    }
}

async fn race(
    listener: &TcpListener,
    peer: SocketAddr,
    dial: bool,
    options: &RendezvousOptions,
) -> Result<(TcpStream, Role), RendezvousError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        check_attempts(attempt, options)?;

        match timeout(options.poll_interval, listener.accept()).await {
            Ok(Ok((stream, from))) => {
                info!(%from, "Peer connected to us");
                return Ok((stream, Role::Acceptor));
            }
            Ok(Err(e)) => {
                return Err(RendezvousError::new(RendezvousErrorKind::Accept(
                    e.to_string(),
                )));
            }
            Err(_) => debug!(attempt, "No incoming connection yet"),
        }

        if dial {
            match timeout(options.poll_interval, TcpStream::connect(peer)).await {
                Ok(Ok(stream)) => {
                    info!(%peer, "Connected to peer");
                    return Ok((stream, Role::Initiator));
                }
                Ok(Err(e)) => debug!(attempt, error = %e, "Peer not reachable yet"),
                Err(_) => debug!(attempt, "Connect timed out"),
            }
        }
    }
}

async fn dial_until_connected(
    peer: SocketAddr,
    options: &RendezvousOptions,
) -> Result<TcpStream, RendezvousError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        check_attempts(attempt, options)?;

        match timeout(options.poll_interval, TcpStream::connect(peer)).await {
            Ok(Ok(stream)) => {
                info!(%peer, "Connected to peer");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!(attempt, error = %e, "Peer not reachable yet");
                sleep(options.poll_interval).await;
            }
            Err(_) => debug!(attempt, "Connect timed out"),
        }
    }
}

#[instrument(skip(stream, greeting))]
async fn handshake(
    stream: &mut TcpStream,
    role: Role,
    greeting: &str,
) -> Result<(), RendezvousError> {
    let result = match role {
        Role::Acceptor => WireReader::new(&mut *stream)
            .read_greeting()
            .await
            .map(|received| info!(greeting = %received, "Peer greeted us")),
        Role::Initiator => WireWriter::new(&mut *stream).write_greeting(greeting).await,
    };
    result.map_err(|e| RendezvousError::new(RendezvousErrorKind::Handshake(e)))
}
