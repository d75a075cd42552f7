//! Networking: the wire codec and the rendezvous that produces a channel.

pub mod codec;
pub mod rendezvous;

pub use codec::{CodecError, DEFAULT_GREETING, WireReader, WireWriter};
pub use rendezvous::{
    Channel, RendezvousError, RendezvousErrorKind, RendezvousOptions, Role, establish,
    resolve_peer,
};
