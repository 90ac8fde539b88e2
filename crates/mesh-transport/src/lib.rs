//! Synaptic mesh transport layer.
//!
//! ROUTER/DEALER-style multipart messaging over TCP. A [`RouterSocket`]
//! binds and addresses each accepted connection by an [`Identity`]; a
//! [`DealerSocket`] connects and announces the identity it wants.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use mesh_transport::{DealerSocket, Identity, RouterSocket, SocketConfig};
//!
//! # async fn example() -> Result<(), mesh_transport::TransportError> {
//! let mut router = RouterSocket::bind("127.0.0.1:5550", SocketConfig::new()).await?;
//! let dealer = DealerSocket::connect("127.0.0.1:5550", Identity::from("group_core"), SocketConfig::new()).await?;
//!
//! dealer.send(vec![Bytes::from_static(b"hello")])?;
//!
//! // Router sees [identity, frames...]
//! let frames = router.recv().await?;
//! assert_eq!(&frames[0][..], b"group_core");
//! # Ok(())
//! # }
//! ```
//!
//! Sends never block: each connection has a bounded outbound queue and a
//! message that does not fit is dropped ([`SendOutcome::QueueFull`]).

mod codec;
mod config;
mod dealer;
mod error;
mod queue;
mod router;

pub use codec::{Multipart, MultipartCodec};
pub use config::SocketConfig;
pub use dealer::DealerSocket;
pub use error::TransportError;
pub use router::RouterSocket;

use bytes::Bytes;
use std::fmt;

/// Opaque routing token naming one connection.
///
/// Either requested by the connecting side in its greeting, or generated
/// by the router when none (or a taken one) was requested. Displayed as
/// lossy UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Bytes);

impl Identity {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Fresh random identity. Used for connections that did not ask for one.
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self(Bytes::from(format!("conn-{}", &id[..8])))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Cheap clone of the underlying frame.
    pub fn to_frame(&self) -> Bytes {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Bytes> for Identity {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl serde::Serialize for Identity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// What happened to a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the connection's outbound queue.
    Queued,
    /// No live connection holds the destination identity. Dropped.
    UnknownPeer,
    /// The destination's outbound queue is at its high-water mark. Dropped.
    QueueFull,
}

impl SendOutcome {
    pub fn is_queued(self) -> bool {
        matches!(self, SendOutcome::Queued)
    }
}
