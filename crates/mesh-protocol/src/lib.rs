//! Synaptic mesh routing layer.
//!
//! Named agents exchange JSON envelopes through a two-tier mesh: agents
//! connect to a [`GroupProxy`] for their group, and every proxy connects to
//! the single [`MeshHub`], which keeps the agent → group routing table and a
//! bounded history of forwarded payloads.
//!
//! ```text
//! agent ──► proxy(core) ──► hub ──► proxy(field) ──► agent
//! ```
//!
//! Unknown destinations are assumed to live behind the sender's own proxy
//! (the same-group heuristic). Delivery is at-most-once with no
//! acknowledgments.
//!
//! The [`hub`] and [`proxy`] modules hold the pure decision engines; the
//! runtimes own the sockets and execute their decisions.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod history;
pub mod hub;
pub mod proxy;
pub mod runtime;
pub mod table;
pub mod types;

pub use client::{AgentClient, ClientStats, Delivery};
pub use config::{parse_seed, HubConfig, ProxyConfig, DEFAULT_POLL_INTERVAL};
pub use envelope::Envelope;
pub use error::MeshError;
pub use history::HistoryBuffer;
pub use hub::{HubAction, HubState, HubStats};
pub use proxy::{AgentPresence, ProxyAction, ProxyState, ProxyStats};
pub use runtime::{
    GroupProxy, HubCommand, HubHandle, HubSnapshot, MeshHub, ProxyCommand, ProxyHandle, ProxySnapshot,
};
pub use table::{Resolution, RoutingTable};
pub use types::{group_identity, Identity, DEFAULT_HISTORY_CAPACITY, DEFAULT_HUB_PORT, HANDSHAKE_TYPE};
