/// Group proxy decision engine.
///
/// Agent side: `[connection, payload]` from the local router socket.
/// Hub side: `[destination_connection, sender, payload]` from the dealer.
/// Returns a `ProxyAction`; the runtime performs it.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use mesh_transport::{Multipart, SendOutcome};
use serde::Serialize;

use crate::envelope::Envelope;
use crate::types::{group_identity, now_ms, Identity};

pub const AGENT_FRAME_PARTS: usize = 2;
pub const HUB_DOWNSTREAM_PARTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum ProxyAction {
    /// Send `[destination, sender_connection, payload]` to the hub.
    Upstream { frames: Multipart },
    /// A connection announced itself. Nothing to send.
    Handshake { connection: Identity, agent: String },
    /// Send `[destination_connection, sender, payload]` to the local router.
    Deliver { frames: Multipart },
    Drop { reason: String },
}

/// A handshaken local connection. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentPresence {
    pub connection: Identity,
    pub agent: String,
    /// Unix millis of the handshake.
    pub connected_at: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProxyStats {
    pub from_agents: u64,
    pub upstream: u64,
    pub handshakes: u64,
    pub delivered: u64,
    pub undeliverable: u64,
    pub dropped: u64,
}

impl ProxyStats {
    pub fn record_delivery(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Queued => self.delivered += 1,
            SendOutcome::UnknownPeer | SendOutcome::QueueFull => self.undeliverable += 1,
        }
    }
}

#[derive(Debug)]
pub struct ProxyState {
    group: String,
    identity: Identity,
    presence: HashMap<Identity, AgentPresence>,
    last_pruned: Option<Instant>,
    stats: ProxyStats,
}

impl ProxyState {
    pub fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            identity: group_identity(group),
            presence: HashMap::new(),
            last_pruned: None,
            stats: ProxyStats::default(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Group Proxy Identity used on the upstream link.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Process a message from a local agent.
    pub fn handle_agent_frame(&mut self, frames: Multipart) -> ProxyAction {
        self.stats.from_agents += 1;

        if frames.len() != AGENT_FRAME_PARTS {
            return self.reject(format!(
                "expected {AGENT_FRAME_PARTS} frames from agent, got {}",
                frames.len()
            ));
        }
        let connection = Identity::from(frames[0].clone());
        let envelope = match Envelope::from_bytes(&frames[1]) {
            Ok(e) => e,
            Err(e) => return self.reject(e.to_string()),
        };

        if envelope.is_handshake() {
            self.stats.handshakes += 1;
            self.presence.insert(
                connection.clone(),
                AgentPresence {
                    connection: connection.clone(),
                    agent: envelope.from.clone(),
                    connected_at: now_ms(),
                },
            );
            return ProxyAction::Handshake {
                connection,
                agent: envelope.from,
            };
        }

        let Some(destination) = envelope.destination() else {
            return self.reject("message has no destination".into());
        };

        self.stats.upstream += 1;
        let mut frames = frames;
        let payload = frames.pop().unwrap_or_default();
        ProxyAction::Upstream {
            frames: vec![
                Bytes::copy_from_slice(destination.as_bytes()),
                connection.to_frame(),
                payload,
            ],
        }
    }

    /// Process a message from the hub. Delivered verbatim.
    pub fn handle_hub_frame(&mut self, frames: Multipart) -> ProxyAction {
        if frames.len() != HUB_DOWNSTREAM_PARTS {
            return self.reject(format!(
                "expected {HUB_DOWNSTREAM_PARTS} frames from hub, got {}",
                frames.len()
            ));
        }
        if frames[0].is_empty() {
            return self.reject("empty destination connection".into());
        }
        ProxyAction::Deliver { frames }
    }

    pub fn record_delivery(&mut self, outcome: SendOutcome) {
        self.stats.record_delivery(outcome);
    }

    /// True once `every` has passed since the last prune, or if there
    /// has been none and something is recorded.
    pub fn prune_due(&self, now: Instant, every: Duration) -> bool {
        match self.last_pruned {
            Some(at) => now.saturating_duration_since(at) >= every,
            None => !self.presence.is_empty(),
        }
    }

    /// Forget presence records for connections that are gone.
    pub fn prune_presence(&mut self, live: &[Identity], now: Instant) -> usize {
        self.last_pruned = Some(now);
        let before = self.presence.len();
        self.presence.retain(|connection, _| live.contains(connection));
        before - self.presence.len()
    }

    /// Handshaken connections, sorted by agent name.
    pub fn presence(&self) -> Vec<AgentPresence> {
        let mut agents: Vec<_> = self.presence.values().cloned().collect();
        agents.sort_by(|a, b| a.agent.cmp(&b.agent).then_with(|| a.connection.cmp(&b.connection)));
        agents
    }

    pub fn stats(&self) -> ProxyStats {
        self.stats
    }

    fn reject(&mut self, reason: String) -> ProxyAction {
        self.stats.dropped += 1;
        ProxyAction::Drop { reason }
    }
}
