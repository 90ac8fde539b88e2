use std::time::Duration;

use bytes::Bytes;
use mesh_transport::{DealerSocket, SendOutcome, SocketConfig};
use serde::Serialize;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::MeshError;
use crate::types::Identity;

/// A message delivered to an agent.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Connection Identity of the original sender at its proxy.
    pub sender: Identity,
    pub envelope: Envelope,
    /// Payload exactly as it crossed the mesh.
    pub raw: Bytes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

/// An agent's connection to its group proxy.
///
/// Connects with the agent name as its identity so replies addressed by
/// name reach it, and announces itself with a handshake.
pub struct AgentClient {
    name: String,
    dealer: DealerSocket,
    stats: ClientStats,
}

impl AgentClient {
    pub async fn connect(name: &str, proxy_addr: &str) -> Result<Self, MeshError> {
        Self::connect_with(name, proxy_addr, SocketConfig::new()).await
    }

    pub async fn connect_with(name: &str, proxy_addr: &str, config: SocketConfig) -> Result<Self, MeshError> {
        if name.is_empty() {
            return Err(MeshError::Config("agent name must not be empty".into()));
        }
        let dealer = DealerSocket::connect(proxy_addr, Identity::from(name), config).await?;
        let client = Self {
            name: name.to_string(),
            dealer,
            stats: ClientStats::default(),
        };
        client.send_frame(&Envelope::handshake(name))?;
        tracing::info!(agent = name, proxy = %client.dealer.peer_addr(), "agent connected");
        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build and send a message from this agent.
    pub fn send(&mut self, to: &str, msg_type: &str, content: Value) -> Result<Envelope, MeshError> {
        let envelope = Envelope::new(&self.name, to, msg_type, content);
        self.send_envelope(&envelope)?;
        Ok(envelope)
    }

    pub fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), MeshError> {
        let outcome = self.send_frame(envelope)?;
        self.count(outcome);
        Ok(())
    }

    /// Send an arbitrary payload without validating it.
    pub fn send_raw(&mut self, payload: impl Into<Bytes>) -> Result<(), MeshError> {
        let outcome = self.dealer.send(vec![payload.into()])?;
        self.count(outcome);
        Ok(())
    }

    fn send_frame(&self, envelope: &Envelope) -> Result<SendOutcome, MeshError> {
        let bytes = envelope.to_bytes()?;
        Ok(self.dealer.send(vec![Bytes::from(bytes)])?)
    }

    fn count(&mut self, outcome: SendOutcome) {
        if outcome.is_queued() {
            self.stats.sent += 1;
        } else {
            self.stats.dropped += 1;
            tracing::warn!(agent = %self.name, ?outcome, "send dropped");
        }
    }

    /// Wait for the next delivery.
    pub async fn recv(&mut self) -> Result<Delivery, MeshError> {
        let mut frames = self.dealer.recv().await?;
        if frames.len() != 2 {
            return Err(MeshError::MalformedFrame {
                reason: format!("expected 2 frames, got {}", frames.len()),
            });
        }
        let raw = frames.pop().unwrap_or_default();
        let sender = Identity::from(frames.pop().unwrap_or_default());
        let envelope = Envelope::from_bytes(&raw)?;
        self.stats.received += 1;
        Ok(Delivery { sender, envelope, raw })
    }

    /// Like [`recv`](Self::recv), giving up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Delivery>, MeshError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(delivery) => delivery.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn close(self) {
        self.dealer.close();
    }

    /// Close once everything sent so far is on the wire, waiting at most
    /// `limit`. Returns false if some of it was abandoned.
    pub async fn close_flushed(self, limit: Duration) -> bool {
        let flushed = self.dealer.close_flushed(limit).await;
        if !flushed {
            tracing::warn!(agent = %self.name, "closed with sends still queued");
        }
        flushed
    }
}
