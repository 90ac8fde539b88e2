/// Hub and proxy runtimes.
///
/// Each runtime owns its sockets and engine state inside one task. The
/// outside world talks to it through a cloneable handle that sends
/// commands; queries are answered on the loop task from its own state.
mod hub_loop;
mod proxy_loop;
mod sink;

use std::net::SocketAddr;
use std::time::Duration;

use mesh_transport::{DealerSocket, RouterSocket};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{HubConfig, ProxyConfig};
use crate::error::MeshError;
use crate::hub::{HubState, HubStats};
use crate::proxy::{AgentPresence, ProxyState, ProxyStats};
use crate::table::RoutingTable;
use crate::types::Identity;

const COMMAND_BUFFER: usize = 64;

// ── Commands ──────────────────────────────────────────────────────────

pub enum HubCommand {
    Snapshot { reply: oneshot::Sender<HubSnapshot> },
    RecentHistory {
        limit: usize,
        reply: oneshot::Sender<Vec<Value>>,
    },
    /// Exit the loop. Queued messages are abandoned.
    Shutdown,
}

pub enum ProxyCommand {
    Snapshot { reply: oneshot::Sender<ProxySnapshot> },
    Shutdown,
}

// ── Snapshots ─────────────────────────────────────────────────────────

/// Read-only view of the hub, built on the loop task.
#[derive(Debug, Clone, Serialize)]
pub struct HubSnapshot {
    pub routes: Vec<(String, Identity)>,
    pub history_len: usize,
    pub history_capacity: usize,
    pub connected_proxies: Vec<Identity>,
    pub stats: HubStats,
}

impl HubSnapshot {
    pub fn route(&self, agent: &str) -> Option<&Identity> {
        self.routes.iter().find(|(a, _)| a == agent).map(|(_, p)| p)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxySnapshot {
    pub group: String,
    pub group_identity: Identity,
    /// Connections that sent a handshake and are still open.
    pub connected_agents: Vec<AgentPresence>,
    /// Every open local connection.
    pub local_peers: Vec<Identity>,
    pub stats: ProxyStats,
}

// ── Handles ───────────────────────────────────────────────────────────

/// Handle to a running hub. Cheap to clone.
#[derive(Clone)]
pub struct HubHandle {
    cmd_tx: mpsc::Sender<HubCommand>,
    local_addr: SocketAddr,
}

impl HubHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn snapshot(&self) -> Result<HubSnapshot, MeshError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(HubCommand::Snapshot { reply })
            .await
            .map_err(|_| MeshError::Shutdown)?;
        rx.await.map_err(|_| MeshError::Shutdown)
    }

    /// The last `limit` history entries, newest last.
    pub async fn recent_history(&self, limit: usize) -> Result<Vec<Value>, MeshError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(HubCommand::RecentHistory { limit, reply })
            .await
            .map_err(|_| MeshError::Shutdown)?;
        rx.await.map_err(|_| MeshError::Shutdown)
    }

    /// Stop the loop. No-op if it already exited.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(HubCommand::Shutdown).await;
    }
}

/// Handle to a running proxy. Cheap to clone.
#[derive(Clone)]
pub struct ProxyHandle {
    cmd_tx: mpsc::Sender<ProxyCommand>,
    local_addr: SocketAddr,
    identity: Identity,
}

impl ProxyHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub async fn snapshot(&self) -> Result<ProxySnapshot, MeshError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(ProxyCommand::Snapshot { reply })
            .await
            .map_err(|_| MeshError::Shutdown)?;
        rx.await.map_err(|_| MeshError::Shutdown)
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ProxyCommand::Shutdown).await;
    }
}

// ── Hub ───────────────────────────────────────────────────────────────

/// The central hub: a bound listener plus its routing state.
pub struct MeshHub {
    router: RouterSocket,
    state: HubState,
    poll_interval: Duration,
}

impl MeshHub {
    /// Bind the hub's listening address. Failing to bind is fatal.
    pub async fn bind(config: HubConfig) -> Result<Self, MeshError> {
        let router = RouterSocket::bind(&config.bind_addr, config.socket.clone()).await?;
        let table = RoutingTable::with_seeds(config.seeds.iter().map(|(a, g)| (a.clone(), g.as_str())));
        tracing::info!(
            addr = %router.local_addr(),
            seeds = table.len(),
            history = config.history_capacity,
            learn_senders = config.learn_senders,
            "hub bound"
        );
        Ok(Self {
            router,
            state: HubState::new(table, config.history_capacity, config.learn_senders),
            poll_interval: config.poll_interval,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.router.local_addr()
    }

    /// Start the loop on its own task.
    pub fn spawn(self) -> (HubHandle, JoinHandle<Result<(), MeshError>>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = HubHandle {
            cmd_tx,
            local_addr: self.local_addr(),
        };
        let task = tokio::spawn(hub_loop::run_hub_loop(
            self.router,
            self.state,
            cmd_rx,
            self.poll_interval,
        ));
        (handle, task)
    }
}

// ── Proxy ─────────────────────────────────────────────────────────────

/// A group proxy: local listener, hub link, and presence state.
pub struct GroupProxy {
    local: RouterSocket,
    hub: DealerSocket,
    state: ProxyState,
    poll_interval: Duration,
}

impl GroupProxy {
    /// Bind the local endpoint, then connect to the hub.
    pub async fn bind(config: ProxyConfig) -> Result<Self, MeshError> {
        config.validate()?;
        let state = ProxyState::new(&config.name);

        let local = RouterSocket::bind(&config.listen_addr, config.socket.clone()).await?;
        let hub = DealerSocket::connect(&config.hub_addr, state.identity().clone(), config.socket.clone()).await?;
        tracing::info!(
            proxy = %state.identity(),
            local = %local.local_addr(),
            hub = %hub.peer_addr(),
            "proxy ready"
        );

        Ok(Self {
            local,
            hub,
            state,
            poll_interval: config.poll_interval,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local.local_addr()
    }

    pub fn identity(&self) -> &Identity {
        self.state.identity()
    }

    pub fn spawn(self) -> (ProxyHandle, JoinHandle<Result<(), MeshError>>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = ProxyHandle {
            cmd_tx,
            local_addr: self.local_addr(),
            identity: self.identity().clone(),
        };
        let task = tokio::spawn(proxy_loop::run_proxy_loop(
            self.local,
            self.hub,
            self.state,
            cmd_rx,
            self.poll_interval,
        ));
        (handle, task)
    }
}
