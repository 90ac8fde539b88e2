//! Proxy event loop.
//!
//! Multiplexes the local router socket (agents) and the dealer link to the
//! hub. Losing either socket ends the loop with an error.

use std::time::{Duration, Instant};

use mesh_transport::{DealerSocket, Multipart, RouterSocket, TransportError};
use tokio::sync::mpsc;

use crate::error::MeshError;
use crate::proxy::ProxyState;

use super::sink::execute_proxy_action;
use super::{ProxyCommand, ProxySnapshot};

enum ProxyEvent {
    Command(ProxyCommand),
    FromAgent(Result<Multipart, TransportError>),
    FromHub(Result<Multipart, TransportError>),
}

pub(super) async fn run_proxy_loop(
    mut local: RouterSocket,
    mut hub: DealerSocket,
    mut state: ProxyState,
    mut cmd_rx: mpsc::Receiver<ProxyCommand>,
    poll_interval: Duration,
) -> Result<(), MeshError> {
    tracing::info!(
        proxy = %state.identity(),
        local = %local.local_addr(),
        hub = %hub.peer_addr(),
        "proxy loop started"
    );

    loop {
        let waited = tokio::time::timeout(poll_interval, async {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => ProxyEvent::Command(cmd),
                frames = local.recv() => ProxyEvent::FromAgent(frames),
                frames = hub.recv() => ProxyEvent::FromHub(frames),
            }
        })
        .await;

        let Ok(event) = waited else {
            prune_if_due(&local, &mut state, poll_interval);
            continue;
        };

        match event {
            ProxyEvent::Command(ProxyCommand::Shutdown) => {
                tracing::info!(proxy = %state.identity(), "proxy shutting down");
                hub.close();
                local.close();
                return Ok(());
            }
            ProxyEvent::Command(cmd) => serve_command(cmd, &local, &state),
            ProxyEvent::FromAgent(Ok(frames)) => {
                let action = state.handle_agent_frame(frames);
                execute_proxy_action(action, &local, &hub, &mut state).map_err(|e| fatal("local", e))?;
            }
            ProxyEvent::FromHub(Ok(frames)) => {
                let action = state.handle_hub_frame(frames);
                execute_proxy_action(action, &local, &hub, &mut state).map_err(|e| fatal("hub", e))?;
            }
            ProxyEvent::FromAgent(Err(e)) => return Err(fatal("local", e)),
            ProxyEvent::FromHub(Err(e)) => return Err(fatal("hub", e)),
        }

        drain(&mut local, &mut hub, &mut state)?;
        prune_if_due(&local, &mut state, poll_interval);
    }
}

/// Forget presence of closed connections at most once per interval.
fn prune_if_due(local: &RouterSocket, state: &mut ProxyState, every: Duration) {
    let now = Instant::now();
    if !state.prune_due(now, every) {
        return;
    }
    let pruned = state.prune_presence(&local.peers(), now);
    if pruned > 0 {
        tracing::debug!(pruned, "forgot closed agent connections");
    }
}

/// Process everything already queued on either side without waiting.
fn drain(local: &mut RouterSocket, hub: &mut DealerSocket, state: &mut ProxyState) -> Result<(), MeshError> {
    loop {
        let mut progressed = false;
        if let Some(frames) = local.try_recv().map_err(|e| fatal("local", e))? {
            let action = state.handle_agent_frame(frames);
            execute_proxy_action(action, &*local, &*hub, state).map_err(|e| fatal("hub", e))?;
            progressed = true;
        }
        if let Some(frames) = hub.try_recv().map_err(|e| fatal("hub", e))? {
            let action = state.handle_hub_frame(frames);
            execute_proxy_action(action, &*local, &*hub, state).map_err(|e| fatal("local", e))?;
            progressed = true;
        }
        if !progressed {
            return Ok(());
        }
    }
}

fn fatal(side: &str, e: TransportError) -> MeshError {
    tracing::error!(side, "proxy transport failed: {e}");
    MeshError::Transport(e)
}

fn serve_command(cmd: ProxyCommand, local: &RouterSocket, state: &ProxyState) {
    match cmd {
        ProxyCommand::Snapshot { reply } => {
            let _ = reply.send(ProxySnapshot {
                group: state.group().to_string(),
                group_identity: state.identity().clone(),
                connected_agents: state.presence(),
                local_peers: local.peers(),
                stats: state.stats(),
            });
        }
        ProxyCommand::Shutdown => {}
    }
}
