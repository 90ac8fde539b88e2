//! Hub event loop.
//!
//! One task owns the router socket and the [`HubState`]. Each iteration
//! waits up to `poll_interval` for a command or an upstream frame, then
//! drains every frame already queued before waiting again.

use std::time::Duration;

use mesh_transport::{Multipart, RouterSocket};
use tokio::sync::mpsc;

use crate::error::MeshError;
use crate::hub::HubState;

use super::sink::execute_hub_action;
use super::{HubCommand, HubSnapshot};

enum HubEvent {
    Command(HubCommand),
    Upstream(Result<Multipart, mesh_transport::TransportError>),
}

pub(super) async fn run_hub_loop(
    mut router: RouterSocket,
    mut state: HubState,
    mut cmd_rx: mpsc::Receiver<HubCommand>,
    poll_interval: Duration,
) -> Result<(), MeshError> {
    tracing::info!(addr = %router.local_addr(), "hub loop started");

    loop {
        let waited = tokio::time::timeout(poll_interval, async {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => HubEvent::Command(cmd),
                frames = router.recv() => HubEvent::Upstream(frames),
            }
        })
        .await;

        let Ok(event) = waited else {
            // Idle tick
            continue;
        };

        match event {
            HubEvent::Command(HubCommand::Shutdown) => {
                tracing::info!("hub shutting down");
                router.close();
                return Ok(());
            }
            HubEvent::Command(cmd) => serve_command(cmd, &router, &state),
            HubEvent::Upstream(Ok(frames)) => {
                process(frames, &router, &mut state)?;
                while let Some(frames) = router.try_recv().map_err(fatal)? {
                    process(frames, &router, &mut state)?;
                }
            }
            HubEvent::Upstream(Err(e)) => return Err(fatal(e)),
        }
    }
}

fn process(frames: Multipart, router: &RouterSocket, state: &mut HubState) -> Result<(), MeshError> {
    let action = state.handle_frame(frames);
    execute_hub_action(action, router, state).map_err(fatal)
}

fn fatal(e: mesh_transport::TransportError) -> MeshError {
    tracing::error!("hub transport failed: {e}");
    MeshError::Transport(e)
}

fn serve_command(cmd: HubCommand, router: &RouterSocket, state: &HubState) {
    match cmd {
        HubCommand::Snapshot { reply } => {
            let _ = reply.send(HubSnapshot {
                routes: state.table().routes(),
                history_len: state.history().len(),
                history_capacity: state.history().capacity(),
                connected_proxies: router.peers(),
                stats: state.stats(),
            });
        }
        HubCommand::RecentHistory { limit, reply } => {
            let _ = reply.send(state.history().recent(limit));
        }
        HubCommand::Shutdown => {}
    }
}
