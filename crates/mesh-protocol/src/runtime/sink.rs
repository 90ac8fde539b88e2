//! Action executor. The only place the engines' decisions touch a socket.
//!
//! Sends are non-blocking. `UnknownPeer` and `QueueFull` are counted and
//! logged; a per-message transport rejection (too large, too many frames)
//! drops that message; only `Closed` is returned to the loop as fatal.

use mesh_transport::{DealerSocket, Multipart, RouterSocket, SendOutcome, TransportError};

use crate::hub::{HubAction, HubState};
use crate::proxy::{ProxyAction, ProxyState};

/// Something frames can be handed to without blocking.
pub(crate) trait FrameSink {
    fn send_frames(&self, frames: Multipart) -> Result<SendOutcome, TransportError>;
}

impl FrameSink for RouterSocket {
    fn send_frames(&self, frames: Multipart) -> Result<SendOutcome, TransportError> {
        self.send(frames)
    }
}

impl FrameSink for DealerSocket {
    fn send_frames(&self, frames: Multipart) -> Result<SendOutcome, TransportError> {
        self.send(frames)
    }
}

/// Send, turning per-message failures into `None`.
fn try_send<S: FrameSink>(sink: &S, frames: Multipart) -> Result<Option<SendOutcome>, TransportError> {
    match sink.send_frames(frames) {
        Ok(outcome) => Ok(Some(outcome)),
        Err(TransportError::Closed) => Err(TransportError::Closed),
        Err(e) => {
            tracing::warn!("dropping message the transport rejected: {e}");
            Ok(None)
        }
    }
}

pub(super) fn execute_hub_action<S: FrameSink>(
    action: HubAction,
    router: &S,
    state: &mut HubState,
) -> Result<(), TransportError> {
    match action {
        HubAction::Forward {
            target,
            frames,
            learned,
        } => {
            let destination = String::from_utf8_lossy(&frames[1]).into_owned();
            let sender = String::from_utf8_lossy(&frames[2]).into_owned();
            if learned {
                tracing::info!(agent = %destination, proxy = %target, "learned route");
            }
            let Some(outcome) = try_send(router, frames)? else {
                state.record_send(SendOutcome::UnknownPeer);
                return Ok(());
            };
            state.record_send(outcome);
            match outcome {
                SendOutcome::Queued => {
                    tracing::info!(from = %sender, to = %destination, proxy = %target, "relayed");
                }
                SendOutcome::UnknownPeer => {
                    tracing::debug!(to = %destination, proxy = %target, "proxy not connected, dropped");
                }
                SendOutcome::QueueFull => {
                    tracing::warn!(to = %destination, proxy = %target, "proxy queue full, dropped");
                }
            }
        }
        HubAction::Drop { reason } => {
            tracing::warn!("dropping malformed upstream frame: {reason}");
        }
    }
    Ok(())
}

pub(super) fn execute_proxy_action<L: FrameSink, H: FrameSink>(
    action: ProxyAction,
    local: &L,
    hub: &H,
    state: &mut ProxyState,
) -> Result<(), TransportError> {
    match action {
        ProxyAction::Upstream { frames } => {
            let destination = String::from_utf8_lossy(&frames[0]).into_owned();
            let connection = String::from_utf8_lossy(&frames[1]).into_owned();
            match try_send(hub, frames)? {
                Some(SendOutcome::Queued) => {
                    tracing::info!(connection = %connection, to = %destination, "forwarded to hub");
                }
                Some(outcome) => {
                    tracing::warn!(to = %destination, ?outcome, "hub link saturated, dropped");
                }
                None => {}
            }
        }
        ProxyAction::Handshake { connection, agent } => {
            tracing::info!(connection = %connection, agent = %agent, "agent handshake");
        }
        ProxyAction::Deliver { frames } => {
            let connection = String::from_utf8_lossy(&frames[0]).into_owned();
            let outcome = try_send(local, frames)?.unwrap_or(SendOutcome::UnknownPeer);
            state.record_delivery(outcome);
            match outcome {
                SendOutcome::Queued => tracing::info!(connection = %connection, "delivered"),
                SendOutcome::UnknownPeer => {
                    tracing::debug!(connection = %connection, "no such local connection, dropped")
                }
                SendOutcome::QueueFull => {
                    tracing::warn!(connection = %connection, "agent queue full, dropped")
                }
            }
        }
        ProxyAction::Drop { reason } => {
            tracing::warn!(proxy = %state.identity(), "dropping message: {reason}");
        }
    }
    Ok(())
}
