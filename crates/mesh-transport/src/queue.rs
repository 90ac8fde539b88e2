use crate::codec::Multipart;
use crate::SendOutcome;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Hand `frames` to a connection's outbound queue without waiting.
///
/// `None` means the connection's writer is gone.
pub(crate) fn offer(tx: &mpsc::Sender<Multipart>, frames: Multipart) -> Option<SendOutcome> {
    match tx.try_send(frames) {
        Ok(()) => Some(SendOutcome::Queued),
        Err(TrySendError::Full(_)) => Some(SendOutcome::QueueFull),
        Err(TrySendError::Closed(_)) => None,
    }
}
