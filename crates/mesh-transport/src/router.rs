use crate::codec::{Multipart, MultipartCodec};
use crate::config::SocketConfig;
use crate::queue::offer;
use crate::{Identity, SendOutcome, TransportError};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// A live connection's outbound queue, tagged with the connection
/// serial so a closing connection only unregisters itself.
struct PeerSlot {
    serial: u64,
    tx: mpsc::Sender<Multipart>,
}

#[derive(Default)]
struct Registry {
    peers: Mutex<HashMap<Identity, PeerSlot>>,
    next_serial: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, PeerSlot>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adopt the requested identity if it is free, otherwise generate one.
    fn register(&self, requested: Identity, tx: mpsc::Sender<Multipart>) -> (Identity, u64) {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let mut peers = self.lock();
        let mut identity = requested;
        while identity.is_empty() || peers.contains_key(&identity) {
            identity = Identity::generate();
        }
        peers.insert(identity.clone(), PeerSlot { serial, tx });
        (identity, serial)
    }

    fn unregister(&self, identity: &Identity, serial: u64) {
        let mut peers = self.lock();
        if peers.get(identity).is_some_and(|slot| slot.serial == serial) {
            peers.remove(identity);
        }
    }

    fn sender(&self, identity: &Identity) -> Option<mpsc::Sender<Multipart>> {
        self.lock().get(identity).map(|slot| slot.tx.clone())
    }
}

/// Bind-side socket: accepts connections and routes by [`Identity`].
///
/// Received messages are prefixed with the sender's identity frame.
/// Sent messages must start with the destination's identity frame,
/// which is stripped before the rest is written to that connection.
pub struct RouterSocket {
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    incoming_rx: mpsc::Receiver<Multipart>,
    shutdown: CancellationToken,
    codec: MultipartCodec,
}

impl RouterSocket {
    /// Bind a listener and start accepting connections.
    pub async fn bind(addr: &str, config: SocketConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(Registry::default());
        let (incoming_tx, incoming_rx) = mpsc::channel(config.recv_buffer);
        let shutdown = CancellationToken::new();

        tokio::spawn(accept_loop(
            listener,
            registry.clone(),
            incoming_tx,
            config.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            local_addr,
            registry,
            incoming_rx,
            shutdown,
            codec: MultipartCodec::from_config(&config),
        })
    }

    /// Address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive the next message as `[sender_identity, frames...]`.
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Result<Multipart, TransportError> {
        self.incoming_rx.recv().await.ok_or(TransportError::Closed)
    }

    /// Receive a message only if one is already waiting.
    pub fn try_recv(&mut self) -> Result<Option<Multipart>, TransportError> {
        match self.incoming_rx.try_recv() {
            Ok(frames) => Ok(Some(frames)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// Queue `[destination_identity, frames...]` for delivery. Never blocks.
    pub fn send(&self, mut frames: Multipart) -> Result<SendOutcome, TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if frames.len() < 2 {
            return Err(TransportError::Protocol(
                "router send needs an identity frame and a body".into(),
            ));
        }
        let identity = Identity::from(frames.remove(0));
        self.codec.validate(&frames)?;

        let Some(tx) = self.registry.sender(&identity) else {
            return Ok(SendOutcome::UnknownPeer);
        };
        // A closing connection is the same as never having been there
        Ok(offer(&tx, frames).unwrap_or(SendOutcome::UnknownPeer))
    }

    /// Identities of all currently registered connections.
    pub fn peers(&self) -> Vec<Identity> {
        let mut peers: Vec<Identity> = self.registry.lock().keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Stop accepting and drop every connection. Queued messages are abandoned.
    pub fn close(self) {
        self.shutdown.cancel();
    }
}

impl Drop for RouterSocket {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    incoming_tx: mpsc::Sender<Multipart>,
    config: SocketConfig,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, remote)) => {
                tokio::spawn(serve_connection(
                    stream,
                    remote,
                    registry.clone(),
                    incoming_tx.clone(),
                    config.clone(),
                    shutdown.clone(),
                ));
            }
            Err(e) => {
                // Usually fd exhaustion; back off instead of spinning
                tracing::warn!("accept failed: {e}");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    registry: Arc<Registry>,
    incoming_tx: mpsc::Sender<Multipart>,
    config: SocketConfig,
    shutdown: CancellationToken,
) {
    let _ = stream.set_nodelay(true);
    let (mut sink, mut stream) = Framed::new(stream, MultipartCodec::from_config(&config)).split();

    let requested = match tokio::time::timeout(config.handshake_timeout, stream.next()).await {
        Ok(Some(Ok(mut frames))) if frames.len() == 1 => Identity::from(frames.remove(0)),
        Ok(Some(Ok(frames))) => {
            tracing::warn!(%remote, "greeting must be one frame, got {}", frames.len());
            return;
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(%remote, "bad greeting: {e}");
            return;
        }
        Ok(None) => return,
        Err(_) => {
            tracing::warn!(%remote, "no greeting within {:?}", config.handshake_timeout);
            return;
        }
    };

    let (out_tx, mut out_rx) = mpsc::channel::<Multipart>(config.send_queue);
    let (identity, serial) = registry.register(requested.clone(), out_tx);
    if !requested.is_empty() && requested != identity {
        tracing::warn!(%remote, "identity '{requested}' already connected, assigned '{identity}'");
    }
    tracing::debug!(%remote, connection = %identity, "connection registered");

    let identity_frame: Bytes = identity.to_frame();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            outbound = out_rx.recv() => match outbound {
                Some(frames) => {
                    if let Err(e) = sink.send(frames).await {
                        tracing::warn!(connection = %identity, "write failed: {e}");
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(mut frames)) => {
                    frames.insert(0, identity_frame.clone());
                    if incoming_tx.send(frames).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(connection = %identity, "closing connection: {e}");
                    break;
                }
                None => break,
            },
        }
    }

    registry.unregister(&identity, serial);
    tracing::debug!(%remote, connection = %identity, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> mpsc::Sender<Multipart> {
        mpsc::channel(1).0
    }

    #[test]
    fn register_adopts_free_identity() {
        let registry = Registry::default();
        let (id, _) = registry.register(Identity::from("alice"), queue());
        assert_eq!(id, Identity::from("alice"));
    }

    #[test]
    fn register_generates_for_empty_or_taken() {
        let registry = Registry::default();
        let (empty, _) = registry.register(Identity::new(Bytes::new()), queue());
        assert!(empty.to_string().starts_with("conn-"));

        registry.register(Identity::from("alice"), queue());
        let (dup, _) = registry.register(Identity::from("alice"), queue());
        assert_ne!(dup, Identity::from("alice"));
        assert_eq!(registry.lock().len(), 3);
    }

    #[test]
    fn unregister_ignores_stale_serial() {
        let registry = Registry::default();
        let (id, first) = registry.register(Identity::from("alice"), queue());
        registry.unregister(&id, first);

        let (id, second) = registry.register(Identity::from("alice"), queue());
        // The old connection's late cleanup must not evict the new one
        registry.unregister(&id, first);
        assert!(registry.sender(&id).is_some());
        registry.unregister(&id, second);
        assert!(registry.sender(&id).is_none());
    }
}
