use crate::codec::{Multipart, MultipartCodec};
use crate::config::SocketConfig;
use crate::queue::offer;
use crate::{Identity, SendOutcome, TransportError};

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Connect-side socket: one TCP link to a [`RouterSocket`](crate::RouterSocket).
///
/// The identity is announced in the greeting. The router adopts it if no
/// other live connection holds it.
pub struct DealerSocket {
    identity: Identity,
    peer_addr: SocketAddr,
    outbound_tx: mpsc::Sender<Multipart>,
    incoming_rx: mpsc::Receiver<Multipart>,
    shutdown: CancellationToken,
    codec: MultipartCodec,
    pump: Option<JoinHandle<()>>,
}

impl DealerSocket {
    /// Connect to `addr` (`host:port`), retrying per the config, and send the greeting.
    pub async fn connect(
        addr: &str,
        identity: Identity,
        config: SocketConfig,
    ) -> Result<Self, TransportError> {
        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(e) if attempt < config.connect_attempts => {
                    tracing::debug!("connect to {addr} failed (attempt {attempt}): {e}");
                    tokio::time::sleep(config.connect_backoff).await;
                }
                Err(source) => {
                    return Err(TransportError::Connect {
                        addr: addr.to_string(),
                        attempts: attempt,
                        source,
                    })
                }
            }
        };
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;

        let codec = MultipartCodec::from_config(&config);
        let mut framed = Framed::new(stream, codec.clone());
        framed.send(vec![identity.to_frame()]).await?;

        let (outbound_tx, outbound_rx) = mpsc::channel(config.send_queue);
        let (incoming_tx, incoming_rx) = mpsc::channel(config.recv_buffer);
        let shutdown = CancellationToken::new();

        let pump = tokio::spawn(pump(
            framed,
            outbound_rx,
            incoming_tx,
            shutdown.clone(),
            identity.clone(),
        ));

        Ok(Self {
            identity,
            peer_addr,
            outbound_tx,
            incoming_rx,
            shutdown,
            codec,
            pump: Some(pump),
        })
    }

    /// The identity this socket asked for in its greeting.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Queue a message for the router. Never blocks.
    pub fn send(&self, frames: Multipart) -> Result<SendOutcome, TransportError> {
        self.codec.validate(&frames)?;
        offer(&self.outbound_tx, frames).ok_or(TransportError::Closed)
    }

    /// Receive the next message. Fails with [`TransportError::Closed`] once
    /// the link is gone. Cancel-safe.
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

    /// Drop the link. Queued messages are abandoned.
    pub fn close(self) {
        self.shutdown.cancel();
    }

    /// Write out everything already queued, then drop the link.
    ///
    /// Waits at most `limit`. Returns false if the queue was not flushed
    /// in time, in which case the rest is abandoned.
    pub async fn close_flushed(mut self, limit: Duration) -> bool {
        let (detached, _) = mpsc::channel(1);
        drop(std::mem::replace(&mut self.outbound_tx, detached));
        match self.pump.take() {
            Some(pump) => tokio::time::timeout(limit, pump).await.is_ok(),
            None => true,
        }
    }
}

impl Drop for DealerSocket {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn pump(
    framed: Framed<TcpStream, MultipartCodec>,
    mut outbound_rx: mpsc::Receiver<Multipart>,
    incoming_tx: mpsc::Sender<Multipart>,
    shutdown: CancellationToken,
    identity: Identity,
) {
    let (mut sink, mut stream) = framed.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            outbound = outbound_rx.recv() => match outbound {
                Some(frames) => {
                    if let Err(e) = sink.send(frames).await {
                        tracing::warn!(%identity, "write failed: {e}");
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(frames)) => {
                    if incoming_tx.send(frames).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(%identity, "link closed: {e}");
                    break;
                }
                None => {
                    tracing::debug!(%identity, "peer closed the link");
                    break;
                }
            },
        }
    }
}
