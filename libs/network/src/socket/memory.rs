//! In-process datagram pair
//!
//! Deterministic stand-in for a UDP socket pair: datagrams are delivered in
//! send order, never dropped, and a full queue makes `send` wait. Once one
//! side is dropped the other drains what is queued and then sees
//! [`RecvStatus::Closed`].

use async_trait::async_trait;
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::{DatagramSocket, RecvStatus, MAX_DATAGRAM};
use crate::{Result, TransportError};

static NEXT_PORT: AtomicU16 = AtomicU16::new(40000);

pub struct MemorySocket {
    tx: mpsc::Sender<Bytes>,
    rx: mpsc::Receiver<Bytes>,
    local: SocketAddr,
    peer: SocketAddr,
}

impl MemorySocket {
    /// Two connected endpoints, each queueing up to `capacity` datagrams
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
        let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
        let a_addr = Self::next_addr();
        let b_addr = Self::next_addr();
        (
            Self {
                tx: a_tx,
                rx: a_rx,
                local: a_addr,
                peer: b_addr,
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                local: b_addr,
                peer: a_addr,
            },
        )
    }

    fn next_addr() -> SocketAddr {
        let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl DatagramSocket for MemorySocket {
    async fn send(&self, datagram: &[u8]) -> Result<usize> {
        if datagram.len() > MAX_DATAGRAM {
            return Err(TransportError::configuration(
                format!(
                    "Datagram of {} bytes exceeds UDP maximum {}",
                    datagram.len(),
                    MAX_DATAGRAM
                ),
                Some("mtu"),
            ));
        }
        self.tx
            .send(Bytes::copy_from_slice(datagram))
            .await
            .map_err(|_| TransportError::network(format!("Peer {} is closed", self.peer)))?;
        Ok(datagram.len())
    }

    async fn recv(&mut self, buf: &mut [u8], wait: Duration) -> Result<RecvStatus> {
        match timeout(wait, self.rx.recv()).await {
            Err(_) => Ok(RecvStatus::Timeout),
            Ok(None) => Ok(RecvStatus::Closed),
            Ok(Some(datagram)) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(RecvStatus::Datagram {
                    len,
                    from: self.peer,
                })
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local)
    }
}
