//! Datagram socket boundary
//!
//! Capture and transmit never create sockets; they are handed something
//! implementing [`DatagramSocket`]. Destination, multicast membership and
//! buffer sizing are properties of the socket, invisible to the layers
//! above.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

use crate::Result;

pub mod memory;
pub mod udp;

pub use memory::MemorySocket;
pub use udp::{MulticastConfig, UdpConfig, UdpSocket};

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM: usize = 65507;

/// Outcome of one receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvStatus {
    /// `len` bytes were copied into the buffer
    Datagram { len: usize, from: SocketAddr },
    /// Nothing arrived within the timeout
    Timeout,
    /// The peer is gone and nothing more will arrive
    Closed,
}

#[async_trait]
pub trait DatagramSocket: Send + Sync {
    /// Send one datagram, returning the bytes written
    async fn send(&self, datagram: &[u8]) -> Result<usize>;

    /// Receive one datagram into `buf`
    ///
    /// A datagram longer than `buf` is truncated to `buf.len()`, as a UDP
    /// socket would. Must be cancel safe: a dropped call loses no datagram.
    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<RecvStatus>;

    fn local_addr(&self) -> Result<SocketAddr>;
}
