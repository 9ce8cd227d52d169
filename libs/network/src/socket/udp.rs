//! UDP socket
//!
//! Thin wrapper over `tokio::net::UdpSocket` adding multicast setup,
//! connected-mode sends and receive timeouts reported as status rather than
//! errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, trace};

use super::{DatagramSocket, RecvStatus, MAX_DATAGRAM};
use crate::{Result, TransportError};

/// UDP socket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Local address to bind to
    pub bind_address: SocketAddr,
    /// Remote address for connected mode (optional)
    pub remote_address: Option<SocketAddr>,
    pub multicast: Option<MulticastConfig>,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            remote_address: None,
            multicast: None,
        }
    }
}

/// Multicast configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticastConfig {
    pub group: Ipv4Addr,
    /// Interface for multicast, any interface if unset
    pub interface: Option<Ipv4Addr>,
    /// TTL for outbound multicast packets
    pub ttl: Option<u32>,
}

impl UdpConfig {
    /// Socket settings of one configured stream
    pub fn from_stream(stream: &config::StreamConfig) -> Result<Self> {
        let bind_address = stream
            .bind_addr()?
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
        Ok(Self {
            bind_address,
            remote_address: stream.connect_addr()?,
            multicast: stream.multicast_group.map(|group| MulticastConfig {
                group,
                interface: stream.multicast_interface,
                ttl: None,
            }),
        })
    }
}

#[derive(Debug)]
pub struct UdpSocket {
    socket: tokio::net::UdpSocket,
    peer: Option<SocketAddr>,
}

impl UdpSocket {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = tokio::net::UdpSocket::bind(addr).await.map_err(|e| {
            TransportError::network_with_source(format!("Failed to bind UDP socket on {}", addr), e)
        })?;
        info!("UDP socket bound on: {}", addr);
        Ok(Self { socket, peer: None })
    }

    /// Bind, join multicast and connect as configured
    pub async fn from_config(config: &UdpConfig) -> Result<Self> {
        let mut socket = Self::bind(config.bind_address).await?;
        if let Some(ref multicast) = config.multicast {
            socket.join_multicast(multicast.group, multicast.interface)?;
            if let Some(ttl) = multicast.ttl {
                socket.set_multicast_ttl(ttl)?;
            }
        }
        if let Some(remote) = config.remote_address {
            socket.connect(remote).await?;
        }
        Ok(socket)
    }

    /// Fix the destination of every `send`
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        self.socket.connect(addr).await.map_err(|e| {
            TransportError::network_with_source(format!("Failed to connect UDP socket to {}", addr), e)
        })?;
        self.peer = Some(addr);
        info!("UDP socket connected to: {}", addr);
        Ok(())
    }

    pub fn join_multicast(&self, group: Ipv4Addr, interface: Option<Ipv4Addr>) -> Result<()> {
        if !group.is_multicast() {
            return Err(TransportError::configuration(
                format!("{} is not a multicast group", group),
                Some("multicast_group"),
            ));
        }
        let interface = interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
        self.socket.join_multicast_v4(group, interface).map_err(|e| {
            TransportError::network_with_source(format!("Failed to join multicast group {}", group), e)
        })?;
        info!("Joined multicast group: {} on {}", group, interface);
        Ok(())
    }

    pub fn set_multicast_ttl(&self, ttl: u32) -> Result<()> {
        self.socket.set_multicast_ttl_v4(ttl).map_err(|e| {
            TransportError::network_with_source(format!("Failed to set multicast TTL to {}", ttl), e)
        })
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

#[async_trait]
impl DatagramSocket for UdpSocket {
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
        if self.peer.is_none() {
            return Err(TransportError::configuration(
                "UDP socket is not connected",
                Some("connect"),
            ));
        }
        self.socket
            .send(datagram)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to send UDP packet", e))
    }

    async fn recv(&mut self, buf: &mut [u8], wait: Duration) -> Result<RecvStatus> {
        match timeout(wait, self.socket.recv_from(buf)).await {
            Err(_) => Ok(RecvStatus::Timeout),
            Ok(Ok((len, from))) => {
                trace!("Received UDP packet from {}: {} bytes", from, len);
                Ok(RecvStatus::Datagram { len, from })
            }
            Ok(Err(e)) => Err(TransportError::network_with_source(
                "Failed to receive UDP packet",
                e,
            )),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::network_with_source("Failed to get local address", e))
    }
}
