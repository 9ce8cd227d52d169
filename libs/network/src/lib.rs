//! UDP Capture and Transmit
//!
//! Moves sample data between datagram sockets and a [`stream_ring::Ring`]:
//!
//! - [`PacketCapture`] decodes every datagram of a logical stream, places
//!   its payload by interval and source, and pushes each assembled span into
//!   the ring with exact loss accounting.
//! - [`PacketTransmit`] cuts source-major frames back into protocol
//!   conformant datagrams.
//!
//! Both sides report counters through an injected [`MetricsSink`] and never
//! create sockets themselves.
//!
//! ```rust,no_run
//! use network::{CaptureConfig, LogSink, PacketCapture, StopToken, UdpSocket};
//! use std::sync::Arc;
//! use stream_ring::{Ring, RingConfig};
//!
//! # async fn demo() -> network::Result<()> {
//! let socket = UdpSocket::bind("0.0.0.0:4015".parse().unwrap()).await?;
//! let ring = Ring::open("tbn", RingConfig::new(32 * 1024 * 16, 64))
//!     .map_err(|e| network::TransportError::ring("tbn", &e))?;
//! let writer = ring.writer().map_err(|e| network::TransportError::ring("tbn", &e))?;
//!
//! let mut config = CaptureConfig::new("tbn", 32);
//! config.span_ntime = 16;
//! let mut capture = PacketCapture::new(codec::Protocol::Tbn, socket, writer, config, Arc::new(LogSink))?;
//! capture.run_until_stopped(&StopToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod error;
pub mod socket;
pub mod stats;
pub mod stop;
pub mod transmit;

pub use capture::{CaptureConfig, CaptureStatus, PacketCapture, SequenceHeader};
pub use error::{Result, TransportError};
pub use socket::{
    DatagramSocket, MemorySocket, MulticastConfig, RecvStatus, UdpConfig, UdpSocket, MAX_DATAGRAM,
};
pub use stats::{
    sink_from_config, BlockId, LogSink, MemorySink, MetricsSink, NullSink, ProcLogSink, Role,
    StatsSnapshot, StreamStats,
};
pub use stop::StopToken;
pub use transmit::{PacketTransmit, SourceFrames, TransmitConfig};
