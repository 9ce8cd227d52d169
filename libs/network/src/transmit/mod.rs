//! Packet transmit
//!
//! Cuts source-major frames into one datagram per source per packet time,
//! in the order capture closes intervals: every source of time step 0,
//! then every source of time step 1, and so on.

use bytes::{Bytes, BytesMut};
use codec::{HeaderCodec, HeaderInfo, Protocol};
use std::sync::Arc;
use stream_ring::Span;
use tracing::{debug, info};

use crate::socket::DatagramSocket;
use crate::stats::{BlockId, MetricsSink, StatsSnapshot, StreamStats};
use crate::{Result, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitConfig {
    pub name: String,
    pub mtu: usize,
}

impl TransmitConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mtu: config::DEFAULT_MTU,
        }
    }
}

/// Sample data of `nsrc` sources, laid out source-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFrames {
    pub data: Bytes,
    pub nsrc: usize,
}

impl SourceFrames {
    pub fn new(data: impl Into<Bytes>, nsrc: usize) -> Self {
        Self {
            data: data.into(),
            nsrc,
        }
    }

    /// Frames of a captured span, sharing its bytes
    pub fn from_span(span: &Span) -> Self {
        Self {
            data: span.data.clone(),
            nsrc: span.nsrc,
        }
    }

    fn region(&self) -> usize {
        self.data.len() / self.nsrc.max(1)
    }
}

pub struct PacketTransmit<S: DatagramSocket> {
    codec: &'static dyn HeaderCodec,
    socket: S,
    config: TransmitConfig,
    stats: StreamStats,
    sink: Arc<dyn MetricsSink>,
    block: BlockId,
    out: BytesMut,
}

impl<S: DatagramSocket> PacketTransmit<S> {
    pub fn new(
        protocol: Protocol,
        socket: S,
        config: TransmitConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let codec = protocol.codec();
        if config.mtu <= codec.header_size() {
            return Err(TransportError::configuration(
                format!(
                    "MTU {} leaves no payload after the {} byte {} header",
                    config.mtu,
                    codec.header_size(),
                    protocol
                ),
                Some("mtu"),
            ));
        }
        info!("Transmit {} ready: protocol {}", config.name, protocol);
        Ok(Self {
            codec,
            socket,
            block: BlockId::transmit(config.name.clone()),
            out: BytesMut::with_capacity(config.mtu),
            config,
            stats: StreamStats::new(),
            sink,
        })
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.clone()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn block_id(&self) -> &BlockId {
        &self.block
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Clock ticks between consecutive packet times for these parameters
    pub fn time_tag_step(&self, info: &HeaderInfo) -> Result<u64> {
        Ok(self.codec.build(info, 0, 0)?.ticks_per_seq())
    }

    /// Send every frame, returning the number of datagrams written
    ///
    /// Datagram `(t, s)` carries time tag `time_tag0 + t * time_tag_step`
    /// and source id `src0 + s * src_step`. Shape and size problems are
    /// reported before anything is sent; a socket failure stops the call
    /// at the failing datagram.
    pub async fn send(
        &mut self,
        info: &HeaderInfo,
        time_tag0: u64,
        time_tag_step: u64,
        src0: u32,
        src_step: u32,
        frames: &SourceFrames,
    ) -> Result<usize> {
        let payload_size = self.codec.payload_size(info);
        let ntime = self.check_shape(frames, payload_size)?;
        if ntime == 0 {
            return Ok(0);
        }
        let region = frames.region();

        // header fields of the first and last datagram bound all others, so
        // the per-datagram arithmetic below cannot overflow once these pass
        let last_time = (ntime as u64 - 1)
            .checked_mul(time_tag_step)
            .and_then(|span| time_tag0.checked_add(span))
            .ok_or_else(|| {
                TransportError::configuration(
                    format!(
                        "{} packet times of {} ticks from {} overflow the time tag",
                        ntime, time_tag_step, time_tag0
                    ),
                    Some("time_tag"),
                )
            })?;
        let last_src = u32::try_from(frames.nsrc - 1)
            .ok()
            .and_then(|n| n.checked_mul(src_step))
            .and_then(|span| src0.checked_add(span))
            .ok_or_else(|| {
                TransportError::configuration(
                    format!(
                        "{} sources of step {} from {} overflow the source id",
                        frames.nsrc, src_step, src0
                    ),
                    Some("src0"),
                )
            })?;
        self.codec.build(info, time_tag0, src0)?;
        self.codec.build(info, last_time, last_src)?;

        let header_size = self.codec.header_size();
        let mut sent = 0;
        let result = async {
            for t in 0..ntime {
                let time_tag = time_tag0 + t as u64 * time_tag_step;
                for s in 0..frames.nsrc {
                    let header = self.codec.build(info, time_tag, src0 + s as u32 * src_step)?;
                    self.out.clear();
                    self.out.resize(header_size, 0);
                    self.codec.encode(&header, &mut self.out)?;
                    let start = s * region + t * payload_size;
                    self.out
                        .extend_from_slice(&frames.data[start..start + payload_size]);
                    self.socket.send(&self.out).await?;
                    self.stats.record_good(payload_size);
                    sent += 1;
                }
            }
            Ok::<(), TransportError>(())
        }
        .await;

        debug!("Transmit {}: sent {} datagrams", self.config.name, sent);
        self.sink.put(&self.block, &self.stats.snapshot());
        result.map(|_| sent)
    }

    fn check_shape(&self, frames: &SourceFrames, payload_size: usize) -> Result<usize> {
        if frames.nsrc == 0 {
            return Err(TransportError::configuration(
                "Transmit needs at least one source",
                Some("nsrc"),
            ));
        }
        if payload_size == 0 {
            return Err(TransportError::configuration(
                "Header parameters give an empty payload",
                Some("nchan"),
            ));
        }
        let datagram = self.codec.header_size() + payload_size;
        if datagram > self.config.mtu {
            return Err(TransportError::configuration(
                format!(
                    "{} byte datagrams exceed the MTU of {}",
                    datagram, self.config.mtu
                ),
                Some("mtu"),
            ));
        }
        let region = frames.region();
        if frames.data.len() % frames.nsrc != 0 || region % payload_size != 0 {
            return Err(TransportError::configuration(
                format!(
                    "{} bytes do not split into {} sources of whole {} byte packets",
                    frames.data.len(),
                    frames.nsrc,
                    payload_size
                ),
                Some("data"),
            ));
        }
        Ok(region / payload_size)
    }
}
