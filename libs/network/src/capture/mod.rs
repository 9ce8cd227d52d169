//! Packet capture
//!
//! Receives datagrams of one logical stream, decodes them with the stream's
//! codec and assembles time-aligned spans directly in the ring's open write
//! sequence.
//!
//! Interval arithmetic is relative to the first valid packet: with `origin`
//! its sequence number, a packet with sequence `seq` belongs to interval
//! `(seq - origin) / span_ntime` at time step `(seq - origin) % span_ntime`.
//! A span is pushed as soon as every (time step, source) slot has arrived,
//! or when a packet of a newer interval shows up. Packets of an interval
//! that has already been pushed, and repeats of a slot already filled, are
//! counted as late and never written.

use codec::{HeaderCodec, PacketHeader, Protocol};
use std::sync::Arc;
use std::time::Duration;
use stream_ring::{RingError, RingWriter, SequenceInfo};
use tracing::{debug, info, trace, warn};

use crate::socket::{DatagramSocket, RecvStatus};
use crate::stats::{BlockId, MetricsSink, StatsSnapshot, StreamStats};
use crate::stop::StopToken;
use crate::{Result, TransportError};

mod assembly;

use assembly::{Assembly, Origin};
pub use assembly::SequenceHeader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Instance name, used for the statistics block id
    pub name: String,
    pub nsrc: usize,
    /// Wire source id of source index 0
    pub src0: u32,
    /// Largest datagram accepted; longer ones are counted invalid
    pub mtu: usize,
    /// Packet times per span
    pub span_ntime: u64,
    pub timeout: Duration,
    /// Publish counters every this many pushed spans
    pub stats_interval: u64,
}

impl CaptureConfig {
    pub fn new(name: impl Into<String>, nsrc: usize) -> Self {
        Self {
            name: name.into(),
            nsrc,
            src0: 0,
            mtu: config::DEFAULT_MTU,
            span_ntime: 1,
            timeout: Duration::from_millis(config::DEFAULT_TIMEOUT_MS),
            stats_interval: 1,
        }
    }

    pub fn from_stream(stream: &config::StreamConfig, stats: &config::StatsConfig) -> Self {
        Self {
            name: stream.name.clone(),
            nsrc: stream.nsrc,
            src0: stream.src0,
            mtu: stream.mtu,
            span_ntime: stream.span_ntime,
            timeout: stream.timeout(),
            stats_interval: stats.interval_spans,
        }
    }

    /// Upper bound of one span's size, the ring slot size this stream needs
    pub fn max_span_bytes(&self, codec: &dyn HeaderCodec) -> usize {
        let payload = self.mtu.saturating_sub(codec.header_size());
        self.nsrc * self.span_ntime as usize * payload
    }

    fn validate(&self, codec: &dyn HeaderCodec) -> Result<()> {
        if self.nsrc == 0 {
            return Err(TransportError::configuration(
                "Capture needs at least one source",
                Some("nsrc"),
            ));
        }
        if self.span_ntime == 0 {
            return Err(TransportError::configuration(
                "Span must cover at least one packet time",
                Some("span_ntime"),
            ));
        }
        if self.timeout.is_zero() {
            return Err(TransportError::configuration(
                "Receive timeout must be positive",
                Some("timeout"),
            ));
        }
        if self.mtu <= codec.header_size() {
            return Err(TransportError::configuration(
                format!(
                    "MTU {} leaves no payload after the {} byte {} header",
                    self.mtu,
                    codec.header_size(),
                    codec.protocol()
                ),
                Some("mtu"),
            ));
        }
        Ok(())
    }
}

/// Outcome of one capture step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// A datagram was written into the assembling span
    Accepted,
    /// A datagram was discarded as undecodable or inconsistent
    Invalid,
    /// A datagram arrived for a slot that was already pushed or filled
    Late,
    /// Nothing arrived within the receive timeout
    Timeout,
    /// The socket's peer is gone
    Closed,
    /// The stop token fired
    Stopped,
    /// Capture has finished or the ring was closed under it
    Ended,
}

impl CaptureStatus {
    /// Whether `run` ends on this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CaptureStatus::Timeout
                | CaptureStatus::Closed
                | CaptureStatus::Stopped
                | CaptureStatus::Ended
        )
    }
}

/// Where an accepted packet goes
struct Placement {
    source: usize,
    interval: u64,
    t: u64,
}

pub struct PacketCapture<S: DatagramSocket> {
    codec: &'static dyn HeaderCodec,
    socket: S,
    writer: Option<RingWriter>,
    config: CaptureConfig,
    stats: StreamStats,
    sink: Arc<dyn MetricsSink>,
    block: BlockId,
    buf: Vec<u8>,
    origin: Option<Origin>,
    assembly: Option<Assembly>,
    /// Highest interval pushed, or skipped over while waiting for a newer one
    last_interval: Option<u64>,
    spans_pushed: u64,
    /// Stop token of the running loop, raced against ring backpressure
    stop: Option<StopToken>,
}

impl<S: DatagramSocket> PacketCapture<S> {
    pub fn new(
        protocol: Protocol,
        socket: S,
        writer: RingWriter,
        config: CaptureConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let codec = protocol.codec();
        config.validate(codec)?;
        let block = BlockId::capture(config.name.clone());
        Ok(Self {
            codec,
            socket,
            writer: Some(writer),
            // one spare byte tells an oversize datagram from one of exactly mtu
            buf: vec![0; config.mtu + 1],
            config,
            stats: StreamStats::new(),
            sink,
            block,
            origin: None,
            assembly: None,
            last_interval: None,
            spans_pushed: 0,
            stop: None,
        })
    }

    /// Shared handle on this instance's counters
    pub fn stats(&self) -> StreamStats {
        self.stats.clone()
    }

    pub fn block_id(&self) -> &BlockId {
        &self.block
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Receive and process one datagram
    pub async fn recv(&mut self) -> Result<CaptureStatus> {
        if self.writer.is_none() {
            return Ok(CaptureStatus::Ended);
        }
        match self.socket.recv(&mut self.buf, self.config.timeout).await? {
            RecvStatus::Datagram { len, .. } => self.process(len).await,
            RecvStatus::Timeout => Ok(CaptureStatus::Timeout),
            RecvStatus::Closed => Ok(CaptureStatus::Closed),
        }
    }

    /// Capture until stopped, the peer closes, the ring closes or a receive
    /// times out, then finish
    pub async fn run(&mut self, stop: &StopToken) -> Result<CaptureStatus> {
        self.run_inner(stop, true).await
    }

    /// Like [`run`](Self::run) but rides out idle periods instead of ending
    /// on a receive timeout
    pub async fn run_until_stopped(&mut self, stop: &StopToken) -> Result<CaptureStatus> {
        self.run_inner(stop, false).await
    }

    async fn run_inner(&mut self, stop: &StopToken, end_on_timeout: bool) -> Result<CaptureStatus> {
        info!(
            "Capture {} started: {} sources, protocol {}",
            self.config.name,
            self.config.nsrc,
            self.codec.protocol()
        );
        self.stop = Some(stop.clone());
        let outcome = loop {
            if self.writer.is_none() {
                break Ok(CaptureStatus::Ended);
            }
            // processing is never cancelled as a whole; only its ring
            // publish waits observe the stop token
            let received = tokio::select! {
                biased;
                _ = stop.stopped() => break Ok(CaptureStatus::Stopped),
                r = self.socket.recv(&mut self.buf, self.config.timeout) => r,
            };
            let status = match received {
                Ok(RecvStatus::Datagram { len, .. }) => self.process(len).await,
                Ok(RecvStatus::Timeout) => Ok(CaptureStatus::Timeout),
                Ok(RecvStatus::Closed) => Ok(CaptureStatus::Closed),
                Err(e) => Err(e),
            };
            match status {
                Ok(CaptureStatus::Timeout) if !end_on_timeout => self.publish(),
                Ok(status) if status.is_terminal() => break Ok(status),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };

        let finished = self.finish().await;
        match &outcome {
            Ok(status) => info!("Capture {} stopped: {:?}", self.config.name, status),
            Err(e) => warn!("Capture {} failed: {}", self.config.name, e),
        }
        // a receive failure is reported in preference to a finish failure
        let status = outcome?;
        finished?;
        Ok(status)
    }

    /// Push the partial span with missing accounting, end writing on the
    /// ring and publish final counters; later calls do nothing
    ///
    /// Once stopped, a span that cannot be published without waiting on a
    /// guaranteed reader is discarded and writing ends regardless.
    pub async fn finish(&mut self) -> Result<()> {
        let result = self.close_assembly().await;
        if let Some(writer) = self.writer.take() {
            let ended = match self.stop.clone() {
                Some(stop) => tokio::select! {
                    biased;
                    r = writer.end_writing() => Some(r),
                    _ = stop.stopped() => None,
                },
                None => Some(writer.end_writing().await),
            };
            match ended {
                Some(Ok(())) | Some(Err(RingError::Closed { .. })) => {}
                // dropping the writer ended writing
                None => warn!(
                    "Capture {}: stopped under backpressure, last span discarded",
                    self.config.name
                ),
                Some(Err(e)) => return Err(TransportError::ring(&self.config.name, &e)),
            }
        }
        self.publish();
        result.map(|_| ())
    }

    fn publish(&self) {
        self.sink.put(&self.block, &self.stats.snapshot());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn process(&mut self, len: usize) -> Result<CaptureStatus> {
        if len > self.config.mtu {
            trace!(
                "Capture {}: dropping datagram longer than the {} byte mtu",
                self.config.name, self.config.mtu
            );
            self.stats.add_invalid(len);
            return Ok(CaptureStatus::Invalid);
        }
        let header = match self.codec.decode(&self.buf[..len]) {
            Ok(header) => header,
            Err(e) => {
                trace!("Capture {}: dropping {} bytes: {}", self.config.name, len, e);
                self.stats.add_invalid(len);
                return Ok(CaptureStatus::Invalid);
            }
        };
        let payload_len = len - self.codec.header_size();
        let place = match self.place(&header, payload_len, len) {
            Ok(place) => place,
            Err(status) => return Ok(status),
        };
        let Some(origin) = self.origin else {
            return Ok(CaptureStatus::Invalid);
        };

        match self.assembly.as_ref().map(|a| a.interval) {
            Some(current) if place.interval == current => {}
            Some(current) if place.interval < current => {
                self.stats.add_late(payload_len);
                return Ok(CaptureStatus::Late);
            }
            Some(_) => {
                if let Some(status) = self.close_assembly().await? {
                    return Ok(status);
                }
                if !self.open_assembly(&header, &place, origin).await? {
                    return Ok(self.status_after_open_failure(len));
                }
            }
            None => {
                if matches!(self.last_interval, Some(last) if place.interval <= last) {
                    self.stats.add_late(payload_len);
                    return Ok(CaptureStatus::Late);
                }
                if !self.open_assembly(&header, &place, origin).await? {
                    return Ok(self.status_after_open_failure(len));
                }
            }
        }

        let Some(assembly) = self.assembly.as_mut() else {
            return Ok(CaptureStatus::Ended);
        };
        if !assembly.mark(place.source, place.t as usize) {
            self.stats.add_late(payload_len);
            return Ok(CaptureStatus::Late);
        }
        let full = assembly.is_full();
        let Some(writer) = self.writer.as_mut() else {
            return Ok(CaptureStatus::Ended);
        };
        let header_size = self.codec.header_size();
        let offset = place.t as usize * origin.payload_size;
        writer
            .write(place.source, offset, &self.buf[header_size..len])
            .map_err(|e| TransportError::ring(&self.config.name, &e))?;
        self.stats.record_good(payload_len);

        if full {
            if let Some(status) = self.close_assembly().await? {
                return Ok(status);
            }
        }
        Ok(CaptureStatus::Accepted)
    }

    /// Validate source and payload size and locate the packet, counting
    /// the datagram when it does not fit the stream
    fn place(
        &mut self,
        header: &PacketHeader,
        payload_len: usize,
        len: usize,
    ) -> std::result::Result<Placement, CaptureStatus> {
        let invalid = |stats: &StreamStats, why: &str| {
            trace!("Dropping {} byte datagram: {}", len, why);
            stats.add_invalid(len);
            Err(CaptureStatus::Invalid)
        };

        let source_id = header.source_id();
        let source = match source_id.checked_sub(self.config.src0) {
            Some(s) if (s as usize) < self.config.nsrc => s as usize,
            _ => return invalid(&self.stats, "source outside the stream"),
        };

        let origin = match self.origin {
            Some(origin) => origin,
            None if payload_len == 0 => return invalid(&self.stats, "empty payload"),
            None => {
                let origin = Origin {
                    seq0: header.seq(),
                    payload_size: payload_len,
                    ticks_per_seq: header.ticks_per_seq(),
                };
                debug!(
                    "Capture {}: origin seq {} with {} byte payloads",
                    self.config.name, origin.seq0, origin.payload_size
                );
                self.origin = Some(origin);
                origin
            }
        };
        if payload_len != origin.payload_size {
            return invalid(&self.stats, "payload size changed");
        }

        let Some(rel) = header.seq().checked_sub(origin.seq0) else {
            // older than anything this stream has assembled
            self.stats.add_late(payload_len);
            return Err(CaptureStatus::Late);
        };
        Ok(Placement {
            source,
            interval: rel / self.config.span_ntime,
            t: rel % self.config.span_ntime,
        })
    }

    fn status_after_open_failure(&self, len: usize) -> CaptureStatus {
        if self.writer.is_none() {
            CaptureStatus::Ended
        } else {
            trace!("Capture {}: {} byte datagram out of time order", self.config.name, len);
            CaptureStatus::Invalid
        }
    }

    /// Open the span of `place.interval` as the ring's write sequence
    ///
    /// Intervals skipped since the last one are counted missing in full.
    /// Returns false without opening when the ring closed or the packet's
    /// time tag runs backwards.
    async fn open_assembly(
        &mut self,
        header: &PacketHeader,
        place: &Placement,
        origin: Origin,
    ) -> Result<bool> {
        let span_ntime = self.config.span_ntime;
        let source_bytes = span_ntime as usize * origin.payload_size;
        let time_tag = header
            .time_tag()
            .saturating_sub(place.t.saturating_mul(origin.ticks_per_seq));
        let seq0 = origin.seq0 + place.interval * span_ntime;
        let sequence = SequenceHeader::describe(
            header,
            self.codec.sample_type(),
            time_tag,
            seq0,
            &self.config,
            origin.payload_size,
        );
        let info = SequenceInfo::new(time_tag, self.config.nsrc, source_bytes)
            .with_header(sequence.to_bytes());

        let Some(writer) = self.writer.as_mut() else {
            return Ok(false);
        };
        match writer.begin_sequence(info).await {
            Ok(()) => {
                if let Some(last) = self.last_interval {
                    let skipped = place.interval - last - 1;
                    if skipped > 0 {
                        warn!(
                            "Capture {}: {} intervals lost after interval {}",
                            self.config.name, skipped, last
                        );
                        let span_bytes = (self.config.nsrc * source_bytes) as u64;
                        self.stats.add_missing(skipped.saturating_mul(span_bytes));
                    }
                }
                self.assembly = Some(Assembly::new(
                    place.interval,
                    self.config.nsrc,
                    span_ntime as usize,
                ));
                Ok(true)
            }
            Err(RingError::Closed { .. }) => {
                self.ring_closed();
                Ok(false)
            }
            Err(RingError::OutOfOrder { .. }) => {
                let len = self.codec.header_size() + origin.payload_size;
                self.stats.add_invalid(len);
                Ok(false)
            }
            Err(e) => Err(TransportError::ring(&self.config.name, &e)),
        }
    }

    /// Push the assembling span, counting its unfilled slots missing
    ///
    /// Returns the terminal status if the ring was closed under the writer
    /// or the stop token fired while the publish waited on a reader.
    async fn close_assembly(&mut self) -> Result<Option<CaptureStatus>> {
        let Some(assembly) = self.assembly.take() else {
            return Ok(self.writer.is_none().then_some(CaptureStatus::Ended));
        };
        let payload_size = self.origin.map_or(0, |o| o.payload_size);
        let missing = assembly.missing_slots() * payload_size;
        if missing > 0 {
            self.stats.add_missing(missing as u64);
        }
        self.last_interval = Some(assembly.interval);

        let Some(writer) = self.writer.as_mut() else {
            return Ok(Some(CaptureStatus::Ended));
        };
        let published = match &self.stop {
            Some(stop) => tokio::select! {
                biased;
                r = writer.end_sequence() => Some(r),
                _ = stop.stopped() => None,
            },
            None => Some(writer.end_sequence().await),
        };
        let Some(published) = published else {
            warn!(
                "Capture {}: stopped while interval {} waited for a reader, span discarded",
                self.config.name, assembly.interval
            );
            return Ok(Some(CaptureStatus::Stopped));
        };
        match published {
            Ok(index) => {
                debug!(
                    "Capture {}: pushed span {} (interval {}, {} bytes missing)",
                    self.config.name, index, assembly.interval, missing
                );
                self.spans_pushed += 1;
                if self.spans_pushed % self.config.stats_interval.max(1) == 0 {
                    self.publish();
                }
                Ok(None)
            }
            Err(RingError::Closed { .. }) => {
                self.ring_closed();
                Ok(Some(CaptureStatus::Ended))
            }
            Err(e) => Err(TransportError::ring(&self.config.name, &e)),
        }
    }

    fn ring_closed(&mut self) {
        info!("Capture {}: ring closed", self.config.name);
        // the writer cannot publish anything more; dropping it ends writing
        self.writer = None;
        self.assembly = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::MemorySocket;
    use crate::stats::MemorySink;
    use codec::HeaderInfo;
    use stream_ring::{Guarantee, ReadEvent, Ring, RingConfig};

    fn simple_datagram(seq: u64, fill: u8) -> Vec<u8> {
        let codec = Protocol::Simple.codec();
        let info = HeaderInfo::new();
        let mut out = vec![fill; codec.header_size() + codec.payload_size(&info)];
        let header = codec.build(&info, seq, 0).unwrap();
        codec.encode(&header, &mut out).unwrap();
        out
    }

    fn setup(name: &str, span_ntime: u64) -> (Ring, MemorySocket, PacketCapture<MemorySocket>, MemorySink) {
        let ring = Ring::open(name, RingConfig::new(1 << 20, 64)).unwrap();
        let (tx, rx) = MemorySocket::pair(256);
        let sink = MemorySink::new();
        let mut config = CaptureConfig::new(name, 1);
        config.span_ntime = span_ntime;
        config.timeout = Duration::from_millis(20);
        let capture = PacketCapture::new(
            Protocol::Simple,
            rx,
            ring.writer().unwrap(),
            config,
            Arc::new(sink.clone()),
        )
        .unwrap();
        (ring, tx, capture, sink)
    }

    #[tokio::test]
    async fn rejects_bad_configuration() {
        let ring = Ring::open("capture-bad-config", RingConfig::new(1024, 4)).unwrap();
        let (_tx, rx) = MemorySocket::pair(1);
        let mut config = CaptureConfig::new("bad", 0);
        let err = PacketCapture::new(
            Protocol::Simple,
            rx,
            ring.writer().unwrap(),
            config.clone(),
            Arc::new(MemorySink::new()),
        )
        .err()
        .unwrap();
        assert!(err.is_configuration());

        config.nsrc = 1;
        config.mtu = 8;
        let (_tx, rx) = MemorySocket::pair(1);
        let err = PacketCapture::new(
            Protocol::Simple,
            rx,
            ring.writer().unwrap(),
            config,
            Arc::new(MemorySink::new()),
        )
        .err()
        .unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn garbage_counts_invalid() {
        let (_ring, tx, mut capture, _sink) = setup("capture-garbage", 1);
        tx.send(&[1, 2, 3]).await.unwrap();
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Invalid);
        assert_eq!(capture.snapshot().invalid, 3);
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Timeout);
    }

    #[tokio::test]
    async fn multi_step_spans_and_late_packets() {
        let (ring, tx, mut capture, sink) = setup("capture-steps", 2);
        let mut reader = ring.open_reader(Guarantee::Guaranteed);

        // interval 0 = seq 100, 101; interval 1 = seq 102, 103
        for (seq, fill) in [(100, 0xA), (101, 0xB), (103, 0xD)] {
            tx.send(&simple_datagram(seq, fill)).await.unwrap();
        }
        // straggler for the pushed interval 0
        tx.send(&simple_datagram(100, 0xEE)).await.unwrap();
        drop(tx);

        let stop = StopToken::new();
        assert_eq!(capture.run(&stop).await.unwrap(), CaptureStatus::Closed);

        let ReadEvent::Span(span) = reader.next().await else {
            panic!("expected span")
        };
        assert!(span.is_complete());
        assert_eq!(span.time_tag, 100);
        assert_eq!(&span.data[..8192], &[0xA; 8192][..]);
        assert_eq!(&span.data[8192..], &[0xB; 8192][..]);
        let header = SequenceHeader::parse(&span.header).unwrap();
        assert_eq!(header.seq0, 100);
        assert_eq!(header.span_ntime, 2);

        // the partial interval is pushed at close with seq 102 missing
        let ReadEvent::Span(partial) = reader.next().await else {
            panic!("expected span")
        };
        assert!(!partial.is_complete());
        assert_eq!(partial.time_tag, 102);
        assert_eq!(&partial.data[8192..], &[0xD; 8192][..]);
        assert_eq!(reader.next().await, ReadEvent::End);

        let stats = sink.get(capture.block_id()).unwrap();
        assert_eq!(stats.good, 3 * 8192);
        assert_eq!(stats.nvalid, 3);
        assert_eq!(stats.late, 8192);
        assert_eq!(stats.missing, 8192);
    }

    #[tokio::test]
    async fn skipped_intervals_count_missing() {
        let (ring, tx, mut capture, _sink) = setup("capture-skip", 1);
        let mut reader = ring.open_reader(Guarantee::BestEffort);
        tx.send(&simple_datagram(10, 1)).await.unwrap();
        tx.send(&simple_datagram(13, 2)).await.unwrap();
        drop(tx);
        capture.run(&StopToken::new()).await.unwrap();

        assert_eq!(capture.snapshot().missing, 2 * 8192);
        let times: Vec<u64> = std::iter::from_fn(|| match reader.try_next() {
            ReadEvent::Span(span) => Some(span.time_tag),
            _ => None,
        })
        .collect();
        assert_eq!(times, vec![10, 13]);
    }

    #[tokio::test]
    async fn stop_finishes_and_ends_writing() {
        let (ring, _tx, mut capture, _sink) = setup("capture-stop", 1);
        let stop = StopToken::new();
        stop.stop();
        assert_eq!(
            capture.run_until_stopped(&stop).await.unwrap(),
            CaptureStatus::Stopped
        );
        assert!(ring.writing_ended());
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Ended);
    }

    #[tokio::test]
    async fn ring_close_ends_capture() {
        let (ring, tx, mut capture, _sink) = setup("capture-ring-close", 1);
        tx.send(&simple_datagram(1, 0)).await.unwrap();
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Accepted);
        ring.close();
        tx.send(&simple_datagram(2, 0)).await.unwrap();
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Ended);
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Ended);
        capture.finish().await.unwrap();
    }

    #[tokio::test]
    async fn huge_sequence_jump_saturates_missing() {
        let (_ring, tx, mut capture, _sink) = setup("capture-seq-jump", 1);
        tx.send(&simple_datagram(0, 1)).await.unwrap();
        tx.send(&simple_datagram(u64::MAX, 2)).await.unwrap();
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Accepted);
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Accepted);

        let snap = capture.snapshot();
        assert_eq!(snap.missing, u64::MAX);
        assert_eq!(snap.good, 2 * 8192);
    }

    #[tokio::test]
    async fn datagrams_over_mtu_count_invalid() {
        let name = "capture-oversize";
        let ring = Ring::open(name, RingConfig::new(1 << 20, 8)).unwrap();
        let (tx, rx) = MemorySocket::pair(8);
        let mut config = CaptureConfig::new(name, 1);
        config.mtu = 108;
        config.timeout = Duration::from_millis(20);
        let mut capture = PacketCapture::new(
            Protocol::Simple,
            rx,
            ring.writer().unwrap(),
            config,
            Arc::new(MemorySink::new()),
        )
        .unwrap();

        let mut fits = simple_datagram(1, 3);
        fits.truncate(108);
        tx.send(&simple_datagram(0, 1)).await.unwrap();
        tx.send(&fits).await.unwrap();
        tx.send(&simple_datagram(2, 1)).await.unwrap();
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Invalid);
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Accepted);
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Invalid);

        let snap = capture.snapshot();
        assert_eq!(snap.good, 100);
        assert_eq!(snap.nvalid, 1);
        assert_eq!(snap.invalid, 2 * 109);
    }

    #[tokio::test]
    async fn stop_is_honored_under_backpressure() {
        let name = "capture-stop-backpressure";
        let ring = Ring::open(name, RingConfig::new(1 << 20, 1)).unwrap();
        let mut stalled = ring.open_reader(Guarantee::Guaranteed);
        let (tx, rx) = MemorySocket::pair(8);
        let mut config = CaptureConfig::new(name, 1);
        config.timeout = Duration::from_millis(20);
        let mut capture = PacketCapture::new(
            Protocol::Simple,
            rx,
            ring.writer().unwrap(),
            config,
            Arc::new(MemorySink::new()),
        )
        .unwrap();
        for seq in 1..=3 {
            tx.send(&simple_datagram(seq, seq as u8)).await.unwrap();
        }

        let stop = StopToken::new();
        let task = {
            let stop = stop.clone();
            tokio::spawn(async move { capture.run_until_stopped(&stop).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());
        stop.stop();

        let status = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("capture ignored stop")
            .unwrap()
            .unwrap();
        assert_eq!(status, CaptureStatus::Stopped);
        assert!(ring.writing_ended());
        assert!(matches!(stalled.try_next(), ReadEvent::Span(s) if s.time_tag == 1));
        assert_eq!(stalled.try_next(), ReadEvent::End);
        drop(tx);
    }
}
