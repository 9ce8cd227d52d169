//! End-to-End Test Framework
//!
//! Wires a [`PacketTransmit`] to a [`PacketCapture`] through an in-memory
//! socket pair, with a ring reader collecting every pushed span, so
//! scenarios can compare what was sent against what was captured.

pub mod fixtures;

use anyhow::{Context, Result};
use codec::{HeaderInfo, Protocol};
use network::{
    CaptureConfig, CaptureStatus, MemorySocket, MetricsSink, PacketCapture, PacketTransmit,
    SourceFrames, StatsSnapshot, StopToken, TransmitConfig,
};
use std::sync::Arc;
use std::time::Duration;
use stream_ring::{Guarantee, ReadEvent, Ring, RingConfig, Span};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub name: String,
    pub protocol: Protocol,
    pub info: HeaderInfo,
    pub nsrc: usize,
    pub span_ntime: u64,
    pub backlog: usize,
    /// Packet time of the first interval
    pub first_time: u64,
    /// Collect spans with a reader of this mode; `None` attaches no reader
    pub reader: Option<Guarantee>,
}

impl PipeConfig {
    pub fn new(name: impl Into<String>, protocol: Protocol, nsrc: usize) -> Self {
        Self {
            name: name.into(),
            protocol,
            info: HeaderInfo::new().with_nsrc(nsrc as u32),
            nsrc,
            span_ntime: 1,
            backlog: 16,
            first_time: 1000,
            reader: Some(Guarantee::Guaranteed),
        }
    }
}

/// What a finished pipe observed
#[derive(Debug)]
pub struct PipeOutcome {
    pub status: CaptureStatus,
    pub captured: StatsSnapshot,
    pub transmitted: StatsSnapshot,
    pub spans: Vec<Span>,
}

pub struct Pipe {
    pub ring: Ring,
    transmit: PacketTransmit<MemorySocket>,
    capture: JoinHandle<network::Result<(CaptureStatus, StatsSnapshot)>>,
    reader: Option<JoinHandle<Vec<Span>>>,
    info: HeaderInfo,
    step: u64,
    span_ntime: u64,
    next_time: u64,
    interval_bytes: usize,
}

impl Pipe {
    /// Open the ring and spawn capture and reader; must run inside a runtime
    pub fn start(config: PipeConfig, sink: Arc<dyn MetricsSink>) -> Result<Self> {
        let codec = config.protocol.codec();
        let payload = codec.payload_size(&config.info);
        let interval_bytes = config.nsrc * config.span_ntime as usize * payload;
        let ring = Ring::open(&config.name, RingConfig::new(interval_bytes, config.backlog))
            .context("opening ring")?;

        let (tx, rx) = MemorySocket::pair(4 * config.nsrc);
        let transmit = PacketTransmit::new(
            config.protocol,
            tx,
            TransmitConfig::new(config.name.clone()),
            sink.clone(),
        )?;
        let step = transmit.time_tag_step(&config.info)?;

        let mut capture_config = CaptureConfig::new(config.name.clone(), config.nsrc);
        capture_config.span_ntime = config.span_ntime;
        capture_config.timeout = Duration::from_secs(5);
        let mut capture = PacketCapture::new(
            config.protocol,
            rx,
            ring.writer().context("taking ring writer")?,
            capture_config,
            sink,
        )?;

        let reader = config.reader.map(|guarantee| {
            let mut reader = ring.open_reader(guarantee);
            tokio::spawn(async move {
                let mut spans = Vec::new();
                loop {
                    match reader.next().await {
                        ReadEvent::Span(span) => spans.push(span),
                        ReadEvent::Gap { missed } => debug!("reader skipped {} spans", missed),
                        ReadEvent::Empty => tokio::task::yield_now().await,
                        ReadEvent::End => return spans,
                    }
                }
            })
        });

        let capture = tokio::spawn(async move {
            let status = capture.run(&StopToken::new()).await?;
            Ok((status, capture.snapshot()))
        });

        Ok(Self {
            ring,
            transmit,
            capture,
            reader,
            step,
            span_ntime: config.span_ntime,
            next_time: config.first_time,
            interval_bytes,
            info: config.info,
        })
    }

    /// Bytes of one complete span
    pub fn interval_bytes(&self) -> usize {
        self.interval_bytes
    }

    /// Send one interval of every source
    pub async fn send_interval(&mut self, frames: &SourceFrames) -> Result<usize> {
        self.send_sources(frames, 0, 1).await
    }

    /// Send one interval of the sources `src0 + k * src_step`
    pub async fn send_sources(
        &mut self,
        frames: &SourceFrames,
        src0: u32,
        src_step: u32,
    ) -> Result<usize> {
        let time_tag0 = self.next_time * self.step;
        self.next_time += self.span_ntime;
        let sent = self
            .transmit
            .send(&self.info, time_tag0, self.step, src0, src_step, frames)
            .await?;
        Ok(sent)
    }

    /// Skip one interval without sending anything
    pub fn skip_interval(&mut self) {
        self.next_time += self.span_ntime;
    }

    /// Close the transmit side and wait for capture and reader to finish
    pub async fn finish(self) -> Result<PipeOutcome> {
        let transmitted = self.transmit.snapshot();
        drop(self.transmit);
        let (status, captured) = self.capture.await.context("capture task")??;
        let spans = match self.reader {
            Some(reader) => reader.await.context("reader task")?,
            None => Vec::new(),
        };
        Ok(PipeOutcome {
            status,
            captured,
            transmitted,
            spans,
        })
    }
}
