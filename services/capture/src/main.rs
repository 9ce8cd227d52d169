//! UDP capture service entry point
//!
//! Opens one ring per configured stream and captures into it until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use config::{PipelineConfig, StreamConfig};
use futures::StreamExt;
use network::{
    sink_from_config, CaptureConfig, MetricsSink, PacketCapture, StopToken, StreamStats,
    UdpConfig, UdpSocket,
};
use std::path::PathBuf;
use std::sync::Arc;
use stream_ring::{ReadEvent, Ring, RingConfig};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Attach a reader to every ring that logs each span
    #[arg(long)]
    drain: bool,
}

struct RunningStream {
    name: String,
    ring: Ring,
    stats: StreamStats,
    capture: JoinHandle<network::Result<network::CaptureStatus>>,
    drain: Option<JoinHandle<u64>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "udp_capture=info,network=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting udp-capture {}", env!("CARGO_PKG_VERSION"));

    let pipeline = PipelineConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let sink = sink_from_config(&pipeline.stats);
    let stop = StopToken::new();

    let mut running = Vec::with_capacity(pipeline.streams.len());
    for stream in &pipeline.streams {
        let started = start_stream(stream, &pipeline, sink.clone(), &stop, args.drain)
            .await
            .with_context(|| format!("starting stream {}", stream.name))?;
        running.push(started);
    }
    info!("Capturing {} streams", running.len());

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("Shutdown signal received");
    stop.stop();

    for stream in running {
        match stream.capture.await {
            Ok(Ok(status)) => info!("Stream {} ended: {:?}", stream.name, status),
            Ok(Err(e)) => error!("Stream {} failed: {}", stream.name, e),
            Err(e) => error!("Stream {} task panicked: {}", stream.name, e),
        }
        if let Some(drain) = stream.drain {
            match drain.await {
                Ok(spans) => info!("Stream {} drained {} spans", stream.name, spans),
                Err(e) => warn!("Stream {} drain task failed: {}", stream.name, e),
            }
        }
        let snapshot = stream.stats.snapshot();
        info!(
            "Stream {} final: good {} missing {} invalid {} late {} ({:.3}% loss), ring {:?}",
            stream.name,
            snapshot.good,
            snapshot.missing,
            snapshot.invalid,
            snapshot.late,
            snapshot.loss_fraction() * 100.0,
            stream.ring.stats()
        );
    }
    Ok(())
}

async fn start_stream(
    stream: &StreamConfig,
    pipeline: &PipelineConfig,
    sink: Arc<dyn MetricsSink>,
    stop: &StopToken,
    drain: bool,
) -> Result<RunningStream> {
    let protocol: codec::Protocol = stream.protocol.parse()?;
    let capture_config = CaptureConfig::from_stream(stream, &pipeline.stats);
    let slot_size = capture_config.max_span_bytes(protocol.codec());
    let ring = Ring::open(&stream.name, RingConfig::new(slot_size, stream.backlog))?;

    let socket = UdpSocket::from_config(&UdpConfig::from_stream(stream)?).await?;
    let mut capture = PacketCapture::new(protocol, socket, ring.writer()?, capture_config, sink)?;
    let stats = capture.stats();

    // the reader must exist before the first span so it starts at index 0
    let drain = drain.then(|| {
        let name = stream.name.clone();
        let events = ring.open_reader(stream.guarantee).into_stream();
        tokio::spawn(async move {
            let mut spans = 0u64;
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                match event {
                    ReadEvent::Span(span) => {
                        spans += 1;
                        info!(
                            "{}: span {} time_tag {} ({} bytes{})",
                            name,
                            span.index,
                            span.time_tag,
                            span.len(),
                            if span.is_complete() { "" } else { ", partial" }
                        );
                    }
                    ReadEvent::Gap { missed } => warn!("{}: reader skipped {} spans", name, missed),
                    ReadEvent::Empty | ReadEvent::End => {}
                }
            }
            spans
        })
    });

    let stop = stop.clone();
    let capture = tokio::spawn(async move { capture.run_until_stopped(&stop).await });

    info!(
        "Stream {} ({}, {} sources) capturing into ring with {} byte slots",
        stream.name, protocol, stream.nsrc, slot_size
    );
    Ok(RunningStream {
        name: stream.name.clone(),
        ring,
        stats,
        capture,
        drain,
    })
}
