//! Span assembly from multi-source TBN traffic over in-memory sockets

use codec::{HeaderInfo, Protocol, TbnHeader};
use network::{
    CaptureConfig, CaptureStatus, DatagramSocket, MemorySink, MemorySocket, PacketCapture,
    StopToken,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stream_ring::{Guarantee, ReadEvent, Ring, RingConfig, RingReader, Span};

const PAYLOAD: usize = 1024;

static CASE: AtomicU64 = AtomicU64::new(0);

fn unique(name: &str) -> String {
    format!("{}-{}", name, CASE.fetch_add(1, Ordering::Relaxed))
}

fn tbn_datagram(seq: u64, source: u32, fill: u8) -> Vec<u8> {
    let codec = Protocol::Tbn.codec();
    let info = HeaderInfo::new().with_nsrc(64);
    let header = codec
        .build(&info, seq * TbnHeader::TICKS_PER_FRAME, source)
        .unwrap();
    let mut out = vec![fill; codec.header_size() + PAYLOAD];
    codec.encode(&header, &mut out).unwrap();
    out
}

struct Harness {
    ring: Ring,
    tx: MemorySocket,
    capture: PacketCapture<MemorySocket>,
    sink: MemorySink,
}

fn harness(name: &str, nsrc: usize) -> Harness {
    let name = unique(name);
    let ring = Ring::open(&name, RingConfig::new(nsrc * PAYLOAD, 256)).unwrap();
    let (tx, rx) = MemorySocket::pair(1024);
    let sink = MemorySink::new();
    let mut config = CaptureConfig::new(&name, nsrc);
    config.timeout = Duration::from_millis(50);
    let capture = PacketCapture::new(
        Protocol::Tbn,
        rx,
        ring.writer().unwrap(),
        config,
        Arc::new(sink.clone()),
    )
    .unwrap();
    Harness {
        ring,
        tx,
        capture,
        sink,
    }
}

async fn spans(reader: &mut RingReader) -> Vec<Span> {
    let mut out = Vec::new();
    loop {
        match reader.next().await {
            ReadEvent::Span(span) => out.push(span),
            ReadEvent::End => return out,
            other => panic!("unexpected {other:?}"),
        }
    }
}

fn fill(seq: u64, source: u32) -> u8 {
    (seq as u8).wrapping_mul(31).wrapping_add(source as u8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_arrival_order_assembles_the_same_span(
        order in Just((0u32..8).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let Harness { ring, tx, mut capture, .. } = harness("permute", 8);
            let mut reader = ring.open_reader(Guarantee::Guaranteed);
            for &source in &order {
                tx.send(&tbn_datagram(40, source, fill(40, source))).await.unwrap();
            }
            drop(tx);
            capture.run(&StopToken::new()).await.unwrap();

            let spans = spans(&mut reader).await;
            assert_eq!(spans.len(), 1);
            let span = &spans[0];
            assert!(span.is_complete());
            assert_eq!(span.time_tag, 40 * TbnHeader::TICKS_PER_FRAME);
            for source in 0..8u32 {
                assert_eq!(
                    &span.source(source as usize)[..],
                    &vec![fill(40, source); PAYLOAD][..]
                );
            }
            assert_eq!(capture.snapshot().missing, 0);
        });
    }
}

#[tokio::test]
async fn one_dropped_source_counts_its_payload_missing() {
    let Harness {
        ring,
        tx,
        mut capture,
        sink,
    } = harness("drop-one", 4);
    let mut reader = ring.open_reader(Guarantee::Guaranteed);
    for seq in 100..103u64 {
        for source in 0..4u32 {
            if seq == 101 && source == 2 {
                continue;
            }
            tx.send(&tbn_datagram(seq, source, fill(seq, source)))
                .await
                .unwrap();
        }
    }
    drop(tx);
    assert_eq!(capture.run(&StopToken::new()).await.unwrap(), CaptureStatus::Closed);

    let spans = spans(&mut reader).await;
    assert_eq!(spans.len(), 3);
    let gappy = &spans[1];
    assert!(!gappy.is_complete());
    assert!(gappy.source(2).iter().all(|&b| b == 0));
    assert_eq!(&gappy.source(3)[..], &vec![fill(101, 3); PAYLOAD][..]);
    assert!(spans[0].is_complete() && spans[2].is_complete());

    let stats = sink.get(capture.block_id()).unwrap();
    assert_eq!(stats.missing, PAYLOAD as u64);
    assert_eq!(stats.good, 11 * PAYLOAD as u64);
    assert_eq!(stats.nvalid, 11);
}

#[tokio::test]
async fn late_packet_never_touches_a_pushed_span() {
    let Harness {
        ring,
        tx,
        mut capture,
        ..
    } = harness("late", 2);
    let mut reader = ring.open_reader(Guarantee::Guaranteed);
    for seq in [7u64, 8] {
        for source in 0..2 {
            tx.send(&tbn_datagram(seq, source, fill(seq, source)))
                .await
                .unwrap();
        }
    }
    tx.send(&tbn_datagram(7, 1, 0xFF)).await.unwrap();
    drop(tx);
    capture.run(&StopToken::new()).await.unwrap();

    let spans = spans(&mut reader).await;
    assert_eq!(spans.len(), 2);
    assert_eq!(&spans[0].source(1)[..], &vec![fill(7, 1); PAYLOAD][..]);
    let stats = capture.snapshot();
    assert_eq!(stats.late, PAYLOAD as u64);
    assert_eq!(stats.missing, 0);
}

#[tokio::test]
async fn close_mid_assembly_pushes_the_partial_span() {
    let Harness {
        ring,
        tx,
        mut capture,
        sink,
    } = harness("mid-close", 4);
    let mut reader = ring.open_reader(Guarantee::Guaranteed);
    for source in 0..4 {
        tx.send(&tbn_datagram(1, source, 1)).await.unwrap();
    }
    for source in [0, 3] {
        tx.send(&tbn_datagram(2, source, 2)).await.unwrap();
    }

    // stop once everything queued has been consumed
    let stop = StopToken::new();
    for _ in 0..6 {
        assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Accepted);
    }
    stop.stop();
    assert_eq!(capture.run(&stop).await.unwrap(), CaptureStatus::Stopped);
    assert!(ring.writing_ended());

    let spans = spans(&mut reader).await;
    assert_eq!(spans.len(), 2);
    assert!(!spans[1].is_complete());
    assert_eq!(&spans[1].source(3)[..], &vec![2u8; PAYLOAD][..]);
    assert_eq!(sink.get(capture.block_id()).unwrap().missing, 2 * PAYLOAD as u64);
    drop(tx);
}

#[tokio::test]
async fn foreign_sources_and_resized_payloads_are_invalid() {
    let Harness {
        tx, mut capture, ..
    } = harness("invalid", 2);
    tx.send(&tbn_datagram(5, 0, 0)).await.unwrap();
    // source 9 is outside 0..2
    tx.send(&tbn_datagram(5, 9, 0)).await.unwrap();
    let mut short = tbn_datagram(5, 1, 0);
    short.truncate(24 + 512);
    tx.send(&short).await.unwrap();

    assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Accepted);
    assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Invalid);
    assert_eq!(capture.recv().await.unwrap(), CaptureStatus::Invalid);
    assert_eq!(capture.snapshot().invalid, (24 + PAYLOAD + 24 + 512) as u64);
}
