//! Transmit to capture scenarios

use codec::Protocol;
use e2e_tests::{fixtures, Pipe, PipeConfig};
use network::{BlockId, CaptureStatus, MemorySink, ProcLogSink, SequenceHeader};
use std::sync::Arc;
use stream_ring::Guarantee;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tbn_32_sources_128_intervals_lossless() {
    let mut config = PipeConfig::new("e2e-tbn-lossless", Protocol::Tbn, 32);
    config.span_ntime = 2;
    let sink = MemorySink::new();
    let mut pipe = Pipe::start(config, Arc::new(sink.clone())).unwrap();
    let payload = 1024;

    let mut sent_frames = Vec::new();
    for interval in 0..128u32 {
        let frames = fixtures::ramp(32, 2, payload, interval as u8);
        assert_eq!(pipe.send_interval(&frames).await.unwrap(), 64);
        sent_frames.push(frames);
    }
    let outcome = pipe.finish().await.unwrap();

    assert_eq!(outcome.status, CaptureStatus::Closed);
    assert_eq!(outcome.captured.missing, 0);
    assert_eq!(outcome.captured.invalid, 0);
    assert_eq!(outcome.captured.late, 0);
    assert_eq!(outcome.captured.good, outcome.transmitted.good);
    assert_eq!(outcome.transmitted.good, 128 * 64 * payload as u64);

    assert_eq!(outcome.spans.len(), 128);
    for (span, frames) in outcome.spans.iter().zip(&sent_frames) {
        assert!(span.is_complete());
        assert_eq!(span.data, frames.data);
    }
    let tags: Vec<u64> = outcome.spans.iter().map(|s| s.time_tag).collect();
    assert!(tags.windows(2).all(|w| w[1] - w[0] == 2 * codec::TbnHeader::TICKS_PER_FRAME));

    let first = SequenceHeader::parse(&outcome.spans[0].header).unwrap();
    assert_eq!(first.seq0, 1000);
    assert_eq!(first.nsrc, 32);
    assert_eq!(first.dtype, codec::DataType::CI8);

    assert_eq!(
        sink.get(&BlockId::capture("e2e-tbn-lossless")),
        Some(outcome.captured)
    );
    assert_eq!(
        sink.get(&BlockId::transmit("e2e-tbn-lossless")),
        Some(outcome.transmitted)
    );
}

#[tokio::test]
async fn producer_closes_mid_assembly() {
    let config = PipeConfig::new("e2e-mid-close", Protocol::Tbn, 8);
    let mut pipe = Pipe::start(config, Arc::new(MemorySink::new())).unwrap();
    for interval in 0..3u8 {
        pipe.send_interval(&fixtures::ramp(8, 1, 1024, interval))
            .await
            .unwrap();
    }
    // even sources only, then the transmitter goes away
    pipe.send_sources(&fixtures::constant(4, 1, 1024, 0x5A), 0, 2)
        .await
        .unwrap();
    let outcome = pipe.finish().await.unwrap();

    assert_eq!(outcome.spans.len(), 4);
    let partial = &outcome.spans[3];
    assert!(!partial.is_complete());
    for source in 0..8 {
        let expected = if source % 2 == 0 { 0x5A } else { 0 };
        assert!(partial.source(source).iter().all(|&b| b == expected));
    }
    assert_eq!(outcome.captured.missing, 4 * 1024);
    assert_eq!(outcome.captured.good, (3 * 8 + 4) * 1024);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_streams_keep_separate_counters() {
    let sink = MemorySink::new();

    let tbn = PipeConfig::new("e2e-concurrent-tbn", Protocol::Tbn, 8);
    let mut drx = PipeConfig::new("e2e-concurrent-drx", Protocol::Drx, 4);
    drx.info = drx.info.with_decimation(8).with_tuning(0x1F2E3D4C);
    drx.span_ntime = 4;

    let mut tbn_pipe = Pipe::start(tbn, Arc::new(sink.clone())).unwrap();
    let mut drx_pipe = Pipe::start(drx, Arc::new(sink.clone())).unwrap();

    let tbn_run = async move {
        for i in 0..20u8 {
            if i == 10 {
                tbn_pipe.skip_interval();
                continue;
            }
            tbn_pipe
                .send_interval(&fixtures::ramp(8, 1, 1024, i))
                .await
                .unwrap();
        }
        tbn_pipe.finish().await.unwrap()
    };
    let drx_run = async move {
        for i in 0..12u8 {
            drx_pipe
                .send_interval(&fixtures::ramp(4, 4, 4096, i))
                .await
                .unwrap();
        }
        drx_pipe.finish().await.unwrap()
    };
    let (tbn, drx) = tokio::join!(tbn_run, drx_run);

    assert_eq!(tbn.spans.len(), 19);
    assert_eq!(tbn.captured.missing, 8 * 1024);
    assert_eq!(tbn.captured.good, 19 * 8 * 1024);

    assert_eq!(drx.spans.len(), 12);
    assert_eq!(drx.captured.missing, 0);
    assert_eq!(drx.captured.good, 12 * 4 * 4 * 4096);
    let header = SequenceHeader::parse(&drx.spans[0].header).unwrap();
    assert_eq!(header.protocol, Protocol::Drx);
    assert_eq!(header.tuning, 0x1F2E3D4C);
    assert_eq!(header.decimation, 8);

    assert_eq!(sink.get(&BlockId::capture("e2e-concurrent-tbn")), Some(tbn.captured));
    assert_eq!(sink.get(&BlockId::capture("e2e-concurrent-drx")), Some(drx.captured));
}

#[tokio::test]
async fn pbeam_spectra_keep_channel_metadata() {
    let mut config = PipeConfig::new("e2e-pbeam", Protocol::Pbeam, 3);
    config.info = config
        .info
        .with_nchan(12)
        .with_chan0(600)
        .with_decimation(24)
        .with_tuning(2);
    let mut pipe = Pipe::start(config, Arc::new(MemorySink::new())).unwrap();
    let payload = 12 * 4 * 4;
    for i in 0..5u8 {
        pipe.send_interval(&fixtures::ramp(3, 1, payload, i))
            .await
            .unwrap();
    }
    let outcome = pipe.finish().await.unwrap();

    assert_eq!(outcome.spans.len(), 5);
    let header = SequenceHeader::parse(&outcome.spans[0].header).unwrap();
    assert_eq!(header.nchan, 12);
    assert_eq!(header.chan0, 600);
    assert_eq!(header.decimation, 24);
    assert_eq!(header.payload_size, payload);
    assert_eq!(header.dtype, codec::DataType::F32);
    // navg ticks per spectrum
    assert_eq!(outcome.spans[1].time_tag - outcome.spans[0].time_tag, 24);
}

#[tokio::test]
async fn best_effort_reader_sees_gap_not_backpressure() {
    let mut config = PipeConfig::new("e2e-best-effort", Protocol::Simple, 1);
    config.backlog = 4;
    config.reader = None;
    let mut pipe = Pipe::start(config, Arc::new(MemorySink::new())).unwrap();
    let mut late = pipe.ring.open_reader(Guarantee::BestEffort);
    for i in 0..64u8 {
        pipe.send_interval(&fixtures::constant(1, 1, 8192, i))
            .await
            .unwrap();
    }
    let outcome = pipe.finish().await.unwrap();
    assert_eq!(outcome.captured.good, 64 * 8192);

    assert_eq!(late.try_next(), stream_ring::ReadEvent::Gap { missed: 60 });
    for i in 60..64u8 {
        match late.try_next() {
            stream_ring::ReadEvent::Span(span) => assert_eq!(span.data[0], i),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(late.try_next(), stream_ring::ReadEvent::End);
}

#[tokio::test]
async fn proclog_export_matches_final_counters() {
    let dir = tempfile::tempdir().unwrap();
    let mut stats = config::StatsConfig::default();
    stats.sink = config::SinkKind::Proclog;
    stats.proclog_dir = dir.path().to_path_buf();

    let mut chips = PipeConfig::new("e2e-proclog-chips", Protocol::Chips, 2);
    chips.info = chips.info.with_nchan(4);
    let mut pipe = Pipe::start(chips, network::sink_from_config(&stats)).unwrap();
    // 4 channels of 16 stands by 2 pols, one ci4 byte each
    for i in 0..3u8 {
        pipe.send_interval(&fixtures::ramp(2, 1, 4 * 32, i))
            .await
            .unwrap();
    }
    let outcome = pipe.finish().await.unwrap();

    let path = ProcLogSink::new(dir.path()).path_for(&BlockId::capture("e2e-proclog-chips"));
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains(&format!("ngood_bytes : {}\n", outcome.captured.good)));
    assert!(text.contains("nmissing_bytes : 0\n"));
    assert!(text.contains("nvalid : 6\n"));
}
