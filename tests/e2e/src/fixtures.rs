//! Deterministic sample frames

use bytes::Bytes;
use network::SourceFrames;

/// Source-major frames whose every byte depends on source, time and seed
pub fn ramp(nsrc: usize, ntime: usize, payload: usize, seed: u8) -> SourceFrames {
    let region = ntime * payload;
    let data: Vec<u8> = (0..nsrc * region)
        .map(|i| {
            let source = i / region;
            (i % region) as u8 ^ (source as u8).wrapping_mul(37) ^ seed
        })
        .collect();
    SourceFrames::new(Bytes::from(data), nsrc)
}

/// Frames with every byte set to `value`
pub fn constant(nsrc: usize, ntime: usize, payload: usize, value: u8) -> SourceFrames {
    SourceFrames::new(vec![value; nsrc * ntime * payload], nsrc)
}
