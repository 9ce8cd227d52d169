//! TBN: narrowband single-stand frames
//!
//! ```text
//! 0      4             8            12      14    16          24
//! │ sync │ frame_count │ tuning_word │ tbn_id│ gain│ time_tag  │ 512 × ci8
//! ```
//!
//! The time tag is carried on the wire and `seq` is derived from it at the
//! fixed decimation of 1960. Bit 15 of `tbn_id` marks a TBW frame sharing
//! the same header, which this codec does not accept.

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use super::{mismatch, read_wire, write_wire, Be16, Be32, Be64, SYNC_WORD};
use crate::dtype::DataType;
use crate::error::{check_bits, narrow, CodecError, CodecResult};
use crate::header::{HeaderInfo, PacketHeader};
use crate::protocol::{HeaderCodec, Protocol};

const NAME: &str = "tbn";

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
struct TbnWire {
    sync: Be32,
    frame_count: Be32,
    tuning_word: Be32,
    tbn_id: Be16,
    gain: Be16,
    time_tag: Be64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TbnHeader {
    pub frame_count: u32,
    pub tuning_word: u32,
    pub tbn_id: u16,
    pub gain: u16,
    pub time_tag: u64,
}

impl TbnHeader {
    pub const SIZE: usize = 24;
    pub const SAMPLES: usize = 512;
    pub const DECIMATION: u32 = 1960;
    pub const TICKS_PER_FRAME: u64 = Self::DECIMATION as u64 * Self::SAMPLES as u64;
    pub const TBW_FLAG: u16 = 0x8000;
    pub const STAND_MASK: u16 = 0x03FF;

    pub fn seq(&self) -> u64 {
        self.time_tag / Self::TICKS_PER_FRAME
    }

    pub fn source_id(&self) -> u32 {
        u32::from(self.tbn_id & Self::STAND_MASK)
    }
}

pub struct TbnCodec;

impl HeaderCodec for TbnCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Tbn
    }

    fn header_size(&self) -> usize {
        TbnHeader::SIZE
    }

    fn sample_type(&self) -> DataType {
        DataType::CI8
    }

    fn decode(&self, datagram: &[u8]) -> CodecResult<PacketHeader> {
        let wire: TbnWire = read_wire(NAME, datagram)?;
        if wire.sync.get() != SYNC_WORD {
            return Err(CodecError::bad_sync(NAME, SYNC_WORD, wire.sync.get()));
        }
        let tbn_id = wire.tbn_id.get();
        if tbn_id & TbnHeader::TBW_FLAG != 0 {
            return Err(CodecError::invalid_header(NAME, "TBW frame"));
        }
        Ok(PacketHeader::Tbn(TbnHeader {
            frame_count: wire.frame_count.get(),
            tuning_word: wire.tuning_word.get(),
            tbn_id,
            gain: wire.gain.get(),
            time_tag: wire.time_tag.get(),
        }))
    }

    fn encode(&self, header: &PacketHeader, out: &mut [u8]) -> CodecResult<usize> {
        let PacketHeader::Tbn(h) = header else {
            return Err(mismatch(NAME, header));
        };
        check_bits("tbn_id", u64::from(h.tbn_id), 15)?;
        let wire = TbnWire {
            sync: Be32::new(SYNC_WORD),
            frame_count: Be32::new(h.frame_count),
            tuning_word: Be32::new(h.tuning_word),
            tbn_id: Be16::new(h.tbn_id),
            gain: Be16::new(h.gain),
            time_tag: Be64::new(h.time_tag),
        };
        write_wire(NAME, &wire, out)
    }

    fn build(&self, info: &HeaderInfo, time_tag: u64, source_id: u32) -> CodecResult<PacketHeader> {
        check_bits("source_id", u64::from(source_id), 10)?;
        Ok(PacketHeader::Tbn(TbnHeader {
            // 32-bit frame counter wraps
            frame_count: (time_tag / TbnHeader::TICKS_PER_FRAME) as u32,
            tuning_word: info.tuning,
            tbn_id: source_id as u16,
            gain: narrow("gain", u64::from(info.gain))?,
            time_tag,
        }))
    }

    fn payload_size(&self, _info: &HeaderInfo) -> usize {
        self.sample_type().bytes_for(TbnHeader::SAMPLES)
    }
}
