//! DRX: beamformer output, two tunings by two polarizations per beam
//!
//! ```text
//! 0      4  5            8             12         14          16         24            28     32
//! │ sync │id│ frame_count │ second_count │ decimation│ time_offset│ time_tag │ tuning_word │ flags│
//! ```
//!
//! The id byte packs `beam` in bits 0-2, `tuning` in bits 3-5 and `pol` in
//! bit 7. Bit 6 is reserved and must be clear.

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use super::{mismatch, non_zero, read_wire, write_wire, Be16, Be32, Be64, SYNC_WORD};
use crate::dtype::DataType;
use crate::error::{check_bits, narrow, CodecError, CodecResult};
use crate::header::{HeaderInfo, PacketHeader};
use crate::protocol::{HeaderCodec, Protocol};

const NAME: &str = "drx";

const BEAM_MASK: u8 = 0x07;
const TUNING_SHIFT: u8 = 3;
const TUNING_MASK: u8 = 0x07;
const RESERVED_BIT: u8 = 0x40;
const POL_BIT: u8 = 0x80;

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
struct DrxWire {
    sync: Be32,
    id: u8,
    frame_count: [u8; 3],
    second_count: Be32,
    decimation: Be16,
    time_offset: Be16,
    time_tag: Be64,
    tuning_word: Be32,
    flags: Be32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrxHeader {
    pub beam: u8,
    /// 1-based tuning number
    pub tuning: u8,
    pub pol: u8,
    /// 24-bit frame counter
    pub frame_count: u32,
    pub second_count: u32,
    pub decimation: u16,
    pub time_offset: u16,
    pub time_tag: u64,
    pub tuning_word: u32,
    pub flags: u32,
}

impl DrxHeader {
    pub const SIZE: usize = 32;
    pub const SAMPLES: usize = 4096;
    pub const FRAME_COUNT_MASK: u32 = 0x00FF_FFFF;
    /// Sample clock in ticks per second
    pub const CLOCK_HZ: u64 = 196_000_000;

    pub fn ticks_per_frame(&self) -> u64 {
        u64::from(self.decimation) * Self::SAMPLES as u64
    }

    pub fn seq(&self) -> u64 {
        self.time_tag / self.ticks_per_frame()
    }

    pub fn source_id(&self) -> u32 {
        (u32::from(self.tuning).saturating_sub(1)) * 2 + u32::from(self.pol)
    }

    fn id_byte(&self) -> CodecResult<u8> {
        check_bits("beam", u64::from(self.beam), 3)?;
        check_bits("tuning", u64::from(self.tuning), 3)?;
        check_bits("pol", u64::from(self.pol), 1)?;
        let pol = if self.pol == 1 { POL_BIT } else { 0 };
        Ok(self.beam | (self.tuning << TUNING_SHIFT) | pol)
    }
}

pub struct DrxCodec;

impl HeaderCodec for DrxCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Drx
    }

    fn header_size(&self) -> usize {
        DrxHeader::SIZE
    }

    fn sample_type(&self) -> DataType {
        DataType::CI4
    }

    fn decode(&self, datagram: &[u8]) -> CodecResult<PacketHeader> {
        let wire: DrxWire = read_wire(NAME, datagram)?;
        if wire.sync.get() != SYNC_WORD {
            return Err(CodecError::bad_sync(NAME, SYNC_WORD, wire.sync.get()));
        }
        if wire.id & RESERVED_BIT != 0 {
            return Err(CodecError::invalid_header(NAME, "reserved id bit set"));
        }
        let tuning = (wire.id >> TUNING_SHIFT) & TUNING_MASK;
        non_zero("tuning", u64::from(tuning))?;
        let decimation = wire.decimation.get();
        non_zero("decimation", u64::from(decimation))?;

        let [c0, c1, c2] = wire.frame_count;
        Ok(PacketHeader::Drx(DrxHeader {
            beam: wire.id & BEAM_MASK,
            tuning,
            pol: u8::from(wire.id & POL_BIT != 0),
            frame_count: u32::from_be_bytes([0, c0, c1, c2]),
            second_count: wire.second_count.get(),
            decimation,
            time_offset: wire.time_offset.get(),
            time_tag: wire.time_tag.get(),
            tuning_word: wire.tuning_word.get(),
            flags: wire.flags.get(),
        }))
    }

    fn encode(&self, header: &PacketHeader, out: &mut [u8]) -> CodecResult<usize> {
        let PacketHeader::Drx(h) = header else {
            return Err(mismatch(NAME, header));
        };
        check_bits("frame_count", u64::from(h.frame_count), 24)?;
        let [_, c0, c1, c2] = h.frame_count.to_be_bytes();
        let wire = DrxWire {
            sync: Be32::new(SYNC_WORD),
            id: h.id_byte()?,
            frame_count: [c0, c1, c2],
            second_count: Be32::new(h.second_count),
            decimation: Be16::new(h.decimation),
            time_offset: Be16::new(h.time_offset),
            time_tag: Be64::new(h.time_tag),
            tuning_word: Be32::new(h.tuning_word),
            flags: Be32::new(h.flags),
        };
        write_wire(NAME, &wire, out)
    }

    fn build(&self, info: &HeaderInfo, time_tag: u64, source_id: u32) -> CodecResult<PacketHeader> {
        let tuning = source_id / 2 + 1;
        check_bits("tuning", u64::from(tuning), 3)?;
        check_bits("beam", u64::from(info.beam), 3)?;
        let decimation: u16 = narrow("decimation", u64::from(info.decimation))?;
        non_zero("decimation", u64::from(decimation))?;

        let ticks = u64::from(decimation) * DrxHeader::SAMPLES as u64;
        Ok(PacketHeader::Drx(DrxHeader {
            beam: info.beam as u8,
            tuning: tuning as u8,
            pol: (source_id % 2) as u8,
            frame_count: (time_tag / ticks) as u32 & DrxHeader::FRAME_COUNT_MASK,
            second_count: (time_tag / DrxHeader::CLOCK_HZ) as u32,
            decimation,
            time_offset: 0,
            time_tag,
            tuning_word: info.tuning,
            flags: 0,
        }))
    }

    fn payload_size(&self, _info: &HeaderInfo) -> usize {
        self.sample_type().bytes_for(DrxHeader::SAMPLES)
    }
}
