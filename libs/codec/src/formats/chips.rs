//! CHIPS: channelized F-engine output, one roach board per source

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use super::{mismatch, non_zero, read_wire, write_wire, Be16, Be64};
use crate::dtype::DataType;
use crate::error::{narrow, CodecResult};
use crate::header::{HeaderInfo, PacketHeader};
use crate::protocol::{HeaderCodec, Protocol};

const NAME: &str = "chips";

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
struct ChipsWire {
    roach: u8,
    gbe: u8,
    nchan: u8,
    nsubband: u8,
    subband: u8,
    nroach: u8,
    chan0: Be16,
    seq: Be64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipsHeader {
    /// 1-based roach number
    pub roach: u8,
    pub gbe: u8,
    pub nchan: u8,
    pub nsubband: u8,
    pub subband: u8,
    pub nroach: u8,
    pub chan0: u16,
    pub seq: u64,
}

impl ChipsHeader {
    pub const SIZE: usize = 16;
    pub const NSTAND: usize = 16;
    pub const NPOL: usize = 2;

    pub fn source_id(&self) -> u32 {
        u32::from(self.roach.saturating_sub(1))
    }
}

pub struct ChipsCodec;

impl HeaderCodec for ChipsCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Chips
    }

    fn header_size(&self) -> usize {
        ChipsHeader::SIZE
    }

    fn sample_type(&self) -> DataType {
        DataType::CI4
    }

    fn decode(&self, datagram: &[u8]) -> CodecResult<PacketHeader> {
        let wire: ChipsWire = read_wire(NAME, datagram)?;
        non_zero("roach", u64::from(wire.roach))?;
        non_zero("nroach", u64::from(wire.nroach))?;
        Ok(PacketHeader::Chips(ChipsHeader {
            roach: wire.roach,
            gbe: wire.gbe,
            nchan: wire.nchan,
            nsubband: wire.nsubband,
            subband: wire.subband,
            nroach: wire.nroach,
            chan0: wire.chan0.get(),
            seq: wire.seq.get(),
        }))
    }

    fn encode(&self, header: &PacketHeader, out: &mut [u8]) -> CodecResult<usize> {
        let PacketHeader::Chips(h) = header else {
            return Err(mismatch(NAME, header));
        };
        let wire = ChipsWire {
            roach: h.roach,
            gbe: h.gbe,
            nchan: h.nchan,
            nsubband: h.nsubband,
            subband: h.subband,
            nroach: h.nroach,
            chan0: Be16::new(h.chan0),
            seq: Be64::new(h.seq),
        };
        write_wire(NAME, &wire, out)
    }

    fn build(&self, info: &HeaderInfo, time_tag: u64, source_id: u32) -> CodecResult<PacketHeader> {
        Ok(PacketHeader::Chips(ChipsHeader {
            roach: narrow("roach", u64::from(source_id) + 1)?,
            gbe: 0,
            nchan: narrow("nchan", u64::from(info.nchan))?,
            nsubband: 1,
            subband: 0,
            nroach: narrow("nroach", u64::from(info.nsrc))?,
            chan0: narrow("chan0", u64::from(info.chan0))?,
            seq: time_tag,
        }))
    }

    fn payload_size(&self, info: &HeaderInfo) -> usize {
        let samples = info.nchan as usize * ChipsHeader::NSTAND * ChipsHeader::NPOL;
        self.sample_type().bytes_for(samples)
    }
}
