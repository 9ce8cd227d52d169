//! Simple: an 8-byte sequence number, nothing else

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use super::{mismatch, read_wire, write_wire, Be64};
use crate::dtype::DataType;
use crate::error::CodecResult;
use crate::header::{HeaderInfo, PacketHeader};
use crate::protocol::{HeaderCodec, Protocol};

const NAME: &str = "simple";

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
struct SimpleWire {
    seq: Be64,
}

/// Simple header; the sequence number doubles as the time tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleHeader {
    pub seq: u64,
}

impl SimpleHeader {
    pub const SIZE: usize = 8;
    pub const SAMPLES: usize = 2048;
}

pub struct SimpleCodec;

impl HeaderCodec for SimpleCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Simple
    }

    fn header_size(&self) -> usize {
        SimpleHeader::SIZE
    }

    fn sample_type(&self) -> DataType {
        DataType::CI16
    }

    fn decode(&self, datagram: &[u8]) -> CodecResult<PacketHeader> {
        let wire: SimpleWire = read_wire(NAME, datagram)?;
        Ok(PacketHeader::Simple(SimpleHeader {
            seq: wire.seq.get(),
        }))
    }

    fn encode(&self, header: &PacketHeader, out: &mut [u8]) -> CodecResult<usize> {
        let PacketHeader::Simple(h) = header else {
            return Err(mismatch(NAME, header));
        };
        write_wire(NAME, &SimpleWire { seq: Be64::new(h.seq) }, out)
    }

    fn build(&self, _info: &HeaderInfo, time_tag: u64, _source_id: u32) -> CodecResult<PacketHeader> {
        Ok(PacketHeader::Simple(SimpleHeader { seq: time_tag }))
    }

    fn payload_size(&self, _info: &HeaderInfo) -> usize {
        self.sample_type().bytes_for(SimpleHeader::SAMPLES)
    }
}
