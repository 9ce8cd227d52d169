//! PBeam: integrated power spectra from beamformer servers

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use super::{mismatch, non_zero, read_wire, write_wire, Be16, Be64};
use crate::dtype::DataType;
use crate::error::{narrow, CodecError, CodecResult};
use crate::header::{HeaderInfo, PacketHeader};
use crate::protocol::{HeaderCodec, Protocol};

const NAME: &str = "pbeam";

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
struct PbeamWire {
    server: u8,
    beam: u8,
    gbe: u8,
    nchan: u8,
    nbeam: u8,
    nserver: u8,
    navg: Be16,
    chan0: Be16,
    seq: Be64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PbeamHeader {
    /// 1-based server number
    pub server: u8,
    pub beam: u8,
    pub gbe: u8,
    pub nchan: u8,
    pub nbeam: u8,
    pub nserver: u8,
    /// Spectra integrated per packet
    pub navg: u16,
    pub chan0: u16,
    /// Raw counter in units of single spectra; advances by `navg` per packet
    pub seq: u64,
}

impl PbeamHeader {
    pub const SIZE: usize = 18;
    pub const NPOL: usize = 4;

    pub fn seq(&self) -> u64 {
        self.seq / u64::from(self.navg.max(1))
    }

    pub fn source_id(&self) -> u32 {
        u32::from(self.server.saturating_sub(1))
    }
}

pub struct PbeamCodec;

impl HeaderCodec for PbeamCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Pbeam
    }

    fn header_size(&self) -> usize {
        PbeamHeader::SIZE
    }

    fn sample_type(&self) -> DataType {
        DataType::F32
    }

    fn decode(&self, datagram: &[u8]) -> CodecResult<PacketHeader> {
        let wire: PbeamWire = read_wire(NAME, datagram)?;
        non_zero("server", u64::from(wire.server))?;
        non_zero("nserver", u64::from(wire.nserver))?;
        non_zero("navg", u64::from(wire.navg.get()))?;
        if wire.server > wire.nserver {
            return Err(CodecError::invalid_header(
                NAME,
                format!("server {} of {} servers", wire.server, wire.nserver),
            ));
        }
        Ok(PacketHeader::Pbeam(PbeamHeader {
            server: wire.server,
            beam: wire.beam,
            gbe: wire.gbe,
            nchan: wire.nchan,
            nbeam: wire.nbeam,
            nserver: wire.nserver,
            navg: wire.navg.get(),
            chan0: wire.chan0.get(),
            seq: wire.seq.get(),
        }))
    }

    fn encode(&self, header: &PacketHeader, out: &mut [u8]) -> CodecResult<usize> {
        let PacketHeader::Pbeam(h) = header else {
            return Err(mismatch(NAME, header));
        };
        let wire = PbeamWire {
            server: h.server,
            beam: h.beam,
            gbe: h.gbe,
            nchan: h.nchan,
            nbeam: h.nbeam,
            nserver: h.nserver,
            navg: Be16::new(h.navg),
            chan0: Be16::new(h.chan0),
            seq: Be64::new(h.seq),
        };
        write_wire(NAME, &wire, out)
    }

    fn build(&self, info: &HeaderInfo, time_tag: u64, source_id: u32) -> CodecResult<PacketHeader> {
        let server: u8 = narrow("server", u64::from(source_id) + 1)?;
        let nserver: u8 = narrow("nserver", u64::from(info.nsrc))?;
        let navg: u16 = narrow("navg", u64::from(info.decimation))?;
        non_zero("navg", u64::from(navg))?;
        Ok(PacketHeader::Pbeam(PbeamHeader {
            server,
            beam: narrow("beam", u64::from(info.tuning))?,
            gbe: 0,
            nchan: narrow("nchan", u64::from(info.nchan))?,
            nbeam: 1,
            nserver,
            navg,
            chan0: narrow("chan0", u64::from(info.chan0))?,
            seq: time_tag,
        }))
    }

    fn payload_size(&self, info: &HeaderInfo) -> usize {
        let samples = info.nchan as usize * PbeamHeader::NPOL;
        self.sample_type().bytes_for(samples)
    }
}
