//! Protocol registry and the codec trait
//!
//! A stream names its protocol once, at open time. `Protocol::from_str`
//! resolves the name and `Protocol::codec` hands back the static codec, so
//! the per-packet path never compares strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dtype::DataType;
use crate::error::{CodecError, CodecResult};
use crate::formats::{ChipsCodec, DrxCodec, PbeamCodec, SimpleCodec, TbnCodec};
use crate::header::{HeaderInfo, PacketHeader};

/// Packet formats understood by capture and transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Bare 64-bit sequence number followed by ci16 samples
    Simple,
    /// Narrowband single-stand frames, ci8 samples
    Tbn,
    /// Beam frames with per-tuning source ids, ci4 samples
    Drx,
    /// Power beam spectra from beamformer servers, f32 samples
    Pbeam,
    /// Channelized F-engine output, ci4 samples
    Chips,
}

static SIMPLE: SimpleCodec = SimpleCodec;
static TBN: TbnCodec = TbnCodec;
static DRX: DrxCodec = DrxCodec;
static PBEAM: PbeamCodec = PbeamCodec;
static CHIPS: ChipsCodec = ChipsCodec;

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Simple,
        Protocol::Tbn,
        Protocol::Drx,
        Protocol::Pbeam,
        Protocol::Chips,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Simple => "simple",
            Protocol::Tbn => "tbn",
            Protocol::Drx => "drx",
            Protocol::Pbeam => "pbeam",
            Protocol::Chips => "chips",
        }
    }

    /// Codec implementing this protocol's wire layout
    pub fn codec(self) -> &'static dyn HeaderCodec {
        match self {
            Protocol::Simple => &SIMPLE,
            Protocol::Tbn => &TBN,
            Protocol::Drx => &DRX,
            Protocol::Pbeam => &PBEAM,
            Protocol::Chips => &CHIPS,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Protocol::ALL
            .iter()
            .copied()
            .find(|p| p.name() == lower)
            .ok_or_else(|| CodecError::unknown_protocol(s))
    }
}

/// Resolve a protocol name straight to its codec
pub fn lookup(name: &str) -> CodecResult<&'static dyn HeaderCodec> {
    Ok(name.parse::<Protocol>()?.codec())
}

/// Stateless, bidirectional mapping between a fixed header layout and
/// a [`PacketHeader`] record
pub trait HeaderCodec: Send + Sync + 'static {
    fn protocol(&self) -> Protocol;

    /// Size of the fixed header in bytes; the payload follows immediately
    fn header_size(&self) -> usize;

    /// Encoding of the payload samples
    fn sample_type(&self) -> DataType;

    /// Decode the header at the start of a datagram
    fn decode(&self, datagram: &[u8]) -> CodecResult<PacketHeader>;

    /// Encode a header into the front of `out`, returning bytes written
    fn encode(&self, header: &PacketHeader, out: &mut [u8]) -> CodecResult<usize>;

    /// Build the header of one outbound datagram from transmit parameters
    fn build(&self, info: &HeaderInfo, time_tag: u64, source_id: u32) -> CodecResult<PacketHeader>;

    /// Payload bytes carried by each datagram
    fn payload_size(&self, info: &HeaderInfo) -> usize;

    /// Split a datagram into its decoded header and payload
    fn split<'a>(&self, datagram: &'a [u8]) -> CodecResult<(PacketHeader, &'a [u8])> {
        let header = self.decode(datagram)?;
        Ok((header, &datagram[self.header_size()..]))
    }
}
