//! Decoded header records
//!
//! Each protocol keeps every wire field in its record so that a decoded
//! header re-encodes byte for byte. The derived quantities the capture state
//! machine needs (`seq`, `time_tag`, `source_id`) are computed from those
//! fields, per protocol, by the accessors on [`PacketHeader`].

use serde::{Deserialize, Serialize};

use crate::formats::{ChipsHeader, DrxHeader, PbeamHeader, SimpleHeader, TbnHeader};
use crate::protocol::Protocol;

/// Decoded header of one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHeader {
    Simple(SimpleHeader),
    Tbn(TbnHeader),
    Drx(DrxHeader),
    Pbeam(PbeamHeader),
    Chips(ChipsHeader),
}

/// Channel and tuning metadata common to all protocols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub chan0: u32,
    pub nchan: u32,
    pub tuning: u32,
    pub decimation: u32,
}

impl PacketHeader {
    pub fn protocol(&self) -> Protocol {
        match self {
            PacketHeader::Simple(_) => Protocol::Simple,
            PacketHeader::Tbn(_) => Protocol::Tbn,
            PacketHeader::Drx(_) => Protocol::Drx,
            PacketHeader::Pbeam(_) => Protocol::Pbeam,
            PacketHeader::Chips(_) => Protocol::Chips,
        }
    }

    /// Position of this packet in the stream, one step per packet time
    pub fn seq(&self) -> u64 {
        match self {
            PacketHeader::Simple(h) => h.seq,
            PacketHeader::Tbn(h) => h.seq(),
            PacketHeader::Drx(h) => h.seq(),
            PacketHeader::Pbeam(h) => h.seq(),
            PacketHeader::Chips(h) => h.seq,
        }
    }

    /// Time of the first sample, in protocol clock ticks
    pub fn time_tag(&self) -> u64 {
        match self {
            PacketHeader::Simple(h) => h.seq,
            PacketHeader::Tbn(h) => h.time_tag,
            PacketHeader::Drx(h) => h.time_tag,
            PacketHeader::Pbeam(h) => h.seq,
            PacketHeader::Chips(h) => h.seq,
        }
    }

    /// Clock ticks between consecutive `seq` values
    pub fn ticks_per_seq(&self) -> u64 {
        match self {
            PacketHeader::Simple(_) | PacketHeader::Chips(_) => 1,
            PacketHeader::Tbn(_) => TbnHeader::TICKS_PER_FRAME,
            PacketHeader::Drx(h) => h.ticks_per_frame(),
            PacketHeader::Pbeam(h) => u64::from(h.navg),
        }
    }

    /// Source identifier as carried on the wire, before `src0` is removed
    pub fn source_id(&self) -> u32 {
        match self {
            PacketHeader::Simple(_) => 0,
            PacketHeader::Tbn(h) => h.source_id(),
            PacketHeader::Drx(h) => h.source_id(),
            PacketHeader::Pbeam(h) => h.source_id(),
            PacketHeader::Chips(h) => h.source_id(),
        }
    }

    pub fn channels(&self) -> ChannelInfo {
        match self {
            PacketHeader::Simple(_) => ChannelInfo::default(),
            PacketHeader::Tbn(h) => ChannelInfo {
                tuning: h.tuning_word,
                decimation: TbnHeader::DECIMATION,
                ..ChannelInfo::default()
            },
            PacketHeader::Drx(h) => ChannelInfo {
                tuning: h.tuning_word,
                decimation: u32::from(h.decimation),
                ..ChannelInfo::default()
            },
            PacketHeader::Pbeam(h) => ChannelInfo {
                chan0: u32::from(h.chan0),
                nchan: u32::from(h.nchan),
                tuning: u32::from(h.beam),
                decimation: u32::from(h.navg),
            },
            PacketHeader::Chips(h) => ChannelInfo {
                chan0: u32::from(h.chan0),
                nchan: u32::from(h.nchan),
                ..ChannelInfo::default()
            },
        }
    }
}

/// Parameters describing the datagrams a transmitter emits
///
/// Fields are deliberately wider than most wire layouts; narrowing happens
/// in [`crate::HeaderCodec::build`] and fails with `InvalidField`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderInfo {
    /// Sources in the stream (servers for pbeam, roaches for chips)
    pub nsrc: u32,
    pub nchan: u32,
    pub chan0: u32,
    /// Tuning word, or beam number for pbeam
    pub tuning: u32,
    pub gain: u32,
    /// Decimation factor, or number of averages for pbeam
    pub decimation: u32,
    /// Beam index for drx
    pub beam: u32,
}

impl HeaderInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nsrc(mut self, nsrc: u32) -> Self {
        self.nsrc = nsrc;
        self
    }

    pub fn with_nchan(mut self, nchan: u32) -> Self {
        self.nchan = nchan;
        self
    }

    pub fn with_chan0(mut self, chan0: u32) -> Self {
        self.chan0 = chan0;
        self
    }

    pub fn with_tuning(mut self, tuning: u32) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_gain(mut self, gain: u32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_decimation(mut self, decimation: u32) -> Self {
        self.decimation = decimation;
        self
    }

    pub fn with_beam(mut self, beam: u32) -> Self {
        self.beam = beam;
        self
    }
}
