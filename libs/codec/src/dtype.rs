//! Sample data types carried in packet payloads
//!
//! Names follow the `<kind><nbit>` convention used across the pipeline:
//! `i`/`u` integers, `f` floats, `ci` complex signed integers, `cf` complex
//! floats. For complex types `nbit` is the width of one component, so `ci4`
//! packs a 4-bit real and a 4-bit imaginary part into one byte.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// Payload sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    F32,
    F64,
    CI4,
    CI8,
    CI16,
    CI32,
    CF32,
    CF64,
}

impl DataType {
    const ALL: [DataType; 14] = [
        DataType::I8,
        DataType::I16,
        DataType::I32,
        DataType::U8,
        DataType::U16,
        DataType::U32,
        DataType::F32,
        DataType::F64,
        DataType::CI4,
        DataType::CI8,
        DataType::CI16,
        DataType::CI32,
        DataType::CF32,
        DataType::CF64,
    ];

    /// Bits per component
    pub fn nbit(self) -> u32 {
        match self {
            DataType::CI4 => 4,
            DataType::I8 | DataType::U8 | DataType::CI8 => 8,
            DataType::I16 | DataType::U16 | DataType::CI16 => 16,
            DataType::I32 | DataType::U32 | DataType::F32 | DataType::CI32 | DataType::CF32 => 32,
            DataType::F64 | DataType::CF64 => 64,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(
            self,
            DataType::CI4 | DataType::CI8 | DataType::CI16 | DataType::CI32 | DataType::CF32 | DataType::CF64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64 | DataType::CF32 | DataType::CF64)
    }

    pub fn is_signed(self) -> bool {
        !matches!(self, DataType::U8 | DataType::U16 | DataType::U32)
    }

    /// Bits occupied by one sample, both components for complex types
    pub fn sample_bits(self) -> u32 {
        if self.is_complex() {
            self.nbit() * 2
        } else {
            self.nbit()
        }
    }

    /// Bytes needed for `nsamples` samples
    pub fn bytes_for(self, nsamples: usize) -> usize {
        (nsamples * self.sample_bits() as usize).div_ceil(8)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::I8 => "i8",
            DataType::I16 => "i16",
            DataType::I32 => "i32",
            DataType::U8 => "u8",
            DataType::U16 => "u16",
            DataType::U32 => "u32",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::CI4 => "ci4",
            DataType::CI8 => "ci8",
            DataType::CI16 => "ci16",
            DataType::CI32 => "ci32",
            DataType::CF32 => "cf32",
            DataType::CF64 => "cf64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|dtype| dtype.as_str() == lower)
            .ok_or_else(|| CodecError::invalid_header("dtype", format!("unsupported data type '{}'", s)))
    }
}

impl TryFrom<String> for DataType {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.as_str().to_string()
    }
}
