use serde::{Deserialize, Serialize};

use crate::error::{PtexError, Result};

/// Largest log2 side length. Caps a side at about a billion texels so that
/// area computations cannot overflow.
pub const RLOG2_LIMIT: u8 = 30;

/// Per-channel storage type of a texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[value(name = "uint8")]
    Uint8,
    #[value(name = "float32")]
    Float32,
}

impl DataType {
    /// Size of one channel in bytes.
    pub fn num_bytes(self) -> usize {
        match self {
            DataType::Uint8 => 1,
            DataType::Float32 => 4,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Uint8 => write!(f, "uint8"),
            DataType::Float32 => write!(f, "float32"),
        }
    }
}

/// Data type plus channel count of every texel in a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TexelFormat {
    data_type: DataType,
    num_channels: u8,
}

impl TexelFormat {
    /// Validate and build a format. Channel count must lie in `1..=4`.
    pub fn new(data_type: DataType, num_channels: u8) -> Result<Self> {
        if !(1..=4).contains(&num_channels) {
            return Err(PtexError::Format(format!(
                "channel count {num_channels} outside 1..=4"
            )));
        }
        Ok(Self {
            data_type,
            num_channels,
        })
    }

    /// Map an archive's raw type descriptor onto a texel format.
    ///
    /// Archives describe their channel type by name; anything other than
    /// 8-bit unsigned or 32-bit float is rejected.
    pub fn from_archive(type_desc: &str, num_channels: u32) -> Result<Self> {
        let data_type = match type_desc.to_ascii_lowercase().as_str() {
            "uint8" | "u8" => DataType::Uint8,
            "float32" | "float" | "f32" => DataType::Float32,
            other => {
                return Err(PtexError::Format(format!(
                    "unsupported channel type: {other}"
                )));
            }
        };
        let num_channels = u8::try_from(num_channels).map_err(|_| {
            PtexError::Format(format!("channel count {num_channels} outside 1..=4"))
        })?;
        Self::new(data_type, num_channels)
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn num_channels(&self) -> u8 {
        self.num_channels
    }

    pub fn bytes_per_texel(&self) -> usize {
        self.data_type.num_bytes() * self.num_channels as usize
    }

    /// Same data type with a different channel count.
    pub fn with_channels(&self, num_channels: u8) -> Result<Self> {
        Self::new(self.data_type, num_channels)
    }
}

impl std::fmt::Display for TexelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.data_type, self.num_channels)
    }
}

/// Whether a log2 side length is representable.
pub fn rlog2_valid(rlog2: u8) -> bool {
    rlog2 <= RLOG2_LIMIT
}

/// Linear side length for a log2 side length.
pub fn res_from_rlog2(rlog2: u8) -> u32 {
    debug_assert!(rlog2_valid(rlog2));
    1u32 << rlog2
}

/// Grid resolution stored as log2 per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogResolution {
    pub u: u8,
    pub v: u8,
}

impl LogResolution {
    pub fn new(u: u8, v: u8) -> Result<Self> {
        if !rlog2_valid(u) || !rlog2_valid(v) {
            return Err(PtexError::Format(format!(
                "log resolution ({u}, {v}) exceeds {RLOG2_LIMIT}"
            )));
        }
        Ok(Self { u, v })
    }

    /// Exact inverse of [`LogResolution::linear`].
    ///
    /// Fails for zero, non-power-of-two, or oversized sides.
    pub fn from_linear(u: u32, v: u32) -> Result<Self> {
        let rlog2 = |n: u32| -> Result<u8> {
            if n == 0 || !n.is_power_of_two() {
                return Err(PtexError::Format(format!(
                    "resolution {u}x{v} is not a power of two"
                )));
            }
            Ok(n.trailing_zeros() as u8)
        };
        Self::new(rlog2(u)?, rlog2(v)?)
    }

    /// Linear `(width, height)`.
    pub fn linear(&self) -> (u32, u32) {
        (res_from_rlog2(self.u), res_from_rlog2(self.v))
    }

    /// Number of texels.
    pub fn area(&self) -> u64 {
        let (u, v) = self.linear();
        u as u64 * v as u64
    }

    /// One quadrant of a quad face: both sides halved, never below one texel.
    pub fn halved(&self) -> Self {
        Self {
            u: self.u.saturating_sub(1),
            v: self.v.saturating_sub(1),
        }
    }

    pub fn transposed(&self) -> Self {
        Self {
            u: self.v,
            v: self.u,
        }
    }
}

impl std::fmt::Display for LogResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (u, v) = self.linear();
        write!(f, "{u}x{v}")
    }
}

/// Byte size of a grid with the given format and resolution.
pub fn rect_bytes(format: TexelFormat, logres: LogResolution) -> Result<usize> {
    logres
        .area()
        .checked_mul(format.bytes_per_texel() as u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            PtexError::Format(format!(
                "{logres} texels of {format} do not fit in memory"
            ))
        })
}
