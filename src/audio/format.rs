//! Raw PCM output format description.

use crate::common::{Error, Result};

/// Shape of the interleaved PCM the decoder subprocess is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u8,
    pub use_float: bool,
    pub little_endian: bool,
}

impl Default for AudioFormat {
    /// 48 kHz stereo 32-bit little-endian float.
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48_000,
            bit_depth: 32,
            use_float: true,
            little_endian: true,
        }
    }
}

impl AudioFormat {
    /// The ffmpeg raw-format code for this PCM shape, e.g. `f32le` or `s24be`.
    ///
    /// 8-bit audio is always unsigned and carries no endianness suffix. Any
    /// (bit_depth, use_float) pair outside the table is rejected.
    pub fn sample_code(&self) -> Result<String> {
        let base = if self.use_float {
            match self.bit_depth {
                32 => "f32",
                64 => "f64",
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "only 32 and 64 bit are valid floating point bit depths (got {})",
                        self.bit_depth
                    )));
                }
            }
        } else {
            match self.bit_depth {
                8 => return Ok("u8".to_string()),
                16 => "s16",
                24 => "s24",
                32 => "s32",
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "only 8, 16, 24 and 32 bit are valid integer bit depths (got {})",
                        self.bit_depth
                    )));
                }
            }
        };
        let suffix = if self.little_endian { "le" } else { "be" };
        Ok(format!("{}{}", base, suffix))
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bit_depth as usize / 8
    }

    /// Size in bytes of one interleaved sample frame (all channels).
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }
}
