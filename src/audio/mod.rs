pub mod decoder;
pub mod encoder;
pub mod format;
pub mod probe;
pub mod webm;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use format::AudioFormat;
pub use probe::{Metadata, probe_metadata};

/// Build a playable WAV file in memory: `seconds` of 48 kHz stereo s16
/// silence. Shared by the subprocess-backed tests.
#[cfg(test)]
pub(crate) fn silence_wav(seconds: f64) -> Vec<u8> {
    let rate: u32 = 48_000;
    let channels: u16 = 2;
    let bits: u16 = 16;
    let block_align = channels * bits / 8;
    let data_len = (seconds * rate as f64) as u32 * block_align as u32;

    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&rate.to_le_bytes());
    wav.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
}

/// Subprocess-backed tests only run where the external decoder exists.
#[cfg(test)]
pub(crate) fn ffmpeg_available() -> bool {
    crate::process::Process::exec_collect("ffmpeg", &["-version"], &[])
        .map(|(code, _, _)| code == 0)
        .unwrap_or(false)
}
