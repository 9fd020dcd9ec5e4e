//! Stateful Opus encoder framed in a live WebM container.
//!
//! PCM arrives in arbitrarily sized interleaved float chunks; the encoder
//! cuts it into fixed frames, encodes each with the requested bitrate and
//! appends the packets to the container. Packet timing is driven by the
//! granule counter: the running per-channel sample index of completed
//! frames.

use audiopus::{Application, Bitrate, Channels, SampleRate, coder::Encoder as OpusEncoder};
use tracing::warn;

use crate::audio::webm::WebmWriter;
use crate::common::{Error, Result};

const ENCODE_BUF_SIZE: usize = 1 << 16;

/// Bytes of the 19-byte `OpusHead` codec-private blob: magic, version 1,
/// channel count, pre-skip 0, input rate, output gain 0, mapping family 0.
/// Multi-byte fields are little-endian, the struct is byte-packed.
fn opus_head(channels: u16, rate: u32) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    head.push(channels as u8);
    head.extend_from_slice(&0u16.to_le_bytes());
    head.extend_from_slice(&rate.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0);
    head
}

pub struct Encoder {
    rate: u32,
    channels: u16,
    /// Samples per channel in one encoded frame.
    frame_samples: usize,
    /// Interleaved float accumulator, capacity of exactly one frame.
    acc: Vec<f32>,
    encode_buf: Vec<u8>,
    granule: u64,
    opus: OpusEncoder,
    webm: WebmWriter,
    header_written: bool,
    finalized: bool,
}

impl Encoder {
    pub fn new(rate: u32, channels: u16) -> Result<Self> {
        let sample_rate = match rate {
            8_000 => SampleRate::Hz8000,
            12_000 => SampleRate::Hz12000,
            16_000 => SampleRate::Hz16000,
            24_000 => SampleRate::Hz24000,
            48_000 => SampleRate::Hz48000,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "{} Hz is not an opus sample rate",
                    rate
                )));
            }
        };
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "{} channels are not supported by the encoder",
                    channels
                )));
            }
        };
        let opus = OpusEncoder::new(sample_rate, opus_channels, Application::Audio)?;
        let webm = WebmWriter::new(rate as f64, channels, opus_head(channels, rate));
        let frame_samples = (rate / 25) as usize;

        Ok(Self {
            rate,
            channels,
            frame_samples,
            acc: Vec::with_capacity(frame_samples * channels as usize),
            encode_buf: vec![0u8; ENCODE_BUF_SIZE],
            granule: 0,
            opus,
            webm,
            header_written: false,
            finalized: false,
        })
    }

    /// Per-channel sample index of all completed frames.
    pub fn granule(&self) -> u64 {
        self.granule
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Feed interleaved float PCM. Every filled frame is encoded at
    /// `bitrate` and the resulting container bytes are appended to `sink`.
    pub fn feed(&mut self, pcm: &[f32], bitrate: u32, sink: &mut Vec<u8>) {
        self.encode_chunk(pcm, bitrate, sink, false);
    }

    /// Zero-pad and encode a pending partial frame, close the container and
    /// refuse further input. Calling this on a finalized encoder is a no-op.
    pub fn finalize(&mut self, bitrate: u32, sink: &mut Vec<u8>) {
        self.encode_chunk(&[], bitrate, sink, true);
    }

    fn encode_chunk(&mut self, mut pcm: &[f32], bitrate: u32, sink: &mut Vec<u8>, flush: bool) {
        if self.finalized {
            return;
        }
        if !self.header_written {
            self.webm.write_header();
            self.header_written = true;
        }

        let frame_floats = self.frame_samples * self.channels as usize;
        loop {
            let take = (frame_floats - self.acc.len()).min(pcm.len());
            self.acc.extend_from_slice(&pcm[..take]);
            pcm = &pcm[take..];

            if self.acc.len() == frame_floats {
                self.encode_frame(bitrate);
                continue;
            }
            break;
        }

        if flush {
            if !self.acc.is_empty() {
                self.acc.resize(frame_floats, 0.0);
                self.encode_frame(bitrate);
            }
            self.webm.finalize();
            self.finalized = true;
        }

        let produced = self.webm.take_bytes();
        sink.extend_from_slice(&produced);
    }

    fn encode_frame(&mut self, bitrate: u32) {
        let timestamp_ns = (self.granule as u128 * 1_000_000_000 / self.rate as u128) as u64;

        if let Err(e) = self.opus.set_bitrate(Bitrate::BitsPerSecond(bitrate as i32)) {
            warn!("failed to set opus bitrate to {}: {}", bitrate, e);
        }
        match self.opus.encode_float(&self.acc, &mut self.encode_buf) {
            Ok(size) if size > 0 => {
                self.webm.add_frame(&self.encode_buf[..size], timestamp_ns, true);
            }
            Ok(_) => {}
            // A failed frame is dropped, but time still advances.
            Err(e) => warn!("opus encode failed, dropping frame: {}", e),
        }

        self.granule += self.frame_samples as u64;
        self.acc.clear();
    }
}
