//! Per-stream playlist state and the advance protocol.
//!
//! A stream concatenates its playlist entries in the PCM domain and encodes
//! the result as one continuous Opus/WebM output. Decoders are spawned
//! lazily: appending touches nothing, the first advance that consumes an
//! entry starts its subprocess and emits its metadata record.

pub mod registry;

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, warn};

use crate::audio::{AudioFormat, Decoder, Encoder, Metadata, probe_metadata};
use crate::common::Result;
use crate::config::ToolsConfig;

struct PlaylistEntry {
    filename: String,
    offset: f64,
    decoder: Option<Decoder>,
}

/// One record of the JSON metadata array in an advance response.
#[derive(Debug, Serialize)]
struct MetadataRecord {
    /// Position of the file's first sample in the stream, in seconds.
    start: f64,
    filename: String,
    meta: Metadata,
}

pub struct Stream {
    playlist: VecDeque<PlaylistEntry>,
    encoder: Encoder,
    format: AudioFormat,
    /// Per-channel samples emitted since stream creation.
    samples_emitted: u64,
    bitrate: u32,
    tools: ToolsConfig,
}

impl Stream {
    pub fn new(bitrate: u32, tools: ToolsConfig) -> Result<Self> {
        let format = AudioFormat::default();
        let encoder = Encoder::new(format.sample_rate, format.channels)?;
        Ok(Self {
            playlist: VecDeque::new(),
            encoder,
            format,
            samples_emitted: 0,
            bitrate,
            tools,
        })
    }

    /// Queue a source file. No filesystem access, no subprocess.
    pub fn append(&mut self, filename: impl Into<String>, offset: f64) {
        self.playlist.push_back(PlaylistEntry {
            filename: filename.into(),
            offset,
            decoder: None,
        });
    }

    /// Produce roughly `seconds` of encoded audio plus any new metadata
    /// records, framed as `"meta" <u32 le> <json> "data" <u32 le> <webm>`.
    pub fn advance(&mut self, seconds: f64, sink: &mut Vec<u8>) -> Result<()> {
        let rate = self.format.sample_rate as f64;
        let frame_size = self.format.frame_size();
        let target_samples = (seconds * rate) as usize;
        let mut target_bytes = target_samples * frame_size;

        let mut metadata: Vec<MetadataRecord> = Vec::new();
        let mut data = Vec::new();
        let mut pcm = Vec::new();

        // A finalized encoder accepts nothing more; do not bother spawning
        // decoders for entries appended after the fact.
        while target_bytes > 0 && !self.playlist.is_empty() && !self.encoder.is_finalized() {
            let Some(entry) = self.playlist.front_mut() else {
                break;
            };

            if entry.decoder.is_none() {
                debug!("starting decoder for {}", entry.filename);
                let decoder =
                    Decoder::open(&entry.filename, entry.offset, &self.format, &self.tools)?;
                metadata.push(MetadataRecord {
                    start: self.samples_emitted as f64 / rate,
                    filename: entry.filename.clone(),
                    meta: probe_metadata(&entry.filename, &self.tools),
                });
                entry.decoder = Some(decoder);
            }
            let Some(decoder) = entry.decoder.as_mut() else {
                break;
            };

            pcm.clear();
            let requested = target_bytes;
            let n = decoder.read(requested, &mut pcm);
            if n > 0 {
                // Whole sample frames only; a truncated tail cannot be
                // attributed to channels.
                let usable = n - n % frame_size;
                let floats: Vec<f32> = pcm[..usable]
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                self.encoder.feed(&floats, self.bitrate, &mut data);
                self.samples_emitted += (usable / frame_size) as u64;
                target_bytes -= n;
            }

            if n < requested {
                // Decoder drained: retire the entry and its subprocess.
                if let Some(done) = self.playlist.pop_front() {
                    if let Some(mut decoder) = done.decoder {
                        let code = decoder.wait();
                        if code != 0 {
                            warn!(
                                "decoder for {} exited with {}: {}",
                                done.filename,
                                code,
                                decoder.messages().trim()
                            );
                        }
                    }
                }
            }
        }

        if self.playlist.is_empty() {
            self.encoder.finalize(self.bitrate, &mut data);
        }

        let meta_json = serde_json::to_vec(&metadata)?;
        sink.extend_from_slice(b"meta");
        sink.extend_from_slice(&(meta_json.len() as u32).to_le_bytes());
        sink.extend_from_slice(&meta_json);
        sink.extend_from_slice(b"data");
        sink.extend_from_slice(&(data.len() as u32).to_le_bytes());
        sink.extend_from_slice(&data);
        Ok(())
    }

    /// Entries still queued (including a partially consumed head).
    #[allow(dead_code)]
    pub fn pending_entries(&self) -> usize {
        self.playlist.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.encoder.is_finalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stream() -> Stream {
        Stream::new(196_000, ToolsConfig::default()).unwrap()
    }

    /// Split one framed response into its JSON metadata and WebM payload.
    fn split_response(bytes: &[u8]) -> (serde_json::Value, Vec<u8>) {
        assert_eq!(&bytes[..4], b"meta");
        let meta_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let meta: serde_json::Value = serde_json::from_slice(&bytes[8..8 + meta_len]).unwrap();

        let rest = &bytes[8 + meta_len..];
        assert_eq!(&rest[..4], b"data");
        let data_len = u32::from_le_bytes(rest[4..8].try_into().unwrap()) as usize;
        let data = rest[8..8 + data_len].to_vec();
        assert_eq!(rest.len(), 8 + data_len, "trailing bytes after data block");
        (meta, data)
    }

    #[test]
    fn advance_on_empty_playlist_finalizes_header_only() {
        let mut stream = test_stream();
        let mut sink = Vec::new();
        stream.advance(5.0, &mut sink).unwrap();

        let (meta, data) = split_response(&sink);
        assert_eq!(meta, serde_json::json!([]));
        // Finalized zero-length stream: container header, no clusters.
        assert_eq!(&data[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert!(!data.windows(4).any(|w| w == [0x1F, 0x43, 0xB6, 0x75]));
        assert!(stream.is_finalized());
    }

    #[test]
    fn finalized_stream_keeps_returning_empty_data_blocks() {
        let mut stream = test_stream();
        let mut sink = Vec::new();
        stream.advance(5.0, &mut sink).unwrap();

        let mut again = Vec::new();
        stream.advance(5.0, &mut again).unwrap();
        let (meta, data) = split_response(&again);
        assert_eq!(meta, serde_json::json!([]));
        assert!(data.is_empty());
    }

    #[test]
    fn append_spawns_nothing() {
        let mut stream = test_stream();
        stream.append("does-not-exist.flac", 0.0);
        stream.append("also-missing.mp3", 3.5);
        assert_eq!(stream.pending_entries(), 2);
        assert!(!stream.is_finalized());
    }

    #[test]
    fn advance_on_missing_file_surfaces_subprocess_failure() {
        let mut stream = Stream::new(
            196_000,
            ToolsConfig {
                ffmpeg: "definitely-not-a-real-binary".to_string(),
                ..ToolsConfig::default()
            },
        )
        .unwrap();
        stream.append("a.flac", 0.0);
        assert!(stream.advance(5.0, &mut Vec::new()).is_err());
    }

    #[test]
    fn playlist_plays_through_with_one_metadata_record() {
        use crate::audio::{ffmpeg_available, silence_wav};

        if !ffmpeg_available() {
            return;
        }
        let path = std::env::temp_dir().join("opuscast_stream_test.wav");
        std::fs::write(&path, silence_wav(1.0)).unwrap();

        let mut stream = test_stream();
        stream.append(path.to_str().unwrap(), 0.0);

        let mut records = 0;
        for round in 0.. {
            assert!(round < 10, "stream did not finalize");
            let mut sink = Vec::new();
            stream.advance(0.5, &mut sink).unwrap();
            let (meta, _) = split_response(&sink);
            let meta = meta.as_array().unwrap();
            records += meta.len();
            if records == 1 && meta.len() == 1 {
                // The record appears on the advance that spawned the decoder.
                assert_eq!(meta[0]["start"], serde_json::json!(0.0));
                assert_eq!(meta[0]["filename"], path.to_str().unwrap());
            }
            if stream.is_finalized() {
                break;
            }
        }
        assert_eq!(records, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn dropping_a_stream_tears_down_live_decoders() {
        use crate::audio::{ffmpeg_available, silence_wav};

        if !ffmpeg_available() {
            return;
        }
        let path = std::env::temp_dir().join("opuscast_teardown_test.wav");
        std::fs::write(&path, silence_wav(2.0)).unwrap();

        let mut stream = test_stream();
        stream.append(path.to_str().unwrap(), 0.0);
        let mut sink = Vec::new();
        stream.advance(0.1, &mut sink).unwrap();
        assert_eq!(stream.pending_entries(), 1);

        // Must return promptly with the subprocess reaped, not hang.
        drop(stream);

        let _ = std::fs::remove_file(&path);
    }
}
