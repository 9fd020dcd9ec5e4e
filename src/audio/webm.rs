//! Live-mode Matroska/WebM muxer.
//!
//! Writes a single-audio-track WebM stream the way live muxers do: the
//! Segment and every Cluster use the unknown-size marker, so the stream can
//! be emitted incrementally and needs no seek head or cues. A cluster is
//! closed implicitly when the next cluster (or nothing) follows.

const EBML_ID: u32 = 0x1A45_DFA3;
const EBML_VERSION_ID: u32 = 0x4286;
const EBML_READ_VERSION_ID: u32 = 0x42F7;
const EBML_MAX_ID_LENGTH_ID: u32 = 0x42F2;
const EBML_MAX_SIZE_LENGTH_ID: u32 = 0x42F3;
const DOC_TYPE_ID: u32 = 0x4282;
const DOC_TYPE_VERSION_ID: u32 = 0x4287;
const DOC_TYPE_READ_VERSION_ID: u32 = 0x4285;

const SEGMENT_ID: u32 = 0x1853_8067;
const INFO_ID: u32 = 0x1549_A966;
const TIMESTAMP_SCALE_ID: u32 = 0x2A_D7B1;
const MUXING_APP_ID: u32 = 0x4D80;
const WRITING_APP_ID: u32 = 0x5741;

const TRACKS_ID: u32 = 0x1654_AE6B;
const TRACK_ENTRY_ID: u32 = 0xAE;
const TRACK_NUMBER_ID: u32 = 0xD7;
const TRACK_UID_ID: u32 = 0x73C5;
const TRACK_TYPE_ID: u32 = 0x83;
const FLAG_LACING_ID: u32 = 0x9C;
const CODEC_ID_ID: u32 = 0x86;
const CODEC_PRIVATE_ID: u32 = 0x63A2;
const AUDIO_ID: u32 = 0xE1;
const SAMPLING_FREQUENCY_ID: u32 = 0xB5;
const CHANNELS_ID: u32 = 0x9F;
const BIT_DEPTH_ID: u32 = 0x6264;

const CLUSTER_ID: u32 = 0x1F43_B675;
const CLUSTER_TIMESTAMP_ID: u32 = 0xE7;
const SIMPLE_BLOCK_ID: u32 = 0xA3;

const TRACK_TYPE_AUDIO: u64 = 2;
const TRACK_NUMBER: u64 = 1;

/// One tick = 1 ms, the Matroska default.
const TIMESTAMP_SCALE_NS: u64 = 1_000_000;

/// Rotate clusters well before the SimpleBlock's relative i16 tick field
/// could overflow.
const CLUSTER_MAX_TICKS: u64 = 30_000;

const APP_NAME: &str = concat!("opuscast/", env!("CARGO_PKG_VERSION"));

pub struct WebmWriter {
    rate: f64,
    channels: u16,
    codec_private: Vec<u8>,
    buf: Vec<u8>,
    cluster_ticks: Option<u64>,
    finalized: bool,
}

impl WebmWriter {
    pub fn new(rate: f64, channels: u16, codec_private: Vec<u8>) -> Self {
        Self {
            rate,
            channels,
            codec_private,
            buf: Vec::new(),
            cluster_ticks: None,
            finalized: false,
        }
    }

    /// Emit the EBML header, the open-ended Segment, Info and Tracks.
    pub fn write_header(&mut self) {
        let mut ebml = Vec::new();
        uint_element(&mut ebml, EBML_VERSION_ID, 1);
        uint_element(&mut ebml, EBML_READ_VERSION_ID, 1);
        uint_element(&mut ebml, EBML_MAX_ID_LENGTH_ID, 4);
        uint_element(&mut ebml, EBML_MAX_SIZE_LENGTH_ID, 8);
        string_element(&mut ebml, DOC_TYPE_ID, "webm");
        // DocTypeVersion 4: Opus tracks postdate the v2 baseline.
        uint_element(&mut ebml, DOC_TYPE_VERSION_ID, 4);
        uint_element(&mut ebml, DOC_TYPE_READ_VERSION_ID, 2);
        master_element(&mut self.buf, EBML_ID, &ebml);

        write_id(&mut self.buf, SEGMENT_ID);
        write_unknown_size(&mut self.buf);

        let mut info = Vec::new();
        uint_element(&mut info, TIMESTAMP_SCALE_ID, TIMESTAMP_SCALE_NS);
        string_element(&mut info, MUXING_APP_ID, APP_NAME);
        string_element(&mut info, WRITING_APP_ID, APP_NAME);
        master_element(&mut self.buf, INFO_ID, &info);

        let mut audio = Vec::new();
        float_element(&mut audio, SAMPLING_FREQUENCY_ID, self.rate);
        uint_element(&mut audio, CHANNELS_ID, self.channels as u64);
        uint_element(&mut audio, BIT_DEPTH_ID, 16);

        let mut entry = Vec::new();
        uint_element(&mut entry, TRACK_NUMBER_ID, TRACK_NUMBER);
        uint_element(&mut entry, TRACK_UID_ID, 1);
        uint_element(&mut entry, TRACK_TYPE_ID, TRACK_TYPE_AUDIO);
        uint_element(&mut entry, FLAG_LACING_ID, 0);
        string_element(&mut entry, CODEC_ID_ID, "A_OPUS");
        binary_element(&mut entry, CODEC_PRIVATE_ID, &self.codec_private);
        master_element(&mut entry, AUDIO_ID, &audio);

        let mut tracks = Vec::new();
        master_element(&mut tracks, TRACK_ENTRY_ID, &entry);
        master_element(&mut self.buf, TRACKS_ID, &tracks);
    }

    /// Append one encoded frame at `timestamp_ns`, flagged as keyframe when
    /// requested. Starts a new cluster as needed.
    pub fn add_frame(&mut self, data: &[u8], timestamp_ns: u64, keyframe: bool) {
        if self.finalized {
            return;
        }
        let ticks = timestamp_ns / TIMESTAMP_SCALE_NS;

        let rotate = match self.cluster_ticks {
            None => true,
            Some(base) => ticks.saturating_sub(base) > CLUSTER_MAX_TICKS,
        };
        if rotate {
            write_id(&mut self.buf, CLUSTER_ID);
            write_unknown_size(&mut self.buf);
            uint_element(&mut self.buf, CLUSTER_TIMESTAMP_ID, ticks);
            self.cluster_ticks = Some(ticks);
        }

        let base = self.cluster_ticks.unwrap_or(0);
        let relative = (ticks - base) as i16;

        let mut block = Vec::with_capacity(data.len() + 4);
        block.push(0x80 | TRACK_NUMBER as u8);
        block.extend_from_slice(&relative.to_be_bytes());
        block.push(if keyframe { 0x80 } else { 0x00 });
        block.extend_from_slice(data);
        binary_element(&mut self.buf, SIMPLE_BLOCK_ID, &block);
    }

    /// Live mode needs no trailing seek information; finalizing just stops
    /// the writer from accepting further frames.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Drain the bytes produced since the last call.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// Element IDs are written verbatim: their leading bits already encode the
/// length.
fn write_id(buf: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    buf.extend_from_slice(&bytes[skip..]);
}

/// Minimal-length EBML size encoding (1-8 bytes).
fn write_size(buf: &mut Vec<u8>, size: u64) {
    for len in 1..=8u32 {
        // The all-ones pattern of each length is reserved for "unknown".
        let max = (1u64 << (7 * len)) - 2;
        if size <= max {
            let marker = 1u64 << (7 * len);
            let value = marker | size;
            let bytes = value.to_be_bytes();
            buf.extend_from_slice(&bytes[8 - len as usize..]);
            return;
        }
    }
    // Unreachable for sizes representable in 56 bits.
    buf.extend_from_slice(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);
}

/// 8-byte unknown-size marker, as live muxers emit for Segment and Cluster.
fn write_unknown_size(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
}

fn master_element(buf: &mut Vec<u8>, id: u32, payload: &[u8]) {
    write_id(buf, id);
    write_size(buf, payload.len() as u64);
    buf.extend_from_slice(payload);
}

fn binary_element(buf: &mut Vec<u8>, id: u32, payload: &[u8]) {
    master_element(buf, id, payload);
}

fn string_element(buf: &mut Vec<u8>, id: u32, value: &str) {
    master_element(buf, id, value.as_bytes());
}

fn uint_element(buf: &mut Vec<u8>, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    master_element(buf, id, &bytes[skip..]);
}

fn float_element(buf: &mut Vec<u8>, id: u32, value: f64) {
    master_element(buf, id, &value.to_be_bytes());
}
