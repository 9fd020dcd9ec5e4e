//! Tag and duration probing via ffprobe.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::ToolsConfig;
use crate::process::Process;

/// Tags of one source file. Unknown string tags stay empty; unknown numeric
/// tags stay at -1 / -1.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub title: String,
    pub album: String,
    pub artist: String,
    pub date: String,
    pub format: String,
    pub track_number: i64,
    pub track_total: i64,
    pub disc_number: i64,
    pub disc_total: i64,
    pub duration: f64,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            album: String::new(),
            artist: String::new(),
            date: String::new(),
            format: String::new(),
            track_number: -1,
            track_total: -1,
            disc_number: -1,
            disc_total: -1,
            duration: -1.0,
        }
    }
}

/// Probe `filename` with ffprobe. Never fails: any probe problem yields the
/// all-defaults value so a broken file still plays through the pipeline.
pub fn probe_metadata(filename: &str, tools: &ToolsConfig) -> Metadata {
    let args = ["-show_format", "-print_format", "json", filename];
    match Process::exec_collect(&tools.ffprobe, &args, &[]) {
        Ok((0, out, _)) => parse_probe_output(&out).unwrap_or_default(),
        Ok((code, _, err)) => {
            warn!(
                "ffprobe exited with {} for {}: {}",
                code,
                filename,
                String::from_utf8_lossy(&err).trim()
            );
            Metadata::default()
        }
        Err(e) => {
            warn!("failed to run ffprobe for {}: {}", filename, e);
            Metadata::default()
        }
    }
}

fn parse_probe_output(bytes: &[u8]) -> Option<Metadata> {
    let root: Value = serde_json::from_slice(bytes).ok()?;
    let format = root.get("format")?;

    let mut meta = Metadata::default();
    if let Some(name) = format.get("format_name").and_then(Value::as_str) {
        meta.format = name.to_string();
    }
    meta.duration = number_of(format.get("duration")).unwrap_or(-1.0);

    if let Some(tags) = format.get("tags").and_then(Value::as_object) {
        for (key, value) in tags {
            match key.to_ascii_lowercase().as_str() {
                "title" => meta.title = string_of(value),
                "album" => meta.album = string_of(value),
                "artist" => meta.artist = string_of(value),
                "date" => meta.date = string_of(value),
                "track" => meta.track_number = leading_int(value).unwrap_or(-1),
                "track_total" => meta.track_total = leading_int(value).unwrap_or(-1),
                "disc" => meta.disc_number = leading_int(value).unwrap_or(-1),
                "disc_total" => meta.disc_total = leading_int(value).unwrap_or(-1),
                _ => {}
            }
        }
    }

    Some(meta)
}

fn string_of(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

fn number_of(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    value.as_str()?.trim().parse().ok()
}

/// Parse the leading integer of tags like `"3"` or `"3/12"`.
fn leading_int(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let s = value.as_str()?.trim();
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_format_block() {
        let json = br#"{
            "format": {
                "filename": "a.flac",
                "format_name": "flac",
                "duration": "10.250000",
                "tags": {
                    "TITLE": "Song",
                    "Artist": "Band",
                    "album": "Record",
                    "date": "2016",
                    "track": "3/12",
                    "track_total": "12",
                    "disc": 1
                }
            }
        }"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.artist, "Band");
        assert_eq!(meta.album, "Record");
        assert_eq!(meta.date, "2016");
        assert_eq!(meta.format, "flac");
        assert_eq!(meta.track_number, 3);
        assert_eq!(meta.track_total, 12);
        assert_eq!(meta.disc_number, 1);
        assert_eq!(meta.disc_total, -1);
        assert_eq!(meta.duration, 10.25);
    }

    #[test]
    fn missing_tags_fall_back_to_defaults() {
        let meta = parse_probe_output(br#"{"format": {"format_name": "mp3"}}"#).unwrap();
        assert_eq!(meta.format, "mp3");
        assert_eq!(meta.title, "");
        assert_eq!(meta.track_number, -1);
        assert_eq!(meta.duration, -1.0);
    }

    #[test]
    fn garbage_output_is_none() {
        assert!(parse_probe_output(b"not json").is_none());
        assert!(parse_probe_output(b"{}").is_none());
    }

    #[test]
    fn metadata_serializes_all_fields() {
        let json = serde_json::to_value(Metadata::default()).unwrap();
        for field in [
            "title",
            "album",
            "artist",
            "date",
            "format",
            "track_number",
            "track_total",
            "disc_number",
            "disc_total",
            "duration",
        ] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
    }
}
