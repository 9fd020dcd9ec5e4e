use serde::{Deserialize, Serialize};

use crate::common::AnyResult;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// Target Opus bitrate for newly created streams, in bits per second.
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    /// Seconds of audio produced per advance request.
    #[serde(default = "default_advance_seconds")]
    pub advance_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: Option<String>,
    /// When set, a per-run log file is created under `logs/`.
    pub file_prefix: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4851
}

fn default_bitrate() -> u32 {
    196_000
}

fn default_advance_seconds() -> f64 {
    5.0
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bitrate: default_bitrate(),
            advance_seconds: default_advance_seconds(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory. A missing file yields
    /// the built-in defaults; a present but malformed file is an error.
    pub fn load() -> AnyResult<Self> {
        match std::fs::read_to_string("config.toml") {
            Ok(s) => Ok(toml::from_str(&s)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_server_contract() {
        let config = Config::default();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 4851);
        assert_eq!(config.stream.bitrate, 196_000);
        assert_eq!(config.stream.advance_seconds, 5.0);
        assert_eq!(config.tools.ffmpeg, "ffmpeg");
        assert_eq!(config.tools.ffprobe, "ffprobe");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config = toml::from_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.stream.bitrate, 196_000);
    }
}
