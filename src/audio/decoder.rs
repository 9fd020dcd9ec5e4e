//! Subprocess-backed PCM decoder.
//!
//! Each decoder owns one ffmpeg child converting a source into raw
//! interleaved PCM on its stdout. A producer thread drains that pipe into a
//! byte queue; the consumer pulls from the queue with [`Decoder::read`].
//! A short read therefore only ever means the child is done.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::audio::format::AudioFormat;
use crate::common::{Error, Result};
use crate::config::ToolsConfig;
use crate::process::Process;

/// Upper bound on one condvar wait while the producer is still running.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Soft cap on queued decoded bytes before the stdin pump pauses; keeps fast
/// piped inputs from ballooning memory while the consumer lags.
const PIPE_SOFT_CAP: usize = 2 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<u8>,
    /// Producer saw the child close its stdout.
    eos: bool,
    /// Teardown requested; stops the stdin pump.
    shutdown: bool,
}

#[derive(Default)]
struct SharedQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

pub struct Decoder {
    process: Process,
    shared: Arc<SharedQueue>,
    messages: Arc<Mutex<Vec<u8>>>,
    producer: Option<JoinHandle<()>>,
    stderr_pump: Option<JoinHandle<()>>,
    stdin_pump: Option<JoinHandle<()>>,
    /// Input arrives on the child's stdin instead of from a file path.
    piped: bool,
}

impl Decoder {
    /// Decode `filename`, optionally seeked to `offset` seconds.
    pub fn open(
        filename: &str,
        offset: f64,
        format: &AudioFormat,
        tools: &ToolsConfig,
    ) -> Result<Self> {
        let args = transcode_args(Some(filename), offset, format)?;
        Self::spawn(&tools.ffmpeg, args, None)
    }

    /// Decode compressed data arriving from `input` via the child's stdin.
    #[allow(dead_code)]
    pub fn open_piped(
        input: Box<dyn Read + Send>,
        format: &AudioFormat,
        tools: &ToolsConfig,
    ) -> Result<Self> {
        let args = transcode_args(None, 0.0, format)?;
        Self::spawn(&tools.ffmpeg, args, Some(input))
    }

    fn spawn(cmd: &str, args: Vec<String>, input: Option<Box<dyn Read + Send>>) -> Result<Self> {
        let mut process = Process::spawn(cmd, &args)
            .map_err(|e| Error::Subprocess(format!("failed to spawn {}: {}", cmd, e)))?;

        let shared = Arc::new(SharedQueue::default());
        let messages = Arc::new(Mutex::new(Vec::new()));
        let piped = input.is_some();

        let producer = process.take_stdout().map(|mut stdout| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut state = shared.state.lock();
                            state.queue.extend(&buf[..n]);
                            shared.cond.notify_all();
                        }
                    }
                }
                shared.state.lock().eos = true;
                shared.cond.notify_all();
            })
        });

        let stderr_pump = process.take_stderr().map(|mut stderr| {
            let messages = Arc::clone(&messages);
            thread::spawn(move || {
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    match stderr.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => messages.lock().extend_from_slice(&buf[..n]),
                    }
                }
            })
        });

        let stdin = process.take_stdin();
        let stdin_pump = match input {
            Some(mut reader) => stdin.map(|mut stdin| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let mut buf = [0u8; READ_CHUNK];
                    loop {
                        {
                            let mut state = shared.state.lock();
                            while state.queue.len() > PIPE_SOFT_CAP
                                && !state.eos
                                && !state.shutdown
                            {
                                shared.cond.wait_for(&mut state, POLL_INTERVAL);
                            }
                            if state.eos || state.shutdown {
                                break;
                            }
                        }
                        match reader.read(&mut buf) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if stdin.write_all(&buf[..n]).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    // Dropping the pipe signals end-of-input to the child.
                })
            }),
            // File input: the child reads nothing from stdin, close it.
            None => {
                drop(stdin);
                None
            }
        };

        Ok(Self {
            process,
            shared,
            messages,
            producer,
            stderr_pump,
            stdin_pump,
            piped,
        })
    }

    /// Captured stderr of the child, accumulated so far.
    pub fn messages(&self) -> String {
        String::from_utf8_lossy(&self.messages.lock()).into_owned()
    }

    /// Append up to `n_bytes` of decoded PCM to `out`.
    ///
    /// Blocks in bounded slices while the producer is still running, so a
    /// short return means end-of-stream; 0 means the stream is exhausted.
    /// There must be at most one concurrent reader.
    pub fn read(&mut self, n_bytes: usize, out: &mut Vec<u8>) -> usize {
        let mut total = 0;
        let mut state = self.shared.state.lock();
        loop {
            let take = (n_bytes - total).min(state.queue.len());
            if take > 0 {
                out.extend(state.queue.drain(..take));
                total += take;
                // Wake the stdin pump in case it is paused on the soft cap.
                self.shared.cond.notify_all();
            }
            if total == n_bytes || state.eos {
                break;
            }
            self.shared.cond.wait_for(&mut state, POLL_INTERVAL);
        }
        total
    }

    /// Drain the stream to end, tear the child down and return its encoded
    /// exit code.
    pub fn wait(&mut self) -> i32 {
        self.teardown();
        match self.process.wait() {
            Ok(code) => code,
            Err(e) => {
                debug!("waitpid failed for decoder child: {}", e);
                -1
            }
        }
    }

    fn teardown(&mut self) {
        if !self.piped {
            // ffmpeg exits cleanly on SIGINT, flushing what it has.
            self.process.signal(libc::SIGINT);
        }
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.cond.notify_all();
        }

        // Drain until the producer reports end-of-stream so the child is
        // never stuck on a full pipe.
        let mut sink = Vec::new();
        while self.read(READ_CHUNK, &mut sink) > 0 {
            sink.clear();
        }

        for handle in [
            self.producer.take(),
            self.stderr_pump.take(),
            self.stdin_pump.take(),
        ]
        .into_iter()
        .flatten()
        {
            let _ = handle.join();
        }
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn transcode_args(filename: Option<&str>, offset: f64, format: &AudioFormat) -> Result<Vec<String>> {
    let code = format.sample_code()?;
    let mut args = Vec::new();
    if offset > 0.0 {
        args.push("-ss".to_string());
        args.push(offset.to_string());
    }
    args.push("-i".to_string());
    args.push(filename.unwrap_or("-").to_string());
    args.push("-ac".to_string());
    args.push(format.channels.to_string());
    args.push("-ar".to_string());
    args.push(format.sample_rate.to_string());
    args.push("-f".to_string());
    args.push(code);
    args.push("-".to_string());
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ffmpeg_available, silence_wav};

    #[test]
    fn args_for_file_input() {
        let args = transcode_args(Some("a.flac"), 0.0, &AudioFormat::default()).unwrap();
        assert_eq!(
            args,
            ["-i", "a.flac", "-ac", "2", "-ar", "48000", "-f", "f32le", "-"]
        );
    }

    #[test]
    fn args_include_seek_offset_when_positive() {
        let args = transcode_args(Some("a.flac"), 12.5, &AudioFormat::default()).unwrap();
        assert_eq!(&args[..2], &["-ss", "12.5"]);
        assert_eq!(args[3], "a.flac");
    }

    #[test]
    fn args_for_piped_input() {
        let args = transcode_args(None, 0.0, &AudioFormat::default()).unwrap();
        assert_eq!(args[1], "-");
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn invalid_format_fails_before_spawning() {
        let format = AudioFormat {
            bit_depth: 24,
            use_float: true,
            ..AudioFormat::default()
        };
        assert!(transcode_args(Some("a.flac"), 0.0, &format).is_err());
    }

    #[test]
    fn decodes_file_input_to_expected_length() {
        if !ffmpeg_available() {
            return;
        }
        let path = std::env::temp_dir().join("opuscast_decoder_test.wav");
        std::fs::write(&path, silence_wav(1.0)).unwrap();

        let format = AudioFormat::default();
        let mut decoder = Decoder::open(
            path.to_str().unwrap(),
            0.0,
            &format,
            &ToolsConfig::default(),
        )
        .unwrap();

        let mut pcm = Vec::new();
        let mut total = 0;
        loop {
            let n = decoder.read(64 * 1024, &mut pcm);
            if n == 0 {
                break;
            }
            total += n;
            pcm.clear();
        }
        // 1 s of 48 kHz stereo f32: no resampling, so the length is exact.
        assert_eq!(total, 48_000 * 2 * 4);
        assert_eq!(decoder.wait(), 0);
        // Reads after end-of-stream keep returning 0.
        assert_eq!(decoder.read(4096, &mut pcm), 0);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn decodes_piped_input() {
        if !ffmpeg_available() {
            return;
        }
        let wav = silence_wav(0.25);
        let mut decoder = Decoder::open_piped(
            Box::new(std::io::Cursor::new(wav)),
            &AudioFormat::default(),
            &ToolsConfig::default(),
        )
        .unwrap();

        let mut pcm = Vec::new();
        let mut total = 0;
        loop {
            let n = decoder.read(64 * 1024, &mut pcm);
            if n == 0 {
                break;
            }
            total += n;
            pcm.clear();
        }
        assert_eq!(total, 12_000 * 2 * 4);
        assert_eq!(decoder.wait(), 0);
    }
}
