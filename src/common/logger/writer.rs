use std::{
    fs::{self, File},
    io,
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;
use rand::{
    distributions::{Alphanumeric, DistString},
    rngs::OsRng,
};

const LOG_DIR: &str = "logs";

/// Append-only writer for a per-run log file named
/// `logs/<prefix>_<YYYY-MM-DD_HH_MM_SS>_<rand4>.log`.
#[derive(Clone)]
pub(crate) struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

fn log_file_path(prefix: &str) -> PathBuf {
    let format = time::macros::format_description!(
        "[year]-[month]-[day]_[hour]_[minute]_[second]"
    );
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let stamp = now.format(&format).unwrap_or_else(|_| "unknown".into());
    let suffix = Alphanumeric.sample_string(&mut OsRng, 4);
    PathBuf::from(LOG_DIR).join(format!("{}_{}_{}.log", prefix, stamp, suffix))
}

impl LogFileWriter {
    /// Create the log directory and a fresh timestamped file within it.
    pub fn create(prefix: &str) -> io::Result<(Self, PathBuf)> {
        fs::create_dir_all(LOG_DIR)?;
        let path = log_file_path(prefix);
        let file = File::create(&path)?;
        Ok((
            Self {
                file: Arc::new(Mutex::new(file)),
            },
            path,
        ))
    }
}

impl io::Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
