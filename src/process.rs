//! Child process handle with piped standard I/O.
//!
//! Wraps `std::process::Child` with the byte-stream and signal operations the
//! audio pipeline needs: the decoder hands the stdout pipe to a dedicated
//! producer thread, short-lived tools run through [`Process::exec_collect`].

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;

pub struct Process {
    child: Child,
    pid: i32,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit_code: Option<i32>,
}

/// Normal exits map to their code (0-255); signal terminations map to the
/// negated signal number.
fn encode_exit_status(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => -status.signal().unwrap_or(0),
    }
}

impl Process {
    /// Spawn `cmd` with stdin, stdout and stderr each connected to a pipe.
    pub fn spawn<S: AsRef<OsStr>>(cmd: &str, args: &[S]) -> io::Result<Self> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let pid = child.id() as i32;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        Ok(Self {
            child,
            pid,
            stdin,
            stdout,
            stderr,
            exit_code: None,
        })
    }

    #[allow(dead_code)]
    pub fn stdout_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stdout.as_mut() {
            Some(pipe) => pipe.read(buf),
            None => Ok(0),
        }
    }

    #[allow(dead_code)]
    pub fn stderr_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stderr.as_mut() {
            Some(pipe) => pipe.read(buf),
            None => Ok(0),
        }
    }

    #[allow(dead_code)]
    pub fn stdin_write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(pipe) => pipe.write_all(bytes),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "child stdin already closed",
            )),
        }
    }

    /// Close the write end of the child's stdin pipe.
    #[allow(dead_code)]
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Move the stdout pipe out of the handle, e.g. into a pump thread.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Deliver `sig` to the child. Returns whether the kill was delivered.
    pub fn signal(&self, sig: i32) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        unsafe { libc::kill(self.pid, sig) == 0 }
    }

    /// Non-blocking liveness check.
    #[allow(dead_code)]
    pub fn running(&mut self) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(encode_exit_status(status));
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Block until the child exits and return its encoded exit code.
    pub fn wait(&mut self) -> io::Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self.child.wait()?;
        let code = encode_exit_status(status);
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Run `cmd` to completion, writing `input` to its stdin and collecting
    /// stdout and stderr through concurrent pump threads.
    pub fn exec_collect<S: AsRef<OsStr>>(
        cmd: &str,
        args: &[S],
        input: &[u8],
    ) -> io::Result<(i32, Vec<u8>, Vec<u8>)> {
        let mut process = Self::spawn(cmd, args)?;
        let stdin = process.take_stdin();
        let stdout = process.take_stdout();
        let stderr = process.take_stderr();

        let input = input.to_vec();
        let writer = thread::spawn(move || {
            if let Some(mut pipe) = stdin {
                let _ = pipe.write_all(&input);
                // Dropping the pipe closes the child's stdin.
            }
        });
        let out_pump = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stdout {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });
        let err_pump = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });

        let code = process.wait()?;
        let _ = writer.join();
        let out = out_pump.join().unwrap_or_default();
        let err = err_pump.join().unwrap_or_default();
        Ok((code, out, err))
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // Reap the child so it cannot linger as a zombie. Callers that need
        // the child gone promptly (the decoder) signal it before dropping.
        if self.exit_code.is_none() {
            self.stdin.take();
            let _ = self.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_collect_round_trips_stdin() {
        let (code, out, err) = Process::exec_collect("cat", &[] as &[&str], b"hello").unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, b"hello");
        assert!(err.is_empty());
    }

    #[test]
    fn exec_collect_reports_exit_code() {
        let (code, _, _) = Process::exec_collect("false", &[] as &[&str], &[]).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn spawn_missing_binary_fails() {
        assert!(Process::spawn("definitely-not-a-real-binary", &[] as &[&str]).is_err());
    }

    #[test]
    fn signal_termination_encodes_negative() {
        let mut process = Process::spawn("sleep", &["5"]).unwrap();
        assert!(process.running());
        assert!(process.signal(libc::SIGTERM));
        let code = process.wait().unwrap();
        assert_eq!(code, -libc::SIGTERM);
        assert!(!process.running());
        assert!(!process.signal(libc::SIGTERM));
    }

    #[test]
    fn stdin_write_feeds_the_child() {
        let mut process = Process::spawn("cat", &[] as &[&str]).unwrap();
        process.stdin_write(b"over and out").unwrap();
        process.close_stdin();

        let mut buf = [0u8; 64];
        let mut collected = Vec::new();
        loop {
            let n = process.stdout_read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"over and out");
        assert!(process.stdin_write(b"late").is_err());
        assert_eq!(process.wait().unwrap(), 0);
    }

    #[test]
    fn stderr_read_captures_diagnostics() {
        let mut process = Process::spawn("sh", &["-c", "echo oops >&2"]).unwrap();
        let mut buf = [0u8; 64];
        let mut collected = Vec::new();
        loop {
            let n = process.stderr_read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"oops\n");
        assert_eq!(process.wait().unwrap(), 0);
    }

    #[test]
    fn stdout_read_drains_child_output() {
        let mut process = Process::spawn("echo", &["ping"]).unwrap();
        let mut buf = [0u8; 64];
        let mut collected = Vec::new();
        loop {
            let n = process.stdout_read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"ping\n");
        assert_eq!(process.wait().unwrap(), 0);
    }
}
