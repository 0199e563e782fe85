//! Local control listener.
//!
//! A stream-oriented unix socket: each connection delivers one
//! newline-terminated command and is then closed. Commands are handed to a
//! callback as plain strings; parsing and dispatch happen in the supervisor.

use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Upper bound on one command line.
const MAX_COMMAND_BYTES: usize = 64 * 1024;

/// How long one accept wait may block before re-checking the running flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Listener on a local unix socket path.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Bind the listener, unlinking any stale socket file at `path` first.
    pub fn bind(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, path })
    }

    /// Path the listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept and serve connections until `running` goes false.
    pub fn run(&self, running: &AtomicBool, handler: impl Fn(&str)) {
        tracing::debug!(path = %self.path.display(), "control listener running");
        while running.load(Ordering::Relaxed) {
            if !self.wait_acceptable(ACCEPT_POLL) {
                continue;
            }
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Some(command) = read_command(stream) {
                        handler(&command);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => tracing::warn!(error = %e, "control accept failed"),
            }
        }
    }

    /// Block until a connection is pending or the timeout elapses.
    fn wait_acceptable(&self, timeout: Duration) -> bool {
        let mut fds = libc::pollfd {
            fd: self.listener.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        unsafe { libc::poll(&mut fds, 1, timeout.as_millis() as i32) > 0 }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Read bytes until the newline terminator, strip it and return the command.
fn read_command(mut stream: UnixStream) -> Option<String> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(1)));

    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                data.extend_from_slice(&chunk[..n]);
                if data.contains(&b'\n') || data.len() > MAX_COMMAND_BYTES {
                    break;
                }
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                break
            }
            Err(e) => {
                tracing::warn!(error = %e, "control read failed");
                return None;
            }
        }
    }

    if data.is_empty() {
        return None;
    }
    let line = match data.iter().position(|&b| b == b'\n') {
        Some(newline) => &data[..newline],
        None => &data[..],
    };
    match std::str::from_utf8(line) {
        Ok(command) => Some(command.to_string()),
        Err(_) => {
            tracing::warn!("control command is not valid UTF-8");
            None
        }
    }
}
