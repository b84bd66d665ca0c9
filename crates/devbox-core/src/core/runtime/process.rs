//! Spawning the container CLI with bounded output capture.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, Context, Result};

const CAPTURE_LIMIT_VAR: &str = "DEVBOX_MAX_CAPTURE_BYTES";
const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;
const TRUNCATION_MARKER: &str = "\n[...truncated...]\n";

/// Exit code and captured streams of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs `program` with `args` and no stdin. Each stream keeps only its last
/// `DEVBOX_MAX_CAPTURE_BYTES` bytes. A non-zero exit is not an error.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or its streams cannot
/// be read.
pub fn run_command(program: &Path, args: &[&str]) -> Result<RunOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {}", program.display()))?;

    let limit = capture_limit();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout not captured for {}", program.display()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr not captured for {}", program.display()))?;
    let stdout = thread::spawn(move || TailBuffer::drain(stdout, limit));
    let stderr = thread::spawn(move || TailBuffer::drain(stderr, limit));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {}", program.display()))?;
    let stdout = stdout
        .join()
        .map_err(|_| anyhow!("stdout reader panicked"))??;
    let stderr = stderr
        .join()
        .map_err(|_| anyhow!("stderr reader panicked"))??;
    Ok(RunOutput {
        code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

fn capture_limit() -> usize {
    std::env::var(CAPTURE_LIMIT_VAR)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_CAPTURE_LIMIT)
}

/// Keeps the newest `limit` bytes written to it.
struct TailBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl TailBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn drain(mut reader: impl Read, limit: usize) -> Result<String> {
        let mut tail = Self::new(limit);
        let mut chunk = [0u8; 8192];
        loop {
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            tail.push(&chunk[..read]);
        }
        Ok(tail.finish())
    }

    fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.limit {
            self.truncated |= !self.bytes.is_empty() || chunk.len() > self.limit;
            self.bytes.clear();
            self.bytes.extend_from_slice(&chunk[chunk.len() - self.limit..]);
            return;
        }
        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.limit);
        if overflow > 0 {
            self.truncated = true;
            self.bytes.drain(..overflow);
        }
        self.bytes.extend_from_slice(chunk);
    }

    fn finish(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}
