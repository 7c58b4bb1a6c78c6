//! Bounded capture of a launched script's output
//!
//! Both stdout and stderr readers push into one shared ring buffer so the
//! report for a failed run carries the interleaved tail of everything the
//! script printed. Foreground launches also forward the raw bytes to our
//! own streams as they arrive while capturing them.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{trace, warn};

/// Default maximum number of lines to keep
pub const DEFAULT_MAX_LINES: usize = 500;

/// Default maximum total bytes to keep (16KB)
pub const DEFAULT_MAX_BYTES: usize = 16 * 1024;

#[derive(Debug, Default)]
struct Ring {
    lines: VecDeque<String>,
    bytes: usize,
}

/// Thread-safe ring buffer of output lines; clones share storage
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    ring: Arc<Mutex<Ring>>,
    max_lines: usize,
    max_bytes: usize,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES, DEFAULT_MAX_BYTES)
    }
}

impl OutputBuffer {
    pub fn new(max_lines: usize, max_bytes: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(Ring::default())),
            max_lines: max_lines.max(1),
            max_bytes,
        }
    }

    /// Append a line, evicting the oldest lines past either limit
    pub fn push_line(&self, line: String) {
        let mut ring = self.ring.lock();

        while ring.bytes + line.len() > self.max_bytes || ring.lines.len() >= self.max_lines {
            match ring.lines.pop_front() {
                Some(old) => ring.bytes = ring.bytes.saturating_sub(old.len()),
                None => break,
            }
        }

        ring.bytes += line.len();
        ring.lines.push_back(line);
    }

    pub fn contents(&self) -> String {
        let ring = self.ring.lock();
        ring.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    pub fn len(&self) -> usize {
        self.ring.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().lines.is_empty()
    }

    pub fn byte_count(&self) -> usize {
        self.ring.lock().bytes
    }
}

/// Where captured output is echoed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    None,
    Stdout,
    Stderr,
}

impl Echo {
    /// Forward raw bytes as they arrive, including partial lines such as prompts
    fn write_chunk(self, chunk: &[u8]) {
        fn forward(mut out: impl Write, chunk: &[u8]) -> io::Result<()> {
            out.write_all(chunk)?;
            out.flush()
        }
        // Echo failures (closed pipe etc.) must not stop capture
        let _ = match self {
            Echo::None => Ok(()),
            Echo::Stdout => forward(io::stdout().lock(), chunk),
            Echo::Stderr => forward(io::stderr().lock(), chunk),
        };
    }
}

/// Splits a byte stream into lines; invalid UTF-8 is replaced, never rejected
#[derive(Debug, Default)]
struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    fn feed(&mut self, chunk: &[u8], mut emit: impl FnMut(String)) {
        for piece in chunk.split_inclusive(|b| *b == b'\n') {
            match piece.strip_suffix(b"\n") {
                Some(rest) => {
                    self.partial.extend_from_slice(rest);
                    emit(take_line(&mut self.partial));
                }
                None => self.partial.extend_from_slice(piece),
            }
        }
    }

    fn finish(mut self, emit: impl FnOnce(String)) {
        if !self.partial.is_empty() {
            emit(take_line(&mut self.partial));
        }
    }
}

fn take_line(bytes: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string();
    bytes.clear();
    line
}

const READ_CHUNK: usize = 8 * 1024;

/// Spawn a thread that drains `stream` into `buffer`, echoing raw bytes per `echo`
///
/// The stream is read until EOF so the child never blocks or dies on a full
/// or closed pipe. Join the returned handle after the child exits so the
/// buffer holds everything before it is read.
pub fn spawn_output_reader<R: Read + Send + 'static>(
    mut stream: R,
    buffer: OutputBuffer,
    echo: Echo,
    script_name: String,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("output-{}", script_name))
        .spawn(move || {
            let mut splitter = LineSplitter::default();
            let mut chunk = [0u8; READ_CHUNK];
            let mut push = |line: String| {
                trace!(target: "SCRIPT", script = %script_name, "{}", line);
                buffer.push_line(line);
            };
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        echo.write_chunk(&chunk[..n]);
                        splitter.feed(&chunk[..n], &mut push);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(target: "SCRIPT", error = %e, "output read error");
                        break;
                    }
                }
            }
            splitter.finish(push);
        })
}
