//! Log sinks — where formatted packet lines end up.
//!
//! A sink owns its backing store. Dropping a sink releases it; `FileSink`
//! flushes and syncs on drop, so every exit path closes the file cleanly.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Destination for formatted log lines.
pub trait LogSink: Send {
    /// Write one line. The sink appends the terminator.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// A null sink accepts nothing; the logger skips formatting for it.
    fn is_null(&self) -> bool {
        false
    }

    /// Backing file, if any.
    fn path(&self) -> Option<&Path> {
        None
    }
}

// ── Null sink ─────────────────────────────────────────────────────────────────

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write_line(&mut self, _line: &str) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_null(&self) -> bool {
        true
    }
}

// ── File sink ─────────────────────────────────────────────────────────────────

/// Attempts at finding an unused file name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 64;

/// Per-process session counter, shared by every prefix.
static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Appends lines to a freshly created file.
///
/// The file name is `<prefix>-<unix_ms>-<seq>.log`. Files are created with
/// `create_new`, so an existing file is never reused or truncated.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    flush_every: u32,
    unflushed: u32,
    line: Vec<u8>,
}

impl FileSink {
    /// Create a new log file under `prefix`.
    ///
    /// `flush_every` lines are buffered before a flush; 0 and 1 both flush
    /// on every line.
    pub fn start(prefix: impl AsRef<Path>, flush_every: u32) -> Result<Self, SinkError> {
        let prefix = prefix.as_ref();
        if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::SinkUnavailable {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        let mut last_err = None;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
            let path = PathBuf::from(format!("{}-{stamp}-{seq}.log", prefix.display()));
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "packet log started");
                    return Ok(Self {
                        path,
                        writer: BufWriter::new(file),
                        flush_every: flush_every.max(1),
                        unflushed: 0,
                        line: Vec::with_capacity(128),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    last_err = Some((path, e));
                }
                Err(e) => return Err(SinkError::SinkUnavailable { path, source: e }),
            }
        }

        let (path, source) = last_err.unwrap_or_else(|| {
            (
                prefix.to_path_buf(),
                io::Error::new(io::ErrorKind::AlreadyExists, "no free log file name"),
            )
        });
        Err(SinkError::SinkUnavailable { path, source })
    }
}

impl LogSink for FileSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        // One write per line so a partial flush never splits a record.
        self.line.clear();
        self.line.extend_from_slice(line.as_bytes());
        self.line.push(b'\n');
        self.writer.write_all(&self.line)?;

        self.unflushed += 1;
        if self.unflushed >= self.flush_every {
            self.writer.flush()?;
            self.unflushed = 0;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.unflushed = 0;
        self.writer.get_ref().sync_data()
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(e) = LogSink::flush(self) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush packet log on close");
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("cannot open packet log {path}: {source}")]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
