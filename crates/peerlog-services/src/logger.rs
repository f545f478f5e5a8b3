//! Packet logger — serializes packet lines into the active sink.
//!
//! One logger, one active sink. Installing a sink drops the previous one
//! (which closes its file). Each line is stamped with one monotonic clock
//! reading taken under the lock and written with a single call, so the
//! file is ordered by that clock and concurrent callers never interleave
//! bytes within a line.
//!
//! Logging never fails from the caller's point of view. Open failures keep
//! the previous sink; write failures drop the sink and continue as no-op.
//! Both are counted in [`LoggerStats`].

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use peerlog_core::config::LoggingConfig;
use peerlog_core::record::{Direction, MonotonicClock, PacketRecord};

use crate::sink::{FileSink, LogSink, SinkError};

/// Tunables for a [`PacketLogger`].
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub flush_every: u32,
    pub ring_capacity: usize,
    pub line_prefix: String,
    pub line_suffix: String,
    pub log_inbound: bool,
    pub log_outbound: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            flush_every: 1,
            ring_capacity: 0,
            line_prefix: String::new(),
            line_suffix: String::new(),
            log_inbound: true,
            log_outbound: true,
        }
    }
}

impl From<&LoggingConfig> for LoggerConfig {
    fn from(c: &LoggingConfig) -> Self {
        Self {
            flush_every: c.flush_every,
            ring_capacity: c.ring_capacity,
            line_prefix: c.line_prefix.clone(),
            line_suffix: c.line_suffix.clone(),
            log_inbound: c.log_inbound,
            log_outbound: c.log_outbound,
        }
    }
}

/// Counters since the logger was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    pub lines_written: u64,
    /// Records skipped by the direction filter.
    pub filtered: u64,
    pub open_failures: u64,
    pub write_failures: u64,
}

struct Inner {
    sink: Option<Box<dyn LogSink>>,
    recent: VecDeque<PacketRecord>,
}

pub struct PacketLogger {
    config: LoggerConfig,
    active: AtomicBool,
    inner: Mutex<Inner>,
    lines_written: AtomicU64,
    filtered: AtomicU64,
    open_failures: AtomicU64,
    write_failures: AtomicU64,
}

pub type SharedLogger = Arc<PacketLogger>;

impl PacketLogger {
    /// Logger with no sink. `log` is a no-op until one is configured.
    pub fn new(config: LoggerConfig) -> Self {
        let recent = VecDeque::with_capacity(config.ring_capacity);
        Self {
            config,
            active: AtomicBool::new(false),
            inner: Mutex::new(Inner { sink: None, recent }),
            lines_written: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            open_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn shared(config: LoggerConfig) -> SharedLogger {
        Arc::new(Self::new(config))
    }

    /// Install `sink`, releasing whatever was active.
    pub fn configure(&self, sink: Box<dyn LogSink>) {
        let mut inner = self.lock();
        let enabled = !sink.is_null();
        if let Some(path) = sink.path() {
            tracing::info!(path = %path.display(), "packet log sink installed");
        }
        let previous = inner.sink.replace(sink);
        self.active.store(enabled, Ordering::Release);
        drop(inner);
        // Close the old file outside the lock.
        drop(previous);
    }

    /// Open a new log file under `prefix` and make it the active sink.
    ///
    /// On failure the previous sink stays active.
    pub fn start_log(&self, prefix: impl Into<PathBuf>) -> Result<PathBuf, SinkError> {
        let prefix = prefix.into();
        match FileSink::start(&prefix, self.config.flush_every) {
            Ok(sink) => {
                let path = sink.path().map(|p| p.to_path_buf()).unwrap_or(prefix);
                self.configure(Box::new(sink));
                Ok(path)
            }
            Err(e) => {
                self.open_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "packet log unavailable, keeping previous sink");
                Err(e)
            }
        }
    }

    /// Format `record` and append it to the active sink.
    pub fn log(&self, record: &PacketRecord) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        if !self.accepts(record.direction) {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut inner = self.lock();
        let Some(sink) = inner.sink.as_mut() else {
            return;
        };
        // The line carries the logger's clock, not the caller's stamp.
        let stamped = record.restamped(MonotonicClock::now_ms());
        let body = stamped.format_line();
        let line = if self.config.line_prefix.is_empty() && self.config.line_suffix.is_empty() {
            body
        } else {
            format!("{}{body}{}", self.config.line_prefix, self.config.line_suffix)
        };
        match sink.write_line(&line) {
            Ok(()) => {
                self.lines_written.fetch_add(1, Ordering::Relaxed);
                if self.config.ring_capacity > 0 {
                    if inner.recent.len() == self.config.ring_capacity {
                        inner.recent.pop_front();
                    }
                    inner.recent.push_back(stamped);
                }
            }
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "packet log write failed, logging disabled");
                let failed = inner.sink.take();
                self.active.store(false, Ordering::Release);
                drop(inner);
                drop(failed);
            }
        }
    }

    /// Flush and release the active sink.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        self.active.store(false, Ordering::Release);
        let Some(mut sink) = inner.sink.take() else {
            return;
        };
        drop(inner);
        if let Err(e) = sink.flush() {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "packet log flush failed on shutdown");
        }
        if let Some(path) = sink.path() {
            tracing::info!(path = %path.display(), "packet log closed");
        }
    }

    /// Is a non-null sink installed?
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// File behind the active sink, if it has one.
    pub fn active_path(&self) -> Option<PathBuf> {
        self.lock()
            .sink
            .as_ref()
            .and_then(|s| s.path().map(|p| p.to_path_buf()))
    }

    /// Most recently logged records, oldest first.
    pub fn recent(&self) -> Vec<PacketRecord> {
        self.lock().recent.iter().copied().collect()
    }

    pub fn stats(&self) -> LoggerStats {
        LoggerStats {
            lines_written: self.lines_written.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    fn accepts(&self, direction: Direction) -> bool {
        match direction {
            Direction::Inbound => self.config.log_inbound,
            Direction::Outbound => self.config.log_outbound,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PacketLogger {
    fn drop(&mut self) {
        self.shutdown();
    }
}
