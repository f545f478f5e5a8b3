//! peerlog integration test harness.
//!
//! These tests drive the registry, logger and ingress together the way a
//! transport adapter would, and check the packet log files on disk.
//!
//!   cargo test --test integration
//!
//! Each test owns a scratch directory under the system temp dir and
//! removes it when done.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result};
use peerlog_core::identity::PeerAddress;

mod concurrency;
mod identity_flow;
mod packet_log;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Scratch directory removed on drop.
pub struct Scratch {
    pub root: PathBuf,
}

impl Scratch {
    pub fn new(tag: &str) -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "peerlog-it-{tag}-{}-{n}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).expect("create scratch dir");
        Self { root }
    }

    pub fn prefix(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// IPv4 peer address with protocol version 1.
pub fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> PeerAddress {
    PeerAddress::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), port, 1)
}

/// A packet log line minus its timestamp field.
pub fn without_stamp(line: &str) -> &str {
    line.split_once(' ').map(|(_, rest)| rest).unwrap_or(line)
}

/// Timestamp field of a packet log line.
pub fn stamp_of(line: &str) -> Result<u64> {
    let field = line.split(' ').next().unwrap_or_default();
    field
        .parse()
        .with_context(|| format!("bad timestamp in {line:?}"))
}

/// All lines of a packet log file.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}
