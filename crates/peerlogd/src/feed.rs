//! Line feed — stdin on its own thread, events applied on the runtime.
//!
//! The reader is a plain OS thread so a blocked `read` never holds the
//! runtime open at shutdown; the daemon aborts the feed task and returns.

use std::io::BufRead;
use std::thread;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use peerlog_services::PacketIngress;

use crate::event::{Action, PacketEvent};

const LINE_QUEUE: usize = 1024;

/// What one input line amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Applied,
    Skipped,
    Malformed,
    Rejected,
}

/// Read lines from `reader` on a detached thread until EOF or the
/// receiver goes away.
pub fn spawn_line_reader<R>(reader: R) -> Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_QUEUE);
    thread::Builder::new()
        .name("peerlogd-stdin".into())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read input");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to spawn input reader")?;
    Ok(rx)
}

/// Apply lines until the reader closes the channel.
pub async fn run_feed(mut lines: mpsc::Receiver<String>, ingress: PacketIngress) -> Result<()> {
    while let Some(line) = lines.recv().await {
        handle_line(&ingress, &line);
    }
    Ok(())
}

pub fn handle_line(ingress: &PacketIngress, line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return LineOutcome::Skipped;
    }
    let action = match PacketEvent::parse(line).and_then(PacketEvent::into_action) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed event");
            return LineOutcome::Malformed;
        }
    };
    let outcome = match action {
        Action::Packet(slot, packet) => ingress.on_packet(slot, &packet).map(|_| ()),
        Action::Send(slot, size) => ingress.on_send(slot, size).map(|_| ()),
        Action::Disconnect(slot) => {
            ingress.on_disconnect(slot);
            Ok(())
        }
    };
    match outcome {
        Ok(()) => LineOutcome::Applied,
        Err(e) => {
            tracing::warn!(error = %e, "packet rejected");
            LineOutcome::Rejected
        }
    }
}
