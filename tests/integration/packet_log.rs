//! Packet log files end to end.

use anyhow::Result;
use bytes::Bytes;
use peerlog_core::identity::PeerIdentity;
use peerlog_core::record::{Direction, PacketRecord, RawPacket};
use peerlog_services::{
    IdentityRegistry, LoggerConfig, LoggerStats, NullSink, PacketIngress, PacketLogger,
};

use crate::{read_lines, stamp_of, v4, without_stamp, Scratch};

fn record(ts: u64, size: u32) -> PacketRecord {
    PacketRecord::new(
        PeerIdentity::ByAddress { address: v4(10, 0, 0, 5, 4000) },
        Direction::Inbound,
        size,
        ts,
    )
}

#[test]
fn three_lines_durable_after_shutdown() -> Result<()> {
    let scratch = Scratch::new("three");
    let logger = PacketLogger::new(LoggerConfig::default());
    let path = logger.start_log(scratch.prefix("session"))?;
    assert!(path.exists());

    logger.log(&record(1, 10));
    logger.log(&record(2, 20));
    logger.log(&record(3, 30));
    logger.shutdown();

    let lines = read_lines(&path)?;
    let tails: Vec<_> = lines.iter().map(|l| without_stamp(l)).collect();
    assert_eq!(
        tails,
        vec![
            "IN 10.0.0.5:4000 10",
            "IN 10.0.0.5:4000 20",
            "IN 10.0.0.5:4000 30",
        ]
    );
    Ok(())
}

#[test]
fn file_stamps_follow_write_order_not_caller_stamps() -> Result<()> {
    let scratch = Scratch::new("stamps");
    let logger = PacketLogger::new(LoggerConfig::default());
    let path = logger.start_log(scratch.prefix("session"))?;

    logger.log(&record(200, 1));
    logger.log(&record(100, 2));
    logger.shutdown();

    let stamps = read_lines(&path)?
        .iter()
        .map(|l| stamp_of(l))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(stamps.len(), 2);
    assert!(stamps[0] <= stamps[1], "timestamps out of order: {stamps:?}");
    Ok(())
}

#[test]
fn buffered_flush_policy_still_lands_on_shutdown() -> Result<()> {
    let scratch = Scratch::new("buffered");
    let logger = PacketLogger::new(LoggerConfig {
        flush_every: 1000,
        ..LoggerConfig::default()
    });
    let path = logger.start_log(scratch.prefix("session"))?;
    for ts in 0..50 {
        logger.log(&record(ts, 1));
    }
    logger.shutdown();
    assert_eq!(read_lines(&path)?.len(), 50);
    Ok(())
}

#[test]
fn restarting_never_overwrites() -> Result<()> {
    let scratch = Scratch::new("restart");
    let logger = PacketLogger::new(LoggerConfig::default());

    let first = logger.start_log(scratch.prefix("session"))?;
    logger.log(&record(1, 1));
    let second = logger.start_log(scratch.prefix("session"))?;
    logger.log(&record(2, 2));
    logger.shutdown();

    assert_ne!(first, second);
    let first_lines = read_lines(&first)?;
    let second_lines = read_lines(&second)?;
    assert_eq!(first_lines.len(), 1);
    assert_eq!(second_lines.len(), 1);
    assert_eq!(without_stamp(&first_lines[0]), "IN 10.0.0.5:4000 1");
    assert_eq!(without_stamp(&second_lines[0]), "IN 10.0.0.5:4000 2");
    Ok(())
}

#[test]
fn no_sink_produces_nothing() {
    let logger = PacketLogger::new(LoggerConfig::default());
    logger.log(&record(1, 1));
    logger.configure(Box::new(NullSink));
    logger.log(&record(2, 2));
    logger.shutdown();
    assert_eq!(logger.stats(), LoggerStats::default());
    assert!(logger.active_path().is_none());
}

#[test]
fn failed_start_without_previous_sink_drops_silently() {
    let scratch = Scratch::new("unavailable");
    let blocker = scratch.root.join("not-a-dir");
    std::fs::write(&blocker, b"x").expect("write blocker");

    let logger = PacketLogger::new(LoggerConfig::default());
    assert!(logger.start_log(blocker.join("session")).is_err());
    logger.log(&record(1, 1));
    assert!(!logger.is_active());
    assert_eq!(logger.stats().open_failures, 1);
    assert_eq!(logger.stats().lines_written, 0);
}

#[test]
fn ingress_logs_merged_identity() -> Result<()> {
    let scratch = Scratch::new("ingress");
    let logger = PacketLogger::shared(LoggerConfig::default());
    let path = logger.start_log(scratch.prefix("ingress"))?;
    let ingress = PacketIngress::new(IdentityRegistry::shared(8), logger.clone());

    let addr = v4(10, 0, 0, 5, 4000);
    let mut first = RawPacket::inbound(Some(addr), None, Bytes::from_static(&[1, 2, 3]));
    first.timestamp_ms = 100;
    let mut second = RawPacket::inbound(None, Some(0xABCD), Bytes::from_static(&[4]));
    second.timestamp_ms = 101;

    ingress.on_packet(3, &first)?;
    ingress.on_packet(3, &second)?;
    ingress.on_send(3, 9)?;
    logger.shutdown();

    let lines = read_lines(&path)?;
    assert_eq!(lines.len(), 3);
    assert_eq!(without_stamp(&lines[0]), "IN 10.0.0.5:4000 3");
    // The handle-only packet is logged under the merged identity.
    assert_eq!(without_stamp(&lines[1]), "IN 10.0.0.5:4000 1");
    assert_eq!(without_stamp(&lines[2]), "OUT 10.0.0.5:4000 9");
    Ok(())
}
