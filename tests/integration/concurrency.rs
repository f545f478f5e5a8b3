//! Receive path and simulation path hammering the same registry and logger.

use std::collections::HashSet;
use std::thread;

use anyhow::Result;
use peerlog_core::identity::PeerIdentity;
use peerlog_core::record::{Direction, PacketRecord};
use peerlog_services::{IdentityRegistry, LoggerConfig, PacketLogger};

use crate::{read_lines, stamp_of, v4, Scratch};

#[test]
fn concurrent_lines_never_interleave() -> Result<()> {
    const THREADS: u64 = 4;
    const PER_THREAD: u64 = 250;

    let scratch = Scratch::new("interleave");
    let logger = PacketLogger::new(LoggerConfig::default());
    let path = logger.start_log(scratch.prefix("load"))?;

    thread::scope(|s| {
        for t in 0..THREADS {
            let logger = &logger;
            s.spawn(move || {
                let id = PeerIdentity::from_handle(t + 1).expect("non-zero handle");
                for i in 0..PER_THREAD {
                    // Caller stamps run backwards; the file must not.
                    let size = (t * 10_000 + i) as u32;
                    logger.log(&PacketRecord::new(id, Direction::Inbound, size, PER_THREAD - i));
                }
            });
        }
    });
    logger.shutdown();

    let lines = read_lines(&path)?;
    assert_eq!(lines.len() as u64, THREADS * PER_THREAD);
    let mut seen = HashSet::new();
    let mut last = 0;
    for line in &lines {
        let fields: Vec<_> = line.split(' ').collect();
        assert_eq!(fields.len(), 4, "torn line: {line:?}");
        assert_eq!(fields[1], "IN");
        assert!(fields[2].starts_with('#'));
        assert!(seen.insert(fields[3].to_string()), "duplicate line: {line:?}");
        let stamp = stamp_of(line)?;
        assert!(stamp >= last, "timestamps went backwards at {line:?}");
        last = stamp;
    }
    Ok(())
}

#[test]
fn readers_never_see_half_upgrades() {
    let registry = IdentityRegistry::new(64);
    let addr = v4(10, 0, 0, 5, 4000);

    thread::scope(|s| {
        s.spawn(|| {
            for round in 1..=200u64 {
                registry
                    .bind(7, PeerIdentity::ByAddress { address: addr })
                    .expect("bind address");
                registry
                    .bind(7, PeerIdentity::from_handle(round).expect("handle"))
                    .expect("bind handle");
                registry.release(7);
            }
        });
        s.spawn(|| {
            for _ in 0..2_000 {
                if let Ok(id) = registry.resolve(7) {
                    match id {
                        PeerIdentity::Undefined => {}
                        PeerIdentity::ByAddress { address } => assert_eq!(address, addr),
                        PeerIdentity::Both { address, handle } => {
                            assert_eq!(address, addr);
                            assert!(handle >= 1);
                        }
                        PeerIdentity::ByHandle { .. } => panic!("address lost mid-upgrade"),
                    }
                }
            }
        });
    });
}

#[test]
fn one_slot_per_handle_under_contention() {
    let registry = IdentityRegistry::new(64);
    let winners: Vec<bool> = thread::scope(|s| {
        let handles: Vec<_> = (0..8u16)
            .map(|slot| {
                let registry = &registry;
                s.spawn(move || {
                    registry
                        .bind(slot, PeerIdentity::from_handle(0xABCD).expect("handle"))
                        .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("thread panicked")).collect()
    });
    assert_eq!(winners.iter().filter(|w| **w).count(), 1);
    assert!(registry.lookup_by_handle(0xABCD).is_some());
}
