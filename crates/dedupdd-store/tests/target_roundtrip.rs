//! Integration test: chunk -> identify -> write into a target -> read back
//!
//! Uses throwaway files from `tempfile` as backing media; nothing here needs
//! a real block device.

use dedupdd_chunks::{identify, ChunkSizes, Chunker};
use dedupdd_core::DedupError;
use dedupdd_store::{Store, StoreChain, Target, TargetOptions};
use proptest::prelude::*;
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const NON_QUERYABLE: TargetOptions = TargetOptions {
    queryable: false,
    read_before_write: false,
};

fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            x as u8
        })
        .collect()
}

fn backing_file(content: &[u8]) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("create backing file");
    tmp.write_all(content).expect("fill backing file");
    tmp.flush().expect("flush backing file");
    tmp
}

fn open(path: &Path) -> Target {
    Target::open(path, TargetOptions::default()).expect("open target")
}

#[test]
fn write_then_get_chunk_roundtrip() {
    let tmp = backing_file(&[0u8; 8192]);
    let mut target = open(tmp.path());

    let data = noise(3000, 1);
    let id = identify(&data);
    assert_eq!(target.write(&data, 1024, &id, false).unwrap(), data.len());

    let mut buf = vec![0u8; data.len()];
    assert_eq!(target.get_chunk(&id, &mut buf).unwrap(), Some(data.len()));
    assert_eq!(buf, data);

    let entry = target.index().query(&id).unwrap();
    assert_eq!((entry.start, entry.length), (1024, 3000));
}

#[test]
fn larger_buffer_only_front_is_filled() {
    let tmp = backing_file(&[0u8; 4096]);
    let mut target = open(tmp.path());

    let data = b"short chunk";
    let id = identify(data);
    target.write(data, 0, &id, false).unwrap();

    let mut buf = vec![0xeeu8; 64];
    assert_eq!(target.get_chunk(&id, &mut buf).unwrap(), Some(data.len()));
    assert_eq!(&buf[..data.len()], data);
    assert!(buf[data.len()..].iter().all(|&b| b == 0xee));
}

#[test]
fn unknown_id_is_absent() {
    let tmp = backing_file(&[0u8; 4096]);
    let target = open(tmp.path());

    let mut buf = [0u8; 16];
    assert_eq!(target.get_chunk(&identify(b"never written"), &mut buf).unwrap(), None);
}

#[test]
fn unchanged_write_is_skipped_but_indexed() {
    let data = noise(4096, 2);
    let mut medium = vec![0u8; 16384];
    medium[8192..8192 + data.len()].copy_from_slice(&data);
    let tmp = backing_file(&medium);
    let mut target = open(tmp.path());
    let id = identify(&data);

    assert_eq!(target.write(&data, 8192, &id, true).unwrap(), 0);

    let stats = target.stats();
    assert_eq!(stats.physical_writes, 0, "no write may reach the medium");
    assert_eq!(stats.skipped_writes, 1);
    assert_eq!(stats.bytes_skipped, data.len() as u64);

    let entry = target.index().query(&id).expect("skipped chunk is still indexed");
    assert_eq!((entry.start, entry.length), (8192, 4096));
}

#[test]
fn changed_write_goes_through() {
    let tmp = backing_file(&[0u8; 8192]);
    let mut target = open(tmp.path());

    let data = noise(2048, 3);
    assert_eq!(target.write(&data, 2048, &identify(&data), true).unwrap(), 2048);
    assert_eq!(target.stats().physical_writes, 1);
    drop(target);

    let on_disk = std::fs::read(tmp.path()).unwrap();
    assert_eq!(&on_disk[2048..4096], &data[..]);
    assert!(on_disk[..2048].iter().all(|&b| b == 0));
}

#[test]
fn write_past_end_grows_medium() {
    let tmp = backing_file(&[0u8; 100]);
    let mut target = open(tmp.path());

    let data = noise(500, 4);
    assert_eq!(target.write(&data, 1000, &identify(&data), true).unwrap(), 500);
    drop(target);

    assert_eq!(std::fs::metadata(tmp.path()).unwrap().len(), 1500);
}

#[test]
fn small_buffer_is_a_capacity_error() {
    let tmp = backing_file(&[0u8; 4096]);
    let mut target = open(tmp.path());

    let data = noise(1000, 5);
    let id = identify(&data);
    target.write(&data, 0, &id, false).unwrap();

    let mut buf = vec![0x11u8; 999];
    let err = target.get_chunk(&id, &mut buf).unwrap_err();
    assert!(matches!(err, DedupError::Capacity { needed: 1000, available: 999 }));
    assert!(buf.iter().all(|&b| b == 0x11), "buffer must be untouched");
}

#[test]
fn non_queryable_target_reports_absent() {
    let data = noise(1024, 6);
    let tmp = backing_file(&data);
    let mut target = Target::open(tmp.path(), NON_QUERYABLE).unwrap();
    let id = identify(&data);

    // Identical bytes on disk, yet the write is not elided.
    assert_eq!(target.write(&data, 0, &id, true).unwrap(), data.len());
    assert_eq!(target.stats().physical_writes, 1);
    assert_eq!(target.stats().skipped_writes, 0);

    let mut buf = vec![0u8; data.len()];
    assert_eq!(target.get_chunk(&id, &mut buf).unwrap(), None);
    assert!(target.index().is_empty());
}

#[test]
fn duplicate_chunk_keeps_first_location() {
    let tmp = backing_file(&[0u8; 16384]);
    let mut target = open(tmp.path());

    let data = noise(1024, 7);
    let id = identify(&data);
    target.write(&data, 0, &id, false).unwrap();
    target.write(&data, 8192, &id, false).unwrap();

    assert_eq!(target.index().len(), 1);
    assert_eq!(target.index().query(&id).unwrap().start, 0);
    assert_eq!(target.stats().physical_writes, 2);
}

#[test]
fn calc_chunk_id_reads_medium() {
    let medium = noise(8192, 8);
    let tmp = backing_file(&medium);
    let target = open(tmp.path());

    let (bytes, id) = target.calc_chunk_id(1000, 2000).unwrap();
    assert_eq!(bytes, &medium[1000..3000]);
    assert_eq!(id, identify(&medium[1000..3000]));

    let err = target.calc_chunk_id(8000, 1000).unwrap_err();
    assert!(matches!(err, DedupError::Io(_)), "short read is an I/O error");
}

#[test]
fn sync_only_rewrites_changed_chunks() {
    let source = noise(512 * 1024, 9);
    let mut stale = source.clone();
    for b in &mut stale[200_000..200_100] {
        *b = !*b;
    }
    let tmp = backing_file(&stale);
    let mut target = open(tmp.path());

    let mut chunks = 0u64;
    for chunk in Chunker::new(Cursor::new(&source), ChunkSizes::SMALL) {
        let chunk = chunk.unwrap();
        target.write(&chunk.data, chunk.offset, &chunk.id, true).unwrap();
        chunks += 1;
    }

    let stats = target.stats();
    assert!(stats.physical_writes >= 1, "the edited region must be rewritten");
    assert!(stats.physical_writes <= 2, "only chunks touching the edit are rewritten");
    assert_eq!(stats.physical_writes + stats.skipped_writes, chunks);
    assert_eq!(stats.bytes_written + stats.bytes_skipped, source.len() as u64);
    drop(target);

    assert_eq!(std::fs::read(tmp.path()).unwrap(), source);
}

#[test]
fn targets_chain_as_stores() {
    let older = backing_file(&[0u8; 4096]);
    let newer = backing_file(&[0u8; 4096]);
    let mut a = open(older.path());
    let mut b = open(newer.path());

    let in_a = noise(300, 10);
    let in_b = noise(400, 11);
    a.write(&in_a, 0, &identify(&in_a), false).unwrap();
    b.write(&in_b, 100, &identify(&in_b), false).unwrap();

    let mut chain = StoreChain::new();
    chain.push(&a).push(&b);

    let mut buf = vec![0u8; 1024];
    let (n, from) = chain.fetch(&identify(&in_b), &mut buf).unwrap().unwrap();
    assert_eq!(&buf[..n], &in_b[..]);
    assert_eq!(from.name(), b.name());

    let (n, from) = chain.fetch(&identify(&in_a), &mut buf).unwrap().unwrap();
    assert_eq!(&buf[..n], &in_a[..]);
    assert_eq!(from.name(), a.name());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every chunk written contiguously can be fetched back by id
    #[test]
    fn written_chunks_are_retrievable(seed in any::<u64>(), len in 1usize..=96 * 1024) {
        let source = noise(len, seed);
        let tmp = backing_file(&[]);
        let mut target = open(tmp.path());

        let chunks: Vec<_> = Chunker::new(Cursor::new(&source), ChunkSizes::SMALL)
            .map(|c| c.unwrap())
            .collect();
        for c in &chunks {
            prop_assert_eq!(target.write(&c.data, c.offset, &c.id, false).unwrap(), c.data.len());
        }

        let mut buf = vec![0u8; ChunkSizes::SMALL.max_size() as usize];
        for c in &chunks {
            let n = target.get_chunk(&c.id, &mut buf).unwrap();
            prop_assert_eq!(n, Some(c.data.len()));
            prop_assert_eq!(&buf[..c.data.len()], &c.data[..]);
        }
    }
}
