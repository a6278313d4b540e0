//! Data writes and log entries commit together or not at all.

use mergedb_codec::BinlogKind;
use mergedb_core::{Config, CoreError, Database};
use mergedb_storage::{FaultSwitch, FaultyDevice, MemoryDevice};

fn open_faulty(memory: &MemoryDevice) -> (Database, FaultSwitch) {
    let (device, switch) = FaultyDevice::new(Box::new(memory.clone()));
    let db = Database::open_with_device(Config::default(), Box::new(device)).unwrap();
    (db, switch)
}

fn reopen(memory: &MemoryDevice) -> Database {
    Database::open_with_device(Config::default(), Box::new(memory.clone())).unwrap()
}

#[test]
fn failed_append_applies_nothing() {
    let memory = MemoryDevice::new();
    let (db, switch) = open_faulty(&memory);
    db.hashes().hset(b"k", b"a", b"1", BinlogKind::Sync).unwrap();

    switch.fail_appends(true);
    let err = db.hashes().hset(b"k", b"b", b"2", BinlogKind::Sync).unwrap_err();
    assert!(matches!(err, CoreError::CommitFailed { .. }));
    assert!(switch.injected() > 0);

    assert_eq!(db.hashes().hget(b"k", b"b").unwrap(), None);
    assert_eq!(db.binlog().last_seq(), 1);
    assert!(db.binlog().get(2).unwrap().is_none());

    switch.reset();
    db.hashes().hset(b"k", b"c", b"3", BinlogKind::Sync).unwrap();
    assert_eq!(db.binlog().last_seq(), 2);
    assert_eq!(db.binlog().get(2).unwrap().unwrap().seq(), 2);
}

#[test]
fn torn_append_is_not_replayed() {
    let memory = MemoryDevice::new();
    {
        let (db, switch) = open_faulty(&memory);
        db.hashes().hset(b"k", b"a", b"1", BinlogKind::Sync).unwrap();

        switch.tear_next_append();
        assert!(db.hashes().hdel(b"k", b"a", BinlogKind::Sync).is_err());
        assert_eq!(db.hashes().hget(b"k", b"a").unwrap(), Some(b"1".to_vec()));
    }

    let db = reopen(&memory);
    assert_eq!(db.hashes().hget(b"k", b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.binlog().last_seq(), 1);
    assert!(db.binlog().get(2).unwrap().is_none());
}

#[test]
fn failed_sync_rolls_back_the_batch() {
    let memory = MemoryDevice::new();
    {
        let (db, switch) = open_faulty(&memory);
        switch.fail_syncs(true);
        let err = db.hashes().hset(b"k", b"a", b"1", BinlogKind::Sync).unwrap_err();
        assert!(matches!(err, CoreError::CommitFailed { .. }));
        assert_eq!(db.hashes().hsize(b"k").unwrap(), 0);
        assert_eq!(db.binlog().last_seq(), 0);
        switch.reset();
    }

    let db = reopen(&memory);
    assert_eq!(db.hashes().hsize(b"k").unwrap(), 0);
    assert!(db.binlog().find_last().unwrap().is_none());
}

#[test]
fn failed_compaction_keeps_reads_and_journal() {
    let memory = MemoryDevice::new();
    {
        let (db, switch) = open_faulty(&memory);
        db.hashes().hset(b"k", b"a", b"1", BinlogKind::Sync).unwrap();
        db.hashes().hset(b"k", b"b", b"2", BinlogKind::Sync).unwrap();

        switch.fail_replace(true);
        assert!(db.compact().is_err());
        assert_eq!(db.hashes().hsize(b"k").unwrap(), 2);
        switch.reset();
    }

    let db = reopen(&memory);
    assert_eq!(db.hashes().hget(b"k", b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.binlog().last_seq(), 2);
}

#[test]
fn corrupt_operand_fails_compaction_without_rewriting() {
    let db = Database::open_in_memory().unwrap();
    db.hashes().hset(b"k", b"a", b"1", BinlogKind::Sync).unwrap();
    let storage_key = db.hashes().encoder().encode_key(b"k").unwrap();
    db.engine()
        .merge(mergedb_storage::ColumnFamily::DEFAULT, &storage_key, &[0xff])
        .unwrap();
    let before = db.stats().unwrap().engine.journal_bytes;

    assert!(matches!(db.compact(), Err(CoreError::MergeCorruption { .. })));
    assert_eq!(db.stats().unwrap().engine.journal_bytes, before);
}
