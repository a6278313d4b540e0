//! End-to-end hash scenarios for both schemes.

use mergedb_codec::{BinlogKind, HashRecord, HashScheme};
use mergedb_core::{Config, CoreError, Database};
use mergedb_storage::MemoryDevice;
use tempfile::tempdir;

const SYNC: BinlogKind = BinlogKind::Sync;

fn in_memory(config: Config) -> Database {
    Database::open_with_device(config, Box::new(MemoryDevice::new())).unwrap()
}

#[test]
fn generic_profile_updates() {
    let db = in_memory(Config::default());
    let hashes = db.hashes();

    hashes
        .hmset(
            b"user:7",
            &[
                HashRecord::new("name", "ann"),
                HashRecord::new("city", "oslo"),
                HashRecord::new("email", "ann@example.com"),
            ],
            SYNC,
        )
        .unwrap();
    hashes.hset(b"user:7", b"city", b"bergen", SYNC).unwrap();
    hashes.hdel(b"user:7", b"email", SYNC).unwrap();
    hashes.hset(b"user:7", b"phone", b"", SYNC).unwrap();

    assert_eq!(
        hashes.hgetall(b"user:7").unwrap(),
        vec![
            HashRecord::new("phone", ""),
            HashRecord::new("city", "bergen"),
            HashRecord::new("name", "ann"),
        ]
    );
    assert_eq!(hashes.hget(b"user:7", b"email").unwrap(), None);
    assert_eq!(hashes.hsize(b"user:7").unwrap(), 3);
    assert_eq!(hashes.hsize(b"user:8").unwrap(), 0);

    // Deleted fields can be set again.
    hashes.hset(b"user:7", b"email", b"new@example.com", SYNC).unwrap();
    assert_eq!(
        hashes.hget(b"user:7", b"email").unwrap(),
        Some(b"new@example.com".to_vec())
    );
}

#[test]
fn generic_update_replaces_field() {
    let db = in_memory(Config::default());
    let hashes = db.hashes();
    hashes.hset(b"h", b"f1", b"100", SYNC).unwrap();
    hashes.hset(b"h", b"f2", b"200", SYNC).unwrap();
    hashes.hset(b"h", b"f1", b"150", SYNC).unwrap();

    let mut records = hashes.hgetall(b"h").unwrap();
    records.sort_by(|a, b| a.field.cmp(&b.field));
    assert_eq!(
        records,
        vec![HashRecord::new("f1", "150"), HashRecord::new("f2", "200")]
    );
    assert_eq!(hashes.hsize(b"h").unwrap(), 2);
}

#[test]
fn packed_board_positions() {
    let db = in_memory(Config::default().hash_scheme(HashScheme::Packed));
    let hashes = db.hashes();

    hashes.hset(b"game:1", b"a0a9", b"30000", SYNC).unwrap();
    hashes.hset(b"game:1", b"e4e5", b"-30000", SYNC).unwrap();
    hashes.hset(b"game:1", b"i9i0", b"0", SYNC).unwrap();
    hashes.hdel(b"game:1", b"i9i0", SYNC).unwrap();

    assert_eq!(hashes.hget(b"game:1", b"a0a9").unwrap(), Some(b"30000".to_vec()));
    assert_eq!(hashes.hget(b"game:1", b"e4e5").unwrap(), Some(b"-30000".to_vec()));
    assert_eq!(hashes.hget(b"game:1", b"i9i0").unwrap(), None);
    assert_eq!(hashes.hsize(b"game:1").unwrap(), 2);

    let rejected: [(&[u8], &[u8]); 6] = [
        (b"j0a0", b"1"),
        (b"a0a", b"1"),
        (b"a0a1", b"30001"),
        (b"a0a1", b"-30001"),
        (b"a0a1", b"1.5"),
        (b"a0a1", b"+7"),
    ];
    for (field, value) in rejected {
        let err = hashes.hset(b"game:1", field, value, SYNC).unwrap_err();
        assert!(matches!(err, CoreError::Codec(_)), "{field:?}={value:?}");
    }
    assert_eq!(db.binlog().last_seq(), 4);
}

#[test]
fn folded_operands_read_the_same() {
    let folded = in_memory(Config::default().max_merge_operands(2));
    let unfolded = in_memory(Config::default().max_merge_operands(1000));

    for db in [&folded, &unfolded] {
        for round in 0..20u8 {
            let field = [b'f', round % 5];
            db.hashes().hset(b"k", &field, &[b'0' + round % 10], SYNC).unwrap();
            if round % 3 == 0 {
                db.hashes().hdel(b"k", &[b'f', (round + 1) % 5], SYNC).unwrap();
            }
        }
    }

    assert_eq!(
        folded.hashes().hgetall(b"k").unwrap(),
        unfolded.hashes().hgetall(b"k").unwrap()
    );
    let pending = folded.stats().unwrap().engine.families[0].pending_operands;
    assert!(pending <= 2, "pending operands {pending}");
}

#[test]
fn pending_merges_survive_restart_and_compaction() {
    let temp = tempdir().unwrap();
    {
        let db = Database::open(temp.path()).unwrap();
        db.hashes().hset(b"k", b"a", b"1", SYNC).unwrap();
        db.hashes().hset(b"k", b"b", b"2", SYNC).unwrap();
        db.hashes().hdel(b"k", b"a", SYNC).unwrap();
    }
    {
        let db = Database::open(temp.path()).unwrap();
        assert_eq!(db.hashes().hgetall(b"k").unwrap(), vec![HashRecord::new("b", "2")]);

        let stats = db.compact().unwrap();
        assert_eq!(stats.resolved_keys, 1);
        db.hashes().hset(b"k", b"c", b"3", SYNC).unwrap();
    }

    let db = Database::open(temp.path()).unwrap();
    assert_eq!(
        db.hashes().hgetall(b"k").unwrap(),
        vec![HashRecord::new("c", "3"), HashRecord::new("b", "2")]
    );
    assert_eq!(db.binlog().last_seq(), 4);
    assert_eq!(db.binlog().find_next(0).unwrap().unwrap().seq(), 1);
}

#[test]
fn hlist_walks_hash_names_only() {
    let db = in_memory(Config::default());
    for name in ["apple", "pear", "fig", "kiwi"] {
        db.hashes().hset(name.as_bytes(), b"f", b"v", SYNC).unwrap();
    }

    // Storage keys sort by name length first.
    let all = db.hashes().hlist(b"", b"", 10).unwrap();
    assert_eq!(
        all,
        vec![b"fig".to_vec(), b"kiwi".to_vec(), b"pear".to_vec(), b"apple".to_vec()]
    );
    assert_eq!(
        db.hashes().hlist(b"kiwi", b"pear", 10).unwrap(),
        vec![b"kiwi".to_vec(), b"pear".to_vec()]
    );
    assert_eq!(db.hashes().hlist(b"fig", b"", 1).unwrap(), vec![b"fig".to_vec()]);
}
