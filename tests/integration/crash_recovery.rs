#![allow(missing_docs)]

//! Crash-window simulations for the two-phase commit/rollback protocol.
//! Each test drives the store to a phase boundary, forges the persisted
//! status byte a crashed process would have left behind, and asserts that
//! reopening converges every index to a consistent state.

use quadstore::config::StoreConfig;
use quadstore::error::Result;
use quadstore::index::{record_flags, QuadPattern, Record, RecordIndex, RecordOrder};
use quadstore::store::triple_store::{TripleStore, EXPLICIT_FLAG};
use quadstore::store::txn_status::{TxnStatus, TxnStatusFile};
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::tempdir;

type Key = (u32, u32, u32, u32, u8);

fn key(rec: &Record) -> Key {
    (
        quadstore::index::subject_id(rec),
        quadstore::index::predicate_id(rec),
        quadstore::index::object_id(rec),
        quadstore::index::context_id(rec),
        record_flags(rec),
    )
}

fn read_index_file(dir: &Path, spec: &str) -> Result<BTreeSet<Key>> {
    let order = RecordOrder::parse(spec)?;
    let index = RecordIndex::open(dir.join(format!("triples-{spec}.idx")), order, false)?;
    Ok(index.scan_all().iter().map(key).collect())
}

fn forge_status(dir: &Path, status: TxnStatus) -> Result<()> {
    let mut file = TxnStatusFile::open(dir)?;
    file.set_status(status, true)
}

#[test]
fn crash_after_committing_persists_completes_the_commit() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let config = StoreConfig::default();
    {
        let mut store = TripleStore::open(dir.path(), &config)?;
        store.start_transaction()?;
        store.store_triple(1, 2, 3, 0, true)?;
        store.store_triple(4, 5, 6, 7, false)?;
        store.commit()?;

        store.start_transaction()?;
        store.store_triple(8, 9, 10, 0, true)?;
        store.remove_triples_by_context(
            &QuadPattern {
                subj: Some(1),
                ..QuadPattern::any()
            },
            None,
        )?;
        // Make the flagged state durable, then vanish without committing.
        store.sync()?;
        store.close()?;
    }
    forge_status(dir.path(), TxnStatus::Committing)?;

    let store = TripleStore::open(dir.path(), &config)?;
    let records: Vec<Record> = store.triples(&QuadPattern::any(), false).collect();
    let keys: BTreeSet<Key> = records.iter().map(key).collect();
    let expected: BTreeSet<Key> = [(4, 5, 6, 7, 0), (8, 9, 10, 0, EXPLICIT_FLAG)]
        .into_iter()
        .collect();
    assert_eq!(keys, expected, "recovered commit must fully apply");
    for rec in &records {
        assert_eq!(record_flags(rec) & !EXPLICIT_FLAG, 0, "no transient flags may survive");
    }
    Ok(())
}

#[test]
fn recovered_commit_reaches_every_index() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let config = StoreConfig {
        index_spec: "spoc,posc,cosp".to_owned(),
        ..StoreConfig::default()
    };
    {
        let mut store = TripleStore::open(dir.path(), &config)?;
        store.start_transaction()?;
        for i in 1..=20u32 {
            store.store_triple(i, i % 3 + 1, i % 5 + 1, i % 2, true)?;
        }
        store.sync()?;
        store.close()?;
    }
    forge_status(dir.path(), TxnStatus::Committing)?;
    {
        let mut store = TripleStore::open(dir.path(), &config)?;
        store.close()?;
    }

    let spoc = read_index_file(dir.path(), "spoc")?;
    let posc = read_index_file(dir.path(), "posc")?;
    let cosp = read_index_file(dir.path(), "cosp")?;
    assert_eq!(spoc.len(), 20);
    assert_eq!(spoc, posc);
    assert_eq!(spoc, cosp);
    Ok(())
}

#[test]
fn crash_while_active_rolls_the_transaction_back() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let config = StoreConfig::default();
    {
        let mut store = TripleStore::open(dir.path(), &config)?;
        store.start_transaction()?;
        store.store_triple(1, 2, 3, 0, true)?;
        store.commit()?;

        store.start_transaction()?;
        store.store_triple(4, 5, 6, 0, true)?;
        store.remove_triples_by_context(&QuadPattern::any(), None)?;
        store.sync()?;
        store.close()?;
    }
    // The status file still says Active; reopening must roll back.
    let store = TripleStore::open(dir.path(), &config)?;
    let keys: BTreeSet<Key> = store
        .triples(&QuadPattern::any(), false)
        .map(|r| key(&r))
        .collect();
    let expected: BTreeSet<Key> = [(1, 2, 3, 0, EXPLICIT_FLAG)].into_iter().collect();
    assert_eq!(keys, expected);
    Ok(())
}

#[test]
fn unknown_status_triggers_a_defensive_rollback() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let config = StoreConfig::default();
    {
        let mut store = TripleStore::open(dir.path(), &config)?;
        store.start_transaction()?;
        store.store_triple(1, 2, 3, 0, true)?;
        store.sync()?;
        store.close()?;
    }
    std::fs::write(dir.path().join("txn-status"), b"?")?;

    let store = TripleStore::open(dir.path(), &config)?;
    assert_eq!(store.triples(&QuadPattern::any(), false).count(), 0);
    Ok(())
}

#[test]
fn recovery_is_idempotent_under_repeated_crashes() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let config = StoreConfig::default();
    {
        let mut store = TripleStore::open(dir.path(), &config)?;
        store.start_transaction()?;
        store.store_triple(1, 2, 3, 0, true)?;
        store.store_triple(4, 5, 6, 0, false)?;
        store.sync()?;
        store.close()?;
    }
    // Crash loop: every reopen finds Committing again and must converge to
    // the same fully-committed state.
    for _ in 0..3 {
        forge_status(dir.path(), TxnStatus::Committing)?;
        let mut store = TripleStore::open(dir.path(), &config)?;
        store.close()?;
    }
    let store = TripleStore::open(dir.path(), &config)?;
    let keys: BTreeSet<Key> = store
        .triples(&QuadPattern::any(), false)
        .map(|r| key(&r))
        .collect();
    let expected: BTreeSet<Key> = [(1, 2, 3, 0, EXPLICIT_FLAG), (4, 5, 6, 0, 0)]
        .into_iter()
        .collect();
    assert_eq!(keys, expected);
    Ok(())
}
