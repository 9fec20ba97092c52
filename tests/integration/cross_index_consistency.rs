#![allow(missing_docs)]

//! Every configured permutation index must hold the identical record set
//! after any sequence of commits and rollbacks.

use quadstore::config::StoreConfig;
use quadstore::error::Result;
use quadstore::index::{
    context_id, object_id, predicate_id, record_flags, subject_id, QuadPattern, RecordIndex,
    RecordOrder,
};
use quadstore::store::triple_store::TripleStore;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::tempdir;

const INDEX_SPECS: [&str; 3] = ["spoc", "posc", "cosp"];

type Key = (u32, u32, u32, u32, u8);

fn read_index_file(dir: &Path, spec: &str) -> Result<BTreeSet<Key>> {
    let order = RecordOrder::parse(spec)?;
    let index = RecordIndex::open(dir.join(format!("triples-{spec}.idx")), order, false)?;
    Ok(index
        .scan_all()
        .iter()
        .map(|r| {
            (
                subject_id(r),
                predicate_id(r),
                object_id(r),
                context_id(r),
                record_flags(r),
            )
        })
        .collect())
}

fn assert_indexes_agree(dir: &Path) -> Result<BTreeSet<Key>> {
    let reference = read_index_file(dir, INDEX_SPECS[0])?;
    for spec in &INDEX_SPECS[1..] {
        let other = read_index_file(dir, spec)?;
        assert_eq!(
            reference, other,
            "index '{}' diverged from '{}'",
            spec, INDEX_SPECS[0]
        );
    }
    Ok(reference)
}

fn config() -> StoreConfig {
    StoreConfig {
        index_spec: INDEX_SPECS.join(","),
        ..StoreConfig::default()
    }
}

#[test]
fn random_commit_rollback_sequences_keep_indexes_identical() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);

    {
        let mut store = TripleStore::open(dir.path(), &config())?;
        for _round in 0..20 {
            store.start_transaction()?;
            for _ in 0..rng.gen_range(1..30) {
                if rng.gen_bool(0.7) {
                    store.store_triple(
                        rng.gen_range(1..8),
                        rng.gen_range(1..4),
                        rng.gen_range(1..8),
                        if rng.gen_bool(0.3) {
                            rng.gen_range(1..3)
                        } else {
                            0
                        },
                        rng.gen_bool(0.8),
                    )?;
                } else {
                    let pattern = QuadPattern {
                        subj: rng.gen_bool(0.5).then(|| rng.gen_range(1..8)),
                        pred: rng.gen_bool(0.5).then(|| rng.gen_range(1..4)),
                        ..QuadPattern::any()
                    };
                    store.remove_triples_by_context(&pattern, None)?;
                }
            }
            if rng.gen_bool(0.7) {
                store.commit()?;
            } else {
                store.rollback()?;
            }
        }
        store.close()?;
    }

    let records = assert_indexes_agree(dir.path())?;
    for (_, _, _, _, flags) in &records {
        assert_eq!(flags & !0x1, 0, "only the explicit flag may persist");
    }
    Ok(())
}

#[test]
fn rollback_restores_indexes_byte_for_byte() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    {
        let mut store = TripleStore::open(dir.path(), &config())?;
        store.start_transaction()?;
        store.store_triple(1, 2, 3, 0, true)?;
        store.store_triple(4, 2, 3, 9, false)?;
        store.store_triple(5, 3, 1, 0, true)?;
        store.commit()?;
        store.close()?;
    }
    let before = assert_indexes_agree(dir.path())?;
    let file_bytes_before: Vec<Vec<u8>> = INDEX_SPECS
        .iter()
        .map(|spec| std::fs::read(dir.path().join(format!("triples-{spec}.idx"))).unwrap())
        .collect();

    {
        let mut store = TripleStore::open(dir.path(), &config())?;
        store.start_transaction()?;
        store.store_triple(7, 7, 7, 7, true)?;
        store.remove_triples_by_context(&QuadPattern::any(), None)?;
        store.store_triple(1, 2, 3, 0, false)?;
        store.rollback()?;
        store.close()?;
    }

    let after = assert_indexes_agree(dir.path())?;
    assert_eq!(before, after, "rollback must restore the exact record set");
    let file_bytes_after: Vec<Vec<u8>> = INDEX_SPECS
        .iter()
        .map(|spec| std::fs::read(dir.path().join(format!("triples-{spec}.idx"))).unwrap())
        .collect();
    assert_eq!(
        file_bytes_before, file_bytes_after,
        "snapshot files must be byte-identical after rollback"
    );
    Ok(())
}
