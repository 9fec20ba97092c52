#![allow(missing_docs)]

//! Changing the configured index set must rebuild new permutations online
//! from an existing index and retire dropped ones.

use quadstore::error::Result;
use quadstore::{ContextMatch, QuadStore, StoreConfig, Term};
use tempfile::tempdir;

fn ex(local: &str) -> Term {
    Term::iri(format!("http://example.com/ns#{local}"))
}

fn spec(indexes: &str) -> StoreConfig {
    StoreConfig {
        index_spec: indexes.to_owned(),
        ..StoreConfig::default()
    }
}

#[test]
fn reindexing_preserves_all_quads() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    {
        let mut store = QuadStore::open(dir.path(), spec("spoc,posc"))?;
        store.begin_transaction()?;
        for i in 0..30 {
            store.add_quad(
                &ex(&format!("s{}", i % 5)),
                &ex(&format!("p{}", i % 3)),
                &ex(&format!("o{i}")),
                (i % 2 == 0).then(|| ex("g")).as_ref(),
                true,
            )?;
        }
        store.commit()?;
        store.close()?;
    }
    assert!(dir.path().join("triples-posc.idx").exists());

    {
        let store = QuadStore::open(dir.path(), spec("spoc,cosp"))?;
        assert!(dir.path().join("triples-cosp.idx").exists());
        assert!(!dir.path().join("triples-posc.idx").exists());

        let all: Vec<_> = store
            .quads(None, None, None, ContextMatch::Any)?
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(all.len(), 30);
        // Context-bound queries now range over the rebuilt cosp index.
        let in_graph: Vec<_> = store
            .quads(None, None, None, ContextMatch::Named(&ex("g")))?
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(in_graph.len(), 15);
    }
    Ok(())
}

#[test]
fn unchanged_spec_reopens_without_touching_index_files() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    {
        let mut store = QuadStore::open(dir.path(), spec("spoc,posc"))?;
        store.begin_transaction()?;
        store.add_quad(&ex("a"), &ex("p"), &ex("b"), None, true)?;
        store.commit()?;
        store.close()?;
    }
    let before = std::fs::read(dir.path().join("triples-posc.idx"))?;
    {
        let store = QuadStore::open(dir.path(), spec("spoc,posc"))?;
        assert_eq!(store.stats().quads, 1);
    }
    let after = std::fs::read(dir.path().join("triples-posc.idx"))?;
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn empty_spec_keeps_the_persisted_indexes() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    {
        let mut store = QuadStore::open(dir.path(), spec("spoc,posc"))?;
        store.begin_transaction()?;
        store.add_quad(&ex("a"), &ex("p"), &ex("b"), None, true)?;
        store.commit()?;
        store.close()?;
    }
    let store = QuadStore::open(dir.path(), spec(""))?;
    assert_eq!(store.stats().quads, 1);
    assert!(dir.path().join("triples-posc.idx").exists());
    Ok(())
}

#[test]
fn invalid_index_specs_are_rejected() {
    let dir = tempdir().expect("tmpdir");
    assert!(QuadStore::open(dir.path(), spec("spoc,sxyz")).is_err());
    assert!(QuadStore::open(dir.path(), spec("spo")).is_err());
}
