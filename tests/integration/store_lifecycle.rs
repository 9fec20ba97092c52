#![allow(missing_docs)]

//! End-to-end lifecycle tests against the term-level store interface.

use quadstore::error::Result;
use quadstore::{ContextMatch, Quad, QuadStore, StoreConfig, Term};
use tempfile::tempdir;

fn ex(local: &str) -> Term {
    Term::iri(format!("http://example.com/ns#{local}"))
}

fn collect(iter: quadstore::store::QuadIter<'_>) -> Result<Vec<Quad>> {
    iter.collect()
}

#[test]
fn inferred_then_explicit_survives_commit_and_restart() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let (a, p, b) = (ex("a"), ex("p"), ex("b"));
    {
        let mut store = QuadStore::open(dir.path(), StoreConfig::default())?;
        store.begin_transaction()?;
        store.add_quad(&a, &p, &b, None, false)?;
        store.commit()?;

        let inferred = collect(store.quads_filtered(
            Some(&a),
            None,
            None,
            ContextMatch::Any,
            Some(false),
        )?)?;
        assert_eq!(inferred.len(), 1);

        store.begin_transaction()?;
        let newly_visible = store.add_quad(&a, &p, &b, None, true)?;
        assert!(!newly_visible, "statement already existed as inferred");
        store.commit()?;

        let explicit = collect(store.quads_filtered(
            Some(&a),
            None,
            None,
            ContextMatch::Any,
            Some(true),
        )?)?;
        assert_eq!(explicit.len(), 1, "statement must now read as explicit");
        let inferred = collect(store.quads_filtered(
            Some(&a),
            None,
            None,
            ContextMatch::Any,
            Some(false),
        )?)?;
        assert!(inferred.is_empty());
        store.close()?;
    }

    let store = QuadStore::open(dir.path(), StoreConfig::default())?;
    let explicit = collect(store.quads_filtered(
        Some(&a),
        None,
        None,
        ContextMatch::Any,
        Some(true),
    )?)?;
    assert_eq!(explicit.len(), 1, "explicit status must survive a restart");
    Ok(())
}

#[test]
fn remove_with_wildcard_predicate_and_bound_context() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let mut store = QuadStore::open(dir.path(), StoreConfig::default())?;
    let graph = ex("g");
    store.begin_transaction()?;
    for (pred, obj) in [("p1", "x"), ("p2", "y"), ("p3", "z")] {
        store.add_quad(&ex("a"), &ex(pred), &ex(obj), Some(&graph), true)?;
    }
    store.add_quad(&ex("a"), &ex("p1"), &ex("elsewhere"), None, true)?;
    store.commit()?;
    let visible_before = collect(store.quads(None, None, None, ContextMatch::Any)?)?.len();

    store.begin_transaction()?;
    let counts = store.remove_quads(None, None, None, ContextMatch::Named(&graph), None)?;
    let total: u64 = counts.iter().map(|(_, n)| n).sum();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].0.as_ref(), Some(&graph));
    store.commit()?;

    let visible_after = collect(store.quads(None, None, None, ContextMatch::Any)?)?.len();
    assert_eq!(
        visible_before - visible_after,
        total as usize,
        "count map must sum to the number of records the commit deleted"
    );
    assert!(store.contexts().is_empty());
    Ok(())
}

#[test]
fn transactional_visibility_of_uncommitted_changes() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let mut store = QuadStore::open(dir.path(), StoreConfig::default())?;
    store.begin_transaction()?;
    store.add_quad(&ex("a"), &ex("p"), &ex("b"), None, true)?;
    // Inside the transaction the addition is visible.
    let inside = collect(store.quads(Some(&ex("a")), None, None, ContextMatch::Any)?)?;
    assert_eq!(inside.len(), 1);
    store.rollback()?;
    let after = collect(store.quads(Some(&ex("a")), None, None, ContextMatch::Any)?)?;
    assert!(after.is_empty());
    Ok(())
}

#[test]
fn cardinality_estimates_follow_the_data() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let mut store = QuadStore::open(dir.path(), StoreConfig::default())?;
    store.begin_transaction()?;
    for i in 0..50 {
        store.add_quad(&ex("s"), &ex("p"), &ex(&format!("o{i}")), None, true)?;
    }
    store.add_quad(&ex("other"), &ex("q"), &ex("o"), None, true)?;
    store.commit()?;

    assert_eq!(
        store.estimate_cardinality(None, None, None, ContextMatch::Any)?,
        51
    );
    assert_eq!(
        store.estimate_cardinality(Some(&ex("s")), Some(&ex("p")), None, ContextMatch::Any)?,
        50
    );
    assert_eq!(store.stats().quads, 51);
    Ok(())
}

#[test]
fn clear_removes_statements_but_keeps_namespaces() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let mut store = QuadStore::open(dir.path(), StoreConfig::default())?;
    store.set_namespace("ex", "http://example.com/ns#");
    store.begin_transaction()?;
    store.add_quad(&ex("a"), &ex("p"), &ex("b"), Some(&ex("g")), true)?;
    store.commit()?;

    store.begin_transaction()?;
    let removed = store.clear()?;
    assert_eq!(removed, 1);
    store.commit()?;

    assert_eq!(store.stats().quads, 0);
    assert!(store.contexts().is_empty());
    assert_eq!(store.get_namespace("ex"), Some("http://example.com/ns#"));
    Ok(())
}
