#![allow(missing_docs)]

//! Interning behavior of the value store across process restarts.

use quadstore::config::StoreConfig;
use quadstore::error::Result;
use quadstore::model::{Iri, Literal, Term};
use quadstore::store::value_store::{ValueEntry, ValueStore};
use tempfile::tempdir;

const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";

#[test]
fn typed_literal_ids_are_stable_across_restart() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let literal = || Term::Literal(Literal::typed("42", Iri::parse(XSD_INT)));
    let id;
    {
        let mut store = ValueStore::open(dir.path(), &StoreConfig::default())?;
        id = store.store_value(&literal())?;
        assert_eq!(store.store_value(&literal())?, id, "double store, one id");
        store.close()?;
    }
    let store = ValueStore::open(dir.path(), &StoreConfig::default())?;
    // A freshly constructed equal literal resolves to the original id.
    assert_eq!(store.get_id(&literal())?, Some(id));
    assert_eq!(store.get_value(id)?.as_ref(), Some(&literal()));
    Ok(())
}

#[test]
fn iris_share_interned_namespaces() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let store = ValueStore::open(dir.path(), &StoreConfig::default())?;
    store.store_value(&Term::iri("http://example.com/ns#a"))?;
    store.store_value(&Term::iri("http://example.com/ns#b"))?;
    store.store_value(&Term::iri("http://example.com/ns#c"))?;

    let mut namespaces = 0;
    for id in 1..=store.max_id() {
        if let Some(ValueEntry::Namespace(ns)) = store.entry(id)? {
            assert_eq!(ns, "http://example.com/ns#");
            namespaces += 1;
        }
    }
    assert_eq!(namespaces, 1, "one namespace entry for three IRIs");
    Ok(())
}

#[test]
fn distinct_terms_get_distinct_ids() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let store = ValueStore::open(dir.path(), &StoreConfig::default())?;
    let terms = [
        Term::iri("http://example.com/ns#x"),
        Term::bnode("x"),
        Term::Literal(Literal::plain("x")),
        Term::Literal(Literal::tagged("x", "en")),
        Term::Literal(Literal::typed("x", Iri::parse(XSD_INT))),
    ];
    let mut ids = Vec::new();
    for term in &terms {
        ids.push(store.store_value(term)?);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), terms.len(), "lexically equal terms of different kinds must not collide");
    Ok(())
}

#[test]
fn get_id_does_not_mint() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let store = ValueStore::open(dir.path(), &StoreConfig::default())?;
    assert_eq!(store.get_id(&Term::iri("http://example.com/ns#nope"))?, None);
    assert_eq!(store.max_id(), 0, "lookup of an unknown term must not store anything");
    Ok(())
}

#[test]
fn consistency_check_passes_after_restart() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    {
        let mut store = ValueStore::open(dir.path(), &StoreConfig::default())?;
        for i in 0..50 {
            store.store_value(&Term::iri(format!("http://example.com/ns#r{i}")))?;
            store.store_value(&Term::Literal(Literal::plain(format!("label {i}"))))?;
        }
        store.close()?;
    }
    let store = ValueStore::open(dir.path(), &StoreConfig::default())?;
    store.check_consistency()
}
