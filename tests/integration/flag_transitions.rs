#![allow(missing_docs)]

//! Model-based check of the transaction-flag protocol: a plain in-memory
//! model of "visible statements with explicit status" must agree with the
//! store after every commit and rollback, for arbitrary operation
//! sequences over a small statement universe.

use proptest::prelude::*;
use quadstore::config::StoreConfig;
use quadstore::index::{
    context_id, object_id, predicate_id, record_flags, subject_id, QuadPattern,
};
use quadstore::store::triple_store::{TripleStore, EXPLICIT_FLAG};
use std::collections::BTreeMap;
use tempfile::tempdir;

type Statement = (u32, u32, u32, u32);

#[derive(Debug, Clone)]
enum Op {
    Add { stmt: Statement, explicit: bool },
    Remove { subj: Option<u32>, pred: Option<u32> },
    Commit,
    Rollback,
}

fn stmt_strategy() -> impl Strategy<Value = Statement> {
    (1..4u32, 1..3u32, 1..4u32, 0..2u32)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (stmt_strategy(), any::<bool>()).prop_map(|(stmt, explicit)| Op::Add { stmt, explicit }),
        2 => (proptest::option::of(1..4u32), proptest::option::of(1..3u32))
            .prop_map(|(subj, pred)| Op::Remove { subj, pred }),
        1 => Just(Op::Commit),
        1 => Just(Op::Rollback),
    ]
}

/// Predicted post-commit state plus the per-transaction memory the flag
/// protocol keeps for statements first added inside the transaction.
#[derive(Default, Clone)]
struct Model {
    /// Committed statements and their explicit status.
    base: BTreeMap<Statement, bool>,
    /// Statements as they will exist after commit.
    visible: BTreeMap<Statement, bool>,
    /// Statements added in this transaction; their explicit bit survives a
    /// remove-then-re-add inside the same transaction.
    added_this_txn: BTreeMap<Statement, bool>,
}

impl Model {
    fn add(&mut self, stmt: Statement, explicit: bool) {
        if let Some(bit) = self.added_this_txn.get_mut(&stmt) {
            *bit = *bit || explicit;
            self.visible.insert(stmt, *bit);
        } else if self.base.contains_key(&stmt) {
            match self.visible.get_mut(&stmt) {
                // A present committed statement is never downgraded.
                Some(e) => *e = *e || explicit,
                // Removed this transaction: resurrected with the requested
                // status.
                None => {
                    self.visible.insert(stmt, explicit);
                }
            }
        } else {
            self.added_this_txn.insert(stmt, explicit);
            self.visible.insert(stmt, explicit);
        }
    }

    fn remove(&mut self, subj: Option<u32>, pred: Option<u32>) -> u64 {
        let matching: Vec<Statement> = self
            .visible
            .keys()
            .filter(|(s, p, _, _)| {
                subj.map_or(true, |v| v == *s) && pred.map_or(true, |v| v == *p)
            })
            .copied()
            .collect();
        for stmt in &matching {
            self.visible.remove(stmt);
        }
        matching.len() as u64
    }

    fn commit(&mut self) {
        self.base = self.visible.clone();
        self.added_this_txn.clear();
    }

    fn rollback(&mut self) {
        self.visible = self.base.clone();
        self.added_this_txn.clear();
    }
}

fn store_state(store: &TripleStore) -> BTreeMap<Statement, bool> {
    store
        .triples(&QuadPattern::any(), false)
        .map(|rec| {
            (
                (
                    subject_id(&rec),
                    predicate_id(&rec),
                    object_id(&rec),
                    context_id(&rec),
                ),
                record_flags(&rec) & EXPLICIT_FLAG != 0,
            )
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn store_agrees_with_the_model(ops in proptest::collection::vec(op_strategy(), 1..50)) {
        let dir = tempdir().expect("tmpdir");
        let mut store = TripleStore::open(dir.path(), &StoreConfig::default()).unwrap();
        let mut model = Model::default();
        let mut in_txn = false;

        for op in &ops {
            match op {
                Op::Add { stmt, explicit } => {
                    if !in_txn {
                        store.start_transaction().unwrap();
                        in_txn = true;
                    }
                    let (s, p, o, c) = *stmt;
                    let reported_new = store.store_triple(s, p, o, c, *explicit).unwrap();
                    prop_assert_eq!(reported_new, !model.visible.contains_key(stmt));
                    model.add(*stmt, *explicit);
                }
                Op::Remove { subj, pred } => {
                    if !in_txn {
                        store.start_transaction().unwrap();
                        in_txn = true;
                    }
                    let pattern = QuadPattern {
                        subj: *subj,
                        pred: *pred,
                        ..QuadPattern::any()
                    };
                    let counts = store.remove_triples_by_context(&pattern, None).unwrap();
                    let removed: u64 = counts.values().sum();
                    prop_assert_eq!(removed, model.remove(*subj, *pred));
                }
                Op::Commit => {
                    if in_txn {
                        store.commit().unwrap();
                        in_txn = false;
                        model.commit();
                        prop_assert_eq!(&store_state(&store), &model.base);
                    }
                }
                Op::Rollback => {
                    if in_txn {
                        store.rollback().unwrap();
                        in_txn = false;
                        model.rollback();
                        prop_assert_eq!(&store_state(&store), &model.base);
                    }
                }
            }
        }

        if in_txn {
            store.commit().unwrap();
            model.commit();
        }
        prop_assert_eq!(&store_state(&store), &model.base);
        store.close().unwrap();
    }
}
