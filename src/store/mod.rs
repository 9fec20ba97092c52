//! The disk-resident quad store and its component subsystems.
//!
//! [`QuadStore`] composes the term interner ([`ValueStore`]), the indexed
//! record store ([`TripleStore`]) and the small namespace/context tables
//! into the engine's upward interface: term-level quad mutation and
//! pattern iteration inside single-writer transactions.

pub mod context_store;
pub mod data_store;
pub mod namespace_store;
pub mod record_cache;
pub mod triple_store;
pub mod txn_status;
pub mod value_store;
pub mod wal;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::index::{context_id, object_id, predicate_id, subject_id, QuadPattern, Record};
use crate::model::{Iri, Term, ValueId, DEFAULT_GRAPH_ID};

use context_store::{ContextKey, ContextStore};
use namespace_store::NamespaceStore;
use triple_store::{RecordIter, TripleStore};
use value_store::ValueStore;

/// A materialized quad: three terms plus an optional named-graph context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quad {
    /// The subject resource.
    pub subject: Term,
    /// The predicate IRI.
    pub predicate: Term,
    /// The object term.
    pub object: Term,
    /// The named graph, or `None` for the default graph.
    pub context: Option<Term>,
}

/// Context position of a quad pattern.
#[derive(Debug, Clone, Copy, Default)]
pub enum ContextMatch<'a> {
    /// Any graph, named or default.
    #[default]
    Any,
    /// Only the default graph.
    DefaultGraph,
    /// Only the given named graph.
    Named(&'a Term),
}

/// Whether a transaction runs against the snapshot layer or the store
/// directly. Direct transactions must exclude all isolated ones and vice
/// versa; the [`IsolationGate`] enforces the mode switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Runs under snapshot isolation; may run concurrently with other
    /// isolated transactions.
    Isolated,
    /// Bypasses isolation and touches the store directly; runs exclusively
    /// with respect to every isolated transaction.
    Direct,
}

#[derive(Default)]
struct GateState {
    isolated: usize,
    direct: usize,
}

/// Mutually exclusive mode switch between isolated and direct transactions.
///
/// Each mode keeps a counter of active transactions; the mode can only flip
/// once the other counter has drained to zero.
pub struct IsolationGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl IsolationGate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState::default()),
            cond: Condvar::new(),
        })
    }

    fn acquire(self: &Arc<Self>, mode: TransactionMode) -> ModeGuard {
        let mut state = self.state.lock();
        match mode {
            TransactionMode::Isolated => {
                while state.direct > 0 {
                    self.cond.wait(&mut state);
                }
                state.isolated += 1;
            }
            TransactionMode::Direct => {
                while state.isolated > 0 {
                    self.cond.wait(&mut state);
                }
                state.direct += 1;
            }
        }
        ModeGuard {
            gate: Arc::clone(self),
            mode,
        }
    }
}

/// Holds the store in one transaction mode; dropping it releases the slot.
pub struct ModeGuard {
    gate: Arc<IsolationGate>,
    mode: TransactionMode,
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        match self.mode {
            TransactionMode::Isolated => state.isolated -= 1,
            TransactionMode::Direct => state.direct -= 1,
        }
        self.gate.cond.notify_all();
    }
}

/// Point-in-time size figures used for query-plan costing.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    /// Estimated number of stored quads.
    pub quads: u64,
    /// Number of interned values and namespaces.
    pub values: u64,
    /// Number of distinct named graphs.
    pub contexts: u64,
}

/// Iterator resolving matched records back to terms.
pub struct QuadIter<'a> {
    records: RecordIter,
    value_store: &'a ValueStore,
}

impl Iterator for QuadIter<'_> {
    type Item = Result<Quad>;

    fn next(&mut self) -> Option<Self::Item> {
        let rec = self.records.next()?;
        Some(self.resolve(&rec))
    }
}

impl QuadIter<'_> {
    fn resolve(&self, rec: &Record) -> Result<Quad> {
        let term = |id: ValueId| -> Result<Term> {
            self.value_store
                .get_value(id)?
                .ok_or_else(|| StoreError::Corruption(format!("record references unknown id {id}")))
        };
        let context = match context_id(rec) {
            DEFAULT_GRAPH_ID => None,
            id => Some(term(id)?),
        };
        Ok(Quad {
            subject: term(subject_id(rec))?,
            predicate: term(predicate_id(rec))?,
            object: term(object_id(rec))?,
            context,
        })
    }
}

/// The disk-resident, indexed RDF quad store.
pub struct QuadStore {
    dir: PathBuf,
    value_store: ValueStore,
    triple_store: TripleStore,
    namespace_store: NamespaceStore,
    context_store: ContextStore,
    gate: Arc<IsolationGate>,
    txn_active: bool,
    pending_context_deltas: HashMap<ContextKey, i64>,
}

impl QuadStore {
    /// Opens (creating if needed) a store in `dir`.
    pub fn open(dir: impl Into<PathBuf>, config: StoreConfig) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let value_store = ValueStore::open(&dir, &config)?;
        let triple_store = TripleStore::open(&dir, &config)?;
        let namespace_store = NamespaceStore::open(&dir)?;
        let (mut context_store, needs_rebuild) = ContextStore::open(&dir)?;
        if needs_rebuild {
            rebuild_context_store(&triple_store, &value_store, &mut context_store)?;
            context_store.sync()?;
        }
        info!(dir = %dir.display(), quads = triple_store.count_estimate(), "quad_store.open");
        Ok(Self {
            dir,
            value_store,
            triple_store,
            namespace_store,
            context_store,
            gate: IsolationGate::new(),
            txn_active: false,
            pending_context_deltas: HashMap::new(),
        })
    }

    /// The store's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claims a transaction-mode slot, blocking until the other mode drains.
    pub fn transaction_mode_lock(&self, mode: TransactionMode) -> ModeGuard {
        self.gate.acquire(mode)
    }

    /// Starts the single writer transaction.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.txn_active {
            return Err(StoreError::InvalidArgument(
                "a transaction is already active".to_owned(),
            ));
        }
        self.triple_store.start_transaction()?;
        self.txn_active = true;
        Ok(())
    }

    /// Commits the active transaction. Value data and the write-ahead log
    /// are made durable before the index commit begins.
    pub fn commit(&mut self) -> Result<()> {
        self.require_txn()?;
        self.value_store.sync()?;
        self.namespace_store.sync()?;
        self.triple_store.commit()?;
        let deltas = std::mem::take(&mut self.pending_context_deltas);
        for (key, delta) in deltas {
            if delta > 0 {
                for _ in 0..delta {
                    self.context_store.increment(key.clone());
                }
            } else if delta < 0 {
                self.context_store.decrement_by(&key, -delta);
            }
        }
        self.context_store.sync()?;
        self.txn_active = false;
        Ok(())
    }

    /// Rolls the active transaction back, discarding its context deltas.
    pub fn rollback(&mut self) -> Result<()> {
        self.require_txn()?;
        self.pending_context_deltas.clear();
        self.triple_store.rollback()?;
        self.txn_active = false;
        Ok(())
    }

    /// Adds one quad. Returns true when the statement was not already
    /// visible. `explicit` distinguishes asserted from inferred statements.
    pub fn add_quad(
        &mut self,
        subject: &Term,
        predicate: &Term,
        object: &Term,
        context: Option<&Term>,
        explicit: bool,
    ) -> Result<bool> {
        self.require_txn()?;
        if !subject.is_resource() {
            return Err(StoreError::InvalidArgument(
                "subject must be an IRI or blank node".to_owned(),
            ));
        }
        if !matches!(predicate, Term::Iri(_)) {
            return Err(StoreError::InvalidArgument(
                "predicate must be an IRI".to_owned(),
            ));
        }
        if let Some(ctx) = context {
            if !ctx.is_resource() {
                return Err(StoreError::InvalidArgument(
                    "context must be an IRI or blank node".to_owned(),
                ));
            }
        }

        let subj_id = self.value_store.store_value(subject)?;
        let pred_id = self.value_store.store_value(predicate)?;
        let obj_id = self.value_store.store_value(object)?;
        let ctx_id = match context {
            Some(ctx) => self.value_store.store_value(ctx)?,
            None => DEFAULT_GRAPH_ID,
        };

        let added = self
            .triple_store
            .store_triple(subj_id, pred_id, obj_id, ctx_id, explicit)?;
        if added {
            if let Some(ctx) = context {
                if let Some(key) = context_key(ctx) {
                    *self.pending_context_deltas.entry(key).or_insert(0) += 1;
                }
            }
        }
        Ok(added)
    }

    /// Flags every quad matching the pattern as removed, returning per-
    /// context removal counts (`None` keys the default graph). `explicit`
    /// restricts the sweep to asserted (`Some(true)`) or inferred
    /// (`Some(false)`) statements.
    pub fn remove_quads(
        &mut self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        context: ContextMatch<'_>,
        explicit: Option<bool>,
    ) -> Result<Vec<(Option<Term>, u64)>> {
        self.require_txn()?;
        let Some(pattern) = self.resolve_pattern(subject, predicate, object, context)? else {
            return Ok(Vec::new());
        };
        let counts = self
            .triple_store
            .remove_triples_by_context(&pattern, explicit)?;

        let mut resolved = Vec::with_capacity(counts.len());
        for (ctx_id, count) in counts {
            let term = match ctx_id {
                DEFAULT_GRAPH_ID => None,
                id => Some(self.value_store.get_value(id)?.ok_or_else(|| {
                    StoreError::Corruption(format!("record references unknown context {id}"))
                })?),
            };
            if let Some(term) = &term {
                if let Some(key) = context_key(term) {
                    *self.pending_context_deltas.entry(key).or_insert(0) -= count as i64;
                }
            }
            resolved.push((term, count));
        }
        Ok(resolved)
    }

    /// Iterates quads matching the pattern, both explicit and inferred.
    pub fn quads(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        context: ContextMatch<'_>,
    ) -> Result<QuadIter<'_>> {
        self.quads_filtered(subject, predicate, object, context, None)
    }

    /// Iterates quads matching the pattern, optionally restricted to
    /// explicit (`Some(true)`) or inferred (`Some(false)`) statements.
    pub fn quads_filtered(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        context: ContextMatch<'_>,
        explicit: Option<bool>,
    ) -> Result<QuadIter<'_>> {
        let records = match self.resolve_pattern(subject, predicate, object, context)? {
            Some(pattern) => match explicit {
                None => self.triple_store.triples(&pattern, self.txn_active),
                Some(explicit) => {
                    self.triple_store
                        .triples_explicit(&pattern, explicit, self.txn_active)
                }
            },
            None => RecordIter::empty(),
        };
        Ok(QuadIter {
            records,
            value_store: &self.value_store,
        })
    }

    /// Estimated number of quads matching the pattern, for query costing.
    pub fn estimate_cardinality(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        context: ContextMatch<'_>,
    ) -> Result<u64> {
        match self.resolve_pattern(subject, predicate, object, context)? {
            Some(pattern) => Ok(self.triple_store.cardinality(&pattern)),
            None => Ok(0),
        }
    }

    /// The distinct named graphs and their statement counts.
    pub fn contexts(&self) -> Vec<(Term, i64)> {
        self.context_store
            .iter()
            .map(|(key, count)| {
                let term = if key.is_iri {
                    Term::Iri(Iri::parse(key.text.clone()))
                } else {
                    Term::bnode(key.text.clone())
                };
                (term, count)
            })
            .collect()
    }

    /// Binds `prefix` to a namespace name.
    pub fn set_namespace(&mut self, prefix: &str, name: &str) {
        self.namespace_store.set_namespace(prefix, name);
    }

    /// The namespace name bound to `prefix`.
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        self.namespace_store.get_namespace(prefix)
    }

    /// Removes the binding for `prefix`.
    pub fn remove_namespace(&mut self, prefix: &str) {
        self.namespace_store.remove_namespace(prefix);
    }

    /// Iterates (prefix, name) bindings.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespace_store.iter()
    }

    /// Size figures for query costing.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            quads: self.triple_store.count_estimate(),
            values: self.value_store_max_id(),
            contexts: self.context_store.len() as u64,
        }
    }

    /// Walks the value store verifying that every id decodes to a term that
    /// maps back to the same id.
    pub fn check_consistency(&self) -> Result<()> {
        self.value_store.check_consistency()
    }

    /// Removes every statement, explicit and inferred, through the normal
    /// transactional path. Interned values and namespace bindings survive.
    pub fn clear(&mut self) -> Result<u64> {
        let removed = self.remove_quads(None, None, None, ContextMatch::Any, None)?;
        Ok(removed.iter().map(|(_, n)| n).sum())
    }

    /// Flushes every component.
    pub fn sync(&mut self) -> Result<()> {
        self.value_store.sync()?;
        self.namespace_store.sync()?;
        self.context_store.sync()?;
        self.triple_store.sync()
    }

    /// Flushes and releases every component. The store is unusable after.
    pub fn close(&mut self) -> Result<()> {
        self.namespace_store.close()?;
        self.context_store.close()?;
        self.triple_store.close()?;
        self.value_store.close()?;
        debug!(dir = %self.dir.display(), "quad_store.closed");
        Ok(())
    }

    fn value_store_max_id(&self) -> u64 {
        // The data store ids are dense, so max id doubles as a count.
        u64::from(self.value_store.max_id())
    }

    fn require_txn(&self) -> Result<()> {
        if self.txn_active {
            Ok(())
        } else {
            Err(StoreError::InvalidArgument(
                "no active transaction".to_owned(),
            ))
        }
    }

    /// Resolves pattern terms to ids. `None` means a bound term is not
    /// interned, so nothing can match.
    fn resolve_pattern(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        context: ContextMatch<'_>,
    ) -> Result<Option<QuadPattern>> {
        let mut pattern = QuadPattern::any();
        for (term, slot) in [
            (subject, &mut pattern.subj),
            (predicate, &mut pattern.pred),
            (object, &mut pattern.obj),
        ] {
            if let Some(term) = term {
                match self.value_store.get_id(term)? {
                    Some(id) => *slot = Some(id),
                    None => return Ok(None),
                }
            }
        }
        pattern.ctx = match context {
            ContextMatch::Any => None,
            ContextMatch::DefaultGraph => Some(DEFAULT_GRAPH_ID),
            ContextMatch::Named(term) => match self.value_store.get_id(term)? {
                Some(id) => Some(id),
                None => return Ok(None),
            },
        };
        Ok(Some(pattern))
    }
}

fn context_key(term: &Term) -> Option<ContextKey> {
    match term {
        Term::Iri(iri) => Some(ContextKey::iri(iri.as_string())),
        Term::BNode(bnode) => Some(ContextKey::bnode(bnode.id())),
        _ => None,
    }
}

/// Re-derives the context counts from a full scan of the triple store, the
/// recovery path when the persisted table is missing or damaged.
fn rebuild_context_store(
    triple_store: &TripleStore,
    value_store: &ValueStore,
    context_store: &mut ContextStore,
) -> Result<()> {
    debug!("context_store.rebuild_from_scan");
    let records: Vec<Record> = match triple_store.all_triples_sorted_by_context(false) {
        Some(iter) => iter.collect(),
        None => triple_store.triples(&QuadPattern::any(), false).collect(),
    };
    let mut counts = std::collections::BTreeMap::new();
    for rec in records {
        let ctx_id = context_id(&rec);
        if ctx_id == DEFAULT_GRAPH_ID {
            continue;
        }
        let term = value_store.get_value(ctx_id)?.ok_or_else(|| {
            StoreError::Corruption(format!("record references unknown context {ctx_id}"))
        })?;
        if let Some(key) = context_key(&term) {
            *counts.entry(key).or_insert(0i64) += 1;
        }
    }
    context_store.replace_all(counts);
    Ok(())
}
