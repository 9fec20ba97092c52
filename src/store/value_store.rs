//! Bidirectional mapping between RDF terms and integer ids.
//!
//! Terms are encoded to tagged byte patterns and interned through the
//! content-addressed [`DataStore`]; namespace strings share the id space,
//! stored untagged. Lookups run through bounded caches in both directions.
//! A store-wide revision counter invalidates every cached id when the store
//! is cleared: a `(id, revision)` pair is only trusted while its revision
//! equals the store's current one.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, trace, warn};

use crate::cache::ConcurrentCache;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::model::{
    BNode, CorruptKind, CorruptValue, Iri, Literal, Term, ValueId, RDF_LANG_STRING, XSD_STRING,
};
use crate::store::data_store::DataStore;
use crate::store::wal::ValueStoreWal;

const FILENAME_PREFIX: &str = "values";

const URI_VALUE: u8 = 0x1;
const BNODE_VALUE: u8 = 0x2;
const LITERAL_VALUE: u8 = 0x3;

/// Datatype-field sentinel used by the legacy plain-literal encoding.
const NO_DATATYPE_ID: ValueId = ValueId::MAX;

/// An id annotated with the revision it was minted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedId {
    id: ValueId,
    revision: u64,
}

/// A raw interned entry: a term, or a namespace string (stored untagged).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueEntry {
    /// A stored RDF term.
    Term(Term),
    /// An interned namespace string.
    Namespace(String),
}

/// File-backed term interner with revision-checked caches.
pub struct ValueStore {
    data_store: DataStore,
    wal: ValueStoreWal,
    revision: AtomicU64,
    lock: RwLock<()>,
    soft_fail: bool,
    value_cache: ConcurrentCache<ValueId, Term>,
    value_id_cache: ConcurrentCache<Vec<u8>, CachedId>,
    namespace_cache: ConcurrentCache<ValueId, String>,
    namespace_id_cache: ConcurrentCache<String, CachedId>,
}

impl ValueStore {
    /// Opens the value store inside `dir`.
    pub fn open(dir: &Path, config: &StoreConfig) -> Result<Self> {
        let data_store = DataStore::open(dir, FILENAME_PREFIX, config.force_sync)?;
        let wal = ValueStoreWal::open(dir, &config.wal)?;
        debug!(values = data_store.max_id(), "value_store.open");
        Ok(Self {
            data_store,
            wal,
            revision: AtomicU64::new(1),
            lock: RwLock::new(()),
            soft_fail: config.soft_fail_on_corrupt_data,
            value_cache: ConcurrentCache::new(config.value_cache_size),
            value_id_cache: ConcurrentCache::new(config.value_id_cache_size),
            namespace_cache: ConcurrentCache::new(config.namespace_cache_size),
            namespace_id_cache: ConcurrentCache::new(config.namespace_id_cache_size),
        })
    }

    /// The current id-assignment epoch. Bumped by [`ValueStore::clear`].
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// The highest assigned id; ids are dense, so this doubles as a count.
    pub fn max_id(&self) -> ValueId {
        self.data_store.max_id()
    }

    /// Takes the read lock that keeps ids stable across multiple calls;
    /// held read locks block [`ValueStore::clear`].
    pub fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    /// Resolves a previously obtained cached id, if it is still current.
    pub fn resolve_cached(&self, cached: CachedId) -> Option<ValueId> {
        (cached.revision == self.revision()).then_some(cached.id)
    }

    /// Looks up the id assigned to `term`, without minting.
    pub fn get_id(&self, term: &Term) -> Result<Option<ValueId>> {
        let mut encoded = self.term_to_data(term, false)?;
        if encoded.is_none() {
            if let Term::Literal(lit) = term {
                encoded = self.literal_to_legacy(lit)?;
            }
        }
        let Some(encoded) = encoded else {
            return Ok(None);
        };

        if let Some(cached) = self.value_id_cache.get(&encoded) {
            if let Some(id) = self.resolve_cached(cached) {
                trace!(id, "value_store.get_id.cache_hit");
                return Ok(Some(id));
            }
        }

        let mut id = self.data_store.get_id(&encoded)?;
        if id.is_none() {
            if let Term::Literal(lit) = term {
                if let Some(legacy) = self.literal_to_legacy(lit)? {
                    if legacy != encoded {
                        id = self.data_store.get_id(&legacy)?;
                    }
                }
            }
        }
        if let Some(id) = id {
            self.value_id_cache.put(
                encoded,
                CachedId {
                    id,
                    revision: self.revision(),
                },
            );
        }
        Ok(id)
    }

    /// Interns `term`, returning the existing id when its encoding is
    /// already stored. Callers must serialize minting: this is the store's
    /// only mutator and races its caches if run concurrently.
    pub fn store_value(&self, term: &Term) -> Result<ValueId> {
        if term.is_corrupt() {
            return Err(StoreError::InvalidArgument(
                "corrupt values cannot be stored".to_owned(),
            ));
        }
        let Some(encoded) = self.term_to_data(term, true)? else {
            return Err(StoreError::InvalidArgument(
                "term has no storable encoding".to_owned(),
            ));
        };

        if let Some(cached) = self.value_id_cache.get(&encoded) {
            if let Some(id) = self.resolve_cached(cached) {
                return Ok(id);
            }
        }

        let (id, fresh) = self.data_store.store_data(&encoded)?;
        if fresh {
            self.wal.record_value(id, term)?;
            trace!(id, "value_store.mint");
        }
        self.value_id_cache.put(
            encoded,
            CachedId {
                id,
                revision: self.revision(),
            },
        );
        Ok(id)
    }

    /// Decodes the term stored under `id`, or `None` for unassigned ids.
    ///
    /// With soft-fail enabled, undecodable records come back as
    /// [`Term::Corrupt`] instead of an error.
    pub fn get_value(&self, id: ValueId) -> Result<Option<Term>> {
        if let Some(term) = self.value_cache.get(&id) {
            return Ok(Some(term));
        }
        let Some(data) = self.data_store.get_data(id)? else {
            return Ok(None);
        };
        let term = match self.data_to_value(&data) {
            Ok(term) => term,
            Err(e) if self.soft_fail => {
                warn!(id, error = %e, "value_store.decode_failed.soft");
                Term::Corrupt(CorruptValue {
                    kind: guess_kind(&data),
                    raw: data,
                })
            }
            Err(e) => return Err(e),
        };
        self.value_cache.put(id, term.clone());
        Ok(Some(term))
    }

    /// Looks up (or with `create` mints) the id of a namespace string.
    pub fn get_namespace_id(&self, namespace: &str, create: bool) -> Result<Option<ValueId>> {
        if let Some(cached) = self.namespace_id_cache.get(&namespace.to_owned()) {
            if let Some(id) = self.resolve_cached(cached) {
                return Ok(Some(id));
            }
        }
        let data = namespace.as_bytes();
        let id = if create {
            let (id, fresh) = self.data_store.store_data(data)?;
            if fresh {
                self.wal.record_namespace(id, namespace)?;
                trace!(id, namespace = %namespace, "value_store.mint_namespace");
            }
            Some(id)
        } else {
            self.data_store.get_id(data)?
        };
        if let Some(id) = id {
            self.namespace_id_cache.put(
                namespace.to_owned(),
                CachedId {
                    id,
                    revision: self.revision(),
                },
            );
        }
        Ok(id)
    }

    /// The namespace string stored under `id`.
    pub fn get_namespace(&self, id: ValueId) -> Result<Option<String>> {
        if let Some(ns) = self.namespace_cache.get(&id) {
            return Ok(Some(ns));
        }
        let Some(data) = self.data_store.get_data(id)? else {
            return Ok(None);
        };
        let namespace = String::from_utf8(data)
            .map_err(|_| StoreError::Corruption(format!("namespace {id} is not valid UTF-8")))?;
        self.namespace_cache.put(id, namespace.clone());
        Ok(Some(namespace))
    }

    /// Wipes all interned values and caches and mints a new revision, making
    /// every previously issued id provably stale. Excludes readers holding
    /// the store's read lock.
    pub fn clear(&self) -> Result<()> {
        let _write = self.lock.write();
        self.data_store.clear()?;
        self.wal.reset()?;
        self.value_cache.clear();
        self.value_id_cache.clear();
        self.namespace_cache.clear();
        self.namespace_id_cache.clear();
        self.revision.fetch_add(1, Ordering::AcqRel);
        debug!(revision = self.revision(), "value_store.clear");
        Ok(())
    }

    /// Flushes the data files and the write-ahead log.
    pub fn sync(&self) -> Result<()> {
        self.data_store.sync()?;
        self.wal.sync()
    }

    /// Flushes and shuts down, draining the write-ahead log.
    pub fn close(&mut self) -> Result<()> {
        self.wal.close()?;
        self.data_store.close()
    }

    /// Decodes the raw entry stored under `id`, distinguishing terms from
    /// interned namespace strings. Intended for inspection tooling.
    pub fn entry(&self, id: ValueId) -> Result<Option<ValueEntry>> {
        let Some(data) = self.data_store.get_data(id)? else {
            return Ok(None);
        };
        if is_namespace_data(&data) {
            let namespace = String::from_utf8(data).map_err(|_| {
                StoreError::Corruption(format!("namespace {id} is not valid UTF-8"))
            })?;
            return Ok(Some(ValueEntry::Namespace(namespace)));
        }
        match self.data_to_value(&data) {
            Ok(term) => Ok(Some(ValueEntry::Term(term))),
            Err(e) if self.soft_fail => {
                warn!(id, error = %e, "value_store.decode_failed.soft");
                Ok(Some(ValueEntry::Term(Term::Corrupt(CorruptValue {
                    kind: guess_kind(&data),
                    raw: data,
                }))))
            }
            Err(e) => Err(e),
        }
    }

    /// Walks every id and verifies it decodes to a term whose canonical
    /// encoding maps back to the same id. A failure means the store holds
    /// duplicate entries it cannot repair itself; the remediation is a full
    /// export/import cycle.
    pub fn check_consistency(&self) -> Result<()> {
        let max_id = self.data_store.max_id();
        for id in 1..=max_id {
            let data = self
                .data_store
                .get_data(id)?
                .ok_or_else(|| StoreError::Corruption(format!("id {id} has no data")))?;
            if is_namespace_data(&data) {
                let namespace = String::from_utf8(data).map_err(|_| {
                    StoreError::Corruption(format!("namespace {id} is not valid UTF-8"))
                })?;
                let looks_absolute = namespace.contains(':');
                if self.get_namespace_id(&namespace, false)? != Some(id) || !looks_absolute {
                    return Err(StoreError::Corruption(format!(
                        "store must be manually exported and imported to fix namespaces like {namespace}"
                    )));
                }
            } else {
                let term = self.data_to_value(&data)?;
                if self.get_id(&term)? != Some(id) {
                    return Err(StoreError::Corruption(format!(
                        "store must be manually exported and imported to merge values like {term}"
                    )));
                }
            }
        }
        debug!(values = max_id, "value_store.check_consistency.ok");
        Ok(())
    }

    fn term_to_data(&self, term: &Term, create: bool) -> Result<Option<Vec<u8>>> {
        match term {
            Term::Iri(iri) => self.iri_to_data(iri, create),
            Term::BNode(bnode) => Ok(Some(bnode_to_data(bnode))),
            Term::Literal(lit) => self.literal_to_data(lit, create),
            Term::Corrupt(_) => Err(StoreError::InvalidArgument(
                "corrupt values have no canonical encoding".to_owned(),
            )),
        }
    }

    fn iri_to_data(&self, iri: &Iri, create: bool) -> Result<Option<Vec<u8>>> {
        let Some(ns_id) = self.get_namespace_id(iri.namespace(), create)? else {
            return Ok(None);
        };
        let local = iri.local_name().as_bytes();
        let mut data = Vec::with_capacity(5 + local.len());
        data.push(URI_VALUE);
        data.extend_from_slice(&ns_id.to_be_bytes());
        data.extend_from_slice(local);
        Ok(Some(data))
    }

    fn literal_to_data(&self, lit: &Literal, create: bool) -> Result<Option<Vec<u8>>> {
        let datatype = effective_datatype(lit);
        let datatype_id = if create {
            self.store_value(&Term::Iri(datatype))?
        } else {
            match self.get_id(&Term::Iri(datatype))? {
                Some(id) => id,
                None => return Ok(None),
            }
        };
        Ok(Some(encode_literal(
            lit.label(),
            lit.language(),
            datatype_id,
        )))
    }

    /// The pre-datatype encoding: `xsd:string` and `rdf:langString` literals
    /// were stored with the no-datatype sentinel.
    fn literal_to_legacy(&self, lit: &Literal) -> Result<Option<Vec<u8>>> {
        let datatype = effective_datatype(lit);
        let full = datatype.as_string();
        if full == XSD_STRING || full == RDF_LANG_STRING {
            return Ok(Some(encode_literal(
                lit.label(),
                lit.language(),
                NO_DATATYPE_ID,
            )));
        }
        self.literal_to_data(lit, false)
    }

    fn data_to_value(&self, data: &[u8]) -> Result<Term> {
        match data.first() {
            Some(&URI_VALUE) => self.data_to_iri(data).map(Term::Iri),
            Some(&BNODE_VALUE) => data_to_bnode(data).map(Term::BNode),
            Some(&LITERAL_VALUE) => self.data_to_literal(data).map(Term::Literal),
            Some(_) => Err(StoreError::Corruption(
                "namespace data cannot decode to a term".to_owned(),
            )),
            None => Err(StoreError::Corruption("empty value record".to_owned())),
        }
    }

    fn data_to_iri(&self, data: &[u8]) -> Result<Iri> {
        if data.len() < 5 {
            return Err(StoreError::Corruption("IRI record truncated".to_owned()));
        }
        let ns_id = u32::from_be_bytes(
            data[1..5]
                .try_into()
                .map_err(|_| StoreError::Corruption("IRI namespace id truncated".to_owned()))?,
        );
        let namespace = self
            .get_namespace(ns_id)?
            .ok_or_else(|| StoreError::Corruption(format!("IRI references unknown namespace {ns_id}")))?;
        let local = std::str::from_utf8(&data[5..])
            .map_err(|_| StoreError::Corruption("IRI local name is not valid UTF-8".to_owned()))?;
        Ok(Iri::from_parts(namespace, local))
    }

    fn data_to_literal(&self, data: &[u8]) -> Result<Literal> {
        if data.len() < 6 {
            return Err(StoreError::Corruption("literal record truncated".to_owned()));
        }
        let datatype_id = u32::from_be_bytes(
            data[1..5]
                .try_into()
                .map_err(|_| StoreError::Corruption("literal datatype id truncated".to_owned()))?,
        );
        let lang_len = data[5] as usize;
        if data.len() < 6 + lang_len {
            return Err(StoreError::Corruption(
                "literal language tag truncated".to_owned(),
            ));
        }
        let language = if lang_len > 0 {
            Some(
                std::str::from_utf8(&data[6..6 + lang_len])
                    .map_err(|_| {
                        StoreError::Corruption("literal language tag is not valid UTF-8".to_owned())
                    })?
                    .to_owned(),
            )
        } else {
            None
        };
        let label = std::str::from_utf8(&data[6 + lang_len..])
            .map_err(|_| StoreError::Corruption("literal label is not valid UTF-8".to_owned()))?
            .to_owned();

        let datatype = if datatype_id == NO_DATATYPE_ID {
            None
        } else {
            match self.get_value(datatype_id)? {
                Some(Term::Iri(iri)) => Some(iri),
                Some(other) => {
                    return Err(StoreError::Corruption(format!(
                        "literal datatype {datatype_id} is not an IRI: {other}"
                    )))
                }
                None => {
                    return Err(StoreError::Corruption(format!(
                        "literal references unknown datatype {datatype_id}"
                    )))
                }
            }
        };

        Ok(match (language, datatype) {
            (Some(lang), _) => Literal::tagged(label, lang),
            (None, Some(dt)) if dt.as_string() == XSD_STRING => Literal::plain(label),
            (None, Some(dt)) => Literal::typed(label, dt),
            (None, None) => Literal::plain(label),
        })
    }
}

/// A plain literal is `xsd:string`; a tagged one is `rdf:langString`.
fn effective_datatype(lit: &Literal) -> Iri {
    if lit.language().is_some() {
        Iri::parse(RDF_LANG_STRING)
    } else {
        match lit.datatype() {
            Some(dt) => dt.clone(),
            None => Iri::parse(XSD_STRING),
        }
    }
}

fn encode_literal(label: &str, language: Option<&str>, datatype_id: ValueId) -> Vec<u8> {
    let lang = language.unwrap_or("");
    let mut data = Vec::with_capacity(6 + lang.len() + label.len());
    data.push(LITERAL_VALUE);
    data.extend_from_slice(&datatype_id.to_be_bytes());
    data.push(lang.len() as u8);
    data.extend_from_slice(lang.as_bytes());
    data.extend_from_slice(label.as_bytes());
    data
}

fn bnode_to_data(bnode: &BNode) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + bnode.id().len());
    data.push(BNODE_VALUE);
    data.extend_from_slice(bnode.id().as_bytes());
    data
}

fn data_to_bnode(data: &[u8]) -> Result<BNode> {
    let id = std::str::from_utf8(&data[1..])
        .map_err(|_| StoreError::Corruption("blank node id is not valid UTF-8".to_owned()))?;
    Ok(BNode::new(id))
}

/// Namespace strings are stored untagged; anything whose first byte is not
/// a known tag is namespace data.
fn is_namespace_data(data: &[u8]) -> bool {
    !matches!(data.first(), Some(&URI_VALUE) | Some(&BNODE_VALUE) | Some(&LITERAL_VALUE))
}

fn guess_kind(data: &[u8]) -> CorruptKind {
    match data.first() {
        Some(&URI_VALUE) => CorruptKind::Iri,
        Some(&BNODE_VALUE) => CorruptKind::BNode,
        Some(&LITERAL_VALUE) => CorruptKind::Literal,
        _ => CorruptKind::Unknown,
    }
}
