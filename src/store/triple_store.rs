//! Indexed storage of quad records and the on-disk transaction protocol.
//!
//! Every configured permutation index receives the identical record for
//! each mutation; per-record transaction flags plus the persisted status
//! byte make commit and rollback idempotent, so an interrupted phase is
//! simply re-executed on the next open. Pattern reads pick the index whose
//! leading fields best match the bound pattern fields.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::index::{
    context_id, encode_record, record_flags, QuadPattern, Record, RecordIndex, RecordOrder,
    FLAG_OFF, RECORD_LEN,
};
use crate::model::ValueId;
use crate::store::record_cache::{InMemRecordCache, RecordCache, SortedRecordCache};
use crate::store::txn_status::{TxnStatus, TxnStatusFile};

/// Statement was explicitly asserted (not inferred).
pub const EXPLICIT_FLAG: u8 = 0x1;
/// Statement was added in the active transaction; invisible outside it.
pub const ADDED_FLAG: u8 = 0x2;
/// Statement was removed in the active transaction but is still present.
pub const REMOVED_FLAG: u8 = 0x4;
/// The explicit flag flips when the active transaction commits.
pub const TOGGLE_EXPLICIT_FLAG: u8 = 0x8;

const TXN_FLAGS: u8 = ADDED_FLAG | REMOVED_FLAG | TOGGLE_EXPLICIT_FLAG;

const PROPERTIES_FILE: &str = "triples.prop";
const VERSION_KEY: &str = "version";
const INDEXES_KEY: &str = "triple-indexes";
const SCHEME_VERSION: u32 = 1;

const DEFAULT_INDEXES: &str = "spoc,posc";

/// How many scratch records are stored between overflow checks during a
/// removal sweep.
const OVERFLOW_CHECK_INTERVAL: u64 = 1024;

/// Number of statements removed per physically affected context id.
pub type PerContextCounts = HashMap<ValueId, u64>;

/// Iterator over records, optionally filtered by explicit/inferred status.
pub struct RecordIter {
    inner: std::vec::IntoIter<Record>,
    filter: StatementFilter,
}

#[derive(Clone, Copy)]
enum StatementFilter {
    All,
    /// Keeps records whose committed view is explicit: `EXPLICIT ^ TOGGLE`.
    ExplicitOnly,
    /// Keeps records whose stored explicit flag is unset.
    ImplicitOnly,
}

impl RecordIter {
    /// An iterator over no records.
    pub fn empty() -> Self {
        Self {
            inner: Vec::new().into_iter(),
            filter: StatementFilter::All,
        }
    }
}

impl Iterator for RecordIter {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        for rec in self.inner.by_ref() {
            let flags = record_flags(&rec);
            let explicit = flags & EXPLICIT_FLAG != 0;
            let toggled = flags & TOGGLE_EXPLICIT_FLAG != 0;
            let keep = match self.filter {
                StatementFilter::All => true,
                StatementFilter::ExplicitOnly => explicit != toggled,
                StatementFilter::ImplicitOnly => !explicit,
            };
            if keep {
                return Some(rec);
            }
        }
        None
    }
}

struct TripleIndex {
    order: RecordOrder,
    index: RecordIndex,
}

impl TripleIndex {
    fn open(dir: &Path, spec: &str, force_sync: bool, delete_existing: bool) -> Result<Self> {
        let order = RecordOrder::parse(spec)?;
        let path = index_path(dir, spec);
        if delete_existing && path.exists() {
            fs::remove_file(&path)?;
        }
        let index = RecordIndex::open(path, order, force_sync)?;
        Ok(Self { order, index })
    }
}

fn index_path(dir: &Path, spec: &str) -> PathBuf {
    dir.join(format!("triples-{spec}.idx"))
}

/// The indexed quad store.
pub struct TripleStore {
    dir: PathBuf,
    force_sync: bool,
    remove_overflow_bytes: usize,
    indexes: Vec<TripleIndex>,
    txn_status: TxnStatusFile,
    txn_cache: Option<RecordCache>,
}

impl TripleStore {
    /// Opens the store in `dir`, creating it when absent, recovering any
    /// interrupted transaction, and reindexing when the configured index
    /// specification differs from the persisted one.
    pub fn open(dir: &Path, config: &StoreConfig) -> Result<Self> {
        let txn_status = TxnStatusFile::open(dir)?;
        let mut store = Self {
            dir: dir.to_owned(),
            force_sync: config.force_sync,
            remove_overflow_bytes: config.remove_overflow_bytes,
            indexes: Vec::new(),
            txn_status,
            txn_cache: None,
        };

        let prop_path = store.dir.join(PROPERTIES_FILE);
        let mut effective_spec;
        if !prop_path.exists() {
            let mut requested = parse_index_specs(&config.index_spec)?;
            if requested.is_empty() {
                debug!(indexes = DEFAULT_INDEXES, "triple_store.default_indexes");
                requested = parse_index_specs(DEFAULT_INDEXES)?;
            }
            store.init_indexes(&requested, config.soft_fail_on_corrupt_data)?;
            effective_spec = requested.join(",");
        } else {
            let props = load_properties(&prop_path)?;
            check_version(&props)?;
            let existing_spec = props
                .get(INDEXES_KEY)
                .ok_or_else(|| {
                    StoreError::Corruption(format!("{INDEXES_KEY} missing in {PROPERTIES_FILE}"))
                })?
                .clone();
            let existing = parse_index_specs(&existing_spec)?;
            if existing.is_empty() {
                return Err(StoreError::Corruption(format!(
                    "no {INDEXES_KEY} found in {PROPERTIES_FILE}"
                )));
            }
            store.init_indexes(&existing, config.soft_fail_on_corrupt_data)?;

            match store.txn_status.status()? {
                TxnStatus::None => trace!("triple_store.no_uncompleted_txn"),
                status => store.process_uncompleted_transaction(status)?,
            }

            let requested = parse_index_specs(&config.index_spec)?;
            effective_spec = existing_spec;
            if !requested.is_empty() && requested != existing {
                store.reindex(&existing, &requested)?;
                effective_spec = requested.join(",");
            }
        }

        store.store_properties(&prop_path, &effective_spec)?;
        Ok(store)
    }

    fn init_indexes(&mut self, specs: &[String], soft_fail: bool) -> Result<()> {
        for spec in specs {
            trace!(index = %spec, "triple_store.init_index");
            match TripleIndex::open(&self.dir, spec, self.force_sync, false) {
                Ok(index) => self.indexes.push(index),
                Err(e) if soft_fail => {
                    warn!(index = %spec, error = %e, "triple_store.index_init_failed.soft");
                }
                Err(e) => return Err(e),
            }
        }
        if self.indexes.is_empty() {
            return Err(StoreError::Corruption(
                "no usable triple indexes".to_owned(),
            ));
        }

        // An empty index next to non-empty siblings has lost data.
        let empty: Vec<usize> = self
            .indexes
            .iter()
            .enumerate()
            .filter(|(_, idx)| idx.index.count_estimate() == 0)
            .map(|(i, _)| i)
            .collect();
        if !empty.is_empty() && empty.len() < self.indexes.len() {
            if soft_fail {
                for i in empty.into_iter().rev() {
                    let dropped = self.indexes.remove(i);
                    warn!(index = %dropped.order.name(), "triple_store.dropping_empty_index");
                }
            } else {
                let name = self.indexes[empty[0]].order.name();
                return Err(StoreError::Corruption(format!(
                    "index '{name}' is unexpectedly empty while other indexes are not"
                )));
            }
        }
        Ok(())
    }

    fn process_uncompleted_transaction(&mut self, status: TxnStatus) -> Result<()> {
        match status {
            TxnStatus::Committing => {
                info!("triple_store.recovery.completing_commit");
                self.commit()?;
            }
            TxnStatus::RollingBack => {
                info!("triple_store.recovery.completing_rollback");
                self.rollback()?;
            }
            TxnStatus::Active => {
                info!("triple_store.recovery.rolling_back_unfinished_txn");
                self.rollback()?;
            }
            TxnStatus::Unknown => {
                info!("triple_store.recovery.rolling_back_unknown_status");
                self.rollback()?;
            }
            TxnStatus::None => {}
        }
        Ok(())
    }

    fn reindex(&mut self, current: &[String], requested: &[String]) -> Result<()> {
        let mut by_name: HashMap<String, TripleIndex> = self
            .indexes
            .drain(..)
            .map(|idx| (idx.order.name(), idx))
            .collect();

        for spec in requested {
            if by_name.contains_key(spec) {
                continue;
            }
            debug!(index = %spec, "triple_store.reindex.creating");
            let mut added = TripleIndex::open(&self.dir, spec, self.force_sync, true)?;
            let source = by_name
                .get(&current[0])
                .ok_or_else(|| StoreError::Corruption("reindex source index missing".to_owned()))?;
            for rec in source.index.scan_all() {
                added.index.insert(rec);
            }
            added.index.sync()?;
            by_name.insert(spec.clone(), added);
        }

        for spec in current {
            if requested.contains(spec) {
                continue;
            }
            if let Some(mut removed) = by_name.remove(spec) {
                removed.index.delete_files()?;
                debug!(index = %spec, "triple_store.reindex.deleted");
            }
        }

        for spec in requested {
            let index = by_name.remove(spec).ok_or_else(|| {
                StoreError::Corruption(format!("reindex lost track of index '{spec}'"))
            })?;
            self.indexes.push(index);
        }
        Ok(())
    }

    /// Records matching `pattern`, hiding uncommitted additions (or, inside
    /// a transaction, hiding records flagged removed).
    pub fn triples(&self, pattern: &QuadPattern, read_transaction: bool) -> RecordIter {
        let hide = if read_transaction { REMOVED_FLAG } else { ADDED_FLAG };
        self.triples_filtered(pattern, 0, hide, StatementFilter::All)
    }

    /// Records matching `pattern` restricted to explicit or inferred
    /// statements.
    pub fn triples_explicit(
        &self,
        pattern: &QuadPattern,
        explicit: bool,
        read_transaction: bool,
    ) -> RecordIter {
        let mut flags = 0u8;
        let mut flags_mask = 0u8;
        if read_transaction {
            flags_mask |= REMOVED_FLAG;
        } else {
            flags_mask |= ADDED_FLAG;
            if explicit {
                flags |= EXPLICIT_FLAG;
                flags_mask |= EXPLICIT_FLAG;
            }
        }
        let filter = if read_transaction && explicit {
            StatementFilter::ExplicitOnly
        } else if !explicit {
            StatementFilter::ImplicitOnly
        } else {
            StatementFilter::All
        };
        self.triples_filtered(pattern, flags, flags_mask, filter)
    }

    /// All records ordered by context, if a context-leading index exists.
    pub fn all_triples_sorted_by_context(&self, read_transaction: bool) -> Option<RecordIter> {
        let hide = if read_transaction { REMOVED_FLAG } else { ADDED_FLAG };
        let index = self
            .indexes
            .iter()
            .find(|idx| idx.order.leading_field() == crate::index::Field::Context)?;
        let pattern = QuadPattern::any();
        let records = index
            .index
            .scan(&pattern.search_key(0), &pattern.search_mask(hide));
        Some(RecordIter {
            inner: records.into_iter(),
            filter: StatementFilter::All,
        })
    }

    fn triples_filtered(
        &self,
        pattern: &QuadPattern,
        flags: u8,
        flags_mask: u8,
        filter: StatementFilter,
    ) -> RecordIter {
        let index = self.best_index(pattern);
        let key = pattern.search_key(flags);
        let mask = pattern.search_mask(flags_mask);
        let records = if index.order.pattern_score(pattern) > 0 {
            index
                .index
                .range(&pattern.min_record(), &pattern.max_record(), &key, &mask)
        } else {
            index.index.scan(&key, &mask)
        };
        RecordIter {
            inner: records.into_iter(),
            filter,
        }
    }

    fn best_index(&self, pattern: &QuadPattern) -> &TripleIndex {
        self.indexes
            .iter()
            .max_by_key(|idx| idx.order.pattern_score(pattern))
            .expect("a triple store always has at least one index")
    }

    /// Estimated number of records matching `pattern`, for query costing.
    pub fn cardinality(&self, pattern: &QuadPattern) -> u64 {
        let index = self.best_index(pattern);
        if index.order.pattern_score(pattern) == 0 {
            index.index.count_estimate()
        } else {
            index
                .index
                .range_count_estimate(&pattern.min_record(), &pattern.max_record())
        }
    }

    /// Estimated total record count.
    pub fn count_estimate(&self) -> u64 {
        self.indexes[0].index.count_estimate()
    }

    /// The configured index orders, primary first.
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.iter().map(|idx| idx.order.name()).collect()
    }

    /// Begins a transaction: persists the `Active` status and provisions a
    /// sorted record cache capped near 10% of the current store size.
    pub fn start_transaction(&mut self) -> Result<()> {
        self.txn_status
            .set_status(TxnStatus::Active, self.force_sync)?;
        let max_records = self.indexes[0].index.count_estimate() / 10;
        match &mut self.txn_cache {
            Some(cache) => {
                debug_assert_eq!(
                    cache.record_count(),
                    0,
                    "txn cache should have been cleared on commit or rollback"
                );
                cache.set_max_records(Some(max_records));
            }
            None => {
                let order = self.indexes[0].order;
                self.txn_cache = Some(RecordCache::Sorted(SortedRecordCache::new(
                    order,
                    Some(max_records),
                )));
            }
        }
        trace!(max_records, "triple_store.start_transaction");
        Ok(())
    }

    /// Stores one quad, computing the record's new flag byte from its
    /// current transaction state. Returns true when the statement becomes
    /// visible by this call (it did not exist, or was flagged removed).
    pub fn store_triple(
        &mut self,
        subj: ValueId,
        pred: ValueId,
        obj: ValueId,
        ctx: ValueId,
        explicit: bool,
    ) -> Result<bool> {
        if self.txn_cache.is_none() {
            return Err(StoreError::InvalidArgument(
                "no active transaction".to_owned(),
            ));
        }

        let mut data = encode_record(subj, pred, obj, ctx, 0);
        let stored = self.indexes[0].index.get(&data);
        let st_added;

        match stored {
            None => {
                data[FLAG_OFF] |= ADDED_FLAG;
                if explicit {
                    data[FLAG_OFF] |= EXPLICIT_FLAG;
                }
                st_added = true;
            }
            Some(stored_rec) => {
                // The statement exists; only its flags change. Each branch
                // below must stay invertible by rollback.
                let flags = record_flags(&stored_rec);
                let was_explicit = flags & EXPLICIT_FLAG != 0;
                let was_added = flags & ADDED_FLAG != 0;
                let was_removed = flags & REMOVED_FLAG != 0;
                let was_toggled = flags & TOGGLE_EXPLICIT_FLAG != 0;

                if was_added {
                    // Added in this transaction, invisible elsewhere; flags
                    // can be modified freely.
                    data[FLAG_OFF] |= ADDED_FLAG;
                    if explicit || was_explicit {
                        data[FLAG_OFF] |= EXPLICIT_FLAG;
                    }
                } else {
                    // Committed statement; the explicit flag must not change
                    // until commit.
                    if was_explicit {
                        data[FLAG_OFF] |= EXPLICIT_FLAG;
                    }
                    if explicit {
                        if !was_explicit {
                            // Inferred statement asserted as explicit.
                            data[FLAG_OFF] |= TOGGLE_EXPLICIT_FLAG;
                        }
                    } else if was_removed {
                        if was_explicit {
                            // Removed explicit statement re-added as inferred.
                            data[FLAG_OFF] |= TOGGLE_EXPLICIT_FLAG;
                        }
                    } else if was_toggled {
                        data[FLAG_OFF] |= TOGGLE_EXPLICIT_FLAG;
                    }
                }

                // Re-adding clears the removed flag, so the statement is new
                // to this transaction exactly when it was flagged removed.
                st_added = was_removed;
            }
        }

        if stored != Some(data) {
            for index in &mut self.indexes {
                index.index.insert(data);
            }
            if let Some(cache) = &mut self.txn_cache {
                cache.store_record(&data)?;
            }
        }
        Ok(st_added)
    }

    /// Flags every record matching `pattern` as removed, returning the
    /// number of affected statements per context id. `explicit` restricts
    /// the sweep to explicit (`Some(true)`) or inferred (`Some(false)`)
    /// statements.
    pub fn remove_triples_by_context(
        &mut self,
        pattern: &QuadPattern,
        explicit: Option<bool>,
    ) -> Result<PerContextCounts> {
        if self.txn_cache.is_none() {
            return Err(StoreError::InvalidArgument(
                "no active transaction".to_owned(),
            ));
        }
        let (flags, flags_mask) = match explicit {
            Some(true) => (EXPLICIT_FLAG, EXPLICIT_FLAG),
            Some(false) => (0, EXPLICIT_FLAG),
            None => (0, 0),
        };
        let matching: Vec<Record> = self
            .triples_filtered(pattern, flags, flags_mask, StatementFilter::All)
            .collect();

        let mut per_context = PerContextCounts::new();
        let mut scratch = RecordCache::InMem(InMemRecordCache::new());
        for mut rec in matching {
            if record_flags(&rec) & REMOVED_FLAG != 0 {
                continue;
            }
            rec[FLAG_OFF] |= REMOVED_FLAG;
            scratch.store_record(&rec)?;
            *per_context.entry(context_id(&rec)).or_insert(0) += 1;

            if scratch.record_count() % OVERFLOW_CHECK_INTERVAL == 0
                && matches!(scratch, RecordCache::InMem(_))
                && scratch.record_count() as usize * RECORD_LEN > self.remove_overflow_bytes
            {
                debug!("triple_store.remove.overflowing_scratch_to_disk");
                scratch.promote_to_disk(&self.dir)?;
            }
        }

        if let Some(cache) = &mut self.txn_cache {
            cache.store_records(&mut scratch)?;
        }
        for index in &mut self.indexes {
            for rec in scratch.records()? {
                index.index.insert(rec);
            }
        }
        scratch.discard();

        trace!(
            contexts = per_context.len(),
            removed = per_context.values().sum::<u64>(),
            "triple_store.remove"
        );
        Ok(per_context)
    }

    /// Applies the active transaction: removed records are deleted, added
    /// and toggled records lose their transient flags, then all indexes are
    /// flushed and the status returns to `None`. Safe to re-execute from a
    /// crash at any point after `Committing` persists.
    pub fn commit(&mut self) -> Result<()> {
        // Make the flagged records durable before declaring the commit, so
        // a crash between the two leaves every index replayable.
        self.sync()?;
        self.txn_status
            .set_status(TxnStatus::Committing, self.force_sync)?;

        // The cache is absent when recovering from a crashed commit.
        let valid_cache = self.txn_cache.as_ref().is_some_and(RecordCache::is_valid);
        let cached: Option<Vec<Record>> = if valid_cache {
            match &mut self.txn_cache {
                Some(cache) => Some(cache.records()?.collect()),
                None => None,
            }
        } else {
            None
        };

        for index in &mut self.indexes {
            let records = match &cached {
                Some(records) => records.clone(),
                None => index.index.scan_all(),
            };
            for mut rec in records {
                let flags = record_flags(&rec);
                let was_added = flags & ADDED_FLAG != 0;
                let was_removed = flags & REMOVED_FLAG != 0;
                let was_toggled = flags & TOGGLE_EXPLICIT_FLAG != 0;

                if was_removed {
                    index.index.remove(&rec);
                } else if was_added || was_toggled {
                    if was_toggled {
                        rec[FLAG_OFF] ^= EXPLICIT_FLAG;
                        rec[FLAG_OFF] &= !TOGGLE_EXPLICIT_FLAG;
                    }
                    if was_added {
                        rec[FLAG_OFF] &= !ADDED_FLAG;
                    }
                    index.index.insert(rec);
                }
            }
        }

        if let Some(cache) = &mut self.txn_cache {
            cache.clear()?;
        }
        self.sync()?;
        self.txn_status.set_status(TxnStatus::None, self.force_sync)?;
        debug!("triple_store.commit.done");
        Ok(())
    }

    /// Reverts the active transaction: added records are deleted, removed
    /// and toggled records get their transient flags cleared. Safe to
    /// re-execute from a crash at any point after `RollingBack` persists.
    pub fn rollback(&mut self) -> Result<()> {
        self.sync()?;
        self.txn_status
            .set_status(TxnStatus::RollingBack, self.force_sync)?;

        let valid_cache = self.txn_cache.as_ref().is_some_and(RecordCache::is_valid);
        let cached: Option<Vec<Record>> = if valid_cache {
            match &mut self.txn_cache {
                Some(cache) => Some(cache.records()?.collect()),
                None => None,
            }
        } else {
            None
        };

        for index in &mut self.indexes {
            let records = match &cached {
                Some(records) => records.clone(),
                None => index.index.scan_all(),
            };
            for mut rec in records {
                let flags = record_flags(&rec);
                let was_added = flags & ADDED_FLAG != 0;
                let was_removed = flags & REMOVED_FLAG != 0;
                let was_toggled = flags & TOGGLE_EXPLICIT_FLAG != 0;

                if was_added {
                    index.index.remove(&rec);
                } else if was_removed || was_toggled {
                    rec[FLAG_OFF] &= !TXN_FLAGS;
                    index.index.insert(rec);
                }
            }
        }

        if let Some(cache) = &mut self.txn_cache {
            cache.clear()?;
        }
        self.sync()?;
        self.txn_status.set_status(TxnStatus::None, self.force_sync)?;
        debug!("triple_store.rollback.done");
        Ok(())
    }

    /// Deletes every record from every index.
    pub fn clear(&mut self) -> Result<()> {
        for index in &mut self.indexes {
            index.index.clear();
        }
        self.sync()
    }

    /// Flushes every index, reporting the first failure after trying all.
    pub fn sync(&mut self) -> Result<()> {
        let mut first_error = None;
        for index in &mut self.indexes {
            if let Err(e) = index.index.sync() {
                warn!(index = %index.order.name(), error = %e, "triple_store.sync_failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flushes and releases every index and the transaction cache.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for index in &mut self.indexes {
            if let Err(e) = index.index.close() {
                warn!(index = %index.order.name(), error = %e, "triple_store.close_failed");
                first_error.get_or_insert(e);
            }
        }
        if let Some(cache) = self.txn_cache.take() {
            cache.discard();
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn parse_index_specs(spec: &str) -> Result<Vec<String>> {
    let mut specs = Vec::new();
    for token in spec.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            continue;
        }
        RecordOrder::parse(&token)?;
        if !specs.contains(&token) {
            specs.push(token);
        }
    }
    Ok(specs)
}

fn load_properties(path: &Path) -> Result<HashMap<String, String>> {
    let text = fs::read_to_string(path)?;
    let mut props = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(StoreError::Corruption(format!(
                "malformed line in {}: {line}",
                path.display()
            )));
        };
        props.insert(key.trim().to_owned(), value.trim().to_owned());
    }
    Ok(props)
}

fn check_version(props: &HashMap<String, String>) -> Result<()> {
    let Some(version_str) = props.get(VERSION_KEY) else {
        warn!("triple_store.properties_missing_version");
        return Ok(());
    };
    let Ok(version) = version_str.parse::<u32>() else {
        warn!(version = %version_str, "triple_store.malformed_version");
        return Ok(());
    };
    if version < SCHEME_VERSION {
        return Err(StoreError::VersionMismatch(
            "directory contains incompatible triple data".to_owned(),
        ));
    }
    if version > SCHEME_VERSION {
        return Err(StoreError::VersionMismatch(
            "directory contains data that uses a newer format".to_owned(),
        ));
    }
    Ok(())
}

impl TripleStore {
    fn store_properties(&self, path: &Path, index_spec: &str) -> Result<()> {
        let contents = format!(
            "# triple indexes meta-data, DO NOT EDIT!\n{VERSION_KEY}={SCHEME_VERSION}\n{INDEXES_KEY}={index_spec}\n"
        );
        let existing = fs::read_to_string(path).unwrap_or_default();
        if existing != contents {
            fs::write(path, contents)?;
        }
        Ok(())
    }
}
