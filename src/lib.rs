//! Disk-resident, indexed storage engine for RDF quads.
//!
//! Quads are stored as fixed-length records of interned term ids across a
//! configurable set of permutation indexes, mutated inside single-writer
//! transactions that survive process crashes via a persisted status marker
//! and per-record transaction flags.

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod store;

pub use config::{StoreConfig, WalConfig};
pub use error::{Result, StoreError};
pub use model::{BNode, Iri, Literal, Term, ValueId};
pub use store::{ContextMatch, Quad, QuadStore, StoreStats, TransactionMode};
