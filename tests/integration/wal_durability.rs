#![allow(missing_docs)]

//! The value store's write-ahead log must reflect every mint, in order,
//! and recover its sequence across restarts.

use quadstore::config::{StoreConfig, WalConfig};
use quadstore::error::Result;
use quadstore::model::{Literal, Term};
use quadstore::store::value_store::ValueStore;
use quadstore::store::wal::WAL_FILE_NAME;
use std::time::Duration;
use tempfile::tempdir;

fn fast_wal_config() -> StoreConfig {
    StoreConfig {
        wal: WalConfig {
            queue_capacity: 64,
            max_batch: 8,
            flush_interval: Duration::from_millis(5),
            sync_on_every_write: false,
        },
        ..StoreConfig::default()
    }
}

fn read_wal_lines(dir: &std::path::Path) -> Vec<serde_json::Value> {
    let text = std::fs::read_to_string(dir.join(WAL_FILE_NAME)).unwrap_or_default();
    text.lines()
        .map(|l| serde_json::from_str(l).expect("well-formed WAL line"))
        .collect()
}

#[test]
fn every_mint_lands_in_the_log() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    {
        let mut store = ValueStore::open(dir.path(), &fast_wal_config())?;
        let iri_id = store.store_value(&Term::iri("http://example.com/ns#a"))?;
        store.store_value(&Term::Literal(Literal::tagged("hallo", "de")))?;
        // Re-storing mints nothing and must not log a second entry.
        assert_eq!(store.store_value(&Term::iri("http://example.com/ns#a"))?, iri_id);
        store.close()?;
    }

    let lines = read_wal_lines(dir.path());
    let types: Vec<&str> = lines
        .iter()
        .map(|l| l["valueType"].as_str().unwrap())
        .collect();
    // One namespace + the IRI, then the langString datatype chain + literal.
    assert_eq!(types.iter().filter(|t| **t == "NAMESPACE").count(), 2);
    assert_eq!(types.iter().filter(|t| **t == "IRI").count(), 2);
    assert_eq!(types.iter().filter(|t| **t == "LITERAL").count(), 1);

    let seqs: Vec<u64> = lines.iter().map(|l| l["seq"].as_u64().unwrap()).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted, "sequence numbers must be appended in order");
    assert_eq!(seqs.len(), lines.len());
    Ok(())
}

#[test]
fn sequence_continues_after_restart() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    {
        let mut store = ValueStore::open(dir.path(), &fast_wal_config())?;
        store.store_value(&Term::bnode("b1"))?;
        store.close()?;
    }
    let first_run_max = read_wal_lines(dir.path())
        .iter()
        .map(|l| l["seq"].as_u64().unwrap())
        .max()
        .expect("log has entries");

    {
        let mut store = ValueStore::open(dir.path(), &fast_wal_config())?;
        store.store_value(&Term::bnode("b2"))?;
        store.close()?;
    }
    let all_seqs: Vec<u64> = read_wal_lines(dir.path())
        .iter()
        .map(|l| l["seq"].as_u64().unwrap())
        .collect();
    assert!(
        all_seqs.iter().any(|&s| s > first_run_max),
        "entries of the second run must continue the sequence"
    );
    Ok(())
}

#[test]
fn clear_truncates_the_log() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let mut store = ValueStore::open(dir.path(), &fast_wal_config())?;
    store.store_value(&Term::iri("http://example.com/ns#gone"))?;
    store.clear()?;
    store.store_value(&Term::iri("http://example.com/ns#kept"))?;
    store.close()?;

    let lines = read_wal_lines(dir.path());
    assert!(
        lines
            .iter()
            .all(|l| !l["value"].as_str().unwrap_or("").contains("gone")),
        "cleared entries must not survive in the log"
    );
    assert!(lines
        .iter()
        .any(|l| l["value"].as_str().unwrap_or("").contains("example.com")));
    Ok(())
}

#[test]
fn force_sync_mode_flushes_immediately() -> Result<()> {
    let dir = tempdir().expect("tmpdir");
    let config = StoreConfig {
        wal: WalConfig {
            sync_on_every_write: true,
            // A long interval and huge batch prove the flush came from the
            // per-write mode, not a timer.
            flush_interval: Duration::from_secs(3600),
            max_batch: 1_000_000,
            ..WalConfig::default()
        },
        ..StoreConfig::default()
    };
    let store = ValueStore::open(dir.path(), &config)?;
    store.store_value(&Term::bnode("durable"))?;
    // Give the writer thread a moment to drain the queue.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if !read_wal_lines(dir.path()).is_empty() {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "entry did not reach the log under sync_on_every_write"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}
