//! Append-only NDJSON log of value and namespace mints.
//!
//! Producers never touch the file: each call serializes one JSON line and
//! sends it over a bounded channel, blocking when the channel is full. A
//! single writer thread drains the channel, batches appends and flushes on
//! a batch-size threshold, an elapsed flush interval, or an explicit
//! barrier. Writer failures are captured and re-raised to the next caller
//! that awaits a barrier; they are never dropped silently.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::WalConfig;
use crate::error::{Result, StoreError};
use crate::model::{Term, ValueId, RDF_LANG_STRING, XSD_STRING};

/// Default log file name within a store directory.
pub const WAL_FILE_NAME: &str = "values.wal";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const ACK_WAIT: Duration = Duration::from_secs(2);
const ACK_ATTEMPTS: u32 = 150;

#[derive(Serialize)]
struct WalLine<'a> {
    seq: u64,
    id: ValueId,
    #[serde(rename = "valueType")]
    value_type: &'a str,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    datatype: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

enum WalMessage {
    Line(Vec<u8>),
    Barrier {
        ack: Sender<()>,
        truncate: bool,
        shutdown: bool,
    },
}

/// Write-ahead log for the value store's mint operations.
pub struct ValueStoreWal {
    tx: SyncSender<WalMessage>,
    writer: Option<JoinHandle<()>>,
    sequence: AtomicU64,
    failure: Arc<Mutex<Option<String>>>,
    closed: AtomicBool,
}

impl ValueStoreWal {
    /// Opens (creating if absent) the log at `dir/values.wal` and starts the
    /// writer thread. The next sequence number is recovered by scanning
    /// backward for the last well-formed line.
    pub fn open(dir: &Path, config: &WalConfig) -> Result<Self> {
        let path = dir.join(WAL_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)?;
        let start_seq = recover_sequence(&path);
        debug!(path = %path.display(), seq = start_seq, "wal.open");

        let (tx, rx) = mpsc::sync_channel(config.queue_capacity.max(1));
        let failure = Arc::new(Mutex::new(None));
        let writer = WalWriter {
            file,
            rx,
            failure: Arc::clone(&failure),
            max_batch: config.max_batch.max(1),
            flush_interval: config.flush_interval,
            sync_on_every_write: config.sync_on_every_write,
        };
        let handle = std::thread::Builder::new()
            .name("valuestore-wal".to_owned())
            .spawn(move || writer.run())?;

        Ok(Self {
            tx,
            writer: Some(handle),
            sequence: AtomicU64::new(start_seq),
            failure,
            closed: AtomicBool::new(false),
        })
    }

    /// Records a freshly minted value.
    pub fn record_value(&self, id: ValueId, term: &Term) -> Result<()> {
        let seq = self.next_seq();
        let line = match term {
            Term::Iri(iri) => {
                let full = iri.as_string();
                serialize_line(seq, id, "IRI", &full, None, None)
            }
            Term::BNode(bnode) => serialize_line(seq, id, "BNODE", bnode.id(), None, None),
            Term::Literal(lit) => {
                let datatype = match (lit.language(), lit.datatype()) {
                    (Some(_), _) => RDF_LANG_STRING.to_owned(),
                    (None, Some(dt)) => dt.as_string(),
                    (None, None) => XSD_STRING.to_owned(),
                };
                serialize_line(
                    seq,
                    id,
                    "LITERAL",
                    lit.label(),
                    Some(datatype.as_str()),
                    lit.language(),
                )
            }
            Term::Corrupt(_) => {
                return Err(StoreError::InvalidArgument(
                    "corrupt values cannot be logged".to_owned(),
                ))
            }
        }?;
        self.enqueue(WalMessage::Line(line))
    }

    /// Records a freshly minted namespace string.
    pub fn record_namespace(&self, id: ValueId, namespace: &str) -> Result<()> {
        let seq = self.next_seq();
        let line = serialize_line(seq, id, "NAMESPACE", namespace, None, None)?;
        self.enqueue(WalMessage::Line(line))
    }

    /// Blocks until every previously enqueued entry is durable.
    pub fn sync(&self) -> Result<()> {
        self.barrier(false, false)
    }

    /// Truncates the log and restarts the sequence at zero.
    pub fn reset(&self) -> Result<()> {
        self.barrier(true, false)?;
        self.sequence.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Drains outstanding entries, stops the writer thread and surfaces any
    /// captured writer failure.
    pub fn close(&mut self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return self.check_failure();
        }
        let result = self.barrier(false, true);
        if let Some(handle) = self.writer.take() {
            if handle.join().is_err() {
                warn!("wal.writer.panicked");
            }
        }
        result.and_then(|()| self.check_failure())
    }

    /// The last handed-out sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn enqueue(&self, msg: WalMessage) -> Result<()> {
        self.check_failure()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Wal("log is closed".to_owned()));
        }
        self.tx
            .send(msg)
            .map_err(|_| StoreError::Wal("writer thread is gone".to_owned()))
    }

    fn barrier(&self, truncate: bool, shutdown: bool) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.check_failure()?;
        self.tx
            .send(WalMessage::Barrier {
                ack: ack_tx,
                truncate,
                shutdown,
            })
            .map_err(|_| StoreError::Wal("writer thread is gone".to_owned()))?;
        for _ in 0..ACK_ATTEMPTS {
            match ack_rx.recv_timeout(ACK_WAIT) {
                Ok(()) => return self.check_failure(),
                Err(RecvTimeoutError::Timeout) => self.check_failure()?,
                Err(RecvTimeoutError::Disconnected) => {
                    self.check_failure()?;
                    return Err(StoreError::Wal("writer exited before acknowledging".to_owned()));
                }
            }
        }
        Err(StoreError::Wal("timed out waiting for durability barrier".to_owned()))
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(msg) => Err(StoreError::Wal(msg.clone())),
            None => Ok(()),
        }
    }
}

impl Drop for ValueStoreWal {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            let _ = self.close();
        }
    }
}

fn serialize_line(
    seq: u64,
    id: ValueId,
    value_type: &str,
    value: &str,
    datatype: Option<&str>,
    language: Option<&str>,
) -> Result<Vec<u8>> {
    let line = WalLine {
        seq,
        id,
        value_type,
        value,
        datatype,
        language,
    };
    let mut bytes = serde_json::to_vec(&line)
        .map_err(|e| StoreError::Wal(format!("failed to encode log entry: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Recovers the sequence number of the last well-formed line, or `0`.
fn recover_sequence(path: &Path) -> u64 {
    let Ok(bytes) = std::fs::read(path) else {
        return 0;
    };
    let text = String::from_utf8_lossy(&bytes);
    for line in text.lines().rev() {
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if let Some(seq) = value.get("seq").and_then(|s| s.as_u64()) {
            return seq;
        }
    }
    0
}

struct WalWriter {
    file: File,
    rx: Receiver<WalMessage>,
    failure: Arc<Mutex<Option<String>>>,
    max_batch: usize,
    flush_interval: Duration,
    sync_on_every_write: bool,
}

impl WalWriter {
    fn run(mut self) {
        let mut pending = 0usize;
        let mut last_flush = Instant::now();
        loop {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(WalMessage::Line(payload)) => {
                    if let Err(e) = self.append(&payload) {
                        self.fail(e);
                        return;
                    }
                    pending += 1;
                    let due = self.sync_on_every_write
                        || pending >= self.max_batch
                        || self.interval_elapsed(last_flush);
                    if due {
                        if let Err(e) = self.flush() {
                            self.fail(e);
                            return;
                        }
                        pending = 0;
                        last_flush = Instant::now();
                    }
                }
                Ok(WalMessage::Barrier {
                    ack,
                    truncate,
                    shutdown,
                }) => {
                    if pending > 0 {
                        if let Err(e) = self.flush() {
                            let _ = ack.send(());
                            self.fail(e);
                            return;
                        }
                        pending = 0;
                        last_flush = Instant::now();
                    }
                    if truncate {
                        if let Err(e) = self.truncate() {
                            let _ = ack.send(());
                            self.fail(e);
                            return;
                        }
                    }
                    let _ = ack.send(());
                    if shutdown {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if pending > 0 && self.interval_elapsed(last_flush) {
                        if let Err(e) = self.flush() {
                            self.fail(e);
                            return;
                        }
                        pending = 0;
                        last_flush = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if pending > 0 {
                        if let Err(e) = self.flush() {
                            self.fail(e);
                        }
                    }
                    return;
                }
            }
        }
    }

    fn append(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.file.write_all(payload)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }

    fn truncate(&mut self) -> std::io::Result<()> {
        self.file.set_len(0)?;
        self.file.sync_data()
    }

    /// Records the failure, then keeps acknowledging barriers so blocked
    /// callers wake up and observe the error.
    fn fail(&self, error: std::io::Error) {
        warn!(error = %error, "wal.writer.failed");
        *self.failure.lock() = Some(error.to_string());
        loop {
            match self.rx.recv() {
                Ok(WalMessage::Barrier { ack, shutdown, .. }) => {
                    let _ = ack.send(());
                    if shutdown {
                        return;
                    }
                }
                Ok(WalMessage::Line(_)) => {}
                Err(_) => return,
            }
        }
    }

    fn interval_elapsed(&self, last_flush: Instant) -> bool {
        !self.flush_interval.is_zero() && last_flush.elapsed() >= self.flush_interval
    }
}
