//! Local transfer history using redb.
//!
//! Every send and receive the CLI completes is recorded here so `list` can
//! show what went through this machine. Nothing in the protocol reads it.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::code::TransferCode;
use crate::error::{WormholeError, WormholeResult};
use crate::types::{now_millis, TransferDescriptor};

// Keyed by "<recorded_at>-<direction>-<code>" so iteration is chronological
const TRANSFERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("transfers");

/// Which side of the transfer this machine was on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// We uploaded and published the code
    Sent,
    /// We looked up the code and downloaded
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Sent => write!(f, "sent"),
            Direction::Received => write!(f, "received"),
        }
    }
}

/// One row of history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Rendezvous code
    pub code: TransferCode,
    /// Our side of the transfer
    pub direction: Direction,
    /// File name from the descriptor
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// Relay content hash
    pub content_hash: String,
    /// Unix millis when the record was written
    pub recorded_at: i64,
}

impl TransferRecord {
    /// Record a transfer described by `descriptor`, stamped now.
    pub fn new(code: &TransferCode, direction: Direction, descriptor: &TransferDescriptor) -> Self {
        Self {
            code: code.clone(),
            direction,
            filename: descriptor.filename.clone(),
            size: descriptor.size,
            content_hash: descriptor.content_hash.clone(),
            recorded_at: now_millis(),
        }
    }

    fn key(&self) -> String {
        // Zero-padded so lexicographic order is numeric order
        format!("{:020}-{}-{}", self.recorded_at, self.direction, self.code)
    }
}

/// Persistent list of past transfers
#[derive(Clone)]
pub struct TransferHistory {
    db: Arc<RwLock<Database>>,
}

impl TransferHistory {
    /// Open (or create) the history database at `path`.
    pub fn open(path: impl AsRef<Path>) -> WormholeResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TRANSFERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Append a record. A record with the same key is overwritten.
    pub fn record(&self, record: &TransferRecord) -> WormholeResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRANSFERS_TABLE)?;
            let data = serde_json::to_vec(record)
                .map_err(|e| WormholeError::Serialization(e.to_string()))?;
            table.insert(record.key().as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All records, newest first.
    pub fn list(&self) -> WormholeResult<Vec<TransferRecord>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(TRANSFERS_TABLE)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: TransferRecord = serde_json::from_slice(value.value())
                .map_err(|e| WormholeError::Serialization(e.to_string()))?;
            records.push(record);
        }

        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(code: &str, direction: Direction, recorded_at: i64) -> TransferRecord {
        TransferRecord {
            code: TransferCode::parse(code).unwrap(),
            direction,
            filename: "a.txt".to_string(),
            size: 10,
            content_hash: "Qm123".to_string(),
            recorded_at,
        }
    }

    #[test]
    fn test_empty_history() {
        let dir = tempdir().unwrap();
        let history = TransferHistory::open(dir.path().join("history.redb")).unwrap();
        assert!(history.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_is_newest_first() {
        let dir = tempdir().unwrap();
        let history = TransferHistory::open(dir.path().join("history.redb")).unwrap();

        history.record(&record("1-calm-moon", Direction::Sent, 1_000)).unwrap();
        history.record(&record("2-kind-otter", Direction::Received, 30_000)).unwrap();
        history.record(&record("3-swift-river", Direction::Sent, 200)).unwrap();

        let codes: Vec<String> = history
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.code.to_string())
            .collect();
        assert_eq!(codes, vec!["2-kind-otter", "1-calm-moon", "3-swift-river"]);
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("history.redb");

        {
            let history = TransferHistory::open(&path).unwrap();
            history.record(&record("42-brave-fire", Direction::Received, 5)).unwrap();
        }

        let history = TransferHistory::open(&path).unwrap();
        let records = history.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].direction, Direction::Received);
        assert_eq!(records[0].content_hash, "Qm123");
    }

    #[test]
    fn test_record_from_descriptor() {
        let code = TransferCode::parse("42-brave-fire").unwrap();
        let descriptor = TransferDescriptor::new("a.txt", 10, "text/plain", "Qm123");
        let record = TransferRecord::new(&code, Direction::Sent, &descriptor);
        assert_eq!(record.filename, "a.txt");
        assert_eq!(record.size, 10);
        assert!(record.recorded_at > 0);
    }
}
