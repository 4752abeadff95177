//! Key/value ledger seam, atomic write sets and the record codec.
//!
//! Every operation stages its writes into a [`WriteSet`] and hands it to
//! [`Ledger::commit`] once all checks have passed, so an operation either
//! persists everything it staged or nothing at all. Index appends are applied
//! inside the commit against the index value current at commit time, which
//! keeps concurrent appends from overwriting each other. Records read through
//! [`read_guarded`] are re-checked at commit time; a record changed in between
//! aborts the commit with [`LedgerError::Conflict`].
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::error::{AppraisalError, Result};

pub const APPRAISERS_INDEX: &str = "_appraisers";
pub const CLIENTS_INDEX: &str = "_clients";
pub const APPRAISALS_INDEX: &str = "_appraisals";
pub const SIGNATURES_INDEX: &str = "_signatures";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("failed to read {key}: {reason}")]
    ReadFailed { key: String, reason: String },
    #[error("index {index} unreadable: {reason}")]
    IndexUnavailable { index: String, reason: String },
    #[error("{key} changed since it was read")]
    Conflict { key: String },
    #[error("{0}")]
    WriteFailed(String),
}

impl From<LedgerError> for AppraisalError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::ReadFailed { key, reason } => {
                AppraisalError::ReferenceUnavailable { key, reason }
            }
            LedgerError::IndexUnavailable { index, reason } => {
                AppraisalError::IndexUnavailable { index, reason }
            }
            LedgerError::Conflict { key } => {
                AppraisalError::WriteFailed(format!("concurrent update of {key}"))
            }
            LedgerError::WriteFailed(reason) => AppraisalError::WriteFailed(reason),
        }
    }
}

/// Writes staged by one operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteSet {
    puts: BTreeMap<String, Vec<u8>>,
    appends: BTreeMap<String, Vec<String>>,
    guards: BTreeMap<String, Option<Vec<u8>>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.puts.insert(key.into(), value);
    }
    /// Encodes `record` and stages it under `key`.
    pub fn put_record<T: minicbor::Encode<()>>(&mut self, key: &str, record: &T) -> Result<()> {
        let encoded = minicbor::to_vec(record).map_err(|e| AppraisalError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.put(key, encoded);
        Ok(())
    }
    pub fn append_index(&mut self, index: &str, id: impl Into<String>) {
        self.appends
            .entry(index.to_string())
            .or_default()
            .push(id.into());
    }
    /// Requires `key` to still hold `seen` when the set is committed.
    pub fn guard(&mut self, key: &str, seen: Option<Vec<u8>>) {
        self.guards.entry(key.to_string()).or_insert(seen);
    }
    pub fn appends_to(&self, index: &str) -> &[String] {
        self.appends.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub trait Ledger {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, LedgerError>;

    /// Applies every staged put and index append, all or nothing.
    fn commit(&self, writes: &WriteSet) -> std::result::Result<(), LedgerError>;

    fn put(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), LedgerError> {
        let mut writes = WriteSet::new();
        writes.put(key, value);
        self.commit(&writes)
    }
}

fn decode_index(index: &str, raw: &[u8]) -> std::result::Result<Vec<String>, LedgerError> {
    minicbor::decode(raw).map_err(|e| LedgerError::IndexUnavailable {
        index: index.to_string(),
        reason: e.to_string(),
    })
}

fn encode_index(ids: &Vec<String>) -> std::result::Result<Vec<u8>, LedgerError> {
    minicbor::to_vec(ids).map_err(|e| LedgerError::WriteFailed(e.to_string()))
}

impl Ledger for sled::Db {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, LedgerError> {
        sled::Tree::get(self, key.as_bytes())
            .map(|value| value.map(|ivec| ivec.to_vec()))
            .map_err(|e| LedgerError::ReadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn commit(&self, writes: &WriteSet) -> std::result::Result<(), LedgerError> {
        // sled may rerun the closure on conflict, so it only borrows the write set
        let outcome = self.transaction(|tx| {
            for (key, seen) in &writes.guards {
                let current = tx.get(key.as_bytes())?;
                if current.as_deref() != seen.as_deref() {
                    return Err(ConflictableTransactionError::Abort(LedgerError::Conflict {
                        key: key.clone(),
                    }));
                }
            }
            for (index, ids) in &writes.appends {
                let mut current = match tx.get(index.as_bytes())? {
                    Some(raw) => {
                        decode_index(index, &raw).map_err(ConflictableTransactionError::Abort)?
                    }
                    None => Vec::new(),
                };
                current.extend(ids.iter().cloned());
                let encoded = encode_index(&current).map_err(ConflictableTransactionError::Abort)?;
                tx.insert(index.as_bytes(), encoded)?;
            }
            for (key, value) in &writes.puts {
                tx.insert(key.as_bytes(), value.clone())?;
            }
            Ok::<(), ConflictableTransactionError<LedgerError>>(())
        });

        outcome.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => LedgerError::WriteFailed(e.to_string()),
        })
    }
}

/// Process local ledger used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
    /// While set, every commit fails with [`LedgerError::WriteFailed`].
    pub fn set_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, LedgerError> {
        let entries = self.entries.lock().map_err(|e| LedgerError::ReadFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    fn commit(&self, writes: &WriteSet) -> std::result::Result<(), LedgerError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::WriteFailed("memory ledger rejects writes".into()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| LedgerError::WriteFailed(e.to_string()))?;

        for (key, seen) in &writes.guards {
            if entries.get(key) != seen.as_ref() {
                return Err(LedgerError::Conflict { key: key.clone() });
            }
        }

        // resolve every index first so a bad index leaves the map untouched
        let mut indexes = Vec::with_capacity(writes.appends.len());
        for (index, ids) in &writes.appends {
            let mut current = match entries.get(index) {
                Some(raw) => decode_index(index, raw)?,
                None => Vec::new(),
            };
            current.extend(ids.iter().cloned());
            indexes.push((index.clone(), encode_index(&current)?));
        }

        entries.extend(indexes);
        for (key, value) in &writes.puts {
            entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Reads and decodes a record, failing with `ReferenceUnavailable` when absent.
pub fn read_record<L, T>(ledger: &L, key: &str) -> Result<T>
where
    L: Ledger + ?Sized,
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let raw = ledger
        .get(key)?
        .ok_or_else(|| AppraisalError::unavailable(key, "not found"))?;
    decode_record(key, &raw)
}

/// Reads a record like [`read_record`] and guards it in `writes`, so the
/// commit fails if another writer changes it first.
pub fn read_guarded<L, T>(ledger: &L, writes: &mut WriteSet, key: &str) -> Result<T>
where
    L: Ledger + ?Sized,
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let raw = ledger
        .get(key)?
        .ok_or_else(|| AppraisalError::unavailable(key, "not found"))?;
    let record = decode_record(key, &raw)?;
    writes.guard(key, Some(raw));
    Ok(record)
}

fn decode_record<T>(key: &str, raw: &[u8]) -> Result<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(raw).map_err(|e| AppraisalError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Reads an index in full. A never-written index is empty.
pub fn read_index<L: Ledger + ?Sized>(ledger: &L, index: &str) -> Result<Vec<String>> {
    let raw = ledger.get(index).map_err(|e| AppraisalError::IndexUnavailable {
        index: index.to_string(),
        reason: e.to_string(),
    })?;
    match raw {
        Some(raw) => Ok(decode_index(index, &raw)?),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_applies_puts_and_appends_together() {
        let ledger = MemoryLedger::new();
        let mut writes = WriteSet::new();
        writes.put("a", b"1".to_vec());
        writes.append_index(SIGNATURES_INDEX, "sg1");
        writes.append_index(SIGNATURES_INDEX, "sg2");
        ledger.commit(&writes).unwrap();

        assert_eq!(ledger.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(
            read_index(&ledger, SIGNATURES_INDEX).unwrap(),
            vec!["sg1".to_string(), "sg2".to_string()]
        );

        let mut writes = WriteSet::new();
        writes.append_index(SIGNATURES_INDEX, "sg3");
        ledger.commit(&writes).unwrap();
        assert_eq!(read_index(&ledger, SIGNATURES_INDEX).unwrap().len(), 3);
    }

    #[test]
    fn corrupt_index_aborts_whole_commit() {
        let ledger = MemoryLedger::new();
        ledger.put(APPRAISALS_INDEX, vec![0xff, 0x00]).unwrap();

        let mut writes = WriteSet::new();
        writes.put("al1", b"record".to_vec());
        writes.append_index(APPRAISALS_INDEX, "al1");

        let err = ledger.commit(&writes).unwrap_err();
        assert!(matches!(err, LedgerError::IndexUnavailable { .. }));
        assert_eq!(ledger.get("al1").unwrap(), None);
    }

    #[test]
    fn failed_write_persists_nothing() {
        let ledger = MemoryLedger::new();
        ledger.set_write_failure(true);

        let mut writes = WriteSet::new();
        writes.put("k", b"v".to_vec());
        assert!(matches!(
            ledger.commit(&writes),
            Err(LedgerError::WriteFailed(_))
        ));
        assert!(ledger.is_empty());
    }

    #[test]
    fn guarded_read_detects_concurrent_update() {
        let ledger = MemoryLedger::new();
        let mut setup = WriteSet::new();
        setup.put_record("al1", &vec!["first".to_string()]).unwrap();
        ledger.commit(&setup).unwrap();

        let mut writes = WriteSet::new();
        let seen: Vec<String> = read_guarded(&ledger, &mut writes, "al1").unwrap();
        assert_eq!(seen, vec!["first"]);
        writes.put_record("al1", &vec!["mine".to_string()]).unwrap();

        let mut other = WriteSet::new();
        other.put_record("al1", &vec!["theirs".to_string()]).unwrap();
        ledger.commit(&other).unwrap();

        assert_eq!(
            ledger.commit(&writes),
            Err(LedgerError::Conflict { key: "al1".into() })
        );
        let stored: Vec<String> = read_record(&ledger, "al1").unwrap();
        assert_eq!(stored, vec!["theirs"]);
    }

    #[test]
    fn missing_record_is_reference_unavailable() {
        let ledger = MemoryLedger::new();
        let err = read_record::<_, Vec<String>>(&ledger, "nope").unwrap_err();
        assert!(matches!(err, AppraisalError::ReferenceUnavailable { .. }));
        assert!(read_index(&ledger, APPRAISERS_INDEX).unwrap().is_empty());
    }

    #[test]
    fn sled_commit_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("ledger.db")).unwrap();

        let mut writes = WriteSet::new();
        writes.put("p1", b"property".to_vec());
        writes.append_index(APPRAISERS_INDEX, "app1");
        Ledger::commit(&db, &writes).unwrap();

        assert_eq!(Ledger::get(&db, "p1").unwrap(), Some(b"property".to_vec()));
        assert_eq!(read_index(&db, APPRAISERS_INDEX).unwrap(), vec!["app1"]);

        Ledger::put(&db, SIGNATURES_INDEX, b"not cbor \xff".to_vec()).unwrap();
        let mut writes = WriteSet::new();
        writes.put("p2", b"property".to_vec());
        writes.append_index(SIGNATURES_INDEX, "sg1");
        assert!(Ledger::commit(&db, &writes).is_err());
        assert_eq!(Ledger::get(&db, "p2").unwrap(), None);
    }
}
