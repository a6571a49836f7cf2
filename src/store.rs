/* src/store.rs */

//! Authoritative in-memory record set.
//!
//! `by_hash` is the source of truth; the name indices are derived from it and
//! updated in the same critical section.

use crate::error::{NameServerError, StoreError};
use crate::mirror::{MirrorHandle, MirrorStatus};
use crate::nameserver::MirrorAction;
use crate::records::{Record, RecordHash, RecordKey, RecordType, normalize_fqdn};
use fancy_log::{LogLevel, log};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Default)]
struct StoreInner {
    by_hash: HashMap<RecordHash, Record>,
    /// (fqdn, type) -> hashes
    by_name_type: HashMap<(String, RecordType), BTreeSet<RecordHash>>,
    /// fqdn -> hashes
    by_name: HashMap<String, BTreeSet<RecordHash>>,
}

impl StoreInner {
    fn first_of(&self, fqdn: &str, record_type: RecordType) -> Option<&Record> {
        self.by_name_type
            .get(&(fqdn.to_string(), record_type))
            .and_then(|hashes| hashes.iter().next())
            .and_then(|hash| self.by_hash.get(hash))
    }

    /// Another address record of the same family already held for the name.
    fn address_conflict(&self, record: &Record) -> Option<&Record> {
        record.record_type().family()?;
        self.first_of(record.fqdn(), record.record_type())
            .filter(|existing| existing.hash() != record.hash())
    }

    fn put(&mut self, record: Record) {
        let hash = record.hash().clone();
        self.by_name_type
            .entry((record.fqdn().to_string(), record.record_type()))
            .or_default()
            .insert(hash.clone());
        self.by_name
            .entry(record.fqdn().to_string())
            .or_default()
            .insert(hash.clone());
        self.by_hash.insert(hash, record);
    }

    fn take(&mut self, hash: &RecordHash) -> Option<Record> {
        let record = self.by_hash.remove(hash)?;
        let name_type = (record.fqdn().to_string(), record.record_type());
        if let Some(hashes) = self.by_name_type.get_mut(&name_type) {
            hashes.remove(hash);
            if hashes.is_empty() {
                self.by_name_type.remove(&name_type);
            }
        }
        if let Some(hashes) = self.by_name.get_mut(record.fqdn()) {
            hashes.remove(hash);
            if hashes.is_empty() {
                self.by_name.remove(record.fqdn());
            }
        }
        Some(record)
    }
}

enum Undo {
    Inserted(RecordHash),
    Deleted(Record),
}

/// A set of changes made under one write lock. Dropped changes are rolled
/// back by `RecordStore::commit` when the closure fails.
pub(crate) struct StoreTxn<'a> {
    inner: &'a mut StoreInner,
    undo: Vec<Undo>,
    changes: Vec<(MirrorAction, Record)>,
}

impl<'a> StoreTxn<'a> {
    fn new(inner: &'a mut StoreInner) -> Self {
        Self {
            inner,
            undo: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub(crate) fn get_by_hash(&self, hash: &RecordHash) -> Option<&Record> {
        self.inner.by_hash.get(hash)
    }

    pub(crate) fn get_by_fqdn_and_type(
        &self,
        fqdn: &str,
        record_type: RecordType,
    ) -> Option<&Record> {
        self.inner.first_of(&normalize_fqdn(fqdn), record_type)
    }

    pub(crate) fn insert(&mut self, record: Record) -> Result<(), StoreError> {
        if self.inner.by_hash.contains_key(record.hash()) {
            return Err(StoreError::DuplicateRecord(record.hash().clone()));
        }
        if let Some(existing) = self.inner.address_conflict(&record) {
            let msg = format!(
                "{} would coexist with {} for {}",
                record,
                existing,
                record.fqdn()
            );
            log(LogLevel::Error, &format!("Store invariant violation: {}", msg));
            return Err(StoreError::InvariantViolation(msg));
        }
        self.undo.push(Undo::Inserted(record.hash().clone()));
        self.changes.push((MirrorAction::Add, record.clone()));
        self.inner.put(record);
        Ok(())
    }

    pub(crate) fn delete(&mut self, key: &RecordKey) -> Result<Record, StoreError> {
        let record = self
            .inner
            .take(&key.hash())
            .ok_or_else(|| StoreError::NotFound {
                record_type: key.record_type,
                fqdn: key.fqdn.clone(),
                data: key.data.clone(),
            })?;
        self.undo.push(Undo::Deleted(record.clone()));
        self.changes.push((MirrorAction::Delete, record.clone()));
        Ok(record)
    }

    fn rollback(self) {
        for step in self.undo.into_iter().rev() {
            match step {
                Undo::Inserted(hash) => {
                    self.inner.take(&hash);
                }
                Undo::Deleted(record) => self.inner.put(record),
            }
        }
    }
}

/// Shared handle to the record set. Cloning is cheap.
#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<RwLock<StoreInner>>,
    mirror: MirrorHandle,
}

impl RecordStore {
    pub fn new(mirror: MirrorHandle) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            mirror,
        }
    }

    /// Rebuilds the store from the external source of truth. Nothing is
    /// mirrored. Returns how many records were taken.
    pub fn load(&self, records: Vec<Record>) -> usize {
        let mut inner = self.inner.write();
        *inner = StoreInner::default();
        let mut loaded = 0;
        for record in records {
            if inner.by_hash.contains_key(record.hash()) {
                log(
                    LogLevel::Warn,
                    &format!("Skipping duplicate record from source: {}", record),
                );
                continue;
            }
            if let Some(existing) = inner.address_conflict(&record) {
                log(
                    LogLevel::Error,
                    &format!(
                        "Store invariant violation in source: {} conflicts with {}, skipped",
                        record, existing
                    ),
                );
                continue;
            }
            inner.put(record);
            loaded += 1;
        }
        log(LogLevel::Info, &format!("Loaded {} records", loaded));
        loaded
    }

    /// Point-in-time copy ordered by FQDN, then type, then data.
    pub fn get_all(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.inner.read().by_hash.values().cloned().collect();
        records.sort_by(|a, b| {
            (a.fqdn(), a.record_type(), a.data()).cmp(&(b.fqdn(), b.record_type(), b.data()))
        });
        records
    }

    pub fn get_by_hash(&self, hash: &RecordHash) -> Option<Record> {
        self.inner.read().by_hash.get(hash).cloned()
    }

    pub fn get_by_fqdn_and_type(&self, fqdn: &str, record_type: RecordType) -> Option<Record> {
        self.inner
            .read()
            .first_of(&normalize_fqdn(fqdn), record_type)
            .cloned()
    }

    /// Sibling lookup through the per-name index, e.g. the AAAA record that
    /// belongs to an A record's host.
    pub fn get_for_fqdn(&self, fqdn: &str, record_type: RecordType) -> Option<Record> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(&normalize_fqdn(fqdn))?
            .iter()
            .filter_map(|hash| inner.by_hash.get(hash))
            .find(|record| record.record_type() == record_type)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn insert(&self, record: Record) -> Result<MirrorStatus, StoreError> {
        let ((), status) = self.commit(|txn| txn.insert(record)).await?;
        Ok(status)
    }

    pub async fn delete(&self, key: &RecordKey) -> Result<MirrorStatus, StoreError> {
        let (_, status) = self.commit(|txn| txn.delete(key)).await?;
        Ok(status)
    }

    /// Runs `f` under the write lock. On success its changes are queued for
    /// mirroring in commit order before the lock is released; on failure they
    /// are rolled back and nothing is mirrored.
    pub(crate) async fn commit<T, E, F>(&self, f: F) -> Result<(T, MirrorStatus), E>
    where
        F: FnOnce(&mut StoreTxn<'_>) -> Result<T, E>,
    {
        let (value, pending) = {
            let mut inner = self.inner.write();
            let mut txn = StoreTxn::new(&mut *inner);
            match f(&mut txn) {
                Ok(value) => {
                    let changes = std::mem::take(&mut txn.changes);
                    (value, self.mirror.enqueue(changes))
                }
                Err(e) => {
                    txn.rollback();
                    return Err(e);
                }
            }
        };
        Ok((value, self.mirror.settle(pending).await))
    }

    /// Scans for two address records of one family on one name.
    pub fn check_invariants(&self) -> Result<(), StoreError> {
        let inner = self.inner.read();
        for ((fqdn, record_type), hashes) in &inner.by_name_type {
            if record_type.family().is_some() && hashes.len() > 1 {
                let msg = format!("{} holds {} {} records", fqdn, hashes.len(), record_type);
                log(LogLevel::Error, &format!("Store invariant violation: {}", msg));
                return Err(StoreError::InvariantViolation(msg));
            }
        }
        Ok(())
    }

    pub fn mirror_failures(&self) -> u64 {
        self.mirror.failures()
    }

    pub fn last_mirror_error(&self) -> Option<NameServerError> {
        self.mirror.last_error()
    }
}
