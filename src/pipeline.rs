/* src/pipeline.rs */

//! Turns "set this host to X" and "drop this record" intents into store
//! changes, enforcing zone policy and caller permissions.
//!
//! A zone holds at most one A and one AAAA record per name. Changing the
//! address of a host is a delete of the old record plus an insert of the new
//! one, committed under a single store lock, so readers see either the old
//! record or the new one and never both or neither.

use crate::auth::AuthContext;
use crate::error::{MutationError, ValidationError};
use crate::mirror::MirrorStatus;
use crate::records::{self, Record, RecordHash, RecordKey, RecordType, normalize_fqdn};
use crate::store::RecordStore;
use crate::zone::Zone;
use fancy_log::{LogLevel, log};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created { new: Record },
    /// `old` shared the new record's name and type and is gone.
    Replaced { old: Record, new: Record },
}

impl UpsertOutcome {
    pub fn record(&self) -> &Record {
        match self {
            UpsertOutcome::Created { new } | UpsertOutcome::Replaced { new, .. } => new,
        }
    }
}

/// A committed upsert. `mirror` tells whether the name server followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub outcome: UpsertOutcome,
    pub mirror: MirrorStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub record: Record,
    pub mirror: MirrorStatus,
}

/// Raw dashboard form input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordForm {
    pub hostname: String,
    #[serde(alias = "ip")]
    pub value: String,
    pub ttl: String,
    #[serde(rename = "type", default = "default_form_type")]
    pub record_type: String,
}

fn default_form_type() -> String {
    RecordType::A.to_string()
}

#[derive(Clone)]
pub struct Records {
    store: RecordStore,
    zone: Arc<Zone>,
}

impl Records {
    pub fn new(store: RecordStore, zone: Arc<Zone>) -> Self {
        Self { store, zone }
    }

    pub fn zone(&self) -> &Arc<Zone> {
        &self.zone
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn get_all(&self) -> Vec<Record> {
        self.store.get_all()
    }

    pub fn get_by_hash(&self, hash: &RecordHash) -> Option<Record> {
        self.store.get_by_hash(hash)
    }

    pub fn get_by_fqdn_and_type(&self, fqdn: &str, record_type: RecordType) -> Option<Record> {
        self.store.get_by_fqdn_and_type(fqdn, record_type)
    }

    pub fn get_for_fqdn(&self, fqdn: &str, record_type: RecordType) -> Option<Record> {
        self.store.get_for_fqdn(fqdn, record_type)
    }

    /// Immutability is checked before permissions.
    fn authorize(&self, fqdn: &str, auth: &dyn AuthContext) -> Result<(), MutationError> {
        if self.zone.is_system_record(fqdn) {
            log(
                LogLevel::Warn,
                &format!(
                    "{} tried to change system record {}",
                    auth.current_user(),
                    fqdn
                ),
            );
            return Err(MutationError::Immutable(normalize_fqdn(fqdn)));
        }
        if !auth.can_mutate(fqdn) {
            log(
                LogLevel::Warn,
                &format!("{} is not allowed to change {}", auth.current_user(), fqdn),
            );
            return Err(MutationError::NotAuthorized {
                user: auth.current_user().to_string(),
                fqdn: normalize_fqdn(fqdn),
            });
        }
        Ok(())
    }

    /// Sets `host` to `value`, replacing any record of the same name and
    /// type. `host` is a label of the zone, `@`, or an absolute name.
    pub async fn upsert(
        &self,
        record_type: RecordType,
        host: &str,
        value: &str,
        ttl: u32,
        auth: &dyn AuthContext,
    ) -> Result<Upserted, MutationError> {
        let record = records::build(record_type, host, value, ttl, &self.zone)
            .inspect_err(|e| reject(auth, e))?;
        self.apply(record, auth).await
    }

    async fn apply(
        &self,
        record: Record,
        auth: &dyn AuthContext,
    ) -> Result<Upserted, MutationError> {
        self.authorize(record.fqdn(), auth)?;

        let (outcome, mirror) = self
            .store
            .commit(move |txn| {
                if txn.get_by_hash(record.hash()).is_some() {
                    return Err(MutationError::Duplicate(record.hash().clone()));
                }
                let existing = txn
                    .get_by_fqdn_and_type(record.fqdn(), record.record_type())
                    .cloned();
                match existing {
                    Some(old) if record.record_type().family().is_some() => {
                        txn.delete(&old.key())?;
                        txn.insert(record.clone())?;
                        Ok(UpsertOutcome::Replaced { old, new: record })
                    }
                    _ => {
                        txn.insert(record.clone())?;
                        Ok(UpsertOutcome::Created { new: record })
                    }
                }
            })
            .await?;

        match &outcome {
            UpsertOutcome::Created { new } => log(
                LogLevel::Info,
                &format!("{} created {}", auth.current_user(), new),
            ),
            UpsertOutcome::Replaced { old, new } => log(
                LogLevel::Info,
                &format!("{} replaced {} with {}", auth.current_user(), old, new),
            ),
        }
        if let MirrorStatus::Failed(e) = &mirror {
            log(
                LogLevel::Warn,
                &format!("{} is committed but not mirrored: {}", outcome.record(), e),
            );
        }

        Ok(Upserted { outcome, mirror })
    }

    /// Removes the record matching `key` exactly.
    pub async fn remove(
        &self,
        key: &RecordKey,
        auth: &dyn AuthContext,
    ) -> Result<Removed, MutationError> {
        let key = RecordKey::new(key.record_type, &key.fqdn, &key.data);
        self.authorize(&key.fqdn, auth)?;

        let (record, mirror) = self
            .store
            .commit(|txn| txn.delete(&key).map_err(MutationError::from))
            .await?;

        log(
            LogLevel::Info,
            &format!("{} removed {}", auth.current_user(), record),
        );
        if let MirrorStatus::Failed(e) = &mirror {
            log(
                LogLevel::Warn,
                &format!("Removal of {} is committed but not mirrored: {}", record, e),
            );
        }

        Ok(Removed { record, mirror })
    }

    /// Validates dashboard input against the zone and upserts the result.
    pub async fn submit(
        &self,
        form: &RecordForm,
        auth: &dyn AuthContext,
    ) -> Result<Upserted, MutationError> {
        let record = records::validate(
            &form.hostname,
            &form.value,
            &form.ttl,
            &form.record_type,
            &self.zone,
        )
        .inspect_err(|e| reject(auth, e))?;
        self.apply(record, auth).await
    }
}

fn reject(auth: &dyn AuthContext, e: &ValidationError) {
    log(
        LogLevel::Warn,
        &format!("Rejected input from {}: {}", auth.current_user(), e),
    );
}
