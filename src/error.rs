/* src/error.rs */

use crate::records::{RecordHash, RecordType};
use std::time::Duration;
use thiserror::Error;

/// Malformed form or record input. Always caused by the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid hostname label: {0:?}")]
    InvalidHostname(String),

    #[error("invalid {record_type} address: {value:?}")]
    InvalidAddress {
        record_type: RecordType,
        value: String,
    },

    #[error("invalid {record_type} target: {value:?}")]
    InvalidTarget {
        record_type: RecordType,
        value: String,
    },

    #[error("invalid TTL: {0:?}")]
    InvalidTtl(String),

    #[error("unsupported record type: {0:?}")]
    UnsupportedType(String),
}

/// Failures of the record store itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record {0} already exists")]
    DuplicateRecord(RecordHash),

    #[error("no {record_type} record {fqdn} -> {data}")]
    NotFound {
        record_type: RecordType,
        fqdn: String,
        data: String,
    },

    #[error("store invariant violated: {0}")]
    InvariantViolation(String),
}

/// Outcome kinds a caller of the mutation pipeline has to handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} is a system record and cannot be changed")]
    Immutable(String),

    #[error("{user} may not change {fqdn}")]
    NotAuthorized { user: String, fqdn: String },

    #[error("record {0} already exists")]
    Duplicate(RecordHash),

    #[error("no {record_type} record {fqdn} -> {data}")]
    NotFound {
        record_type: RecordType,
        fqdn: String,
        data: String,
    },

    #[error("store invariant violated: {0}")]
    InvariantViolation(String),
}

impl From<StoreError> for MutationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateRecord(hash) => MutationError::Duplicate(hash),
            StoreError::NotFound {
                record_type,
                fqdn,
                data,
            } => MutationError::NotFound {
                record_type,
                fqdn,
                data,
            },
            StoreError::InvariantViolation(msg) => MutationError::InvariantViolation(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key label must be at least {min} characters, got {label:?}")]
    InvalidLabel { label: String, min: usize },

    #[error("a key labelled {0:?} already exists")]
    DuplicateLabel(String),

    #[error("no key labelled {0:?}")]
    NotFound(String),
}

/// Errors talking to the authoritative name server. Cloneable so a failure can
/// travel with a successful mutation result and into health snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameServerError {
    #[error("name server did not answer within {0:?}")]
    Timeout(Duration),

    #[error("name server I/O error: {0}")]
    Io(String),

    #[error("name server rejected the request: {0}")]
    Rejected(String),

    #[error("malformed name server exchange: {0}")]
    Protocol(String),

    #[error("name server unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for NameServerError {
    fn from(err: std::io::Error) -> Self {
        NameServerError::Io(err.to_string())
    }
}

impl From<hickory_proto::ProtoError> for NameServerError {
    fn from(err: hickory_proto::ProtoError) -> Self {
        NameServerError::Protocol(err.to_string())
    }
}

/// Process-level errors raised while starting up.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid seed record: {0}")]
    Seed(#[from] ValidationError),

    #[error(transparent)]
    NameServer(#[from] NameServerError),
}
