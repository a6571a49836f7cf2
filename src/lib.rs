//! zonekeeper - record and API-key management for a single hosted DNS zone.
//!
//! The core owns the live record set and the per-user API keys. Every record
//! change is committed locally under one lock and then mirrored, in commit
//! order, to the authoritative name server. A health monitor probes that
//! server on its own schedule and feeds a live status stream.
//!
//! HTTP routing, sessions and rendering live outside this crate; they call
//! [`Records`], [`KeyStore`] and [`HealthMonitor`] and supply an
//! [`AuthContext`] for the caller.

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod keys;
pub mod mirror;
pub mod nameserver;
pub mod pipeline;
pub mod records;
pub mod store;
pub mod zone;

pub use auth::{AuthContext, Operator};
pub use config::AppConfig;
pub use error::{Error, KeyError, MutationError, NameServerError, StoreError, ValidationError};
pub use health::{HealthMonitor, HealthSnapshot, HealthStatus, StatusFeed};
pub use keys::{ApiKey, KeyIdentity, KeyInfo, KeyStore};
pub use mirror::{MirrorHandle, MirrorStatus};
pub use nameserver::{DnsUpdateClient, MemoryNameServer, MirrorAction, NameServer};
pub use pipeline::{RecordForm, Records, Removed, UpsertOutcome, Upserted};
pub use records::{Record, RecordHash, RecordKey, RecordType, compute_hash};
pub use store::RecordStore;
pub use zone::{AddressFamily, Zone};
