//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use zonekeeper::{AuthContext, MemoryNameServer, MirrorHandle, Operator, RecordStore, Records, Zone};

pub const DOMAIN: &str = "example.com.";
pub const DEFAULT_IPV4: &str = "10.0.0.1";
pub const DEFAULT_IPV6: &str = "fd00::1";

pub fn zone() -> Arc<Zone> {
    Arc::new(
        Zone::new(
            DOMAIN,
            DEFAULT_IPV4.parse().unwrap(),
            DEFAULT_IPV6.parse().unwrap(),
            ["@", "www", "ns1", "ns2"],
        )
        .unwrap(),
    )
}

/// Records facade wired to an in-memory name server.
pub struct Harness {
    pub records: Records,
    pub server: Arc<MemoryNameServer>,
    pub operator: Operator,
}

pub fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(2))
}

pub fn harness_with_timeout(mirror_timeout: Duration) -> Harness {
    let zone = zone();
    let server = Arc::new(MemoryNameServer::new());
    let mirror = MirrorHandle::spawn(server.clone(), mirror_timeout);
    let records = Records::new(RecordStore::new(mirror), zone.clone());
    Harness {
        records,
        server,
        operator: Operator::new("alice", zone),
    }
}

/// Caller that may only touch the listed names.
pub struct Restricted {
    pub user: String,
    pub allowed: Vec<String>,
}

impl Restricted {
    pub fn new(user: &str, allowed: &[&str]) -> Self {
        Self {
            user: user.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AuthContext for Restricted {
    fn current_user(&self) -> &str {
        &self.user
    }

    fn can_mutate(&self, fqdn: &str) -> bool {
        self.allowed.iter().any(|a| a == fqdn)
    }
}
