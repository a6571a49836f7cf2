/* src/auth.rs */

use crate::zone::Zone;
use std::sync::Arc;

/// Who is calling, and what they may change. Supplied by the HTTP layer after
/// it has authenticated the request (session or API key).
pub trait AuthContext: Send + Sync {
    fn current_user(&self) -> &str;

    fn can_mutate(&self, fqdn: &str) -> bool;
}

/// An authenticated operator: may change any name inside the managed zone.
#[derive(Debug, Clone)]
pub struct Operator {
    user: String,
    zone: Arc<Zone>,
}

impl Operator {
    pub fn new(user: &str, zone: Arc<Zone>) -> Self {
        Self {
            user: user.to_string(),
            zone,
        }
    }
}

impl AuthContext for Operator {
    fn current_user(&self) -> &str {
        &self.user
    }

    fn can_mutate(&self, fqdn: &str) -> bool {
        self.zone.contains(fqdn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_is_scoped_to_zone() {
        let zone = Zone::new(
            "example.com",
            "10.0.0.1".parse().unwrap(),
            "fd00::1".parse().unwrap(),
            ["@"],
        )
        .unwrap();
        let operator = Operator::new("alice", Arc::new(zone));
        assert_eq!(operator.current_user(), "alice");
        assert!(operator.can_mutate("api.example.com."));
        assert!(!operator.can_mutate("api.example.org."));
    }
}
