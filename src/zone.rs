/* src/zone.rs */

//! Immutable description of the managed zone.

use crate::error::Error;
use crate::records::{normalize_fqdn, validate_label};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone)]
pub struct Zone {
    domain: String,
    origin: String,
    default_ipv4: Ipv4Addr,
    default_ipv6: Ipv6Addr,
    system_fqdns: HashSet<String>,
}

impl Zone {
    /// `system_hosts` entries are `@` (the apex), a bare label, or an
    /// absolute name ending in a dot.
    pub fn new<I, S>(
        domain: &str,
        default_ipv4: Ipv4Addr,
        default_ipv6: Ipv6Addr,
        system_hosts: I,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return Err(Error::Config("zone domain is empty".to_string()));
        }
        for label in domain.split('.') {
            validate_label(label)
                .map_err(|_| Error::Config(format!("invalid zone domain {:?}", domain)))?;
        }
        let origin = format!("{}.", domain);

        let mut zone = Self {
            domain,
            origin,
            default_ipv4,
            default_ipv6,
            system_fqdns: HashSet::new(),
        };

        for host in system_hosts {
            let host = host.as_ref().trim();
            let fqdn = if host == "@" {
                zone.origin.clone()
            } else if host.ends_with('.') {
                normalize_fqdn(host)
            } else {
                let label = validate_label(host)
                    .map_err(|_| Error::Config(format!("invalid system host {:?}", host)))?;
                zone.qualify(&label)
            };
            zone.system_fqdns.insert(fqdn);
        }

        Ok(zone)
    }

    /// Zone domain without the trailing dot, e.g. `example.com`.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Absolute apex name, e.g. `example.com.`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn default_ipv4(&self) -> Ipv4Addr {
        self.default_ipv4
    }

    pub fn default_ipv6(&self) -> Ipv6Addr {
        self.default_ipv6
    }

    pub fn default_address(&self, family: AddressFamily) -> IpAddr {
        match family {
            AddressFamily::V4 => IpAddr::V4(self.default_ipv4),
            AddressFamily::V6 => IpAddr::V6(self.default_ipv6),
        }
    }

    /// `api` -> `api.example.com.`
    pub fn qualify(&self, label: &str) -> String {
        format!("{}.{}", label.trim().to_ascii_lowercase(), self.origin)
    }

    pub fn is_system_record(&self, fqdn: &str) -> bool {
        self.system_fqdns.contains(&normalize_fqdn(fqdn))
    }

    /// True for the apex and any name below it.
    pub fn contains(&self, fqdn: &str) -> bool {
        let fqdn = normalize_fqdn(fqdn);
        fqdn == self.origin || fqdn.ends_with(&format!(".{}", self.origin))
    }

    pub fn system_fqdns(&self) -> impl Iterator<Item = &str> {
        self.system_fqdns.iter().map(String::as_str)
    }
}
