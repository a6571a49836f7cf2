/* src/records.rs */

//! Record model, content-derived identity and form validation.

use crate::error::ValidationError;
use crate::zone::{AddressFamily, Zone};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Value that stands for "the zone default" in the address field of a form.
pub const DEFAULT_ADDRESS_SENTINEL: &str = "@";

pub const MIN_TTL: u32 = 1;
pub const MAX_TTL: u32 = 86_400;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 253;
const MAX_TXT_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
        }
    }

    /// Address family carried by this type, if it is an address record.
    pub fn family(&self) -> Option<AddressFamily> {
        match self {
            RecordType::A => Some(AddressFamily::V4),
            RecordType::AAAA => Some(AddressFamily::V6),
            RecordType::CNAME | RecordType::TXT => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "TXT" => Ok(RecordType::TXT),
            _ => Err(ValidationError::UnsupportedType(s.to_string())),
        }
    }
}

impl From<RecordType> for hickory_proto::rr::RecordType {
    fn from(rtype: RecordType) -> Self {
        match rtype {
            RecordType::A => hickory_proto::rr::RecordType::A,
            RecordType::AAAA => hickory_proto::rr::RecordType::AAAA,
            RecordType::CNAME => hickory_proto::rr::RecordType::CNAME,
            RecordType::TXT => hickory_proto::rr::RecordType::TXT,
        }
    }
}

/// Hex-encoded SHA-256 of a record's (type, fqdn, data) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordHash(String);

impl RecordHash {
    /// Accepts a hash handed back by a client (e.g. from a URL), if well formed.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(RecordHash(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a record. TTL is metadata and deliberately not part of it.
pub fn compute_hash(record_type: RecordType, fqdn: &str, data: &str) -> RecordHash {
    let mut hasher = Sha256::new();
    hasher.update(record_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(fqdn.as_bytes());
    hasher.update([0u8]);
    hasher.update(data.as_bytes());
    RecordHash(hex::encode(hasher.finalize()))
}

/// Lower-cases a name and makes it absolute (trailing dot).
pub fn normalize_fqdn(name: &str) -> String {
    let mut fqdn = name.trim().to_ascii_lowercase();
    if !fqdn.ends_with('.') {
        fqdn.push('.');
    }
    fqdn
}

/// A single resource record. Never mutated in place: any change is a new
/// value with a new hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    #[serde(rename = "type")]
    record_type: RecordType,
    fqdn: String,
    data: String,
    ttl: u32,
    hash: RecordHash,
}

/// Addresses in their canonical text form; anything else trimmed.
fn canonical_data(record_type: RecordType, data: &str) -> String {
    let data = data.trim();
    let canonical = match record_type {
        RecordType::A => data.parse::<Ipv4Addr>().map(|ip| ip.to_string()).ok(),
        RecordType::AAAA => data.parse::<Ipv6Addr>().map(|ip| ip.to_string()).ok(),
        RecordType::CNAME | RecordType::TXT => None,
    };
    canonical.unwrap_or_else(|| data.to_string())
}

impl Record {
    /// Unchecked constructor. Records leave the crate only through `build`
    /// and `validate`.
    pub(crate) fn new(record_type: RecordType, fqdn: &str, data: &str, ttl: u32) -> Self {
        let fqdn = normalize_fqdn(fqdn);
        let data = canonical_data(record_type, data);
        let hash = compute_hash(record_type, &fqdn, &data);
        Self {
            record_type,
            fqdn,
            data,
            ttl,
            hash,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Address for A/AAAA, canonical name for CNAME, text for TXT.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn hash(&self) -> &RecordHash {
        &self.hash
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            record_type: self.record_type,
            fqdn: self.fqdn.clone(),
            data: self.data.clone(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} (ttl {})",
            self.record_type, self.fqdn, self.data, self.ttl
        )
    }
}

/// Selects exactly one record by its identity triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub record_type: RecordType,
    pub fqdn: String,
    pub data: String,
}

impl RecordKey {
    pub fn new(record_type: RecordType, fqdn: &str, data: &str) -> Self {
        Self {
            record_type,
            fqdn: normalize_fqdn(fqdn),
            data: canonical_data(record_type, data),
        }
    }

    pub fn hash(&self) -> RecordHash {
        compute_hash(self.record_type, &self.fqdn, &self.data)
    }
}

/// Turns raw form input into a record of the zone.
pub fn validate(
    hostname: &str,
    value: &str,
    ttl: &str,
    record_type: &str,
    zone: &Zone,
) -> Result<Record, ValidationError> {
    let record_type: RecordType = record_type.parse()?;
    let label = validate_label(hostname)?;
    let ttl = validate_ttl(ttl)?;
    build(record_type, &label, value, ttl, zone)
}

/// Builds a record of the zone from typed input.
///
/// `host` is a bare label, `@` for the apex, or an absolute name ending in a
/// dot. The `@` sentinel in `value` is resolved to the zone default of the
/// matching family (or the apex for CNAME) before it is validated.
pub fn build(
    record_type: RecordType,
    host: &str,
    value: &str,
    ttl: u32,
    zone: &Zone,
) -> Result<Record, ValidationError> {
    let fqdn = resolve_host(host, zone)?;
    let ttl = check_ttl(ttl)?;
    let value = value.trim();

    let data = match record_type {
        RecordType::A => {
            let value = if value == DEFAULT_ADDRESS_SENTINEL {
                zone.default_ipv4().to_string()
            } else {
                value.to_string()
            };
            value
                .parse::<Ipv4Addr>()
                .map_err(|_| ValidationError::InvalidAddress {
                    record_type,
                    value: value.clone(),
                })?
                .to_string()
        }
        RecordType::AAAA => {
            let value = if value == DEFAULT_ADDRESS_SENTINEL {
                zone.default_ipv6().to_string()
            } else {
                value.to_string()
            };
            value
                .parse::<Ipv6Addr>()
                .map_err(|_| ValidationError::InvalidAddress {
                    record_type,
                    value: value.clone(),
                })?
                .to_string()
        }
        RecordType::CNAME => {
            if value == DEFAULT_ADDRESS_SENTINEL {
                zone.origin().to_string()
            } else {
                validate_target(record_type, value, zone)?
            }
        }
        RecordType::TXT => validate_txt(value)?,
    };

    Ok(Record::new(record_type, &fqdn, &data, ttl))
}

fn resolve_host(host: &str, zone: &Zone) -> Result<String, ValidationError> {
    let host = host.trim();
    if host == DEFAULT_ADDRESS_SENTINEL {
        return Ok(zone.origin().to_string());
    }
    match host.strip_suffix('.') {
        Some(name) => validate_name(name)
            .map_err(|_| ValidationError::InvalidHostname(host.to_string())),
        None => Ok(zone.qualify(&validate_label(host)?)),
    }
}

/// Dotted name without the trailing dot, made absolute.
fn validate_name(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ValidationError::InvalidHostname(name.to_string()));
    }
    for label in name.split('.') {
        validate_label(label)?;
    }
    Ok(normalize_fqdn(name))
}

/// Letters, digits and hyphens; no leading or trailing hyphen.
pub fn validate_label(label: &str) -> Result<String, ValidationError> {
    let label = label.trim();
    let ok = !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && !label.starts_with('-')
        && !label.ends_with('-');
    if ok {
        Ok(label.to_ascii_lowercase())
    } else {
        Err(ValidationError::InvalidHostname(label.to_string()))
    }
}

pub fn validate_ttl(ttl: &str) -> Result<u32, ValidationError> {
    ttl.trim()
        .parse::<u32>()
        .ok()
        .and_then(|n| check_ttl(n).ok())
        .ok_or_else(|| ValidationError::InvalidTtl(ttl.to_string()))
}

fn check_ttl(ttl: u32) -> Result<u32, ValidationError> {
    if (MIN_TTL..=MAX_TTL).contains(&ttl) {
        Ok(ttl)
    } else {
        Err(ValidationError::InvalidTtl(ttl.to_string()))
    }
}

/// A target without any dot is a host of this zone; anything else is taken
/// as an absolute name.
fn validate_target(
    record_type: RecordType,
    value: &str,
    zone: &Zone,
) -> Result<String, ValidationError> {
    let invalid = |_| ValidationError::InvalidTarget {
        record_type,
        value: value.to_string(),
    };
    if !value.contains('.') {
        return validate_label(value).map(|label| zone.qualify(&label)).map_err(invalid);
    }
    validate_name(value.strip_suffix('.').unwrap_or(value)).map_err(invalid)
}

fn validate_txt(value: &str) -> Result<String, ValidationError> {
    let ok = !value.is_empty()
        && value.len() <= MAX_TXT_LEN
        && value.bytes().all(|b| (0x20..=0x7e).contains(&b));
    if ok {
        Ok(value.to_string())
    } else {
        Err(ValidationError::InvalidTarget {
            record_type: RecordType::TXT,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Zone {
        Zone::new(
            "example.com.",
            "10.0.0.1".parse().unwrap(),
            "fd00::1".parse().unwrap(),
            &["@", "www", "ns1"],
        )
        .unwrap()
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = compute_hash(RecordType::A, "host.example.com.", "1.1.1.1");
        let b = compute_hash(RecordType::A, "host.example.com.", "1.1.1.1");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_hash_distinguishes_each_field() {
        let base = compute_hash(RecordType::A, "host.example.com.", "1.1.1.1");
        assert_ne!(base, compute_hash(RecordType::A, "host.example.com.", "1.1.1.2"));
        assert_ne!(base, compute_hash(RecordType::A, "hosts.example.com.", "1.1.1.1"));
        assert_ne!(base, compute_hash(RecordType::TXT, "host.example.com.", "1.1.1.1"));
        // field boundaries are not ambiguous
        assert_ne!(
            compute_hash(RecordType::TXT, "a.", "bc"),
            compute_hash(RecordType::TXT, "a.b", "c")
        );
    }

    #[test]
    fn test_ttl_is_not_identity() {
        let short = Record::new(RecordType::A, "host.example.com.", "1.1.1.1", 60);
        let long = Record::new(RecordType::A, "host.example.com.", "1.1.1.1", 3600);
        assert_eq!(short.hash(), long.hash());
    }

    #[test]
    fn test_record_normalizes_fqdn() {
        let record = Record::new(RecordType::A, "Host.Example.COM", "1.1.1.1", 60);
        assert_eq!(record.fqdn(), "host.example.com.");
        assert_eq!(record.key().hash(), *record.hash());
    }

    #[test]
    fn test_validate_resolves_sentinel_per_family() {
        let zone = zone();
        let a = validate("api", "@", "300", "A", &zone).unwrap();
        assert_eq!(a.fqdn(), "api.example.com.");
        assert_eq!(a.data(), "10.0.0.1");
        assert_eq!(a.ttl(), 300);

        let aaaa = validate("api", "@", "300", "aaaa", &zone).unwrap();
        assert_eq!(aaaa.data(), "fd00::1");

        let cname = validate("alias", "@", "300", "CNAME", &zone).unwrap();
        assert_eq!(cname.data(), "example.com.");
    }

    #[test]
    fn test_validate_checks_family() {
        let zone = zone();
        assert!(matches!(
            validate("api", "fd00::2", "300", "A", &zone),
            Err(ValidationError::InvalidAddress { .. })
        ));
        assert!(matches!(
            validate("api", "10.0.0.2", "300", "AAAA", &zone),
            Err(ValidationError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_validate_canonicalizes_ipv6() {
        let zone = zone();
        let record = validate("api", "FD00:0:0:0:0:0:0:2", "300", "AAAA", &zone).unwrap();
        assert_eq!(record.data(), "fd00::2");
    }

    #[test]
    fn test_validate_hostname_rules() {
        assert!(validate_label("api-1").is_ok());
        assert_eq!(validate_label("API").unwrap(), "api");
        assert!(validate_label("").is_err());
        assert!(validate_label("-api").is_err());
        assert!(validate_label("api-").is_err());
        assert!(validate_label("a.b").is_err());
        assert!(validate_label("under_score").is_err());
        assert!(validate_label(&"a".repeat(64)).is_err());
        assert!(validate_label(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_validate_ttl_bounds() {
        assert_eq!(validate_ttl("60").unwrap(), 60);
        assert!(validate_ttl("0").is_err());
        assert!(validate_ttl("-5").is_err());
        assert!(validate_ttl("86401").is_err());
        assert!(validate_ttl("soon").is_err());
    }

    #[test]
    fn test_validate_type_and_targets() {
        let zone = zone();
        assert!(matches!(
            validate("api", "10.0.0.2", "300", "MX", &zone),
            Err(ValidationError::UnsupportedType(_))
        ));

        let cname = validate("docs", "Pages.Host.net", "300", "cname", &zone).unwrap();
        assert_eq!(cname.data(), "pages.host.net.");
        assert!(validate("docs", "bad_name.net", "300", "CNAME", &zone).is_err());

        let txt = validate("api", "v=spf1 -all", "300", "TXT", &zone).unwrap();
        assert_eq!(txt.data(), "v=spf1 -all");
        assert!(validate("api", "", "300", "TXT", &zone).is_err());
    }

    #[test]
    fn test_build_resolves_hosts() {
        let zone = zone();
        let api = build(RecordType::A, "api", "@", 300, &zone).unwrap();
        assert_eq!(api.fqdn(), "api.example.com.");
        assert_eq!(api.data(), "10.0.0.1");

        let apex = build(RecordType::TXT, "@", "v=spf1 -all", 300, &zone).unwrap();
        assert_eq!(apex.fqdn(), "example.com.");

        let absolute = build(RecordType::A, "Deep.Host.example.com.", "1.1.1.1", 300, &zone).unwrap();
        assert_eq!(absolute.fqdn(), "deep.host.example.com.");

        assert!(matches!(
            build(RecordType::A, "deep.host", "1.1.1.1", 300, &zone),
            Err(ValidationError::InvalidHostname(_))
        ));
        assert!(matches!(
            build(RecordType::A, "bad_name.example.com.", "1.1.1.1", 300, &zone),
            Err(ValidationError::InvalidHostname(_))
        ));
    }

    #[test]
    fn test_build_checks_family_and_ttl() {
        let zone = zone();
        assert!(matches!(
            build(RecordType::AAAA, "host", "1.1.1.1", 300, &zone),
            Err(ValidationError::InvalidAddress { .. })
        ));
        assert!(matches!(
            build(RecordType::A, "host", "1.1.1.1", 0, &zone),
            Err(ValidationError::InvalidTtl(_))
        ));
        assert!(matches!(
            build(RecordType::A, "host", "1.1.1.1", MAX_TTL + 1, &zone),
            Err(ValidationError::InvalidTtl(_))
        ));
    }

    #[test]
    fn test_bare_cname_target_is_qualified() {
        let zone = zone();
        let cname = validate("docs", "app", "300", "CNAME", &zone).unwrap();
        assert_eq!(cname.data(), "app.example.com.");

        let absolute = validate("docs", "app.", "300", "CNAME", &zone).unwrap();
        assert_eq!(absolute.data(), "app.");
    }

    #[test]
    fn test_key_matches_canonical_address() {
        let zone = zone();
        let record = validate("api", "fd00::2", "300", "AAAA", &zone).unwrap();
        let key = RecordKey::new(RecordType::AAAA, "API.example.com", "FD00:0:0:0:0:0:0:2");
        assert_eq!(key.hash(), *record.hash());

        let v4 = RecordKey::new(RecordType::A, "api.example.com.", " 10.0.0.1 ");
        assert_eq!(v4.data, "10.0.0.1");
    }

    #[test]
    fn test_record_hash_parse() {
        let hash = compute_hash(RecordType::A, "host.", "1.1.1.1");
        assert_eq!(RecordHash::parse(hash.as_str()), Some(hash.clone()));
        assert_eq!(
            RecordHash::parse(&hash.as_str().to_ascii_uppercase()),
            Some(hash)
        );
        assert!(RecordHash::parse("abc").is_none());
    }
}
