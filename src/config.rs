/* src/config.rs */

use crate::error::Error;
use crate::records::{self, Record};
use crate::zone::Zone;
use fancy_log::{LogLevel, log};
use serde::Deserialize;
use std::env;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_TEMPLATE: &str = r#"
# Managed zone.
[zone]
domain = "example.com"
# Used when a form submits "@" as the address.
default_ipv4 = "192.0.2.1"
default_ipv6 = "2001:db8::1"
# Names that can never be changed here: "@" is the apex, bare labels are
# qualified with the domain, names ending in a dot are taken as-is.
system_hosts = ["@", "www", "ns1", "ns2"]
default_ttl = 300

# Authoritative name server receiving dynamic updates.
[nameserver]
# "dns" sends RFC 2136 updates to `address`; "memory" keeps everything in-process.
mode = "memory"
address = "127.0.0.1:53"
timeout_ms = 2000

[health]
interval_secs = 60
feed_interval_secs = 60

# Records the store starts with.
# [[records]]
# type = "A"
# host = "app"
# value = "@"
# ttl = 300
"#;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub zone: ZoneConfig,
    #[serde(default)]
    pub nameserver: NameServerConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub records: Vec<SeedRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneConfig {
    pub domain: String,
    pub default_ipv4: Ipv4Addr,
    pub default_ipv6: Ipv6Addr,
    #[serde(default = "default_system_hosts")]
    pub system_hosts: Vec<String>,
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NameServerMode {
    Dns,
    #[default]
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct NameServerConfig {
    #[serde(default)]
    pub mode: NameServerMode,
    #[serde(default = "default_nameserver_addr")]
    pub address: SocketAddr,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub feed_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedRecord {
    #[serde(rename = "type", default = "default_seed_type")]
    pub record_type: String,
    pub host: String,
    pub value: String,
    pub ttl: Option<u32>,
}

fn default_system_hosts() -> Vec<String> {
    ["@", "www", "ns1", "ns2"].iter().map(|s| s.to_string()).collect()
}

fn default_ttl() -> u32 {
    300
}

fn default_nameserver_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 53))
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_interval_secs() -> u64 {
    60
}

fn default_seed_type() -> String {
    "A".to_string()
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            mode: NameServerMode::default(),
            address: default_nameserver_addr(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            feed_interval_secs: default_interval_secs(),
        }
    }
}

impl NameServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn feed_interval(&self) -> Duration {
        Duration::from_secs(self.feed_interval_secs)
    }
}

impl AppConfig {
    /// Loads config from `CONFIG_PATH` or defaults to `~/zonekeeper/config.toml`,
    /// writing a commented template there first if nothing exists yet.
    pub fn load_or_create_default() -> Result<Self, Error> {
        let config_path = match env::var("CONFIG_PATH").ok().filter(|s| !s.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => dirs::home_dir()
                .ok_or_else(|| Error::Config("could not find home directory".to_string()))?
                .join("zonekeeper")
                .join("config.toml"),
        };

        if !config_path.exists() {
            log(
                LogLevel::Warn,
                &format!(
                    "Config file not found. Creating default at {:?}",
                    config_path
                ),
            );
            if let Some(parent_dir) = config_path.parent() {
                fs::create_dir_all(parent_dir)?;
            }
            fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        log(
            LogLevel::Info,
            &format!("Loading config from {:?}", config_path),
        );
        let config_str = fs::read_to_string(&config_path)?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, Error> {
        let config: AppConfig = toml::from_str(config_str)?;
        if config.records.is_empty() {
            log(LogLevel::Debug, "Config loaded without seed records.");
        }
        Ok(config)
    }

    pub fn build_zone(&self) -> Result<Zone, Error> {
        Zone::new(
            &self.zone.domain,
            self.zone.default_ipv4,
            self.zone.default_ipv6,
            &self.zone.system_hosts,
        )
    }

    /// Seed records, validated exactly like dashboard input.
    pub fn seed_records(&self, zone: &Zone) -> Result<Vec<Record>, Error> {
        self.records
            .iter()
            .map(|seed| {
                let ttl = seed.ttl.unwrap_or(self.zone.default_ttl).to_string();
                records::validate(&seed.host, &seed.value, &ttl, &seed.record_type, zone)
                    .map_err(Error::from)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordType;

    #[test]
    fn test_default_template_parses() {
        let config = AppConfig::from_toml_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.nameserver.mode, NameServerMode::Memory);
        assert_eq!(config.health.interval(), Duration::from_secs(60));
        let zone = config.build_zone().unwrap();
        assert_eq!(zone.origin(), "example.com.");
        assert!(zone.is_system_record("ns2.example.com."));
        assert!(config.seed_records(&zone).unwrap().is_empty());
    }

    #[test]
    fn test_seed_records_are_validated() {
        let config = AppConfig::from_toml_str(
            r#"
            [zone]
            domain = "example.com"
            default_ipv4 = "10.0.0.1"
            default_ipv6 = "fd00::1"

            [nameserver]
            mode = "dns"
            address = "192.0.2.53:53"

            [[records]]
            host = "app"
            value = "@"

            [[records]]
            type = "AAAA"
            host = "app"
            value = "fd00::9"
            ttl = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.nameserver.mode, NameServerMode::Dns);
        assert_eq!(config.nameserver.timeout(), Duration::from_millis(2000));

        let zone = config.build_zone().unwrap();
        let seeds = config.seed_records(&zone).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].record_type(), RecordType::A);
        assert_eq!(seeds[0].data(), "10.0.0.1");
        assert_eq!(seeds[0].ttl(), 300);
        assert_eq!(seeds[1].fqdn(), "app.example.com.");
        assert_eq!(seeds[1].ttl(), 60);
    }

    #[test]
    fn test_bad_seed_is_an_error() {
        let config = AppConfig::from_toml_str(
            r#"
            [zone]
            domain = "example.com"
            default_ipv4 = "10.0.0.1"
            default_ipv6 = "fd00::1"

            [[records]]
            host = "app"
            value = "not-an-ip"
            "#,
        )
        .unwrap();
        let zone = config.build_zone().unwrap();
        assert!(matches!(config.seed_records(&zone), Err(Error::Seed(_))));
    }

    #[test]
    fn test_missing_zone_is_an_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[health]\ninterval_secs = 5\n"),
            Err(Error::Toml(_))
        ));
    }
}
