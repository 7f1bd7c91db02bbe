//! Rack/data center resolution for storage node addresses
//!
//! The mapping is a TOML document:
//!
//! ```toml
//! [[data_centers]]
//! name = "dc1"
//!
//! [[data_centers.racks]]
//! name = "rack1"
//! ips = ["10.0.0.5", "10.0.1.0/24"]
//! ```
//!
//! Resolution order: an exact IP entry, then the most specific CIDR range,
//! then the hints sent by the node, then the default buckets.

use crate::common::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

pub const DEFAULT_DATA_CENTER: &str = "DefaultDataCenter";
pub const DEFAULT_RACK: &str = "DefaultRack";

#[derive(Debug, Deserialize)]
struct ConfigurationFile {
    #[serde(default)]
    data_centers: Vec<DataCenterEntry>,
}

#[derive(Debug, Deserialize)]
struct DataCenterEntry {
    name: String,
    #[serde(default)]
    racks: Vec<RackEntry>,
}

#[derive(Debug, Deserialize)]
struct RackEntry {
    name: String,
    #[serde(default)]
    ips: Vec<String>,
}

/// An address range in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    fn parse(s: &str) -> Result<Self> {
        let bad = || Error::InvalidConfig(format!("invalid CIDR range: {}", s));
        let (addr, prefix) = s.split_once('/').ok_or_else(bad)?;
        let network: IpAddr = addr.trim().parse().map_err(|_| bad())?;
        let prefix: u8 = prefix.trim().parse().map_err(|_| bad())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(bad());
        }
        Ok(Self { network, prefix })
    }

    fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    data_center: String,
    rack: String,
}

/// Resolver from node address to (data center, rack)
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    exact: HashMap<IpAddr, Location>,
    ranges: Vec<(Cidr, Location)>,
}

impl Configuration {
    /// Resolver with no configured mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the mapping file.
    ///
    /// No path or a missing file yields the default resolver; an unreadable
    /// or malformed file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::new());
        };
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let conf = Self::from_toml_str(&contents)?;
                tracing::info!(
                    "Loaded topology configuration from {} ({} addresses, {} ranges)",
                    path.display(),
                    conf.exact.len(),
                    conf.ranges.len()
                );
                Ok(conf)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "Topology configuration {} not found, using default configuration",
                    path.display()
                );
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: ConfigurationFile = config::Config::builder()
            .add_source(config::File::from_str(s, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        let mut conf = Self::new();
        for dc in file.data_centers {
            if dc.name.trim().is_empty() {
                return Err(Error::InvalidConfig("data center without a name".into()));
            }
            for rack in dc.racks {
                if rack.name.trim().is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "rack without a name in data center {}",
                        dc.name
                    )));
                }
                let location = Location {
                    data_center: dc.name.clone(),
                    rack: rack.name.clone(),
                };
                for entry in &rack.ips {
                    conf.add_entry(entry, location.clone())?;
                }
            }
        }
        Ok(conf)
    }

    fn add_entry(&mut self, entry: &str, location: Location) -> Result<()> {
        if entry.contains('/') {
            let cidr = Cidr::parse(entry)?;
            if self.ranges.iter().any(|(c, _)| *c == cidr) {
                return Err(Error::InvalidConfig(format!("duplicate range {}", entry)));
            }
            self.ranges.push((cidr, location));
            return Ok(());
        }

        let ip: IpAddr = entry
            .trim()
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("invalid IP address: {}", entry)))?;
        if self.exact.insert(ip, location).is_some() {
            return Err(Error::InvalidConfig(format!("duplicate address {}", entry)));
        }
        Ok(())
    }

    /// Resolve the (data center, rack) a node at `ip` belongs to
    pub fn locate(&self, ip: &str, dc_hint: &str, rack_hint: &str) -> (String, String) {
        if let Some(location) = self.lookup(ip) {
            return (location.data_center.clone(), location.rack.clone());
        }

        let dc = if dc_hint.is_empty() {
            DEFAULT_DATA_CENTER
        } else {
            dc_hint
        };
        let rack = if rack_hint.is_empty() {
            DEFAULT_RACK
        } else {
            rack_hint
        };
        (dc.to_string(), rack.to_string())
    }

    fn lookup(&self, ip: &str) -> Option<&Location> {
        let ip: IpAddr = ip.parse().ok()?;
        if let Some(location) = self.exact.get(&ip) {
            return Some(location);
        }
        self.ranges
            .iter()
            .filter(|(cidr, _)| cidr.contains(&ip))
            .max_by_key(|(cidr, _)| cidr.prefix)
            .map(|(_, location)| location)
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[data_centers]]
        name = "dc1"

        [[data_centers.racks]]
        name = "rack1"
        ips = ["10.0.0.5", "10.0.1.0/24"]

        [[data_centers.racks]]
        name = "rack2"
        ips = ["10.0.0.0/16"]

        [[data_centers]]
        name = "dc2"

        [[data_centers.racks]]
        name = "rackA"
        ips = ["192.168.1.10", "fd00::/8"]
    "#;

    #[test]
    fn test_exact_match_wins_over_hints() {
        let conf = Configuration::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            conf.locate("10.0.0.5", "dcX", "rackX"),
            ("dc1".to_string(), "rack1".to_string())
        );
        assert_eq!(
            conf.locate("192.168.1.10", "", ""),
            ("dc2".to_string(), "rackA".to_string())
        );
    }

    #[test]
    fn test_most_specific_range_wins() {
        let conf = Configuration::from_toml_str(SAMPLE).unwrap();
        assert_eq!(conf.locate("10.0.1.77", "", "").1, "rack1");
        assert_eq!(conf.locate("10.0.9.1", "", "").1, "rack2");
        assert_eq!(conf.locate("fd00::1", "", "").0, "dc2");
    }

    #[test]
    fn test_hints_then_defaults() {
        let conf = Configuration::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            conf.locate("172.16.0.1", "dc9", "r9"),
            ("dc9".to_string(), "r9".to_string())
        );
        assert_eq!(
            conf.locate("172.16.0.1", "dc9", ""),
            ("dc9".to_string(), DEFAULT_RACK.to_string())
        );
        assert_eq!(
            Configuration::new().locate("host.local", "", ""),
            (DEFAULT_DATA_CENTER.to_string(), DEFAULT_RACK.to_string())
        );
    }

    #[test]
    fn test_malformed_documents_rejected() {
        assert!(Configuration::from_toml_str("[[data_centers]\nname=").is_err());
        assert!(Configuration::from_toml_str(
            "[[data_centers]]\nname = \"dc\"\n[[data_centers.racks]]\nname = \"r\"\nips = [\"10.0.0.300\"]"
        )
        .is_err());
        assert!(Configuration::from_toml_str(
            "[[data_centers]]\nname = \"dc\"\n[[data_centers.racks]]\nname = \"r\"\nips = [\"10.0.0.0/40\"]"
        )
        .is_err());
        assert!(Configuration::from_toml_str(
            "[[data_centers]]\nname = \"dc\"\n[[data_centers.racks]]\nname = \"r\"\nips = [\"10.0.0.1\", \"10.0.0.1\"]"
        )
        .is_err());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let conf = Configuration::load(Some(&dir.path().join("topology.toml"))).unwrap();
        assert!(conf.is_empty());
        assert!(Configuration::load(None).unwrap().is_empty());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.toml");
        std::fs::write(&path, "data_centers = 5").unwrap();
        assert!(Configuration::load(Some(&path)).is_err());
    }

    #[test]
    fn test_cidr_edges() {
        let all = Cidr::parse("0.0.0.0/0").unwrap();
        assert!(all.contains(&"1.2.3.4".parse().unwrap()));
        assert!(!all.contains(&"::1".parse().unwrap()));
        let host = Cidr::parse("10.0.0.1/32").unwrap();
        assert!(host.contains(&"10.0.0.1".parse().unwrap()));
        assert!(!host.contains(&"10.0.0.2".parse().unwrap()));
    }
}
