//! Host records built from the directory inventory
//!
//! Only entries describing an instance are kept. An instance entry carries a
//! `puppetVar: instancename=<name>` value, at least one `aRecord` address and a `dc`
//! identifier such as `i-000004d2`.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::directory::DirectoryEntry;

pub const INSTANCE_NAME_VAR: &str = "instancename";

/// Custom `key=value` pairs stored in the `puppetVar` attribute
pub fn puppet_vars(entry: &DirectoryEntry) -> HashMap<&str, &str> {
    entry
        .values("puppetVar")
        .unwrap_or_default()
        .iter()
        .filter_map(|var| var.split_once('='))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub id: String,
    pub hostname: String,
    pub ips: Vec<IpAddr>,
}

impl HostRecord {
    pub fn from_entry(entry: &DirectoryEntry) -> Option<Self> {
        let vars = puppet_vars(entry);

        let Some(instance_name) = vars.get(INSTANCE_NAME_VAR).copied() else {
            trace!(dn = %entry.dn, "Not an instance");
            return None;
        };

        let ips: Vec<IpAddr> = entry
            .values("aRecord")
            .unwrap_or_default()
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .filter_map(|value| match value.parse() {
                Ok(ip) => Some(ip),
                Err(error) => {
                    debug!(dn = %entry.dn, value, %error, "Skipped malformed address");
                    None
                }
            })
            .collect();

        if ips.is_empty() {
            debug!(dn = %entry.dn, "Instance without address");
            return None;
        }

        let Some(id) = entry.first_value("dc") else {
            debug!(dn = %entry.dn, "Instance without identifier");
            return None;
        };

        let hostname = entry
            .values("associatedDomain")
            .unwrap_or_default()
            .iter()
            .find(|domain| domain.starts_with(instance_name))
            .map_or(id, String::as_str);

        Some(Self {
            id: id.to_owned(),
            hostname: hostname.to_owned(),
            ips,
        })
    }
}

#[derive(Debug, Default)]
pub struct Inventory {
    records: Vec<HostRecord>,
}

impl Inventory {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a DirectoryEntry>) -> Self {
        let records = entries.into_iter().filter_map(HostRecord::from_entry).collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record, in directory order, owning `ip`
    pub fn find_by_ip(&self, ip: IpAddr) -> Option<&HostRecord> {
        self.records.iter().find(|record| record.ips.contains(&ip))
    }
}
