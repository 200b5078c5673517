//! Directory service configuration
//!
//! The configuration file is a flat list of `<key> <value>` lines, the same shape as
//! the `ldap.conf` files already deployed next to the monitoring host. Only the keys
//! below are understood, anything else is ignored.
//!
//! ```text
//! uri ldap://ldap.example.org
//! binddn cn=proxyagent,ou=profile,dc=example,dc=org
//! bindpw s3cr3t
//! base ou=hosts,dc=example,dc=org
//! ssl start_tls
//! tls_checkpeer yes
//! timeout 10s
//! ```

use core::fmt;
use core::time::Duration;
use std::collections::HashMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

pub const DEFAULT_CONF_PATH: &str = "/etc/ldap/puppet-freshness.conf";
pub const CONF_PATH_ENV: &str = "PUPPET_FRESHNESS_CONFIG";

pub const DEFAULT_BASE: &str = "ou=hosts,dc=wikimedia,dc=org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ConfError {
    #[error("couldn't read configuration file at {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{0}` is missing")]
    MissingKey(&'static str),
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: &'static str, value: String },
}

/// How the transport is secured after the TCP connection is opened
///
/// `ldaps://` URIs are TLS from the first byte regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    StartTls,
    Off,
}

#[derive(Clone)]
pub struct DirectoryConf {
    pub uri: String,
    pub bind_dn: String,
    pub bind_pw: String,
    pub base: String,
    pub tls: TlsMode,
    pub verify_peer: bool,
    pub timeout: Duration,
}

impl fmt::Debug for DirectoryConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConf")
            .field("uri", &self.uri)
            .field("bind_dn", &self.bind_dn)
            .field("bind_pw", &"***")
            .field("base", &self.base)
            .field("tls", &self.tls)
            .field("verify_peer", &self.verify_peer)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DirectoryConf {
    pub fn new(uri: impl Into<String>, bind_dn: impl Into<String>, bind_pw: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            bind_dn: bind_dn.into(),
            bind_pw: bind_pw.into(),
            base: DEFAULT_BASE.to_owned(),
            tls: TlsMode::StartTls,
            verify_peer: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, ConfError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfError::Read {
            path: path.to_owned(),
            source,
        })?;

        Self::from_conf_lines(parse_conf_lines(&text))
    }

    pub fn from_conf_lines(mut lines: HashMap<String, String>) -> Result<Self, ConfError> {
        let mut take_required = |key: &'static str| lines.remove(key).ok_or(ConfError::MissingKey(key));

        let mut conf = Self::new(take_required("uri")?, take_required("binddn")?, take_required("bindpw")?);

        if let Some(base) = lines.remove("base") {
            conf.base = base;
        }

        if let Some(ssl) = lines.remove("ssl") {
            conf.tls = match ssl.to_ascii_lowercase().as_str() {
                "start_tls" | "on" | "yes" | "true" => TlsMode::StartTls,
                "off" | "no" | "false" => TlsMode::Off,
                _ => return Err(ConfError::InvalidValue { key: "ssl", value: ssl }),
            };
        }

        if let Some(checkpeer) = lines.remove("tls_checkpeer") {
            conf.verify_peer = match checkpeer.to_ascii_lowercase().as_str() {
                "yes" | "on" | "true" => true,
                "no" | "off" | "false" => false,
                _ => {
                    return Err(ConfError::InvalidValue {
                        key: "tls_checkpeer",
                        value: checkpeer,
                    });
                }
            };
        }

        if let Some(timeout) = lines.remove("timeout") {
            conf.timeout = humantime::parse_duration(&timeout).map_err(|_| ConfError::InvalidValue {
                key: "timeout",
                value: timeout,
            })?;
        }

        for key in lines.keys() {
            trace!(%key, "Ignored configuration key");
        }

        Ok(conf)
    }
}

/// Splits each line on its first space
///
/// Keys are lowercased, values are trimmed. Blank lines and `#` comments are skipped,
/// and so are lines holding a key with no value. The last occurrence of a key wins.
pub fn parse_conf_lines(text: &str) -> HashMap<String, String> {
    let mut lines = HashMap::new();

    for line in text.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once(' ') else {
            debug!(line, "Configuration line without value");
            continue;
        };

        lines.insert(key.to_ascii_lowercase(), value.trim().to_owned());
    }

    lines
}
