use core::time::Duration;
use std::collections::HashMap;

use anyhow::Context as _;
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};

use crate::config::{DirectoryConf, TlsMode};

/// Every host inventory entry is a `dcObject`
pub const HOST_FILTER: &str = "(objectclass=dcobject)";

pub const HOST_ATTRIBUTES: [&str; 5] = ["dc", "aRecord", "associatedDomain", "puppetVar", "puppetClass"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs
            .insert(name.to_owned(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Attribute names are case-insensitive, servers are free to return `arecord` for `aRecord`
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name)?.first().map(String::as_str)
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attrs: entry.attrs,
        }
    }
}

#[async_trait]
pub trait HostDirectory: Send {
    /// Runs the host inventory search and returns every matching entry
    async fn search_hosts(&mut self) -> anyhow::Result<Vec<DirectoryEntry>>;

    async fn close(&mut self);
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("couldn't connect to {uri}")]
    Connect {
        uri: String,
        #[source]
        source: LdapError,
    },
    #[error("bind as {bind_dn} failed")]
    Bind {
        bind_dn: String,
        #[source]
        source: LdapError,
    },
    #[error("directory didn't answer within {0:?}")]
    Timeout(Duration),
}

pub struct LdapDirectory {
    ldap: Ldap,
    base: String,
    timeout: Duration,
}

impl LdapDirectory {
    #[instrument(skip_all, fields(uri = %conf.uri))]
    pub async fn connect(conf: &DirectoryConf) -> Result<Self, ConnectError> {
        match tokio::time::timeout(conf.timeout, Self::connect_and_bind(conf)).await {
            Ok(res) => res,
            Err(_) => Err(ConnectError::Timeout(conf.timeout)),
        }
    }

    async fn connect_and_bind(conf: &DirectoryConf) -> Result<Self, ConnectError> {
        let is_ldaps = conf.uri.to_ascii_lowercase().starts_with("ldaps://");
        let starttls = !is_ldaps && conf.tls == TlsMode::StartTls;

        if !is_ldaps && !starttls {
            warn!("StartTLS is disabled, bind credentials are sent in clear text");
        }

        if !conf.verify_peer {
            warn!("Server certificate verification is disabled");
        }

        let settings = LdapConnSettings::new()
            .set_conn_timeout(conf.timeout)
            .set_starttls(starttls)
            .set_no_tls_verify(!conf.verify_peer);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &conf.uri)
            .await
            .map_err(|source| ConnectError::Connect {
                uri: conf.uri.clone(),
                source,
            })?;

        tokio::spawn(async move {
            if let Err(error) = conn.drive().await {
                warn!(%error, "Directory connection failed");
            }
        });

        debug!(starttls, "Connected");

        ldap.simple_bind(&conf.bind_dn, &conf.bind_pw)
            .await
            .and_then(|res| res.success())
            .map_err(|source| ConnectError::Bind {
                bind_dn: conf.bind_dn.clone(),
                source,
            })?;

        debug!(bind_dn = %conf.bind_dn, "Bound");

        Ok(Self {
            ldap,
            base: conf.base.clone(),
            timeout: conf.timeout,
        })
    }
}

#[async_trait]
impl HostDirectory for LdapDirectory {
    #[instrument(skip(self), fields(base = %self.base))]
    async fn search_hosts(&mut self) -> anyhow::Result<Vec<DirectoryEntry>> {
        let (entries, _) = self
            .ldap
            .with_timeout(self.timeout)
            .search(&self.base, Scope::Subtree, HOST_FILTER, HOST_ATTRIBUTES.to_vec())
            .await
            .context("search request failed")?
            .success()
            .context("search was rejected")?;

        debug!(count = entries.len(), "Search completed");

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(DirectoryEntry::from)
            .collect())
    }

    async fn close(&mut self) {
        if let Err(error) = self.ldap.unbind().await {
            debug!(%error, "Unbind failed");
        }
    }
}
