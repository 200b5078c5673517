// Used by the puppet-freshness binary.
use {seahorse as _, tracing_appender as _, tracing_subscriber as _};

// Used by tests
#[cfg(test)]
use {expect_test as _, proptest as _, rstest as _, tempfile as _};

#[macro_use]
extern crate tracing;

pub mod command_file;
pub mod config;
pub mod directory;
pub mod inventory;

use std::net::IpAddr;

use time::OffsetDateTime;

use crate::command_file::{CommandSink, PassiveCheckResult};
use crate::config::DirectoryConf;
use crate::directory::{ConnectError, HostDirectory, LdapDirectory};
use crate::inventory::Inventory;

#[derive(Debug)]
pub struct FreshnessCfg {
    pub ip: IpAddr,
    pub conf: DirectoryConf,
    pub sink: CommandSink,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Submitted { hostname: String },
    NoMatch,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("directory connection failed")]
    Connect(#[from] ConnectError),
    #[error("directory search failed")]
    Search(#[source] anyhow::Error),
}

#[instrument(skip_all, fields(ip = %cfg.ip))]
pub async fn submit(cfg: FreshnessCfg) -> Result<Outcome, SubmitError> {
    info!("Start freshness submission");
    debug!(?cfg);

    let directory = LdapDirectory::connect(&cfg.conf).await?;

    submit_with(directory, &cfg, OffsetDateTime::now_utc()).await
}

/// Looks up `cfg.ip` in `directory` and sends the freshness result of the owning host
///
/// The directory is closed before returning, whatever the outcome. Failing to send the
/// result is not an error.
pub async fn submit_with<D: HostDirectory>(
    mut directory: D,
    cfg: &FreshnessCfg,
    now: OffsetDateTime,
) -> Result<Outcome, SubmitError> {
    let entries = match directory.search_hosts().await {
        Ok(entries) => entries,
        Err(error) => {
            directory.close().await;
            return Err(SubmitError::Search(error));
        }
    };

    let inventory = Inventory::from_entries(&entries);
    debug!(entries = entries.len(), instances = inventory.len(), "Inventory built");

    let outcome = match inventory.find_by_ip(cfg.ip) {
        Some(record) => {
            info!(id = %record.id, hostname = %record.hostname, "Found host");

            let result = PassiveCheckResult::freshness(record.hostname.as_str(), cfg.service.as_str(), now);

            match command_file::send_command(&cfg.sink, &result).await {
                Ok(()) => info!(sink = %cfg.sink, "Freshness result sent"),
                Err(error) => warn!(sink = %cfg.sink, %error, "Couldn't send freshness result"),
            }

            Outcome::Submitted {
                hostname: record.hostname.clone(),
            }
        }
        None => {
            info!("No instance owns this address");
            Outcome::NoMatch
        }
    };

    directory.close().await;

    Ok(outcome)
}
