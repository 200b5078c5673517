use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tempfile::TempDir;
use typed_builder::TypedBuilder;

/// Directory configuration written into a temporary folder
#[derive(TypedBuilder)]
pub struct FreshnessConfig {
    #[builder(setter(into))]
    uri: String,
    #[builder(default = "cn=proxyagent,ou=profile,dc=example,dc=org".to_owned(), setter(into))]
    bind_dn: String,
    #[builder(default = "s3cr3t".to_owned(), setter(into))]
    bind_pw: String,
    #[builder(default, setter(into))]
    ssl: Option<String>,
    #[builder(default, setter(into))]
    timeout: Option<String>,
}

impl FreshnessConfig {
    pub fn init(self) -> anyhow::Result<FreshnessConfigHandle> {
        FreshnessConfigHandle::init(self)
    }
}

pub struct FreshnessConfigHandle {
    tempdir: TempDir,
    config_path: PathBuf,
}

impl FreshnessConfigHandle {
    pub fn init(config: FreshnessConfig) -> anyhow::Result<Self> {
        let FreshnessConfig {
            uri,
            bind_dn,
            bind_pw,
            ssl,
            timeout,
        } = config;

        let tempdir = tempfile::tempdir().context("create tempdir")?;
        let config_path = tempdir.path().join("puppet-freshness.conf");

        let mut config = format!(
            "# generated by the test suite\n\
            uri {uri}\n\
            binddn {bind_dn}\n\
            bindpw {bind_pw}\n\
            base ou=hosts,dc=example,dc=org\n"
        );

        if let Some(ssl) = ssl {
            config.push_str(&format!("ssl {ssl}\n"));
        }

        if let Some(timeout) = timeout {
            config.push_str(&format!("timeout {timeout}\n"));
        }

        std::fs::write(&config_path, config).with_context(|| format!("write config into {}", config_path.display()))?;

        Ok(Self { tempdir, config_path })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// A command file path inside the temporary folder, not created yet
    pub fn command_file_path(&self) -> PathBuf {
        self.tempdir.path().join("nagios.cmd")
    }
}
