//! Monitoring external command file
//!
//! Nagios and Icinga read external commands from a named pipe, one command per line:
//!
//! ```text
//! [1760529600] PROCESS_SERVICE_CHECK_RESULT;deployment-web.eqiad.wmflabs;Puppet freshness;0;puppet ran at Wed Oct 15 12:00:00 2025
//! ```

use core::fmt;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::io::AsyncWriteExt as _;

pub const DEFAULT_COMMAND_FILE: &str = "/var/lib/nagios/rw/nagios.cmd";

pub const FRESHNESS_SERVICE: &str = "Puppet freshness";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CheckState {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveCheckResult {
    pub timestamp: i64,
    pub host: String,
    pub service: String,
    pub state: CheckState,
    pub output: String,
}

impl PassiveCheckResult {
    /// An OK result asserting that the agent ran at `now`
    pub fn freshness(host: impl Into<String>, service: impl Into<String>, now: OffsetDateTime) -> Self {
        let ran_at = now
            .format(format_description!(
                "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
            ))
            .unwrap_or_else(|_| now.unix_timestamp().to_string());

        Self {
            timestamp: now.unix_timestamp(),
            host: host.into(),
            service: service.into(),
            state: CheckState::Ok,
            output: format!("puppet ran at {ran_at}"),
        }
    }
}

impl fmt::Display for PassiveCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[{}] PROCESS_SERVICE_CHECK_RESULT;{};{};{};{}",
            self.timestamp, self.host, self.service, self.state, self.output
        )
    }
}

#[derive(Debug, Clone)]
pub enum CommandSink {
    File(Utf8PathBuf),
    Stdout,
}

impl fmt::Display for CommandSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSink::File(path) => write!(f, "{path}"),
            CommandSink::Stdout => f.write_str("stdout"),
        }
    }
}

/// Replaces the whole content of the command file with a single command line
pub async fn write_command(path: &Utf8Path, result: &PassiveCheckResult) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?;

    file.write_all(result.to_string().as_bytes()).await?;
    file.flush().await
}

pub async fn send_command(sink: &CommandSink, result: &PassiveCheckResult) -> io::Result<()> {
    match sink {
        CommandSink::File(path) => write_command(path, result).await,
        CommandSink::Stdout => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(result.to_string().as_bytes()).await?;
            stdout.flush().await
        }
    }
}
