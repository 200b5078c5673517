#![allow(clippy::unwrap_used, reason = "test infrastructure can panic on errors")]

pub mod cli;
pub mod freshness_config;
