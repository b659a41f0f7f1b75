use anyhow::{Context, Result};
use argh::FromArgs;
use serde::Deserialize;
use std::{collections::HashSet, fs, path::PathBuf, time::Duration};
use thiserror::Error;

use crate::net::Transport;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub listen_address: String,
    #[serde(default)]
    pub listen_protocol: Transport,
    /// Name announced in the 220 greeting
    pub advertise_name: String,
    /// Upper bound, in seconds, on everything before the relay starts
    #[serde(default)]
    pub negotiation_timeout: Option<u64>,
    #[serde(default, rename = "backend")]
    pub backends: Vec<Backend>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Backend {
    /// Server name this backend answers for, matched exactly
    pub hostname: String,
    #[serde(default)]
    pub protocol: Transport,
    pub address: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("advertise_name must not be empty")]
    EmptyAdvertiseName,
    #[error("advertise_name must not contain line breaks")]
    InvalidAdvertiseName,
    #[error("backend #{0} has an empty hostname")]
    EmptyHostname(usize),
    #[error("negotiation_timeout must be at least one second")]
    ZeroNegotiationTimeout,
}

impl Config {
    pub fn parse(data: &str) -> Result<Config> {
        let config: Config = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.advertise_name.is_empty() {
            return Err(ConfigError::EmptyAdvertiseName);
        }

        if self.advertise_name.contains(['\r', '\n']) {
            return Err(ConfigError::InvalidAdvertiseName);
        }

        if self.negotiation_timeout == Some(0) {
            return Err(ConfigError::ZeroNegotiationTimeout);
        }

        let mut seen = HashSet::new();

        for (index, backend) in self.backends.iter().enumerate() {
            if backend.hostname.is_empty() {
                return Err(ConfigError::EmptyHostname(index));
            }

            if !seen.insert(backend.hostname.as_str()) {
                log::warn!(
                    "backend {:?} is configured more than once, only the first entry is used",
                    backend.hostname,
                );
            }
        }

        if self.backends.is_empty() {
            log::warn!("no backends configured, every connection will be refused");
        }

        Ok(())
    }
}

/// SMTP STARTTLS proxy routing on TLS server name
#[derive(FromArgs)]
struct Args {
    /// configuration file to use
    #[argh(positional)]
    config: PathBuf,
    /// address to listen on, overriding the configuration file
    #[argh(option)]
    listen_address: Option<String>,
}

pub fn load() -> Result<Config> {
    let args: Args = argh::from_env();

    let data = fs::read_to_string(&args.config)
        .with_context(|| format!("could not read {}", args.config.display()))?;
    let mut config = Config::parse(&data)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;

    if let Some(address) = args.listen_address {
        config.listen_address = address;
    }

    Ok(config)
}
