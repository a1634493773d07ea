use crate::error::ConfigError;
use std::{convert::TryFrom, fmt};

/// A validated `host:port` server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        if address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if address.matches(':').count() != 1 {
            return Err(ConfigError::WrongSeparatorCount(address.to_string()));
        }

        let (host, port) = address
            .split_once(':')
            .ok_or_else(|| ConfigError::WrongSeparatorCount(address.to_string()))?;

        if host.is_empty() {
            return Err(ConfigError::MissingHost(address.to_string()));
        }
        if port.is_empty() {
            return Err(ConfigError::MissingPort(address.to_string()));
        }

        let port: i64 = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(address.to_string()))?;
        let port = u16::try_from(port).map_err(|_| ConfigError::PortOutOfRange(port))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
