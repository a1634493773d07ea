//! Configuration for a client connection, and the logging and TLS settings
//! it carries.

use crate::error::ConfigError;

use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, path::PathBuf, time::Duration};
use tracing_core::LevelFilter;

fn default_timeout() -> u64 {
    60
}

fn default_ping_frequency() -> u64 {
    15 * 60
}

fn default_keep_alive() -> u64 {
    4 * 60
}

/// Settings for a single client connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Address to connect to, as `host:port`
    pub server: Option<String>,
    /// Server password, sent as `PASS` before registration
    pub password: Option<String>,
    pub nick: String,
    pub user: String,
    /// Real name sent with `USER`; the user name is used if unset
    pub realname: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub tls: TlsSettings,
    /// Overall I/O timeout, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Interval between unconditional pings, in seconds
    #[serde(default = "default_ping_frequency")]
    pub ping_frequency: u64,
    /// Ping if nothing has been received for this many seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
    /// Log every line sent and received
    #[serde(default)]
    pub verbose: bool,
    pub log: Option<LogEntry>,
}

/// Transport security parameters, used when `use_tls` is set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TlsSettings {
    /// PEM file of CA certificates to trust instead of the built-in roots
    pub ca_file: Option<PathBuf>,
    /// PEM client certificate chain, for certificate-based authentication
    pub cert_file: Option<PathBuf>,
    /// PEM private key matching `cert_file`
    pub key_file: Option<PathBuf>,
    /// Name to verify the server certificate against, if not the host name
    pub server_name: Option<String>,
    /// Accept any server certificate at all
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinLogTarget {
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogTarget {
    File { dir: PathBuf, filename: PathBuf },
    Builtin(BuiltinLogTarget),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

/// Where diagnostics for a connection should go.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub target: LogTarget,
    #[serde(default)]
    pub modules: Vec<String>,
    pub level: Option<LogLevel>,
}

impl ClientConfig {
    /// A configuration with the given identity and default timings.
    pub fn new(nick: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            server: None,
            password: None,
            nick: nick.into(),
            user: user.into(),
            realname: None,
            use_tls: false,
            tls: TlsSettings::default(),
            timeout: default_timeout(),
            ping_frequency: default_ping_frequency(),
            keep_alive: default_keep_alive(),
            verbose: false,
            log: None,
        }
    }

    /// Load a configuration from a JSON file
    pub fn load_file<P: AsRef<Path>>(filename: P) -> Result<Self, ConfigError> {
        let filename = filename.as_ref();
        let file = File::open(filename).map_err(|e| ConfigError::Io(e, filename.to_owned()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| ConfigError::Json(e, filename.to_owned()))
    }

    /// Check the identity fields, which must be non-empty single-line strings,
    /// and the timings, which must be non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nick.is_empty() {
            return Err(ConfigError::EmptyNick);
        }
        if self.user.is_empty() {
            return Err(ConfigError::EmptyUser);
        }
        for (name, value) in [
            ("nick", Some(&self.nick)),
            ("user", Some(&self.user)),
            ("realname", self.realname.as_ref()),
            ("password", self.password.as_ref()),
        ] {
            if value.map_or(false, |v| v.contains(|c| c == '\r' || c == '\n')) {
                return Err(ConfigError::LineBreak(name));
            }
        }
        for (name, value) in [
            ("timeout", self.timeout),
            ("ping-frequency", self.ping_frequency),
            ("keep-alive", self.keep_alive),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        Ok(())
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.user)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn ping_frequency(&self) -> Duration {
        Duration::from_secs(self.ping_frequency)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive)
    }

    /// How long a read may block before the peer is considered dead.
    ///
    /// The server should answer one of our own pings within a ping interval,
    /// so silence beyond that plus the I/O timeout is a failure.
    pub fn read_deadline(&self) -> Duration {
        self.timeout() + self.ping_frequency()
    }
}

impl TlsSettings {
    pub fn load_ca_certs(&self) -> Result<Option<Vec<rustls::Certificate>>, ConfigError> {
        let Some(ca_file) = &self.ca_file else {
            return Ok(None);
        };

        let file = File::open(ca_file).map_err(|e| ConfigError::Io(e, ca_file.clone()))?;
        let mut reader = BufReader::new(file);
        let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
            .map_err(|e| ConfigError::Io(e, ca_file.clone()))?
            .into_iter()
            .map(rustls::Certificate)
            .collect();

        if certs.is_empty() {
            return Err(ConfigError::Tls(format!(
                "No certificate in CA file {}",
                ca_file.display()
            )));
        }

        Ok(Some(certs))
    }

    /// Load the client certificate chain and private key, if both are configured.
    pub fn load_client_cert(
        &self,
    ) -> Result<Option<(Vec<rustls::Certificate>, rustls::PrivateKey)>, ConfigError> {
        let (cert_file, key_file) = match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => (cert, key),
            (None, None) => return Ok(None),
            _ => {
                return Err(ConfigError::Tls(
                    "Client certificate and key must be configured together".to_string(),
                ))
            }
        };

        let file = File::open(cert_file).map_err(|e| ConfigError::Io(e, cert_file.clone()))?;
        let mut reader = BufReader::new(file);
        let cert_chain = rustls_pemfile::certs(&mut reader)
            .map_err(|e| ConfigError::Io(e, cert_file.clone()))?
            .into_iter()
            .map(rustls::Certificate)
            .collect();

        let file = File::open(key_file).map_err(|e| ConfigError::Io(e, key_file.clone()))?;
        let mut reader = BufReader::new(file);
        let key = rustls_pemfile::read_all(&mut reader)
            .map_err(|e| ConfigError::Io(e, key_file.clone()))?
            .into_iter()
            .find_map(|item| match item {
                rustls_pemfile::Item::PKCS8Key(key) | rustls_pemfile::Item::RSAKey(key) => Some(key),
                _ => None,
            })
            .ok_or_else(|| {
                ConfigError::Tls(format!("No private key in file {}", key_file.display()))
            })?;

        Ok(Some((cert_chain, rustls::PrivateKey(key))))
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(arg: LogLevel) -> LevelFilter {
        match arg {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}
