use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, TlsSecurityError};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5656;
pub const DEFAULT_USER: &str = "edgedb";
pub const DEFAULT_DATABASE: &str = "edgedb";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How strictly the server's TLS certificate is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsSecurity {
    /// Resolve to [`TlsSecurity::Strict`] unless a custom CA implies
    /// [`TlsSecurity::NoHostVerification`].
    #[default]
    Default,
    /// No certificate checks at all.
    Insecure,
    /// Verify the certificate against the CA but not the host name.
    NoHostVerification,
    /// Full verification.
    Strict,
}

/// The value of `EDGEDB_CLIENT_SECURITY`, constraining [`TlsSecurity`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientSecurity {
    #[default]
    Default,
    InsecureDevMode,
    Strict,
}

impl FromStr for TlsSecurity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(TlsSecurity::Default),
            "insecure" => Ok(TlsSecurity::Insecure),
            "no_host_verification" => Ok(TlsSecurity::NoHostVerification),
            "strict" => Ok(TlsSecurity::Strict),
            _ => Err(ParseError::InvalidTlsSecurity(TlsSecurityError::InvalidValue)),
        }
    }
}

impl FromStr for ClientSecurity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ClientSecurity::Default),
            "insecure_dev_mode" => Ok(ClientSecurity::InsecureDevMode),
            "strict" => Ok(ClientSecurity::Strict),
            _ => Err(ParseError::InvalidTlsSecurity(TlsSecurityError::InvalidValue)),
        }
    }
}

/// The fully resolved connection configuration: one canonical endpoint and
/// credentials record.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Candidate endpoints, tried in order.
    pub addresses: Vec<(String, u16)>,
    pub user: String,
    pub password: Option<String>,
    pub secret_key: Option<String>,
    pub database: String,
    pub branch: String,
    /// PEM text of the trusted CA, when one was configured.
    pub tls_ca: Option<String>,
    /// Never [`TlsSecurity::Default`] after resolution.
    pub tls_security: TlsSecurity,
    pub tls_server_name: Option<String>,
    pub connect_timeout: Duration,
    pub server_settings: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            addresses: vec![(DEFAULT_HOST.into(), DEFAULT_PORT)],
            user: DEFAULT_USER.into(),
            password: None,
            secret_key: None,
            database: DEFAULT_DATABASE.into(),
            branch: DEFAULT_DATABASE.into(),
            tls_ca: None,
            tls_security: TlsSecurity::Strict,
            tls_server_name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            server_settings: HashMap::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("addresses", &self.addresses)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "..."))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "..."))
            .field("database", &self.database)
            .field("branch", &self.branch)
            .field("tls_ca", &self.tls_ca.as_ref().map(|_| "..."))
            .field("tls_security", &self.tls_security)
            .field("tls_server_name", &self.tls_server_name)
            .field("connect_timeout", &self.connect_timeout)
            .field("server_settings", &self.server_settings)
            .finish()
    }
}
