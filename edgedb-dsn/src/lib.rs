/*!
Connection-parameter resolution for the EdgeDB client.

A [`Builder`] collects explicit options; [`Builder::build`] combines them
with the `EDGEDB_*` environment variables, on-disk credential files and the
project stash into one canonical [`Config`], applying a strict precedence
ladder: the first level that provides a compound parameter (DSN, instance
name, credentials file, or host/port) decides the endpoint, and lower
levels only fill in granular gaps.
*/

mod builder;
mod config;
mod context;
mod credentials;
mod env;
pub mod error;
mod file;
mod instance_name;
mod project;

pub use builder::{Builder, Params};
pub use config::{ClientSecurity, Config, TlsSecurity};
pub use config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_USER};
pub use credentials::{CloudCredentialsFile, CredentialsFile};
pub use env::{EnvVar, SystemEnvVars};
pub use error::ParseError;
pub use file::{FileAccess, SystemFileAccess};
pub use instance_name::{CloudName, InstanceName};
pub use project::PROJECT_FILE;
