use std::num::ParseIntError;

/// Where a compound connection parameter came from.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, PartialOrd, Ord)]
pub enum CompoundSource {
    #[display("DSN")]
    Dsn,
    #[display("Instance")]
    Instance,
    #[display("Credentials file")]
    CredentialsFile,
    #[display("Host and port")]
    HostPort,
}

/// The resolution level a parameter or error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, PartialOrd, Ord)]
pub enum BuildPhase {
    #[display("explicit options")]
    Options,
    #[display("environment")]
    Environment,
    #[display("project")]
    Project,
}

#[derive(
    Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error, PartialOrd, Ord,
)]
pub enum TlsSecurityError {
    IncompatibleSecurityOptions,
    InvalidValue,
}

#[derive(
    Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error, PartialOrd, Ord,
)]
pub enum InstanceNameError {
    InvalidInstanceName,
    InvalidCloudOrgName,
    InvalidCloudInstanceName,
}

#[derive(
    Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error, PartialOrd, Ord,
)]
#[error(ignore)]
pub enum InvalidCredentialsFileError {
    FileNotFound,
    #[display("{}={}, {}={}", _0.0, _0.1, _1.0, _1.1)]
    ConflictingSettings((String, String), (String, String)),
    SerializationError(String),
}

#[derive(
    Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error, PartialOrd, Ord,
)]
pub enum InvalidSecretKeyError {
    InvalidJwt,
    MissingIssuer,
}

#[derive(
    Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error, PartialOrd, Ord,
)]
#[error(ignore)]
pub enum InvalidDsnError {
    InvalidScheme,
    ParseError,
    DuplicateOptions(String),
    BranchAndDatabase,
}

/// Connection-parameter resolution errors.
///
/// Top-level error for everything that may go wrong while combining the
/// explicit options, the environment, credential files and the project
/// stash into one configuration.
#[derive(
    Debug,
    derive_more::Error,
    derive_more::Display,
    derive_more::From,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
pub enum ParseError {
    #[display("Credentials file not found")]
    CredentialsFileNotFound,
    #[display("Environment variable was not set: {_0}")]
    #[error(ignore)]
    EnvNotFound(String),
    #[display("{_0} and {_1} are mutually exclusive and cannot be used together")]
    ExclusiveOptions(String, String),
    #[display("File not found")]
    FileNotFound,
    #[display("Invalid credentials file: {_0}")]
    #[from]
    InvalidCredentialsFile(InvalidCredentialsFileError),
    #[display("Invalid database")]
    InvalidDatabase,
    #[display("Invalid DSN: {_0}")]
    #[from]
    InvalidDsn(InvalidDsnError),
    #[display("Invalid DSN or instance name")]
    InvalidDsnOrInstanceName,
    #[display("Invalid host")]
    InvalidHost,
    #[display("Invalid instance name: {_0}")]
    #[from]
    InvalidInstanceName(InstanceNameError),
    #[display("Invalid port")]
    InvalidPort,
    #[display("Invalid secret key: {_0}")]
    #[from]
    InvalidSecretKey(InvalidSecretKeyError),
    #[display("Invalid TLS security: {_0}")]
    #[from]
    InvalidTlsSecurity(TlsSecurityError),
    #[display("Invalid duration")]
    InvalidDuration,
    #[display("Multiple compound options were specified while parsing {_0}: {_1:?}")]
    MultipleCompound(BuildPhase, #[error(not(source))] Vec<CompoundSource>),
    #[display("No connection options specified, and no project manifest file found (edgedb.toml)")]
    NoOptionsOrToml,
    #[display("Project not initialized")]
    ProjectNotInitialised,
    #[display("Secret key not found")]
    SecretKeyNotFound,
}

impl ParseError {
    pub fn gel_error(self) -> edgedb_errors::Error {
        use edgedb_errors::ErrorKind;

        match self {
            Self::CredentialsFileNotFound
            | Self::EnvNotFound(_)
            | Self::FileNotFound
            | Self::InvalidCredentialsFile(_)
            | Self::InvalidDatabase
            | Self::InvalidDsn(_)
            | Self::InvalidDsnOrInstanceName
            | Self::InvalidHost
            | Self::InvalidInstanceName(_)
            | Self::InvalidPort
            | Self::InvalidSecretKey(_)
            | Self::InvalidTlsSecurity(_)
            | Self::InvalidDuration => edgedb_errors::InvalidArgumentError::with_source(self),
            Self::MultipleCompound(..) | Self::ExclusiveOptions(..) => {
                edgedb_errors::InterfaceError::with_source(self)
            }
            Self::NoOptionsOrToml | Self::ProjectNotInitialised | Self::SecretKeyNotFound => {
                edgedb_errors::ClientNoCredentialsError::with_source(self)
            }
        }
    }
}

impl From<ParseError> for edgedb_errors::Error {
    fn from(val: ParseError) -> Self {
        val.gel_error()
    }
}

impl From<ParseIntError> for ParseError {
    fn from(_: ParseIntError) -> Self {
        ParseError::InvalidPort
    }
}

/// Non-fatal findings reported through `log` during resolution.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, PartialOrd, Ord)]
pub enum Warning {
    #[display("Deprecated credential property: {_0}")]
    DeprecatedCredentialProperty(String),
    #[display("{_0} is ignored when using Docker TCP port")]
    DockerPortIgnored(String),
    #[display("Database and branch are set to default values")]
    DefaultDatabaseAndBranch,
}
