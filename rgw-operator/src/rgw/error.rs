use snafu::Snafu;
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::reconcile::{ClassifyError, ErrorKind};

/// `ENOENT`, returned by radosgw-admin when the requested entity does not exist.
pub const EXIT_NOT_FOUND: i32 = 2;
/// `EIO`, returned when the data log FIFO backend cannot be used.
pub const EXIT_IO_ERROR: i32 = 5;
/// `EEXIST`
pub const EXIT_ALREADY_EXISTS: i32 = 17;
/// `EINVAL`, also returned for unknown flags.
pub const EXIT_INVALID_ARGUMENT: i32 = 22;

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to run {command}"))]
    SpawnCommand {
        source: std::io::Error,
        command: String,
    },

    #[snafu(display("{command} timed out after {timeout:?}"))]
    CommandTimeout {
        command: String,
        timeout: std::time::Duration,
    },

    #[snafu(display("{command} exited with code {code}: {stderr}"))]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[snafu(display("output of {command} didn't contain json: {output}"))]
    NoJsonOutput { command: String, output: String },

    #[snafu(display("failed to parse output of {command}"))]
    ParseOutput {
        source: serde_json::Error,
        command: String,
    },

    #[snafu(display("failed to serialize {what} config"))]
    SerializeConfig {
        source: serde_json::Error,
        what: String,
    },

    #[snafu(display("failed to write config file {path}"))]
    WriteConfigFile {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("unable to access {path} of {document}: {message}"))]
    JsonPath {
        document: String,
        path: String,
        message: String,
    },

    #[snafu(display("placements were not applied to zone config: expected {expected}, got {got}"))]
    PlacementsNotApplied { expected: String, got: String },

    #[snafu(display("sharedPool do not exist: {pool}{origin}"))]
    SharedPoolMissing { pool: String, origin: String },

    #[snafu(display("CR store pools are missing: {pools:?}"))]
    StorePoolsMissing { pools: Vec<String> },

    #[snafu(display("ceph cluster is not ready: {health}"))]
    ClusterNotReady { health: String },

    #[snafu(display("{message}"))]
    InvalidConfig { message: String },

    #[snafu(display("zone {zone} is not part of zonegroup {zone_group}"))]
    ZoneNotInZoneGroup { zone: String, zone_group: String },

    #[snafu(display("s3 user {uid} has no access and secret key"))]
    UserKeysMissing { uid: String },

    #[snafu(display("email {email} is already used by another s3 user"))]
    EmailInUse { email: String },

    #[snafu(display("{what} is missing from the object context"))]
    MissingContext { what: String },

    #[snafu(display("failed to build admin ops client for {endpoint}"))]
    AdminOpsClient {
        source: rgw_admin_api::Error,
        endpoint: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.exit_code() == Some(EXIT_NOT_FOUND)
    }

    pub fn is_already_exists(&self) -> bool {
        self.exit_code() == Some(EXIT_ALREADY_EXISTS)
    }
}

impl ClassifyError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::ClusterNotReady { .. } => ErrorKind::NotReady,
            Error::InvalidConfig { .. } | Error::EmailInUse { .. } => ErrorKind::InvalidConfig,
            Error::SharedPoolMissing { .. } | Error::StorePoolsMissing { .. } => {
                ErrorKind::MissingPool
            }
            Error::ZoneNotInZoneGroup { .. } => ErrorKind::NotReady,
            Error::AdminOpsClient { .. } => ErrorKind::InvalidConfig,
            Error::CommandFailed { code, .. } if *code == EXIT_NOT_FOUND => ErrorKind::NotFound,
            Error::CommandFailed { code, .. } if *code == EXIT_ALREADY_EXISTS => {
                ErrorKind::Conflict
            }
            _ => ErrorKind::Transient,
        }
    }
}
