//! Operator settings taken from the process environment.

use std::{path::PathBuf, time::Duration};

use once_cell::sync::Lazy;
use regex::Regex;
use snafu::ensure;

use super::error::{InvalidEnvVarSnafu, Result};
use crate::rgw::cli::{DEFAULT_CLI_TIMEOUT, DEFAULT_CONFIG_DIR};

pub const WATCH_OPERATOR_NAMESPACE_ENV: &str = "ROOK_OBC_WATCH_OPERATOR_NAMESPACE";
pub const PROVISIONER_NAME_PREFIX_ENV: &str = "ROOK_OBC_PROVISIONER_NAME_PREFIX";
pub const HEALTH_CHECK_INTERVAL_ENV: &str = "RGW_OPERATOR_HEALTH_CHECK_INTERVAL";
pub const ADMIN_OPS_TIMEOUT_ENV: &str = "RGW_OPERATOR_ADMIN_OPS_TIMEOUT";
pub const CLI_TIMEOUT_ENV: &str = "RGW_OPERATOR_CLI_TIMEOUT";
pub const CEPH_CONFIG_DIR_ENV: &str = "RGW_OPERATOR_CEPH_CONFIG_DIR";
pub const OPERATOR_NAMESPACE_ENV: &str = "POD_NAMESPACE";

const DEFAULT_OPERATOR_NAMESPACE: &str = "rook-ceph";

static DNS_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label pattern is valid")
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace the operator runs in.
    pub operator_namespace: String,
    pub watch_operator_namespace: bool,
    pub provisioner_name_prefix: Option<String>,
    pub health_check_interval: Duration,
    pub admin_ops_timeout: Duration,
    pub cli_timeout: Duration,
    pub ceph_config_dir: PathBuf,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            watch_operator_namespace: false,
            provisioner_name_prefix: None,
            health_check_interval: Duration::from_secs(60),
            admin_ops_timeout: rgw_admin_api::client::DEFAULT_TIMEOUT,
            cli_timeout: DEFAULT_CLI_TIMEOUT,
            ceph_config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<OperatorConfig> {
        OperatorConfig::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from `lookup`. Unset and empty variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<OperatorConfig> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = OperatorConfig::default();

        if let Some(value) = get(OPERATOR_NAMESPACE_ENV) {
            config.operator_namespace = value.trim().to_string();
        }
        if let Some(value) = get(WATCH_OPERATOR_NAMESPACE_ENV) {
            config.watch_operator_namespace = parse_bool(WATCH_OPERATOR_NAMESPACE_ENV, &value)?;
        }
        if let Some(value) = get(PROVISIONER_NAME_PREFIX_ENV) {
            config.provisioner_name_prefix = Some(parse_provisioner_prefix(&value)?);
        }
        if let Some(value) = get(HEALTH_CHECK_INTERVAL_ENV) {
            config.health_check_interval = parse_seconds(HEALTH_CHECK_INTERVAL_ENV, &value)?;
        }
        if let Some(value) = get(ADMIN_OPS_TIMEOUT_ENV) {
            config.admin_ops_timeout = parse_seconds(ADMIN_OPS_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = get(CLI_TIMEOUT_ENV) {
            config.cli_timeout = parse_seconds(CLI_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = get(CEPH_CONFIG_DIR_ENV) {
            config.ceph_config_dir = PathBuf::from(value);
        }
        Ok(config)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => InvalidEnvVarSnafu {
            name,
            value,
            message: "expected a boolean",
        }
        .fail(),
    }
}

/// Accepts plain seconds (`90`) or a seconds suffix (`90s`).
fn parse_seconds(name: &str, value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    let digits = trimmed.strip_suffix('s').unwrap_or(trimmed);
    match digits.parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => InvalidEnvVarSnafu {
            name,
            value,
            message: "expected a positive number of seconds",
        }
        .fail(),
    }
}

fn parse_provisioner_prefix(value: &str) -> Result<String> {
    ensure!(
        !value.ends_with('.'),
        InvalidEnvVarSnafu {
            name: PROVISIONER_NAME_PREFIX_ENV,
            value,
            message: "must not end with '.'",
        }
    );
    ensure!(
        DNS_LABEL.is_match(value) && value.len() <= 63,
        InvalidEnvVarSnafu {
            name: PROVISIONER_NAME_PREFIX_ENV,
            value,
            message: "must be a valid DNS-1123 label",
        }
    );
    Ok(value.to_string())
}
