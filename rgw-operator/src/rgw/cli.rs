use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, de::DeserializeOwned};
use snafu::ResultExt;

use super::error::{
    CommandFailedSnafu, CommandTimeoutSnafu, NoJsonOutputSnafu, ParseOutputSnafu, Result,
    SpawnCommandSnafu,
};

pub const DEFAULT_CLI_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONFIG_DIR: &str = "/var/lib/rook";

const CEPH: &str = "ceph";
const RADOSGW_ADMIN: &str = "radosgw-admin";
const SECRET_FLAGS: [&str; 4] = ["--access-key", "--secret-key", "--secret", "--key"];

static JSON_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?ms)^\[.*\]$").expect("JSON array pattern is valid"));
static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?ms)^\{.*\}$").expect("JSON object pattern is valid"));

/// Runs external programs on behalf of the operator.
///
/// A non-zero exit is reported as `CommandFailed` carrying the exit code.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, program: &str, args: &[String], timeout: Duration) -> Result<String>;
}

/// Spawns real processes. The child is killed if the call is cancelled or times out.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, program: &str, args: &[String], timeout: Duration) -> Result<String> {
        let command = describe(program, args);
        tracing::debug!(%command, "running command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(timeout, output)
            .await
            .map_err(|_| {
                CommandTimeoutSnafu {
                    command: command.clone(),
                    timeout,
                }
                .build()
            })?
            .context(SpawnCommandSnafu {
                command: command.clone(),
            })?;

        if !output.status.success() {
            return CommandFailedSnafu {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .fail();
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Renders a command line for logs and errors with key material masked.
pub fn describe(program: &str, args: &[String]) -> String {
    let mut rendered = vec![program.to_string()];
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            rendered.push("***".to_string());
            mask_next = false;
            continue;
        }
        match SECRET_FLAGS
            .iter()
            .find(|flag| arg.as_str() == **flag || arg.starts_with(&format!("{flag}=")))
        {
            Some(flag) if arg.as_str() == *flag => {
                rendered.push(arg.clone());
                mask_next = true;
            }
            Some(flag) => rendered.push(format!("{flag}=***")),
            None => rendered.push(arg.clone()),
        }
    }
    rendered.join(" ")
}

/// Cuts the JSON document out of command output that may carry log lines around it.
///
/// Either an object or an array is accepted; when both match, the larger one wins.
pub fn extract_json(output: &str) -> Option<&str> {
    let array = JSON_ARRAY.find(output).map(|m| m.as_str());
    let object = JSON_OBJECT.find(output).map(|m| m.as_str());
    match (array, object) {
        (Some(array), Some(object)) if array.len() > object.len() => Some(array),
        (_, Some(object)) => Some(object),
        (array, None) => array,
    }
}

/// How the CLI tools reach the Ceph cluster living in `namespace`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConnection {
    pub namespace: String,
    pub config_dir: PathBuf,
}

impl ClusterConnection {
    pub fn new(namespace: impl Into<String>, config_dir: impl Into<PathBuf>) -> ClusterConnection {
        ClusterConnection {
            namespace: namespace.into(),
            config_dir: config_dir.into(),
        }
    }

    pub fn args(&self) -> Vec<String> {
        let dir = self.config_dir.join(&self.namespace);
        vec![
            format!("--cluster={}", self.namespace),
            format!("--conf={}", dir.join(format!("{}.config", self.namespace)).display()),
            "--name=client.admin".to_string(),
            format!("--keyring={}", dir.join("client.admin.keyring").display()),
        ]
    }
}

/// Entry point for `ceph` and `radosgw-admin` invocations against one cluster.
#[derive(Clone)]
pub struct AdminCli {
    executor: Arc<dyn CommandExecutor>,
    connection: ClusterConnection,
    timeout: Duration,
}

impl AdminCli {
    pub fn new(executor: Arc<dyn CommandExecutor>, connection: ClusterConnection) -> AdminCli {
        AdminCli {
            executor,
            connection,
            timeout: DEFAULT_CLI_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> AdminCli {
        self.timeout = timeout;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.connection.namespace
    }

    pub fn config_dir(&self) -> &Path {
        &self.connection.config_dir
    }

    /// Runs a `ceph` command with JSON output and decodes it.
    pub async fn ceph<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let mut full: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        full.extend(self.connection.args());
        full.extend(["--format".to_string(), "json".to_string()]);
        let output = self.executor.execute(CEPH, &full, self.timeout).await?;
        parse_json(&describe(CEPH, &full), &output)
    }

    /// Runs a `ceph` command whose output is not needed.
    pub async fn ceph_void(&self, args: &[&str]) -> Result<()> {
        let mut full: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        full.extend(self.connection.args());
        self.executor.execute(CEPH, &full, self.timeout).await?;
        Ok(())
    }

    pub async fn radosgw_admin(&self, args: &[String]) -> Result<String> {
        let mut full = args.to_vec();
        full.extend(self.connection.args());
        self.executor.execute(RADOSGW_ADMIN, &full, self.timeout).await
    }
}

/// Hands out an [`AdminCli`] for the Ceph cluster of a given namespace.
#[derive(Clone)]
pub struct CliFactory {
    executor: Arc<dyn CommandExecutor>,
    config_dir: PathBuf,
    timeout: Duration,
}

impl CliFactory {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        config_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> CliFactory {
        CliFactory {
            executor,
            config_dir: config_dir.into(),
            timeout,
        }
    }

    pub fn for_namespace(&self, namespace: &str) -> AdminCli {
        AdminCli::new(
            self.executor.clone(),
            ClusterConnection::new(namespace, self.config_dir.clone()),
        )
        .with_timeout(self.timeout)
    }
}

#[derive(Deserialize)]
struct ClusterStatus {
    health: ClusterHealth,
}

#[derive(Deserialize)]
struct ClusterHealth {
    status: String,
}

impl AdminCli {
    /// The overall health reported by `ceph status`, e.g. `HEALTH_OK`.
    pub async fn cluster_health(&self) -> Result<String> {
        let status: ClusterStatus = self.ceph(&["status"]).await?;
        Ok(status.health.status)
    }
}

/// Decodes the JSON part of `output`.
pub fn parse_json<T: DeserializeOwned>(command: &str, output: &str) -> Result<T> {
    let json = extract_json(output).ok_or_else(|| {
        NoJsonOutputSnafu {
            command: command.to_string(),
            output: output.to_string(),
        }
        .build()
    })?;
    serde_json::from_str(json).context(ParseOutputSnafu {
        command: command.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;
    use crate::rgw::error::Error;

    /// Replays scripted results and records every invocation.
    ///
    /// Commands without a script entry succeed with empty output.
    #[derive(Default)]
    pub struct FakeExecutor {
        script: Mutex<VecDeque<(String, Result<String, i32>)>>,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
        pub infiles: Mutex<Vec<String>>,
    }

    impl FakeExecutor {
        /// Queues a result for the next command whose first arguments start with `prefix`.
        pub fn expect(&self, prefix: &str, result: Result<&str, i32>) -> &FakeExecutor {
            self.script
                .lock()
                .unwrap()
                .push_back((prefix.to_string(), result.map(str::to_string)));
            self
        }

        pub fn commands(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(program, args)| format!("{program} {}", args.join(" ")))
                .collect()
        }
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn execute(
            &self,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            if let Some(path) = args.iter().find_map(|arg| arg.strip_prefix("--infile=")) {
                let content = std::fs::read_to_string(path).unwrap_or_default();
                self.infiles.lock().unwrap().push(content);
            }

            let line = args.join(" ");
            let mut script = self.script.lock().unwrap();
            let position = script
                .iter()
                .position(|(prefix, _)| line.starts_with(prefix.as_str()));
            match position.and_then(|i| script.remove(i)) {
                Some((_, Ok(output))) => Ok(output),
                Some((_, Err(code))) => Err(Error::CommandFailed {
                    command: describe(program, args),
                    code,
                    stderr: String::new(),
                }),
                None => Ok(String::new()),
            }
        }
    }

    pub fn cli(executor: Arc<FakeExecutor>) -> AdminCli {
        AdminCli::new(executor, ClusterConnection::new("rook-ceph", "/var/lib/rook"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_skips_log_lines() {
        let output = "2024-01-01 warning: something\n{\n  \"id\": \"abc\"\n}\n";
        assert_eq!(extract_json(output), Some("{\n  \"id\": \"abc\"\n}"));

        let output = "ignored\n[\"a\", \"b\"]";
        assert_eq!(extract_json(output), Some("[\"a\", \"b\"]"));
    }

    #[test]
    fn test_extract_json_prefers_larger_match() {
        let output = "[\n{\n\"a\": 1\n}\n]";
        assert_eq!(extract_json(output), Some(output));
        let output = "{\n\"list\": [\n1\n]\n}";
        assert_eq!(extract_json(output), Some(output));
    }

    #[test]
    fn test_extract_json_without_json() {
        assert_eq!(extract_json(""), None);
        assert_eq!(extract_json("no user info saved"), None);
        let err = parse_json::<serde_json::Value>("radosgw-admin user info", "oops").unwrap_err();
        assert!(err.to_string().contains("didn't contain json"));
    }

    #[test]
    fn test_describe_masks_keys() {
        let args = vec![
            "user".to_string(),
            "create".to_string(),
            "--access-key=AK".to_string(),
            "--secret".to_string(),
            "SK".to_string(),
            "--uid=u".to_string(),
        ];
        assert_eq!(
            describe("radosgw-admin", &args),
            "radosgw-admin user create --access-key=*** --secret *** --uid=u"
        );
    }

    #[test]
    fn test_connection_args() {
        let connection = ClusterConnection::new("rook-ceph", "/var/lib/rook");
        assert_eq!(
            connection.args(),
            vec![
                "--cluster=rook-ceph",
                "--conf=/var/lib/rook/rook-ceph/rook-ceph.config",
                "--name=client.admin",
                "--keyring=/var/lib/rook/rook-ceph/client.admin.keyring",
            ]
        );
    }

    #[tokio::test]
    async fn test_ceph_appends_connection_and_format() {
        let executor = Arc::new(testing::FakeExecutor::default());
        executor.expect("status", Ok(r#"{"health":{"status":"HEALTH_OK"}}"#));
        let cli = testing::cli(executor.clone());
        let status: serde_json::Value = cli.ceph(&["status"]).await.unwrap();
        assert_eq!(status["health"]["status"], "HEALTH_OK");
        let commands = executor.commands();
        assert!(commands[0].starts_with("ceph status --cluster=rook-ceph"));
        assert!(commands[0].ends_with("--format json"));
    }

    #[tokio::test]
    async fn test_cluster_health() {
        let executor = Arc::new(testing::FakeExecutor::default());
        executor.expect(
            "status",
            Ok(r#"{"fsid": "x", "health": {"status": "HEALTH_WARN", "checks": {}}}"#),
        );
        let cli = CliFactory::new(executor.clone(), "/var/lib/rook", DEFAULT_CLI_TIMEOUT)
            .for_namespace("rook-ceph");
        assert_eq!(cli.cluster_health().await.unwrap(), "HEALTH_WARN");
        assert!(executor.commands()[0].starts_with("ceph status --cluster=rook-ceph"));
    }
}
