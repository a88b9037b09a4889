use std::{io::Write, sync::Arc};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::{ResultExt, ensure};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    cli::{AdminCli, parse_json},
    error::{
        EXIT_INVALID_ARGUMENT, EXIT_IO_ERROR, MissingContextSnafu, Result, SerializeConfigSnafu,
        WriteConfigFileSnafu,
    },
};

/// One lock per realm, created on first use and kept for the process lifetime.
///
/// Every sequence that edits realm, zonegroup or zone documents and then commits
/// the period holds the lock of its realm.
static REALM_LOCKS: Lazy<DashMap<String, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

pub async fn lock_realm(realm: &str) -> OwnedMutexGuard<()> {
    let lock = REALM_LOCKS
        .entry(realm.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    lock.lock_owned().await
}

/// Top-level period fields that change on every `period update` even without config changes.
const VOLATILE_PERIOD_FIELDS: [&str; 4] = ["id", "epoch", "predecessor_uuid", "realm_epoch"];

/// The realm, zonegroup and zone an object store or multisite resource operates in.
#[derive(Clone)]
pub struct ObjectContext {
    pub cli: AdminCli,
    pub name: String,
    pub realm: String,
    pub zone_group: String,
    pub zone: String,
    /// Service endpoint of the gateway, when the context belongs to a store.
    pub endpoint: String,
}

impl ObjectContext {
    /// A single-site context: realm, zonegroup and zone are all named after the store.
    pub fn new(cli: AdminCli, name: impl Into<String>) -> ObjectContext {
        let name = name.into();
        ObjectContext {
            cli,
            realm: name.clone(),
            zone_group: name.clone(),
            zone: name.clone(),
            name,
            endpoint: String::new(),
        }
    }

    pub fn with_multisite(
        mut self,
        realm: impl Into<String>,
        zone_group: impl Into<String>,
        zone: impl Into<String>,
    ) -> ObjectContext {
        self.realm = realm.into();
        self.zone_group = zone_group.into();
        self.zone = zone.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> ObjectContext {
        self.endpoint = endpoint.into();
        self
    }

    pub fn realm_arg(&self) -> String {
        format!("--rgw-realm={}", self.realm)
    }

    pub fn zone_group_arg(&self) -> String {
        format!("--rgw-zonegroup={}", self.zone_group)
    }

    pub fn zone_arg(&self) -> String {
        format!("--rgw-zone={}", self.zone)
    }

    pub fn multisite_args(&self) -> Vec<String> {
        vec![self.realm_arg(), self.zone_group_arg(), self.zone_arg()]
    }

    /// Runs radosgw-admin exactly with `args`, for commands that name their own scope.
    pub async fn run_no_multisite(&self, args: &[String]) -> Result<String> {
        self.cli.radosgw_admin(args).await
    }

    pub async fn run_no_multisite_json<T: DeserializeOwned>(&self, args: &[String]) -> Result<T> {
        let output = self.run_no_multisite(args).await?;
        parse_json(&format!("radosgw-admin {}", command_name(args)), &output)
    }

    /// Runs radosgw-admin scoped to this context's realm, zonegroup and zone.
    ///
    /// Clusters whose data log cannot use the FIFO backend fail with `EIO`; the command is
    /// then retried with the omap backend, using the older flag name if the newer is rejected.
    pub async fn run(&self, args: &[String]) -> Result<String> {
        let mut scoped = args.to_vec();
        scoped.extend(self.multisite_args());

        match self.cli.radosgw_admin(&scoped).await {
            Err(err) if err.exit_code() == Some(EXIT_IO_ERROR) => {
                tracing::debug!(
                    command = command_name(args),
                    "retrying radosgw-admin with the omap data log backend"
                );
                let mut retry = scoped.clone();
                retry.push("--rgw-data-log-backing=omap".to_string());
                match self.cli.radosgw_admin(&retry).await {
                    Err(err) if err.exit_code() == Some(EXIT_INVALID_ARGUMENT) => {
                        let mut retry = scoped;
                        retry.push("--rgw-default-data-log-backing=omap".to_string());
                        self.cli.radosgw_admin(&retry).await
                    }
                    result => result,
                }
            }
            result => result,
        }
    }

    pub async fn run_json<T: DeserializeOwned>(&self, args: &[String]) -> Result<T> {
        let output = self.run(args).await?;
        parse_json(&format!("radosgw-admin {}", command_name(args)), &output)
    }

    fn require(&self, what: &str, value: &str) -> Result<()> {
        ensure!(!value.is_empty(), MissingContextSnafu { what });
        Ok(())
    }

    pub async fn zone_json(&self) -> Result<Value> {
        self.require("realm", &self.realm)?;
        self.require("zone", &self.zone)?;
        self.run_no_multisite_json(&args(["zone", "get"], [self.realm_arg(), self.zone_arg()]))
            .await
    }

    pub async fn zone_group_json(&self) -> Result<Value> {
        self.require("realm", &self.realm)?;
        self.require("zonegroup", &self.zone_group)?;
        self.run_no_multisite_json(&args(
            ["zonegroup", "get"],
            [self.realm_arg(), self.zone_group_arg(), self.zone_arg()],
        ))
        .await
    }

    /// Writes the zone document and returns it as stored by RGW.
    pub async fn set_zone_json(&self, zone: &Value) -> Result<Value> {
        self.require("realm", &self.realm)?;
        self.require("zone", &self.zone)?;
        let file = self.stage_document("zone", "zonecfg", zone)?;
        let infile = format!("--infile={}", file.path().display());
        self.run_no_multisite_json(&args(
            ["zone", "set"],
            [self.zone_arg(), infile, self.realm_arg()],
        ))
        .await
    }

    pub async fn set_zone_group_json(&self, zone_group: &Value) -> Result<Value> {
        self.require("realm", &self.realm)?;
        self.require("zonegroup", &self.zone_group)?;
        let file = self.stage_document("zonegroup", "zonegroupcfg", zone_group)?;
        let infile = format!("--infile={}", file.path().display());
        self.run_no_multisite_json(&args(
            ["zonegroup", "set"],
            [
                self.zone_group_arg(),
                infile,
                self.realm_arg(),
                self.zone_arg(),
            ],
        ))
        .await
    }

    /// The temporary file is removed once the returned handle is dropped.
    fn stage_document(
        &self,
        what: &str,
        suffix: &str,
        document: &Value,
    ) -> Result<tempfile::NamedTempFile> {
        let bytes = serde_json::to_vec(document).context(SerializeConfigSnafu { what })?;
        let path = format!("{}.{suffix}", self.name);
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}.", self.name))
            .suffix(&format!(".{suffix}"))
            .tempfile()
            .context(WriteConfigFileSnafu { path: path.clone() })?;
        file.write_all(&bytes)
            .and_then(|_| file.flush())
            .context(WriteConfigFileSnafu { path })?;
        Ok(file)
    }

    /// Commits the staged period if, and only if, it differs from the current one.
    ///
    /// A commit with nothing to change still bumps the period epoch and makes every
    /// gateway in the realm reload, so unchanged periods are left alone.
    pub async fn commit_config_changes(&self) -> Result<()> {
        let current = self.run(&args(["period", "get"], [])).await?;
        let staged = self.run(&args(["period", "update"], [])).await?;

        let current: Value = parse_json("radosgw-admin period get", &current)?;
        let staged: Value = parse_json("radosgw-admin period update", &staged)?;
        if !period_changed(&current, &staged) {
            tracing::debug!(realm = %self.realm, "period unchanged, skipping commit");
            return Ok(());
        }

        tracing::info!(realm = %self.realm, zone = %self.zone, "committing period changes");
        self.run(&args(["period", "update", "--commit"], [])).await?;
        Ok(())
    }
}

/// Builds an argument vector from a fixed command prefix and computed flags.
pub fn args<const N: usize, const M: usize>(command: [&str; N], flags: [String; M]) -> Vec<String> {
    command
        .iter()
        .map(|part| part.to_string())
        .chain(flags)
        .collect()
}

fn command_name(args: &[String]) -> String {
    args.iter()
        .take_while(|arg| !arg.starts_with('-'))
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

fn stable_period(period: &Value) -> Value {
    let mut period = period.clone();
    if let Some(object) = period.as_object_mut() {
        for field in VOLATILE_PERIOD_FIELDS {
            object.remove(field);
        }
        if let Some(map) = object.get_mut("period_map").and_then(Value::as_object_mut) {
            map.remove("id");
        }
    }
    period
}

pub(crate) fn period_changed(current: &Value, staged: &Value) -> bool {
    stable_period(current) != stable_period(staged)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::rgw::cli::testing::{FakeExecutor, cli};

    fn context(executor: Arc<FakeExecutor>) -> ObjectContext {
        ObjectContext::new(cli(executor), "my-store")
    }

    #[test]
    fn test_period_changed_ignores_volatile_fields() {
        let current = json!({
            "id": "a",
            "epoch": 1,
            "realm_epoch": 2,
            "period_map": {"id": "a", "zonegroups": []}
        });
        let staged = json!({
            "id": "b",
            "epoch": 2,
            "realm_epoch": 3,
            "predecessor_uuid": "a",
            "period_map": {"id": "b", "zonegroups": []}
        });
        assert!(!period_changed(&current, &staged));

        let staged = json!({
            "id": "b",
            "epoch": 2,
            "period_map": {"id": "b", "zonegroups": [{"name": "zg"}]}
        });
        assert!(period_changed(&current, &staged));
    }

    #[tokio::test]
    async fn test_run_appends_multisite_args() {
        let executor = Arc::new(FakeExecutor::default());
        context(executor.clone())
            .run(&args(["zone", "delete"], []))
            .await
            .unwrap();
        assert!(executor.commands()[0].starts_with(
            "radosgw-admin zone delete --rgw-realm=my-store --rgw-zonegroup=my-store --rgw-zone=my-store --cluster=rook-ceph"
        ));
    }

    #[tokio::test]
    async fn test_run_retries_with_omap_backing() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("user info", Err(EXIT_IO_ERROR))
            .expect("user info", Err(EXIT_INVALID_ARGUMENT))
            .expect("user info", Ok("{}"));
        context(executor.clone())
            .run(&args(["user", "info"], ["--uid=u".to_string()]))
            .await
            .unwrap();
        let commands = executor.commands();
        assert_eq!(commands.len(), 3);
        assert!(!commands[0].contains("data-log-backing"));
        assert!(commands[1].contains("--rgw-data-log-backing=omap"));
        assert!(commands[2].contains("--rgw-default-data-log-backing=omap"));
    }

    #[tokio::test]
    async fn test_commit_skipped_without_changes() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("period get", Ok(r#"{"id": "1", "epoch": 1, "period_map": {"id": "1"}}"#))
            .expect("period update", Ok(r#"{"id": "2", "epoch": 2, "period_map": {"id": "2"}}"#));
        context(executor.clone())
            .commit_config_changes()
            .await
            .unwrap();
        assert_eq!(executor.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_commit_with_changes() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("period get", Ok(r#"{"id": "1", "master_zone": ""}"#))
            .expect("period update", Ok(r#"{"id": "2", "master_zone": "z"}"#));
        context(executor.clone())
            .commit_config_changes()
            .await
            .unwrap();
        let commands = executor.commands();
        assert_eq!(commands.len(), 3);
        assert!(
            commands[2].starts_with("radosgw-admin period update --commit --rgw-realm=my-store")
        );
    }

    #[tokio::test]
    async fn test_commit_stops_when_period_get_fails() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("period get", Err(1));
        assert!(
            context(executor.clone())
                .commit_config_changes()
                .await
                .is_err()
        );
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_set_zone_stages_document() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("zone set", Ok(r#"{"name": "my-store"}"#));
        let stored = context(executor.clone())
            .set_zone_json(&json!({"name": "my-store"}))
            .await
            .unwrap();
        assert_eq!(stored["name"], "my-store");
        assert_eq!(
            executor.infiles.lock().unwrap().as_slice(),
            [r#"{"name":"my-store"}"#.to_string()]
        );
        let command = &executor.commands()[0];
        assert!(command.starts_with("radosgw-admin zone set --rgw-zone=my-store --infile="));
        assert!(command.contains(".zonecfg --rgw-realm=my-store"));
    }

    #[tokio::test]
    async fn test_zone_json_requires_realm() {
        let executor = Arc::new(FakeExecutor::default());
        let ctx = context(executor).with_multisite("", "zg", "z");
        assert!(ctx.zone_json().await.is_err());
    }
}
