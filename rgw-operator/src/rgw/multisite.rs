//! Realm, zonegroup and zone lifecycle on top of radosgw-admin.
//!
//! Callers hold the realm lock from [`super::context::lock_realm`] around any sequence
//! that ends in a period commit.

use std::fmt;

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::{
    context::{ObjectContext, args},
    error::{EXIT_INVALID_ARGUMENT, InvalidConfigSnafu, Result},
    pools::delete_pools,
    shared_pools::configure_shared_pools_for_zone,
};
use crate::api::pool::SharedPoolsSpec;

const REALM_KEY_LENGTH: usize = 24;

/// Credentials of a realm's system user, shared by every zone that syncs with it.
///
/// Serialized with the field names of the `<realm>-keys` secret.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RealmKeys {
    #[serde(rename = "access-key")]
    pub access_key: String,
    #[serde(rename = "secret-key")]
    pub secret_key: String,
}

impl RealmKeys {
    pub fn generate() -> RealmKeys {
        let encode = |bytes: &[u8]| base64::engine::general_purpose::STANDARD.encode(bytes);
        let mut rng = rand::rng();
        let mut access = [0u8; REALM_KEY_LENGTH];
        let mut secret = [0u8; REALM_KEY_LENGTH];
        rng.fill_bytes(&mut access);
        rng.fill_bytes(&mut secret);
        RealmKeys {
            access_key: encode(&access),
            secret_key: encode(&secret),
        }
    }

    pub fn args(&self) -> [String; 2] {
        [
            format!("--access-key={}", self.access_key),
            format!("--secret-key={}", self.secret_key),
        ]
    }
}

impl fmt::Debug for RealmKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmKeys")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ZoneEndpoints {
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

/// The parts of `zonegroup get` this operator reads.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ZoneGroupConfig {
    #[serde(default)]
    pub master_zone: String,
    #[serde(default)]
    pub is_master: bool,
    #[serde(default)]
    pub zones: Vec<ZoneEndpoints>,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl ZoneGroupConfig {
    pub fn zone(&self, name: &str) -> Option<&ZoneEndpoints> {
        self.zones.iter().find(|zone| zone.name == name)
    }
}

#[derive(Deserialize)]
struct IdDocument {
    id: String,
}

#[derive(Deserialize)]
struct RealmList {
    #[serde(default)]
    realms: Vec<String>,
}

#[derive(Deserialize)]
struct PeriodDocument {
    #[serde(default)]
    master_zonegroup: String,
}

#[derive(Deserialize)]
struct DomainRoot {
    domain_root: String,
}

/// Whether the endpoints RGW knows for `zone_name` differ from `desired`, ignoring order.
///
/// A zone missing from the zonegroup is reported as unchanged.
pub fn should_update_zone_endpoint_list(
    zones: &[ZoneEndpoints],
    desired: &[String],
    zone_name: &str,
) -> Result<bool> {
    ensure!(
        !zone_name.is_empty(),
        InvalidConfigSnafu {
            message: "zone name can't be empty"
        }
    );
    let Some(zone) = zones.iter().find(|zone| zone.name == zone_name) else {
        return Ok(false);
    };
    let mut current = zone.endpoints.clone();
    let mut desired = desired.to_vec();
    current.sort();
    desired.sort();
    Ok(current != desired)
}

pub fn endpoints_arg(endpoints: &[String]) -> String {
    format!("--endpoints={}", endpoints.join(","))
}

/// The three kinds of multisite entities, with the flag naming each one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKind {
    Realm,
    ZoneGroup,
    Zone,
}

impl ConfigKind {
    fn command(self) -> &'static str {
        match self {
            ConfigKind::Realm => "realm",
            ConfigKind::ZoneGroup => "zonegroup",
            ConfigKind::Zone => "zone",
        }
    }

    fn arg(self, ctx: &ObjectContext) -> String {
        match self {
            ConfigKind::Realm => ctx.realm_arg(),
            ConfigKind::ZoneGroup => ctx.zone_group_arg(),
            ConfigKind::Zone => ctx.zone_arg(),
        }
    }
}

/// Creates the entity unless `<kind> get` finds it. Any failure other than `ENOENT` is returned.
pub async fn create_multisite_configuration(
    ctx: &ObjectContext,
    kind: ConfigKind,
    create_args: Vec<String>,
    make_default: bool,
) -> Result<bool> {
    let mut get = args([kind.command(), "get"], [kind.arg(ctx)]);
    if kind == ConfigKind::ZoneGroup {
        get.push(ctx.realm_arg());
    }
    match ctx.run_no_multisite(&get).await {
        Ok(_) => return Ok(false),
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }

    let mut create = vec![kind.command().to_string(), "create".to_string()];
    create.extend(create_args);
    create.push(kind.arg(ctx));
    if make_default {
        create.push("--default".to_string());
    }
    ctx.run_no_multisite(&create).await?;
    tracing::debug!(
        kind = kind.command(),
        realm = %ctx.realm,
        zonegroup = %ctx.zone_group,
        zone = %ctx.zone,
        "created multisite config"
    );
    Ok(true)
}

/// Sets up the realm, zonegroup and zone of a single-site store, then commits once.
pub async fn create_non_multisite_store(
    ctx: &ObjectContext,
    endpoint_arg: Option<String>,
    shared_pools: &SharedPoolsSpec,
    default_realm: bool,
) -> Result<()> {
    tracing::debug!(store = %ctx.name, "creating realm, zonegroup and zone");
    let endpoint: Vec<String> = endpoint_arg.into_iter().collect();

    create_multisite_configuration(ctx, ConfigKind::Realm, vec![], default_realm).await?;

    let mut zone_group_args = vec!["--master".to_string(), ctx.realm_arg()];
    zone_group_args.extend(endpoint.iter().cloned());
    create_multisite_configuration(ctx, ConfigKind::ZoneGroup, zone_group_args, false).await?;

    let mut zone_args = vec!["--master".to_string()];
    zone_args.extend(endpoint);
    zone_args.extend([ctx.realm_arg(), ctx.zone_group_arg()]);
    create_multisite_configuration(ctx, ConfigKind::Zone, zone_args, false).await?;

    tracing::info!(
        store = %ctx.name,
        realm = %ctx.realm,
        zonegroup = %ctx.zone_group,
        zone = %ctx.zone,
        "object store multisite config ready"
    );

    configure_shared_pools_for_zone(ctx, shared_pools).await?;
    ctx.commit_config_changes().await
}

pub async fn zone_group_config(ctx: &ObjectContext) -> Result<ZoneGroupConfig> {
    ctx.run_no_multisite_json(&args(
        ["zonegroup", "get"],
        [ctx.realm_arg(), ctx.zone_group_arg()],
    ))
    .await
}

pub async fn check_zone_is_master(ctx: &ObjectContext) -> Result<bool> {
    let group = zone_group_config(ctx).await?;
    let zone: IdDocument = ctx
        .run_no_multisite_json(&args(
            ["zone", "get"],
            [ctx.realm_arg(), ctx.zone_group_arg(), ctx.zone_arg()],
        ))
        .await?;
    let master = zone.id == group.master_zone;
    tracing::debug!(zone = %ctx.zone, master, "checked zone master");
    Ok(master)
}

pub async fn check_zone_group_is_master(ctx: &ObjectContext) -> Result<bool> {
    Ok(zone_group_config(ctx).await?.is_master)
}

pub async fn zone_present_in_zone_group(ctx: &ObjectContext) -> Result<bool> {
    let group: ZoneGroupConfig = ctx.run_json(&args(["zonegroup", "get"], [])).await?;
    Ok(group.zone(&ctx.zone).is_some())
}

/// Endpoints of the zone other than `service_endpoint`, and whether `service_endpoint` was listed.
pub async fn zone_endpoints(
    ctx: &ObjectContext,
    service_endpoint: &str,
) -> Result<(Vec<String>, bool)> {
    let group = zone_group_config(ctx).await?;
    let endpoints = group
        .zone(&ctx.zone)
        .map(|zone| zone.endpoints.clone())
        .unwrap_or_default();
    let exists = endpoints.iter().any(|endpoint| endpoint == service_endpoint);
    Ok((
        endpoints
            .into_iter()
            .filter(|endpoint| endpoint != service_endpoint)
            .collect(),
        exists,
    ))
}

/// Points the zone, and the zonegroup when the zone is master, at `endpoints`.
///
/// The master zone of the master zonegroup also gets the realm system user.
pub async fn join_multisite(
    ctx: &ObjectContext,
    endpoints: &[String],
    keys: &RealmKeys,
) -> Result<()> {
    tracing::debug!(zone = %ctx.zone, ?endpoints, "joining zone");
    let endpoint_arg = endpoints_arg(endpoints);

    let zone_is_master = check_zone_is_master(ctx).await?;
    let mut zone_group_is_master = false;
    if zone_is_master {
        ctx.run_no_multisite(&args(
            ["zonegroup", "modify"],
            [ctx.realm_arg(), ctx.zone_group_arg(), endpoint_arg.clone()],
        ))
        .await?;
        zone_group_is_master = check_zone_group_is_master(ctx).await?;
    }
    ctx.run_no_multisite(&args(
        ["zone", "modify"],
        [
            ctx.realm_arg(),
            ctx.zone_group_arg(),
            ctx.zone_arg(),
            endpoint_arg,
        ],
    ))
    .await?;
    ctx.commit_config_changes().await?;
    tracing::info!(
        store = %ctx.name,
        realm = %ctx.realm,
        zonegroup = %ctx.zone_group,
        zone = %ctx.zone,
        "joined multisite"
    );

    if zone_is_master && zone_group_is_master {
        create_system_user(ctx, keys).await?;
    }
    Ok(())
}

pub fn system_user_id(realm: &str) -> String {
    format!("{realm}-system-user")
}

/// radosgw-admin answers `EINVAL` when the user does not exist in the scoped zone.
pub async fn create_system_user(ctx: &ObjectContext, keys: &RealmKeys) -> Result<()> {
    let uid = system_user_id(&ctx.realm);
    let uid_arg = format!("--uid={uid}");
    let scope = [ctx.realm_arg(), ctx.zone_group_arg(), ctx.zone_arg()];

    let mut info = args(["user", "info"], [uid_arg.clone()]);
    info.extend(scope.iter().cloned());
    match ctx.run_no_multisite(&info).await {
        Ok(_) => {
            tracing::debug!(%uid, "realm system user already exists");
            return Ok(());
        }
        Err(err) if err.exit_code() == Some(EXIT_INVALID_ARGUMENT) => {}
        Err(err) => return Err(err),
    }

    let mut create = args(["user", "create"], scope);
    create.extend([uid_arg, format!("--display-name={}.user", ctx.realm)]);
    create.extend(keys.args());
    create.push("--system".to_string());
    ctx.run_no_multisite(&create).await?;
    tracing::info!(%uid, "created realm system user");
    Ok(())
}

/// Keeps the store's gateway endpoint registered in its multisite zone.
///
/// Zones with custom endpoints are left alone. A store with sync traffic disabled
/// removes nothing but does not add its endpoint either.
pub async fn configure_multisite_store(
    ctx: &ObjectContext,
    disable_sync_traffic: bool,
    custom_endpoints: &[String],
    keys: &RealmKeys,
) -> Result<()> {
    if !custom_endpoints.is_empty() {
        return Ok(());
    }
    let (mut endpoints, exists) = zone_endpoints(ctx, &ctx.endpoint).await?;
    if exists != disable_sync_traffic {
        return Ok(());
    }
    if !exists {
        endpoints.push(ctx.endpoint.clone());
    }
    join_multisite(ctx, &endpoints, keys).await
}

/// Drops the store's endpoint from its zone, and from the zonegroup when the zone is master.
pub async fn remove_from_multisite(ctx: &ObjectContext) -> Result<()> {
    let (endpoints, exists) = zone_endpoints(ctx, &ctx.endpoint).await?;
    if !exists {
        return Ok(());
    }
    let endpoint_arg = endpoints_arg(&endpoints);

    let zone_is_master = check_zone_is_master(ctx).await?;
    let mut zone_group_is_master = false;
    if zone_is_master {
        ctx.run_no_multisite(&args(
            ["zonegroup", "modify"],
            [ctx.realm_arg(), ctx.zone_group_arg(), endpoint_arg.clone()],
        ))
        .await?;
        zone_group_is_master = check_zone_group_is_master(ctx).await?;
    }
    ctx.run(&args(["zone", "modify"], [endpoint_arg])).await?;
    tracing::debug!(
        endpoint = %ctx.endpoint,
        zone = %ctx.zone,
        remaining = ?endpoints,
        "removed endpoint from zone"
    );

    if zone_is_master && zone_group_is_master && endpoints.is_empty() {
        tracing::warn!(
            realm = %ctx.realm,
            zone = %ctx.zone,
            "no other zone in the realm can commit to the period or pull the realm until \
             another object store joins this zone"
        );
    }
    ctx.commit_config_changes().await
}

/// Realms known to the cluster. `ENOENT` means there are none.
pub async fn list_realms(ctx: &ObjectContext) -> Result<Vec<String>> {
    match ctx
        .run_no_multisite_json::<RealmList>(&args(["realm", "list"], []))
        .await
    {
        Ok(list) => Ok(list.realms),
        Err(err) if err.is_not_found() => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

/// Best effort. Failures are logged and the deletion carries on.
pub async fn delete_realm(ctx: &ObjectContext) {
    let realm = format!("--rgw-realm={}", ctx.name);
    let zone_group = format!("--rgw-zonegroup={}", ctx.name);
    if let Err(err) = ctx
        .run_no_multisite(&args(["realm", "delete"], [realm.clone()]))
        .await
    {
        tracing::warn!(realm = %ctx.name, error = %err, "failed to delete rgw realm");
    }
    if let Err(err) = ctx
        .run_no_multisite(&args(["zonegroup", "delete"], [realm, zone_group]))
        .await
    {
        tracing::warn!(zonegroup = %ctx.name, error = %err, "failed to delete rgw zonegroup");
    }
    if let Err(err) = ctx.run(&args(["zone", "delete"], [])).await {
        tracing::warn!(zone = %ctx.name, error = %err, "failed to delete rgw zone");
    }
}

/// Removes the realm trio of a single-site store, and its pools unless they are preserved.
///
/// The root pool goes too when this was the last store of the cluster.
pub async fn delete_single_site_realm_and_pools(
    ctx: &ObjectContext,
    preserve_pools: bool,
    pools_declared: bool,
) -> Result<()> {
    let stores = list_realms(ctx).await?;
    if stores.is_empty() {
        tracing::info!(store = %ctx.name, "no object store realms found, nothing to delete");
        return Ok(());
    }
    tracing::info!(store = %ctx.name, ?stores, "deleting object store realm");
    delete_realm(ctx).await;

    let last_store = stores.len() == 1 && stores[0] == ctx.name;
    if preserve_pools {
        tracing::info!(store = %ctx.name, "preservePoolsOnDelete is set, pools not deleted");
        return Ok(());
    }
    if !pools_declared {
        tracing::info!(store = %ctx.name, "skipping removal of pools since none are declared");
        return Ok(());
    }
    delete_pools(ctx, last_store, &ctx.name).await
}

pub async fn realm_exists(ctx: &ObjectContext) -> Result<bool> {
    match ctx
        .run_no_multisite(&args(["realm", "get"], [ctx.realm_arg()]))
        .await
    {
        Ok(_) => Ok(true),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Creates the realm if missing. The first realm of the cluster becomes the default one.
pub async fn create_realm(ctx: &ObjectContext) -> Result<bool> {
    if realm_exists(ctx).await? {
        return Ok(false);
    }
    let first = list_realms(ctx).await?.is_empty();
    create_multisite_configuration(ctx, ConfigKind::Realm, vec![], first).await
}

pub async fn pull_realm(ctx: &ObjectContext, url: &str, keys: &RealmKeys) -> Result<()> {
    let mut pull = args(["realm", "pull"], [ctx.realm_arg(), format!("--url={url}")]);
    pull.extend(keys.args());
    ctx.run_no_multisite(&pull).await?;
    tracing::debug!(realm = %ctx.realm, %url, "pulled realm");
    Ok(())
}

pub async fn zone_group_exists(ctx: &ObjectContext) -> Result<bool> {
    match zone_group_config(ctx).await {
        Ok(_) => Ok(true),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Creates the zonegroup if missing. It is master when the realm period has no master
/// zonegroup yet.
pub async fn create_zone_group(ctx: &ObjectContext) -> Result<bool> {
    let period: PeriodDocument = ctx
        .run_no_multisite_json(&args(["period", "get"], [ctx.realm_arg()]))
        .await?;
    if zone_group_exists(ctx).await? {
        return Ok(false);
    }
    let mut create = args(
        ["zonegroup", "create"],
        [ctx.realm_arg(), ctx.zone_group_arg()],
    );
    if period.master_zonegroup.is_empty() {
        create.push("--master".to_string());
    }
    ctx.run_no_multisite(&create).await?;
    tracing::info!(zonegroup = %ctx.zone_group, realm = %ctx.realm, "created zonegroup");
    Ok(true)
}

/// Creates the zone if missing, or updates its custom endpoints when they changed.
///
/// The first zone of a zonegroup becomes its master.
pub async fn create_zone_if_not_exists(
    ctx: &ObjectContext,
    custom_endpoints: &[String],
    keys: &RealmKeys,
) -> Result<bool> {
    let group = zone_group_config(ctx).await?;

    let get = args(
        ["zone", "get"],
        [ctx.realm_arg(), ctx.zone_group_arg(), ctx.zone_arg()],
    );
    match ctx.run_no_multisite(&get).await {
        Ok(_) => {
            if should_update_zone_endpoint_list(&group.zones, custom_endpoints, &ctx.zone)? {
                tracing::debug!(zone = %ctx.zone, ?custom_endpoints, "updating zone endpoints");
                join_multisite(ctx, custom_endpoints, keys).await?;
            }
            return Ok(false);
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }

    let mut create = args(
        ["zone", "create"],
        [ctx.realm_arg(), ctx.zone_group_arg(), ctx.zone_arg()],
    );
    create.extend(keys.args());
    if group.master_zone.is_empty() {
        create.push("--master".to_string());
    }
    if !custom_endpoints.is_empty() {
        create.push(endpoints_arg(custom_endpoints));
    }
    ctx.run_no_multisite(&create).await?;
    tracing::info!(zone = %ctx.zone, zonegroup = %ctx.zone_group, "created zone");
    Ok(true)
}

pub async fn remove_zone_from_zone_group(ctx: &ObjectContext) -> Result<()> {
    ctx.run_no_multisite(&args(
        ["zonegroup", "remove"],
        [ctx.realm_arg(), ctx.zone_group_arg(), ctx.zone_arg()],
    ))
    .await?;
    ctx.run_no_multisite(&args(
        ["period", "update", "--commit"],
        [ctx.realm_arg(), ctx.zone_group_arg()],
    ))
    .await?;
    Ok(())
}

pub async fn delete_zone(ctx: &ObjectContext) -> Result<()> {
    ctx.run_no_multisite(&args(
        ["zone", "delete"],
        [ctx.realm_arg(), ctx.zone_arg()],
    ))
    .await?;
    Ok(())
}

/// Commits the realm period after zonegroup changes, scoped to realm and zonegroup only.
pub async fn commit_zone_group(ctx: &ObjectContext) -> Result<()> {
    ctx.run_no_multisite(&args(
        ["period", "update", "--commit"],
        [ctx.realm_arg(), ctx.zone_group_arg()],
    ))
    .await?;
    Ok(())
}

/// Removes the zonegroup from its realm and commits. A missing zonegroup is fine.
pub async fn delete_zone_group(ctx: &ObjectContext) -> Result<()> {
    match ctx
        .run_no_multisite(&args(
            ["zonegroup", "delete"],
            [ctx.realm_arg(), ctx.zone_group_arg()],
        ))
        .await
    {
        Ok(_) => {}
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err),
    }
    ctx.run_no_multisite(&args(["period", "update", "--commit"], [ctx.realm_arg()]))
        .await?;
    tracing::info!(zonegroup = %ctx.zone_group, realm = %ctx.realm, "deleted zonegroup");
    Ok(())
}

/// Deletes the realm of `ctx`. A missing realm is fine.
pub async fn delete_realm_only(ctx: &ObjectContext) -> Result<()> {
    match ctx
        .run_no_multisite(&args(["realm", "delete"], [ctx.realm_arg()]))
        .await
    {
        Ok(_) => {
            tracing::info!(realm = %ctx.realm, "deleted realm");
            Ok(())
        }
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err),
    }
}

/// The prefix the zone's dedicated pools were created with, read from its `domain_root`.
pub async fn zone_pool_prefix(ctx: &ObjectContext) -> Result<String> {
    let zone: DomainRoot = ctx
        .run_no_multisite_json(&args(
            ["zone", "get"],
            [ctx.realm_arg(), ctx.zone_group_arg(), ctx.zone_arg()],
        ))
        .await?;
    Ok(pool_prefix_from_domain_root(&zone.domain_root))
}

fn pool_prefix_from_domain_root(domain_root: &str) -> String {
    domain_root
        .split(".rgw.")
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rgw::{
        cli::testing::{FakeExecutor, cli},
        error::EXIT_NOT_FOUND,
    };

    const ZONE_GROUP: &str = r#"{
        "id": "zg-id",
        "name": "zg",
        "is_master": true,
        "master_zone": "zone-a-id",
        "endpoints": [],
        "zones": [
            {
                "id": "zone-a-id",
                "name": "zone-a",
                "endpoints": ["http://rgw-a:80", "http://other:80"]
            },
            {"id": "zone-b-id", "name": "zone-b", "endpoints": []}
        ]
    }"#;

    fn context(executor: Arc<FakeExecutor>) -> ObjectContext {
        ObjectContext::new(cli(executor), "store")
            .with_multisite("realm", "zg", "zone-a")
            .with_endpoint("http://rgw-a:80")
    }

    fn keys() -> RealmKeys {
        RealmKeys {
            access_key: "AK".into(),
            secret_key: "SK".into(),
        }
    }

    #[test]
    fn test_realm_keys() {
        let generated = RealmKeys::generate();
        assert_eq!(generated.access_key.len(), 32);
        assert_ne!(generated.access_key, generated.secret_key);
        assert!(!format!("{generated:?}").contains(&generated.secret_key));
        assert_eq!(keys().args(), ["--access-key=AK", "--secret-key=SK"]);
    }

    #[test]
    fn test_should_update_zone_endpoint_list() {
        let zones = vec![ZoneEndpoints {
            name: "zone-a".into(),
            endpoints: vec!["http://b".into(), "http://a".into()],
        }];
        let same = vec!["http://a".to_string(), "http://b".to_string()];
        assert!(!should_update_zone_endpoint_list(&zones, &same, "zone-a").unwrap());
        assert!(
            should_update_zone_endpoint_list(&zones, &["http://a".to_string()], "zone-a").unwrap()
        );
        assert!(!should_update_zone_endpoint_list(&zones, &same, "unknown").unwrap());
        assert!(should_update_zone_endpoint_list(&zones, &same, "").is_err());
    }

    #[test]
    fn test_pool_prefix_from_domain_root() {
        assert_eq!(pool_prefix_from_domain_root("zone-a.rgw.meta:root"), "zone-a");
        assert_eq!(pool_prefix_from_domain_root("plain"), "plain");
    }

    #[tokio::test]
    async fn test_create_non_multisite_store_skips_existing() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("realm get", Ok("{}"))
            .expect("zonegroup get", Err(EXIT_NOT_FOUND))
            .expect("zone get", Ok("{}"))
            .expect("period get", Ok(r#"{"id": "1"}"#))
            .expect("period update", Ok(r#"{"id": "2"}"#));
        let ctx = ObjectContext::new(cli(executor.clone()), "store");
        create_non_multisite_store(
            &ctx,
            Some("--endpoints=http://rgw:80".to_string()),
            &SharedPoolsSpec::default(),
            false,
        )
        .await
        .unwrap();

        let commands = executor.commands();
        assert!(commands[0].starts_with("radosgw-admin realm get --rgw-realm=store"));
        assert!(commands[1].starts_with(
            "radosgw-admin zonegroup get --rgw-zonegroup=store --rgw-realm=store"
        ));
        assert!(commands[2].starts_with(
            "radosgw-admin zonegroup create --master --rgw-realm=store --endpoints=http://rgw:80 --rgw-zonegroup=store"
        ));
        assert!(commands[3].starts_with("radosgw-admin zone get --rgw-zone=store"));
        assert!(!commands.iter().any(|c| c.contains("zone create")));
        assert!(!commands.iter().any(|c| c.contains("--commit")));
    }

    #[tokio::test]
    async fn test_zone_endpoints_excludes_service_endpoint() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("zonegroup get", Ok(ZONE_GROUP));
        let ctx = context(executor);
        let (endpoints, exists) = zone_endpoints(&ctx, "http://rgw-a:80").await.unwrap();
        assert!(exists);
        assert_eq!(endpoints, vec!["http://other:80"]);
    }

    #[tokio::test]
    async fn test_join_multisite_as_master_creates_system_user() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("zonegroup get", Ok(ZONE_GROUP))
            .expect("zone get", Ok(r#"{"id": "zone-a-id"}"#))
            .expect("zonegroup get", Ok(ZONE_GROUP))
            .expect("period get", Ok(r#"{"id": "1"}"#))
            .expect("period update", Ok(r#"{"id": "2"}"#))
            .expect("user info", Err(EXIT_INVALID_ARGUMENT));
        let ctx = context(executor.clone());
        join_multisite(&ctx, &["http://rgw-a:80".to_string()], &keys())
            .await
            .unwrap();

        let commands = executor.commands();
        assert!(commands.iter().any(|c| c.starts_with(
            "radosgw-admin zonegroup modify --rgw-realm=realm --rgw-zonegroup=zg --endpoints=http://rgw-a:80"
        )));
        assert!(commands.iter().any(|c| c.starts_with(
            "radosgw-admin zone modify --rgw-realm=realm --rgw-zonegroup=zg --rgw-zone=zone-a --endpoints=http://rgw-a:80"
        )));
        let create = commands.last().unwrap();
        assert!(create.starts_with(
            "radosgw-admin user create --rgw-realm=realm --rgw-zonegroup=zg --rgw-zone=zone-a --uid=realm-system-user --display-name=realm.user --access-key=AK --secret-key=SK --system"
        ));
    }

    #[tokio::test]
    async fn test_configure_multisite_store_noop_when_registered() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("zonegroup get", Ok(ZONE_GROUP));
        let ctx = context(executor.clone());
        configure_multisite_store(&ctx, false, &[], &keys())
            .await
            .unwrap();
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_single_site_keeps_root_pool_with_other_stores() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("realm list", Ok(r#"{"default_info": "", "realms": ["store", "other"]}"#))
            .expect("osd lspools", Ok(r#"[{"poolnum": 1, "poolname": "store.rgw.meta"}]"#))
            .expect("osd erasure-code-profile ls", Ok("[]"));
        let ctx = ObjectContext::new(cli(executor.clone()), "store");
        delete_single_site_realm_and_pools(&ctx, false, true)
            .await
            .unwrap();
        let commands = executor.commands();
        assert!(
            commands
                .iter()
                .any(|c| c.starts_with("radosgw-admin realm delete --rgw-realm=store"))
        );
        assert!(commands.iter().any(|c| c.starts_with("ceph osd pool delete store.rgw.meta")));
        assert!(!commands.iter().any(|c| c.contains(".rgw.root")));
    }

    #[tokio::test]
    async fn test_delete_single_site_without_realms() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("realm list", Err(EXIT_NOT_FOUND));
        let ctx = ObjectContext::new(cli(executor.clone()), "store");
        delete_single_site_realm_and_pools(&ctx, false, true)
            .await
            .unwrap();
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_first_zone_group_is_master() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("period get", Ok(r#"{"id": "1", "master_zonegroup": ""}"#))
            .expect("zonegroup get", Err(EXIT_NOT_FOUND));
        let ctx = context(executor.clone());
        assert!(create_zone_group(&ctx).await.unwrap());
        assert!(executor.commands()[2].starts_with(
            "radosgw-admin zonegroup create --rgw-realm=realm --rgw-zonegroup=zg --master"
        ));
    }

    #[tokio::test]
    async fn test_create_zone_with_custom_endpoints() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("zonegroup get", Ok(r#"{"master_zone": "other", "zones": []}"#))
            .expect("zone get", Err(EXIT_NOT_FOUND));
        let ctx = context(executor.clone());
        let created = create_zone_if_not_exists(&ctx, &["http://custom:80".to_string()], &keys())
            .await
            .unwrap();
        assert!(created);
        let create = &executor.commands()[2];
        assert!(create.contains("--access-key=AK --secret-key=SK --endpoints=http://custom:80"));
        assert!(!create.contains("--master"));
    }

    #[tokio::test]
    async fn test_delete_missing_zone_group_skips_commit() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("zonegroup delete", Err(EXIT_NOT_FOUND));
        delete_zone_group(&context(executor.clone())).await.unwrap();
        assert_eq!(executor.commands().len(), 1);

        let executor = Arc::new(FakeExecutor::default());
        delete_zone_group(&context(executor.clone())).await.unwrap();
        assert!(
            executor.commands()[1]
                .starts_with("radosgw-admin period update --commit --rgw-realm=realm")
        );
    }
}
