//! Maps shared pool declarations onto the zone and zonegroup documents of RGW.
//!
//! Several zones can live in the same pair of pools, each one inside its own rados
//! namespace. The documents are adjusted as untyped JSON so fields owned by RGW
//! survive the get/modify/set cycle. Only the placement entries themselves are
//! built from typed values.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use snafu::{ResultExt, ensure};

use super::{
    context::{ObjectContext, args},
    error::{
        Error, InvalidConfigSnafu, PlacementsNotAppliedSnafu, Result, SerializeConfigSnafu,
        SharedPoolMissingSnafu,
    },
    json,
    pools::list_pools,
};
use crate::api::pool::{
    DEFAULT_PLACEMENT, PoolPlacementSpec, STANDARD_STORAGE_CLASS, SharedPoolsSpec,
};

/// System pool fields of a zone and the namespace suffix each one gets in the shared metadata pool.
pub const ZONE_POOL_NAMESPACE_SUFFIXES: [(&str, &str); 18] = [
    ("domain_root", ".meta.root"),
    ("control_pool", ".control"),
    ("gc_pool", ".log.gc"),
    ("lc_pool", ".log.lc"),
    ("log_pool", ".log"),
    ("intent_log_pool", ".log.intent"),
    ("usage_log_pool", ".log.usage"),
    ("roles_pool", ".meta.roles"),
    ("reshard_pool", ".log.reshard"),
    ("user_keys_pool", ".meta.users.keys"),
    ("user_email_pool", ".meta.users.email"),
    ("user_swift_pool", ".meta.users.swift"),
    ("user_uid_pool", ".meta.users.uid"),
    ("otp_pool", ".otp"),
    ("notif_pool", ".log.notif"),
    ("topics_pool", ".meta.topics"),
    ("account_pool", ".meta.account"),
    ("group_pool", ".meta.group"),
];

/// A pool reference: `<pool>` for a dedicated pool or `<pool>:<namespace>` for a rados
/// namespace inside a shared pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolRef {
    pub pool: String,
    pub namespace: Option<String>,
}

impl PoolRef {
    pub fn shared(pool: impl Into<String>, namespace: impl Into<String>) -> PoolRef {
        PoolRef {
            pool: pool.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl fmt::Display for PoolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}:{namespace}", self.pool),
            None => f.write_str(&self.pool),
        }
    }
}

impl FromStr for PoolRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<PoolRef> {
        let (pool, namespace) = match s.split_once(':') {
            Some((pool, namespace)) => (pool, Some(namespace.to_string())),
            None => (s, None),
        };
        ensure!(
            !pool.is_empty(),
            InvalidConfigSnafu {
                message: format!("invalid pool reference {s:?}: pool name is empty"),
            }
        );
        Ok(PoolRef {
            pool: pool.to_string(),
            namespace,
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ZonePlacementStorageClass {
    pub data_pool: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ZonePlacementPoolVal {
    pub data_extra_pool: String,
    pub index_pool: String,
    pub storage_classes: BTreeMap<String, ZonePlacementStorageClass>,
    /// `zone set` resets the flag to false when it is omitted.
    pub inline_data: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ZonePlacementPool {
    pub key: String,
    pub val: ZonePlacementPoolVal,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ZonegroupPlacementTarget {
    pub name: String,
    pub storage_classes: Vec<String>,
}

/// Name of the placement new buckets land in.
pub fn default_placement_name(spec: &SharedPoolsSpec) -> &str {
    spec.default_placement()
        .map(|placement| placement.name.as_str())
        .unwrap_or(DEFAULT_PLACEMENT)
}

/// Pool holding the zone's system namespaces. The default placement wins over the shared
/// metadata pool.
pub fn default_metadata_pool(spec: &SharedPoolsSpec) -> &str {
    spec.default_placement()
        .map(|placement| placement.metadata_pool_name.as_str())
        .unwrap_or(&spec.metadata_pool_name)
}

fn standard_storage_class(data_pool: String) -> BTreeMap<String, ZonePlacementStorageClass> {
    BTreeMap::from([(
        STANDARD_STORAGE_CLASS.to_string(),
        ZonePlacementStorageClass { data_pool },
    )])
}

/// Placement entry of one declared placement inside the zone `ns`.
pub fn to_zone_placement_pool(spec: &PoolPlacementSpec, ns: &str) -> ZonePlacementPool {
    let placement_ns = format!("{ns}.{}", spec.name);
    // The extra pool holds multipart omap data, so it falls back to the metadata pool.
    let non_ec_pool = if spec.data_non_ec_pool_name.is_empty() {
        &spec.metadata_pool_name
    } else {
        &spec.data_non_ec_pool_name
    };

    let mut storage_classes = standard_storage_class(
        PoolRef::shared(&spec.data_pool_name, format!("{placement_ns}.data")).to_string(),
    );
    for sc in &spec.storage_classes {
        storage_classes.insert(
            sc.name.clone(),
            ZonePlacementStorageClass {
                data_pool: PoolRef::shared(&sc.data_pool_name, format!("{ns}.{}", sc.name))
                    .to_string(),
            },
        );
    }

    ZonePlacementPool {
        key: spec.name.clone(),
        val: ZonePlacementPoolVal {
            data_extra_pool: PoolRef::shared(non_ec_pool, format!("{placement_ns}.data.non-ec"))
                .to_string(),
            index_pool: PoolRef::shared(&spec.metadata_pool_name, format!("{placement_ns}.index"))
                .to_string(),
            storage_classes,
            inline_data: true,
        },
    }
}

/// All placement entries the zone `ns` must carry, keyed by placement id.
///
/// A declared default placement is also published as `default-placement`, which RGW keeps
/// using internally whatever the zonegroup default is.
pub fn to_zone_placement_pools(
    spec: &SharedPoolsSpec,
    ns: &str,
) -> BTreeMap<String, ZonePlacementPool> {
    let mut placements = BTreeMap::new();
    if !spec.metadata_pool_name.is_empty() && !spec.data_pool_name.is_empty() {
        placements.insert(
            DEFAULT_PLACEMENT.to_string(),
            ZonePlacementPool {
                key: DEFAULT_PLACEMENT.to_string(),
                val: ZonePlacementPoolVal {
                    data_extra_pool: PoolRef::shared(
                        &spec.metadata_pool_name,
                        format!("{ns}.buckets.non-ec"),
                    )
                    .to_string(),
                    index_pool: PoolRef::shared(
                        &spec.metadata_pool_name,
                        format!("{ns}.buckets.index"),
                    )
                    .to_string(),
                    storage_classes: standard_storage_class(
                        PoolRef::shared(&spec.data_pool_name, format!("{ns}.buckets.data"))
                            .to_string(),
                    ),
                    inline_data: true,
                },
            },
        );
    }

    for placement in &spec.pool_placements {
        let pool = to_zone_placement_pool(placement, ns);
        if placement.default && placement.name != DEFAULT_PLACEMENT {
            placements.insert(
                DEFAULT_PLACEMENT.to_string(),
                ZonePlacementPool {
                    key: DEFAULT_PLACEMENT.to_string(),
                    val: pool.val.clone(),
                },
            );
        }
        placements.insert(placement.name.clone(), pool);
    }
    placements
}

fn to_value<T: Serialize>(what: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).context(SerializeConfigSnafu { what })
}

/// Points every system pool of the zone at its namespace in the default metadata pool.
///
/// Without a default metadata pool the zone is returned unchanged.
pub fn adjust_zone_default_pools(zone: &Value, spec: &SharedPoolsSpec) -> Result<Value> {
    let name = json::get_str(zone, &["name"])?.to_string();
    let mut zone = zone.clone();

    let metadata_pool = default_metadata_pool(spec);
    if metadata_pool.is_empty() {
        return Ok(zone);
    }

    for (field, suffix) in ZONE_POOL_NAMESPACE_SUFFIXES {
        let namespaced = PoolRef::shared(metadata_pool, format!("{name}{suffix}")).to_string();
        let previous = json::set(&mut zone, &[field], Value::String(namespaced.clone()))?;
        if previous.as_ref().and_then(Value::as_str) != Some(namespaced.as_str()) {
            tracing::debug!(
                zone = %name,
                field,
                pool = %namespaced,
                "moved zone pool to shared namespace"
            );
        }
    }

    if let Some(fields) = zone.as_object() {
        let known: BTreeSet<&str> = ZONE_POOL_NAMESPACE_SUFFIXES
            .iter()
            .map(|(field, _)| *field)
            .collect();
        for (field, value) in fields {
            if value.is_string() && field.ends_with("_pool") && !known.contains(field.as_str()) {
                tracing::warn!(zone = %name, field = %field, "zone config contains unknown pool");
            }
        }
    }
    Ok(zone)
}

/// Merges the declared placements into `placement_pools`.
///
/// Existing entries keep their unknown fields. Entries that are no longer declared are dropped,
/// except `default-placement`, which RGW cannot work without. The result is sorted by key
/// the same way `zone set` stores it.
pub fn adjust_zone_placement_pools(zone: &Value, spec: &SharedPoolsSpec) -> Result<Value> {
    let name = json::get_str(zone, &["name"])?.to_string();
    let mut zone = zone.clone();
    let current = json::get_array(&zone, &["placement_pools"])?.clone();
    let mut declared = to_zone_placement_pools(spec, &name);

    let mut placements = Vec::with_capacity(current.len() + declared.len());
    for mut placement in current {
        let key = json::get_str(&placement, &["key"])?.to_string();
        match declared.remove(&key) {
            Some(pool) => {
                json::set(&mut placement, &["val", "index_pool"], json!(pool.val.index_pool))?;
                json::set(
                    &mut placement,
                    &["val", "data_extra_pool"],
                    json!(pool.val.data_extra_pool),
                )?;
                json::set(
                    &mut placement,
                    &["val", "storage_classes"],
                    to_value("storage classes", &pool.val.storage_classes)?,
                )?;
                json::set(&mut placement, &["val", "inline_data"], json!(true))?;
                placements.push(placement);
            }
            None if key == DEFAULT_PLACEMENT => placements.push(placement),
            None => {
                tracing::info!(
                    zone = %name,
                    placement = %key,
                    "removing placement no longer declared"
                );
            }
        }
    }
    for pool in declared.into_values() {
        placements.push(to_value("placement", &pool)?);
    }

    placements.sort_by(|a, b| {
        let key = |p: &Value| p.get("key").and_then(Value::as_str).map(str::to_string);
        key(a).cmp(&key(b))
    });
    json::set(&mut zone, &["placement_pools"], Value::Array(placements))?;
    Ok(zone)
}

pub fn adjust_zone(zone: &Value, spec: &SharedPoolsSpec) -> Result<Value> {
    let zone = adjust_zone_default_pools(zone, spec)?;
    adjust_zone_placement_pools(&zone, spec)
}

/// One placement target per zone placement, with the sorted storage class names.
pub fn placement_targets_from_zone(
    zone: &Value,
) -> Result<BTreeMap<String, ZonegroupPlacementTarget>> {
    let mut targets = BTreeMap::new();
    for placement in json::get_array(zone, &["placement_pools"])? {
        let name = json::get_str(placement, &["key"])?.to_string();
        let storage_classes = json::get_object(placement, &["val", "storage_classes"])?
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        targets.insert(
            name.clone(),
            ZonegroupPlacementTarget {
                name,
                storage_classes,
            },
        );
    }
    Ok(targets)
}

/// Aligns the zonegroup placement targets and default placement with the adjusted zone.
pub fn adjust_zone_group_placement_targets(
    group: &Value,
    zone: &Value,
    default_placement: &str,
) -> Result<Value> {
    let name = json::get_str(group, &["name"])?.to_string();
    let mut group = group.clone();
    json::set(&mut group, &["default_placement"], json!(default_placement))?;

    let mut desired = placement_targets_from_zone(zone)?;
    let current = json::get_array(&group, &["placement_targets"])?.clone();

    let mut targets = Vec::with_capacity(desired.len());
    for mut target in current {
        let target_name = json::get_str(&target, &["name"])?.to_string();
        match desired.remove(&target_name) {
            Some(wanted) => {
                json::set(&mut target, &["storage_classes"], json!(wanted.storage_classes))?;
                targets.push(target);
            }
            None => {
                tracing::info!(
                    zonegroup = %name,
                    target = %target_name,
                    "removing placement target"
                );
            }
        }
    }
    for target in desired.into_values() {
        targets.push(to_value("placement target", &target)?);
    }
    json::set(&mut group, &["placement_targets"], Value::Array(targets))?;
    Ok(group)
}

/// Fails with the first referenced pool that does not exist in the cluster.
pub async fn shared_pools_exist(ctx: &ObjectContext, spec: &SharedPoolsSpec) -> Result<()> {
    let existing = list_pools(&ctx.cli).await?;
    for (pool, origin) in spec.referenced_pools() {
        ensure!(
            existing.contains(pool),
            SharedPoolMissingSnafu {
                pool,
                origin,
            }
        );
    }
    Ok(())
}

fn placements_not_applied(expected: &[Value], got: &[Value]) -> Error {
    let keys = |placements: &[Value]| {
        placements
            .iter()
            .filter_map(|p| p.get("key").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(",")
    };
    PlacementsNotAppliedSnafu {
        expected: keys(expected),
        got: keys(got),
    }
    .build()
}

/// Reapplies pool names that `zone set` dropped, using `zone placement modify`.
///
/// Older radosgw-admin releases ignore the rados namespace of data pools on `zone set`.
pub async fn zone_update_workaround(
    ctx: &ObjectContext,
    expected_zone: &Value,
    got_zone: &Value,
) -> Result<()> {
    let expected = json::get_array(expected_zone, &["placement_pools"])?;
    let got = json::get_array(got_zone, &["placement_pools"])?;
    ensure!(
        expected.len() == got.len(),
        PlacementsNotAppliedSnafu {
            expected: expected.len().to_string(),
            got: got.len().to_string(),
        }
    );

    for (expected_placement, got_placement) in expected.iter().zip(got) {
        let id = json::get_str(expected_placement, &["key"])?;
        if id != json::get_str(got_placement, &["key"])? {
            return Err(placements_not_applied(expected, got));
        }
        update_placement_workaround(ctx, id, expected_placement, got_placement).await?;
    }
    Ok(())
}

async fn update_placement_workaround(
    ctx: &ObjectContext,
    placement_id: &str,
    expected: &Value,
    got: &Value,
) -> Result<()> {
    let base = args(
        ["zone", "placement", "modify"],
        [
            ctx.realm_arg(),
            ctx.zone_group_arg(),
            ctx.zone_arg(),
            "--placement-id".to_string(),
            placement_id.to_string(),
        ],
    );

    let mut modify = base.clone();
    for (field, flag) in [
        ("index_pool", "--index-pool"),
        ("data_extra_pool", "--data-extra-pool"),
    ] {
        let want = json::get_str(expected, &["val", field])?;
        let have = json::get_str(got, &["val", field])?;
        if want != have {
            tracing::info!(
                zone = %ctx.zone,
                placement = placement_id,
                field,
                from = have,
                to = want,
                "reapplying placement pool"
            );
            modify.push(format!("{flag}={want}"));
        }
    }
    if modify.len() > base.len() {
        ctx.run_no_multisite(&modify).await?;
    }

    let expected_classes = json::get_object(expected, &["val", "storage_classes"])?;
    for storage_class in expected_classes.keys() {
        let path = ["val", "storage_classes", storage_class.as_str(), "data_pool"];
        let want = json::get_str(expected, &path)?;
        let have = json::get_str(got, &path)?;
        if want == have {
            continue;
        }
        tracing::info!(
            zone = %ctx.zone,
            placement = placement_id,
            storage_class = %storage_class,
            from = have,
            to = want,
            "reapplying storage class pool"
        );
        let mut modify = base.clone();
        modify.extend([
            "--storage-class".to_string(),
            storage_class.clone(),
            format!("--data-pool={want}"),
        ]);
        ctx.run_no_multisite(&modify).await?;
    }
    Ok(())
}

/// Writes the shared pools layout into the zone and zonegroup of `ctx`.
///
/// Returns whether anything was written. Committing the period is left to the caller.
pub async fn configure_shared_pools_for_zone(
    ctx: &ObjectContext,
    spec: &SharedPoolsSpec,
) -> Result<bool> {
    if spec.is_empty() {
        tracing::debug!(store = %ctx.name, "no shared pools to configure");
        return Ok(false);
    }

    tracing::info!(store = %ctx.name, zone = %ctx.zone, "configuring shared pools");
    shared_pools_exist(ctx, spec).await?;

    let zone = ctx.zone_json().await?;
    let zone_updated = adjust_zone(&zone, spec)?;
    let zone_changed = zone != zone_updated;

    let group = ctx.zone_group_json().await?;
    let group_updated =
        adjust_zone_group_placement_targets(&group, &zone_updated, default_placement_name(spec))?;
    let group_changed = group != group_updated;

    if zone_changed {
        tracing::info!(zone = %ctx.zone, "zone config changed, updating");
        let stored = ctx.set_zone_json(&zone_updated).await?;
        zone_update_workaround(ctx, &zone_updated, &stored).await?;
    }
    if group_changed {
        tracing::info!(zonegroup = %ctx.zone_group, "zonegroup config changed, updating");
        ctx.set_zone_group_json(&group_updated).await?;
    }
    Ok(zone_changed || group_changed)
}
