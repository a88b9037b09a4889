use std::collections::BTreeSet;

use futures::future::{join_all, try_join_all};
use serde::Deserialize;
use snafu::ensure;

use super::{
    cli::AdminCli,
    context::ObjectContext,
    error::{Result, StorePoolsMissingSnafu},
};
use crate::api::pool::PoolSpec;

pub const METADATA_POOLS: [&str; 6] = [
    "rgw.control",
    "rgw.meta",
    "rgw.log",
    "rgw.buckets.index",
    "rgw.buckets.non-ec",
    "rgw.otp",
];
pub const DATA_POOL: &str = "rgw.buckets.data";
/// Holds realm, zonegroup and zone configuration for every store of the cluster.
pub const ROOT_POOL: &str = ".rgw.root";

const RGW_APPLICATION: &str = "rgw";
const DEFAULT_PG_COUNT: &str = "8";
/// Small metadata pools keep their PG count so the autoscaler does not immediately grow them.
const METADATA_PG_COUNT: &str = "8";
const CONFIRM: &str = "--yes-i-really-mean-it";
const REALLY_CONFIRM: &str = "--yes-i-really-really-mean-it";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
struct PoolSummary {
    #[serde(rename = "poolname")]
    name: String,
    #[serde(rename = "poolnum")]
    number: i64,
}

/// The pool name is `<prefix>.<name>`, except for pools such as `.rgw.root` that span stores.
pub fn pool_name(prefix: &str, name: &str) -> String {
    if name.starts_with('.') {
        return name.to_string();
    }
    format!("{prefix}.{name}")
}

pub fn ec_profile_name(store: &str) -> String {
    format!("{store}_ecprofile")
}

pub fn all_object_pools(prefix: &str) -> Vec<String> {
    METADATA_POOLS
        .iter()
        .chain([DATA_POOL, ROOT_POOL].iter())
        .map(|pool| pool_name(prefix, pool))
        .collect()
}

pub async fn list_pools(cli: &AdminCli) -> Result<BTreeSet<String>> {
    let pools: Vec<PoolSummary> = cli.ceph(&["osd", "lspools"]).await?;
    Ok(pools.into_iter().map(|pool| pool.name).collect())
}

/// Pools of the store that do not exist in the cluster.
///
/// Listing all pools at once separates a missing pool from a cluster connection problem.
pub async fn missing_pools(ctx: &ObjectContext) -> Result<Vec<String>> {
    let existing = list_pools(&ctx.cli).await?;
    Ok(all_object_pools(&ctx.zone)
        .into_iter()
        .filter(|pool| !existing.contains(pool))
        .collect())
}

/// Creates the metadata, root and data pools of a store.
///
/// When either pool spec is empty the pools are expected to exist already.
pub async fn create_object_store_pools(
    ctx: &ObjectContext,
    metadata_pool: &PoolSpec,
    data_pool: &PoolSpec,
) -> Result<()> {
    if metadata_pool.is_empty() || data_pool.is_empty() {
        tracing::info!(store = %ctx.name, "no pools specified, checking for their existence");
        let missing = missing_pools(ctx).await?;
        ensure!(missing.is_empty(), StorePoolsMissingSnafu { pools: missing });
        return Ok(());
    }

    let existing = list_pools(&ctx.cli).await?;
    let metadata = METADATA_POOLS
        .iter()
        .chain([ROOT_POOL].iter())
        .map(|pool| pool_name(&ctx.name, pool))
        .filter(|pool| !existing.contains(pool))
        .map(|pool| create_pool(ctx, pool, metadata_pool, METADATA_PG_COUNT, true));
    try_join_all(metadata).await?;

    let data = pool_name(&ctx.name, DATA_POOL);
    if !existing.contains(&data) {
        create_pool(ctx, data, data_pool, DEFAULT_PG_COUNT, false).await?;
    }
    Ok(())
}

async fn create_pool(
    ctx: &ObjectContext,
    name: String,
    spec: &PoolSpec,
    pg_count: &str,
    pin_pg_count: bool,
) -> Result<()> {
    let cli = &ctx.cli;
    match &spec.erasure_coded {
        Some(ec) => {
            let profile = ec_profile_name(&ctx.name);
            let k = format!("k={}", ec.data_chunks);
            let m = format!("m={}", ec.coding_chunks);
            let mut args = vec!["osd", "erasure-code-profile", "set", &profile, &k, &m];
            let failure_domain = format!("crush-failure-domain={}", spec.failure_domain);
            let device_class = format!("crush-device-class={}", spec.device_class);
            if !spec.failure_domain.is_empty() {
                args.push(&failure_domain);
            }
            if !spec.device_class.is_empty() {
                args.push(&device_class);
            }
            cli.ceph_void(&args).await?;
            cli.ceph_void(&["osd", "pool", "create", &name, pg_count, "erasure", &profile])
                .await?;
            // RGW data pools on EC need overwrites for partial writes.
            cli.ceph_void(&["osd", "pool", "set", &name, "allow_ec_overwrites", "true"])
                .await?;
        }
        None => {
            let mut args = vec!["osd", "pool", "create", &name, pg_count, "replicated"];
            if !spec.failure_domain.is_empty() {
                let mut rule = vec![
                    "osd",
                    "crush",
                    "rule",
                    "create-replicated",
                    &name,
                    "default",
                    &spec.failure_domain,
                ];
                if !spec.device_class.is_empty() {
                    rule.push(&spec.device_class);
                }
                cli.ceph_void(&rule).await?;
                args.push(&name);
            }
            cli.ceph_void(&args).await?;
            if let Some(replicated) = &spec.replicated {
                let size = replicated.size.to_string();
                cli.ceph_void(&["osd", "pool", "set", &name, "size", &size])
                    .await?;
            }
        }
    }

    cli.ceph_void(&[
        "osd",
        "pool",
        "application",
        "enable",
        &name,
        RGW_APPLICATION,
        CONFIRM,
    ])
    .await?;
    if pin_pg_count {
        cli.ceph_void(&["osd", "pool", "set", &name, "pg_num_min", pg_count])
            .await?;
    }
    tracing::info!(pool = %name, "created pool");
    Ok(())
}

/// Deletes the pools of a store. Failures on single pools are logged and skipped.
pub async fn delete_pools(ctx: &ObjectContext, last_store: bool, prefix: &str) -> Result<()> {
    let existing = list_pools(&ctx.cli).await?;
    let mut pools: Vec<&str> = METADATA_POOLS.to_vec();
    pools.push(DATA_POOL);
    if last_store {
        pools.push(ROOT_POOL);
    }

    let deletions = pools
        .into_iter()
        .map(|pool| pool_name(prefix, pool))
        .filter(|pool| {
            let exists = existing.contains(pool);
            if !exists {
                tracing::info!(pool = %pool, "pool not found for deletion");
            }
            exists
        })
        .map(|pool| async move {
            let result = ctx
                .cli
                .ceph_void(&["osd", "pool", "delete", &pool, &pool, REALLY_CONFIRM])
                .await;
            (pool, result)
        });
    for (pool, result) in join_all(deletions).await {
        match result {
            Ok(()) => tracing::info!(pool = %pool, "purged pool"),
            Err(err) => tracing::warn!(pool = %pool, error = %err, "failed to delete pool"),
        }
    }

    // Only the data pool can be erasure coded, so a single profile per store exists.
    let profile = ec_profile_name(&ctx.name);
    let profiles: Vec<String> = ctx.cli.ceph(&["osd", "erasure-code-profile", "ls"]).await?;
    if profiles.contains(&profile) {
        ctx.cli
            .ceph_void(&["osd", "erasure-code-profile", "rm", &profile])
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        api::pool::{ErasureCodedSpec, ReplicatedSpec},
        rgw::cli::testing::{FakeExecutor, cli},
    };

    const ALL_POOLS: &str = r#"[
        {"poolnum": 1, "poolname": "my-store.rgw.control"},
        {"poolnum": 2, "poolname": "my-store.rgw.meta"},
        {"poolnum": 3, "poolname": "my-store.rgw.log"},
        {"poolnum": 4, "poolname": "my-store.rgw.buckets.index"},
        {"poolnum": 5, "poolname": "my-store.rgw.buckets.non-ec"},
        {"poolnum": 6, "poolname": "my-store.rgw.otp"},
        {"poolnum": 7, "poolname": "my-store.rgw.buckets.data"},
        {"poolnum": 8, "poolname": ".rgw.root"}
    ]"#;

    fn context(executor: Arc<FakeExecutor>) -> ObjectContext {
        ObjectContext::new(cli(executor), "my-store")
    }

    #[test]
    fn test_pool_name() {
        assert_eq!(pool_name("my-store", "rgw.meta"), "my-store.rgw.meta");
        assert_eq!(pool_name("my-store", ".rgw.root"), ".rgw.root");
        assert_eq!(ec_profile_name("my-store"), "my-store_ecprofile");
        assert_eq!(all_object_pools("s").len(), 8);
    }

    #[tokio::test]
    async fn test_missing_pools_reported_for_external_pools() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect(
            "osd lspools",
            Ok(r#"[{"poolnum": 1, "poolname": "my-store.rgw.meta"}]"#),
        );
        let err = create_object_store_pools(
            &context(executor),
            &PoolSpec::default(),
            &PoolSpec::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("CR store pools are missing: "));
        assert!(err.to_string().contains("my-store.rgw.control"));
        assert!(!err.to_string().contains("\"my-store.rgw.meta\""));
    }

    #[tokio::test]
    async fn test_existing_pools_are_not_recreated() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("osd lspools", Ok(ALL_POOLS));
        let replicated = PoolSpec {
            replicated: Some(ReplicatedSpec { size: 3 }),
            ..PoolSpec::default()
        };
        create_object_store_pools(&context(executor.clone()), &replicated, &replicated)
            .await
            .unwrap();
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_create_erasure_coded_data_pool() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect(
            "osd lspools",
            Ok(&ALL_POOLS.replace("my-store.rgw.buckets.data", "other")),
        );
        let metadata = PoolSpec {
            replicated: Some(ReplicatedSpec { size: 3 }),
            ..PoolSpec::default()
        };
        let data = PoolSpec {
            failure_domain: "host".into(),
            erasure_coded: Some(ErasureCodedSpec {
                data_chunks: 2,
                coding_chunks: 1,
            }),
            ..PoolSpec::default()
        };
        create_object_store_pools(&context(executor.clone()), &metadata, &data)
            .await
            .unwrap();
        let commands = executor.commands();
        assert!(commands[1].starts_with(
            "ceph osd erasure-code-profile set my-store_ecprofile k=2 m=1 crush-failure-domain=host"
        ));
        assert!(commands[2].starts_with(
            "ceph osd pool create my-store.rgw.buckets.data 8 erasure my-store_ecprofile"
        ));
        assert!(commands.iter().any(|c| c.starts_with(
            "ceph osd pool application enable my-store.rgw.buckets.data rgw"
        )));
        assert!(!commands.iter().any(|c| c.contains("pg_num_min")));
    }

    #[tokio::test]
    async fn test_delete_pools_keeps_root_unless_last_store() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("osd lspools", Ok(ALL_POOLS))
            .expect("osd erasure-code-profile ls", Ok(r#"["default", "my-store_ecprofile"]"#));
        delete_pools(&context(executor.clone()), false, "my-store")
            .await
            .unwrap();
        let commands = executor.commands();
        let deleted = commands
            .iter()
            .filter(|c| c.starts_with("ceph osd pool delete"))
            .count();
        assert_eq!(deleted, 7);
        assert!(!commands.iter().any(|c| c.contains("delete .rgw.root")));
        assert!(
            commands
                .last()
                .unwrap()
                .starts_with("ceph osd erasure-code-profile rm my-store_ecprofile")
        );
    }
}
