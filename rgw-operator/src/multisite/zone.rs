use std::sync::Arc;

use futures::StreamExt;
use snafu::ResultExt;
use stackable_operator::{
    client::Client,
    kube::{
        Resource, ResourceExt,
        api::ListParams,
        core::{DeserializeGuard, error_boundary},
        runtime::{Controller, controller::Action, reflector::ObjectRef, watcher},
    },
    logging::controller::report_controller_reconciled,
    namespace::WatchNamespace,
};

use super::{
    Ctx,
    error::{
        ApplyStatusSnafu, FinalizerSnafu, GetResourceSnafu, InvalidObjectSnafu, InvalidSpecSnafu,
        ListResourcesSnafu, Result, ZoneSnafu,
    },
    error_policy,
    topology::{get_referenced, namespace_of, realm_keys},
};
use crate::{
    OPERATOR_NAME,
    api::{
        object_store::ObjectStore,
        realm::ObjectRealm,
        status::Phase,
        zone::{ObjectZone, ObjectZoneSpec},
        zone_group::ObjectZoneGroup,
    },
    reconcile::{
        NOT_READY_REQUEUE, RESYNC_INTERVAL,
        finalizer::{add_finalizer, finish_deletion, has_finalizer},
        guard::run_guarded,
        status::{is_up_to_date, set_deletion_blocked, set_phase, set_ready},
    },
    rgw::{
        context::{ObjectContext, lock_realm},
        dependents::zone_dependents,
        multisite::{
            RealmKeys, create_zone_if_not_exists, delete_zone, remove_zone_from_zone_group,
            zone_pool_prefix,
        },
        pools::{create_object_store_pools, delete_pools},
        shared_pools::configure_shared_pools_for_zone,
    },
};

pub const ZONE_CONTROLLER_NAME: &str = "objectzone";

pub async fn reconcile_zone(
    zone: Arc<DeserializeGuard<ObjectZone>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let zone = zone
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidObjectSnafu)?;

    let kube = ctx.client.as_kube_client();
    run_guarded(&kube, &ctx.substrate, zone, reconcile(zone, &ctx)).await
}

async fn reconcile(zone: &ObjectZone, ctx: &Ctx) -> Result<Action> {
    let kube = ctx.client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let namespace = namespace_of(zone)?;

    if zone.meta().deletion_timestamp.is_some() {
        if !has_finalizer(zone) {
            return Ok(Action::await_change());
        }
        return delete(zone, ctx, &namespace).await;
    }
    zone.spec
        .validate()
        .map_err(|message| InvalidSpecSnafu { message }.build())?;
    if add_finalizer(&kube, zone).await.context(FinalizerSnafu)? {
        return Ok(Action::await_change());
    }
    if !is_up_to_date(zone) {
        set_phase(&kube, events, zone, Phase::Reconciling, None)
            .await
            .context(ApplyStatusSnafu)?;
    }

    let zone_group: ObjectZoneGroup =
        get_referenced(&ctx.client, &zone.spec.zone_group, &namespace).await?;
    let realm: ObjectRealm =
        get_referenced(&ctx.client, &zone_group.spec.realm, &namespace).await?;
    let keys = realm_keys(&ctx.client, &realm.name_any(), &namespace).await?;

    let rgw = ObjectContext::new(ctx.cli.for_namespace(&namespace), zone.name_any())
        .with_multisite(realm.name_any(), zone_group.name_any(), zone.name_any());
    {
        let _lock = lock_realm(&rgw.realm).await;
        provision_zone(&rgw, &zone.spec, &keys).await?;
    }

    let write = set_ready(&kube, events, zone, |status| status.dependents = None)
        .await
        .context(ApplyStatusSnafu)?;
    Ok(write.next_action(Action::requeue(RESYNC_INTERVAL)))
}

/// Creates the zone and its pools, or points it at the shared pools, then commits.
async fn provision_zone(
    rgw: &ObjectContext,
    spec: &ObjectZoneSpec,
    keys: &RealmKeys,
) -> Result<()> {
    let zone_context = |operation: &'static str| ZoneSnafu {
        operation,
        zone: rgw.zone.clone(),
    };
    create_zone_if_not_exists(rgw, &spec.custom_endpoints, keys)
        .await
        .context(zone_context("create"))?;
    if spec.shared_pools.needs_dedicated_pools() {
        create_object_store_pools(rgw, &spec.metadata_pool, &spec.data_pool)
            .await
            .context(zone_context("create pools of"))?;
    }
    configure_shared_pools_for_zone(rgw, &spec.shared_pools)
        .await
        .context(zone_context("configure shared pools of"))?;
    rgw.commit_config_changes()
        .await
        .context(zone_context("commit period for"))
}

/// Takes the zone out of its zonegroup and deletes it, with its pools unless preserved.
///
/// A zone RGW no longer knows is already gone.
async fn teardown_zone(rgw: &ObjectContext, spec: &ObjectZoneSpec) -> Result<()> {
    let zone_context = |operation: &'static str| ZoneSnafu {
        operation,
        zone: rgw.zone.clone(),
    };
    let prefix = match zone_pool_prefix(rgw).await {
        Ok(prefix) => prefix,
        Err(err) if err.is_not_found() => {
            tracing::info!(zone = %rgw.zone, "zone not found in rgw, nothing to delete");
            return Ok(());
        }
        Err(err) => return Err(err).context(zone_context("get")),
    };
    remove_zone_from_zone_group(rgw)
        .await
        .context(zone_context("remove from zonegroup"))?;
    delete_zone(rgw).await.context(zone_context("delete"))?;

    if spec.preserve_pools_on_delete {
        tracing::info!(zone = %rgw.zone, "preservePoolsOnDelete is set, pools not deleted");
        return Ok(());
    }
    if !spec.shared_pools.needs_dedicated_pools() {
        return Ok(());
    }
    delete_pools(rgw, false, &prefix)
        .await
        .context(zone_context("delete pools of"))
}

async fn delete(zone: &ObjectZone, ctx: &Ctx, namespace: &str) -> Result<Action> {
    let kube = ctx.client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let stores = ctx
        .client
        .list::<ObjectStore>(namespace, &ListParams::default())
        .await
        .context(ListResourcesSnafu { kind: "ObjectStore" })?;
    let dependents = zone_dependents(zone, &stores);
    if !dependents.is_empty() {
        set_deletion_blocked(&kube, events, zone, &dependents, |status| {
            status.dependents = Some(dependents.clone())
        })
        .await
        .context(ApplyStatusSnafu)?;
        return Ok(Action::requeue(NOT_READY_REQUEUE));
    }

    let zone_group = ctx
        .client
        .get_opt::<ObjectZoneGroup>(&zone.spec.zone_group, namespace)
        .await
        .context(GetResourceSnafu {
            kind: "ObjectZoneGroup",
            name: &zone.spec.zone_group,
        })?;
    match zone_group {
        Some(zone_group) => {
            let rgw = ObjectContext::new(ctx.cli.for_namespace(namespace), zone.name_any())
                .with_multisite(
                    zone_group.spec.realm.clone(),
                    zone_group.name_any(),
                    zone.name_any(),
                );
            let _lock = lock_realm(&rgw.realm).await;
            teardown_zone(&rgw, &zone.spec).await?;
        }
        None => {
            tracing::warn!(
                zone = %zone.name_any(),
                zonegroup = %zone.spec.zone_group,
                "zonegroup is gone, leaving rgw zone in place"
            );
        }
    }

    finish_deletion(&kube, events, zone)
        .await
        .context(FinalizerSnafu)?;
    Ok(Action::await_change())
}

pub async fn create_zone_controller(client: &Client, namespace: WatchNamespace, ctx: Ctx) {
    let controller = Controller::new(
        namespace.get_api::<DeserializeGuard<ObjectZone>>(client),
        watcher::Config::default(),
    );
    let zones = controller.store();

    controller
        .watches(
            namespace.get_api::<DeserializeGuard<ObjectStore>>(client),
            watcher::Config::default(),
            |store| {
                let Ok(store) = &store.0 else {
                    return None;
                };
                let zone = store.spec.zone.as_ref()?;
                Some(
                    ObjectRef::<DeserializeGuard<ObjectZone>>::new(&zone.name)
                        .within(&store.namespace()?),
                )
            },
        )
        .watches(
            namespace.get_api::<DeserializeGuard<ObjectZoneGroup>>(client),
            watcher::Config::default(),
            move |zone_group| {
                zones
                    .state()
                    .into_iter()
                    .filter(move |zone| {
                        let Ok(zone) = &zone.0 else {
                            return false;
                        };
                        zone.namespace() == zone_group.namespace()
                            && zone.spec.zone_group == zone_group.name_any()
                    })
                    .map(|zone| ObjectRef::from_obj(&*zone))
            },
        )
        .shutdown_on_signal()
        .run(reconcile_zone, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                client,
                &format!("{ZONE_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        reconcile::{ClassifyError, ErrorKind},
        rgw::{
            cli::testing::{FakeExecutor, cli},
            error::EXIT_NOT_FOUND,
        },
    };

    const ZONE_POOLS: &str = r#"[
        {"poolnum": 1, "poolname": "zone-a.rgw.control"},
        {"poolnum": 2, "poolname": "zone-a.rgw.meta"},
        {"poolnum": 3, "poolname": "zone-a.rgw.log"},
        {"poolnum": 4, "poolname": "zone-a.rgw.buckets.index"},
        {"poolnum": 5, "poolname": "zone-a.rgw.buckets.non-ec"},
        {"poolnum": 6, "poolname": "zone-a.rgw.otp"},
        {"poolnum": 7, "poolname": "zone-a.rgw.buckets.data"},
        {"poolnum": 8, "poolname": ".rgw.root"}
    ]"#;

    fn rgw(executor: Arc<FakeExecutor>) -> ObjectContext {
        ObjectContext::new(cli(executor), "zone-a").with_multisite("realm-a", "group-a", "zone-a")
    }

    fn spec(yaml: &str) -> ObjectZoneSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn keys() -> RealmKeys {
        RealmKeys {
            access_key: "AK".into(),
            secret_key: "SK".into(),
        }
    }

    #[tokio::test]
    async fn test_first_zone_is_master() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("zonegroup get", Ok(r#"{"master_zone": "", "zones": []}"#))
            .expect("zone get", Err(EXIT_NOT_FOUND))
            .expect("osd lspools", Ok(ZONE_POOLS))
            .expect("period get", Ok(r#"{"id": "1", "epoch": 1}"#))
            .expect("period update", Ok(r#"{"id": "1", "epoch": 2}"#));
        provision_zone(&rgw(executor.clone()), &spec("zoneGroup: group-a"), &keys())
            .await
            .unwrap();
        let commands = executor.commands();
        assert!(commands[2].starts_with(
            "radosgw-admin zone create --rgw-realm=realm-a --rgw-zonegroup=group-a --rgw-zone=zone-a --access-key=AK --secret-key=SK --master"
        ));
        assert!(commands.iter().all(|c| !c.contains("--commit")));
    }

    #[tokio::test]
    async fn test_missing_zone_pools() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("zonegroup get", Ok(r#"{"master_zone": "z0", "zones": []}"#))
            .expect("zone get", Ok(r#"{"id": "z1"}"#))
            .expect("osd lspools", Ok("[]"));
        let err = provision_zone(&rgw(executor), &spec("zoneGroup: group-a"), &keys())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPool);
    }

    #[tokio::test]
    async fn test_teardown_preserves_pools() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("zone get", Ok(r#"{"domain_root": "zone-a.rgw.meta:root"}"#));
        teardown_zone(
            &rgw(executor.clone()),
            &spec("zoneGroup: group-a\npreservePoolsOnDelete: true"),
        )
        .await
        .unwrap();
        let commands = executor.commands();
        assert!(commands[1].starts_with("radosgw-admin zonegroup remove"));
        assert!(commands[3].starts_with("radosgw-admin zone delete"));
        assert_eq!(commands.len(), 4);
    }

    #[tokio::test]
    async fn test_teardown_of_unknown_zone() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("zone get", Err(EXIT_NOT_FOUND));
        teardown_zone(&rgw(executor.clone()), &spec("zoneGroup: group-a"))
            .await
            .unwrap();
        assert_eq!(executor.commands().len(), 1);
    }
}
