use std::{fmt::Debug, sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::StreamExt;
use rgw_admin_api::RgwAdminApi;
use serde::de::DeserializeOwned;
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    client::{Client, GetApi},
    k8s_openapi::api::{
        apps::v1::{DaemonSet, Deployment},
        core::v1::{Secret as K8sSecret, Service},
    },
    kube::{
        Resource, ResourceExt,
        api::ListParams,
        core::{DeserializeGuard, error_boundary},
        runtime::{
            Controller, controller::Action, events::EventType, reflector::ObjectRef, watcher,
        },
    },
    logging::controller::report_controller_reconciled,
    namespace::WatchNamespace,
};

use super::{
    admin::StoreAccess,
    builders::{
        GatewayKeyring, Workload, build_pod_template, build_recommended_labels, build_service,
        build_workload, gateway_selector,
    },
    error::{
        ApplyKeyringSnafu, ApplyResourceSnafu, ApplyStatusSnafu, ClusterHealthSnafu,
        ConnectAdminOpsSnafu, DeleteResourceSnafu, Error, FinalizerSnafu, GetResourceSnafu,
        InvalidObjectStoreSnafu, ListBucketsSnafu, ListResourcesSnafu, ObjectHasNoNamespaceSnafu,
        Result, RgwSnafu, TopologySnafu,
    },
};
use crate::{
    DOCKER_IMAGE_BASE_NAME, OPERATOR_NAME,
    api::{
        account::ObjectStoreAccount,
        object_store::{ObjectStore, ObjectStoreSpec},
        pool::PoolSpec,
        status::{Dependents, Phase},
        user::ObjectStoreUser,
        zone::ObjectZone,
    },
    configuration::secret::Secret,
    multisite::topology::{get_referenced, realm_keys, store_context},
    reconcile::{
        ClassifyError, NOT_READY_REQUEUE, RESYNC_INTERVAL, Substrate,
        events::{actions, reasons},
        finalizer::{add_finalizer, finish_deletion, has_finalizer},
        guard::{resource_key, run_guarded},
        status::{is_up_to_date, set_deletion_blocked, set_phase, set_ready},
    },
    rgw::{
        admin_ops::connect,
        cli::AdminCli,
        context::{ObjectContext, lock_realm},
        dependents::{list_store_buckets, store_dependents, store_pools_present},
        error::Error as RgwError,
        health::{BucketProbe, BucketStatusSink, ProbeRegistry, ProbeSettings, S3Connector},
        keyring::{
            delete_key, get_or_create_key, keyring, keyring_secret_name,
            legacy_keyring_secret_name,
        },
        multisite::{
            configure_multisite_store, create_non_multisite_store,
            delete_single_site_realm_and_pools, endpoints_arg, list_realms,
            remove_from_multisite, zone_present_in_zone_group,
        },
        pools::create_object_store_pools,
    },
};

pub const STORE_CONTROLLER_NAME: &str = "objectstore";
pub const CEPH_HEALTH_OK: &str = "HEALTH_OK";

pub struct Ctx {
    pub access: StoreAccess,
    pub connector: Arc<dyn S3Connector>,
    pub sink: Arc<dyn BucketStatusSink>,
    pub probes: ProbeRegistry,
    /// Probe interval of stores that do not set one.
    pub probe_interval: Duration,
    /// Spec each store was last provisioned with, to notice gateway changes.
    pub applied: DashMap<String, ObjectStoreSpec>,
    pub substrate: Substrate,
}

fn replicated_size(pool: &PoolSpec) -> Option<u32> {
    pool.replicated.as_ref().map(|replicated| replicated.size)
}

/// Whether the gateway needs to be rolled out again after a spec change.
pub fn store_changed(old: &ObjectStoreSpec, new: &ObjectStoreSpec) -> bool {
    let (before, after) = (&old.gateway, &new.gateway);
    before.port != after.port
        || before.secure_port != after.secure_port
        || before.instances != after.instances
        || before.all_nodes != after.all_nodes
        || before.ssl_certificate_ref != after.ssl_certificate_ref
        || before.resources != after.resources
        || replicated_size(&old.metadata_pool) != replicated_size(&new.metadata_pool)
        || replicated_size(&old.data_pool) != replicated_size(&new.data_pool)
}

pub async fn ensure_cluster_healthy(cli: &AdminCli, store: &str) -> Result<()> {
    let health = cli.cluster_health().await.context(ClusterHealthSnafu)?;
    if health == CEPH_HEALTH_OK {
        return Ok(());
    }
    Err(RgwError::ClusterNotReady { health }).context(RgwSnafu {
        operation: "wait for a healthy ceph cluster",
        store,
    })
}

/// Users, accounts and buckets that keep `store` from being deleted.
pub async fn collect_dependents(
    admin: &dyn RgwAdminApi,
    store: &ObjectStore,
    users: &[ObjectStoreUser],
    accounts: &[ObjectStoreAccount],
) -> Result<Dependents> {
    let buckets = list_store_buckets(admin)
        .await
        .context(ListBucketsSnafu {
            store: store.name_any(),
        })?;
    Ok(store_dependents(store, users, accounts, &buckets))
}

fn probe_settings(store: &ObjectStore, rgw: &ObjectContext, default: Duration) -> ProbeSettings {
    ProbeSettings {
        endpoint: rgw.endpoint.clone(),
        interval: store.health_check_interval(default),
    }
}

fn bucket_probe(
    store: &ObjectStore,
    settings: ProbeSettings,
    admin: Arc<dyn RgwAdminApi>,
    ctx: &Ctx,
) -> BucketProbe {
    BucketProbe {
        store: ObjectRef::from_obj(store),
        store_uid: store.uid().unwrap_or_default(),
        bucket: store.health_check_bucket(),
        settings,
        admin,
        connector: ctx.connector.clone(),
        sink: ctx.sink.clone(),
    }
}

async fn delete_if_exists<K>(client: &Client, name: &str, namespace: &str) -> Result<()>
where
    K: Clone + Debug + DeserializeOwned + Resource<DynamicType = ()> + GetApi<Namespace = str>,
{
    let kind = K::kind(&()).to_string();
    let Some(obj) = client
        .get_opt::<K>(name, namespace)
        .await
        .context(GetResourceSnafu { kind: &kind, name })?
    else {
        return Ok(());
    };
    client
        .delete(&obj)
        .await
        .context(DeleteResourceSnafu { kind: &kind, name })?;
    tracing::debug!(%kind, %name, "deleted");
    Ok(())
}

pub async fn reconcile_store(
    store: Arc<DeserializeGuard<ObjectStore>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let store = store
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidObjectStoreSnafu)?;

    let kube = ctx.access.client.as_kube_client();
    run_guarded(&kube, &ctx.substrate, store, reconcile(store, &ctx)).await
}

async fn reconcile(store: &ObjectStore, ctx: &Ctx) -> Result<Action> {
    let client = &ctx.access.client;
    let kube = client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let namespace = store.namespace().context(ObjectHasNoNamespaceSnafu)?;
    let name = store.name_any();

    if store.meta().deletion_timestamp.is_some() {
        if !has_finalizer(store) {
            return Ok(Action::await_change());
        }
        return delete(store, ctx, &namespace).await;
    }
    store
        .validate()
        .map_err(|message| Error::InvalidSpec { message })?;
    if add_finalizer(&kube, store).await.context(FinalizerSnafu)? {
        return Ok(Action::await_change());
    }
    if !is_up_to_date(store) {
        set_phase(&kube, events, store, Phase::Reconciling, None)
            .await
            .context(ApplyStatusSnafu)?;
    }

    let cli = ctx.access.cli.for_namespace(&namespace);
    ensure_cluster_healthy(&cli, &name).await?;
    let rgw = store_context(client, cli.clone(), store)
        .await
        .context(TopologySnafu { store: &name })?;

    apply_keyring(client, &cli, store, &namespace).await?;

    let resolved_product_image = store
        .spec
        .gateway
        .image
        .resolve(DOCKER_IMAGE_BASE_NAME, crate::built_info::PKG_VERSION);
    let app_version = resolved_product_image.app_version_label.as_str();
    let labels = move || build_recommended_labels(store, STORE_CONTROLLER_NAME, app_version);
    let selector = gateway_selector(store)?;
    let gateway_name = store.gateway_name();

    let service = build_service(store, labels(), selector.clone())?;
    client
        .apply_patch(STORE_CONTROLLER_NAME, &service, &service)
        .await
        .context(ApplyResourceSnafu {
            kind: "Service",
            name: &gateway_name,
        })?;

    provision_zone(client, &rgw, store, &namespace).await?;

    let template = build_pod_template(store, &rgw, &resolved_product_image, labels(), &selector)?;
    let workload = build_workload(store, labels(), selector, template)?;
    if note_gateway_change(ctx, store) {
        events
            .publish(
                &store.object_ref(&()),
                EventType::Normal,
                reasons::GATEWAY_UPDATED,
                actions::RECONCILE,
                Some(format!("rolling out gateway {gateway_name}")),
            )
            .await;
    }
    apply_workload(client, workload, &gateway_name, &namespace).await?;

    let info = store.info();
    let write = set_ready(&kube, events, store, |status| {
        status.info = info.clone();
        status.dependents = None;
    })
    .await
    .context(ApplyStatusSnafu)?;

    ensure_probe(store, &rgw, ctx).await?;
    Ok(write.next_action(Action::requeue(RESYNC_INTERVAL)))
}

/// Writes the gateway keyring secret and drops the one of earlier deployments.
async fn apply_keyring(
    client: &Client,
    cli: &AdminCli,
    store: &ObjectStore,
    namespace: &str,
) -> Result<()> {
    let name = store.name_any();
    let key = get_or_create_key(cli, &name).await.context(RgwSnafu {
        operation: "create the cephx key",
        store: &name,
    })?;
    let secret = keyring_secret_name(&name);
    Secret::new(
        secret.clone(),
        namespace.to_string(),
        GatewayKeyring {
            keyring: keyring(&name, &key),
        },
    )
    .apply(client, OPERATOR_NAME, store)
    .await
    .context(ApplyKeyringSnafu { secret })?;
    delete_if_exists::<K8sSecret>(client, &legacy_keyring_secret_name(&name), namespace).await
}

/// Pools, realm, zonegroup and zone of a single-site store, or the store's
/// endpoint in the zone it joins.
async fn provision_zone(
    client: &Client,
    rgw: &ObjectContext,
    store: &ObjectStore,
    namespace: &str,
) -> Result<()> {
    let name = store.name_any();
    let rgw_context = |operation: &'static str| RgwSnafu {
        operation,
        store: name.clone(),
    };
    let _lock = lock_realm(&rgw.realm).await;

    if store.is_multisite() {
        if !zone_present_in_zone_group(rgw)
            .await
            .context(rgw_context("look up the zone"))?
        {
            return Err(RgwError::ZoneNotInZoneGroup {
                zone: rgw.zone.clone(),
                zone_group: rgw.zone_group.clone(),
            })
            .context(rgw_context("join the zone"));
        }
        let zone: ObjectZone = get_referenced(client, &rgw.zone, namespace)
            .await
            .context(TopologySnafu { store: &name })?;
        let keys = realm_keys(client, &rgw.realm, namespace)
            .await
            .context(TopologySnafu { store: &name })?;
        return configure_multisite_store(
            rgw,
            store.spec.gateway.disable_multisite_sync_traffic,
            &zone.spec.custom_endpoints,
            &keys,
        )
        .await
        .context(rgw_context("register the endpoint in its zone"));
    }

    let spec = &store.spec;
    if spec.shared_pools.needs_dedicated_pools() {
        create_object_store_pools(rgw, &spec.metadata_pool, &spec.data_pool)
            .await
            .context(rgw_context("create pools"))?;
    }
    let default_realm = list_realms(rgw)
        .await
        .context(rgw_context("list realms"))?
        .is_empty();
    create_non_multisite_store(
        rgw,
        Some(endpoints_arg(std::slice::from_ref(&rgw.endpoint))),
        &spec.shared_pools,
        default_realm,
    )
    .await
    .context(rgw_context("create realm, zonegroup and zone"))
}

/// Records the store settings about to be rolled out. True when it differs from the last one.
fn note_gateway_change(ctx: &Ctx, store: &ObjectStore) -> bool {
    let key = resource_key(store);
    let changed = ctx
        .applied
        .get(&key)
        .is_some_and(|applied| store_changed(&applied, &store.spec));
    ctx.applied.insert(key, store.spec.clone());
    changed
}

/// Applies the workload and removes the one of the other kind, so that toggling
/// `allNodes` never leaves two sets of gateways behind.
async fn apply_workload(
    client: &Client,
    workload: Workload,
    name: &str,
    namespace: &str,
) -> Result<()> {
    match workload {
        Workload::Deployment(deployment) => {
            client
                .apply_patch(STORE_CONTROLLER_NAME, &deployment, &deployment)
                .await
                .context(ApplyResourceSnafu {
                    kind: "Deployment",
                    name,
                })?;
            delete_if_exists::<DaemonSet>(client, name, namespace).await
        }
        Workload::DaemonSet(daemon_set) => {
            client
                .apply_patch(STORE_CONTROLLER_NAME, &daemon_set, &daemon_set)
                .await
                .context(ApplyResourceSnafu {
                    kind: "DaemonSet",
                    name,
                })?;
            delete_if_exists::<Deployment>(client, name, namespace).await
        }
    }
}

async fn ensure_probe(store: &ObjectStore, rgw: &ObjectContext, ctx: &Ctx) -> Result<()> {
    let store_ref = ObjectRef::from_obj(store);
    if store.spec.health_check.bucket.disabled {
        if ctx.probes.stop(&store_ref) {
            tracing::info!(store = %store_ref.name, "bucket health probe disabled");
        }
        return Ok(());
    }
    let settings = probe_settings(store, rgw, ctx.probe_interval);
    if ctx.probes.is_current(&store_ref, &settings) {
        return Ok(());
    }
    let admin = connect(rgw, ctx.access.admin_factory.as_ref())
        .await
        .context(ConnectAdminOpsSnafu {
            store: &store_ref.name,
        })?;
    ctx.probes.ensure(bucket_probe(store, settings, admin, ctx));
    Ok(())
}

async fn delete(store: &ObjectStore, ctx: &Ctx, namespace: &str) -> Result<Action> {
    let client = &ctx.access.client;
    let kube = client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let name = store.name_any();
    let rgw_context = |operation: &'static str| RgwSnafu {
        operation,
        store: name.clone(),
    };

    let cli = ctx.access.cli.for_namespace(namespace);
    let rgw = store_context(client, cli.clone(), store)
        .await
        .context(TopologySnafu { store: &name })?;

    let pools_present = store_pools_present(&rgw, store)
        .await
        .context(rgw_context("look up pools"))?;
    let admin = if pools_present {
        let admin = connect(&rgw, ctx.access.admin_factory.as_ref())
            .await
            .context(ConnectAdminOpsSnafu { store: &name })?;
        let users = client
            .list::<ObjectStoreUser>(namespace, &ListParams::default())
            .await
            .context(ListResourcesSnafu {
                kind: "ObjectStoreUser",
            })?;
        let accounts = client
            .list::<ObjectStoreAccount>(namespace, &ListParams::default())
            .await
            .context(ListResourcesSnafu {
                kind: "ObjectStoreAccount",
            })?;
        let dependents = collect_dependents(admin.as_ref(), store, &users, &accounts).await?;
        if !dependents.is_empty() {
            set_deletion_blocked(&kube, events, store, &dependents, |status| {
                status.dependents = Some(dependents.clone())
            })
            .await
            .context(ApplyStatusSnafu)?;
            return Ok(Action::requeue(NOT_READY_REQUEUE));
        }
        Some(admin)
    } else {
        None
    };

    let store_ref = ObjectRef::from_obj(store);
    if !ctx.probes.teardown(&store_ref).await {
        if let Some(admin) = admin {
            let settings = probe_settings(store, &rgw, ctx.probe_interval);
            bucket_probe(store, settings, admin, ctx).teardown().await;
        }
    }

    let gateway_name = store.gateway_name();
    delete_if_exists::<Deployment>(client, &gateway_name, namespace).await?;
    delete_if_exists::<DaemonSet>(client, &gateway_name, namespace).await?;
    delete_if_exists::<Service>(client, &gateway_name, namespace).await?;
    delete_if_exists::<K8sSecret>(client, &keyring_secret_name(&name), namespace).await?;
    delete_if_exists::<K8sSecret>(client, &legacy_keyring_secret_name(&name), namespace).await?;
    delete_key(&cli, &name)
        .await
        .context(rgw_context("delete the cephx key"))?;

    {
        let _lock = lock_realm(&rgw.realm).await;
        if store.is_multisite() {
            remove_from_multisite(&rgw)
                .await
                .context(rgw_context("remove the endpoint from its zone"))?;
        } else {
            let spec = &store.spec;
            let pools_declared = spec.shared_pools.needs_dedicated_pools()
                && !(spec.metadata_pool.is_empty() && spec.data_pool.is_empty());
            delete_single_site_realm_and_pools(&rgw, spec.preserve_pools_on_delete, pools_declared)
                .await
                .context(rgw_context("delete realm and pools"))?;
        }
    }

    ctx.applied.remove(&resource_key(store));
    finish_deletion(&kube, events, store)
        .await
        .context(FinalizerSnafu)?;
    Ok(Action::await_change())
}

pub fn error_policy(
    store: Arc<DeserializeGuard<ObjectStore>>,
    error: &Error,
    ctx: Arc<Ctx>,
) -> Action {
    ctx.substrate
        .error_action(&resource_key(&*store), error.kind())
}

pub async fn create_store_controller(client: &Client, namespace: WatchNamespace, ctx: Ctx) {
    let controller = Controller::new(
        namespace.get_api::<DeserializeGuard<ObjectStore>>(client),
        watcher::Config::default(),
    );
    let stores = controller.store();

    controller
        .owns(
            namespace.get_api::<Deployment>(client),
            watcher::Config::default(),
        )
        .owns(
            namespace.get_api::<DaemonSet>(client),
            watcher::Config::default(),
        )
        .owns(
            namespace.get_api::<Service>(client),
            watcher::Config::default(),
        )
        .watches(
            namespace.get_api::<DeserializeGuard<ObjectZone>>(client),
            watcher::Config::default(),
            move |zone| {
                stores
                    .state()
                    .into_iter()
                    .filter(move |store| {
                        let Ok(store) = &store.0 else {
                            return false;
                        };
                        store.namespace() == zone.namespace()
                            && store
                                .spec
                                .zone
                                .as_ref()
                                .is_some_and(|zone_ref| zone_ref.name == zone.name_any())
                    })
                    .map(|store| ObjectRef::from_obj(&*store))
            },
        )
        .shutdown_on_signal()
        .run(reconcile_store, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                client,
                &format!("{STORE_CONTROLLER_NAME}.{OPERATOR_NAME}"),
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
        api::object_store::fixtures::{STORE, object_store},
        reconcile::ErrorKind,
        rgw::{
            admin_ops::testing::FakeAdminApi,
            cli::testing::{FakeExecutor, cli},
            dependents::{BUCKETS, USERS},
        },
    };

    fn user(name: &str, store: &str) -> ObjectStoreUser {
        serde_yaml::from_str(&format!(
            "apiVersion: ceph.rook.io/v1\nkind: ObjectStoreUser\nmetadata:\n  name: {name}\n  namespace: rook-ceph\nspec:\n  store: {store}\n"
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_deletion_blocked_by_users_and_buckets() {
        let store = object_store(STORE);
        let admin = FakeAdminApi::default().with_buckets(&[
            "b1",
            "b2",
            "rook-ceph-bucket-checker-9a2b0c6e-1f7a-4c3b-8a49-5e7d1c2b3a40",
        ]);
        let users = [user("u1", "my-store"), user("u2", "other-store")];

        let dependents = collect_dependents(&admin, &store, &users, &[]).await.unwrap();
        assert!(!dependents.is_empty());
        assert_eq!(dependents.0[USERS], vec!["u1"]);
        assert_eq!(dependents.0[BUCKETS], vec!["b1", "b2"]);
        assert_eq!(
            dependents.to_string(),
            "{CephObjectStoreUsers: [u1], buckets: [b1, b2]}"
        );
    }

    #[tokio::test]
    async fn test_only_health_bucket_left() {
        let store = object_store(STORE);
        let admin = FakeAdminApi::default()
            .with_buckets(&["rook-ceph-bucket-checker-9a2b0c6e-1f7a-4c3b-8a49-5e7d1c2b3a40"]);
        let dependents = collect_dependents(&admin, &store, &[], &[]).await.unwrap();
        assert!(dependents.is_empty());
    }

    #[tokio::test]
    async fn test_cluster_health() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("status", Ok(r#"{"health":{"status":"HEALTH_OK"}}"#))
            .expect("status", Ok(r#"{"health":{"status":"HEALTH_WARN"}}"#));
        let admin_cli = cli(executor.clone());

        ensure_cluster_healthy(&admin_cli, "my-store").await.unwrap();
        let err = ensure_cluster_healthy(&admin_cli, "my-store")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert!(executor.commands()[0].starts_with("ceph status"));
    }

    #[test]
    fn test_store_changed() {
        let store = object_store(STORE);
        let spec = store.spec.clone();
        assert!(!store_changed(&spec, &spec));

        let mut scaled = spec.clone();
        scaled.gateway.instances = 3;
        assert!(store_changed(&spec, &scaled));

        let mut daemon_set = spec.clone();
        daemon_set.gateway.all_nodes = true;
        assert!(store_changed(&spec, &daemon_set));

        let mut resized = spec.clone();
        if let Some(replicated) = resized.metadata_pool.replicated.as_mut() {
            replicated.size = 2;
        }
        assert!(store_changed(&spec, &resized));

        let mut relabelled = spec.clone();
        relabelled.preserve_pools_on_delete = true;
        assert!(!store_changed(&spec, &relabelled));
    }

    #[test]
    fn test_probe_settings() {
        let mut store = object_store(STORE);
        let rgw = ObjectContext::new(cli(Default::default()), "my-store")
            .with_endpoint(store.dns_endpoint());
        let settings = probe_settings(&store, &rgw, Duration::from_secs(90));
        assert_eq!(
            settings.endpoint,
            "http://rook-ceph-rgw-my-store.rook-ceph.svc:80"
        );
        assert_eq!(settings.interval, Duration::from_secs(90));

        store.spec.health_check.bucket.interval = Some(Duration::from_secs(30).into());
        assert_eq!(
            probe_settings(&store, &rgw, Duration::from_secs(90)).interval,
            Duration::from_secs(30)
        );
    }
}
