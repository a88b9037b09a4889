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
        ApplyStatusSnafu, FinalizerSnafu, InvalidObjectSnafu, ListResourcesSnafu,
        RealmKeysSecretSnafu, RealmSnafu, Result,
    },
    error_policy,
    topology::{namespace_of, realm_keys},
};
use crate::{
    OPERATOR_NAME,
    api::{
        realm::{ObjectRealm, realm_keys_secret_name},
        status::Phase,
        zone_group::ObjectZoneGroup,
    },
    configuration::secret::Secret,
    reconcile::{
        NOT_READY_REQUEUE, RESYNC_INTERVAL,
        finalizer::{add_finalizer, finish_deletion, has_finalizer},
        guard::run_guarded,
        status::{is_up_to_date, set_deletion_blocked, set_phase, set_ready},
    },
    rgw::{
        context::{ObjectContext, lock_realm},
        dependents::realm_dependents,
        multisite::{RealmKeys, create_realm, delete_realm_only, pull_realm, realm_exists},
    },
};

pub const REALM_CONTROLLER_NAME: &str = "objectrealm";

pub async fn reconcile_realm(
    realm: Arc<DeserializeGuard<ObjectRealm>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let realm = realm
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidObjectSnafu)?;

    let kube = ctx.client.as_kube_client();
    run_guarded(&kube, &ctx.substrate, realm, reconcile(realm, &ctx)).await
}

async fn reconcile(realm: &ObjectRealm, ctx: &Ctx) -> Result<Action> {
    let kube = ctx.client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let namespace = namespace_of(realm)?;
    let rgw = ObjectContext::new(ctx.cli.for_namespace(&namespace), realm.name_any());

    if realm.meta().deletion_timestamp.is_some() {
        if !has_finalizer(realm) {
            return Ok(Action::await_change());
        }
        return delete(realm, ctx, &rgw, &namespace).await;
    }
    if add_finalizer(&kube, realm).await.context(FinalizerSnafu)? {
        return Ok(Action::await_change());
    }
    if !is_up_to_date(realm) {
        set_phase(&kube, events, realm, Phase::Reconciling, None)
            .await
            .context(ApplyStatusSnafu)?;
    }

    match realm.pull_endpoint() {
        Some(endpoint) => {
            let keys = realm_keys(&ctx.client, &rgw.realm, &namespace).await?;
            let _lock = lock_realm(&rgw.realm).await;
            provision_realm(&rgw, Some((endpoint, &keys))).await?;
        }
        None => {
            ensure_realm_keys(&ctx.client, realm, &namespace).await?;
            let _lock = lock_realm(&rgw.realm).await;
            provision_realm(&rgw, None).await?;
        }
    }

    let write = set_ready(&kube, events, realm, |_| {})
        .await
        .context(ApplyStatusSnafu)?;
    Ok(write.next_action(Action::requeue(RESYNC_INTERVAL)))
}

/// Pulls the realm from `pull` when given, otherwise creates it locally.
async fn provision_realm(rgw: &ObjectContext, pull: Option<(&str, &RealmKeys)>) -> Result<()> {
    match pull {
        Some((endpoint, keys)) => {
            let exists = realm_exists(rgw).await.context(RealmSnafu {
                operation: "get",
                realm: &rgw.realm,
            })?;
            if !exists {
                pull_realm(rgw, endpoint, keys).await.context(RealmSnafu {
                    operation: "pull",
                    realm: &rgw.realm,
                })?;
            }
        }
        None => {
            create_realm(rgw).await.context(RealmSnafu {
                operation: "create",
                realm: &rgw.realm,
            })?;
        }
    }
    Ok(())
}

/// Generates the system user keys of a locally created realm once.
async fn ensure_realm_keys(client: &Client, realm: &ObjectRealm, namespace: &str) -> Result<()> {
    let name = realm_keys_secret_name(&realm.name_any());
    let existing = Secret::<RealmKeys>::fetch_opt(client, &name, namespace)
        .await
        .context(RealmKeysSecretSnafu { secret: &name })?;
    if existing.is_some() {
        return Ok(());
    }
    tracing::info!(realm = %realm.name_any(), secret = %name, "generating realm keys");
    Secret::new(name.clone(), namespace.to_string(), RealmKeys::generate())
        .apply(client, OPERATOR_NAME, realm)
        .await
        .context(RealmKeysSecretSnafu { secret: name })
}

async fn delete(
    realm: &ObjectRealm,
    ctx: &Ctx,
    rgw: &ObjectContext,
    namespace: &str,
) -> Result<Action> {
    let kube = ctx.client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let zone_groups = ctx
        .client
        .list::<ObjectZoneGroup>(namespace, &ListParams::default())
        .await
        .context(ListResourcesSnafu {
            kind: "ObjectZoneGroup",
        })?;
    let dependents = realm_dependents(&rgw.realm, realm.namespace(), &zone_groups);
    if !dependents.is_empty() {
        set_deletion_blocked(&kube, events, realm, &dependents, |_| {})
            .await
            .context(ApplyStatusSnafu)?;
        return Ok(Action::requeue(NOT_READY_REQUEUE));
    }

    {
        let _lock = lock_realm(&rgw.realm).await;
        delete_realm_only(rgw).await.context(RealmSnafu {
            operation: "delete",
            realm: &rgw.realm,
        })?;
    }
    finish_deletion(&kube, events, realm)
        .await
        .context(FinalizerSnafu)?;
    Ok(Action::await_change())
}

pub async fn create_realm_controller(client: &Client, namespace: WatchNamespace, ctx: Ctx) {
    let controller = Controller::new(
        namespace.get_api::<DeserializeGuard<ObjectRealm>>(client),
        watcher::Config::default(),
    );

    controller
        .watches(
            namespace.get_api::<DeserializeGuard<ObjectZoneGroup>>(client),
            watcher::Config::default(),
            |zone_group| {
                let Ok(group) = &zone_group.0 else {
                    return None;
                };
                Some(
                    ObjectRef::<DeserializeGuard<ObjectRealm>>::new(&group.spec.realm)
                        .within(&group.namespace()?),
                )
            },
        )
        .shutdown_on_signal()
        .run(reconcile_realm, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                client,
                &format!("{REALM_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}
