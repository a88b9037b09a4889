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
        ApplyStatusSnafu, FinalizerSnafu, InvalidObjectSnafu, InvalidSpecSnafu, ListResourcesSnafu,
        Result, ZoneGroupSnafu,
    },
    error_policy,
    topology::{get_referenced, namespace_of},
};
use crate::{
    OPERATOR_NAME,
    api::{
        realm::ObjectRealm, status::Phase, zone::ObjectZone, zone_group::ObjectZoneGroup,
    },
    reconcile::{
        NOT_READY_REQUEUE, RESYNC_INTERVAL,
        finalizer::{add_finalizer, finish_deletion, has_finalizer},
        guard::run_guarded,
        status::{is_up_to_date, set_deletion_blocked, set_phase, set_ready},
    },
    rgw::{
        context::{ObjectContext, lock_realm},
        dependents::zone_group_dependents,
        multisite::{commit_zone_group, create_zone_group, delete_zone_group},
    },
};

pub const ZONE_GROUP_CONTROLLER_NAME: &str = "objectzonegroup";

pub async fn reconcile_zone_group(
    zone_group: Arc<DeserializeGuard<ObjectZoneGroup>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let zone_group = zone_group
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidObjectSnafu)?;

    let kube = ctx.client.as_kube_client();
    run_guarded(&kube, &ctx.substrate, zone_group, reconcile(zone_group, &ctx)).await
}

fn zone_group_context(ctx: &Ctx, zone_group: &ObjectZoneGroup, namespace: &str) -> ObjectContext {
    let name = zone_group.name_any();
    ObjectContext::new(ctx.cli.for_namespace(namespace), name.clone()).with_multisite(
        zone_group.spec.realm.clone(),
        name,
        String::new(),
    )
}

async fn reconcile(zone_group: &ObjectZoneGroup, ctx: &Ctx) -> Result<Action> {
    let kube = ctx.client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let namespace = namespace_of(zone_group)?;
    let rgw = zone_group_context(ctx, zone_group, &namespace);

    if zone_group.meta().deletion_timestamp.is_some() {
        if !has_finalizer(zone_group) {
            return Ok(Action::await_change());
        }
        return delete(zone_group, ctx, &rgw, &namespace).await;
    }
    if zone_group.spec.realm.is_empty() {
        return InvalidSpecSnafu {
            message: "spec.realm must not be empty",
        }
        .fail();
    }
    if add_finalizer(&kube, zone_group).await.context(FinalizerSnafu)? {
        return Ok(Action::await_change());
    }
    if !is_up_to_date(zone_group) {
        set_phase(&kube, events, zone_group, Phase::Reconciling, None)
            .await
            .context(ApplyStatusSnafu)?;
    }

    get_referenced::<ObjectRealm>(&ctx.client, &zone_group.spec.realm, &namespace).await?;
    {
        let _lock = lock_realm(&rgw.realm).await;
        provision_zone_group(&rgw).await?;
    }

    let write = set_ready(&kube, events, zone_group, |_| {})
        .await
        .context(ApplyStatusSnafu)?;
    Ok(write.next_action(Action::requeue(RESYNC_INTERVAL)))
}

/// Creates the zonegroup when missing and commits the realm period for it.
async fn provision_zone_group(rgw: &ObjectContext) -> Result<()> {
    let created = create_zone_group(rgw).await.context(ZoneGroupSnafu {
        operation: "create",
        zone_group: &rgw.zone_group,
    })?;
    if created {
        commit_zone_group(rgw).await.context(ZoneGroupSnafu {
            operation: "commit period for",
            zone_group: &rgw.zone_group,
        })?;
    }
    Ok(())
}

async fn delete(
    zone_group: &ObjectZoneGroup,
    ctx: &Ctx,
    rgw: &ObjectContext,
    namespace: &str,
) -> Result<Action> {
    let kube = ctx.client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let zones = ctx
        .client
        .list::<ObjectZone>(namespace, &ListParams::default())
        .await
        .context(ListResourcesSnafu { kind: "ObjectZone" })?;
    let dependents = zone_group_dependents(zone_group, &zones);
    if !dependents.is_empty() {
        set_deletion_blocked(&kube, events, zone_group, &dependents, |_| {})
            .await
            .context(ApplyStatusSnafu)?;
        return Ok(Action::requeue(NOT_READY_REQUEUE));
    }

    {
        let _lock = lock_realm(&rgw.realm).await;
        delete_zone_group(rgw).await.context(ZoneGroupSnafu {
            operation: "delete",
            zone_group: &rgw.zone_group,
        })?;
    }
    finish_deletion(&kube, events, zone_group)
        .await
        .context(FinalizerSnafu)?;
    Ok(Action::await_change())
}

pub async fn create_zone_group_controller(client: &Client, namespace: WatchNamespace, ctx: Ctx) {
    let controller = Controller::new(
        namespace.get_api::<DeserializeGuard<ObjectZoneGroup>>(client),
        watcher::Config::default(),
    );
    let groups = controller.store();

    controller
        .watches(
            namespace.get_api::<DeserializeGuard<ObjectZone>>(client),
            watcher::Config::default(),
            |zone| {
                let Ok(zone) = &zone.0 else {
                    return None;
                };
                Some(
                    ObjectRef::<DeserializeGuard<ObjectZoneGroup>>::new(&zone.spec.zone_group)
                        .within(&zone.namespace()?),
                )
            },
        )
        .watches(
            namespace.get_api::<DeserializeGuard<ObjectRealm>>(client),
            watcher::Config::default(),
            move |realm| {
                groups
                    .state()
                    .into_iter()
                    .filter(move |group| {
                        let Ok(group) = &group.0 else {
                            return false;
                        };
                        group.namespace() == realm.namespace()
                            && group.spec.realm == realm.name_any()
                    })
                    .map(|group| ObjectRef::from_obj(&*group))
            },
        )
        .shutdown_on_signal()
        .run(reconcile_zone_group, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                client,
                &format!("{ZONE_GROUP_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}
