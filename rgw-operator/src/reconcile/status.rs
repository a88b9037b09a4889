//! Status writes guarded by the resource version the reconcile started from.
//!
//! A write that hits a conflict re-reads the object and applies the same
//! mutation again. A write to an object deleted in the meantime is dropped.

use std::{fmt::Debug, time::Duration};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use stackable_operator::kube::{
    self, Api, Client, Resource, ResourceExt,
    api::{Patch, PatchParams},
    core::NamespaceResourceScope,
    runtime::{controller::Action, events::EventType},
};

use super::events::{EventPublisher, actions, reasons};
use crate::api::status::{Dependents, HasReconcileStatus, Phase, ReconcileStatus};

const MAX_CONFLICT_RETRIES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusWrite {
    /// `spec_changed` is set when the generation moved on while reconciling.
    Written { spec_changed: bool },
    Gone,
}

impl StatusWrite {
    pub fn next_action(self, action: Action) -> Action {
        match self {
            StatusWrite::Written { spec_changed: true } => Action::requeue(Duration::ZERO),
            _ => action,
        }
    }
}

/// Bounds shared by every resource kind whose status the controllers write.
pub trait StatusResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + HasReconcileStatus
    + Clone
    + Debug
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StatusResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + HasReconcileStatus
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

pub(crate) fn status_patch<S: ReconcileStatus>(
    resource_version: Option<String>,
    status: &S,
) -> Result<Value, kube::Error> {
    let mut patch = Map::new();
    if let Some(resource_version) = resource_version {
        patch.insert(
            "metadata".to_string(),
            serde_json::json!({ "resourceVersion": resource_version }),
        );
    }
    patch.insert(
        "status".to_string(),
        serde_json::to_value(status).map_err(kube::Error::SerdeError)?,
    );
    Ok(Value::Object(patch))
}

pub async fn update_status<K, F>(
    client: &Client,
    obj: &K,
    mutate: F,
) -> Result<StatusWrite, kube::Error>
where
    K: StatusResource,
    F: Fn(&mut K::Status) + Send,
{
    let name = obj.name_any();
    let api: Api<K> = Api::namespaced(client.clone(), &obj.namespace().unwrap_or_default());
    let observed_generation = obj.meta().generation;
    let mut current = obj.clone();
    let mut conflicts = 0;
    loop {
        let mut status = current.reconcile_status().cloned().unwrap_or_default();
        mutate(&mut status);
        let patch = status_patch(current.resource_version(), &status)?;
        match api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(updated) => {
                return Ok(StatusWrite::Written {
                    spec_changed: updated.meta().generation != observed_generation,
                });
            }
            Err(kube::Error::Api(response)) if response.code == 404 => {
                tracing::debug!(%name, "object is gone, dropping status update");
                return Ok(StatusWrite::Gone);
            }
            Err(kube::Error::Api(response))
                if response.code == 409 && conflicts < MAX_CONFLICT_RETRIES =>
            {
                conflicts += 1;
                tracing::debug!(%name, conflicts, "status update conflicted, re-reading object");
                match api.get_opt(&name).await? {
                    Some(fresh) => current = fresh,
                    None => return Ok(StatusWrite::Gone),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Whether the last reconcile already brought the current generation to `Ready`.
///
/// Controllers skip the `Reconciling` transition then, so a resync of a healthy
/// resource writes nothing.
pub fn is_up_to_date<K: StatusResource>(obj: &K) -> bool {
    obj.reconcile_status().is_some_and(|status| {
        status.phase() == Phase::Ready && status.observed_generation() == obj.meta().generation
    })
}

/// Moves the resource into `phase`, announcing the transition as an event.
pub async fn set_phase<K>(
    client: &Client,
    events: &dyn EventPublisher,
    obj: &K,
    phase: Phase,
    message: Option<String>,
) -> Result<StatusWrite, kube::Error>
where
    K: StatusResource,
{
    let previous = obj
        .reconcile_status()
        .map(ReconcileStatus::phase)
        .unwrap_or_default();
    let write = update_status(client, obj, |status| {
        status.set_phase(phase, message.clone())
    })
    .await?;
    if previous != phase && write != StatusWrite::Gone {
        let type_ = if phase == Phase::Failure {
            EventType::Warning
        } else {
            EventType::Normal
        };
        events
            .publish(
                &obj.object_ref(&()),
                type_,
                reasons::PHASE_CHANGED,
                actions::RECONCILE,
                Some(format!("phase changed from {previous:?} to {phase:?}")),
            )
            .await;
    }
    Ok(write)
}

/// Marks the resource ready for its current generation, letting `extra`
/// fill in resource-specific fields in the same write.
pub async fn set_ready<K, F>(
    client: &Client,
    events: &dyn EventPublisher,
    obj: &K,
    extra: F,
) -> Result<StatusWrite, kube::Error>
where
    K: StatusResource,
    F: Fn(&mut K::Status) + Send,
{
    let previous = obj
        .reconcile_status()
        .map(ReconcileStatus::phase)
        .unwrap_or_default();
    let generation = obj.meta().generation;
    let write = update_status(client, obj, |status| {
        status.set_phase(Phase::Ready, None);
        status.set_observed_generation(generation);
        extra(status);
    })
    .await?;
    if previous != Phase::Ready && write != StatusWrite::Gone {
        events
            .publish(
                &obj.object_ref(&()),
                EventType::Normal,
                reasons::PHASE_CHANGED,
                actions::RECONCILE,
                Some(format!("phase changed from {previous:?} to Ready")),
            )
            .await;
    }
    Ok(write)
}

/// Keeps a resource that is being deleted in `Deleting`, naming what still depends on it.
pub async fn set_deletion_blocked<K, F>(
    client: &Client,
    events: &dyn EventPublisher,
    obj: &K,
    dependents: &Dependents,
    extra: F,
) -> Result<StatusWrite, kube::Error>
where
    K: StatusResource,
    F: Fn(&mut K::Status) + Send,
{
    let message = format!("deletion is blocked by dependents: {dependents}");
    let write = update_status(client, obj, |status| {
        status.set_phase(Phase::Deleting, Some(message.clone()));
        extra(status);
    })
    .await?;
    if write != StatusWrite::Gone {
        tracing::info!(name = %obj.name_any(), %dependents, "deletion blocked");
        events
            .publish(
                &obj.object_ref(&()),
                EventType::Warning,
                reasons::DELETION_BLOCKED,
                actions::DELETE,
                Some(message),
            )
            .await;
    }
    Ok(write)
}

pub async fn record_failure<K>(
    client: &Client,
    events: &dyn EventPublisher,
    obj: &K,
    message: &str,
) -> Result<StatusWrite, kube::Error>
where
    K: StatusResource,
{
    let write = update_status(client, obj, |status| {
        status.set_phase(Phase::Failure, Some(message.to_string()))
    })
    .await?;
    if write != StatusWrite::Gone {
        events
            .publish(
                &obj.object_ref(&()),
                EventType::Warning,
                reasons::RECONCILE_FAILED,
                actions::RECONCILE,
                Some(message.to_string()),
            )
            .await;
    }
    Ok(write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::realm::ObjectRealmStatus;

    #[test]
    fn test_status_patch_carries_resource_version() {
        let status = ObjectRealmStatus {
            phase: Phase::Ready,
            observed_generation: Some(4),
            ..ObjectRealmStatus::default()
        };
        let patch = status_patch(Some("123".into()), &status).unwrap();
        assert_eq!(patch["metadata"]["resourceVersion"], "123");
        assert_eq!(patch["status"]["phase"], "Ready");
        assert_eq!(patch["status"]["observedGeneration"], 4);
        assert!(patch["status"]["message"].is_null());

        let patch = status_patch(None, &status).unwrap();
        assert!(patch.get("metadata").is_none());
    }

    #[test]
    fn test_is_up_to_date() {
        let mut realm: crate::api::realm::ObjectRealm = serde_yaml::from_str(
            "apiVersion: ceph.rook.io/v1\nkind: ObjectRealm\nmetadata:\n  name: realm-a\n  namespace: rook-ceph\n  generation: 2\nspec: {}\n",
        )
        .unwrap();
        assert!(!is_up_to_date(&realm));
        realm.status = Some(ObjectRealmStatus {
            phase: Phase::Ready,
            observed_generation: Some(1),
            ..ObjectRealmStatus::default()
        });
        assert!(!is_up_to_date(&realm));
        realm.status = Some(ObjectRealmStatus {
            phase: Phase::Ready,
            observed_generation: Some(2),
            ..ObjectRealmStatus::default()
        });
        assert!(is_up_to_date(&realm));
    }

    #[test]
    fn test_next_action() {
        let default = Action::requeue(Duration::from_secs(300));
        assert_eq!(
            StatusWrite::Written {
                spec_changed: true
            }
            .next_action(default.clone()),
            Action::requeue(Duration::ZERO)
        );
        assert_eq!(
            StatusWrite::Written {
                spec_changed: false
            }
            .next_action(default.clone()),
            default
        );
        assert_eq!(StatusWrite::Gone.next_action(default.clone()), default);
    }
}
