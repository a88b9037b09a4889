//! Finalizers keep a resource around until its RGW side has been torn down.

use serde_json::json;
use stackable_operator::kube::{
    self, Api, Client, Resource, ResourceExt,
    api::{Patch, PatchParams},
    runtime::events::EventType,
};

use super::{
    events::{EventPublisher, actions, reasons},
    status::StatusResource,
};

/// `<kind>.ceph.rook.io`, one finalizer per resource kind.
pub fn finalizer_name<K: Resource<DynamicType = ()>>() -> String {
    format!("{}.{}", K::kind(&()).to_lowercase(), K::group(&()))
}

pub fn has_finalizer<K: StatusResource>(obj: &K) -> bool {
    let name = finalizer_name::<K>();
    obj.finalizers().iter().any(|finalizer| *finalizer == name)
}

fn finalizers_patch(
    resource_version: Option<String>,
    finalizers: Vec<String>,
) -> serde_json::Value {
    match resource_version {
        Some(resource_version) => json!({
            "metadata": { "resourceVersion": resource_version, "finalizers": finalizers }
        }),
        None => json!({ "metadata": { "finalizers": finalizers } }),
    }
}

/// Adds the finalizer of `K`. Returns `false` when it was already there.
///
/// The patch is bound to the observed resource version, so a concurrent edit
/// fails the reconcile instead of being overwritten.
pub async fn add_finalizer<K: StatusResource>(
    client: &Client,
    obj: &K,
) -> Result<bool, kube::Error> {
    if has_finalizer(obj) {
        return Ok(false);
    }
    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(finalizer_name::<K>());
    let api: Api<K> = Api::namespaced(client.clone(), &obj.namespace().unwrap_or_default());
    let patch = finalizers_patch(obj.resource_version(), finalizers);
    api.patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    tracing::debug!(name = %obj.name_any(), "added finalizer");
    Ok(true)
}

/// Removes the finalizer of `K`. A resource that is already gone is fine.
pub async fn remove_finalizer<K: StatusResource>(
    client: &Client,
    obj: &K,
) -> Result<(), kube::Error> {
    if !has_finalizer(obj) {
        return Ok(());
    }
    let name = finalizer_name::<K>();
    let finalizers = obj
        .finalizers()
        .iter()
        .filter(|finalizer| **finalizer != name)
        .cloned()
        .collect();
    let api: Api<K> = Api::namespaced(client.clone(), &obj.namespace().unwrap_or_default());
    let patch = finalizers_patch(obj.resource_version(), finalizers);
    match api
        .patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => {
            tracing::debug!(name = %obj.name_any(), "removed finalizer");
            Ok(())
        }
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(err) => Err(err),
    }
}

/// Lets go of a resource whose teardown is complete.
pub async fn finish_deletion<K: StatusResource>(
    client: &Client,
    events: &dyn EventPublisher,
    obj: &K,
) -> Result<(), kube::Error> {
    remove_finalizer(client, obj).await?;
    tracing::info!(name = %obj.name_any(), kind = %K::kind(&()), "teardown complete");
    events
        .publish(
            &obj.object_ref(&()),
            EventType::Normal,
            reasons::DELETED,
            actions::DELETE,
            None,
        )
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        object_store::{ObjectStore, fixtures::{STORE, object_store}},
        zone_group::ObjectZoneGroup,
    };

    #[test]
    fn test_finalizer_names() {
        assert_eq!(finalizer_name::<ObjectStore>(), "objectstore.ceph.rook.io");
        assert_eq!(finalizer_name::<ObjectZoneGroup>(), "objectzonegroup.ceph.rook.io");
    }

    #[test]
    fn test_has_finalizer() {
        let mut store = object_store(STORE);
        assert!(!has_finalizer(&store));
        store
            .finalizers_mut()
            .push("objectstore.ceph.rook.io".to_string());
        assert!(has_finalizer(&store));
    }

    #[test]
    fn test_finalizers_patch() {
        let patch = finalizers_patch(Some("42".into()), vec!["a".into()]);
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["metadata"]["finalizers"][0], "a");
        assert!(finalizers_patch(None, vec![])["metadata"]
            .get("resourceVersion")
            .is_none());
    }
}
