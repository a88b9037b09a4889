use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::kube::CustomResource;

use super::status::{Phase, has_reconcile_status};

/// A multisite zonegroup inside the realm named by `spec.realm`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[kube(
    kind = "ObjectZoneGroup",
    group = "ceph.rook.io",
    version = "v1",
    plural = "objectzonegroups",
    status = "ObjectZoneGroupStatus",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectZoneGroupSpec {
    pub realm: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectZoneGroupStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,
}

has_reconcile_status!(ObjectZoneGroup, ObjectZoneGroupStatus);
