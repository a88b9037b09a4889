use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::kube::CustomResource;

use super::{
    pool::{PoolSpec, SharedPoolsSpec, validate_pools_config},
    status::{Dependents, Phase, has_reconcile_status},
};

/// A multisite zone inside the zonegroup named by `spec.zoneGroup`.
///
/// The zone owns the pools; stores joining it only run gateways.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[kube(
    kind = "ObjectZone",
    group = "ceph.rook.io",
    version = "v1",
    plural = "objectzones",
    status = "ObjectZoneStatus",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectZoneSpec {
    pub zone_group: String,

    #[serde(default)]
    pub metadata_pool: PoolSpec,

    #[serde(default)]
    pub data_pool: PoolSpec,

    #[serde(default)]
    pub shared_pools: SharedPoolsSpec,

    /// Endpoints advertised for the zone instead of the gateway services.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_endpoints: Vec<String>,

    #[serde(default)]
    pub preserve_pools_on_delete: bool,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectZoneStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub dependents: Option<Dependents>,
}

has_reconcile_status!(ObjectZone, ObjectZoneStatus);

impl ObjectZoneSpec {
    pub fn validate(&self) -> Result<(), String> {
        if self.zone_group.is_empty() {
            return Err("spec.zoneGroup must not be empty".to_string());
        }
        validate_pools_config(&self.metadata_pool, &self.data_pool, &self.shared_pools)
    }
}
