use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::kube::{CustomResource, ResourceExt};

use super::status::{Phase, has_reconcile_status};

/// A multisite realm. Its system user keys live in the `<name>-keys` secret.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[kube(
    kind = "ObjectRealm",
    group = "ceph.rook.io",
    version = "v1",
    plural = "objectrealms",
    status = "ObjectRealmStatus",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRealmSpec {
    /// Pulls the realm from an existing cluster instead of creating it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PullSpec {
    pub endpoint: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRealmStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,
}

has_reconcile_status!(ObjectRealm, ObjectRealmStatus);

impl ObjectRealm {
    pub fn keys_secret_name(&self) -> String {
        realm_keys_secret_name(&self.name_any())
    }

    pub fn pull_endpoint(&self) -> Option<&str> {
        self.spec
            .pull
            .as_ref()
            .map(|pull| pull.endpoint.as_str())
            .filter(|endpoint| !endpoint.is_empty())
    }
}

pub fn realm_keys_secret_name(realm: &str) -> String {
    format!("{realm}-keys")
}
