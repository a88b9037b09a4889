use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::kube::{CustomResource, ResourceExt};

use super::status::{Phase, has_reconcile_status};

/// Bookmark written before an account is created so a crash cannot orphan it.
pub const ACCOUNT_ID_ANNOTATION: &str = "ceph.rook.io/account-id";

/// An RGW account living in the store named by `spec.store`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    kind = "ObjectStoreAccount",
    group = "ceph.rook.io",
    version = "v1",
    plural = "objectstoreaccounts",
    status = "ObjectStoreAccountStatus",
    shortname = "osa",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreAccountSpec {
    pub store: String,

    /// Account name in RGW. Defaults to the resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit account ID of the form `RGW` followed by 17 digits.
    #[serde(default, rename = "accountID", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_users: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buckets: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreAccountStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,

    #[serde(default, rename = "accountID", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

has_reconcile_status!(ObjectStoreAccount, ObjectStoreAccountStatus);

impl ObjectStoreAccount {
    pub fn account_name(&self) -> String {
        self.spec
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    pub fn spec_account_id(&self) -> Option<&str> {
        self.spec.account_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn status_account_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.account_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn annotated_account_id(&self) -> Option<&str> {
        self.annotations()
            .get(ACCOUNT_ID_ANNOTATION)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.spec.store.is_empty() {
            return Err("spec.store must not be empty".to_string());
        }
        if let Some(id) = self.spec_account_id() {
            let digits = id.strip_prefix("RGW").unwrap_or_default();
            if id.len() != 20 || digits.len() != 17 || !digits.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(format!(
                    "invalid accountID {id:?}: expected RGW followed by 17 digits"
                ));
            }
        }
        Ok(())
    }
}
