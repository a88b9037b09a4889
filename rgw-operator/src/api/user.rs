use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::kube::{CustomResource, ResourceExt};

use super::status::{Phase, has_reconcile_status};

/// An S3 user of an object store. Its keys are published in a secret.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    kind = "ObjectStoreUser",
    group = "ceph.rook.io",
    version = "v1",
    plural = "objectstoreusers",
    status = "ObjectStoreUserStatus",
    shortname = "osu",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreUserSpec {
    pub store: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<UserCapabilities>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buckets: Option<i64>,
}

/// Admin capabilities granted to the user, each `read`, `write`, `*` or `read, write`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl UserCapabilities {
    /// Renders the capabilities in RGW notation, e.g. `users=read;buckets=*`.
    pub fn to_caps_string(&self) -> Option<String> {
        let caps = [
            ("users", &self.user),
            ("buckets", &self.bucket),
            ("metadata", &self.metadata),
            ("usage", &self.usage),
            ("zone", &self.zone),
        ]
        .into_iter()
        .filter_map(|(kind, perm)| {
            perm.as_deref()
                .filter(|perm| !perm.is_empty())
                .map(|perm| format!("{kind}={perm}"))
        })
        .collect::<Vec<_>>();
        (!caps.is_empty()).then(|| caps.join(";"))
    }
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreUserStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

has_reconcile_status!(ObjectStoreUser, ObjectStoreUserStatus);

impl ObjectStoreUser {
    pub fn uid(&self) -> String {
        self.name_any()
    }

    pub fn display_name(&self) -> String {
        self.spec
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    pub fn secret_name(&self) -> String {
        format!("rook-ceph-object-user-{}-{}", self.spec.store, self.name_any())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.spec.store.is_empty() {
            return Err("spec.store must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_string() {
        assert_eq!(UserCapabilities::default().to_caps_string(), None);
        let caps = UserCapabilities {
            user: Some("read".into()),
            bucket: Some("*".into()),
            zone: Some(String::new()),
            ..UserCapabilities::default()
        };
        assert_eq!(caps.to_caps_string().as_deref(), Some("users=read;buckets=*"));
    }

    #[test]
    fn test_names() {
        let user: ObjectStoreUser = serde_yaml::from_str(
            r#"
apiVersion: ceph.rook.io/v1
kind: ObjectStoreUser
metadata:
  name: u1
  namespace: rook-ceph
spec:
  store: my-store
"#,
        )
        .unwrap();
        assert_eq!(user.uid(), "u1");
        assert_eq!(user.display_name(), "u1");
        assert_eq!(user.secret_name(), "rook-ceph-object-user-my-store-u1");
    }
}
