use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coarse lifecycle phase shown on every resource of the object store family.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema, strum::Display,
)]
pub enum Phase {
    #[default]
    #[serde(rename = "")]
    #[strum(serialize = "")]
    Empty,
    Reconciling,
    Ready,
    Failure,
    Connected,
    Deleting,
}

/// Result of the last bucket-health probe run against a store.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BucketStatus {
    pub health: Phase,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_checked: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_changed: String,
}

/// Objects that still refer to a resource and therefore block its deletion.
///
/// Keys are the dependent kind, values the sorted names.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct Dependents(pub BTreeMap<String, Vec<String>>);

impl Dependents {
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn add(&mut self, kind: &str, mut names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        names.sort();
        names.dedup();
        self.0.insert(kind.to_string(), names);
    }
}

impl std::fmt::Display for Dependents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = self
            .0
            .iter()
            .filter(|(_, names)| !names.is_empty())
            .map(|(kind, names)| format!("{kind}: [{}]", names.join(", ")))
            .collect::<Vec<_>>();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Status fields the reconcile substrate writes on every resource kind.
pub trait ReconcileStatus: Default + Clone + Serialize + Send + Sync {
    fn phase(&self) -> Phase;

    fn set_phase(&mut self, phase: Phase, message: Option<String>);

    fn observed_generation(&self) -> Option<i64>;

    fn set_observed_generation(&mut self, generation: Option<i64>);
}

/// A custom resource whose status subresource carries a [`ReconcileStatus`].
pub trait HasReconcileStatus {
    type Status: ReconcileStatus;

    fn reconcile_status(&self) -> Option<&Self::Status>;
}

/// Implements [`ReconcileStatus`] for status structs carrying `phase`,
/// `message` and `observed_generation` fields.
macro_rules! reconcile_status {
    ($status:ty) => {
        impl $crate::api::status::ReconcileStatus for $status {
            fn phase(&self) -> $crate::api::status::Phase {
                self.phase
            }

            fn set_phase(&mut self, phase: $crate::api::status::Phase, message: Option<String>) {
                self.phase = phase;
                self.message = message;
            }

            fn observed_generation(&self) -> Option<i64> {
                self.observed_generation
            }

            fn set_observed_generation(&mut self, generation: Option<i64>) {
                self.observed_generation = generation;
            }
        }
    };
}

pub(crate) use reconcile_status;

/// Wires a custom resource to its status type.
macro_rules! has_reconcile_status {
    ($resource:ty, $status:ty) => {
        $crate::api::status::reconcile_status!($status);

        impl $crate::api::status::HasReconcileStatus for $resource {
            type Status = $status;

            fn reconcile_status(&self) -> Option<&$status> {
                self.status.as_ref()
            }
        }
    };
}

pub(crate) use has_reconcile_status;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serialization() {
        assert_eq!(serde_json::to_string(&Phase::Empty).unwrap(), r#""""#);
        assert_eq!(serde_json::to_string(&Phase::Ready).unwrap(), r#""Ready""#);
        assert_eq!(
            serde_json::from_str::<Phase>(r#""Failure""#).unwrap(),
            Phase::Failure
        );
        assert_eq!(Phase::Connected.to_string(), "Connected");
    }

    #[test]
    fn test_dependents_display() {
        let mut dependents = Dependents::default();
        assert!(dependents.is_empty());
        dependents.add("buckets", vec!["b2".into(), "b1".into()]);
        dependents.add("CephObjectStoreUsers", vec!["u1".into()]);
        dependents.add("CephObjectStoreAccounts", vec![]);
        assert!(!dependents.is_empty());
        assert_eq!(
            dependents.to_string(),
            "{CephObjectStoreUsers: [u1], buckets: [b1, b2]}"
        );
    }
}
