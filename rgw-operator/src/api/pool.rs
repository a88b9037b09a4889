use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Placement name RGW falls back to when nothing else is configured.
pub const DEFAULT_PLACEMENT: &str = "default-placement";
/// Storage class every placement carries implicitly.
pub const STANDARD_STORAGE_CLASS: &str = "STANDARD";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedSpec {
    pub size: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErasureCodedSpec {
    pub data_chunks: u32,
    pub coding_chunks: u32,
}

/// Declares how a dedicated pool is laid out in the Ceph cluster.
///
/// An empty spec means the pools already exist and are managed elsewhere.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_domain: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_class: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated: Option<ReplicatedSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erasure_coded: Option<ErasureCodedSpec>,
}

impl PoolSpec {
    pub fn is_empty(&self) -> bool {
        self == &PoolSpec::default()
    }

    pub fn is_erasure_coded(&self) -> bool {
        self.erasure_coded.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        match (&self.replicated, &self.erasure_coded) {
            (None, None) if self.is_empty() => Ok(()),
            (None, None) => Err("pool must be either replicated or erasure coded".to_string()),
            (Some(_), Some(_)) => {
                Err("pool cannot be both replicated and erasure coded".to_string())
            }
            (Some(replicated), None) if replicated.size < 1 => {
                Err(format!("invalid replicated size {}", replicated.size))
            }
            (None, Some(ec)) if ec.data_chunks == 0 || ec.coding_chunks == 0 => Err(format!(
                "invalid erasure coding {}+{}: data and coding chunks must be positive",
                ec.data_chunks, ec.coding_chunks
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacementStorageClassSpec {
    pub name: String,
    pub data_pool_name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolPlacementSpec {
    pub name: String,

    #[serde(default)]
    pub default: bool,

    pub metadata_pool_name: String,

    pub data_pool_name: String,

    /// Pool for multipart upload omap data. Falls back to the metadata pool.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_non_ec_pool_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_classes: Vec<PlacementStorageClassSpec>,
}

/// Pools shared between several stores, separated by rados namespaces.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharedPoolsSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata_pool_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_pool_name: String,

    #[serde(default)]
    pub preserve_rados_namespace_data_on_delete: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pool_placements: Vec<PoolPlacementSpec>,
}

impl SharedPoolsSpec {
    pub fn is_empty(&self) -> bool {
        self.metadata_pool_name.is_empty()
            && self.data_pool_name.is_empty()
            && self.pool_placements.is_empty()
    }

    pub fn default_placement(&self) -> Option<&PoolPlacementSpec> {
        self.pool_placements.iter().find(|p| p.default)
    }

    /// Dedicated pools are only needed when neither a default placement nor a
    /// complete pair of shared pools is declared.
    pub fn needs_dedicated_pools(&self) -> bool {
        if self.default_placement().is_some() {
            return false;
        }
        self.metadata_pool_name.is_empty() || self.data_pool_name.is_empty()
    }

    /// Every pool name these settings refer to, without duplicates and without blanks.
    pub fn referenced_pools(&self) -> BTreeSet<(&str, String)> {
        let mut pools = BTreeSet::new();
        pools.insert((self.metadata_pool_name.as_str(), String::new()));
        pools.insert((self.data_pool_name.as_str(), String::new()));
        for placement in &self.pool_placements {
            let origin = format!(" for placement {}", placement.name);
            pools.insert((placement.metadata_pool_name.as_str(), origin.clone()));
            pools.insert((placement.data_pool_name.as_str(), origin.clone()));
            pools.insert((placement.data_non_ec_pool_name.as_str(), origin));
            for sc in &placement.storage_classes {
                pools.insert((
                    sc.data_pool_name.as_str(),
                    format!(" for StorageClass {}", sc.name),
                ));
            }
        }
        pools.retain(|(name, _)| !name.is_empty());
        pools
    }

    pub fn validate_placements(&self) -> Result<(), String> {
        let mut has_default = false;
        let mut names = BTreeSet::new();
        for placement in &self.pool_placements {
            if has_default && placement.default {
                return Err("only one placement can be set as default".to_string());
            }
            has_default |= placement.default;

            if !names.insert(placement.name.as_str()) {
                return Err(format!(
                    "invalid placement {}: placement names must be unique",
                    placement.name
                ));
            }
            if placement.name == DEFAULT_PLACEMENT && !placement.default {
                return Err(format!(
                    "placement with name {DEFAULT_PLACEMENT} must be marked as default"
                ));
            }
            validate_storage_classes(&placement.storage_classes)
                .map_err(|err| format!("invalid placement {}: {err}", placement.name))?;
        }
        Ok(())
    }
}

fn validate_storage_classes(storage_classes: &[PlacementStorageClassSpec]) -> Result<(), String> {
    let mut names = BTreeSet::new();
    for sc in storage_classes {
        if sc.name == STANDARD_STORAGE_CLASS {
            return Err(format!(
                "invalid placement StorageClass {:?}: {STANDARD_STORAGE_CLASS:?} name is reserved",
                sc.name
            ));
        }
        if !names.insert(sc.name.as_str()) {
            return Err(format!(
                "invalid placement StorageClass {:?}: name must be unique",
                sc.name
            ));
        }
    }
    Ok(())
}

/// Checks dedicated pool specs against the shared pools spec of the same store or zone.
pub fn validate_pools_config(
    metadata_pool: &PoolSpec,
    data_pool: &PoolSpec,
    shared_pools: &SharedPoolsSpec,
) -> Result<(), String> {
    let invalid = |msg: String| format!("invalidObjStorePoolConfig: {msg}");

    metadata_pool
        .validate()
        .map_err(|err| invalid(format!("invalid metadata pool: {err}")))?;
    data_pool
        .validate()
        .map_err(|err| invalid(format!("invalid data pool: {err}")))?;
    if metadata_pool.is_erasure_coded() {
        return Err(invalid(
            "metadata pool does not support erasure coding".to_string(),
        ));
    }

    if !metadata_pool.is_empty() && !shared_pools.metadata_pool_name.is_empty() {
        return Err(invalid(
            "object store shared metadata pool and metadata pool cannot both be set".to_string(),
        ));
    }
    if !data_pool.is_empty() && !shared_pools.data_pool_name.is_empty() {
        return Err(invalid(
            "object store shared data pool and data pool cannot both be set".to_string(),
        ));
    }

    shared_pools.validate_placements().map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(name: &str, default: bool) -> PoolPlacementSpec {
        PoolPlacementSpec {
            name: name.into(),
            default,
            metadata_pool_name: "meta".into(),
            data_pool_name: "data".into(),
            ..PoolPlacementSpec::default()
        }
    }

    fn replicated(size: u32) -> PoolSpec {
        PoolSpec {
            replicated: Some(ReplicatedSpec { size }),
            ..PoolSpec::default()
        }
    }

    #[test]
    fn test_pool_spec_validation() {
        assert!(PoolSpec::default().validate().is_ok());
        assert!(replicated(3).validate().is_ok());
        assert!(replicated(0).validate().is_err());
        let ec = PoolSpec {
            erasure_coded: Some(ErasureCodedSpec {
                data_chunks: 2,
                coding_chunks: 1,
            }),
            ..PoolSpec::default()
        };
        assert!(ec.validate().is_ok());
        let broken_ec = PoolSpec {
            erasure_coded: Some(ErasureCodedSpec {
                data_chunks: 2,
                coding_chunks: 0,
            }),
            ..PoolSpec::default()
        };
        assert!(broken_ec.validate().is_err());
        let both = PoolSpec {
            replicated: Some(ReplicatedSpec { size: 3 }),
            ..ec
        };
        assert!(both.validate().is_err());
        let only_domain = PoolSpec {
            failure_domain: "host".into(),
            ..PoolSpec::default()
        };
        assert!(only_domain.validate().is_err());
    }

    #[test]
    fn test_validate_placements() {
        let spec = |placements: Vec<PoolPlacementSpec>| SharedPoolsSpec {
            pool_placements: placements,
            ..SharedPoolsSpec::default()
        };

        assert!(spec(vec![]).validate_placements().is_ok());
        assert!(
            spec(vec![placement("a", true), placement("b", false)])
                .validate_placements()
                .is_ok()
        );
        assert!(
            spec(vec![placement(DEFAULT_PLACEMENT, true)])
                .validate_placements()
                .is_ok()
        );

        let err = spec(vec![placement("a", true), placement("b", true)])
            .validate_placements()
            .unwrap_err();
        assert_eq!(err, "only one placement can be set as default");

        let err = spec(vec![placement("a", false), placement("a", false)])
            .validate_placements()
            .unwrap_err();
        assert_eq!(err, "invalid placement a: placement names must be unique");

        let err = spec(vec![placement(DEFAULT_PLACEMENT, false)])
            .validate_placements()
            .unwrap_err();
        assert_eq!(
            err,
            "placement with name default-placement must be marked as default"
        );
    }

    #[test]
    fn test_validate_storage_classes() {
        let mut with_standard = placement("a", false);
        with_standard.storage_classes = vec![PlacementStorageClassSpec {
            name: STANDARD_STORAGE_CLASS.into(),
            data_pool_name: "d".into(),
        }];
        let spec = SharedPoolsSpec {
            pool_placements: vec![with_standard],
            ..SharedPoolsSpec::default()
        };
        assert_eq!(
            spec.validate_placements().unwrap_err(),
            r#"invalid placement a: invalid placement StorageClass "STANDARD": "STANDARD" name is reserved"#
        );

        let mut duplicated = placement("a", false);
        let sc = PlacementStorageClassSpec {
            name: "REDUCED_REDUNDANCY".into(),
            data_pool_name: "d".into(),
        };
        duplicated.storage_classes = vec![sc.clone(), sc];
        let spec = SharedPoolsSpec {
            pool_placements: vec![duplicated],
            ..SharedPoolsSpec::default()
        };
        assert!(
            spec.validate_placements()
                .unwrap_err()
                .ends_with("name must be unique")
        );
    }

    #[test]
    fn test_validate_pools_config_rejects_shared_and_dedicated() {
        let shared = SharedPoolsSpec {
            metadata_pool_name: "shared-meta".into(),
            data_pool_name: "shared-data".into(),
            ..SharedPoolsSpec::default()
        };
        let err = validate_pools_config(&replicated(3), &replicated(3), &shared).unwrap_err();
        assert!(err.starts_with("invalidObjStorePoolConfig: "));
        assert!(err.contains("metadata pool cannot both be set"));

        assert!(validate_pools_config(&PoolSpec::default(), &PoolSpec::default(), &shared).is_ok());
        assert!(
            validate_pools_config(&replicated(3), &replicated(3), &SharedPoolsSpec::default())
                .is_ok()
        );
        let metadata_only = SharedPoolsSpec {
            metadata_pool_name: "shared-meta".into(),
            ..SharedPoolsSpec::default()
        };
        assert!(
            validate_pools_config(&PoolSpec::default(), &replicated(3), &metadata_only).is_ok()
        );
    }

    #[test]
    fn test_needs_dedicated_pools() {
        assert!(SharedPoolsSpec::default().needs_dedicated_pools());
        let shared = SharedPoolsSpec {
            metadata_pool_name: "m".into(),
            data_pool_name: "d".into(),
            ..SharedPoolsSpec::default()
        };
        assert!(!shared.needs_dedicated_pools());
        let with_default = SharedPoolsSpec {
            pool_placements: vec![placement("fast", true)],
            ..SharedPoolsSpec::default()
        };
        assert!(!with_default.needs_dedicated_pools());
        let without_default = SharedPoolsSpec {
            pool_placements: vec![placement("fast", false)],
            ..SharedPoolsSpec::default()
        };
        assert!(without_default.needs_dedicated_pools());
    }

    #[test]
    fn test_referenced_pools_skip_blanks() {
        let mut fast = placement("fast", true);
        fast.storage_classes = vec![PlacementStorageClassSpec {
            name: "COLD".into(),
            data_pool_name: "cold-pool".into(),
        }];
        let spec = SharedPoolsSpec {
            pool_placements: vec![fast],
            ..SharedPoolsSpec::default()
        };
        let names = spec
            .referenced_pools()
            .into_iter()
            .map(|(name, _)| name)
            .collect::<BTreeSet<_>>();
        assert_eq!(names, BTreeSet::from(["cold-pool", "data", "meta"]));
    }
}
