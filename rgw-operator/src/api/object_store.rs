use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::{
    commons::product_image_selection::ProductImage,
    k8s_openapi::api::core::v1::{Affinity, ResourceRequirements},
    kube::{CustomResource, ResourceExt},
    time::Duration,
};

use super::{
    pool::{PoolSpec, SharedPoolsSpec, validate_pools_config},
    status::{BucketStatus, Dependents, Phase, has_reconcile_status},
};

pub const DEFAULT_HEALTH_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
pub const HEALTH_CHECK_BUCKET_PREFIX: &str = "rook-ceph-bucket-checker-";
pub const INFO_ENDPOINT: &str = "endpoint";
pub const INFO_SECURE_ENDPOINT: &str = "secureEndpoint";

/// An S3 gateway (RGW) deployment together with its pools and zone configuration.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    kind = "ObjectStore",
    group = "ceph.rook.io",
    version = "v1",
    plural = "objectstores",
    status = "ObjectStoreStatus",
    shortname = "os",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreSpec {
    #[serde(default)]
    pub metadata_pool: PoolSpec,

    #[serde(default)]
    pub data_pool: PoolSpec,

    #[serde(default)]
    pub shared_pools: SharedPoolsSpec,

    #[serde(default)]
    pub preserve_pools_on_delete: bool,

    pub gateway: GatewaySpec,

    /// Joins an existing multisite zone instead of creating a realm of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<ZoneRef>,

    #[serde(default)]
    pub health_check: HealthCheckSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosting: Option<HostingSpec>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FrontendType {
    #[default]
    Beast,
    Civetweb,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    pub image: ProductImage,

    #[serde(default)]
    pub port: i32,

    #[serde(default)]
    pub secure_port: i32,

    /// Secret holding the TLS certificate under the `cert` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_certificate_ref: Option<String>,

    #[serde(default = "default_instances")]
    pub instances: i32,

    /// Runs one gateway per node as a DaemonSet.
    #[serde(default)]
    pub all_nodes: bool,

    #[serde(default)]
    pub host_network: bool,

    #[serde(default)]
    pub frontend: FrontendType,

    #[serde(default)]
    pub disable_multisite_sync_traffic: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
}

fn default_instances() -> i32 {
    1
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZoneRef {
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    #[serde(default)]
    pub bucket: BucketHealthCheckSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BucketHealthCheckSpec {
    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostingSpec {
    /// Endpoint advertised to clients instead of the in-cluster service address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_status: Option<BucketStatus>,

    #[serde(default)]
    pub dependents: Option<Dependents>,
}

has_reconcile_status!(ObjectStore, ObjectStoreStatus);

impl GatewaySpec {
    pub fn is_tls_enabled(&self) -> bool {
        self.secure_port > 0
            && self
                .ssl_certificate_ref
                .as_deref()
                .is_some_and(|cert| !cert.is_empty())
    }
}

impl ObjectStore {
    pub fn validate(&self) -> Result<(), String> {
        if self.name_any().is_empty() {
            return Err("missing name".to_string());
        }
        if self.namespace().unwrap_or_default().is_empty() {
            return Err("missing namespace".to_string());
        }
        let gateway = &self.spec.gateway;
        if gateway.port <= 0 && gateway.secure_port <= 0 {
            return Err("invalid create: either a port or securePort must be specified".to_string());
        }
        if gateway.secure_port > 0 && !gateway.is_tls_enabled() {
            return Err("invalid create: securePort requires an sslCertificateRef".to_string());
        }
        if gateway.instances < 1 && !gateway.all_nodes {
            return Err(format!(
                "invalid create: instances must be at least 1, got {}",
                gateway.instances
            ));
        }
        if self.is_multisite()
            && (!self.spec.metadata_pool.is_empty() || !self.spec.data_pool.is_empty())
        {
            return Err(
                "invalid create: pools must be declared on the zone when the store joins a zone"
                    .to_string(),
            );
        }
        validate_pools_config(
            &self.spec.metadata_pool,
            &self.spec.data_pool,
            &self.spec.shared_pools,
        )
    }

    pub fn is_multisite(&self) -> bool {
        self.spec
            .zone
            .as_ref()
            .is_some_and(|zone| !zone.name.is_empty())
    }

    /// Name shared by the gateway service, workload and keyring.
    pub fn gateway_name(&self) -> String {
        format!("rook-ceph-rgw-{}", self.name_any())
    }

    pub fn domain_name(&self) -> String {
        format!(
            "{}.{}.svc",
            self.gateway_name(),
            self.namespace().unwrap_or_default()
        )
    }

    /// The in-cluster endpoint clients and the operator itself talk to.
    ///
    /// Plain HTTP wins when both ports are open.
    pub fn dns_endpoint(&self) -> String {
        let gateway = &self.spec.gateway;
        let (scheme, port) = if gateway.port > 0 {
            ("http", gateway.port)
        } else {
            ("https", gateway.secure_port)
        };
        format!("{scheme}://{}:{port}", self.domain_name())
    }

    pub fn advertise_endpoint(&self) -> String {
        self.spec
            .hosting
            .as_ref()
            .and_then(|hosting| hosting.advertise_endpoint.clone())
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or_else(|| self.dns_endpoint())
    }

    pub fn info(&self) -> BTreeMap<String, String> {
        let gateway = &self.spec.gateway;
        let mut info = BTreeMap::new();
        if gateway.port > 0 {
            info.insert(
                INFO_ENDPOINT.to_string(),
                format!("http://{}:{}", self.domain_name(), gateway.port),
            );
        }
        if gateway.secure_port > 0 {
            info.insert(
                INFO_SECURE_ENDPOINT.to_string(),
                format!("https://{}:{}", self.domain_name(), gateway.secure_port),
            );
        }
        info
    }

    pub fn health_check_bucket(&self) -> String {
        format!(
            "{HEALTH_CHECK_BUCKET_PREFIX}{}",
            self.uid().unwrap_or_default()
        )
    }

    /// Probe interval of the store, or `default` when the store sets none.
    pub fn health_check_interval(&self, default: std::time::Duration) -> std::time::Duration {
        self.spec
            .health_check
            .bucket
            .interval
            .map(|interval| *interval)
            .unwrap_or(default)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn object_store(yaml: &str) -> ObjectStore {
        serde_yaml::from_str(yaml).expect("invalid test object store")
    }

    pub const STORE: &str = r#"
apiVersion: ceph.rook.io/v1
kind: ObjectStore
metadata:
  name: my-store
  namespace: rook-ceph
  uid: 9a2b0c6e-1f7a-4c3b-8a49-5e7d1c2b3a40
  generation: 3
spec:
  metadataPool:
    failureDomain: host
    replicated:
      size: 3
  dataPool:
    erasureCoded:
      dataChunks: 2
      codingChunks: 1
  gateway:
    image:
      custom: quay.io/ceph/ceph:v19.2.0
      productVersion: 19.2.0
    port: 80
    instances: 2
"#;
}
