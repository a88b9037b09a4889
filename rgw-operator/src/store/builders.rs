use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use stackable_operator::{
    builder::{
        meta::ObjectMetaBuilder,
        pod::{PodBuilder, container::ContainerBuilder, resources::ResourceRequirementsBuilder},
    },
    commons::product_image_selection::ResolvedProductImage,
    k8s_openapi::{
        api::{
            apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec},
            core::v1::{
                Affinity, ContainerPort, EnvVarSource, HTTPGetAction, KeyToPath,
                ObjectFieldSelector, PodAffinityTerm, PodAntiAffinity, PodTemplateSpec, Probe,
                SecretKeySelector, SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume,
                VolumeMount, WeightedPodAffinityTerm,
            },
        },
        apimachinery::pkg::{
            apis::meta::v1::{LabelSelector, ObjectMeta},
            util::intstr::IntOrString,
        },
    },
    kube::ResourceExt,
    kvp::{Labels, ObjectLabels},
};

use super::error::{
    AddVolumeMountSnafu, AddVolumeSnafu, InvalidContainerNameSnafu, LabelBuildSnafu,
    ObjectMetaSnafu, ObjectMissingMetadataForOwnerRefSnafu, Result,
};
use crate::{
    APP_NAME, OPERATOR_NAME,
    api::object_store::{GatewaySpec, ObjectStore},
    rgw::{
        context::ObjectContext,
        keyring::{KEYRING_FILE_NAME, cephx_user},
        port::{RGW_CERT_PATH, frontend_config, internal_port},
    },
};

pub const CONTAINER: &str = "rgw";
pub const ROLE: &str = "gateway";
pub const ROLE_GROUP: &str = "default";
pub const KEYRING_VOLUME_NAME: &str = "rook-ceph-rgw-keyring";
pub const KEYRING_DIR: &str = "/etc/ceph/keyring-store";
pub const CERT_VOLUME_NAME: &str = "rook-ceph-rgw-cert";
pub const CERT_DIR: &str = "/etc/ceph/private";
/// Key of the TLS secret holding the certificate and private key.
pub const CERT_SECRET_KEY: &str = "cert";
/// Secret written by the cluster operator with the monitor addresses.
pub const MON_SECRET: &str = "rook-ceph-config";
const RGW_BINARY: &str = "radosgw";
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Content of the keyring secret mounted into the gateway pods.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GatewayKeyring {
    pub keyring: String,
}

/// The gateway pods run either as a Deployment or as one pod per node.
#[derive(Clone, Debug)]
pub enum Workload {
    Deployment(Deployment),
    DaemonSet(DaemonSet),
}

pub fn build_recommended_labels<'a>(
    owner: &'a ObjectStore,
    controller_name: &'a str,
    app_version: &'a str,
) -> ObjectLabels<'a, ObjectStore> {
    ObjectLabels {
        owner,
        app_name: APP_NAME,
        app_version,
        operator_name: OPERATOR_NAME,
        controller_name,
        role: ROLE,
        role_group: ROLE_GROUP,
    }
}

pub fn gateway_selector(store: &ObjectStore) -> Result<Labels> {
    Labels::role_group_selector(store, APP_NAME, ROLE, ROLE_GROUP).context(LabelBuildSnafu)
}

fn gateway_metadata(store: &ObjectStore, labels: ObjectLabels<ObjectStore>) -> Result<ObjectMeta> {
    Ok(ObjectMetaBuilder::new()
        .name_and_namespace(store)
        .name(store.gateway_name())
        .ownerreference_from_resource(store, None, Some(true))
        .context(ObjectMissingMetadataForOwnerRefSnafu { store })?
        .with_recommended_labels(labels)
        .context(ObjectMetaSnafu)?
        .build())
}

/// The service in front of the gateways, one port per enabled scheme.
///
/// Gateways on the host network get a headless service.
pub fn build_service(
    store: &ObjectStore,
    labels: ObjectLabels<ObjectStore>,
    selector: Labels,
) -> Result<Service> {
    let gateway = &store.spec.gateway;
    let mut ports = Vec::new();
    if gateway.port > 0 {
        ports.push(ServicePort {
            name: Some("http".to_string()),
            port: gateway.port,
            target_port: Some(IntOrString::Int(internal_port(gateway))),
            protocol: Some("TCP".to_string()),
            ..ServicePort::default()
        });
    }
    if gateway.secure_port > 0 {
        ports.push(ServicePort {
            name: Some("https".to_string()),
            port: gateway.secure_port,
            target_port: Some(IntOrString::Int(gateway.secure_port)),
            protocol: Some("TCP".to_string()),
            ..ServicePort::default()
        });
    }

    Ok(Service {
        metadata: gateway_metadata(store, labels)?,
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(selector.into()),
            cluster_ip: gateway.host_network.then(|| "None".to_string()),
            ..ServiceSpec::default()
        }),
        status: None,
    })
}

/// Command line of the gateway process. Realm, zonegroup and zone come from `rgw`.
pub fn gateway_args(store: &ObjectStore, rgw: &ObjectContext) -> Vec<String> {
    let gateway = &store.spec.gateway;
    let mut args = vec![
        "--foreground".to_string(),
        format!("--name={}", cephx_user(&store.name_any())),
        format!("--keyring={KEYRING_DIR}/{KEYRING_FILE_NAME}"),
        "--mon-host=$(ROOK_CEPH_MON_HOST)".to_string(),
        "--host=$(POD_NAME)".to_string(),
        format!("--rgw-frontends={}", frontend_config(gateway)),
        rgw.realm_arg(),
        rgw.zone_group_arg(),
        rgw.zone_arg(),
    ];
    if gateway.disable_multisite_sync_traffic {
        args.push("--rgw-run-sync-thread=false".to_string());
    }
    args
}

fn gateway_ports(gateway: &GatewaySpec) -> Vec<ContainerPort> {
    let mut ports = Vec::new();
    if gateway.port > 0 {
        ports.push(ContainerPort {
            container_port: internal_port(gateway),
            name: Some("http".into()),
            protocol: Some("TCP".into()),
            ..ContainerPort::default()
        });
    }
    if gateway.secure_port > 0 {
        ports.push(ContainerPort {
            container_port: gateway.secure_port,
            name: Some("https".into()),
            protocol: Some("TCP".into()),
            ..ContainerPort::default()
        });
    }
    ports
}

fn health_probe(gateway: &GatewaySpec) -> Probe {
    let (scheme, port) = if gateway.port > 0 {
        ("HTTP", internal_port(gateway))
    } else {
        ("HTTPS", gateway.secure_port)
    };
    Probe {
        failure_threshold: Some(3),
        http_get: Some(HTTPGetAction {
            path: Some("/swift/healthcheck".to_owned()),
            port: IntOrString::Int(port),
            scheme: Some(scheme.to_owned()),
            ..HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(10),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        ..Probe::default()
    }
}

/// Spreads the gateways over nodes. Host networking makes it a hard rule,
/// since two gateways on one node would compete for the same port.
pub fn gateway_anti_affinity(host_network: bool, selector: &Labels) -> PodAntiAffinity {
    let term = PodAffinityTerm {
        label_selector: Some(LabelSelector {
            match_labels: Some(selector.clone().into()),
            ..LabelSelector::default()
        }),
        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
        ..PodAffinityTerm::default()
    };
    if host_network {
        PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![term]),
            ..PodAntiAffinity::default()
        }
    } else {
        PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 50,
                    pod_affinity_term: term,
                },
            ]),
            ..PodAntiAffinity::default()
        }
    }
}

/// User placement wins; anti-affinity is only filled in where it is left open.
fn gateway_affinity(gateway: &GatewaySpec, selector: &Labels) -> Affinity {
    let mut affinity = gateway.affinity.clone().unwrap_or_default();
    if affinity.pod_anti_affinity.is_none() {
        affinity.pod_anti_affinity = Some(gateway_anti_affinity(gateway.host_network, selector));
    }
    affinity
}

fn secret_env(key: &str) -> EnvVarSource {
    EnvVarSource {
        secret_key_ref: Some(SecretKeySelector {
            key: key.to_owned(),
            name: MON_SECRET.to_owned(),
            optional: None,
        }),
        ..EnvVarSource::default()
    }
}

pub fn build_pod_template(
    store: &ObjectStore,
    rgw: &ObjectContext,
    resolved_product_image: &ResolvedProductImage,
    labels: ObjectLabels<ObjectStore>,
    selector: &Labels,
) -> Result<PodTemplateSpec> {
    let gateway = &store.spec.gateway;
    let mut container_rgw = ContainerBuilder::new(CONTAINER).context(InvalidContainerNameSnafu {
        name: CONTAINER.to_string(),
    })?;

    let mut volume_mounts = vec![VolumeMount {
        name: KEYRING_VOLUME_NAME.into(),
        mount_path: KEYRING_DIR.into(),
        read_only: Some(true),
        ..VolumeMount::default()
    }];
    if gateway.is_tls_enabled() {
        volume_mounts.push(VolumeMount {
            name: CERT_VOLUME_NAME.into(),
            mount_path: CERT_DIR.into(),
            read_only: Some(true),
            ..VolumeMount::default()
        });
    }

    container_rgw
        .image_from_product_image(resolved_product_image)
        .command(vec![RGW_BINARY.to_string()])
        .args(gateway_args(store, rgw))
        .add_env_var_from_source(
            "POD_NAME",
            EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".to_owned(),
                    api_version: None,
                }),
                ..EnvVarSource::default()
            },
        )
        .add_env_var_from_source("ROOK_CEPH_MON_HOST", secret_env("mon_host"))
        .add_container_ports(gateway_ports(gateway))
        .add_volume_mounts(volume_mounts)
        .context(AddVolumeMountSnafu)?
        .liveness_probe(health_probe(gateway))
        .readiness_probe(health_probe(gateway))
        .resources(gateway.resources.clone().unwrap_or_else(|| {
            ResourceRequirementsBuilder::new()
                .with_cpu_request("500m")
                .with_cpu_limit("2")
                .with_memory_request("512Mi")
                .with_memory_limit("2Gi")
                .build()
        }));

    let pod_metadata = ObjectMetaBuilder::new()
        .with_recommended_labels(labels)
        .context(ObjectMetaSnafu)?
        .build();

    let mut pod_builder = PodBuilder::new();
    pod_builder
        .metadata(pod_metadata)
        .image_pull_secrets_from_product_image(resolved_product_image)
        .add_container(container_rgw.build())
        .add_volume(Volume {
            name: KEYRING_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(crate::rgw::keyring::keyring_secret_name(&store.name_any())),
                ..SecretVolumeSource::default()
            }),
            ..Volume::default()
        })
        .context(AddVolumeSnafu)?;

    if let Some(cert_secret) = gateway
        .ssl_certificate_ref
        .as_ref()
        .filter(|_| gateway.is_tls_enabled())
    {
        let cert_file = RGW_CERT_PATH
            .rsplit('/')
            .next()
            .unwrap_or(RGW_CERT_PATH)
            .to_string();
        pod_builder
            .add_volume(Volume {
                name: CERT_VOLUME_NAME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(cert_secret.clone()),
                    items: Some(vec![KeyToPath {
                        key: CERT_SECRET_KEY.to_string(),
                        path: cert_file,
                        mode: None,
                    }]),
                    ..SecretVolumeSource::default()
                }),
                ..Volume::default()
            })
            .context(AddVolumeSnafu)?;
    }

    let mut template = pod_builder.build_template();
    if let Some(pod) = template.spec.as_mut() {
        pod.affinity = Some(gateway_affinity(gateway, selector));
        pod.node_selector = gateway.node_selector.clone();
        if gateway.host_network {
            pod.host_network = Some(true);
            pod.dns_policy = Some("ClusterFirstWithHostNet".to_string());
        }
    }
    Ok(template)
}

/// A Deployment with `instances` replicas, or a DaemonSet when `allNodes` is set.
pub fn build_workload(
    store: &ObjectStore,
    labels: ObjectLabels<ObjectStore>,
    selector: Labels,
    template: PodTemplateSpec,
) -> Result<Workload> {
    let metadata = gateway_metadata(store, labels)?;
    let selector = LabelSelector {
        match_labels: Some(selector.into()),
        ..LabelSelector::default()
    };
    if store.spec.gateway.all_nodes {
        return Ok(Workload::DaemonSet(DaemonSet {
            metadata,
            spec: Some(DaemonSetSpec {
                selector,
                template,
                ..DaemonSetSpec::default()
            }),
            status: None,
        }));
    }
    Ok(Workload::Deployment(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(store.spec.gateway.instances),
            selector,
            template,
            ..DeploymentSpec::default()
        }),
        status: None,
    }))
}
