use snafu::Snafu;
use stackable_operator::{
    kube::{self, api::DynamicObject, core::error_boundary, runtime::reflector::ObjectRef},
    logging::controller::ReconcilerError,
};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    api::object_store::ObjectStore,
    reconcile::{ClassifyError, ErrorKind, recovery::Panicked},
};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[allow(clippy::enum_variant_names)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid object store"))]
    InvalidObjectStore {
        source: error_boundary::InvalidObject,
    },

    #[snafu(display("{message}"))]
    InvalidSpec { message: String },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("failed to query ceph cluster health"))]
    ClusterHealth { source: crate::rgw::error::Error },

    #[snafu(display("failed to resolve the zone of object store {store}"))]
    Topology {
        source: crate::multisite::error::Error,
        store: String,
    },

    #[snafu(display("failed to {operation} for object store {store}"))]
    Rgw {
        source: crate::rgw::error::Error,
        operation: String,
        store: String,
    },

    #[snafu(display("failed to connect to the admin ops api of object store {store}"))]
    ConnectAdminOps {
        source: crate::rgw::error::Error,
        store: String,
    },

    #[snafu(display("failed to list buckets of object store {store}"))]
    ListBuckets {
        source: rgw_admin_api::Error,
        store: String,
    },

    #[snafu(display("failed to list {kind}"))]
    ListResources {
        source: stackable_operator::client::Error,
        kind: String,
    },

    #[snafu(display("failed to apply {kind} {name}"))]
    ApplyResource {
        source: stackable_operator::client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to get {kind} {name}"))]
    GetResource {
        source: stackable_operator::client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to delete {kind} {name}"))]
    DeleteResource {
        source: stackable_operator::client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to apply keyring secret {secret}"))]
    ApplyKeyring {
        source: crate::configuration::error::Error,
        secret: String,
    },

    #[snafu(display("failed to build Labels"))]
    LabelBuild {
        source: stackable_operator::kvp::LabelError,
    },

    #[snafu(display("failed to build object meta data"))]
    ObjectMeta {
        source: stackable_operator::builder::meta::Error,
    },

    #[snafu(display("object {} is missing metadata to build owner reference", store))]
    ObjectMissingMetadataForOwnerRef {
        source: stackable_operator::builder::meta::Error,
        store: ObjectRef<ObjectStore>,
    },

    #[snafu(display("invalid container name"))]
    InvalidContainerName {
        name: String,
        source: stackable_operator::builder::pod::container::Error,
    },

    #[snafu(display("add volume mount error"))]
    AddVolumeMount {
        source: stackable_operator::builder::pod::container::Error,
    },

    #[snafu(display("add volume error"))]
    AddVolume {
        source: stackable_operator::builder::pod::Error,
    },

    #[snafu(display("failed to update finalizers"))]
    Finalizer { source: kube::Error },

    #[snafu(display("failed to update status"))]
    ApplyStatus { source: kube::Error },

    #[snafu(display("reconcile panicked"))]
    Panic { source: Panicked },
}

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }

    fn secondary_object(&self) -> Option<ObjectRef<DynamicObject>> {
        None
    }
}

impl From<Panicked> for Error {
    fn from(source: Panicked) -> Self {
        Error::Panic { source }
    }
}

impl ClassifyError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidObjectStore { .. }
            | Error::InvalidSpec { .. }
            | Error::ObjectHasNoNamespace => ErrorKind::InvalidConfig,
            Error::Topology { source, .. } => source.kind(),
            Error::ClusterHealth { source } => source.kind(),
            Error::Rgw { source, .. } | Error::ConnectAdminOps { source, .. } => source.kind(),
            Error::Panic { .. } => ErrorKind::Panic,
            _ => ErrorKind::Transient,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let not_ready = Error::Rgw {
            source: crate::rgw::error::Error::ClusterNotReady {
                health: "HEALTH_WARN".into(),
            },
            operation: "wait for the ceph cluster".into(),
            store: "my-store".into(),
        };
        assert_eq!(not_ready.kind(), ErrorKind::NotReady);
        assert_eq!(
            not_ready.to_string(),
            "failed to wait for the ceph cluster for object store my-store"
        );

        let missing_pool = Error::Rgw {
            source: crate::rgw::error::Error::SharedPoolMissing {
                pool: "meta".into(),
                origin: String::new(),
            },
            operation: "create realm, zonegroup and zone".into(),
            store: "my-store".into(),
        };
        assert_eq!(missing_pool.kind(), ErrorKind::MissingPool);
        assert_eq!(
            Error::InvalidSpec {
                message: "bad".into()
            }
            .kind(),
            ErrorKind::InvalidConfig
        );
    }
}
