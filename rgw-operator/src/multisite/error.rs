use snafu::Snafu;
use stackable_operator::{
    kube::{self, api::DynamicObject, core::error_boundary, runtime::reflector::ObjectRef},
    logging::controller::ReconcilerError,
};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::reconcile::{ClassifyError, ErrorKind, recovery::Panicked};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid object"))]
    InvalidObject {
        source: error_boundary::InvalidObject,
    },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("{message}"))]
    InvalidSpec { message: String },

    #[snafu(display("failed to get {kind} {name}"))]
    GetResource {
        source: stackable_operator::client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to list {kind}"))]
    ListResources {
        source: stackable_operator::client::Error,
        kind: String,
    },

    #[snafu(display("{kind} {name} does not exist yet"))]
    Missing { kind: String, name: String },

    #[snafu(display("realm keys secret {secret} does not exist yet"))]
    RealmKeysMissing { secret: String },

    #[snafu(display("failed to access realm keys secret {secret}"))]
    RealmKeysSecret {
        source: crate::configuration::error::Error,
        secret: String,
    },

    #[snafu(display("failed to {operation} realm {realm}"))]
    Realm {
        source: crate::rgw::error::Error,
        operation: String,
        realm: String,
    },

    #[snafu(display("failed to {operation} zonegroup {zone_group}"))]
    ZoneGroup {
        source: crate::rgw::error::Error,
        operation: String,
        zone_group: String,
    },

    #[snafu(display("failed to {operation} zone {zone}"))]
    Zone {
        source: crate::rgw::error::Error,
        operation: String,
        zone: String,
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
            Error::InvalidObject { .. }
            | Error::InvalidSpec { .. }
            | Error::ObjectHasNoNamespace => ErrorKind::InvalidConfig,
            Error::Missing { .. } | Error::RealmKeysMissing { .. } => ErrorKind::NotReady,
            Error::Realm { source, .. }
            | Error::ZoneGroup { source, .. }
            | Error::Zone { source, .. } => source.kind(),
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
    fn test_kinds() {
        let missing = Error::Missing {
            kind: "ObjectZoneGroup".into(),
            name: "group-a".into(),
        };
        assert_eq!(missing.kind(), ErrorKind::NotReady);
        assert_eq!(missing.to_string(), "ObjectZoneGroup group-a does not exist yet");

        let pools = Error::Zone {
            source: crate::rgw::error::Error::StorePoolsMissing {
                pools: vec!["zone-a.rgw.meta".into()],
            },
            operation: "create pools of".into(),
            zone: "zone-a".into(),
        };
        assert_eq!(pools.kind(), ErrorKind::MissingPool);
        assert_eq!(pools.category(), "Zone");
    }
}
