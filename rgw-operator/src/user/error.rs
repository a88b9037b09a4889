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

    #[snafu(display("{message}"))]
    InvalidSpec { message: String },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("failed to access object store {store}"))]
    Store {
        source: crate::store::admin::Error,
        store: String,
    },

    #[snafu(display("failed to create s3 user {uid}"))]
    CreateUser {
        source: rgw_admin_api::Error,
        uid: String,
    },

    #[snafu(display("failed to get s3 user {uid}"))]
    GetUser {
        source: rgw_admin_api::Error,
        uid: String,
    },

    #[snafu(display("failed to modify s3 user {uid}"))]
    ModifyUser {
        source: rgw_admin_api::Error,
        uid: String,
    },

    #[snafu(display("s3 user {uid} has no access and secret key"))]
    UserKeysMissing { uid: String },

    #[snafu(display("failed to delete s3 user {uid}, it owns buckets [{buckets}]"))]
    DeleteUser {
        source: rgw_admin_api::Error,
        uid: String,
        buckets: String,
    },

    #[snafu(display("failed to apply credentials secret {secret}"))]
    ApplySecret {
        source: crate::configuration::error::Error,
        secret: String,
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
            Error::Store { source, .. } => source.kind(),
            Error::Panic { .. } => ErrorKind::Panic,
            _ => ErrorKind::Transient,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
