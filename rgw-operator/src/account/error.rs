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

    #[snafu(display("UID too short to generate account ID: {uid:?}"))]
    UidTooShort { uid: String },

    #[snafu(display("failed to parse UID hex digits of {uid:?}"))]
    UidNotHex { uid: String },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("failed to access object store {store}"))]
    Store {
        source: crate::store::admin::Error,
        store: String,
    },

    #[snafu(display("failed to check if account {id} exists"))]
    GetAccount {
        source: rgw_admin_api::Error,
        id: String,
    },

    #[snafu(display(
        "account ID {id:?} already exists in RGW but is not managed by this resource; refusing to adopt a foreign account"
    ))]
    ForeignAccount { id: String },

    #[snafu(display("failed to persist account ID annotation {id} before creating the account"))]
    Bookmark { source: kube::Error, id: String },

    #[snafu(display(
        "failed to create account with ID {id:?} and name {name:?}: an account with this ID or name already exists in RGW"
    ))]
    AccountConflict { id: String, name: String },

    #[snafu(display("failed to create account {name}"))]
    CreateAccount {
        source: rgw_admin_api::Error,
        name: String,
    },

    #[snafu(display("failed to modify account {id}"))]
    ModifyAccount {
        source: rgw_admin_api::Error,
        id: String,
    },

    #[snafu(display("failed to delete account {id}"))]
    DeleteAccount {
        source: rgw_admin_api::Error,
        id: String,
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
            | Error::UidTooShort { .. }
            | Error::UidNotHex { .. } => ErrorKind::InvalidConfig,
            Error::ObjectHasNoNamespace => ErrorKind::InvalidConfig,
            Error::Store { source, .. } => source.kind(),
            Error::ForeignAccount { .. } => ErrorKind::ForeignAccount,
            Error::AccountConflict { .. } => ErrorKind::Conflict,
            Error::Panic { .. } => ErrorKind::Panic,
            _ => ErrorKind::Transient,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
