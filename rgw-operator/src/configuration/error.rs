use snafu::Snafu;
use stackable_operator::{
    k8s_openapi::api::core::v1::Secret,
    kube::{api::DynamicObject, runtime::reflector::ObjectRef},
    logging::controller::ReconcilerError,
};
use strum::{EnumDiscriminants, IntoStaticStr};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("object has no name"))]
    ObjectHasNoName,

    #[snafu(display("failed to deserialize secret {secret}"))]
    SecretDeserialization {
        source: serde_json::Error,
        secret: String,
    },

    #[snafu(display("failed to serialize secret"))]
    SecretSerialization { source: serde_json::Error },

    #[snafu(display("failed to serialize secret"))]
    YamlSerialization { source: serde_yaml::Error },

    #[snafu(display("secret {secret} has no data"))]
    SecretHasNoData { secret: ObjectRef<Secret> },

    #[snafu(display("key {key} of secret {secret} is not valid utf-8"))]
    SecretDataEncoding {
        source: std::string::FromUtf8Error,
        secret: String,
        key: String,
    },

    #[snafu(display("object {owner} is missing metadata to build owner reference"))]
    ObjectMissingMetadataForOwnerRef {
        source: stackable_operator::builder::meta::Error,
        owner: String,
    },

    #[snafu(display("failed to fetch secret {name}"))]
    GetSecret {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("failed to apply secret {name}"))]
    ApplySecret {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("fail to write YAML to stdout"))]
    WriteToStdout { source: std::io::Error },

    #[snafu(display("invalid value {value:?} for {name}: {message}"))]
    InvalidEnvVar {
        name: String,
        value: String,
        message: String,
    },
}

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }

    fn secondary_object(&self) -> Option<ObjectRef<DynamicObject>> {
        match self {
            Error::SecretHasNoData { secret } => Some(secret.clone().erase()),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
