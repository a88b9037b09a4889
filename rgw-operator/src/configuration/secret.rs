use std::{collections::BTreeMap, io::Write};

use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    builder::meta::ObjectMetaBuilder,
    client::Client,
    k8s_openapi::ByteString,
    kube::{
        Resource,
        runtime::reflector::{Lookup, ObjectRef},
    },
};

use super::error::{
    ApplySecretSnafu, GetSecretSnafu, ObjectHasNoNameSnafu, ObjectHasNoNamespaceSnafu,
    ObjectMissingMetadataForOwnerRefSnafu, Result, SecretDataEncodingSnafu,
    SecretDeserializationSnafu, SecretHasNoDataSnafu, SecretSerializationSnafu,
    WriteToStdoutSnafu, YamlSerializationSnafu,
};

type K8sSecret = stackable_operator::k8s_openapi::api::core::v1::Secret;

/// A Kubernetes Secret whose string entries are the fields of `T`.
///
/// `T` is converted through its serde JSON representation: every top-level string,
/// bool or number field becomes one entry, keyed by the serialized field name.
/// Secrets read from the API server carry base64 `data`; secrets written by this
/// type use `stringData`. Both are accepted when reading.
pub struct Secret<T>
where
    T: serde::Serialize + for<'de> serde::Deserialize<'de>,
{
    value: T,
    name: String,
    namespace: String,
}

impl<T> Secret<T>
where
    T: serde::Serialize + for<'de> serde::Deserialize<'de>,
{
    pub fn new(name: String, namespace: String, value: T) -> Secret<T> {
        Secret {
            value,
            name,
            namespace,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn fetch(client: &Client, name: &str, namespace: &str) -> Result<Secret<T>> {
        let secret = client
            .get::<K8sSecret>(name, namespace)
            .await
            .context(GetSecretSnafu { name })?;
        Secret::from(secret)
    }

    /// Like [`Secret::fetch`], but a missing secret is `Ok(None)`.
    pub async fn fetch_opt(
        client: &Client,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Secret<T>>> {
        let secret = client
            .get_opt::<K8sSecret>(name, namespace)
            .await
            .context(GetSecretSnafu { name })?;
        secret.map(Secret::from).transpose()
    }

    pub fn to_secret(&self) -> Result<K8sSecret> {
        let data = Secret::to_data(&self.value)?;
        Ok(self.build_k8s_secret(
            ObjectMetaBuilder::new()
                .name(&self.name)
                .namespace_opt(Some(self.namespace.clone()))
                .build(),
            data,
        ))
    }

    /// Builds the secret with `owner` as its controlling owner, so it is garbage
    /// collected together with the owner.
    pub fn to_owned_secret<R>(&self, owner: &R) -> Result<K8sSecret>
    where
        R: Resource<DynamicType = ()>,
    {
        let data = Secret::to_data(&self.value)?;
        let metadata = ObjectMetaBuilder::new()
            .name(&self.name)
            .namespace_opt(Some(self.namespace.clone()))
            .ownerreference_from_resource(owner, None, Some(true))
            .with_context(|_| ObjectMissingMetadataForOwnerRefSnafu {
                owner: owner.meta().name.clone().unwrap_or_default(),
            })?
            .build();
        Ok(self.build_k8s_secret(metadata, data))
    }

    /// Server-side applies the secret, owned by `owner`.
    pub async fn apply<R>(&self, client: &Client, field_manager: &str, owner: &R) -> Result<()>
    where
        R: Resource<DynamicType = ()>,
    {
        let secret = self.to_owned_secret(owner)?;
        client
            .apply_patch(field_manager, &secret, &secret)
            .await
            .context(ApplySecretSnafu { name: &self.name })?;
        Ok(())
    }

    pub fn print_yaml(&self) -> Result<()> {
        let secret = self.to_secret()?;

        let serialized_secret = serde_yaml::to_string(&secret).context(YamlSerializationSnafu)?;

        let mut writer = std::io::stdout();
        writer
            .write_all(serialized_secret.as_bytes())
            .context(WriteToStdoutSnafu)?;

        Ok(())
    }

    fn to_data(value: &T) -> Result<BTreeMap<String, String>> {
        let json_value = serde_json::to_value(value).context(SecretSerializationSnafu)?;

        let result = match json_value {
            Value::Object(map) => map
                .into_iter()
                .flat_map(|(k, v)| match v {
                    Value::String(s) => Some((k, s)),
                    Value::Bool(b) => Some((k, b.to_string())),
                    Value::Number(n) => Some((k, n.to_string())),
                    _ => None,
                })
                .collect::<BTreeMap<String, String>>(),
            _ => BTreeMap::new(),
        };
        Ok(result)
    }

    fn build_k8s_secret(
        &self,
        metadata: stackable_operator::k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
        data: BTreeMap<String, String>,
    ) -> K8sSecret {
        K8sSecret {
            metadata,
            type_: Some("kubernetes.io/rook".to_string()),
            string_data: Some(data),
            ..K8sSecret::default()
        }
    }

    pub fn from(k8s_secret: K8sSecret) -> Result<Secret<T>> {
        let name = k8s_secret.name().context(ObjectHasNoNameSnafu)?.to_string();
        let namespace = k8s_secret
            .namespace()
            .context(ObjectHasNoNamespaceSnafu)?
            .to_string();
        let obj_ref = ObjectRef::from_obj(&k8s_secret);

        let mut entries = BTreeMap::new();
        for (key, ByteString(bytes)) in k8s_secret.data.unwrap_or_default() {
            let value = String::from_utf8(bytes).context(SecretDataEncodingSnafu {
                secret: &name,
                key: &key,
            })?;
            entries.insert(key, value);
        }
        entries.extend(k8s_secret.string_data.unwrap_or_default());
        if entries.is_empty() {
            return SecretHasNoDataSnafu { secret: obj_ref }.fail();
        }

        let value = Secret::from_data(&name, entries)?;
        Ok(Secret {
            value,
            name,
            namespace,
        })
    }

    fn from_data(name: &str, data: BTreeMap<String, String>) -> Result<T> {
        let value_data = data
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<serde_json::Map<String, Value>>();
        let json_value = Value::Object(value_data);
        serde_json::from_value(json_value).context(SecretDeserializationSnafu { secret: name })
    }
}
