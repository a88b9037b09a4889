//! Resolution of the realm, zonegroup and zone a resource lives in.

use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    client::Client,
    kube::{Resource, ResourceExt},
};

use super::error::{
    GetResourceSnafu, MissingSnafu, ObjectHasNoNamespaceSnafu, RealmKeysMissingSnafu,
    RealmKeysSecretSnafu, Result,
};
use crate::{
    api::{
        object_store::ObjectStore, realm::ObjectRealm, realm::realm_keys_secret_name,
        zone::ObjectZone, zone_group::ObjectZoneGroup,
    },
    configuration::secret::Secret,
    reconcile::status::StatusResource,
    rgw::{cli::AdminCli, context::ObjectContext, multisite::RealmKeys},
};

/// Fetches a resource another one refers to. Its absence means "not ready yet".
pub async fn get_referenced<K: StatusResource>(
    client: &Client,
    name: &str,
    namespace: &str,
) -> Result<K> {
    let kind = K::kind(&()).to_string();
    client
        .get_opt::<K>(name, namespace)
        .await
        .with_context(|_| GetResourceSnafu {
            kind: kind.clone(),
            name,
        })?
        .with_context(|| MissingSnafu { kind, name })
}

pub fn namespace_of<K: Resource>(obj: &K) -> Result<String> {
    obj.meta().namespace.clone().context(ObjectHasNoNamespaceSnafu)
}

/// A zone together with the zonegroup and realm above it.
#[derive(Clone, Debug)]
pub struct ZoneTopology {
    pub zone: ObjectZone,
    pub zone_group: ObjectZoneGroup,
    pub realm: ObjectRealm,
}

impl ZoneTopology {
    pub async fn resolve(client: &Client, zone: &str, namespace: &str) -> Result<ZoneTopology> {
        let zone: ObjectZone = get_referenced(client, zone, namespace).await?;
        let zone_group: ObjectZoneGroup =
            get_referenced(client, &zone.spec.zone_group, namespace).await?;
        let realm: ObjectRealm = get_referenced(client, &zone_group.spec.realm, namespace).await?;
        Ok(ZoneTopology {
            zone,
            zone_group,
            realm,
        })
    }

    pub fn object_context(&self, cli: AdminCli, name: impl Into<String>) -> ObjectContext {
        ObjectContext::new(cli, name).with_multisite(
            self.realm.name_any(),
            self.zone_group.name_any(),
            self.zone.name_any(),
        )
    }
}

/// Keys of the realm's system user. The secret must have been created already.
pub async fn realm_keys(client: &Client, realm: &str, namespace: &str) -> Result<RealmKeys> {
    let secret = realm_keys_secret_name(realm);
    Secret::<RealmKeys>::fetch_opt(client, &secret, namespace)
        .await
        .context(RealmKeysSecretSnafu { secret: &secret })?
        .map(Secret::into_value)
        .context(RealmKeysMissingSnafu { secret })
}

/// The context admin commands for `store` run in.
///
/// A single-site store names its realm, zonegroup and zone after itself. A store
/// joining a zone takes them from the zone's resources.
pub async fn store_context(
    client: &Client,
    cli: AdminCli,
    store: &ObjectStore,
) -> Result<ObjectContext> {
    let ctx = match &store.spec.zone {
        Some(zone) if !zone.name.is_empty() => {
            let namespace = namespace_of(store)?;
            ZoneTopology::resolve(client, &zone.name, &namespace)
                .await?
                .object_context(cli, store.name_any())
        }
        _ => ObjectContext::new(cli, store.name_any()),
    };
    Ok(ctx.with_endpoint(store.dns_endpoint()))
}
