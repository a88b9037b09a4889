//! Objects that block the deletion of a store or of a multisite resource.

use rgw_admin_api::RgwAdminApi;
use stackable_operator::kube::ResourceExt;

use super::{context::ObjectContext, error::Result, pools::missing_pools};
use crate::api::{
    account::ObjectStoreAccount, object_store::ObjectStore, status::Dependents,
    user::ObjectStoreUser, zone::ObjectZone, zone_group::ObjectZoneGroup,
};

pub const USERS: &str = "CephObjectStoreUsers";
pub const ACCOUNTS: &str = "CephObjectStoreAccounts";
pub const BUCKETS: &str = "buckets";
pub const STORES: &str = "CephObjectStores";
pub const ZONES: &str = "CephObjectZones";
pub const ZONE_GROUPS: &str = "CephObjectZoneGroups";

fn same_namespace<A: ResourceExt, B: ResourceExt>(a: &A, b: &B) -> bool {
    a.namespace() == b.namespace()
}

/// Users, accounts and buckets still living in `store`.
///
/// `buckets` comes from RGW; the health check bucket is not a dependent.
pub fn store_dependents(
    store: &ObjectStore,
    users: &[ObjectStoreUser],
    accounts: &[ObjectStoreAccount],
    buckets: &[String],
) -> Dependents {
    let name = store.name_any();
    let health_bucket = store.health_check_bucket();
    let mut dependents = Dependents::default();
    dependents.add(
        USERS,
        users
            .iter()
            .filter(|user| same_namespace(*user, store) && user.spec.store == name)
            .map(ResourceExt::name_any)
            .collect(),
    );
    dependents.add(
        ACCOUNTS,
        accounts
            .iter()
            .filter(|account| same_namespace(*account, store) && account.spec.store == name)
            .map(ResourceExt::name_any)
            .collect(),
    );
    dependents.add(
        BUCKETS,
        buckets
            .iter()
            .filter(|bucket| **bucket != health_bucket)
            .cloned()
            .collect(),
    );
    dependents
}

/// Whether the store's pools are all there, so that RGW can answer admin requests.
///
/// Stores on shared pools have no dedicated pools to look for.
pub async fn store_pools_present(ctx: &ObjectContext, store: &ObjectStore) -> Result<bool> {
    if !store.spec.shared_pools.needs_dedicated_pools() {
        return Ok(true);
    }
    let missing = missing_pools(ctx).await?;
    if !missing.is_empty() {
        tracing::info!(
            store = %store.name_any(),
            ?missing,
            "store pools are missing, skipping dependents check"
        );
    }
    Ok(missing.is_empty())
}

pub async fn list_store_buckets(admin: &dyn RgwAdminApi) -> rgw_admin_api::Result<Vec<String>> {
    admin.list_buckets().await
}

pub fn zone_dependents(zone: &ObjectZone, stores: &[ObjectStore]) -> Dependents {
    let name = zone.name_any();
    let mut dependents = Dependents::default();
    dependents.add(
        STORES,
        stores
            .iter()
            .filter(|store| {
                same_namespace(*store, zone)
                    && store.spec.zone.as_ref().is_some_and(|z| z.name == name)
            })
            .map(ResourceExt::name_any)
            .collect(),
    );
    dependents
}

pub fn zone_group_dependents(zone_group: &ObjectZoneGroup, zones: &[ObjectZone]) -> Dependents {
    let name = zone_group.name_any();
    let mut dependents = Dependents::default();
    dependents.add(
        ZONES,
        zones
            .iter()
            .filter(|zone| same_namespace(*zone, zone_group) && zone.spec.zone_group == name)
            .map(ResourceExt::name_any)
            .collect(),
    );
    dependents
}

pub fn realm_dependents(
    realm: &str,
    namespace: Option<String>,
    zone_groups: &[ObjectZoneGroup],
) -> Dependents {
    let mut dependents = Dependents::default();
    dependents.add(
        ZONE_GROUPS,
        zone_groups
            .iter()
            .filter(|group| group.namespace() == namespace && group.spec.realm == realm)
            .map(ResourceExt::name_any)
            .collect(),
    );
    dependents
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        api::object_store::fixtures::{STORE, object_store},
        rgw::{
            admin_ops::testing::FakeAdminApi,
            cli::testing::{FakeExecutor, cli},
        },
    };

    fn user(name: &str, store: &str) -> ObjectStoreUser {
        serde_yaml::from_str(&format!(
            "apiVersion: ceph.rook.io/v1\nkind: ObjectStoreUser\nmetadata:\n  name: {name}\n  namespace: rook-ceph\nspec:\n  store: {store}\n"
        ))
        .unwrap()
    }

    fn zone(name: &str, zone_group: &str) -> ObjectZone {
        serde_yaml::from_str(&format!(
            "apiVersion: ceph.rook.io/v1\nkind: ObjectZone\nmetadata:\n  name: {name}\n  namespace: rook-ceph\nspec:\n  zoneGroup: {zone_group}\n"
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_store_with_user_and_buckets() {
        let store = object_store(STORE);
        let admin = FakeAdminApi::default().with_buckets(&[
            "b2",
            "b1",
            "rook-ceph-bucket-checker-9a2b0c6e-1f7a-4c3b-8a49-5e7d1c2b3a40",
        ]);
        let buckets = list_store_buckets(&admin).await.unwrap();
        let users = vec![user("u1", "my-store"), user("other", "other-store")];

        let dependents = store_dependents(&store, &users, &[], &buckets);
        assert!(!dependents.is_empty());
        assert_eq!(dependents.0[USERS], vec!["u1"]);
        assert_eq!(dependents.0[BUCKETS], vec!["b1", "b2"]);
        assert!(!dependents.0.contains_key(ACCOUNTS));
        assert_eq!(
            dependents.to_string(),
            "{CephObjectStoreUsers: [u1], buckets: [b1, b2]}"
        );
    }

    #[test]
    fn test_health_bucket_alone_is_no_dependent() {
        let store = object_store(STORE);
        let dependents = store_dependents(&store, &[], &[], &[store.health_check_bucket()]);
        assert!(dependents.is_empty());
    }

    #[tokio::test]
    async fn test_missing_pools_skip_the_scan() {
        let store = object_store(STORE);
        let executor = Arc::new(FakeExecutor::default());
        executor.expect(
            "osd lspools",
            Ok(r#"[
                {"poolnum": 1, "poolname": ".rgw.root"},
                {"poolnum": 2, "poolname": "my-store.rgw.meta"}
            ]"#),
        );
        let ctx = ObjectContext::new(cli(executor), "my-store");
        assert!(!store_pools_present(&ctx, &store).await.unwrap());
    }

    #[test]
    fn test_multisite_dependents() {
        let mut store = object_store(STORE);
        store.spec.zone = Some(crate::api::object_store::ZoneRef {
            name: "zone-a".into(),
        });
        let zones = vec![zone("zone-a", "group-a"), zone("zone-b", "group-b")];

        let deps = zone_dependents(&zones[0], &[store.clone()]);
        assert_eq!(deps.0[STORES], vec!["my-store"]);
        assert!(zone_dependents(&zones[1], &[store]).is_empty());

        let group: ObjectZoneGroup = serde_yaml::from_str(
            "apiVersion: ceph.rook.io/v1\nkind: ObjectZoneGroup\nmetadata:\n  name: group-a\n  namespace: rook-ceph\nspec:\n  realm: realm-a\n",
        )
        .unwrap();
        assert_eq!(zone_group_dependents(&group, &zones).0[ZONES], vec!["zone-a"]);
        let deps = realm_dependents("realm-a", Some("rook-ceph".into()), &[group]);
        assert_eq!(deps.0[ZONE_GROUPS], vec!["group-a"]);
        assert!(realm_dependents("realm-b", Some("rook-ceph".into()), &[]).is_empty());
    }
}
