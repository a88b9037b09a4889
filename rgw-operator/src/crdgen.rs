use rgw_operator::api::{
    account::ObjectStoreAccount, object_store::ObjectStore, realm::ObjectRealm,
    user::ObjectStoreUser, zone::ObjectZone, zone_group::ObjectZoneGroup,
};
use stackable_operator::kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        ObjectRealm::crd(),
        ObjectZoneGroup::crd(),
        ObjectZone::crd(),
        ObjectStore::crd(),
        ObjectStoreUser::crd(),
        ObjectStoreAccount::crd(),
    ];
    let documents = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    print!("{}", documents.join("---\n"));
    Ok(())
}
