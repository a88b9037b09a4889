use serde::Deserialize;

use super::{cli::AdminCli, error::Result};

pub const KEYRING_FILE_NAME: &str = "keyring";
const MON_CAPS: &str = "allow rw";
const OSD_CAPS: &str = "allow rwx";

pub fn cephx_user(store: &str) -> String {
    format!("client.radosgw.gateway-{store}")
}

/// Secret the gateway pods mount their keyring from.
pub fn keyring_secret_name(store: &str) -> String {
    format!("rook-ceph-rgw-{store}-a-keyring")
}

/// Name used by earlier deployments, removed when found.
pub fn legacy_keyring_secret_name(store: &str) -> String {
    format!("rook-ceph-rgw-{store}-keyring")
}

#[derive(Deserialize)]
struct AuthKey {
    key: String,
}

/// Returns the cephx key of the gateway user, creating the user on first use.
pub async fn get_or_create_key(cli: &AdminCli, store: &str) -> Result<String> {
    let user = cephx_user(store);
    let key: AuthKey = cli
        .ceph(&["auth", "get-or-create-key", &user, "mon", MON_CAPS, "osd", OSD_CAPS])
        .await?;
    Ok(key.key)
}

pub async fn delete_key(cli: &AdminCli, store: &str) -> Result<()> {
    match cli.ceph_void(&["auth", "del", &cephx_user(store)]).await {
        Err(err) if err.is_not_found() => Ok(()),
        result => result,
    }
}

/// Keyring file contents for `store`'s gateway user.
pub fn keyring(store: &str, key: &str) -> String {
    format!(
        "[{}]\nkey = {key}\ncaps mon = \"{MON_CAPS}\"\ncaps osd = \"{OSD_CAPS}\"\n",
        cephx_user(store)
    )
}
