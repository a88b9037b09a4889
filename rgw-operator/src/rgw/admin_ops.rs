//! Access to the RGW admin-ops HTTP API of a store.
//!
//! The operator signs requests as a dedicated user with admin caps. That user is
//! fetched or created through radosgw-admin, so its keys never need to be stored
//! by the operator.

use std::{sync::Arc, time::Duration};

use rgw_admin_api::{AdminCredentials, RgwAdminApi, RgwAdminClient};
use snafu::ResultExt;

use super::{
    context::ObjectContext,
    error::{AdminOpsClientSnafu, Result, UserKeysMissingSnafu},
    user::{ObjectUser, get_or_create_user},
};

pub const ADMIN_OPS_USER: &str = "rgw-admin-ops-user";
const ADMIN_OPS_DISPLAY_NAME: &str = "RGW Admin Ops User";

/// Keys of the admin-ops user in the store's realm, creating the user on first use.
pub async fn admin_ops_credentials(ctx: &ObjectContext) -> Result<AdminCredentials> {
    tracing::debug!(store = %ctx.name, uid = ADMIN_OPS_USER, "getting admin ops user");
    let user = get_or_create_user(
        ctx,
        &ObjectUser {
            uid: ADMIN_OPS_USER.to_string(),
            display_name: ADMIN_OPS_DISPLAY_NAME.to_string(),
            admin_ops: true,
            ..ObjectUser::default()
        },
    )
    .await?;
    match (user.access_key, user.secret_key) {
        (Some(access_key), Some(secret_key)) => Ok(AdminCredentials {
            access_key,
            secret_key,
        }),
        _ => UserKeysMissingSnafu {
            uid: ADMIN_OPS_USER,
        }
        .fail(),
    }
}

/// Builds admin-ops clients. Implementations share one connection pool.
pub trait AdminApiFactory: Send + Sync {
    fn connect(
        &self,
        endpoint: &str,
        credentials: AdminCredentials,
    ) -> rgw_admin_api::Result<Arc<dyn RgwAdminApi>>;
}

pub struct RgwAdminClientFactory {
    http: reqwest::Client,
    timeout: Duration,
}

impl RgwAdminClientFactory {
    pub fn new(timeout: Duration) -> rgw_admin_api::Result<RgwAdminClientFactory> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(RgwAdminClientFactory { http, timeout })
    }
}

impl AdminApiFactory for RgwAdminClientFactory {
    fn connect(
        &self,
        endpoint: &str,
        credentials: AdminCredentials,
    ) -> rgw_admin_api::Result<Arc<dyn RgwAdminApi>> {
        let client = RgwAdminClient::new(endpoint, credentials)?
            .with_http_client(self.http.clone())
            .call_timeout(self.timeout);
        Ok(Arc::new(client))
    }
}

/// An admin-ops client for the store behind `ctx`, talking to `ctx.endpoint`.
pub async fn connect(
    ctx: &ObjectContext,
    factory: &dyn AdminApiFactory,
) -> Result<Arc<dyn RgwAdminApi>> {
    let credentials = admin_ops_credentials(ctx).await?;
    factory
        .connect(&ctx.endpoint, credentials)
        .context(AdminOpsClientSnafu {
            endpoint: &ctx.endpoint,
        })
}

/// Name under which object bucket claims of this operator are provisioned.
pub fn provisioner_name(operator_namespace: &str, prefix: Option<&str>) -> String {
    let prefix = prefix.filter(|prefix| !prefix.is_empty()).unwrap_or(operator_namespace);
    format!("{prefix}.ceph.rook.io/bucket")
}


#[cfg(test)]
mod tests {
    use super::{testing::FakeAdminApiFactory, *};
    use crate::rgw::cli::testing::{FakeExecutor, cli};

    const ADMIN_OPS_USER_INFO: &str = r#"{
        "user_id": "rgw-admin-ops-user",
        "display_name": "RGW Admin Ops User",
        "keys": [{"user": "rgw-admin-ops-user", "access_key": "AK", "secret_key": "SK"}]
    }"#;

    #[test]
    fn test_provisioner_name() {
        assert_eq!(provisioner_name("rook-ceph", None), "rook-ceph.ceph.rook.io/bucket");
        assert_eq!(
            provisioner_name("rook-ceph", Some("my-prefix")),
            "my-prefix.ceph.rook.io/bucket"
        );
        assert_eq!(provisioner_name("rook-ceph", Some("")), "rook-ceph.ceph.rook.io/bucket");
    }

    #[tokio::test]
    async fn test_credentials_of_existing_user() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("user info", Ok(ADMIN_OPS_USER_INFO));
        let ctx = ObjectContext::new(cli(executor.clone()), "my-store");
        let credentials = admin_ops_credentials(&ctx).await.unwrap();
        assert_eq!(credentials.access_key, "AK");
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_creates_missing_user() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("user info", Err(crate::rgw::error::EXIT_NOT_FOUND))
            .expect("user create", Ok(ADMIN_OPS_USER_INFO));
        let ctx = ObjectContext::new(cli(executor.clone()), "my-store")
            .with_endpoint("http://rook-ceph-rgw-my-store.rook-ceph.svc:80");
        let factory = FakeAdminApiFactory(Arc::default());
        connect(&ctx, &factory).await.unwrap();
        assert!(executor.commands()[1].contains("--caps=buckets=*;users=*"));
    }

    #[test]
    fn test_real_factory_rejects_bad_endpoint() {
        let factory = RgwAdminClientFactory::new(Duration::from_secs(1)).unwrap();
        let credentials = AdminCredentials {
            access_key: "AK".into(),
            secret_key: "SK".into(),
        };
        assert!(factory.connect("not a url", credentials).is_err());
    }
}
