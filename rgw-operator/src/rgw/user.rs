//! S3 users managed through radosgw-admin.
//!
//! Only the users the operator needs before the admin-ops API is reachable go
//! through here: the admin-ops user itself and the realm system user.

use serde::Deserialize;
use snafu::ensure;

use super::{
    cli::parse_json,
    context::{ObjectContext, args},
    error::{EmailInUseSnafu, Error, InvalidConfigSnafu, Result, UserKeysMissingSnafu},
};

/// Caps granted to the user the operator signs admin-ops requests with.
pub const ADMIN_OPS_USER_CAPS: &str = "buckets=*;users=*;usage=read;metadata=read;zone=read";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectUser {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub system: bool,
    pub admin_ops: bool,
}

#[derive(Deserialize)]
struct UserInfo {
    user_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    keys: Vec<UserInfoKey>,
}

#[derive(Deserialize)]
struct UserInfoKey {
    access_key: String,
    secret_key: String,
}

fn decode_user(command: &str, output: &str) -> Result<ObjectUser> {
    let info: UserInfo = parse_json(command, output)?;
    let key = info.keys.into_iter().next().ok_or_else(|| {
        UserKeysMissingSnafu {
            uid: info.user_id.clone(),
        }
        .build()
    })?;
    Ok(ObjectUser {
        uid: info.user_id,
        display_name: info.display_name,
        email: Some(info.email).filter(|email| !email.is_empty()),
        access_key: Some(key.access_key),
        secret_key: Some(key.secret_key),
        ..ObjectUser::default()
    })
}

/// Looks up a user. `Ok(None)` when RGW has no such user.
pub async fn get_user(ctx: &ObjectContext, uid: &str) -> Result<Option<ObjectUser>> {
    tracing::debug!(%uid, "getting s3 user");
    match ctx
        .run(&args(["user", "info"], [format!("--uid={uid}")]))
        .await
    {
        Ok(output) if output.contains("no user info saved") => Ok(None),
        Ok(output) => decode_user("radosgw-admin user info", &output).map(Some),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Creates a user. Returns `Ok(None)` when a user with that uid already exists.
pub async fn create_user(
    ctx: &ObjectContext,
    user: &ObjectUser,
    force: bool,
) -> Result<Option<ObjectUser>> {
    ensure!(
        !user.uid.trim().is_empty(),
        InvalidConfigSnafu {
            message: "userId cannot be empty"
        }
    );
    ensure!(
        !user.display_name.is_empty(),
        InvalidConfigSnafu {
            message: "displayName is required"
        }
    );
    tracing::debug!(uid = %user.uid, "creating s3 user");

    let mut create = args(
        ["user", "create"],
        [
            format!("--uid={}", user.uid),
            format!("--display-name={}", user.display_name),
        ],
    );
    if let Some(email) = &user.email {
        create.push(format!("--email={email}"));
    }
    if user.system {
        create.push("--system".to_string());
    }
    if user.admin_ops {
        create.push(format!("--caps={ADMIN_OPS_USER_CAPS}"));
    }
    if let Some(access_key) = &user.access_key {
        create.push(format!("--access-key={access_key}"));
    }
    if let Some(secret_key) = &user.secret_key {
        create.push(format!("--secret={secret_key}"));
    }
    if force {
        create.push("--yes-i-really-mean-it".to_string());
    }

    match ctx.run(&create).await {
        Ok(output) => decode_user("radosgw-admin user create", &output).map(Some),
        Err(err) if err.is_already_exists() => Ok(None),
        Err(Error::CommandFailed { stderr, .. })
            if stderr.contains("could not create user: unable to create user, user: ") =>
        {
            Ok(None)
        }
        Err(Error::CommandFailed { stderr, .. })
            if stderr.contains("is the email address an existing user") =>
        {
            EmailInUseSnafu {
                email: user.email.clone().unwrap_or_default(),
            }
            .fail()
        }
        Err(err) => Err(err),
    }
}

/// Returns the existing user, or creates it.
pub async fn get_or_create_user(ctx: &ObjectContext, user: &ObjectUser) -> Result<ObjectUser> {
    if let Some(existing) = get_user(ctx, &user.uid).await? {
        return Ok(existing);
    }
    match create_user(ctx, user, false).await? {
        Some(created) => Ok(created),
        // Lost a race against another creator; the user is there now.
        None => get_user(ctx, &user.uid).await?.ok_or_else(|| {
            UserKeysMissingSnafu {
                uid: user.uid.clone(),
            }
            .build()
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rgw::{
        cli::testing::{FakeExecutor, cli},
        error::{EXIT_ALREADY_EXISTS, EXIT_NOT_FOUND},
    };

    const USER_INFO: &str = r#"{
        "user_id": "rgw-admin-ops-user",
        "display_name": "RGW Admin Ops User",
        "email": "",
        "keys": [{"user": "rgw-admin-ops-user", "access_key": "AK", "secret_key": "SK"}]
    }"#;

    fn context(executor: Arc<FakeExecutor>) -> ObjectContext {
        ObjectContext::new(cli(executor), "my-store")
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let executor = Arc::new(FakeExecutor::default());
        executor
            .expect("user info", Ok("could not fetch user info: no user info saved"))
            .expect("user info", Err(EXIT_NOT_FOUND));
        let ctx = context(executor);
        assert_eq!(get_user(&ctx, "u").await.unwrap(), None);
        assert_eq!(get_user(&ctx, "u").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_user_decodes_keys() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("user info", Ok(USER_INFO));
        let user = get_user(&context(executor), "rgw-admin-ops-user")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.access_key.as_deref(), Some("AK"));
        assert_eq!(user.email, None);
    }

    #[tokio::test]
    async fn test_create_admin_ops_user_args() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("user create", Ok(USER_INFO));
        let user = ObjectUser {
            uid: "rgw-admin-ops-user".into(),
            display_name: "RGW Admin Ops User".into(),
            admin_ops: true,
            system: true,
            ..ObjectUser::default()
        };
        create_user(&context(executor.clone()), &user, false)
            .await
            .unwrap();
        assert!(executor.commands()[0].starts_with(
            "radosgw-admin user create --uid=rgw-admin-ops-user --display-name=RGW Admin Ops User --system --caps=buckets=*;users=*;usage=read;metadata=read;zone=read"
        ));
    }

    #[tokio::test]
    async fn test_create_existing_user() {
        let executor = Arc::new(FakeExecutor::default());
        executor.expect("user create", Err(EXIT_ALREADY_EXISTS));
        let user = ObjectUser {
            uid: "u".into(),
            display_name: "u".into(),
            ..ObjectUser::default()
        };
        assert_eq!(create_user(&context(executor), &user, false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_user_requires_display_name() {
        let executor = Arc::new(FakeExecutor::default());
        let user = ObjectUser {
            uid: "u".into(),
            ..ObjectUser::default()
        };
        assert!(create_user(&context(executor.clone()), &user, false).await.is_err());
        assert!(executor.commands().is_empty());
    }
}
