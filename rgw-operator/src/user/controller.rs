use std::sync::Arc;

use futures::StreamExt;
use rgw_admin_api::{
    RgwAdminApi,
    types::{User, UserRequest},
};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    client::Client,
    kube::{
        Resource, ResourceExt,
        core::{DeserializeGuard, error_boundary},
        runtime::{Controller, controller::Action, reflector::ObjectRef, watcher},
    },
    logging::controller::report_controller_reconciled,
    namespace::WatchNamespace,
};

use super::error::{
    ApplySecretSnafu, ApplyStatusSnafu, CreateUserSnafu, DeleteUserSnafu, Error, FinalizerSnafu,
    GetUserSnafu, InvalidObjectSnafu, ModifyUserSnafu, ObjectHasNoNamespaceSnafu, Result,
    StoreSnafu, UserKeysMissingSnafu,
};
use crate::{
    OPERATOR_NAME,
    api::{object_store::ObjectStore, status::Phase, user::ObjectStoreUser},
    configuration::secret::Secret,
    reconcile::{
        ClassifyError, RESYNC_INTERVAL, Substrate,
        finalizer::{add_finalizer, finish_deletion, has_finalizer},
        guard::{resource_key, run_guarded},
        status::{is_up_to_date, set_phase, set_ready},
    },
    store::admin::StoreAccess,
};

pub const USER_CONTROLLER_NAME: &str = "objectstoreuser";

pub struct Ctx {
    pub access: StoreAccess,
    pub substrate: Substrate,
}

/// Content of the secret an S3 client of the store reads its credentials from.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserCredentials {
    #[serde(rename = "AccessKey")]
    pub access_key: String,
    #[serde(rename = "SecretKey")]
    pub secret_key: String,
    #[serde(rename = "Endpoint")]
    pub endpoint: String,
}

fn user_request(user: &ObjectStoreUser) -> UserRequest {
    UserRequest {
        caps: user
            .spec
            .capabilities
            .as_ref()
            .and_then(|caps| caps.to_caps_string()),
        max_buckets: user.spec.max_buckets,
        ..UserRequest::new(user.uid(), user.display_name())
    }
}

fn needs_update(request: &UserRequest, live: &User) -> bool {
    request.display_name != live.display_name
        || request
            .max_buckets
            .is_some_and(|max_buckets| max_buckets != live.max_buckets)
}

/// Creates the RGW user of `user`, or brings an existing one in line with it.
pub async fn ensure_user(admin: &dyn RgwAdminApi, user: &ObjectStoreUser) -> Result<User> {
    let request = user_request(user);
    let uid = &request.uid;
    match admin.create_user(&request).await {
        Ok(created) => {
            tracing::info!(%uid, "created s3 user");
            Ok(created)
        }
        Err(err) if err.is_already_exists() => {
            let live = admin.get_user(uid).await.context(GetUserSnafu { uid })?;
            if !needs_update(&request, &live) {
                return Ok(live);
            }
            tracing::info!(%uid, "updating s3 user");
            admin
                .modify_user(&request)
                .await
                .context(ModifyUserSnafu { uid })
        }
        Err(err) => Err(err).context(CreateUserSnafu { uid }),
    }
}

pub fn user_credentials(user: &User, endpoint: &str) -> Result<UserCredentials> {
    let key = user.s3_key().context(UserKeysMissingSnafu {
        uid: &user.user_id,
    })?;
    Ok(UserCredentials {
        access_key: key.access_key.clone(),
        secret_key: key.secret_key.clone(),
        endpoint: endpoint.to_string(),
    })
}

/// Removes the RGW user. A user that is already gone counts as deleted.
///
/// A failed deletion names the buckets the user still owns, but keeps the
/// failure of the delete call as its cause.
pub async fn delete_user(admin: &dyn RgwAdminApi, uid: &str) -> Result<()> {
    match admin.delete_user(uid, false).await {
        Ok(()) => {
            tracing::info!(%uid, "deleted s3 user");
            Ok(())
        }
        Err(err) if err.is_not_found() => {
            tracing::info!(%uid, "s3 user not found, considering deletion successful");
            Ok(())
        }
        Err(err) => {
            let buckets = admin.list_user_buckets(uid).await.unwrap_or_default();
            Err(err).context(DeleteUserSnafu {
                uid,
                buckets: buckets.join(", "),
            })
        }
    }
}

pub async fn reconcile_user(
    user: Arc<DeserializeGuard<ObjectStoreUser>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let user = user
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidObjectSnafu)?;

    let kube = ctx.access.client.as_kube_client();
    run_guarded(&kube, &ctx.substrate, user, reconcile(user, &ctx)).await
}

async fn reconcile(user: &ObjectStoreUser, ctx: &Ctx) -> Result<Action> {
    let kube = ctx.access.client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let namespace = user.namespace().context(ObjectHasNoNamespaceSnafu)?;
    let store = &user.spec.store;

    if user.meta().deletion_timestamp.is_some() {
        if !has_finalizer(user) {
            return Ok(Action::await_change());
        }
        return delete(user, ctx, &namespace).await;
    }
    user.validate()
        .map_err(|message| Error::InvalidSpec { message })?;
    if add_finalizer(&kube, user).await.context(FinalizerSnafu)? {
        return Ok(Action::await_change());
    }
    if !is_up_to_date(user) {
        set_phase(&kube, events, user, Phase::Reconciling, None)
            .await
            .context(ApplyStatusSnafu)?;
    }

    let store_obj = ctx
        .access
        .ready_store(store, &namespace)
        .await
        .context(StoreSnafu { store })?;
    let admin = ctx
        .access
        .admin_api(&store_obj)
        .await
        .context(StoreSnafu { store })?;
    let live = ensure_user(admin.as_ref(), user).await?;

    let secret_name = user.secret_name();
    let credentials = user_credentials(&live, &store_obj.advertise_endpoint())?;
    Secret::new(secret_name.clone(), namespace, credentials)
        .apply(&ctx.access.client, OPERATOR_NAME, user)
        .await
        .context(ApplySecretSnafu {
            secret: &secret_name,
        })?;

    let write = set_ready(&kube, events, user, |status| {
        status.secret_name = Some(secret_name.clone());
    })
    .await
    .context(ApplyStatusSnafu)?;
    Ok(write.next_action(Action::requeue(RESYNC_INTERVAL)))
}

async fn delete(user: &ObjectStoreUser, ctx: &Ctx, namespace: &str) -> Result<Action> {
    let kube = ctx.access.client.as_kube_client();
    let store = &user.spec.store;

    match ctx
        .access
        .existing_store(store, namespace)
        .await
        .context(StoreSnafu { store })?
    {
        Some(store_obj) => {
            let admin = ctx
                .access
                .admin_api(&store_obj)
                .await
                .context(StoreSnafu { store })?;
            delete_user(admin.as_ref(), &user.uid()).await?;
        }
        None => tracing::info!(
            uid = %user.uid(),
            %store,
            "object store is gone, nothing left to delete"
        ),
    }

    finish_deletion(&kube, ctx.substrate.events.as_ref(), user)
        .await
        .context(FinalizerSnafu)?;
    Ok(Action::await_change())
}

pub fn error_policy(
    user: Arc<DeserializeGuard<ObjectStoreUser>>,
    error: &Error,
    ctx: Arc<Ctx>,
) -> Action {
    ctx.substrate
        .error_action(&resource_key(&*user), error.kind())
}

pub async fn create_user_controller(client: &Client, namespace: WatchNamespace, ctx: Ctx) {
    let controller = Controller::new(
        namespace.get_api::<DeserializeGuard<ObjectStoreUser>>(client),
        watcher::Config::default(),
    );
    let users = controller.store();

    controller
        .watches(
            namespace.get_api::<DeserializeGuard<ObjectStore>>(client),
            watcher::Config::default(),
            move |store| {
                users
                    .state()
                    .into_iter()
                    .filter(move |user| {
                        let Ok(user) = &user.0 else {
                            return false;
                        };
                        user.namespace() == store.namespace() && user.spec.store == store.name_any()
                    })
                    .map(|user| ObjectRef::from_obj(&*user))
            },
        )
        .shutdown_on_signal()
        .run(reconcile_user, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                client,
                &format!("{USER_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}
