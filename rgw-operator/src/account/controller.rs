use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use rgw_admin_api::{RgwAdminApi, RgwErrorCode, types::Account};
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    client::Client,
    kube::{
        self, Api, Resource, ResourceExt,
        api::{Patch, PatchParams},
        core::{DeserializeGuard, error_boundary},
        runtime::{Controller, controller::Action, reflector::ObjectRef, watcher},
    },
    logging::controller::report_controller_reconciled,
    namespace::WatchNamespace,
};

use super::error::{
    AccountConflictSnafu, ApplyStatusSnafu, BookmarkSnafu, CreateAccountSnafu, DeleteAccountSnafu,
    Error, FinalizerSnafu, ForeignAccountSnafu, GetAccountSnafu, InvalidObjectSnafu,
    ModifyAccountSnafu, ObjectHasNoNamespaceSnafu, Result, StoreSnafu, UidNotHexSnafu,
    UidTooShortSnafu,
};
use crate::{
    OPERATOR_NAME,
    api::{
        account::{ACCOUNT_ID_ANNOTATION, ObjectStoreAccount},
        object_store::ObjectStore,
        status::Phase,
    },
    reconcile::{
        ClassifyError, RESYNC_INTERVAL, Substrate,
        finalizer::{add_finalizer, finish_deletion, has_finalizer},
        guard::{resource_key, run_guarded},
        status::{is_up_to_date, set_phase, set_ready},
    },
    store::admin::StoreAccess,
};

pub const ACCOUNT_CONTROLLER_NAME: &str = "objectstoreaccount";

pub struct Ctx {
    pub access: StoreAccess,
    pub substrate: Substrate,
}

/// Records the account ID on the resource before the account is created in RGW.
#[async_trait]
pub trait AccountBookmark: Send + Sync {
    async fn record(&self, account: &ObjectStoreAccount, id: &str) -> Result<(), kube::Error>;
}

pub struct KubeAccountBookmark {
    client: kube::Client,
}

#[async_trait]
impl AccountBookmark for KubeAccountBookmark {
    async fn record(&self, account: &ObjectStoreAccount, id: &str) -> Result<(), kube::Error> {
        let api: Api<ObjectStoreAccount> =
            Api::namespaced(self.client.clone(), &account.namespace().unwrap_or_default());
        let patch = serde_json::json!({
            "metadata": { "annotations": { ACCOUNT_ID_ANNOTATION: id } }
        });
        api.patch(&account.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Derives a stable account ID from a Kubernetes UID.
///
/// The last 12 and the first 2 hex digits of the UID are read as one 56 bit
/// number and printed as `RGW` followed by 17 decimal digits.
pub fn generate_account_id(uid: &str) -> Result<String> {
    if uid.len() < 14 {
        return UidTooShortSnafu { uid }.fail();
    }
    let value = uid
        .get(uid.len() - 12..)
        .zip(uid.get(..2))
        .and_then(|(last, first)| u64::from_str_radix(&format!("{last}{first}"), 16).ok())
        .context(UidNotHexSnafu { uid })?;
    Ok(format!("RGW{value:017}"))
}

/// The account ID persisted on the resource, if any. Never generates one.
pub fn recorded_account_id(account: &ObjectStoreAccount) -> Option<&str> {
    account
        .spec_account_id()
        .or_else(|| account.status_account_id())
        .or_else(|| account.annotated_account_id())
}

pub fn desired_account_id(account: &ObjectStoreAccount) -> Result<String> {
    if let Some(id) = recorded_account_id(account) {
        return Ok(id.to_string());
    }
    let uid = account.uid().unwrap_or_default();
    tracing::info!(
        account = %account.name_any(),
        "generating RGW account ID from the resource UID"
    );
    generate_account_id(&uid)
}

fn desired_account(account: &ObjectStoreAccount, id: String) -> Account {
    Account {
        id,
        name: account.account_name(),
        email: account.spec.email.clone().unwrap_or_default(),
        max_users: account.spec.max_users,
        max_buckets: account.spec.max_buckets,
        ..Account::default()
    }
}

/// Only fields the resource sets are compared, RGW fills in the rest.
fn is_in_sync(desired: &Account, live: &Account) -> bool {
    desired.name == live.name
        && (desired.email.is_empty() || desired.email == live.email)
        && (desired.max_users.is_none() || desired.max_users == live.max_users)
        && (desired.max_buckets.is_none() || desired.max_buckets == live.max_buckets)
}

fn has_ownership_proof(account: &ObjectStoreAccount, id: &str) -> bool {
    account.status_account_id() == Some(id) || account.annotated_account_id() == Some(id)
}

/// Creates or updates the RGW account of `account` and returns its ID.
///
/// An existing account is only touched when the resource already recorded its
/// ID, so a foreign account with a colliding ID is never adopted.
pub async fn ensure_account(
    admin: &dyn RgwAdminApi,
    bookmark: &dyn AccountBookmark,
    account: &ObjectStoreAccount,
) -> Result<String> {
    let desired = desired_account(account, desired_account_id(account)?);
    let name = account.name_any();

    match admin.get_account(&desired.id).await {
        Ok(live) => {
            if !has_ownership_proof(account, &desired.id) {
                return ForeignAccountSnafu { id: desired.id }.fail();
            }
            if is_in_sync(&desired, &live) {
                tracing::debug!(%name, id = %desired.id, "account is up to date");
                return Ok(live.id);
            }
            tracing::info!(%name, id = %desired.id, "updating account");
            let updated = admin
                .modify_account(&desired)
                .await
                .context(ModifyAccountSnafu { id: &desired.id })?;
            Ok(updated.id)
        }
        Err(err) if err.is_not_found() => {
            if account.annotated_account_id() != Some(desired.id.as_str()) {
                bookmark
                    .record(account, &desired.id)
                    .await
                    .context(BookmarkSnafu { id: &desired.id })?;
            }
            tracing::info!(%name, id = %desired.id, account = %desired.name, "creating account");
            match admin.create_account(&desired).await {
                Ok(created) => Ok(created.id),
                Err(err) if err.code() == Some(&RgwErrorCode::AccountAlreadyExists) => {
                    AccountConflictSnafu {
                        id: desired.id,
                        name: desired.name,
                    }
                    .fail()
                }
                Err(err) => Err(err).context(CreateAccountSnafu { name: desired.name }),
            }
        }
        Err(err) => Err(err).context(GetAccountSnafu { id: desired.id }),
    }
}

/// Deletes the account recorded on `account`. A missing ID or account is success.
pub async fn delete_account(admin: &dyn RgwAdminApi, account: &ObjectStoreAccount) -> Result<()> {
    let Some(id) = recorded_account_id(account) else {
        tracing::info!(account = %account.name_any(), "no account ID recorded, skipping deletion");
        return Ok(());
    };
    match admin.delete_account(id).await {
        Ok(()) => {
            tracing::info!(%id, "deleted account");
            Ok(())
        }
        Err(err) if err.is_not_found() => {
            tracing::info!(%id, "account not found, considering deletion successful");
            Ok(())
        }
        Err(err) => Err(err).context(DeleteAccountSnafu { id }),
    }
}

pub async fn reconcile_account(
    account: Arc<DeserializeGuard<ObjectStoreAccount>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let account = account
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidObjectSnafu)?;

    let kube = ctx.access.client.as_kube_client();
    run_guarded(&kube, &ctx.substrate, account, reconcile(account, &ctx)).await
}

async fn reconcile(account: &ObjectStoreAccount, ctx: &Ctx) -> Result<Action> {
    let kube = ctx.access.client.as_kube_client();
    let events = ctx.substrate.events.as_ref();
    let namespace = account.namespace().context(ObjectHasNoNamespaceSnafu)?;
    let store = &account.spec.store;

    if account.meta().deletion_timestamp.is_some() {
        if !has_finalizer(account) {
            return Ok(Action::await_change());
        }
        return delete(account, ctx, &namespace).await;
    }
    account
        .validate()
        .map_err(|message| Error::InvalidSpec { message })?;
    if add_finalizer(&kube, account).await.context(FinalizerSnafu)? {
        return Ok(Action::await_change());
    }
    if !is_up_to_date(account) {
        set_phase(&kube, events, account, Phase::Reconciling, None)
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
    let bookmark = KubeAccountBookmark {
        client: kube.clone(),
    };
    let id = ensure_account(admin.as_ref(), &bookmark, account).await?;

    let write = set_ready(&kube, events, account, |status| {
        status.account_id = Some(id.clone());
    })
    .await
    .context(ApplyStatusSnafu)?;
    Ok(write.next_action(Action::requeue(RESYNC_INTERVAL)))
}

async fn delete(account: &ObjectStoreAccount, ctx: &Ctx, namespace: &str) -> Result<Action> {
    let kube = ctx.access.client.as_kube_client();
    let store = &account.spec.store;

    let store_obj = match recorded_account_id(account) {
        Some(_) => ctx
            .access
            .existing_store(store, namespace)
            .await
            .context(StoreSnafu { store })?,
        None => None,
    };
    match store_obj {
        Some(store_obj) => {
            let admin = ctx
                .access
                .admin_api(&store_obj)
                .await
                .context(StoreSnafu { store })?;
            delete_account(admin.as_ref(), account).await?;
        }
        None => tracing::info!(account = %account.name_any(), %store, "no account to delete"),
    }

    finish_deletion(&kube, ctx.substrate.events.as_ref(), account)
        .await
        .context(FinalizerSnafu)?;
    Ok(Action::await_change())
}

pub fn error_policy(
    account: Arc<DeserializeGuard<ObjectStoreAccount>>,
    error: &Error,
    ctx: Arc<Ctx>,
) -> Action {
    ctx.substrate
        .error_action(&resource_key(&*account), error.kind())
}

pub async fn create_account_controller(client: &Client, namespace: WatchNamespace, ctx: Ctx) {
    let controller = Controller::new(
        namespace.get_api::<DeserializeGuard<ObjectStoreAccount>>(client),
        watcher::Config::default(),
    );
    let accounts = controller.store();

    controller
        .watches(
            namespace.get_api::<DeserializeGuard<ObjectStore>>(client),
            watcher::Config::default(),
            move |store| {
                accounts
                    .state()
                    .into_iter()
                    .filter(move |account| {
                        let Ok(account) = &account.0 else {
                            return false;
                        };
                        account.namespace() == store.namespace()
                            && account.spec.store == store.name_any()
                    })
                    .map(|account| ObjectRef::from_obj(&*account))
            },
        )
        .shutdown_on_signal()
        .run(reconcile_account, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                client,
                &format!("{ACCOUNT_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, atomic::Ordering};

    use super::*;
    use crate::{
        api::account::ObjectStoreAccountStatus, reconcile::ErrorKind,
        rgw::admin_ops::testing::FakeAdminApi,
    };

    const UID: &str = "a675dfa7-a785-40a3-b690-eb1e33c1dbdb";
    const GENERATED_ID: &str = "RGW66179827171580838";

    #[derive(Default)]
    struct RecordingBookmark {
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AccountBookmark for RecordingBookmark {
        async fn record(&self, _account: &ObjectStoreAccount, id: &str) -> Result<(), kube::Error> {
            self.ids.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    fn account(extra_metadata: &str, extra_spec: &str) -> ObjectStoreAccount {
        serde_yaml::from_str(&format!(
            r#"
apiVersion: ceph.rook.io/v1
kind: ObjectStoreAccount
metadata:
  name: my-account
  namespace: rook-ceph
  uid: {UID}
{extra_metadata}
spec:
  store: my-store
{extra_spec}
"#
        ))
        .unwrap()
    }

    fn live(id: &str, name: &str) -> Account {
        Account {
            id: id.to_string(),
            name: name.to_string(),
            ..Account::default()
        }
    }

    #[test]
    fn test_generate_account_id() {
        assert_eq!(generate_account_id(UID).unwrap(), GENERATED_ID);
        assert_eq!(generate_account_id(UID).unwrap(), generate_account_id(UID).unwrap());
        assert_ne!(
            generate_account_id(UID).unwrap(),
            generate_account_id("f47ac10b-58cc-4372-a567-0e02b2c3d479").unwrap()
        );

        let id = generate_account_id("f47ac10b-58cc-4372-a567-0e02b2c3d479").unwrap();
        assert_eq!(id.len(), 20);
        assert!(id[3..].bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_generate_account_id_rejects_bad_uids() {
        let err = generate_account_id("short").unwrap_err();
        assert!(matches!(err, Error::UidTooShort { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(matches!(
            generate_account_id("zzzzzzzzzzzzzz").unwrap_err(),
            Error::UidNotHex { .. }
        ));
    }

    #[test]
    fn test_desired_account_id_precedence() {
        let mut account = account(
            "  annotations:\n    ceph.rook.io/account-id: RGW00000000000000003",
            "",
        );
        assert_eq!(desired_account_id(&account).unwrap(), "RGW00000000000000003");
        account.status = Some(ObjectStoreAccountStatus {
            account_id: Some("RGW00000000000000002".into()),
            ..ObjectStoreAccountStatus::default()
        });
        assert_eq!(desired_account_id(&account).unwrap(), "RGW00000000000000002");
        account.spec.account_id = Some("RGW00000000000000001".into());
        assert_eq!(desired_account_id(&account).unwrap(), "RGW00000000000000001");
    }

    #[tokio::test]
    async fn test_first_account_creation() {
        let admin = FakeAdminApi::default();
        let bookmark = RecordingBookmark::default();
        let id = ensure_account(&admin, &bookmark, &account("", "")).await.unwrap();

        assert_eq!(id, GENERATED_ID);
        assert_eq!(*bookmark.ids.lock().unwrap(), vec![GENERATED_ID.to_string()]);
        assert_eq!(
            admin.calls(),
            vec![format!("create_account {GENERATED_ID} my-account")]
        );
        assert_eq!(admin.accounts.len(), 1);
        assert_eq!(admin.accounts.get(GENERATED_ID).unwrap().name, "my-account");
    }

    #[tokio::test]
    async fn test_crash_recovery_adopts_bookmarked_account() {
        let admin = FakeAdminApi::default();
        admin
            .accounts
            .insert(GENERATED_ID.into(), live(GENERATED_ID, "my-account"));
        let bookmark = RecordingBookmark::default();
        let account = account(
            &format!("  annotations:\n    ceph.rook.io/account-id: {GENERATED_ID}"),
            "",
        );

        let id = ensure_account(&admin, &bookmark, &account).await.unwrap();
        assert_eq!(id, GENERATED_ID);
        assert!(admin.calls().is_empty());
        assert!(bookmark.ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_account_is_refused() {
        let foreign_id = "RGW12345678901234567";
        let admin = FakeAdminApi::default();
        admin
            .accounts
            .insert(foreign_id.into(), live(foreign_id, "foreign-account"));
        let bookmark = RecordingBookmark::default();
        let account = account("", &format!("  accountID: {foreign_id}"));

        let err = ensure_account(&admin, &bookmark, &account).await.unwrap_err();
        assert!(err.to_string().contains("refusing to adopt a foreign account"));
        assert_eq!(err.kind(), ErrorKind::ForeignAccount);
        assert!(admin.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rename_owned_account() {
        let admin = FakeAdminApi::default();
        admin
            .accounts
            .insert(GENERATED_ID.into(), live(GENERATED_ID, "old-name"));
        let mut account = account("", "  name: new-name");
        account.status = Some(ObjectStoreAccountStatus {
            account_id: Some(GENERATED_ID.into()),
            ..ObjectStoreAccountStatus::default()
        });

        let id = ensure_account(&admin, &RecordingBookmark::default(), &account)
            .await
            .unwrap();
        assert_eq!(id, GENERATED_ID);
        assert_eq!(
            admin.calls(),
            vec![format!("modify_account {GENERATED_ID} new-name")]
        );
    }

    #[tokio::test]
    async fn test_create_conflict_is_not_adopted() {
        let admin = FakeAdminApi::default();
        admin.account_create_conflict.store(true, Ordering::SeqCst);
        let bookmark = RecordingBookmark::default();

        let err = ensure_account(&admin, &bookmark, &account("", "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(bookmark.ids.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_account() {
        let admin = FakeAdminApi::default();
        delete_account(&admin, &account("", "")).await.unwrap();
        assert!(admin.calls().is_empty());

        let mut owned = account("", "");
        owned.status = Some(ObjectStoreAccountStatus {
            account_id: Some(GENERATED_ID.into()),
            ..ObjectStoreAccountStatus::default()
        });
        delete_account(&admin, &owned).await.unwrap();
        assert_eq!(admin.calls(), vec![format!("delete_account {GENERATED_ID}")]);

        admin
            .accounts
            .insert(GENERATED_ID.into(), live(GENERATED_ID, "my-account"));
        delete_account(&admin, &owned).await.unwrap();
        assert!(admin.accounts.is_empty());
    }
}
