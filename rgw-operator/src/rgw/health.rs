//! End-to-end S3 probe of a store's gateway.
//!
//! Every store gets a background task that writes, reads back and deletes an
//! object through the S3 API with a dedicated user, and publishes the outcome
//! in `status.bucketStatus`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use rgw_admin_api::{RgwAdminApi, types::UserKey, types::UserRequest};
use s3::{Bucket, BucketConfiguration, Region, creds::Credentials};
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu, ensure};
use stackable_operator::kube::{self, Api, runtime::reflector::ObjectRef};
use strum::{EnumDiscriminants, IntoStaticStr};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
    api::{
        object_store::ObjectStore,
        status::{BucketStatus, Phase},
    },
    reconcile::status::update_status,
};

pub const HEALTH_USER_PREFIX: &str = "rook-ceph-internal-s3-user-checker-";
pub const HEALTH_OBJECT_KEY: &str = "rookHealthCheckTestObject";
pub const HEALTH_OBJECT_BODY: &str = "Test Rook Object Data";
const CONTENT_TYPE: &str = "plain/text";
const S3_REGION: &str = "us-east-1";

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to {operation} s3 user {uid}"))]
    HealthUser {
        source: rgw_admin_api::Error,
        operation: &'static str,
        uid: String,
    },

    #[snafu(display("s3 user {uid} has no keys"))]
    HealthUserKeys { uid: String },

    #[snafu(display("invalid s3 credentials"))]
    S3Credentials {
        source: s3::creds::error::CredentialsError,
    },

    #[snafu(display("failed to {operation} in bucket {bucket}"))]
    S3Request {
        source: s3::error::S3Error,
        operation: &'static str,
        bucket: String,
    },

    #[snafu(display("failed to {operation} in bucket {bucket}: status {status}"))]
    S3Status {
        operation: &'static str,
        bucket: String,
        status: u16,
    },

    #[snafu(display("wrong file content, old file hash is {expected:?} and new one is {got:?}"))]
    ContentMismatch { expected: String, got: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub fn health_user(store_uid: &str) -> String {
    format!("{HEALTH_USER_PREFIX}{store_uid}")
}

pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Folds a probe outcome into the previous bucket status.
///
/// `lastChanged` moves only when the health or the details differ from before.
pub fn next_bucket_status(
    current: Option<&BucketStatus>,
    health: Phase,
    details: &str,
    now: &str,
) -> BucketStatus {
    let last_changed = match current {
        Some(current) if current.health == health && current.details == details => {
            current.last_changed.clone()
        }
        _ => now.to_string(),
    };
    BucketStatus {
        health,
        details: details.to_string(),
        last_checked: now.to_string(),
        last_changed,
    }
}

/// Object operations the probe needs from one bucket.
#[async_trait]
pub trait S3Target: Send + Sync {
    async fn ensure_bucket(&self) -> Result<()>;

    async fn put_object(&self, key: &str, body: &[u8]) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

pub trait S3Connector: Send + Sync {
    fn connect(&self, endpoint: &str, bucket: &str, key: &UserKey) -> Result<Box<dyn S3Target>>;
}

/// Path-style buckets through rust-s3.
pub struct RustS3Connector;

struct RustS3Target {
    bucket: Box<Bucket>,
    name: String,
    region: Region,
    credentials: Credentials,
}

impl S3Connector for RustS3Connector {
    fn connect(&self, endpoint: &str, bucket: &str, key: &UserKey) -> Result<Box<dyn S3Target>> {
        let credentials = Credentials::new(
            Some(&key.access_key),
            Some(&key.secret_key),
            None,
            None,
            None,
        )
        .context(S3CredentialsSnafu)?;
        let region = Region::Custom {
            region: S3_REGION.to_string(),
            endpoint: endpoint.to_string(),
        };
        let handle = Bucket::new(bucket, region.clone(), credentials.clone())
            .context(S3RequestSnafu {
                operation: "open bucket",
                bucket,
            })?
            .with_path_style();
        Ok(Box::new(RustS3Target {
            bucket: handle,
            name: bucket.to_string(),
            region,
            credentials,
        }))
    }
}

impl RustS3Target {
    fn check_status(&self, operation: &'static str, status: u16) -> Result<()> {
        ensure!(
            (200..300).contains(&status),
            S3StatusSnafu {
                operation,
                bucket: &self.name,
                status,
            }
        );
        Ok(())
    }
}

#[async_trait]
impl S3Target for RustS3Target {
    async fn ensure_bucket(&self) -> Result<()> {
        let exists = self.bucket.exists().await.context(S3RequestSnafu {
            operation: "check bucket",
            bucket: &self.name,
        })?;
        if exists {
            return Ok(());
        }
        tracing::debug!(bucket = %self.name, "creating health check bucket");
        let response = Bucket::create_with_path_style(
            &self.name,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        .context(S3RequestSnafu {
            operation: "create bucket",
            bucket: &self.name,
        })?;
        self.check_status("create bucket", response.response_code)
    }

    async fn put_object(&self, key: &str, body: &[u8]) -> Result<()> {
        let response = self
            .bucket
            .put_object_with_content_type(key, body, CONTENT_TYPE)
            .await
            .context(S3RequestSnafu {
                operation: "put object",
                bucket: &self.name,
            })?;
        self.check_status("put object", response.status_code())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self.bucket.get_object(key).await.context(S3RequestSnafu {
            operation: "get object",
            bucket: &self.name,
        })?;
        self.check_status("get object", response.status_code())?;
        Ok(response.bytes().to_vec())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .context(S3RequestSnafu {
                operation: "delete object",
                bucket: &self.name,
            })?;
        self.check_status("delete object", response.status_code())
    }
}

/// Receives probe outcomes.
#[async_trait]
pub trait BucketStatusSink: Send + Sync {
    async fn record(&self, store: &ObjectRef<ObjectStore>, health: Phase, details: String);
}

/// Writes probe outcomes into the store status.
pub struct KubeBucketStatusSink {
    client: kube::Client,
}

impl KubeBucketStatusSink {
    pub fn new(client: kube::Client) -> KubeBucketStatusSink {
        KubeBucketStatusSink { client }
    }
}

#[async_trait]
impl BucketStatusSink for KubeBucketStatusSink {
    async fn record(&self, store: &ObjectRef<ObjectStore>, health: Phase, details: String) {
        let namespace = store.namespace.clone().unwrap_or_default();
        let api: Api<ObjectStore> = Api::namespaced(self.client.clone(), &namespace);
        let current = match api.get_opt(&store.name).await {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(
                    store = %store.name,
                    %error,
                    "failed to read object store for bucket status"
                );
                return;
            }
        };
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let write = update_status(&self.client, &current, |status| {
            let next = next_bucket_status(status.bucket_status.as_ref(), health, &details, &now);
            status.bucket_status = Some(next);
        })
        .await;
        if let Err(error) = write {
            tracing::warn!(store = %store.name, %error, "failed to update bucket status");
        }
    }
}

/// What a running probe was started with. A change restarts the probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSettings {
    pub endpoint: String,
    pub interval: Duration,
}

/// A single store's probe.
pub struct BucketProbe {
    pub store: ObjectRef<ObjectStore>,
    pub store_uid: String,
    pub bucket: String,
    pub settings: ProbeSettings,
    pub admin: Arc<dyn RgwAdminApi>,
    pub connector: Arc<dyn S3Connector>,
    pub sink: Arc<dyn BucketStatusSink>,
}

impl BucketProbe {
    fn user_request(&self) -> UserRequest {
        let uid = health_user(&self.store_uid);
        UserRequest::new(uid.clone(), uid)
    }

    async fn health_user_key(&self) -> Result<UserKey> {
        let request = self.user_request();
        let user = match self.admin.create_user(&request).await {
            Ok(user) => user,
            Err(err) if err.is_already_exists() => {
                self.admin
                    .get_user(&request.uid)
                    .await
                    .context(HealthUserSnafu {
                        operation: "get",
                        uid: &request.uid,
                    })?
            }
            Err(err) => {
                return Err(err).context(HealthUserSnafu {
                    operation: "create",
                    uid: &request.uid,
                });
            }
        };
        user.s3_key()
            .cloned()
            .ok_or_else(|| HealthUserKeysSnafu { uid: request.uid }.build())
    }

    /// One probe cycle. The test object is removed whatever the outcome.
    pub async fn check(&self) -> Result<()> {
        let key = self.health_user_key().await?;
        let target = self
            .connector
            .connect(&self.settings.endpoint, &self.bucket, &key)?;

        if let Err(error) = target.delete_object(HEALTH_OBJECT_KEY).await {
            tracing::debug!(
                bucket = %self.bucket,
                %error,
                "no stale health check object to delete"
            );
        }
        let result = round_trip(target.as_ref()).await;
        if let Err(error) = target.delete_object(HEALTH_OBJECT_KEY).await {
            tracing::error!(bucket = %self.bucket, %error, "failed to delete health check object");
        }
        result
    }

    pub async fn check_and_record(&self) {
        match self.check().await {
            Ok(()) => {
                tracing::debug!(
                    store = %self.store.name,
                    "successfully checked object store endpoint"
                );
                self.sink
                    .record(&self.store, Phase::Connected, String::new())
                    .await;
            }
            Err(error) => {
                tracing::debug!(store = %self.store.name, %error, "failed to check rgw health");
                self.sink
                    .record(&self.store, Phase::Failure, error.to_string())
                    .await;
            }
        }
    }

    /// Removes the health bucket with its objects and the health user.
    pub async fn teardown(&self) {
        match self.admin.delete_bucket(&self.bucket, true).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::debug!(bucket = %self.bucket, "health check bucket does not exist")
            }
            Err(error) => {
                tracing::error!(
                    bucket = %self.bucket,
                    store = %self.store.name,
                    %error,
                    "failed to delete health check bucket"
                )
            }
        }
        let uid = health_user(&self.store_uid);
        match self.admin.delete_user(&uid, false).await {
            Ok(()) => tracing::debug!(%uid, "deleted health check user"),
            Err(err) if err.is_not_found() => {}
            Err(error) => {
                tracing::error!(
                    %uid,
                    store = %self.store.name,
                    %error,
                    "failed to delete health check user"
                )
            }
        }
    }

    async fn run(self, mut stop: oneshot::Receiver<Stop>) {
        tracing::info!(
            store = %self.store.name,
            interval = ?self.settings.interval,
            "starting bucket health probe"
        );
        loop {
            self.check_and_record().await;
            tokio::select! {
                signal = &mut stop => {
                    if let Ok(Stop::Teardown) = signal {
                        self.teardown().await;
                    }
                    tracing::info!(store = %self.store.name, "stopping bucket health probe");
                    return;
                }
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }
}

async fn round_trip(target: &dyn S3Target) -> Result<()> {
    target.ensure_bucket().await?;
    target
        .put_object(HEALTH_OBJECT_KEY, HEALTH_OBJECT_BODY.as_bytes())
        .await?;
    let read = target.get_object(HEALTH_OBJECT_KEY).await?;
    let expected = content_hash(HEALTH_OBJECT_BODY.as_bytes());
    let got = content_hash(&read);
    ensure!(expected == got, ContentMismatchSnafu { expected, got });
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// The probe is replaced; the health user and bucket stay.
    Restart,
    /// The store is going away.
    Teardown,
}

struct ProbeHandle {
    settings: ProbeSettings,
    stop: oneshot::Sender<Stop>,
    task: JoinHandle<()>,
}

/// Running probes, one per store.
#[derive(Default)]
pub struct ProbeRegistry {
    probes: DashMap<ObjectRef<ObjectStore>, ProbeHandle>,
}

impl ProbeRegistry {
    /// Starts the probe unless one with the same settings is already running.
    ///
    /// Returns whether a task was spawned.
    pub fn ensure(&self, probe: BucketProbe) -> bool {
        let key = probe.store.clone();
        if let Some(existing) = self.probes.get(&key) {
            if existing.settings == probe.settings && !existing.task.is_finished() {
                return false;
            }
        }
        if let Some((_, previous)) = self.probes.remove(&key) {
            let _ = previous.stop.send(Stop::Restart);
        }
        let (stop, receiver) = oneshot::channel();
        let settings = probe.settings.clone();
        let task = tokio::spawn(probe.run(receiver));
        self.probes.insert(
            key,
            ProbeHandle {
                settings,
                stop,
                task,
            },
        );
        true
    }

    /// Stops the probe of `store`, deleting its user and bucket, and waits for it to finish.
    pub async fn teardown(&self, store: &ObjectRef<ObjectStore>) -> bool {
        let Some((_, handle)) = self.probes.remove(store) else {
            return false;
        };
        let _ = handle.stop.send(Stop::Teardown);
        if let Err(error) = handle.task.await {
            tracing::warn!(store = %store.name, %error, "bucket health probe ended abnormally");
        }
        true
    }

    /// Stops the probe without touching its user and bucket.
    pub fn stop(&self, store: &ObjectRef<ObjectStore>) -> bool {
        match self.probes.remove(store) {
            Some((_, handle)) => {
                let _ = handle.stop.send(Stop::Restart);
                true
            }
            None => false,
        }
    }

    /// Whether a probe started with `settings` is still running for `store`.
    pub fn is_current(&self, store: &ObjectRef<ObjectStore>, settings: &ProbeSettings) -> bool {
        self.probes
            .get(store)
            .is_some_and(|handle| handle.settings == *settings && !handle.task.is_finished())
    }

    pub fn is_running(&self, store: &ObjectRef<ObjectStore>) -> bool {
        self.probes
            .get(store)
            .is_some_and(|handle| !handle.task.is_finished())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// In-memory bucket; `corrupt` makes reads return different content.
    #[derive(Default)]
    pub struct MemoryTarget {
        pub objects: Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
        pub calls: Mutex<Vec<String>>,
        pub corrupt: bool,
    }

    #[async_trait]
    impl S3Target for Arc<MemoryTarget> {
        async fn ensure_bucket(&self) -> Result<()> {
            self.calls.lock().unwrap().push("ensure_bucket".into());
            Ok(())
        }

        async fn put_object(&self, key: &str, body: &[u8]) -> Result<()> {
            self.calls.lock().unwrap().push(format!("put {key}"));
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), body.to_vec());
            Ok(())
        }

        async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(format!("get {key}"));
            let mut body = self
                .objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .unwrap_or_default();
            if self.corrupt {
                body.push(b'!');
            }
            Ok(body)
        }

        async fn delete_object(&self, key: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete {key}"));
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }
    }

    pub struct MemoryConnector(pub Arc<MemoryTarget>);

    impl S3Connector for MemoryConnector {
        fn connect(
            &self,
            _endpoint: &str,
            _bucket: &str,
            _key: &UserKey,
        ) -> Result<Box<dyn S3Target>> {
            Ok(Box::new(self.0.clone()))
        }
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub records: Mutex<Vec<(Phase, String)>>,
    }

    #[async_trait]
    impl BucketStatusSink for RecordingSink {
        async fn record(&self, _store: &ObjectRef<ObjectStore>, health: Phase, details: String) {
            self.records.lock().unwrap().push((health, details));
        }
    }
}
