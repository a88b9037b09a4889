use async_trait::async_trait;

use crate::{
    error::Result,
    types::{Account, BucketInfo, User, UserRequest},
};

pub const ADMIN_PREFIX: &str = "/admin";
pub const ACCOUNT_RESOURCE: &str = "account";
pub const USER_RESOURCE: &str = "user";
pub const BUCKET_RESOURCE: &str = "bucket";

/// Operations the operator consumes from the RGW admin-ops API.
///
/// Implementations must be safe to share between reconcile workers.
#[async_trait]
pub trait RgwAdminApi: Send + Sync {
    async fn get_account(&self, id: &str) -> Result<Account>;

    async fn create_account(&self, account: &Account) -> Result<Account>;

    async fn modify_account(&self, account: &Account) -> Result<Account>;

    async fn delete_account(&self, id: &str) -> Result<()>;

    async fn get_user(&self, uid: &str) -> Result<User>;

    async fn create_user(&self, user: &UserRequest) -> Result<User>;

    async fn modify_user(&self, user: &UserRequest) -> Result<User>;

    async fn delete_user(&self, uid: &str, purge_data: bool) -> Result<()>;

    async fn list_buckets(&self) -> Result<Vec<String>>;

    async fn list_user_buckets(&self, uid: &str) -> Result<Vec<String>>;

    async fn get_bucket(&self, bucket: &str) -> Result<BucketInfo>;

    async fn delete_bucket(&self, bucket: &str, purge_objects: bool) -> Result<()>;
}
