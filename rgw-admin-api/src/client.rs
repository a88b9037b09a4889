use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, header::AUTHORIZATION};
use s3::creds::time::OffsetDateTime;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    api::{ACCOUNT_RESOURCE, ADMIN_PREFIX, BUCKET_RESOURCE, RgwAdminApi, USER_RESOURCE},
    error::{Result, api_error},
    signing::sign_request,
    types::{Account, BucketInfo, User, UserRequest},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminCredentials {
    pub access_key: String,
    pub secret_key: String,
}

/// Admin-ops client backed by a single `reqwest::Client`.
///
/// Cloning is cheap and every clone shares the connection pool.
#[derive(Clone)]
pub struct RgwAdminClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: AdminCredentials,
    region: String,
    timeout: Option<Duration>,
}

impl RgwAdminClient {
    pub fn new(endpoint: &str, credentials: AdminCredentials) -> Result<RgwAdminClient> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(RgwAdminClient {
            http,
            endpoint: Url::parse(endpoint)?,
            credentials,
            region: DEFAULT_REGION.to_string(),
            timeout: None,
        })
    }

    /// Reuses an existing HTTP client, for instance one shared by all stores.
    pub fn with_http_client(mut self, http: reqwest::Client) -> RgwAdminClient {
        self.http = http;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> RgwAdminClient {
        self.region = region.into();
        self
    }

    /// Returns a client whose requests time out after `timeout` instead of the default.
    pub fn call_timeout(&self, timeout: Duration) -> RgwAdminClient {
        RgwAdminClient {
            timeout: Some(timeout),
            ..self.clone()
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub(crate) fn resource_url(&self, resource: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.endpoint.join(&format!("{ADMIN_PREFIX}/{resource}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        let url = self.resource_url(resource, query)?;
        let signed = sign_request(
            method.as_str(),
            &url,
            b"",
            &self.credentials.access_key,
            &self.credentials.secret_key,
            &self.region,
            OffsetDateTime::now_utc(),
        )?;
        tracing::debug!(%method, resource, "sending admin ops request");

        let mut request = self
            .http
            .request(method, url)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256)
            .header(AUTHORIZATION, signed.authorization);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        Ok(body.to_vec())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let body = self.send(method, resource, query).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn account_query(account: &Account) -> Vec<(&'static str, String)> {
    let mut query = vec![("id", account.id.clone()), ("name", account.name.clone())];
    if !account.email.is_empty() {
        query.push(("email", account.email.clone()));
    }
    if let Some(max_users) = account.max_users {
        query.push(("max-users", max_users.to_string()));
    }
    if let Some(max_buckets) = account.max_buckets {
        query.push(("max-buckets", max_buckets.to_string()));
    }
    query
}

#[async_trait]
impl RgwAdminApi for RgwAdminClient {
    async fn get_account(&self, id: &str) -> Result<Account> {
        self.call(Method::GET, ACCOUNT_RESOURCE, &[("id", id.to_string())])
            .await
    }

    async fn create_account(&self, account: &Account) -> Result<Account> {
        self.call(Method::POST, ACCOUNT_RESOURCE, &account_query(account))
            .await
    }

    async fn modify_account(&self, account: &Account) -> Result<Account> {
        self.call(Method::PUT, ACCOUNT_RESOURCE, &account_query(account))
            .await
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        self.send(Method::DELETE, ACCOUNT_RESOURCE, &[("id", id.to_string())])
            .await?;
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> Result<User> {
        self.call(Method::GET, USER_RESOURCE, &[("uid", uid.to_string())])
            .await
    }

    async fn create_user(&self, user: &UserRequest) -> Result<User> {
        self.call(Method::PUT, USER_RESOURCE, &user.to_query()).await
    }

    async fn modify_user(&self, user: &UserRequest) -> Result<User> {
        self.call(Method::POST, USER_RESOURCE, &user.to_modify_query())
            .await
    }

    async fn delete_user(&self, uid: &str, purge_data: bool) -> Result<()> {
        self.send(
            Method::DELETE,
            USER_RESOURCE,
            &[("uid", uid.to_string()), ("purge-data", purge_data.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        self.call(Method::GET, BUCKET_RESOURCE, &[]).await
    }

    async fn list_user_buckets(&self, uid: &str) -> Result<Vec<String>> {
        self.call(Method::GET, BUCKET_RESOURCE, &[("uid", uid.to_string())])
            .await
    }

    async fn get_bucket(&self, bucket: &str) -> Result<BucketInfo> {
        self.call(
            Method::GET,
            BUCKET_RESOURCE,
            &[("bucket", bucket.to_string())],
        )
        .await
    }

    async fn delete_bucket(&self, bucket: &str, purge_objects: bool) -> Result<()> {
        self.send(
            Method::DELETE,
            BUCKET_RESOURCE,
            &[
                ("bucket", bucket.to_string()),
                ("purge-objects", purge_objects.to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RgwAdminClient {
        RgwAdminClient::new(
            "http://rook-ceph-rgw-my-store.rook-ceph.svc:80",
            AdminCredentials {
                access_key: "a".into(),
                secret_key: "s".into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_resource_url() {
        let url = client()
            .resource_url(ACCOUNT_RESOURCE, &[("id", "RGW12345678901234567".into())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://rook-ceph-rgw-my-store.rook-ceph.svc/admin/account?format=json&id=RGW12345678901234567"
        );
    }

    #[test]
    fn test_resource_url_ignores_endpoint_path() {
        let client = RgwAdminClient::new(
            "https://rgw.example.com:8443/some/path",
            AdminCredentials {
                access_key: "a".into(),
                secret_key: "s".into(),
            },
        )
        .unwrap();
        let url = client
            .resource_url(BUCKET_RESOURCE, &[("bucket", "b 1".into())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://rgw.example.com:8443/admin/bucket?format=json&bucket=b+1"
        );
    }

    #[test]
    fn test_account_query_skips_empty_fields() {
        let query = account_query(&Account {
            id: "RGW1".into(),
            name: "acc".into(),
            ..Account::default()
        });
        assert_eq!(
            query,
            vec![("id", "RGW1".to_string()), ("name", "acc".to_string())]
        );
    }

    #[test]
    fn test_call_timeout_shares_settings() {
        let client = client().with_region("default");
        let short = client.call_timeout(Duration::from_secs(2));
        assert_eq!(short.timeout, Some(Duration::from_secs(2)));
        assert_eq!(short.region, "default");
        assert_eq!(short.endpoint(), client.endpoint());
    }
}
