use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_users: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buckets: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct UserKey {
    #[serde(default)]
    pub user: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct UserCap {
    #[serde(rename = "type")]
    pub kind: String,
    pub perm: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub suspended: i32,
    #[serde(default)]
    pub max_buckets: i64,
    #[serde(default)]
    pub keys: Vec<UserKey>,
    #[serde(default)]
    pub caps: Vec<UserCap>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account_id: String,
}

impl User {
    /// The first S3 key pair of the user, if RGW generated or was given one.
    pub fn s3_key(&self) -> Option<&UserKey> {
        self.keys.first()
    }
}

/// Parameters for creating or modifying a user.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct UserRequest {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Capability string in RGW notation, for instance `buckets=*;users=read`.
    pub caps: Option<String>,
    pub max_buckets: Option<i64>,
    pub system: bool,
    pub account_id: Option<String>,
}

impl UserRequest {
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>) -> UserRequest {
        UserRequest {
            uid: uid.into(),
            display_name: display_name.into(),
            ..UserRequest::default()
        }
    }

    /// Query of a create call. RGW generates a key pair unless one is given.
    pub(crate) fn to_query(&self) -> Vec<(&'static str, String)> {
        self.query(true)
    }

    /// Query of a modify call, which must not add another key pair.
    pub(crate) fn to_modify_query(&self) -> Vec<(&'static str, String)> {
        self.query(false)
    }

    fn query(&self, generate_key: bool) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("uid", self.uid.clone()),
            ("display-name", self.display_name.clone()),
        ];
        if let Some(email) = &self.email {
            query.push(("email", email.clone()));
        }
        match (&self.access_key, &self.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                query.push(("key-type", "s3".to_string()));
                query.push(("access-key", access_key.clone()));
                query.push(("secret-key", secret_key.clone()));
            }
            _ if generate_key => query.push(("generate-key", "true".to_string())),
            _ => {}
        }
        if let Some(caps) = &self.caps {
            query.push(("user-caps", caps.clone()));
        }
        if let Some(max_buckets) = self.max_buckets {
            query.push(("max-buckets", max_buckets.to_string()));
        }
        if self.system {
            query.push(("system", "true".to_string()));
        }
        if let Some(account_id) = &self.account_id {
            query.push(("account-id", account_id.clone()));
        }
        query
    }
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
pub struct BucketInfo {
    pub bucket: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub num_shards: i64,
    #[serde(default)]
    pub placement_rule: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_request_generates_keys_without_explicit_pair() {
        let query = UserRequest::new("alice", "Alice").to_query();
        assert!(query.contains(&("generate-key", "true".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "access-key"));
    }

    #[test]
    fn test_modify_query_keeps_existing_keys() {
        let query = UserRequest::new("alice", "Alice").to_modify_query();
        assert!(!query.iter().any(|(k, _)| *k == "generate-key"));
        assert!(query.contains(&("display-name", "Alice".to_string())));
    }

    #[test]
    fn test_user_request_with_keys_and_caps() {
        let request = UserRequest {
            access_key: Some("AK".into()),
            secret_key: Some("SK".into()),
            caps: Some("buckets=*".into()),
            system: true,
            ..UserRequest::new("sync", "Sync User")
        };
        let query = request.to_query();
        assert!(query.contains(&("access-key", "AK".to_string())));
        assert!(query.contains(&("user-caps", "buckets=*".to_string())));
        assert!(query.contains(&("system", "true".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "generate-key"));
    }

    #[test]
    fn test_decode_user_info() {
        let user: User = serde_json::from_str(
            r#"{"user_id":"u1","display_name":"U","keys":[{"user":"u1","access_key":"a","secret_key":"s"}],"caps":[{"type":"buckets","perm":"*"}]}"#,
        )
        .unwrap();
        assert_eq!(user.s3_key().map(|k| k.access_key.as_str()), Some("a"));
        assert_eq!(user.caps[0].kind, "buckets");
    }
}
