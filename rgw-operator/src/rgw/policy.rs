//! S3 bucket policy documents.
//!
//! Exported at the crate root for bucket provisioners built on this crate. The
//! controllers of this operator write no bucket policies themselves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const POLICY_VERSION: &str = "2012-10-17";
const AWS_PRINCIPAL: &str = "AWS";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, strum::AsRefStr)]
pub enum Action {
    #[serde(rename = "s3:*")]
    #[strum(serialize = "s3:*")]
    All,
    #[serde(rename = "s3:AbortMultipartUpload")]
    #[strum(serialize = "s3:AbortMultipartUpload")]
    AbortMultipartUpload,
    #[serde(rename = "s3:CreateBucket")]
    #[strum(serialize = "s3:CreateBucket")]
    CreateBucket,
    #[serde(rename = "s3:DeleteBucket")]
    #[strum(serialize = "s3:DeleteBucket")]
    DeleteBucket,
    #[serde(rename = "s3:DeleteBucketPolicy")]
    #[strum(serialize = "s3:DeleteBucketPolicy")]
    DeleteBucketPolicy,
    #[serde(rename = "s3:DeleteObject")]
    #[strum(serialize = "s3:DeleteObject")]
    DeleteObject,
    #[serde(rename = "s3:DeleteObjectVersion")]
    #[strum(serialize = "s3:DeleteObjectVersion")]
    DeleteObjectVersion,
    #[serde(rename = "s3:GetBucketAcl")]
    #[strum(serialize = "s3:GetBucketAcl")]
    GetBucketAcl,
    #[serde(rename = "s3:GetBucketLocation")]
    #[strum(serialize = "s3:GetBucketLocation")]
    GetBucketLocation,
    #[serde(rename = "s3:GetBucketPolicy")]
    #[strum(serialize = "s3:GetBucketPolicy")]
    GetBucketPolicy,
    #[serde(rename = "s3:GetBucketVersioning")]
    #[strum(serialize = "s3:GetBucketVersioning")]
    GetBucketVersioning,
    #[serde(rename = "s3:GetLifecycleConfiguration")]
    #[strum(serialize = "s3:GetLifecycleConfiguration")]
    GetLifecycleConfiguration,
    #[serde(rename = "s3:GetObject")]
    #[strum(serialize = "s3:GetObject")]
    GetObject,
    #[serde(rename = "s3:GetObjectAcl")]
    #[strum(serialize = "s3:GetObjectAcl")]
    GetObjectAcl,
    #[serde(rename = "s3:GetObjectVersion")]
    #[strum(serialize = "s3:GetObjectVersion")]
    GetObjectVersion,
    #[serde(rename = "s3:ListAllMyBuckets")]
    #[strum(serialize = "s3:ListAllMyBuckets")]
    ListAllMyBuckets,
    #[serde(rename = "s3:ListBucket")]
    #[strum(serialize = "s3:ListBucket")]
    ListBucket,
    #[serde(rename = "s3:ListBucketMultiPartUploads")]
    #[strum(serialize = "s3:ListBucketMultiPartUploads")]
    ListBucketMultiPartUploads,
    #[serde(rename = "s3:ListBucketVersions")]
    #[strum(serialize = "s3:ListBucketVersions")]
    ListBucketVersions,
    #[serde(rename = "s3:ListMultipartUploadParts")]
    #[strum(serialize = "s3:ListMultipartUploadParts")]
    ListMultipartUploadParts,
    #[serde(rename = "s3:PutBucketPolicy")]
    #[strum(serialize = "s3:PutBucketPolicy")]
    PutBucketPolicy,
    #[serde(rename = "s3:PutBucketVersioning")]
    #[strum(serialize = "s3:PutBucketVersioning")]
    PutBucketVersioning,
    #[serde(rename = "s3:PutLifecycleConfiguration")]
    #[strum(serialize = "s3:PutLifecycleConfiguration")]
    PutLifecycleConfiguration,
    #[serde(rename = "s3:PutObject")]
    #[strum(serialize = "s3:PutObject")]
    PutObject,
    #[serde(rename = "s3:PutObjectAcl")]
    #[strum(serialize = "s3:PutObjectAcl")]
    PutObjectAcl,
    #[serde(rename = "s3:RestoreObject")]
    #[strum(serialize = "s3:RestoreObject")]
    RestoreObject,
}

/// Actions handed to bucket owners that are granted access to a bucket they did not create.
pub const ALLOWED_ACTIONS: &[Action] = &[
    Action::DeleteObject,
    Action::DeleteObjectVersion,
    Action::GetBucketAcl,
    Action::GetBucketLocation,
    Action::GetBucketVersioning,
    Action::GetObject,
    Action::GetObjectAcl,
    Action::GetObjectVersion,
    Action::ListAllMyBuckets,
    Action::ListBucket,
    Action::ListBucketMultiPartUploads,
    Action::ListBucketVersions,
    Action::ListMultipartUploadParts,
    Action::PutBucketVersioning,
    Action::PutLifecycleConfiguration,
    Action::PutObject,
    Action::PutObjectAcl,
    Action::RestoreObject,
];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    #[serde(default)]
    pub principal: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub action: Vec<Action>,
    #[serde(default)]
    pub resource: Vec<String>,
}

fn user_arn(user: &str) -> String {
    format!("arn:aws:iam:::user/{user}")
}

fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

impl PolicyStatement {
    pub fn new(sid: impl Into<String>) -> PolicyStatement {
        PolicyStatement {
            sid: sid.into(),
            ..PolicyStatement::default()
        }
    }

    pub fn with_principals<'a>(mut self, users: impl IntoIterator<Item = &'a str>) -> Self {
        self.principal
            .entry(AWS_PRINCIPAL.to_string())
            .or_default()
            .extend(users.into_iter().map(user_arn));
        self
    }

    /// Grants on the buckets themselves and on every object inside them.
    pub fn with_resources<'a>(mut self, buckets: impl IntoIterator<Item = &'a str>) -> Self {
        for bucket in buckets {
            self.resource.push(bucket_arn(bucket));
            self.resource.push(bucket_arn(&format!("{bucket}/*")));
        }
        self
    }

    pub fn with_actions(mut self, actions: &[Action]) -> Self {
        self.action = actions.to_vec();
        self
    }

    /// A statement keeps the first effect it was given.
    pub fn allows(mut self) -> Self {
        self.effect.get_or_insert(Effect::Allow);
        self
    }

    pub fn denies(mut self) -> Self {
        self.effect.get_or_insert(Effect::Deny);
        self
    }

    /// Removes the given users from the statement's principals, in place.
    pub fn eject_principals(&mut self, users: &[&str]) -> &mut Self {
        if let Some(principals) = self.principal.get_mut(AWS_PRINCIPAL) {
            let ejected: Vec<String> = users.iter().map(|user| user_arn(user)).collect();
            principals.retain(|principal| !ejected.contains(principal));
        }
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub statement: Vec<PolicyStatement>,
}

impl BucketPolicy {
    pub fn new(statements: impl IntoIterator<Item = PolicyStatement>) -> BucketPolicy {
        BucketPolicy {
            id: String::new(),
            version: POLICY_VERSION.to_string(),
            statement: statements.into_iter().collect(),
        }
    }

    /// Replaces the statement with the same Sid, or appends it.
    pub fn modify_statement(&mut self, statement: PolicyStatement) -> &mut Self {
        match self.statement.iter_mut().find(|s| s.sid == statement.sid) {
            Some(existing) => *existing = statement,
            None => self.statement.push(statement),
        }
        self
    }

    pub fn drop_statement(&mut self, sid: &str) -> &mut Self {
        self.statement.retain(|statement| statement.sid != sid);
        self
    }

    pub fn eject_principals(&mut self, users: &[&str]) -> &mut Self {
        for statement in &mut self.statement {
            statement.eject_principals(users);
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
