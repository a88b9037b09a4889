use std::fmt;

use serde::Deserialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error codes RGW reports in the `Code` field of an admin-ops error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RgwErrorCode {
    NoSuchKey,
    NoSuchUser,
    NoSuchBucket,
    AccountAlreadyExists,
    UserAlreadyExists,
    BucketAlreadyExists,
    BucketNotEmpty,
    AccessDenied,
    InvalidArgument,
    Other(String),
}

impl From<&str> for RgwErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "NoSuchKey" => RgwErrorCode::NoSuchKey,
            "NoSuchUser" => RgwErrorCode::NoSuchUser,
            "NoSuchBucket" => RgwErrorCode::NoSuchBucket,
            "AccountAlreadyExists" => RgwErrorCode::AccountAlreadyExists,
            "UserAlreadyExists" => RgwErrorCode::UserAlreadyExists,
            "BucketAlreadyExists" => RgwErrorCode::BucketAlreadyExists,
            "BucketNotEmpty" => RgwErrorCode::BucketNotEmpty,
            "AccessDenied" => RgwErrorCode::AccessDenied,
            "InvalidArgument" => RgwErrorCode::InvalidArgument,
            other => RgwErrorCode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RgwErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            RgwErrorCode::NoSuchKey => "NoSuchKey",
            RgwErrorCode::NoSuchUser => "NoSuchUser",
            RgwErrorCode::NoSuchBucket => "NoSuchBucket",
            RgwErrorCode::AccountAlreadyExists => "AccountAlreadyExists",
            RgwErrorCode::UserAlreadyExists => "UserAlreadyExists",
            RgwErrorCode::BucketAlreadyExists => "BucketAlreadyExists",
            RgwErrorCode::BucketNotEmpty => "BucketNotEmpty",
            RgwErrorCode::AccessDenied => "AccessDenied",
            RgwErrorCode::InvalidArgument => "InvalidArgument",
            RgwErrorCode::Other(other) => other,
        };
        f.write_str(code)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("rgw admin api responded {status} {code}")]
    Api {
        status: u16,
        code: RgwErrorCode,
        request_id: Option<String>,
    },

    #[error("admin ops request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to decode admin ops response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid admin ops endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("failed to sign admin ops request: {0}")]
    Signing(#[from] s3::error::S3Error),

    #[error("failed to derive admin ops signature")]
    SignatureKey(#[from] hmac::digest::InvalidLength),

    #[error("invalid admin ops request header: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

impl Error {
    pub fn code(&self) -> Option<&RgwErrorCode> {
        match self {
            Error::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code(),
            Some(RgwErrorCode::NoSuchKey | RgwErrorCode::NoSuchUser | RgwErrorCode::NoSuchBucket)
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.code(),
            Some(
                RgwErrorCode::AccountAlreadyExists
                    | RgwErrorCode::UserAlreadyExists
                    | RgwErrorCode::BucketAlreadyExists
            )
        )
    }

    /// Request timeouts and connection failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Request(err) => err.is_timeout() || err.is_connect(),
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    request_id: Option<String>,
}

/// Builds an [`Error::Api`] from a non-success response body.
///
/// RGW answers some failures with an empty body, in which case the status code
/// is the only thing to go on.
pub(crate) fn api_error(status: u16, body: &[u8]) -> Error {
    let parsed = serde_json::from_slice::<ErrorBody>(body).unwrap_or_default();
    let code = if parsed.code.is_empty() {
        match status {
            404 => RgwErrorCode::NoSuchKey,
            403 => RgwErrorCode::AccessDenied,
            _ => RgwErrorCode::Other(format!("HTTP {status}")),
        }
    } else {
        RgwErrorCode::from(parsed.code.as_str())
    };
    Error::Api {
        status,
        code,
        request_id: parsed.request_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_such_key() {
        let err = api_error(
            404,
            br#"{"Code":"NoSuchKey","RequestId":"tx000","HostId":""}"#,
        );
        assert_eq!(err.code(), Some(&RgwErrorCode::NoSuchKey));
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
    }

    #[test]
    fn test_parse_conflicts() {
        let err = api_error(409, br#"{"Code":"AccountAlreadyExists"}"#);
        assert!(err.is_already_exists());
        let err = api_error(409, br#"{"Code":"UserAlreadyExists"}"#);
        assert_eq!(err.code(), Some(&RgwErrorCode::UserAlreadyExists));
    }

    #[test]
    fn test_empty_body_falls_back_to_status() {
        assert!(api_error(404, b"").is_not_found());
        let err = api_error(500, b"");
        assert_eq!(
            err.code(),
            Some(&RgwErrorCode::Other("HTTP 500".to_string()))
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let err = api_error(400, br#"{"Code":"QuotaExceeded"}"#);
        assert_eq!(err.to_string(), "rgw admin api responded 400 QuotaExceeded");
    }
}
