//! Client for the Ceph RADOS Gateway admin-ops HTTP API.
//!
//! Requests are signed with AWS Signature Version 4 using the credentials of
//! an RGW user that carries the admin capabilities. Errors returned by RGW are
//! classified into [`RgwErrorCode`] so that callers can tell "not found" and
//! "already exists" apart from everything else.

pub mod api;
pub mod client;
pub mod error;
pub mod signing;
pub mod types;

pub use api::RgwAdminApi;
pub use client::{AdminCredentials, RgwAdminClient};
pub use error::{Error, Result, RgwErrorCode};
