//! Controller for S3 users of an object store.

pub mod controller;
pub mod error;
