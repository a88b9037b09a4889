#![allow(clippy::result_large_err)]

pub mod account;
pub mod api;
pub mod cli;
pub mod configuration;
pub mod multisite;
pub mod reconcile;
pub mod rgw;
pub mod store;
pub mod user;

pub use rgw::policy::{
    ALLOWED_ACTIONS, Action as PolicyAction, BucketPolicy, Effect as PolicyEffect, POLICY_VERSION,
    PolicyStatement,
};

pub const APP_NAME: &str = "rgw";
pub const OPERATOR_NAME: &str = "rgw.ceph.rook.io";
pub const DOCKER_IMAGE_BASE_NAME: &str = "ceph";

pub mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
