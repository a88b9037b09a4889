//! RGW domain logic shared by the controllers: radosgw-admin access, multisite
//! configuration, pools, users and the admin-ops API.

pub mod admin_ops;
pub mod cli;
pub mod dependents;
pub mod error;
pub mod health;
pub mod json;
pub mod keyring;
pub mod multisite;
pub(crate) mod policy;
pub mod pools;
pub mod port;
pub mod shared_pools;
pub mod user;
pub mod context;
