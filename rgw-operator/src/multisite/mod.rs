//! Controllers for the multisite hierarchy: realms, zonegroups and zones.
//!
//! Each level waits for its parent to exist and refuses to go away while a
//! child still refers to it.

use std::sync::Arc;

use stackable_operator::{
    client::Client,
    kube::{core::DeserializeGuard, runtime::controller::Action},
};

use crate::{
    reconcile::{ClassifyError, Substrate, guard::resource_key},
    rgw::cli::CliFactory,
};

pub mod error;
pub mod realm;
pub mod topology;
pub mod zone;
pub mod zone_group;

use error::Error;

pub struct Ctx {
    pub client: Client,
    pub cli: CliFactory,
    pub substrate: Substrate,
}

pub fn error_policy<K>(obj: Arc<DeserializeGuard<K>>, error: &Error, ctx: Arc<Ctx>) -> Action
where
    K: stackable_operator::kube::Resource,
{
    ctx.substrate
        .error_action(&resource_key(&*obj), error.kind())
}
