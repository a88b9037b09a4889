pub mod account;
pub mod object_store;
pub mod pool;
pub mod realm;
pub mod status;
pub mod user;
pub mod zone;
pub mod zone_group;
