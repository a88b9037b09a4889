//! Controller for object stores: the gateways together with their pools and zone.

pub mod admin;
pub mod builders;
pub mod controller;
pub mod error;
