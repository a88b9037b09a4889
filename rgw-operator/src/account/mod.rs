//! Controller for RGW accounts.

pub mod controller;
pub mod error;
