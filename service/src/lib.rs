//! Process-level services: configuration, logging and database provisioning.

pub mod config;
pub mod logging;
pub mod provision;

pub use provision::provision_feed_table;
