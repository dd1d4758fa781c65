//! Programmable SNMP agent simulator: a single-process SNMP agent that
//! answers v1/v2c/v3 requests out of a configurable Record Store, with
//! pluggable value producers, scripted fault injection, and device
//! lifecycle simulation — for exercising monitoring clients against
//! hard real-world conditions.

pub mod config;
pub mod core;
pub mod error;
pub mod utils;

pub mod behavior;
pub mod context;
pub mod control;
pub mod model;
pub mod producers;
pub mod protocol;
pub mod simulation;
pub mod store;
pub mod transport;

#[cfg(test)]
pub mod test_support;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
