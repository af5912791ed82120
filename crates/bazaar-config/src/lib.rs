//! Configuration for the bazaar marketplace client.
//!
//! The configuration is read from a TOML file (`$BAZAAR_CONFIG`, or
//! `$XDG_CONFIG_HOME/bazaar/config.toml`) and resolved into concrete paths, durations and
//! weights by the accessor methods on [`config::Config`]. Nothing here is global: callers
//! load a `Config` once and inject it into the services that need it.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{ConfigError, Result};

#[cfg(test)]
pub mod test_utils;
