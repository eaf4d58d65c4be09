//! Provisions the NeoAi completion engine and brokers requests to it over the
//! engine's stdin/stdout.
//!
//! [`Bridge::install_and_start`] resolves (or downloads) the engine binary for
//! the running platform and spawns it; [`Bridge::request`] forwards one
//! request and always returns a well-formed envelope.

pub mod bridge;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod install;
pub mod platform;
pub mod process;
pub mod server;
pub mod types;

#[cfg(test)]
mod tests;

pub use bridge::Bridge;
pub use config::{load_settings, BridgeSettings};
pub use error::{BridgeError, Result};
pub use platform::PlatformTriple;
pub use types::{AutocompleteResult, ResultEntry};
