//! Authenticated catalog-query gateway.
//!
//! Holds one authenticated session to a remote catalog/licensing backend,
//! caches product-info lookups, and serves login, licensing and catalog
//! operations to local clients as JSON-RPC over a websocket.

pub mod backend;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod gateway_paths;
pub mod license;
pub mod logging;
pub mod rpc;
pub mod session;
pub mod vdf;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{GatewayError, GatewayResult};
pub use gateway::GatewayContext;

/// Short git SHA of the build, or `unknown`.
pub const BUILD_SHA: &str = env!("CATALOG_GATEWAY_GIT_SHA");
