//! BrandHalo Gateway Library
//!
//! Credential lifecycle for external AI agents reading organization brand data.
//!
//! # Features
//!
//! - **OAuth 2.0**: authorization-code grant with dynamic client registration
//!   (RFC 7591), server metadata (RFC 8414) and rotating refresh tokens
//! - **API keys**: hash-stored, revocable, per-organization keys
//! - **Bearer authentication**: one middleware dispatching on credential prefix
//! - **Audit**: structured lifecycle events for every credential
//! - **Production Ready**: graceful shutdown, optional expiry reaper

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api_keys;
pub mod audit;
pub mod brand;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod oauth;
pub mod session;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}"))),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}"))),
    }
}
