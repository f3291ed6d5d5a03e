//! Proxy module - ChatGPT backend reverse proxy

pub mod arkose;
pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod relay;
pub mod server;
pub mod upstream;

pub use arkose::TokenProvisioner;
pub use config::ProxyConfig;
pub use error::{ErrorEnvelope, ProxyError, TokenError};
pub use server::{build_router, AppState, ProxyServer};
