//! Shared types for the mhproxy proxy-fitting toolkit.
//!
//! This crate holds everything that both the engine (`mhproxy-core`) and the
//! command line front end agree on without pulling in the engine itself:
//!
//! - [`proxy_format`] - file extensions and binary container constants
//! - [`proxy_type`] - the closed set of proxy kinds
//! - [`paths`] - relative-path jailing and asset file lookup
//! - [`fs`] - size-capped file reads

pub mod fs;
pub mod paths;
pub mod proxy_format;
pub mod proxy_type;

pub use proxy_format::{PROXY_FORMAT, ProxyFormat};
pub use proxy_type::{ProxyType, UnknownProxyType};
