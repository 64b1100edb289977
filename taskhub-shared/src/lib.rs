//! # TaskHub Shared Library
//!
//! Domain types and services shared by the TaskHub API server and its tools.
//!
//! ## Module Organization
//!
//! - `models`: database models and their queries
//! - `db`: connection pool and embedded migrations
//! - `auth`: credentials, request authentication, authorization guard
//! - `realtime`: connection registry and event fan-out
//! - `notify`: notification dispatcher

pub mod auth;
pub mod db;
pub mod models;
pub mod notify;
pub mod realtime;

/// Current version of the TaskHub shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
