//! # TaskHub API Server Library
//!
//! HTTP and realtime surface of TaskHub, a multi-user task and project
//! tracker.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: JSON/query extractors with API-shaped rejections
//! - `middleware`: Response security headers
//! - `routes`: API route handlers
//! - `storage`: Attachment blob storage

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod storage;
