//! Syncgate - keeps a reverse proxy in sync with discovered containers
//!
//! This library drives a periodic poll-compute-apply cycle that:
//! - Discovers running service containers through a cloud container API
//! - Folds per-container metadata into upstream pools and virtual hosts
//! - Persists TLS certificate material referenced by those hosts
//! - Renders proxy configuration text and applies it only when it changed
//! - Validates and reloads the proxy process, alerting on failure

pub mod apply;
pub mod certs;
pub mod cloud;
pub mod config;
pub mod discovery;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod render;
