//! Hosting daemon for the edge telemetry pipeline
//!
//! Exposes configuration loading and the HTTP surface so the binary and the
//! integration tests share them.

pub mod api;
pub mod config;
