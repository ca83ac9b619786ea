//! picserve - serve a directory of photos over HTTP, converting HEIC on demand
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod images;
pub mod server;
