//! Conduit Auth Library
//!
//! Authentication and session-revocation core of the Conduit API:
//! password credentials, revocable JWTs and the request gateway.
//! The binary in main.rs wires these into an HTTP server.

pub mod auth;
pub mod config;
pub mod db;
pub mod middleware;

pub use config::Config;
pub use db::Database;
