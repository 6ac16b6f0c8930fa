//! HTTP boundary for Verdict: API-key auth and the eval routes.
//!
//! Exposed as a library so integration tests can drive the router without
//! binding a socket.

pub mod auth;
pub mod routes;
