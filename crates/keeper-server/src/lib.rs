//! Keeper RPC server.
//!
//! Decodes calls from HTTP, runs them through the middleware [`Pipeline`]
//! and renders either a reply or a [`status::Status`]. The binary in
//! `main.rs` wires configuration, storage and the listener.
//!
//! [`Pipeline`]: middleware::Pipeline

pub mod config;
pub mod context;
pub mod endpoint;
pub mod gateway;
pub mod middleware;
pub mod rpc;
pub mod state;
pub mod status;
