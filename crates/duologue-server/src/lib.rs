//! HTTP + WebSocket edge.
//!
//! Thin layer over `duologue-rooms`: JWT verification, client protocol
//! parsing, per-connection socket plumbing and heartbeat, room REST
//! endpoints, `/health`, `/metrics`, and graceful shutdown.

pub mod auth;
pub mod config;
pub mod health;
pub mod heartbeat;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::ServerConfig;
pub use server::{AppState, DuologueServer};
