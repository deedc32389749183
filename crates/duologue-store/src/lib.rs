//! `SQLite` persistence for rooms, sessions, and chat logs.
//!
//! Layout mirrors the usual repository split: a pooled connection layer
//! ([`connection`]), versioned migrations ([`migrations`]), stateless
//! repositories that operate on a borrowed [`rusqlite::Connection`]
//! ([`repositories`]), and the [`ChatStore`] facade the orchestration core
//! talks to.

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod rows;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use errors::{Result, StoreError};
pub use rows::{LogRow, RoomRow, SessionRow};
pub use store::ChatStore;
