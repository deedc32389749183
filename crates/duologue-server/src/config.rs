//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use duologue_rooms::CoordinatorConfig;

/// Configuration for the duologue server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `8000`).
    pub port: u16,
    /// `SQLite` database path.
    pub db_path: String,
    /// HMAC secret for verifying client JWTs.
    pub jwt_secret: String,
    /// Length of one topic segment, in seconds.
    pub segment_secs: u64,
    /// How long an extension vote stays open, in seconds.
    pub vote_window_secs: u64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds (close after this long without a pong).
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            db_path: "duologue.db".into(),
            jwt_secret: "change-me".into(),
            segment_secs: 900,
            vote_window_secs: 120,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Defaults with `DUOLOGUE_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overrides pulled through `lookup`; unparseable values keep defaults.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("DUOLOGUE_HOST") {
            cfg.host = v;
        }
        if let Some(v) = lookup("DUOLOGUE_PORT")
            && let Ok(port) = v.parse()
        {
            cfg.port = port;
        }
        if let Some(v) = lookup("DUOLOGUE_DB_PATH") {
            cfg.db_path = v;
        }
        if let Some(v) = lookup("DUOLOGUE_JWT_SECRET") {
            cfg.jwt_secret = v;
        }
        if let Some(v) = lookup("DUOLOGUE_SEGMENT_SECS")
            && let Ok(secs) = v.parse()
        {
            cfg.segment_secs = secs;
        }
        if let Some(v) = lookup("DUOLOGUE_VOTE_WINDOW_SECS")
            && let Ok(secs) = v.parse()
        {
            cfg.vote_window_secs = secs;
        }
        if let Some(v) = lookup("DUOLOGUE_HEARTBEAT_INTERVAL_SECS")
            && let Ok(secs) = v.parse()
        {
            cfg.heartbeat_interval_secs = secs;
        }
        if let Some(v) = lookup("DUOLOGUE_HEARTBEAT_TIMEOUT_SECS")
            && let Ok(secs) = v.parse()
        {
            cfg.heartbeat_timeout_secs = secs;
        }
        if let Some(v) = lookup("DUOLOGUE_MAX_MESSAGE_SIZE")
            && let Ok(bytes) = v.parse()
        {
            cfg.max_message_size = bytes;
        }
        cfg
    }

    /// The coordinator durations this config prescribes.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            segment: Duration::from_secs(self.segment_secs),
            vote_window: Duration::from_secs(self.vote_window_secs),
        }
    }
}
