//! Branded ID newtypes for type safety.
//!
//! Every entity has a distinct ID type implemented as a newtype wrapper
//! around `String`. This prevents accidentally passing a room ID where a
//! session ID is expected.
//!
//! Generated IDs are prefixed UUID v7 strings (`room_…`, `sess_…`),
//! time-ordered via [`uuid::Uuid::now_v7`]. Participant IDs come from the
//! auth layer and are never generated here.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new prefixed UUID v7 string (time-ordered).
fn new_v7(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7())
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, prefix = $prefix:literal) => {
        branded_id!($(#[$meta])* $name);

        impl $name {
            /// Create a new random ID (prefixed UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7($prefix))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a chat room.
    RoomId, prefix = "room"
}

branded_id! {
    /// Unique identifier for a timed conversation session within a room.
    SessionId, prefix = "sess"
}

branded_id! {
    /// Identifier for a participant, as asserted by the auth layer.
    ///
    /// Never generated server-side; always carried through from the token.
    ParticipantId
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
