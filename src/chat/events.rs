//! Events emitted on a chat stream.
//!
//! Each event is sent as one SSE frame: `event: <name>` followed by a JSON
//! `data` line. Non-ASCII text is written as-is, never `\u` escaped.

use serde::Serialize;

use crate::core::ids::SessionId;

/// One event of a chat stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    /// First event, sent before any model output.
    Init {
        /// Session of this stream.
        session_id: SessionId,
    },
    /// New text fragment; not cumulative.
    Delta {
        /// Session of this stream.
        session_id: SessionId,
        /// Text added since the previous delta.
        text: String,
    },
    /// Last event of a successful stream.
    Done {
        /// Session of this stream.
        session_id: SessionId,
        /// Full generated text.
        text: String,
    },
    /// Last event of a stream whose generation failed.
    Error {
        /// Session of this stream.
        session_id: SessionId,
        /// Failure description.
        message: String,
    },
}

impl ChatEvent {
    /// SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Delta { .. } => "delta",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Session the event belongs to.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        match self {
            Self::Init { session_id }
            | Self::Delta { session_id, .. }
            | Self::Done { session_id, .. }
            | Self::Error { session_id, .. } => *session_id,
        }
    }

    /// Whether no event may follow this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// JSON payload for the SSE `data` field.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn data(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
