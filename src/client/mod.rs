//! Client side of the API: a persisted session, a typed HTTP client that
//! attaches the session token, and a dashboard view kept fresh by push events.

use thiserror::Error;

pub mod api;
pub mod dashboard;
pub mod events;
pub mod session;

pub use api::ApiClient;
pub use dashboard::Dashboard;
pub use events::{EventStream, FrameParser, PushEvent};
pub use session::{SessionState, SessionStore};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx answer; `message` is the server's own text.
    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("session storage failed: {0}")]
    Session(#[from] std::io::Error),

    #[error("could not decode session: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}
