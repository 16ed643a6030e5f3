//! Lobbies: isolated worlds with their own roster and chat, and the registry routing
//! sessions between the permanent hub and on-demand minigames.

pub mod registry;
pub mod space;

pub use registry::LobbyRegistry;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::game::{SessionId, SettingsError};

pub type LobbyId = String;

/// Id of the permanent hub lobby
pub const HUB_ID: &str = "hub";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: SessionId,
    pub nickname: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("unknown lobby: {0}")]
    UnknownLobby(String),

    #[error("session {0} is not in a lobby")]
    UnknownSession(SessionId),

    #[error("session {0} is not in a minigame")]
    NotInMinigame(SessionId),

    #[error("minigame is still running")]
    MinigameRunning,

    #[error("chat message must be 1..={max} characters")]
    InvalidChat { max: usize },

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl LobbyError {
    /// Stable code sent to clients in `error` messages
    pub fn code(&self) -> &'static str {
        match self {
            LobbyError::UnknownLobby(_) => "unknown_lobby",
            LobbyError::UnknownSession(_) => "unknown_session",
            LobbyError::NotInMinigame(_) => "not_in_minigame",
            LobbyError::MinigameRunning => "minigame_running",
            LobbyError::InvalidChat { .. } => "invalid_chat",
            LobbyError::Settings(_) => "settings",
        }
    }
}
