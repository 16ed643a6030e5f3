//! WebSocket protocol message definitions
//! JSON text frames for session commands and lifecycle broadcasts. Per-tick input and
//! world snapshots travel as binary frames (see `crate::wire`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::combat::BodyPart;
use crate::game::npc::NpcInfo;
use crate::game::player::PlayerInfo;
use crate::game::settings::MinigameKind;
use crate::game::vehicle::VehicleInfo;
use crate::game::world::WorldState;
use crate::game::zone::{InteractableInfo, InteractableRemoved, ZoneInfo};
use crate::game::{EntityId, SessionId};
use crate::lobby::ChatMessage;
use crate::store::LeaderboardEntry;

/// Longest accepted nickname
pub const MAX_NICKNAME_LEN: usize = 20;
/// Longest accepted chat message
pub const MAX_CHAT_LEN: usize = 500;

/// Generic user commands carried by [`ClientMsg::UserCommand`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserCommand {
    ChangeNickname,
    Suicide,
    Race,
    Deathmatch,
    Hub,
    Server,
    Stats,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Client finished loading and wants the world, optionally joining an invite lobby
    ReadyForWorld {
        #[serde(default)]
        invite_id: Option<String>,
    },

    ChatSend {
        text: String,
    },

    UserCommand {
        command: UserCommand,
        #[serde(default)]
        value: Option<String>,
    },

    /// Input while seated in a vehicle
    VehicleInput {
        seq: u16,
        actions: u16,
        cam_rotation: [f32; 4],
        cam_position: [f32; 3],
    },

    Respawn,

    /// Start a fresh race with everyone from the current one
    MinigameRestart,

    /// Leave the minigame for the hub
    MinigameExit,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Lobby identity sent along with a full world
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LobbyInfo {
    pub id: String,
    pub kind: LobbyKind,
    pub minigame: Option<MinigameKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyKind {
    Hub,
    Minigame,
}

/// Per-player state changes, broadcast to the room
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerEvent {
    EnterVehicle { vehicle_id: EntityId, seat: usize },
    ExitVehicle { vehicle_id: EntityId },
    Health { value: f32 },
    Coins { value: u32 },
    Ammo { magazine: u32, reserve: u32 },
    Reload { duration: f64, amount: u32, reserve: u32 },
    Slot { value: usize },
    Death { killer: Option<Uuid> },
    Respawn,
    Melee { target: Option<Uuid> },
    Nickname { value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
    Achievement,
}

/// Reply to the `server` command and `/server-info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub uptime_secs: u64,
    pub hub_players: usize,
    pub minigames: usize,
    pub total_clients: u64,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        session_id: SessionId,
        server_time: u64,
    },

    /// Full world on first entry
    InitWorld {
        lobby: LobbyInfo,
        world: WorldState,
    },

    /// Full world after a migration
    SwitchWorld {
        lobby: LobbyInfo,
        world: WorldState,
    },

    InitChat {
        messages: Vec<ChatMessage>,
    },

    ChatMessage {
        message: ChatMessage,
    },

    AddPlayer {
        player: PlayerInfo,
    },

    RemovePlayer {
        id: SessionId,
    },

    AddVehicle {
        vehicle: VehicleInfo,
    },

    VehicleRemoved {
        id: EntityId,
    },

    AddNpc {
        npc: NpcInfo,
    },

    NpcRemoved {
        id: EntityId,
    },

    ZoneCreated {
        zone: ZoneInfo,
    },

    ZoneRemoved {
        id: EntityId,
    },

    InteractableCreated {
        interactable: InteractableInfo,
    },

    InteractableRemoved {
        interactable: InteractableRemoved,
    },

    /// Gunfire impact, with the victim when a character was hit
    RegisterHit {
        position: [f32; 3],
        target: Option<Uuid>,
        body_part: Option<BodyPart>,
        damage: f32,
    },

    PlayerEvent {
        player_id: SessionId,
        event: PlayerEvent,
    },

    MinigameStart {
        minigame: MinigameKind,
        recipient: SessionId,
        start_time: f64,
    },

    MinigameEnd {
        minigame: MinigameKind,
        recipient: SessionId,
        total_time: f64,
        leaderboard: Vec<LeaderboardEntry>,
    },

    MinigameCancel,

    Notification {
        recipient: SessionId,
        kind: NotificationKind,
        content: String,
    },

    ServerInfo {
        info: ServerInfo,
    },

    PlayerStats {
        kills: u32,
        deaths: u32,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn notify(recipient: SessionId, kind: NotificationKind, content: impl Into<String>) -> Self {
        ServerMsg::Notification {
            recipient,
            kind,
            content: content.into(),
        }
    }
}
