//! Game simulation modules

pub mod combat;
pub mod events;
pub mod items;
pub mod npc;
pub mod physics;
pub mod player;
pub mod race;
pub mod settings;
pub mod vehicle;
pub mod world;
pub mod zone;

pub use events::{Dispatch, Outbox};
pub use player::PlayerProfile;
pub use settings::{SettingsError, WorldSettings};
pub use world::WorldSim;

use uuid::Uuid;

/// Connection identity, stable across world migrations
pub type SessionId = Uuid;
/// Identity of a simulated entity inside one world
pub type EntityId = Uuid;

/// Character capsule shared by players and NPCs
pub const CAPSULE_HALF_HEIGHT: f32 = 0.5;
pub const CAPSULE_RADIUS: f32 = 0.5;
/// Camera/muzzle height above the capsule centre
pub const EYE_HEIGHT: f32 = 0.6;
/// Anything below this height is reset to its spawn point
pub const FALL_LIMIT: f32 = -100.0;

/// Wrap-around comparison for 16-bit input sequence numbers.
/// `seq` counts as newer when it is at most half the range ahead of `last`.
pub fn is_newer_seq(seq: u16, last: u16) -> bool {
    (seq.wrapping_sub(last) as i16) >= 0
}
