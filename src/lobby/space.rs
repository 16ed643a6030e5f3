//! A single lobby: roster, chat log and the world it owns

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChatMessage, LobbyError, LobbyId};
use crate::config::SimConfig;
use crate::game::race::RacePhase;
use crate::game::settings::MinigameKind;
use crate::game::{Dispatch, Outbox, PlayerProfile, SessionId, WorldSettings, WorldSim};
use crate::store::ServerStore;
use crate::wire::WorldSnapshot;
use crate::ws::protocol::{LobbyInfo, LobbyKind, ServerMsg, MAX_CHAT_LEN};

/// Chat lines kept for replay on join
pub const CHAT_HISTORY: usize = 100;

pub struct LobbySpace {
    id: LobbyId,
    kind: LobbyKind,
    roster: BTreeSet<SessionId>,
    chat: VecDeque<ChatMessage>,
    world: WorldSim,
    outbox: Outbox,
}

impl LobbySpace {
    pub fn new(
        id: LobbyId,
        kind: LobbyKind,
        settings: WorldSettings,
        sim: SimConfig,
        store: Arc<ServerStore>,
        seed: u64,
    ) -> Self {
        info!(lobby_id = %id, world = %settings.name, ?kind, "Lobby created");
        Self {
            id,
            kind,
            roster: BTreeSet::new(),
            chat: VecDeque::new(),
            world: WorldSim::new(settings, sim, store, seed),
            outbox: Outbox::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> LobbyKind {
        self.kind
    }

    pub fn minigame(&self) -> Option<MinigameKind> {
        self.world.minigame()
    }

    pub fn info(&self) -> LobbyInfo {
        LobbyInfo {
            id: self.id.clone(),
            kind: self.kind,
            minigame: self.minigame(),
        }
    }

    pub fn roster(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.roster.iter().copied()
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.roster.contains(&session)
    }

    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn world(&self) -> &WorldSim {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldSim {
        &mut self.world
    }

    /// A race whose checkpoints are all done
    pub fn is_finished(&self) -> bool {
        self.world
            .race()
            .is_some_and(|r| r.phase() == RacePhase::Finished)
    }

    /// Add a session to the roster and its player to the world, then queue the full
    /// world and chat history for it. `switching` selects `switch_world` over `init_world`.
    pub fn join(&mut self, session: SessionId, profile: PlayerProfile, switching: bool) {
        self.roster.insert(session);
        self.world.add_player(session, profile);

        let lobby = self.info();
        let world = self.world.world_state();
        let init = if switching {
            ServerMsg::SwitchWorld { lobby, world }
        } else {
            ServerMsg::InitWorld { lobby, world }
        };
        self.outbox.to(session, init);
        self.outbox.to(
            session,
            ServerMsg::InitChat {
                messages: self.chat.iter().cloned().collect(),
            },
        );
        debug!(lobby_id = %self.id, session_id = %session, players = self.roster.len(), "Joined lobby");
    }

    /// Remove a session. Returns its profile when it had a player in this world.
    pub fn leave(&mut self, session: SessionId) -> Option<PlayerProfile> {
        if !self.roster.remove(&session) {
            return None;
        }
        debug!(lobby_id = %self.id, session_id = %session, players = self.roster.len(), "Left lobby");
        self.world.remove_player(session)
    }

    /// Validate, store and broadcast a chat line
    pub fn post_chat(&mut self, session: SessionId, text: &str) -> Result<ChatMessage, LobbyError> {
        if !self.contains(session) {
            return Err(LobbyError::UnknownSession(session));
        }
        let text = text.trim();
        let len = text.chars().count();
        if len == 0 || len > MAX_CHAT_LEN {
            return Err(LobbyError::InvalidChat { max: MAX_CHAT_LEN });
        }
        let nickname = self
            .world
            .player(session)
            .map(|p| p.profile.nickname.clone())
            .unwrap_or_else(|| String::from("unknown"));
        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender: session,
            nickname,
            text: text.to_string(),
            sent_at: Utc::now(),
        };
        self.chat.push_back(message.clone());
        while self.chat.len() > CHAT_HISTORY {
            self.chat.pop_front();
        }
        self.outbox.room(ServerMsg::ChatMessage {
            message: message.clone(),
        });
        Ok(message)
    }

    pub fn chat_history(&self) -> impl Iterator<Item = &ChatMessage> {
        self.chat.iter()
    }

    pub fn fixed_update(&mut self, dt: f64) {
        self.world.fixed_update(dt);
    }

    pub fn update(&mut self) {
        self.world.update();
    }

    /// Binary state for broadcast; `None` when nobody is listening
    pub fn snapshot(&self, time: f64) -> Option<WorldSnapshot> {
        (!self.roster.is_empty()).then(|| self.world.snapshot(time))
    }

    /// Lobby messages first, then world events in the order they happened
    pub fn drain_outbox(&mut self) -> Vec<Dispatch> {
        let mut out = self.outbox.drain();
        out.extend(self.world.drain_outbox());
        out
    }

    /// Cancel timers and minigame state before the lobby is dropped
    pub fn cleanup(&mut self) {
        self.world.cleanup();
        info!(lobby_id = %self.id, "Lobby cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::PlayerProfile;

    fn lobby() -> LobbySpace {
        LobbySpace::new(
            "test".into(),
            LobbyKind::Hub,
            WorldSettings::hub(),
            SimConfig::default(),
            Arc::new(ServerStore::new()),
            3,
        )
    }

    fn profile(name: &str) -> PlayerProfile {
        PlayerProfile {
            user_id: None,
            nickname: name.into(),
            color: "#000000".into(),
            coins: 0,
            kills: 0,
            deaths: 0,
        }
    }

    #[test]
    fn join_queues_world_and_chat_for_the_newcomer() {
        let mut lobby = lobby();
        let id = Uuid::new_v4();
        lobby.join(id, profile("a"), false);

        assert!(lobby.contains(id));
        assert!(lobby.world().has_player(id));
        let out = lobby.drain_outbox();
        assert!(matches!(&out[0], Dispatch::To(s, ServerMsg::InitWorld { .. }) if *s == id));
        assert!(matches!(&out[1], Dispatch::To(s, ServerMsg::InitChat { .. }) if *s == id));
    }

    /// Messages from `out` that reach `session`, in delivery order
    fn reaching(out: &[Dispatch], session: SessionId) -> Vec<&ServerMsg> {
        out.iter()
            .filter_map(|d| match d {
                Dispatch::Room(msg) => Some(msg),
                Dispatch::RoomExcept(except, msg) if *except != session => Some(msg),
                Dispatch::To(to, msg) if *to == session => Some(msg),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn race_joiner_sees_its_car_once_and_peers_see_it_in_order() {
        let mut lobby = LobbySpace::new(
            "race".into(),
            LobbyKind::Minigame,
            WorldSettings::race(),
            SimConfig::default(),
            Arc::new(ServerStore::new()),
            4,
        );
        let a = Uuid::new_v4();
        lobby.join(a, profile("a"), false);
        lobby.drain_outbox();

        let b = Uuid::new_v4();
        lobby.join(b, profile("b"), false);
        let car = lobby.world().player(b).unwrap().vehicle.expect("race car");
        let out = lobby.drain_outbox();

        let to_joiner = reaching(&out, b);
        let listed = to_joiner.iter().find_map(|m| match m {
            ServerMsg::InitWorld { world, .. } => Some(world.vehicles.iter().filter(|v| v.id == car).count()),
            _ => None,
        });
        assert_eq!(listed, Some(1));
        assert!(!to_joiner
            .iter()
            .any(|m| matches!(m, ServerMsg::AddVehicle { vehicle } if vehicle.id == car)));

        let to_peer = reaching(&out, a);
        let added_car = to_peer
            .iter()
            .position(|m| matches!(m, ServerMsg::AddVehicle { vehicle } if vehicle.id == car));
        let added_player = to_peer
            .iter()
            .position(|m| matches!(m, ServerMsg::AddPlayer { player } if player.id == b));
        let seated = to_peer
            .iter()
            .position(|m| matches!(m, ServerMsg::PlayerEvent { player_id, .. } if *player_id == b));
        assert!(added_car.is_some() && added_player.is_some() && seated.is_some());
        assert!(added_car < added_player && added_player < seated);

        let grid = lobby.world().vehicle(car).unwrap().position;
        let announced = to_peer.iter().find_map(|m| match m {
            ServerMsg::AddVehicle { vehicle } if vehicle.id == car => Some(vehicle.position),
            _ => None,
        });
        assert_eq!(announced, Some([grid.x, grid.y, grid.z]));
    }

    #[test]
    fn chat_is_validated_and_replayed() {
        let mut lobby = lobby();
        let a = Uuid::new_v4();
        lobby.join(a, profile("alice"), false);

        assert!(lobby.post_chat(a, "   ").is_err());
        assert!(lobby.post_chat(a, &"x".repeat(MAX_CHAT_LEN + 1)).is_err());
        assert!(lobby.post_chat(Uuid::new_v4(), "hi").is_err());
        let msg = lobby.post_chat(a, " hello ").unwrap();
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.nickname, "alice");
        lobby.drain_outbox();

        let b = Uuid::new_v4();
        lobby.join(b, profile("bob"), true);
        let out = lobby.drain_outbox();
        let replay = out.iter().find_map(|d| match d {
            Dispatch::To(s, ServerMsg::InitChat { messages }) if *s == b => Some(messages.len()),
            _ => None,
        });
        assert_eq!(replay, Some(1));
        assert!(out
            .iter()
            .any(|d| matches!(d, Dispatch::To(s, ServerMsg::SwitchWorld { .. }) if *s == b)));
    }

    #[test]
    fn chat_history_is_bounded() {
        let mut lobby = lobby();
        let a = Uuid::new_v4();
        lobby.join(a, profile("a"), false);
        for i in 0..CHAT_HISTORY + 5 {
            lobby.post_chat(a, &format!("line {i}")).unwrap();
        }
        assert_eq!(lobby.chat_history().count(), CHAT_HISTORY);
        assert_eq!(lobby.chat_history().next().unwrap().text, "line 5");
    }

    #[test]
    fn leave_returns_profile_once() {
        let mut lobby = lobby();
        let id = Uuid::new_v4();
        lobby.join(id, profile("a"), false);
        assert_eq!(lobby.leave(id).map(|p| p.nickname), Some("a".into()));
        assert!(lobby.leave(id).is_none());
        assert!(lobby.is_empty());
        assert!(lobby.snapshot(0.0).is_none());
    }
}
