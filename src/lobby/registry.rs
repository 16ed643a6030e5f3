//! The hub plus a pool of ephemeral minigame lobbies, and the session → lobby index

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use super::space::LobbySpace;
use super::{LobbyError, LobbyId, HUB_ID};
use crate::config::SimConfig;
use crate::game::settings::{MinigameKind, WorldTemplates};
use crate::game::{PlayerProfile, SessionId};
use crate::store::ServerStore;
use crate::util::math::short_id;
use crate::ws::protocol::LobbyKind;

pub struct LobbyRegistry {
    hub: LobbySpace,
    minigames: BTreeMap<LobbyId, LobbySpace>,
    locations: HashMap<SessionId, LobbyId>,
    templates: WorldTemplates,
    sim: SimConfig,
    store: Arc<ServerStore>,
    rng: ChaCha8Rng,
}

impl LobbyRegistry {
    pub fn new(
        templates: WorldTemplates,
        sim: SimConfig,
        store: Arc<ServerStore>,
        seed: u64,
    ) -> Result<Self, LobbyError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let hub_settings = templates.get("hub")?.clone();
        let hub = LobbySpace::new(
            HUB_ID.to_string(),
            LobbyKind::Hub,
            hub_settings,
            sim,
            Arc::clone(&store),
            rng.gen(),
        );
        Ok(Self {
            hub,
            minigames: BTreeMap::new(),
            locations: HashMap::new(),
            templates,
            sim,
            store,
            rng,
        })
    }

    // ----- lookup -----

    pub fn hub(&self) -> &LobbySpace {
        &self.hub
    }

    pub fn get(&self, id: &str) -> Option<&LobbySpace> {
        if id == HUB_ID {
            Some(&self.hub)
        } else {
            self.minigames.get(id)
        }
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut LobbySpace> {
        if id == HUB_ID {
            Some(&mut self.hub)
        } else {
            self.minigames.get_mut(id)
        }
    }

    pub fn location(&self, session: SessionId) -> Option<&str> {
        self.locations.get(&session).map(String::as_str)
    }

    pub fn lobby_of(&self, session: SessionId) -> Option<&LobbySpace> {
        let id = self.locations.get(&session)?;
        self.get(id)
    }

    pub fn lobby_of_mut(&mut self, session: SessionId) -> Option<&mut LobbySpace> {
        let id = self.locations.get(&session)?.clone();
        self.get_mut(&id)
    }

    pub fn lobbies(&self) -> impl Iterator<Item = &LobbySpace> {
        std::iter::once(&self.hub).chain(self.minigames.values())
    }

    pub fn lobbies_mut(&mut self) -> impl Iterator<Item = &mut LobbySpace> {
        std::iter::once(&mut self.hub).chain(self.minigames.values_mut())
    }

    pub fn hub_players(&self) -> usize {
        self.hub.player_count()
    }

    pub fn minigame_count(&self) -> usize {
        self.minigames.len()
    }

    pub fn session_count(&self) -> usize {
        self.locations.len()
    }

    // ----- membership -----

    /// Route a session that finished its handshake. An invite to a live minigame lobby
    /// wins; anything else lands in the hub.
    pub fn connect(&mut self, session: SessionId, profile: PlayerProfile, invite: Option<&str>) -> LobbyId {
        if let Some(current) = self.locations.get(&session) {
            warn!(session_id = %session, lobby_id = %current, "Session already placed");
            return current.clone();
        }
        let target = invite
            .filter(|id| *id != HUB_ID && self.minigames.contains_key(*id))
            .map_or_else(|| HUB_ID.to_string(), str::to_string);
        if let Some(lobby) = self.get_mut(&target) {
            lobby.join(session, profile, false);
        }
        self.locations.insert(session, target.clone());
        info!(session_id = %session, lobby_id = %target, "Session placed");
        target
    }

    /// Forget a session. Returns its profile when it had a player.
    pub fn disconnect(&mut self, session: SessionId) -> Option<PlayerProfile> {
        let id = self.locations.remove(&session)?;
        self.get_mut(&id)?.leave(session)
    }

    pub fn create_minigame(&mut self, kind: MinigameKind) -> Result<LobbyId, LobbyError> {
        let settings = self.templates.get(kind.template())?.clone();
        let mut id = short_id(&mut self.rng);
        while id == HUB_ID || self.minigames.contains_key(&id) {
            id = short_id(&mut self.rng);
        }
        let lobby = LobbySpace::new(
            id.clone(),
            LobbyKind::Minigame,
            settings,
            self.sim,
            Arc::clone(&self.store),
            self.rng.gen(),
        );
        self.minigames.insert(id.clone(), lobby);
        Ok(id)
    }

    /// Move a session between lobbies, carrying its profile. The source room hears the
    /// removal; the session receives the destination world and chat.
    pub fn migrate(&mut self, session: SessionId, to: &str) -> Result<(), LobbyError> {
        if self.get(to).is_none() {
            return Err(LobbyError::UnknownLobby(to.to_string()));
        }
        let from = self
            .locations
            .get(&session)
            .cloned()
            .ok_or(LobbyError::UnknownSession(session))?;
        if from == to {
            return Ok(());
        }

        let profile = self
            .get_mut(&from)
            .and_then(|lobby| lobby.leave(session))
            .ok_or(LobbyError::UnknownSession(session))?;
        let destination = self
            .get_mut(to)
            .ok_or_else(|| LobbyError::UnknownLobby(to.to_string()))?;
        destination.join(session, profile, true);
        self.locations.insert(session, to.to_string());
        info!(session_id = %session, from = %from, to = %to, "Player migrated");
        Ok(())
    }

    /// Send a session into a minigame. Races are single-driver and always get a fresh
    /// lobby; other kinds share an open lobby of the same kind.
    pub fn enter_minigame(&mut self, session: SessionId, kind: MinigameKind) -> Result<LobbyId, LobbyError> {
        if !self.locations.contains_key(&session) {
            return Err(LobbyError::UnknownSession(session));
        }
        let shared = match kind {
            MinigameKind::Race => None,
            _ => self
                .minigames
                .iter()
                .find(|(_, lobby)| lobby.minigame() == Some(kind))
                .map(|(id, _)| id.clone()),
        };
        let id = match shared {
            Some(id) => id,
            None => self.create_minigame(kind)?,
        };
        self.migrate(session, &id)?;
        Ok(id)
    }

    pub fn return_to_hub(&mut self, session: SessionId) -> Result<(), LobbyError> {
        self.migrate(session, HUB_ID)
    }

    /// Move everyone in a finished minigame into a fresh lobby of the same kind
    pub fn restart_minigame(&mut self, session: SessionId) -> Result<LobbyId, LobbyError> {
        let lobby = self
            .lobby_of(session)
            .ok_or(LobbyError::UnknownSession(session))?;
        let Some(kind) = lobby.minigame().filter(|_| lobby.kind() == LobbyKind::Minigame) else {
            return Err(LobbyError::NotInMinigame(session));
        };
        if !lobby.is_finished() {
            return Err(LobbyError::MinigameRunning);
        }
        let members: Vec<SessionId> = lobby.roster().collect();

        let id = self.create_minigame(kind)?;
        for member in members {
            if let Err(err) = self.migrate(member, &id) {
                warn!(session_id = %member, error = %err, "Restart migration failed");
            }
        }
        Ok(id)
    }

    // ----- ticking -----

    /// Drop minigame lobbies nobody is in, cancelling their timers first
    pub fn prune(&mut self) -> Vec<LobbyId> {
        let empty: Vec<LobbyId> = self
            .minigames
            .iter()
            .filter(|(_, lobby)| lobby.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &empty {
            if let Some(mut lobby) = self.minigames.remove(id) {
                lobby.cleanup();
                info!(lobby_id = %id, "Lobby pruned");
            }
        }
        empty
    }

    pub fn fixed_update(&mut self, dt: f64) {
        for lobby in self.lobbies_mut() {
            lobby.fixed_update(dt);
        }
    }

    /// Gameplay tick: prune, then advance every remaining lobby
    pub fn update(&mut self) {
        let pruned = self.prune();
        if !pruned.is_empty() {
            debug!(count = pruned.len(), remaining = self.minigames.len(), "Pruned lobbies");
        }
        for lobby in self.lobbies_mut() {
            lobby.update();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Dispatch;
    use crate::ws::protocol::ServerMsg;
    use uuid::Uuid;

    fn registry() -> LobbyRegistry {
        LobbyRegistry::new(
            WorldTemplates::builtin(),
            SimConfig::default(),
            Arc::new(ServerStore::new()),
            11,
        )
        .unwrap()
    }

    fn profile(name: &str) -> PlayerProfile {
        PlayerProfile {
            user_id: None,
            nickname: name.into(),
            color: "#101010".into(),
            coins: 150,
            kills: 2,
            deaths: 1,
        }
    }

    fn drain_all(registry: &mut LobbyRegistry) -> Vec<Dispatch> {
        registry.lobbies_mut().flat_map(|l| l.drain_outbox()).collect()
    }

    #[test]
    fn new_sessions_land_in_the_hub() {
        let mut registry = registry();
        let id = Uuid::new_v4();
        assert_eq!(registry.connect(id, profile("a"), None), HUB_ID);
        assert_eq!(registry.location(id), Some(HUB_ID));
        assert_eq!(registry.hub_players(), 1);

        // Unknown invites fall back to the hub
        let other = Uuid::new_v4();
        assert_eq!(registry.connect(other, profile("b"), Some("nope")), HUB_ID);
    }

    #[test]
    fn migration_carries_the_profile_and_announces_removal() {
        let mut registry = registry();
        let id = Uuid::new_v4();
        let watcher = Uuid::new_v4();
        registry.connect(id, profile("racer"), None);
        registry.connect(watcher, profile("watcher"), None);
        drain_all(&mut registry);

        let lobby = registry.enter_minigame(id, MinigameKind::Race).unwrap();
        assert_eq!(registry.location(id), Some(lobby.as_str()));
        assert!(!registry.hub().contains(id));

        let moved = registry.get(&lobby).unwrap().world().player(id).unwrap();
        assert_eq!(moved.profile.nickname, "racer");
        assert_eq!(moved.profile.kills, 2);

        let hub_out = registry.hub.drain_outbox();
        assert!(hub_out
            .iter()
            .any(|d| matches!(d, Dispatch::Room(ServerMsg::RemovePlayer { id: r }) if *r == id)));
        let dest_out = registry.get_mut(&lobby).unwrap().drain_outbox();
        assert!(dest_out
            .iter()
            .any(|d| matches!(d, Dispatch::To(s, ServerMsg::SwitchWorld { .. }) if *s == id)));
    }

    #[test]
    fn races_get_private_lobbies_and_deathmatch_is_shared() {
        let mut registry = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.connect(a, profile("a"), None);
        registry.connect(b, profile("b"), None);

        let ra = registry.enter_minigame(a, MinigameKind::Race).unwrap();
        let rb = registry.enter_minigame(b, MinigameKind::Race).unwrap();
        assert_ne!(ra, rb);

        let da = registry.enter_minigame(a, MinigameKind::Deathmatch).unwrap();
        let db = registry.enter_minigame(b, MinigameKind::Deathmatch).unwrap();
        assert_eq!(da, db);
        assert_eq!(registry.get(&da).unwrap().player_count(), 2);
    }

    #[test]
    fn empty_minigames_are_pruned_but_the_hub_stays() {
        let mut registry = registry();
        let id = Uuid::new_v4();
        registry.connect(id, profile("a"), None);
        let lobby = registry.enter_minigame(id, MinigameKind::Deathmatch).unwrap();
        assert_eq!(registry.minigame_count(), 1);

        registry.return_to_hub(id).unwrap();
        registry.update();
        assert_eq!(registry.minigame_count(), 0);
        assert!(registry.get(&lobby).is_none());
        assert!(registry.get(HUB_ID).is_some());

        registry.disconnect(id);
        registry.update();
        assert!(registry.get(HUB_ID).is_some());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn invites_join_the_invited_lobby() {
        let mut registry = registry();
        let host = Uuid::new_v4();
        registry.connect(host, profile("host"), None);
        let lobby = registry.enter_minigame(host, MinigameKind::Deathmatch).unwrap();

        let guest = Uuid::new_v4();
        assert_eq!(registry.connect(guest, profile("guest"), Some(&lobby)), lobby);
        assert_eq!(registry.get(&lobby).unwrap().player_count(), 2);
    }

    #[test]
    fn restart_requires_a_finished_minigame() {
        let mut registry = registry();
        let id = Uuid::new_v4();
        registry.connect(id, profile("a"), None);
        assert!(matches!(registry.restart_minigame(id), Err(LobbyError::NotInMinigame(_))));

        registry.enter_minigame(id, MinigameKind::Race).unwrap();
        assert!(matches!(registry.restart_minigame(id), Err(LobbyError::MinigameRunning)));
    }

    #[test]
    fn migrating_to_unknown_lobby_fails_cleanly() {
        let mut registry = registry();
        let id = Uuid::new_v4();
        registry.connect(id, profile("a"), None);
        assert!(matches!(registry.migrate(id, "missing"), Err(LobbyError::UnknownLobby(_))));
        assert_eq!(registry.location(id), Some(HUB_ID));
        assert!(matches!(
            registry.migrate(Uuid::new_v4(), HUB_ID),
            Err(LobbyError::UnknownSession(_))
        ));
    }
}
