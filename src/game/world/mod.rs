//! One isolated simulation: the entity registry of a lobby plus its physics world.
//!
//! Session handlers only record intents here; forces and state transitions happen in
//! [`WorldSim::fixed_update`] (physics rate) and [`WorldSim::update`] (gameplay rate).
//! Everything clients must hear about is pushed to the world's [`Outbox`].

mod ai;
mod step;

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::combat::MAX_HEALTH;
use super::events::{Dispatch, Outbox};
use super::items::ItemKind;
use super::npc::{NavGrid, Npc, NpcInfo};
use super::physics::{BodyKind, PhysicsHandle, PhysicsWorld};
use super::player::{choose_spawn, Player, PlayerInfo, PlayerProfile};
use super::race::{Race, RaceEvent};
use super::settings::{BoxObject, GameObject, MinigameKind, SpawnerObject, WorldSettings};
use super::vehicle::{Vehicle, VehicleInfo};
use super::zone::{InteractableInfo, Pickup, Zone, ZoneInfo};
use super::{EntityId, SessionId};
use crate::config::SimConfig;
use crate::store::ServerStore;
use crate::util::math::{quat_from_array, to_array3, to_array4, vec_from_array, Quat, Vec3};
use crate::util::timers::TaskQueue;
use crate::wire::{Actions, InputFrame, WorldSnapshot};
use crate::ws::protocol::{NotificationKind, PlayerEvent, ServerMsg};

/// Coins granted by a spawner pickup
const COIN_AMOUNT: std::ops::RangeInclusive<u32> = 5..=15;

/// Deferred effects, fired from the deadline queue inside the physics step
#[derive(Debug, Clone, Copy, PartialEq)]
enum WorldTask {
    FinishReload {
        session: SessionId,
        slot: usize,
        rounds: u32,
    },
    NpcReload(EntityId),
    RemoveNpc(EntityId),
    Spawn(usize),
}

/// What a ray landed on
#[derive(Debug, Clone, Copy, PartialEq)]
enum HitTarget {
    Player(SessionId),
    Npc(EntityId),
    Vehicle(EntityId),
    Scenery,
}

impl HitTarget {
    fn id(self) -> Option<Uuid> {
        match self {
            HitTarget::Player(id) | HitTarget::Npc(id) | HitTarget::Vehicle(id) => Some(id),
            HitTarget::Scenery => None,
        }
    }
}

/// A template box placed in the world
#[derive(Debug, Clone)]
pub struct StaticBox {
    pub id: EntityId,
    pub object: BoxObject,
    pub handle: PhysicsHandle,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxInfo {
    pub id: EntityId,
    pub name: String,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub color: String,
    pub dynamic: bool,
}

/// Full JSON description of a world, sent on join and on lobby switch
#[derive(Debug, Clone, Serialize)]
pub struct WorldState {
    pub boxes: Vec<BoxInfo>,
    pub interactables: Vec<InteractableInfo>,
    pub zones: Vec<ZoneInfo>,
    pub vehicles: Vec<VehicleInfo>,
    pub npcs: Vec<NpcInfo>,
    pub players: Vec<PlayerInfo>,
}

pub struct WorldSim {
    physics: PhysicsWorld,
    settings: WorldSettings,
    sim: SimConfig,
    store: Arc<ServerStore>,
    players: BTreeMap<SessionId, Player>,
    npcs: Vec<Npc>,
    vehicles: Vec<Vehicle>,
    zones: Vec<Zone>,
    pickups: Vec<Pickup>,
    statics: Vec<StaticBox>,
    spawners: Vec<SpawnerObject>,
    tasks: TaskQueue<WorldTask>,
    nav: NavGrid,
    race: Option<Race>,
    clock: f64,
    rng: ChaCha8Rng,
    outbox: Outbox,
}

impl WorldSim {
    /// Materialize a world from its template
    pub fn new(settings: WorldSettings, sim: SimConfig, store: Arc<ServerStore>, seed: u64) -> Self {
        let nav_settings = settings.nav;
        let nav = NavGrid::from_obstacles(
            vec_from_array(nav_settings.origin),
            nav_settings.cell_size,
            nav_settings.width,
            nav_settings.depth,
            nav_settings.max_step,
            &settings.obstacles(),
        );

        let mut world = Self {
            physics: PhysicsWorld::new(),
            spawners: settings.spawners().cloned().collect(),
            settings,
            sim,
            store,
            players: BTreeMap::new(),
            npcs: Vec::new(),
            vehicles: Vec::new(),
            zones: Vec::new(),
            pickups: Vec::new(),
            statics: Vec::new(),
            tasks: TaskQueue::new(),
            nav,
            race: None,
            clock: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            outbox: Outbox::new(),
        };
        world.populate();
        // Initial entities reach clients through the full world state on join
        world.outbox.drain();
        world
    }

    fn populate(&mut self) {
        let objects = self.settings.game_objects.clone();
        for object in objects {
            match object {
                GameObject::Box(b) => {
                    let kind = if b.dynamic { BodyKind::Dynamic } else { BodyKind::Fixed };
                    let handle = self.physics.create_box(
                        kind,
                        vec_from_array(b.position),
                        quat_from_array(b.rotation),
                        b.half_extents(),
                    );
                    self.statics.push(StaticBox {
                        id: Uuid::new_v4(),
                        object: b,
                        handle,
                    });
                }
                GameObject::Npc { position, .. } => {
                    self.spawn_npc(vec_from_array(position), None);
                }
                GameObject::Car { position, rotation, .. } => {
                    self.spawn_vehicle(vec_from_array(position), quat_from_array(rotation));
                }
                GameObject::Spawner(_) => {}
            }
        }

        for (index, spawner) in self.spawners.iter().enumerate() {
            self.tasks
                .schedule_in(self.clock, spawner.delay, WorldTask::Spawn(index));
        }

        if self.minigame() == Some(MinigameKind::Race) {
            let mut race = Race::new();
            let events = race.start();
            self.race = Some(race);
            self.apply_race_events(events);
        }

        debug!(
            world = %self.settings.name,
            boxes = self.statics.len(),
            npcs = self.npcs.len(),
            vehicles = self.vehicles.len(),
            spawners = self.spawners.len(),
            "World populated"
        );
    }

    // ----- queries -----

    pub fn minigame(&self) -> Option<MinigameKind> {
        self.settings.minigame.map(|m| m.kind)
    }

    pub fn player(&self, id: SessionId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn has_player(&self, id: SessionId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn vehicle(&self, id: EntityId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn npcs(&self) -> &[Npc] {
        &self.npcs
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn pickups(&self) -> &[Pickup] {
        &self.pickups
    }

    pub fn race(&self) -> Option<&Race> {
        self.race.as_ref()
    }

    #[cfg(test)]
    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn drain_outbox(&mut self) -> Vec<Dispatch> {
        self.outbox.drain()
    }

    // ----- players -----

    /// Place a joining player: spawn point, starting items, optional car, minigame entry
    pub fn add_player(&mut self, id: SessionId, profile: PlayerProfile) -> Vec3 {
        if self.players.contains_key(&id) {
            warn!(session_id = %id, "Player already in world");
            return self.players.get(&id).map_or_else(Vec3::zeros, |p| p.position);
        }

        let spawn = choose_spawn(
            &self.settings.spawn_points,
            self.settings.player_settings.spawn_position,
            &mut self.rng,
        );
        let player = Player::new(&mut self.physics, id, profile, spawn, &self.settings.player_settings);
        self.players.insert(id, player);

        let grid = self.race.as_mut().map(|race| {
            race.add_racer(id);
            race.grid_position()
        });

        // The joiner learns about its own car from the world state
        let controlled = if self.settings.player_settings.controlled_object {
            let mut vehicle = Vehicle::spawn(&mut self.physics, spawn, Quat::identity(), self.clock);
            if let Some(grid) = grid {
                self.physics.set_translation(vehicle.handle, grid);
                vehicle.sync_from(&self.physics);
            }
            self.outbox.room_except(
                id,
                ServerMsg::AddVehicle {
                    vehicle: vehicle.info(),
                },
            );
            let vehicle_id = vehicle.id;
            self.vehicles.push(vehicle);
            Some(vehicle_id)
        } else {
            None
        };

        if let Some(player) = self.players.get(&id) {
            self.outbox.room_except(
                id,
                ServerMsg::AddPlayer {
                    player: player.info(),
                },
            );
        }
        if let Some(vehicle_id) = controlled {
            self.seat_player(id, vehicle_id);
        }
        debug!(session_id = %id, world = %self.settings.name, "Player added");
        spawn
    }

    /// Take a player out of the world. Returns the profile so it can follow the session.
    pub fn remove_player(&mut self, id: SessionId) -> Option<PlayerProfile> {
        if !self.players.contains_key(&id) {
            return None;
        }
        self.unseat_player(id);
        if let Some(race) = self.race.as_mut() {
            race.remove_racer(id);
        }

        let handle = self.players.get(&id)?.handle;
        self.physics.remove(handle);
        let player = self.players.remove(&id)?;
        self.outbox.room(ServerMsg::RemovePlayer { id });
        debug!(session_id = %id, world = %self.settings.name, "Player removed");
        Some(player.profile)
    }

    /// Store a binary input frame. Returns false for stale frames and unknown sessions.
    pub fn apply_input(&mut self, id: SessionId, frame: &InputFrame) -> bool {
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };
        let accepted = player.apply_input(
            frame.actions,
            frame.seq,
            quat_from_array(frame.cam_rotation),
            vec_from_array(frame.cam_position),
        );
        if accepted {
            if let Some(vehicle_id) = player.vehicle {
                if let Some(vehicle) = self.vehicles.iter_mut().find(|v| v.id == vehicle_id) {
                    if vehicle.is_driver(id) {
                        vehicle.acknowledge_input(frame.seq);
                    }
                }
            }
        }
        accepted
    }

    /// JSON vehicle input from a seated player
    pub fn vehicle_input(
        &mut self,
        id: SessionId,
        seq: u16,
        actions: u16,
        cam_rotation: [f32; 4],
        cam_position: [f32; 3],
    ) -> bool {
        if self.players.get(&id).and_then(|p| p.vehicle).is_none() {
            debug!(session_id = %id, "Vehicle input while on foot");
            return false;
        }
        let frame = InputFrame {
            actions: Actions::from_bits_truncate(actions),
            seq,
            dt_quantized: 0,
            cam_rotation,
            cam_position,
        };
        self.apply_input(id, &frame)
    }

    pub fn respawn(&mut self, id: SessionId) -> bool {
        let spawn = choose_spawn(
            &self.settings.spawn_points,
            self.settings.player_settings.spawn_position,
            &mut self.rng,
        );
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };
        if player.alive {
            return false;
        }
        player.spawn_point = spawn;
        player.respawn(&mut self.physics, spawn);
        self.outbox.player_event(id, PlayerEvent::Respawn);
        self.outbox.player_event(id, PlayerEvent::Health { value: MAX_HEALTH });
        true
    }

    pub fn suicide(&mut self, id: SessionId) -> bool {
        self.damage_player(id, MAX_HEALTH, None)
    }

    pub fn set_nickname(&mut self, id: SessionId, nickname: &str) -> bool {
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };
        player.profile.nickname = nickname.to_string();
        self.outbox.player_event(
            id,
            PlayerEvent::Nickname {
                value: nickname.to_string(),
            },
        );
        true
    }

    /// `(kills, deaths)` of a player
    pub fn stats(&self, id: SessionId) -> Option<(u32, u32)> {
        self.players
            .get(&id)
            .map(|p| (p.profile.kills, p.profile.deaths))
    }

    // ----- vehicles -----

    pub fn spawn_vehicle(&mut self, position: Vec3, rotation: Quat) -> EntityId {
        let vehicle = Vehicle::spawn(&mut self.physics, position, rotation, self.clock);
        let id = vehicle.id;
        self.outbox.room(ServerMsg::AddVehicle {
            vehicle: vehicle.info(),
        });
        self.vehicles.push(vehicle);
        id
    }

    /// Remove a vehicle, force-exiting its occupants first
    pub fn despawn_vehicle(&mut self, id: EntityId) -> bool {
        let Some(index) = self.vehicles.iter().position(|v| v.id == id) else {
            return false;
        };
        let occupants: Vec<SessionId> = self.vehicles[index].occupants().collect();
        for session in occupants {
            self.unseat_player(session);
        }

        let Some(index) = self.vehicles.iter().position(|v| v.id == id) else {
            return false;
        };
        self.physics.remove(self.vehicles[index].handle);
        self.vehicles.remove(index);
        self.outbox.room(ServerMsg::VehicleRemoved { id });
        debug!(vehicle_id = %id, "Vehicle despawned");
        true
    }

    /// Put a player in the first free seat of a vehicle
    pub fn seat_player(&mut self, session: SessionId, vehicle_id: EntityId) -> bool {
        let now = self.clock;
        let Some(player) = self.players.get_mut(&session) else {
            return false;
        };
        if player.vehicle.is_some() || !player.alive {
            return false;
        }
        let Some(vehicle) = self.vehicles.iter_mut().find(|v| v.id == vehicle_id) else {
            return false;
        };
        let Some(seat) = vehicle.enter(session, now) else {
            return false;
        };
        player.enter_vehicle(&mut self.physics, vehicle_id);
        if let Some(position) = vehicle.seat_world_position(seat) {
            player.follow_seat(&mut self.physics, position, vehicle.linear_velocity);
        }
        self.outbox.player_event(session, PlayerEvent::EnterVehicle { vehicle_id, seat });
        true
    }

    /// Take a player out of their vehicle, placing them beside it
    pub fn unseat_player(&mut self, session: SessionId) -> bool {
        let now = self.clock;
        let Some(player) = self.players.get_mut(&session) else {
            return false;
        };
        let Some(vehicle_id) = player.vehicle else {
            return false;
        };
        let exit = match self.vehicles.iter_mut().find(|v| v.id == vehicle_id) {
            Some(vehicle) => {
                vehicle.exit(session, now);
                vehicle.exit_position()
            }
            None => player.position,
        };
        player.exit_vehicle(&mut self.physics, exit);
        self.outbox.player_event(session, PlayerEvent::ExitVehicle { vehicle_id });
        true
    }

    // ----- npcs, zones, pickups -----

    pub fn spawn_npc(&mut self, position: Vec3, spawner: Option<usize>) -> EntityId {
        let npc = Npc::spawn(&mut self.physics, position, spawner);
        let id = npc.id;
        self.outbox.room(ServerMsg::AddNpc { npc: npc.info() });
        self.npcs.push(npc);
        id
    }

    pub fn remove_npc(&mut self, id: EntityId) -> bool {
        let Some(index) = self.npcs.iter().position(|n| n.id == id) else {
            return false;
        };
        self.physics.remove(self.npcs[index].handle);
        self.npcs.remove(index);
        self.outbox.room(ServerMsg::NpcRemoved { id });
        true
    }

    pub fn add_zone(&mut self, zone: Zone) -> EntityId {
        let id = zone.id;
        self.outbox.room(ServerMsg::ZoneCreated { zone: zone.info() });
        self.zones.push(zone);
        id
    }

    pub fn remove_zone(&mut self, id: EntityId) -> bool {
        let before = self.zones.len();
        self.zones.retain(|z| z.id != id);
        let removed = self.zones.len() != before;
        if removed {
            self.outbox.room(ServerMsg::ZoneRemoved { id });
        }
        removed
    }

    pub fn add_pickup(&mut self, pickup: Pickup) -> EntityId {
        let id = pickup.id;
        self.outbox.room(ServerMsg::InteractableCreated {
            interactable: pickup.info(),
        });
        self.pickups.push(pickup);
        id
    }

    pub fn remove_pickup(&mut self, id: EntityId) -> bool {
        let Some(index) = self.pickups.iter().position(|p| p.id == id) else {
            return false;
        };
        let pickup = self.pickups.remove(index);
        self.outbox.room(ServerMsg::InteractableRemoved {
            interactable: pickup.removal(),
        });
        true
    }

    /// Random point inside a spawner's area
    fn spawn_point_in(&mut self, spawner: &SpawnerObject) -> Vec3 {
        let mut axis = |lo: f32, hi: f32| {
            if hi > lo {
                self.rng.gen_range(lo..=hi)
            } else {
                lo
            }
        };
        let (min, max) = (spawner.area.min, spawner.area.max);
        Vec3::new(axis(min[0], max[0]), axis(min[1], max[1]), axis(min[2], max[2]))
    }

    fn spawn_coin(&mut self, position: Vec3, spawner: Option<usize>) -> EntityId {
        let amount = self.rng.gen_range(COIN_AMOUNT);
        self.add_pickup(Pickup::new(position, ItemKind::Coin, amount, spawner))
    }

    // ----- race -----

    fn apply_race_events(&mut self, events: Vec<RaceEvent>) {
        for event in events {
            match event {
                RaceEvent::CheckpointSpawned(zone) => {
                    self.add_zone(zone);
                }
                RaceEvent::CheckpointRemoved(id) => {
                    self.remove_zone(id);
                }
                RaceEvent::Started { racer, at } => {
                    self.outbox.room(ServerMsg::MinigameStart {
                        minigame: MinigameKind::Race,
                        recipient: racer,
                        start_time: at,
                    });
                }
                RaceEvent::Finished { racer, total_time } => {
                    let (key, nickname) = match self.players.get(&racer) {
                        Some(p) => (
                            p.profile.user_id.clone().unwrap_or_else(|| racer.to_string()),
                            p.profile.nickname.clone(),
                        ),
                        None => (racer.to_string(), String::from("unknown")),
                    };
                    self.store.record_time(&key, &nickname, total_time);
                    info!(session_id = %racer, total_time, "Race finished");
                    self.outbox.room(ServerMsg::MinigameEnd {
                        minigame: MinigameKind::Race,
                        recipient: racer,
                        total_time,
                        leaderboard: self.store.leaderboard(),
                    });
                    self.outbox.notify(
                        racer,
                        NotificationKind::Success,
                        format!("Finished in {total_time:.2}s"),
                    );
                }
            }
        }
    }

    // ----- output -----

    /// Binary state of every dynamic entity
    pub fn snapshot(&self, time: f64) -> WorldSnapshot {
        WorldSnapshot {
            time,
            players: self.players.values().map(Player::record).collect(),
            vehicles: self.vehicles.iter().map(Vehicle::record).collect(),
            npcs: self.npcs.iter().map(Npc::record).collect(),
        }
    }

    pub fn world_state(&self) -> WorldState {
        WorldState {
            boxes: self.statics.iter().map(|b| self.box_info(b)).collect(),
            interactables: self
                .pickups
                .iter()
                .filter(|p| p.is_active())
                .map(Pickup::info)
                .collect(),
            zones: self.zones.iter().map(Zone::info).collect(),
            vehicles: self.vehicles.iter().map(Vehicle::info).collect(),
            npcs: self.npcs.iter().map(Npc::info).collect(),
            players: self.players.values().map(Player::info).collect(),
        }
    }

    fn box_info(&self, b: &StaticBox) -> BoxInfo {
        let position = self
            .physics
            .translation(b.handle)
            .unwrap_or_else(|| vec_from_array(b.object.position));
        let rotation = self
            .physics
            .rotation(b.handle)
            .unwrap_or_else(|| quat_from_array(b.object.rotation));
        let [width, height, depth] = b.object.scale;
        BoxInfo {
            id: b.id,
            name: b.object.name.clone(),
            position: to_array3(&position),
            quaternion: to_array4(&rotation),
            width,
            height,
            depth,
            color: b.object.color.clone(),
            dynamic: b.object.dynamic,
        }
    }

    /// Stop every timer and live minigame state before the world is dropped
    pub fn cleanup(&mut self) {
        self.tasks.clear();
        if let Some(race) = self.race.as_mut() {
            let events = race.clear();
            self.apply_race_events(events);
        }
        debug!(world = %self.settings.name, "World cleaned up");
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests;
