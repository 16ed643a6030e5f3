//! Connected players: profile, body, input latching and on-foot movement

use rand::Rng;
use serde::Serialize;

use super::combat::{CombatSystem, MAX_HEALTH};
use super::items::{Holdable, ItemKind, Loadout};
use super::physics::{PhysicsHandle, PhysicsWorld};
use super::settings::PlayerSettings;
use super::{is_newer_seq, EntityId, SessionId, CAPSULE_HALF_HEIGHT, CAPSULE_RADIUS, EYE_HEIGHT, FALL_LIMIT};
use crate::util::math::{
    forward_axis, random_color, short_id, to_array3, to_array4, vec_from_array, yaw_of, yaw_rotation, yaw_towards,
    Quat, Vec3,
};
use crate::wire::{Actions, PlayerRecord};
use crate::ws::protocol::PlayerEvent;

pub const WALK_SPEED: f32 = 4.0;
pub const SPRINT_SPEED: f32 = 8.0;

pub const JUMP_IMPULSE: f32 = 1.5;
pub const JUMP_COOLDOWN: f64 = 0.2;
/// Grace period after leaving the ground during which a jump still counts
pub const COYOTE_TIME: f64 = 0.1;
/// Ray length from the capsule centre used for grounded checks
pub const GROUND_PROBE: f32 = 1.1;

pub const INTERACT_DEBOUNCE: f64 = 0.5;
pub const SPAWN_VEHICLE_DEBOUNCE: f64 = 0.5;
pub const VEHICLE_COST: u32 = 100;
pub const VEHICLE_ENTER_RADIUS: f32 = 2.0;

pub const STARTING_COINS: u32 = 150;

/// Identity and progression that follow a session across lobbies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerProfile {
    pub user_id: Option<String>,
    pub nickname: String,
    pub color: String,
    pub coins: u32,
    pub kills: u32,
    pub deaths: u32,
}

impl PlayerProfile {
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        Self {
            user_id: None,
            nickname: format!("player-{}", &short_id(rng)[..4]),
            color: random_color(rng),
            coins: STARTING_COINS,
            kills: 0,
            deaths: 0,
        }
    }

    pub fn add_coins(&mut self, amount: u32) -> u32 {
        self.coins = self.coins.saturating_add(amount);
        self.coins
    }

    pub fn spend_coins(&mut self, amount: u32) -> bool {
        match self.coins.checked_sub(amount) {
            Some(left) => {
                self.coins = left;
                true
            }
            None => false,
        }
    }

    /// Count a kill. Returns true when the new total is an achievement milestone.
    pub fn record_kill(&mut self) -> bool {
        self.kills += 1;
        CombatSystem::is_milestone(self.kills)
    }
}

/// Full player description for `add_player` and world JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerInfo {
    pub id: SessionId,
    pub nickname: String,
    pub color: String,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub health: f32,
    pub coins: u32,
    pub ammo: u32,
    pub kills: u32,
    pub deaths: u32,
    pub is_dead: bool,
    pub vehicle: Option<EntityId>,
    pub loadout: Loadout,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: SessionId,
    pub profile: PlayerProfile,
    pub handle: PhysicsHandle,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub view_rotation: Quat,
    pub camera_position: Vec3,
    pub health: f32,
    pub alive: bool,
    /// Reserve rounds outside the magazine
    pub ammo: u32,
    pub loadout: Loadout,
    /// Vehicle currently occupied, looked up in the world on every use
    pub vehicle: Option<EntityId>,
    pub actions: Actions,
    pub last_processed_input_seq: u16,
    pub spawn_point: Vec3,
    pub grounded: bool,
    pressed: Actions,
    received_input: bool,
    last_grounded_at: f64,
    last_jump_at: f64,
    last_interact_at: f64,
    last_spawn_vehicle_at: f64,
    last_melee_at: f64,
}

impl Player {
    pub fn new(
        physics: &mut PhysicsWorld,
        id: SessionId,
        profile: PlayerProfile,
        position: Vec3,
        settings: &PlayerSettings,
    ) -> Self {
        let handle = physics.create_capsule(position, CAPSULE_HALF_HEIGHT, CAPSULE_RADIUS);
        let mut loadout = Loadout::new(&settings.slots);
        if let Some(item) = settings.left_hand.and_then(Holdable::from_kind) {
            loadout.left_hand.item = Some(item);
        }
        Self {
            id,
            profile,
            handle,
            position,
            rotation: Quat::identity(),
            velocity: Vec3::zeros(),
            view_rotation: Quat::identity(),
            camera_position: position,
            health: MAX_HEALTH,
            alive: true,
            ammo: settings.starting_ammo,
            loadout,
            vehicle: None,
            actions: Actions::empty(),
            last_processed_input_seq: 0,
            spawn_point: position,
            grounded: false,
            pressed: Actions::empty(),
            received_input: false,
            last_grounded_at: f64::NEG_INFINITY,
            last_jump_at: f64::NEG_INFINITY,
            last_interact_at: f64::NEG_INFINITY,
            last_spawn_vehicle_at: f64::NEG_INFINITY,
            last_melee_at: f64::NEG_INFINITY,
        }
    }

    /// Store a client input frame. Forces are applied later, in the physics step.
    /// Returns false for a stale or duplicate frame.
    pub fn apply_input(&mut self, actions: Actions, seq: u16, camera_rotation: Quat, camera_position: Vec3) -> bool {
        if self.received_input
            && (seq == self.last_processed_input_seq || !is_newer_seq(seq, self.last_processed_input_seq))
        {
            return false;
        }
        self.received_input = true;
        self.last_processed_input_seq = seq;
        self.pressed |= actions.pressed_since(self.actions);
        self.actions = actions;
        self.view_rotation = camera_rotation;
        self.camera_position = camera_position;
        true
    }

    /// Edges latched since the last physics step
    pub fn take_pressed(&mut self) -> Actions {
        std::mem::take(&mut self.pressed)
    }

    fn debounce(last: &mut f64, now: f64, window: f64) -> bool {
        if now - *last < window {
            return false;
        }
        *last = now;
        true
    }

    pub fn interact_ready(&mut self, now: f64) -> bool {
        Self::debounce(&mut self.last_interact_at, now, INTERACT_DEBOUNCE)
    }

    pub fn spawn_vehicle_ready(&mut self, now: f64) -> bool {
        Self::debounce(&mut self.last_spawn_vehicle_at, now, SPAWN_VEHICLE_DEBOUNCE)
    }

    pub fn melee_ready(&mut self, now: f64) -> bool {
        Self::debounce(&mut self.last_melee_at, now, super::combat::MELEE_COOLDOWN)
    }

    /// World-space planar movement direction from the held move keys and camera yaw
    pub fn move_direction(&self) -> Option<Vec3> {
        let mut local = Vec3::zeros();
        if self.actions.contains(Actions::MOVE_FORWARD) {
            local.z -= 1.0;
        }
        if self.actions.contains(Actions::MOVE_BACKWARD) {
            local.z += 1.0;
        }
        if self.actions.contains(Actions::MOVE_LEFT) {
            local.x -= 1.0;
        }
        if self.actions.contains(Actions::MOVE_RIGHT) {
            local.x += 1.0;
        }
        if local.norm() < 1e-6 {
            return None;
        }
        Some(yaw_rotation(yaw_of(&self.view_rotation)) * local.normalize())
    }

    pub fn move_speed(&self) -> f32 {
        if self.actions.contains(Actions::SPRINT) && !self.actions.contains(Actions::AIM) {
            SPRINT_SPEED
        } else {
            WALK_SPEED
        }
    }

    /// On-foot physics step: grounded check, velocity, facing, jump and fall reset
    pub fn step_movement(&mut self, physics: &mut PhysicsWorld, now: f64) {
        self.sync_from(physics);
        if !self.alive || self.vehicle.is_some() {
            return;
        }

        if self.position.y < FALL_LIMIT {
            let spawn = self.spawn_point;
            self.teleport(physics, spawn);
            return;
        }

        self.grounded = physics.has_ground_below(self.handle, GROUND_PROBE);
        if self.grounded {
            self.last_grounded_at = now;
        }

        let direction = self.move_direction();
        let planar = direction.map_or(Vec3::zeros(), |d| d * self.move_speed());
        let vertical = physics.linvel(self.handle).map_or(0.0, |v| v.y);
        self.velocity = Vec3::new(planar.x, vertical, planar.z);
        physics.set_linvel(self.handle, self.velocity);

        if self.actions.contains(Actions::AIM) {
            self.rotation = yaw_rotation(yaw_of(&self.view_rotation));
        } else if let Some(d) = direction {
            self.rotation = yaw_rotation(yaw_towards(&d));
        }
        physics.set_rotation(self.handle, self.rotation);

        if self.actions.contains(Actions::JUMP) {
            let can_jump = (self.grounded || now - self.last_grounded_at <= COYOTE_TIME)
                && now - self.last_jump_at > JUMP_COOLDOWN;
            if can_jump {
                self.last_jump_at = now;
                physics.apply_impulse(self.handle, Vec3::new(0.0, JUMP_IMPULSE, 0.0));
            }
        }
    }

    pub fn sync_from(&mut self, physics: &PhysicsWorld) {
        if let Some(p) = physics.translation(self.handle) {
            self.position = p;
        }
        if let Some(v) = physics.linvel(self.handle) {
            self.velocity = v;
        }
    }

    pub fn teleport(&mut self, physics: &mut PhysicsWorld, position: Vec3) {
        physics.set_translation(self.handle, position);
        physics.set_linvel(self.handle, Vec3::zeros());
        self.position = position;
        self.velocity = Vec3::zeros();
    }

    /// Keep a seated player's disabled body on its seat
    pub fn follow_seat(&mut self, physics: &mut PhysicsWorld, seat: Vec3, vehicle_velocity: Vec3) {
        physics.set_translation(self.handle, seat);
        self.position = seat;
        self.velocity = vehicle_velocity;
    }

    pub fn enter_vehicle(&mut self, physics: &mut PhysicsWorld, vehicle: EntityId) {
        self.vehicle = Some(vehicle);
        physics.set_linvel(self.handle, Vec3::zeros());
        physics.set_enabled(self.handle, false);
    }

    pub fn exit_vehicle(&mut self, physics: &mut PhysicsWorld, exit: Vec3) -> Option<EntityId> {
        let vehicle = self.vehicle.take()?;
        if self.alive {
            physics.set_enabled(self.handle, true);
        }
        self.teleport(physics, exit);
        Some(vehicle)
    }

    pub fn eye_position(&self) -> Vec3 {
        if self.received_input {
            self.camera_position
        } else {
            self.position + Vec3::new(0.0, EYE_HEIGHT, 0.0)
        }
    }

    pub fn aim_direction(&self) -> Vec3 {
        self.view_rotation * forward_axis()
    }

    /// Apply damage. Returns true only on the hit that kills.
    pub fn take_damage(&mut self, physics: &mut PhysicsWorld, damage: f32) -> bool {
        if !self.alive {
            return false;
        }
        let (health, dead) = CombatSystem::apply_damage(self.health, damage);
        self.health = health;
        if dead {
            self.alive = false;
            self.profile.deaths += 1;
            self.actions = Actions::empty();
            self.pressed = Actions::empty();
            physics.set_linvel(self.handle, Vec3::zeros());
            physics.set_enabled(self.handle, false);
        }
        dead
    }

    pub fn heal(&mut self, amount: f32) {
        if self.alive {
            self.health = CombatSystem::heal(self.health, amount);
        }
    }

    pub fn respawn(&mut self, physics: &mut PhysicsWorld, position: Vec3) {
        self.health = MAX_HEALTH;
        self.alive = true;
        if self.vehicle.is_none() {
            physics.set_enabled(self.handle, true);
        }
        self.teleport(physics, position);
    }

    /// Grant an item; returns the event describing the change
    pub fn give(&mut self, item: ItemKind, amount: u32) -> Option<PlayerEvent> {
        match item {
            ItemKind::Coin => Some(PlayerEvent::Coins {
                value: self.profile.add_coins(amount),
            }),
            ItemKind::Ammo => {
                self.ammo = self.ammo.saturating_add(amount);
                Some(self.ammo_event())
            }
            ItemKind::Pistol => {
                let granted = Holdable::from_kind(item).is_some_and(|h| self.loadout.give(h));
                granted.then(|| PlayerEvent::Slot {
                    value: self.loadout.selected,
                })
            }
        }
    }

    pub fn ammo_event(&self) -> PlayerEvent {
        PlayerEvent::Ammo {
            magazine: self.loadout.weapon().map_or(0, |w| w.ammo),
            reserve: self.ammo,
        }
    }

    /// Move rounds from the reserve into a reload. Returns `(slot, rounds, seconds)`.
    pub fn begin_reload(&mut self) -> Option<(usize, u32, f64)> {
        let slot = self.loadout.selected;
        let reserve = self.ammo;
        let weapon = self.loadout.weapon_mut()?;
        let rounds = weapon.rounds_needed().min(reserve);
        if rounds == 0 || !weapon.begin_reload() {
            return None;
        }
        let duration = weapon.stats.reload_time;
        self.ammo -= rounds;
        Some((slot, rounds, duration))
    }

    pub fn finish_reload(&mut self, slot: usize, rounds: u32) {
        if let Some(weapon) = self.loadout.weapon_in_slot_mut(slot) {
            weapon.finish_reload(rounds);
        }
    }

    pub fn record(&self) -> PlayerRecord {
        PlayerRecord {
            id: self.id.to_string(),
            position: to_array3(&self.position),
            rotation: to_array4(&self.rotation),
            velocity: to_array3(&self.velocity),
            view_rotation: to_array4(&self.view_rotation),
            actions: self.actions,
            last_processed_seq: self.last_processed_input_seq,
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            nickname: self.profile.nickname.clone(),
            color: self.profile.color.clone(),
            position: to_array3(&self.position),
            quaternion: to_array4(&self.rotation),
            health: self.health,
            coins: self.profile.coins,
            ammo: self.ammo,
            kills: self.profile.kills,
            deaths: self.profile.deaths,
            is_dead: !self.alive,
            vehicle: self.vehicle,
            loadout: self.loadout.clone(),
        }
    }
}

/// Spawn position for a new or respawning player
pub fn choose_spawn<R: Rng>(spawn_points: &[[f32; 3]], fallback: [f32; 3], rng: &mut R) -> Vec3 {
    if spawn_points.is_empty() {
        return vec_from_array(fallback);
    }
    vec_from_array(spawn_points[rng.gen_range(0..spawn_points.len())])
}
