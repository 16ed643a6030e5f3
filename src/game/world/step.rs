//! Physics-rate work: latched player intents, vehicles, ramming, zones and timers

use rapier3d::prelude::ColliderHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{HitTarget, WorldSim, WorldTask};
use crate::game::combat::{CombatSystem, ACHIEVEMENT_BONUS, MELEE_DAMAGE, MELEE_RANGE, SHOT_RANGE};
use crate::game::player::{VEHICLE_COST, VEHICLE_ENTER_RADIUS};
use crate::game::settings::SpawnerKind;
use crate::game::vehicle::{CHASSIS_HALF_EXTENTS, STUNT_REWARD};
use crate::game::zone::{nearest_pickup, ZoneAction};
use crate::game::{EntityId, SessionId, CAPSULE_HALF_HEIGHT, CAPSULE_RADIUS};
use crate::util::math::{forward_axis, yaw_of, yaw_rotation, Vec3};
use crate::wire::Actions;
use crate::ws::protocol::{NotificationKind, PlayerEvent, ServerMsg};

/// Slowest car that still hurts a pedestrian
const RAM_MIN_SPEED: f32 = 1.0;
/// Cosine of the widest angle off the bumper that counts as a ram
const RAM_FRONT_DOT: f32 = 0.5;
/// Slack added to the chassis box when testing contact
const RAM_MARGIN: f32 = 0.15;
/// Spawned cars drop in from this high above the buyer
const VEHICLE_SPAWN_HEIGHT: f32 = 5.0;

impl WorldSim {
    /// One fixed physics step of `dt` seconds
    pub fn fixed_update(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.clock += dt;
        let now = self.clock;

        self.physics.step(dt as f32);

        let sessions: Vec<SessionId> = self.players.keys().copied().collect();
        for id in &sessions {
            self.process_intents(*id, now);
        }
        for id in &sessions {
            if let Some(player) = self.players.get_mut(id) {
                player.step_movement(&mut self.physics, now);
            }
        }

        self.step_vehicles(now, dt as f32);
        self.follow_seats();
        self.resolve_rams(now);

        for npc in &mut self.npcs {
            let step = npc.fixed_update(&mut self.physics);
            if step.schedule_removal {
                self.tasks
                    .schedule_in(now, self.sim.npc_removal_delay, WorldTask::RemoveNpc(npc.id));
            }
        }

        self.trigger_zones();
        self.run_due_tasks();
        self.despawn_idle_vehicles(now);
    }

    /// Consume the input edges latched since the previous step
    fn process_intents(&mut self, id: SessionId, now: f64) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        let pressed = player.take_pressed();
        if !player.alive {
            return;
        }
        let held = player.actions;
        let seated = player.vehicle.is_some();

        if let Some(slot) = pressed.slot_index() {
            if player.loadout.select(slot) {
                self.outbox.player_event(id, PlayerEvent::Slot { value: slot });
            }
        }

        if held.contains(Actions::INTERACT) {
            if self.players.get_mut(&id).is_some_and(|p| p.interact_ready(now)) {
                if seated {
                    self.unseat_player(id);
                } else if let Some(vehicle_id) = self.nearest_vehicle(id) {
                    self.seat_player(id, vehicle_id);
                }
            }
            if !seated {
                self.interact_with_pickups(id);
            }
        }

        if pressed.contains(Actions::SPAWN_VEHICLE) && !seated {
            self.buy_vehicle(id, now);
        }

        if pressed.contains(Actions::RELOAD) {
            self.start_reload(id, now);
        }

        if pressed.contains(Actions::SHOOT) && !seated {
            let armed = self
                .players
                .get(&id)
                .is_some_and(|p| p.loadout.weapon().is_some());
            if armed && held.contains(Actions::AIM) {
                self.player_fire(id, now);
            } else {
                self.player_melee(id, now);
            }
        }
    }

    fn nearest_vehicle(&self, id: SessionId) -> Option<EntityId> {
        let position = self.players.get(&id)?.position;
        self.vehicles
            .iter()
            .filter(|v| v.seats.iter().any(|s| s.occupant.is_none()))
            .map(|v| (v.id, (v.position - position).norm()))
            .filter(|(_, d)| *d <= VEHICLE_ENTER_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(vid, _)| vid)
    }

    fn interact_with_pickups(&mut self, id: SessionId) {
        let Some(position) = self.players.get(&id).map(|p| p.position) else {
            return;
        };
        let Some(pickup_id) = nearest_pickup(self.pickups.iter(), &position) else {
            return;
        };
        let Some(grant) = self
            .pickups
            .iter_mut()
            .find(|p| p.id == pickup_id)
            .and_then(|p| p.use_by(id))
        else {
            return;
        };
        let (item, amount) = grant;
        if let Some(event) = self.players.get_mut(&id).and_then(|p| p.give(item, amount)) {
            self.outbox.player_event(id, event);
        }
        self.remove_pickup(pickup_id);
    }

    fn buy_vehicle(&mut self, id: SessionId, now: f64) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if !player.spawn_vehicle_ready(now) {
            return;
        }
        if !player.profile.spend_coins(VEHICLE_COST) {
            self.outbox.notify(
                id,
                NotificationKind::Error,
                format!("You need {VEHICLE_COST} coins to spawn a vehicle"),
            );
            return;
        }
        let coins = player.profile.coins;
        let position = player.position + Vec3::new(0.0, VEHICLE_SPAWN_HEIGHT, 0.0);
        // Cars drive along +Z, players look down -Z
        let rotation = yaw_rotation(yaw_of(&player.rotation) + std::f32::consts::PI);

        self.outbox.player_event(id, PlayerEvent::Coins { value: coins });
        let vehicle_id = self.spawn_vehicle(position, rotation);
        self.seat_player(id, vehicle_id);
        self.outbox
            .notify(id, NotificationKind::Success, format!("Vehicle spawned for {VEHICLE_COST} coins"));
    }

    fn start_reload(&mut self, id: SessionId, now: f64) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        let Some((slot, rounds, duration)) = player.begin_reload() else {
            return;
        };
        let reserve = player.ammo;
        self.tasks.schedule_in(
            now,
            duration,
            WorldTask::FinishReload {
                session: id,
                slot,
                rounds,
            },
        );
        self.outbox.player_event(
            id,
            PlayerEvent::Reload {
                duration,
                amount: rounds,
                reserve,
            },
        );
    }

    fn player_fire(&mut self, id: SessionId, now: f64) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        let Some(weapon) = player.loadout.weapon_mut() else {
            return;
        };
        if !weapon.fire(now) {
            return;
        }
        let damage = weapon.stats.damage;
        let origin = player.eye_position();
        let direction = player.aim_direction();
        let body = player.handle.body;
        let ammo = player.ammo_event();
        self.outbox.player_event(id, ammo);
        self.resolve_shot(Some(id), origin, direction, damage, body);
    }

    /// Cast a shot ray, apply body-part damage and announce the hit
    pub(super) fn resolve_shot(
        &mut self,
        attacker: Option<EntityId>,
        origin: Vec3,
        direction: Vec3,
        base_damage: f32,
        shooter: rapier3d::prelude::RigidBodyHandle,
    ) {
        let Some(hit) = self
            .physics
            .cast_ray(origin, direction, SHOT_RANGE, Some(shooter))
        else {
            return;
        };
        let target = self.target_of(hit.collider);
        match target {
            HitTarget::Player(_) | HitTarget::Npc(_) => {
                let center = self.physics.collider_center(hit.collider).unwrap_or(hit.point);
                let info = CombatSystem::resolve_hit(base_damage, &hit.point, &center, hit.distance);
                self.outbox.room(ServerMsg::RegisterHit {
                    position: crate::util::math::to_array3(&hit.point),
                    target: target.id(),
                    body_part: Some(info.part),
                    damage: info.damage,
                });
                self.damage_target(target, info.damage, attacker);
            }
            HitTarget::Vehicle(_) | HitTarget::Scenery => {
                self.outbox.room(ServerMsg::RegisterHit {
                    position: crate::util::math::to_array3(&hit.point),
                    target: target.id(),
                    body_part: None,
                    damage: 0.0,
                });
            }
        }
    }

    fn player_melee(&mut self, id: SessionId, now: f64) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if !player.melee_ready(now) {
            return;
        }
        let origin = player.position;
        let direction = player.rotation * forward_axis();
        let body = player.handle.body;

        let target = self
            .physics
            .cast_ray(origin, direction, CAPSULE_RADIUS + MELEE_RANGE, Some(body))
            .map(|hit| self.target_of(hit.collider))
            .filter(|t| matches!(t, HitTarget::Player(_) | HitTarget::Npc(_)));

        self.outbox.player_event(
            id,
            PlayerEvent::Melee {
                target: target.and_then(HitTarget::id),
            },
        );
        if let Some(target) = target {
            self.damage_target(target, MELEE_DAMAGE, Some(id));
        }
    }

    pub(super) fn target_of(&self, collider: ColliderHandle) -> HitTarget {
        if let Some(p) = self.players.values().find(|p| p.handle.collider == collider) {
            return HitTarget::Player(p.id);
        }
        if let Some(n) = self.npcs.iter().find(|n| n.handle.collider == collider) {
            return HitTarget::Npc(n.id);
        }
        if let Some(v) = self.vehicles.iter().find(|v| v.handle.collider == collider) {
            return HitTarget::Vehicle(v.id);
        }
        HitTarget::Scenery
    }

    /// Returns true when the damage killed the target
    pub(super) fn damage_target(&mut self, target: HitTarget, damage: f32, attacker: Option<Uuid>) -> bool {
        match target {
            HitTarget::Player(id) => self.damage_player(id, damage, attacker),
            HitTarget::Npc(id) => {
                let killed = self
                    .npcs
                    .iter_mut()
                    .find(|n| n.id == id)
                    .is_some_and(|n| n.take_damage(damage));
                if killed {
                    debug!(npc_id = %id, "NPC killed");
                    if let Some(killer) = attacker {
                        self.reward_kill(killer);
                    }
                }
                killed
            }
            HitTarget::Vehicle(_) | HitTarget::Scenery => false,
        }
    }

    pub(super) fn damage_player(&mut self, id: SessionId, damage: f32, attacker: Option<Uuid>) -> bool {
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };
        if !player.alive {
            return false;
        }
        let before = player.health.ceil();
        let killed = player.take_damage(&mut self.physics, damage);
        if player.health.ceil() != before {
            let value = player.health;
            self.outbox.player_event(id, PlayerEvent::Health { value });
        }
        if killed {
            self.unseat_player(id);
            self.outbox.player_event(id, PlayerEvent::Death { killer: attacker });
            debug!(session_id = %id, "Player died");
            if let Some(killer) = attacker.filter(|k| *k != id) {
                self.reward_kill(killer);
            }
        }
        killed
    }

    /// Coins and achievements for a kill; ignored when the killer is not a player
    fn reward_kill(&mut self, killer: Uuid) {
        let reward = CombatSystem::kill_reward(&mut self.rng);
        let Some(player) = self.players.get_mut(&killer) else {
            return;
        };
        let mut coins = player.profile.add_coins(reward);
        if player.profile.record_kill() {
            coins = player.profile.add_coins(ACHIEVEMENT_BONUS);
            let kills = player.profile.kills;
            self.outbox.notify(
                killer,
                NotificationKind::Achievement,
                format!("{kills} kills! +{ACHIEVEMENT_BONUS} coins"),
            );
        }
        self.outbox.player_event(killer, PlayerEvent::Coins { value: coins });
    }

    fn step_vehicles(&mut self, now: f64, dt: f32) {
        for vehicle in &mut self.vehicles {
            let driver = vehicle
                .driver()
                .and_then(|d| self.players.get(&d))
                .filter(|p| p.alive);
            let driver_actions = driver.map(|p| p.actions);
            if let Some(p) = driver {
                vehicle.set_horn(p.id, p.actions.contains(Actions::USE_HORN));
            }

            let outcome = vehicle.step(&mut self.physics, driver_actions, now, dt);
            if outcome.recovered_from_flip {
                debug!(vehicle_id = %vehicle.id, "Vehicle flipped upright");
            }
            if let Some(stunter) = outcome.stunt_by {
                if let Some(player) = self.players.get_mut(&stunter) {
                    let coins = player.profile.add_coins(STUNT_REWARD);
                    self.outbox.player_event(stunter, PlayerEvent::Coins { value: coins });
                    self.outbox.notify(
                        stunter,
                        NotificationKind::Success,
                        format!("Stunt! +{STUNT_REWARD} coins"),
                    );
                }
            }
        }
    }

    fn follow_seats(&mut self) {
        for vehicle in &self.vehicles {
            for (index, seat) in vehicle.seats.iter().enumerate() {
                let Some(occupant) = seat.occupant else {
                    continue;
                };
                let (Some(player), Some(position)) =
                    (self.players.get_mut(&occupant), vehicle.seat_world_position(index))
                else {
                    trace!(vehicle_id = %vehicle.id, "Seat occupant missing");
                    continue;
                };
                player.follow_seat(&mut self.physics, position, vehicle.linear_velocity);
            }
        }
    }

    /// Pedestrians touching the front of a moving car take speed-scaled damage
    fn resolve_rams(&mut self, now: f64) {
        let [hx, hy, hz] = CHASSIS_HALF_EXTENTS;
        let reach = CAPSULE_RADIUS + RAM_MARGIN;
        let vertical_reach = hy + CAPSULE_HALF_HEIGHT + CAPSULE_RADIUS + RAM_MARGIN;

        let mut hits = Vec::new();
        for vehicle in &mut self.vehicles {
            let speed = vehicle.speed();
            if speed < RAM_MIN_SPEED {
                continue;
            }
            let forward = vehicle.forward();
            let inverse = vehicle.rotation.inverse();
            for player in self.players.values() {
                if !player.alive || player.vehicle.is_some() {
                    continue;
                }
                let offset = player.position - vehicle.position;
                let local = inverse * offset;
                if local.x.abs() > hx + reach || local.y.abs() > vertical_reach || local.z.abs() > hz + reach {
                    continue;
                }
                let Some(direction) = offset.try_normalize(1e-6) else {
                    continue;
                };
                if direction.dot(&forward) <= RAM_FRONT_DOT {
                    continue;
                }
                if vehicle.try_ram(player.id, now) {
                    hits.push((player.id, CombatSystem::ram_damage(speed), vehicle.driver()));
                }
            }
        }

        for (victim, damage, driver) in hits {
            debug!(session_id = %victim, damage, "Rammed by vehicle");
            self.damage_player(victim, damage, driver);
        }
    }

    fn trigger_zones(&mut self) {
        let mut effects = Vec::new();
        for zone in &self.zones {
            if zone.action == ZoneAction::Passive {
                continue;
            }
            for player in self.players.values() {
                if player.alive && player.vehicle.is_none() && zone.contains(&player.position) {
                    effects.push((zone.id, player.id, zone.action, zone.is_consumed_on_trigger()));
                }
            }
        }

        let mut consumed: Vec<EntityId> = Vec::new();
        for (zone_id, session, action, consumes) in effects {
            if consumed.contains(&zone_id) {
                continue;
            }
            match action {
                ZoneAction::Damage { amount } => {
                    self.damage_player(session, amount, None);
                }
                ZoneAction::Heal { amount } => {
                    if let Some(player) = self.players.get_mut(&session) {
                        let before = player.health.ceil();
                        player.heal(amount);
                        if player.health.ceil() != before {
                            let value = player.health;
                            self.outbox.player_event(session, PlayerEvent::Health { value });
                        }
                    }
                }
                ZoneAction::Pickup { item, amount } => {
                    if let Some(event) = self.players.get_mut(&session).and_then(|p| p.give(item, amount)) {
                        self.outbox.player_event(session, event);
                    }
                }
                ZoneAction::Passive => {}
            }
            if consumes {
                consumed.push(zone_id);
            }
        }
        for id in consumed {
            self.remove_zone(id);
        }
    }

    fn run_due_tasks(&mut self) {
        for task in self.tasks.take_due(self.clock) {
            match task {
                WorldTask::FinishReload { session, slot, rounds } => {
                    if let Some(player) = self.players.get_mut(&session) {
                        player.finish_reload(slot, rounds);
                        let event = player.ammo_event();
                        self.outbox.player_event(session, event);
                    }
                }
                WorldTask::NpcReload(id) => {
                    if let Some(npc) = self.npcs.iter_mut().find(|n| n.id == id) {
                        let rounds = npc.weapon.rounds_needed();
                        npc.weapon.finish_reload(rounds);
                    }
                }
                WorldTask::RemoveNpc(id) => {
                    self.remove_npc(id);
                }
                WorldTask::Spawn(index) => self.run_spawner(index),
            }
        }
    }

    /// Spawn one object if the spawner is under its cap, then re-arm it
    fn run_spawner(&mut self, index: usize) {
        let Some(spawner) = self.spawners.get(index).cloned() else {
            return;
        };
        let alive = match spawner.spawner_type {
            SpawnerKind::Coin => self
                .pickups
                .iter()
                .filter(|p| p.spawner == Some(index) && p.is_active())
                .count(),
            SpawnerKind::Npc => self
                .npcs
                .iter()
                .filter(|n| n.spawner == Some(index) && n.is_alive())
                .count(),
        };
        if alive < spawner.max_alive {
            let position = self.spawn_point_in(&spawner);
            match spawner.spawner_type {
                SpawnerKind::Coin => {
                    self.spawn_coin(position, Some(index));
                }
                SpawnerKind::Npc => {
                    self.spawn_npc(position, Some(index));
                }
            }
            trace!(spawner = %spawner.name, alive = alive + 1, "Spawner fired");
        }
        self.tasks
            .schedule_in(self.clock, spawner.delay, WorldTask::Spawn(index));
    }

    fn despawn_idle_vehicles(&mut self, now: f64) {
        let limit = self.sim.vehicle_idle_secs;
        let idle: Vec<EntityId> = self
            .vehicles
            .iter()
            .filter(|v| v.idle_for(now) > limit)
            .map(|v| v.id)
            .collect();
        for id in idle {
            self.despawn_vehicle(id);
        }
    }
}
