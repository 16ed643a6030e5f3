//! Gameplay-rate work: NPC perception and decisions, race progression

use tracing::trace;

use super::{WorldSim, WorldTask};
use crate::game::combat::CombatSystem;
use crate::game::npc::{shot_spread, Perception};
use crate::game::SessionId;

impl WorldSim {
    /// One gameplay tick
    pub fn update(&mut self) {
        self.update_npcs();
        self.update_race();
    }

    fn update_npcs(&mut self) {
        let now = self.clock;
        for index in 0..self.npcs.len() {
            if !self.npcs[index].is_alive() {
                continue;
            }

            let target = self.select_target(index);
            self.npcs[index].brain.set_target(target);
            let perception = target.and_then(|t| self.perceive(index, t));

            let npc = &mut self.npcs[index];
            let decision = npc.brain.think(now, perception.as_ref(), &mut self.rng);
            if let Some(goal) = decision.repath_to {
                let path = self.nav.find_path(&npc.position, &goal).unwrap_or_default();
                trace!(npc_id = %npc.id, waypoints = path.len(), "NPC repathed");
                npc.brain.set_path(path);
            }
            npc.apply_decision(&decision);

            if decision.fire {
                if let Some(target) = target {
                    self.npc_fire(index, target, now);
                }
            }

            let npc = &mut self.npcs[index];
            if npc.needs_reload() {
                let delay = npc.weapon.stats.reload_time;
                self.tasks
                    .schedule_in(now, delay, WorldTask::NpcReload(npc.id));
            }
        }
    }

    /// Keep the current target while it is still present, else pick the nearest player
    fn select_target(&self, index: usize) -> Option<SessionId> {
        let npc = &self.npcs[index];
        let valid = |id: &SessionId| {
            self.players
                .get(id)
                .is_some_and(|p| p.alive && p.vehicle.is_none())
        };
        if let Some(current) = npc.brain.target.filter(valid) {
            return Some(current);
        }
        self.players
            .values()
            .filter(|p| p.alive && p.vehicle.is_none())
            .map(|p| (p.id, (p.position - npc.position).norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Line of sight: the first thing a ray from the NPC's eyes meets is the target
    fn perceive(&self, index: usize, target: SessionId) -> Option<Perception> {
        let npc = &self.npcs[index];
        let player = self.players.get(&target)?;
        let origin = npc.eye_position();
        let offset = player.position - origin;
        let distance = offset.norm();
        let has_los = match self
            .physics
            .cast_ray(origin, offset, distance, Some(npc.handle.body))
        {
            Some(hit) => hit.collider == player.handle.collider,
            None => true,
        };
        Some(Perception {
            position: npc.position,
            target_position: player.position,
            has_los,
        })
    }

    fn npc_fire(&mut self, index: usize, target: SessionId, now: f64) {
        let Some(aim_point) = self.players.get(&target).map(|p| p.position) else {
            return;
        };
        let npc = &mut self.npcs[index];
        if !npc.weapon.fire(now) {
            return;
        }
        let origin = npc.eye_position();
        let offset = aim_point - origin;
        let Some(direction) = offset.try_normalize(1e-6) else {
            return;
        };
        let direction =
            CombatSystem::spread_direction(&direction, shot_spread(offset.norm()), &mut self.rng);
        let (id, body, damage) = (npc.id, npc.handle.body, npc.weapon.stats.damage);
        self.resolve_shot(Some(id), origin, direction, damage, body);
    }

    fn update_race(&mut self) {
        let Some(race) = self.race.as_mut() else {
            return;
        };
        let car_position = race
            .leader()
            .and_then(|id| self.players.get(&id))
            .and_then(|p| p.vehicle)
            .and_then(|vid| self.vehicles.iter().find(|v| v.id == vid))
            .map(|v| v.position);
        let events = race.update(self.clock, car_position);
        self.apply_race_events(events);
    }
}
