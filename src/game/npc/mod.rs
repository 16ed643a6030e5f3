//! Server-driven characters: body, weapon and brain

pub mod brain;
pub mod nav;

pub use brain::{Brain, Decision, Perception};
pub use nav::{NavGrid, Obstacle};

use serde::Serialize;
use uuid::Uuid;

use crate::game::combat::{CombatSystem, Weapon, MAX_HEALTH};
use crate::game::physics::{PhysicsHandle, PhysicsWorld};
use crate::game::{EntityId, CAPSULE_HALF_HEIGHT, CAPSULE_RADIUS, EYE_HEIGHT, FALL_LIMIT};
use crate::util::math::{to_array3, to_array4, yaw_rotation, yaw_towards, Quat, Vec3};
use crate::wire::{Actions, NpcRecord};

/// Seconds a dead NPC stays in the world before removal
pub const REMOVAL_DELAY: f64 = 2.0;

/// Extra aim error per meter of distance
pub const SPREAD_PER_METER: f32 = 0.001;
pub const BASE_SPREAD: f32 = 0.01;

/// Aim jitter for a shot at `distance`
pub fn shot_spread(distance: f32) -> f32 {
    BASE_SPREAD + distance * SPREAD_PER_METER
}

/// What the world has to do after an NPC physics step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NpcStep {
    /// First step after death: schedule removal
    pub schedule_removal: bool,
    pub fell_out: bool,
}

/// NPC description for `add_npc` and world JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NpcInfo {
    pub id: EntityId,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub health: f32,
    pub is_dead: bool,
}

#[derive(Debug, Clone)]
pub struct Npc {
    pub id: EntityId,
    pub handle: PhysicsHandle,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub health: f32,
    pub weapon: Weapon,
    pub actions: Actions,
    pub brain: Brain,
    pub spawn_point: Vec3,
    /// Index of the spawner that produced this NPC, if any
    pub spawner: Option<usize>,
    desired_velocity: Vec3,
    death_handled: bool,
}

impl Npc {
    pub fn spawn(physics: &mut PhysicsWorld, position: Vec3, spawner: Option<usize>) -> Self {
        let handle = physics.create_capsule(position, CAPSULE_HALF_HEIGHT, CAPSULE_RADIUS);
        Self {
            id: Uuid::new_v4(),
            handle,
            position,
            rotation: Quat::identity(),
            velocity: Vec3::zeros(),
            health: MAX_HEALTH,
            weapon: Weapon::pistol(),
            actions: Actions::empty(),
            brain: Brain::new(),
            spawn_point: position,
            spawner,
            desired_velocity: Vec3::zeros(),
            death_handled: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn eye_position(&self) -> Vec3 {
        self.position + Vec3::new(0.0, EYE_HEIGHT, 0.0)
    }

    /// Take damage. Returns true only on the hit that kills.
    pub fn take_damage(&mut self, damage: f32) -> bool {
        if !self.is_alive() {
            return false;
        }
        let (health, dead) = CombatSystem::apply_damage(self.health, damage);
        self.health = health;
        if dead {
            self.brain.kill();
            self.actions = Actions::empty();
            self.desired_velocity = Vec3::zeros();
        }
        dead
    }

    /// Adopt a brain decision for the next physics steps
    pub fn apply_decision(&mut self, decision: &Decision) {
        if !self.is_alive() {
            return;
        }
        self.desired_velocity = decision.velocity;
        if let Some(facing) = decision.facing.filter(|f| f.norm() > 1e-6) {
            self.rotation = yaw_rotation(yaw_towards(&facing));
        }

        let mut actions = Actions::empty();
        actions.set(Actions::MOVE_FORWARD, decision.velocity.norm() > 1e-3);
        actions.set(Actions::AIM, decision.aim);
        actions.set(Actions::SHOOT, decision.fire);
        actions.set(Actions::RELOAD, self.weapon.is_reloading);
        self.actions = actions;
    }

    /// Start a reload when the magazine is empty. NPCs carry unlimited reserve.
    pub fn needs_reload(&mut self) -> bool {
        self.is_alive() && self.weapon.ammo == 0 && self.weapon.begin_reload()
    }

    pub fn fixed_update(&mut self, physics: &mut PhysicsWorld) -> NpcStep {
        let mut step = NpcStep::default();
        self.sync_from(physics);

        if !self.is_alive() {
            if !self.death_handled {
                self.death_handled = true;
                physics.remove_collider(self.handle.collider);
                physics.set_linvel(self.handle, Vec3::zeros());
                physics.set_enabled(self.handle, false);
                step.schedule_removal = true;
            }
            return step;
        }

        if self.position.y < FALL_LIMIT {
            physics.set_translation(self.handle, self.spawn_point);
            physics.set_linvel(self.handle, Vec3::zeros());
            self.sync_from(physics);
            step.fell_out = true;
            return step;
        }

        let vertical = physics.linvel(self.handle).map_or(0.0, |v| v.y);
        physics.set_linvel(
            self.handle,
            Vec3::new(self.desired_velocity.x, vertical, self.desired_velocity.z),
        );
        physics.set_rotation(self.handle, self.rotation);
        step
    }

    fn sync_from(&mut self, physics: &PhysicsWorld) {
        if let Some(p) = physics.translation(self.handle) {
            self.position = p;
        }
        if let Some(v) = physics.linvel(self.handle) {
            self.velocity = v;
        }
    }

    pub fn info(&self) -> NpcInfo {
        NpcInfo {
            id: self.id,
            position: to_array3(&self.position),
            quaternion: to_array4(&self.rotation),
            health: self.health,
            is_dead: !self.is_alive(),
        }
    }

    pub fn record(&self) -> NpcRecord {
        NpcRecord {
            id: self.id.to_string(),
            position: to_array3(&self.position),
            rotation: to_array4(&self.rotation),
            velocity: to_array3(&self.velocity),
            view_rotation: to_array4(&self.rotation),
            actions: self.actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::BodyKind;

    fn ground(physics: &mut PhysicsWorld) {
        physics.create_box(
            BodyKind::Fixed,
            Vec3::new(0.0, -0.5, 0.0),
            Quat::identity(),
            Vec3::new(50.0, 0.5, 50.0),
        );
    }

    #[test]
    fn death_is_handled_once() {
        let mut physics = PhysicsWorld::new();
        ground(&mut physics);
        let mut npc = Npc::spawn(&mut physics, Vec3::new(0.0, 1.0, 0.0), None);

        assert!(!npc.take_damage(60.0));
        assert!(npc.take_damage(60.0));
        assert!(!npc.take_damage(60.0));
        assert!(npc.brain.is_dead());

        assert!(npc.fixed_update(&mut physics).schedule_removal);
        assert!(!npc.fixed_update(&mut physics).schedule_removal);
    }

    #[test]
    fn decision_drives_velocity_and_facing() {
        let mut physics = PhysicsWorld::new();
        ground(&mut physics);
        let mut npc = Npc::spawn(&mut physics, Vec3::new(0.0, 1.0, 0.0), None);

        let decision = Decision {
            velocity: Vec3::new(4.0, 0.0, 0.0),
            facing: Some(Vec3::new(1.0, 0.0, 0.0)),
            aim: true,
            fire: false,
            repath_to: None,
        };
        npc.apply_decision(&decision);
        assert!(npc.actions.contains(Actions::MOVE_FORWARD | Actions::AIM));

        for _ in 0..30 {
            npc.fixed_update(&mut physics);
            physics.step(1.0 / 60.0);
        }
        npc.fixed_update(&mut physics);
        assert!(npc.position.x > 1.0);
        let look = npc.rotation * crate::util::math::forward_axis();
        assert!((look.x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn falling_out_resets_to_spawn() {
        let mut physics = PhysicsWorld::new();
        let mut npc = Npc::spawn(&mut physics, Vec3::new(3.0, 2.0, 3.0), None);
        physics.set_translation(npc.handle, Vec3::new(0.0, -150.0, 0.0));
        let step = npc.fixed_update(&mut physics);
        assert!(step.fell_out);
        assert_eq!(npc.position, Vec3::new(3.0, 2.0, 3.0));
    }

    #[test]
    fn empty_magazine_triggers_reload() {
        let mut physics = PhysicsWorld::new();
        let mut npc = Npc::spawn(&mut physics, Vec3::zeros(), None);
        assert!(!npc.needs_reload());
        npc.weapon.ammo = 0;
        assert!(npc.needs_reload());
        assert!(!npc.needs_reload());
    }

    #[test]
    fn spread_grows_with_distance() {
        assert!(shot_spread(50.0) > shot_spread(5.0));
        assert!((shot_spread(0.0) - BASE_SPREAD).abs() < f32::EPSILON);
    }
}
