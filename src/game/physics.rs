//! Rigid-body physics service owned by a single world.
//!
//! Thin wrapper over rapier: entities only ever hold a [`PhysicsHandle`] and go through
//! this type for forces, transforms and queries.

use rapier3d::prelude::*;

use crate::util::math::{Point3, Quat, Vec3};

/// Standard gravity applied to every world
pub const GRAVITY: f32 = -9.81;

/// Per-entity reference into a [`PhysicsWorld`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicsHandle {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
}

/// Result of a ray query
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub collider: ColliderHandle,
    pub distance: f32,
    pub point: Vec3,
}

/// Body kinds the world knows how to build
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyKind {
    Fixed,
    Dynamic,
}

pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            gravity: Vec3::new(0.0, GRAVITY, 0.0),
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        }
    }

    /// Advance the simulation by `dt` seconds. Non-positive steps are ignored.
    pub fn step(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    fn insert(&mut self, body: RigidBody, collider: Collider) -> PhysicsHandle {
        let body = self.bodies.insert(body);
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        PhysicsHandle { body, collider }
    }

    /// Box with the given half extents
    pub fn create_box(
        &mut self,
        kind: BodyKind,
        position: Vec3,
        rotation: Quat,
        half_extents: Vec3,
    ) -> PhysicsHandle {
        let builder = match kind {
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
        };
        let mut body = builder.translation(position).build();
        body.set_rotation(rotation, false);
        let collider =
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z).build();
        self.insert(body, collider)
    }

    /// Upright character capsule that never tips over
    pub fn create_capsule(&mut self, position: Vec3, half_height: f32, radius: f32) -> PhysicsHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(position)
            .lock_rotations()
            .build();
        let collider = ColliderBuilder::capsule_y(half_height, radius).build();
        self.insert(body, collider)
    }

    /// Chassis body for a vehicle
    pub fn create_chassis(
        &mut self,
        position: Vec3,
        rotation: Quat,
        half_extents: Vec3,
        additional_mass: f32,
    ) -> PhysicsHandle {
        let mut body = RigidBodyBuilder::dynamic()
            .translation(position)
            .additional_mass(additional_mass)
            .can_sleep(false)
            .build();
        body.set_rotation(rotation, false);
        let collider =
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z).build();
        self.insert(body, collider)
    }

    /// Remove a body and its collider. Must be the last use of `handle`.
    pub fn remove(&mut self, handle: PhysicsHandle) {
        self.bodies.remove(
            handle.body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Detach a collider while keeping its body, e.g. for corpses
    pub fn remove_collider(&mut self, collider: ColliderHandle) {
        self.colliders
            .remove(collider, &mut self.islands, &mut self.bodies, true);
    }

    #[cfg(test)]
    pub fn contains(&self, handle: PhysicsHandle) -> bool {
        self.bodies.contains(handle.body)
    }

    pub fn translation(&self, handle: PhysicsHandle) -> Option<Vec3> {
        self.bodies.get(handle.body).map(|b| *b.translation())
    }

    pub fn rotation(&self, handle: PhysicsHandle) -> Option<Quat> {
        self.bodies.get(handle.body).map(|b| *b.rotation())
    }

    pub fn linvel(&self, handle: PhysicsHandle) -> Option<Vec3> {
        self.bodies.get(handle.body).map(|b| *b.linvel())
    }

    pub fn angvel(&self, handle: PhysicsHandle) -> Option<Vec3> {
        self.bodies.get(handle.body).map(|b| *b.angvel())
    }

    /// Velocity of the body's material point at world position `point`
    pub fn velocity_at_point(&self, handle: PhysicsHandle, point: Vec3) -> Option<Vec3> {
        self.bodies
            .get(handle.body)
            .map(|b| b.velocity_at_point(&Point3::from(point)))
    }

    pub fn set_translation(&mut self, handle: PhysicsHandle, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle.body) {
            body.set_translation(position, true);
        }
    }

    pub fn set_rotation(&mut self, handle: PhysicsHandle, rotation: Quat) {
        if let Some(body) = self.bodies.get_mut(handle.body) {
            body.set_rotation(rotation, true);
        }
    }

    pub fn set_linvel(&mut self, handle: PhysicsHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle.body) {
            body.set_linvel(velocity, true);
        }
    }

    pub fn set_angvel(&mut self, handle: PhysicsHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle.body) {
            body.set_angvel(velocity, true);
        }
    }

    /// Enable or disable a body. Disabled bodies neither move nor collide.
    pub fn set_enabled(&mut self, handle: PhysicsHandle, enabled: bool) {
        if let Some(body) = self.bodies.get_mut(handle.body) {
            body.set_enabled(enabled);
        }
    }

    pub fn apply_impulse(&mut self, handle: PhysicsHandle, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle.body) {
            body.apply_impulse(impulse, true);
        }
    }

    pub fn apply_impulse_at_point(&mut self, handle: PhysicsHandle, impulse: Vec3, point: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle.body) {
            body.apply_impulse_at_point(impulse, Point3::from(point), true);
        }
    }

    /// Body owning a collider, if both still exist
    #[cfg(test)]
    pub fn body_of(&self, collider: ColliderHandle) -> Option<RigidBodyHandle> {
        self.colliders.get(collider).and_then(|c| c.parent())
    }

    /// World-space centre of a collider
    pub fn collider_center(&self, collider: ColliderHandle) -> Option<Vec3> {
        self.colliders.get(collider).map(|c| *c.translation())
    }

    /// First solid hit along `direction` within `max_distance`, skipping `exclude`
    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<RayHit> {
        let norm = direction.norm();
        if !(norm.is_finite() && norm > 1e-6) || max_distance <= 0.0 {
            return None;
        }
        let dir = direction / norm;
        let mut filter = QueryFilter::default();
        if let Some(body) = exclude {
            filter = filter.exclude_rigid_body(body);
        }
        let query = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        );
        let ray = Ray::new(Point3::from(origin), dir);
        query
            .cast_ray(&ray, max_distance, true)
            .map(|(collider, distance)| RayHit {
                collider,
                distance,
                point: origin + dir * distance,
            })
    }

    /// True when something solid lies within `distance` straight below the body centre
    pub fn has_ground_below(&self, handle: PhysicsHandle, distance: f32) -> bool {
        self.translation(handle)
            .and_then(|pos| {
                self.cast_ray(pos, Vec3::new(0.0, -1.0, 0.0), distance, Some(handle.body))
            })
            .is_some()
    }

    #[cfg(test)]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_ground() -> (PhysicsWorld, PhysicsHandle) {
        let mut world = PhysicsWorld::new();
        let ground = world.create_box(
            BodyKind::Fixed,
            Vec3::new(0.0, -0.5, 0.0),
            Quat::identity(),
            Vec3::new(50.0, 0.05, 50.0),
        );
        (world, ground)
    }

    #[test]
    fn capsule_falls_and_lands() {
        let (mut world, _) = world_with_ground();
        let capsule = world.create_capsule(Vec3::new(0.0, 5.0, 0.0), 0.55, 0.275);
        assert_eq!(world.translation(capsule), Some(Vec3::new(0.0, 5.0, 0.0)));

        for _ in 0..240 {
            world.step(1.0 / 60.0);
        }
        let pos = world.translation(capsule).unwrap();
        assert!(pos.y < 1.0 && pos.y > -0.5, "resting height {}", pos.y);
        assert!(world.has_ground_below(capsule, 1.0));
    }

    #[test]
    fn ray_skips_excluded_body() {
        let (mut world, ground) = world_with_ground();
        let block = world.create_box(
            BodyKind::Fixed,
            Vec3::new(0.0, 2.0, 0.0),
            Quat::identity(),
            Vec3::new(1.0, 1.0, 1.0),
        );
        world.step(1.0 / 60.0);

        let down = Vec3::new(0.0, -1.0, 0.0);
        let hit = world
            .cast_ray(Vec3::new(0.0, 10.0, 0.0), down, 100.0, None)
            .unwrap();
        assert_eq!(hit.collider, block.collider);
        assert!((hit.distance - 7.0).abs() < 1e-3);

        let hit = world
            .cast_ray(Vec3::new(0.0, 10.0, 0.0), down, 100.0, Some(block.body))
            .unwrap();
        assert_eq!(hit.collider, ground.collider);
        assert_eq!(world.body_of(hit.collider), Some(ground.body));
    }

    #[test]
    fn removed_bodies_answer_none() {
        let (mut world, _) = world_with_ground();
        let capsule = world.create_capsule(Vec3::new(0.0, 5.0, 0.0), 0.55, 0.275);
        world.remove(capsule);
        assert!(!world.contains(capsule));
        assert_eq!(world.translation(capsule), None);
        world.set_linvel(capsule, Vec3::new(1.0, 0.0, 0.0));
        world.step(0.0);
        assert_eq!(world.linvel(capsule), None);
    }
}
