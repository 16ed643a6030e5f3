//! Raycast wheel: suspension spring, tire forces and friction circle

use crate::game::physics::{PhysicsHandle, PhysicsWorld};
use crate::util::math::{Quat, UnitQuaternion, Vec3, Vector3};

pub const WHEEL_RADIUS: f32 = 0.5;

/// Suspension tuning
pub const REST_LENGTH: f32 = 0.1;
pub const SPRING_TRAVEL: f32 = 0.2;
pub const SPRING_STIFFNESS: f32 = 35_000.0;
pub const DAMPER_STIFFNESS: f32 = 3_000.0;

/// Tire tuning
pub const ENGINE_FORCE: f32 = 3_000.0;
/// Brake force per m/s of forward speed
pub const BRAKE_FORCE: f32 = 1_200.0;
pub const MAX_BRAKE_FORCE: f32 = 8_000.0;
pub const LATERAL_STIFFNESS: f32 = 5_000.0;
pub const DRAG_COEFFICIENT: f32 = 2.0;
pub const NOMINAL_GRIP: f32 = 4.0;
pub const HANDBRAKE_GRIP: f32 = 2.0;
/// Fraction of the missing grip regained per step after the handbrake is released
pub const GRIP_RECOVERY: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelPosition {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl WheelPosition {
    pub fn is_front(self) -> bool {
        matches!(self, WheelPosition::FrontLeft | WheelPosition::FrontRight)
    }
}

/// Per-step drive intent derived from the driver's controls
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveInput {
    /// -1 (reverse) ..= 1 (forward)
    pub throttle: f32,
    pub brake: bool,
    pub handbrake: bool,
}

/// Spring-damper state
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    pub rest_length: f32,
    pub min_length: f32,
    pub max_length: f32,
    pub stiffness: f32,
    pub damping: f32,
    /// Current spring length
    pub length: f32,
}

impl Default for Suspension {
    fn default() -> Self {
        Self {
            rest_length: REST_LENGTH,
            min_length: REST_LENGTH - SPRING_TRAVEL,
            max_length: REST_LENGTH + SPRING_TRAVEL,
            stiffness: SPRING_STIFFNESS,
            damping: DAMPER_STIFFNESS,
            length: REST_LENGTH,
        }
    }
}

impl Suspension {
    /// Ray length needed to find ground for a wheel of `radius`
    pub fn ray_length(&self, radius: f32) -> f32 {
        self.max_length + radius
    }

    /// Update spring length from a ground hit and return the signed spring force
    /// (positive pushes the body away from the ground).
    pub fn compress(&mut self, hit_distance: f32, radius: f32, dt: f32) -> f32 {
        let previous = self.length;
        self.length = (hit_distance - radius).clamp(self.min_length, self.max_length);
        let spring_velocity = if dt > 0.0 {
            (previous - self.length) / dt
        } else {
            0.0
        };
        let spring = self.stiffness * (self.rest_length - self.length);
        let damper = self.damping * spring_velocity;
        spring + damper
    }

    /// Wheel hangs fully extended when nothing is below it
    pub fn extend(&mut self) {
        self.length = self.max_length;
    }
}

/// Tire forces in wheel space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TireForces {
    /// Along the wheel's forward axis
    pub longitudinal: f32,
    /// Along the wheel's side axis
    pub lateral: f32,
}

impl TireForces {
    pub fn magnitude(&self) -> f32 {
        self.longitudinal.hypot(self.lateral)
    }
}

/// Tire model for one contact. Both components are scaled together onto the friction
/// circle of radius `normal_force * grip` when their combined magnitude exceeds it.
pub fn tire_forces(
    forward_velocity: f32,
    side_velocity: f32,
    normal_force: f32,
    grip: f32,
    input: &DriveInput,
) -> TireForces {
    let limit = normal_force.max(0.0) * grip.max(0.0);

    let mut longitudinal = input.throttle.clamp(-1.0, 1.0) * ENGINE_FORCE;
    longitudinal -= DRAG_COEFFICIENT * forward_velocity * forward_velocity.abs();
    if input.brake {
        longitudinal -= (forward_velocity * BRAKE_FORCE).clamp(-MAX_BRAKE_FORCE, MAX_BRAKE_FORCE);
    }

    let lateral = (-side_velocity * LATERAL_STIFFNESS).clamp(-limit, limit);

    let mut forces = TireForces {
        longitudinal,
        lateral,
    };
    let magnitude = forces.magnitude();
    if magnitude > limit {
        let scale = if magnitude > 0.0 { limit / magnitude } else { 0.0 };
        forces.longitudinal *= scale;
        forces.lateral *= scale;
    }
    forces
}

/// One wheel of a vehicle. Owned by its vehicle only.
#[derive(Debug, Clone)]
pub struct Wheel {
    pub position: WheelPosition,
    /// Mount point relative to the chassis centre
    pub offset: Vec3,
    pub radius: f32,
    pub suspension: Suspension,
    /// Rotation about the local up axis (front wheels only)
    pub steer_angle: f32,
    pub grip: f32,
    pub grounded: bool,
    /// Accumulated rolling angle, for rendering
    pub spin: f32,
    pub forces: TireForces,
    pub suspension_force: Vec3,
}

impl Wheel {
    pub fn new(position: WheelPosition, offset: Vec3) -> Self {
        Self {
            position,
            offset,
            radius: WHEEL_RADIUS,
            suspension: Suspension::default(),
            steer_angle: 0.0,
            grip: NOMINAL_GRIP,
            grounded: false,
            spin: 0.0,
            forces: TireForces::default(),
            suspension_force: Vec3::zeros(),
        }
    }

    /// Steering rotation relative to the chassis
    pub fn steer_rotation(&self) -> Quat {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.steer_angle)
    }

    /// Wheel centre relative to the chassis, after suspension travel
    pub fn local_position(&self) -> Vec3 {
        self.offset - Vec3::new(0.0, self.suspension.length, 0.0)
    }

    /// Steering plus rolling, relative to the chassis
    pub fn local_rotation(&self) -> Quat {
        self.steer_rotation() * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.spin)
    }

    /// Handbrake drops rear grip at once; release recovers it gradually
    pub fn update_grip(&mut self, handbrake: bool) {
        if handbrake && !self.position.is_front() {
            self.grip = HANDBRAKE_GRIP;
        } else {
            self.grip += (NOMINAL_GRIP - self.grip) * GRIP_RECOVERY;
        }
    }

    /// Run one physics step for this wheel and push the resulting impulse into the chassis
    pub fn update(
        &mut self,
        physics: &mut PhysicsWorld,
        chassis: PhysicsHandle,
        body_position: &Vec3,
        body_rotation: &Quat,
        input: &DriveInput,
        dt: f32,
    ) {
        let wheel_rotation = body_rotation * self.steer_rotation();
        let world_position = body_position + body_rotation * self.offset;
        let down = wheel_rotation * Vec3::new(0.0, -1.0, 0.0);
        let ray_length = self.suspension.ray_length(self.radius);

        self.update_grip(input.handbrake);

        let Some(hit) = physics.cast_ray(world_position, down, ray_length, Some(chassis.body))
        else {
            self.grounded = false;
            self.suspension.extend();
            self.forces = TireForces::default();
            self.suspension_force = Vec3::zeros();
            return;
        };
        self.grounded = true;

        let spring = self.suspension.compress(hit.distance, self.radius, dt);
        self.suspension_force = -down * spring;
        let normal_force = spring.max(0.0);

        let velocity = physics
            .velocity_at_point(chassis, world_position)
            .unwrap_or_else(Vec3::zeros);
        let forward = wheel_rotation * Vec3::new(0.0, 0.0, 1.0);
        let side = wheel_rotation * Vec3::new(1.0, 0.0, 0.0);
        let forward_velocity = velocity.dot(&forward);
        let side_velocity = velocity.dot(&side);

        self.forces = tire_forces(forward_velocity, side_velocity, normal_force, self.grip, input);
        self.spin += forward_velocity / self.radius * dt;

        let force =
            self.suspension_force + forward * self.forces.longitudinal + side * self.forces.lateral;
        physics.apply_impulse_at_point(chassis, force * dt, world_position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn rest_length_gives_zero_spring_force() {
        let mut suspension = Suspension::default();
        let force = suspension.compress(REST_LENGTH + WHEEL_RADIUS, WHEEL_RADIUS, 1.0 / 60.0);
        assert!(force.abs() < 0.05, "force {force}");
    }

    #[test]
    fn compression_pushes_back() {
        let mut suspension = Suspension::default();
        let force = suspension.compress(WHEEL_RADIUS + 0.02, WHEEL_RADIUS, 1.0 / 60.0);
        assert!(force > 0.0);

        // held compressed: no damper contribution, spring still opposes compression
        let held = suspension.compress(WHEEL_RADIUS + 0.02, WHEEL_RADIUS, 1.0 / 60.0);
        assert!((held - SPRING_STIFFNESS * (REST_LENGTH - 0.02)).abs() < 1e-2);

        // suspension force points away from the ground
        let down = Vec3::new(0.0, -1.0, 0.0);
        assert!((-down * held).y > 0.0);
    }

    #[test]
    fn spring_length_is_clamped_to_travel() {
        let mut suspension = Suspension::default();
        suspension.compress(0.0, WHEEL_RADIUS, 1.0 / 60.0);
        assert_eq!(suspension.length, REST_LENGTH - SPRING_TRAVEL);
        suspension.compress(10.0, WHEEL_RADIUS, 1.0 / 60.0);
        assert_eq!(suspension.length, REST_LENGTH + SPRING_TRAVEL);
    }

    #[test]
    fn tire_forces_stay_inside_friction_circle() {
        let mut rng = ChaCha8Rng::seed_from_u64(0xC1C1E);
        for _ in 0..10_000 {
            let input = DriveInput {
                throttle: rng.gen_range(-1.0..=1.0),
                brake: rng.gen_bool(0.3),
                handbrake: rng.gen_bool(0.3),
            };
            let forward_velocity = rng.gen_range(-60.0..60.0);
            let side_velocity = rng.gen_range(-30.0..30.0);
            let normal_force = rng.gen_range(0.0..12_000.0);
            let grip = rng.gen_range(HANDBRAKE_GRIP..=NOMINAL_GRIP);

            let forces = tire_forces(forward_velocity, side_velocity, normal_force, grip, &input);
            let limit = normal_force * grip;
            assert!(
                forces.magnitude() <= limit * (1.0 + 1e-5) + 1e-3,
                "{forces:?} exceeds {limit}"
            );
        }
    }

    #[test]
    fn no_normal_force_means_no_traction() {
        let forces = tire_forces(3.0, 1.0, 0.0, NOMINAL_GRIP, &DriveInput {
            throttle: 1.0,
            ..Default::default()
        });
        assert_eq!(forces.magnitude(), 0.0);
    }

    #[test]
    fn brake_opposes_motion_and_lateral_opposes_slide() {
        let forces = tire_forces(5.0, 2.0, 10_000.0, NOMINAL_GRIP, &DriveInput {
            brake: true,
            ..Default::default()
        });
        assert!(forces.longitudinal < 0.0);
        assert!(forces.lateral < 0.0);
    }

    #[test]
    fn handbrake_only_affects_rear_grip() {
        let mut front = Wheel::new(WheelPosition::FrontLeft, Vec3::zeros());
        let mut rear = Wheel::new(WheelPosition::RearLeft, Vec3::zeros());
        front.update_grip(true);
        rear.update_grip(true);
        assert_eq!(front.grip, NOMINAL_GRIP);
        assert_eq!(rear.grip, HANDBRAKE_GRIP);

        rear.update_grip(false);
        assert!(rear.grip > HANDBRAKE_GRIP && rear.grip < NOMINAL_GRIP);
        for _ in 0..500 {
            rear.update_grip(false);
        }
        assert!((rear.grip - NOMINAL_GRIP).abs() < 1e-3);
    }
}
