//! Driveable vehicles: seats, driver controls, Ackermann steering and wheel forces

pub mod wheel;

pub use wheel::{DriveInput, Wheel, WheelPosition};

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::game::physics::{PhysicsHandle, PhysicsWorld};
use crate::game::{EntityId, SessionId};
use crate::util::math::{to_array3, to_array4, Quat, Vec3};
use crate::wire::{Actions, SeatRecord, VehicleRecord, WheelRecord};

/// Chassis collider half extents
pub const CHASSIS_HALF_EXTENTS: [f32; 3] = [1.0, 0.25, 2.5];
pub const CHASSIS_MASS: f32 = 1_500.0;

/// Steering geometry
pub const WHEELBASE: f32 = 2.55;
pub const REAR_TRACK: f32 = 1.525;
pub const TURN_RADIUS: f32 = 5.4;
/// Fraction of the remaining steer error closed per second
pub const STEER_SPEED: f32 = 2.0;

/// Lateral distance a passenger is placed from the chassis on exit
pub const EXIT_OFFSET: [f32; 3] = [2.0, 0.0, 0.0];

/// Flip recovery thresholds
pub const FLIP_UPRIGHT_DOT: f32 = 0.2;
pub const FLIP_RECOVERY_SECS: f64 = 2.0;
pub const FLIP_MAX_SPEED: f32 = 5.0;

pub const STUNT_REWARD: u32 = 100;

/// Minimum seconds between ram hits on the same victim
pub const RAM_COOLDOWN: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatKind {
    Driver,
    Passenger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Seat {
    pub kind: SeatKind,
    pub offset: Vec3,
    /// Occupant, looked up in the owning world on every use
    pub occupant: Option<SessionId>,
}

/// Driver intent held between input frames and the next physics step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleControls {
    pub throttle: f32,
    pub brake: bool,
    pub handbrake: bool,
    /// -1 (right) ..= 1 (left)
    pub steer: f32,
    pub horn: bool,
}

impl VehicleControls {
    /// Map the driver's action bits to controls
    pub fn from_actions(actions: Actions, forward_speed: f32) -> Self {
        let mut controls = Self::default();
        if actions.contains(Actions::MOVE_FORWARD) {
            controls.throttle = 1.0;
        }
        if actions.contains(Actions::MOVE_BACKWARD) {
            if forward_speed > 1.0 {
                controls.brake = true;
            } else {
                controls.throttle = -1.0;
            }
        }
        controls.handbrake = actions.contains(Actions::JUMP);
        if actions.contains(Actions::MOVE_LEFT) {
            controls.steer = 1.0;
        } else if actions.contains(Actions::MOVE_RIGHT) {
            controls.steer = -1.0;
        }
        controls
    }

    pub fn drive_input(&self) -> DriveInput {
        DriveInput {
            throttle: self.throttle,
            brake: self.brake,
            handbrake: self.handbrake,
        }
    }
}

/// Inner/outer front wheel angles `(left, right)` for a steer input in [-1, 1]
pub fn ackermann_angles(steer: f32, wheelbase: f32, track: f32, turn_radius: f32) -> (f32, f32) {
    let inner = (wheelbase / (turn_radius - track / 2.0)).atan();
    let outer = (wheelbase / (turn_radius + track / 2.0)).atan();
    let steer = steer.clamp(-1.0, 1.0);
    if steer > 0.0 {
        (inner * steer, outer * steer)
    } else if steer < 0.0 {
        (outer * steer, inner * steer)
    } else {
        (0.0, 0.0)
    }
}

/// Steering authority left at `speed` m/s
pub fn steer_factor(speed: f32) -> f32 {
    (1.0 - speed / 50.0).clamp(0.3, 1.0)
}

/// What happened to a vehicle during one physics step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleStep {
    /// Driver landed a flip
    pub stunt_by: Option<SessionId>,
    pub recovered_from_flip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WheelInfo {
    pub radius: f32,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatInfo {
    pub kind: SeatKind,
    pub position: [f32; 3],
    pub occupant: Option<SessionId>,
}

/// Full vehicle description for `add_vehicle` and world JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleInfo {
    pub id: EntityId,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub wheels: Vec<WheelInfo>,
    pub seats: Vec<SeatInfo>,
    pub last_processed_input_seq: u16,
}

#[derive(Debug, Clone, Default)]
struct StuntTracker {
    airborne: bool,
    flipped_in_air: bool,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: EntityId,
    pub handle: PhysicsHandle,
    pub wheels: Vec<Wheel>,
    pub seats: Vec<Seat>,
    pub controls: VehicleControls,
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub last_processed_input_seq: u16,
    /// World time the vehicle last had anyone aboard
    pub last_occupied_at: f64,
    flipped_since: Option<f64>,
    stunt: StuntTracker,
    ram_cooldowns: HashMap<SessionId, f64>,
}

impl Vehicle {
    /// Build a car and its chassis body at `position`
    pub fn spawn(physics: &mut PhysicsWorld, position: Vec3, rotation: Quat, now: f64) -> Self {
        let [hx, hy, hz] = CHASSIS_HALF_EXTENTS;
        let handle = physics.create_chassis(position, rotation, Vec3::new(hx, hy, hz), CHASSIS_MASS);
        Self::with_handle(Uuid::new_v4(), handle, position, rotation, now)
    }

    pub fn with_handle(
        id: EntityId,
        handle: PhysicsHandle,
        position: Vec3,
        rotation: Quat,
        now: f64,
    ) -> Self {
        let wheels = vec![
            Wheel::new(WheelPosition::FrontLeft, Vec3::new(1.0, -0.2, 1.5)),
            Wheel::new(WheelPosition::FrontRight, Vec3::new(-1.0, -0.2, 1.5)),
            Wheel::new(WheelPosition::RearLeft, Vec3::new(1.0, -0.2, -1.5)),
            Wheel::new(WheelPosition::RearRight, Vec3::new(-1.0, -0.2, -1.5)),
        ];
        let seat = |kind, x, y, z| Seat {
            kind,
            offset: Vec3::new(x, y, z),
            occupant: None,
        };
        let seats = vec![
            seat(SeatKind::Driver, 0.45, 0.6, 0.2),
            seat(SeatKind::Passenger, -0.5, 0.6, 0.2),
            seat(SeatKind::Passenger, -0.5, 0.6, -0.6),
            seat(SeatKind::Passenger, 0.45, 0.6, -0.6),
        ];

        Self {
            id,
            handle,
            wheels,
            seats,
            controls: VehicleControls::default(),
            position,
            rotation,
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            last_processed_input_seq: 0,
            last_occupied_at: now,
            flipped_since: None,
            stunt: StuntTracker::default(),
            ram_cooldowns: HashMap::new(),
        }
    }

    pub fn driver(&self) -> Option<SessionId> {
        self.seats
            .iter()
            .find(|s| s.kind == SeatKind::Driver)
            .and_then(|s| s.occupant)
    }

    pub fn occupants(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.seats.iter().filter_map(|s| s.occupant)
    }

    pub fn is_empty(&self) -> bool {
        self.seats.iter().all(|s| s.occupant.is_none())
    }

    pub fn seat_of(&self, session: SessionId) -> Option<usize> {
        self.seats.iter().position(|s| s.occupant == Some(session))
    }

    /// Seat `session` in the first free seat
    pub fn enter(&mut self, session: SessionId, now: f64) -> Option<usize> {
        if self.seat_of(session).is_some() {
            return None;
        }
        let index = self.seats.iter().position(|s| s.occupant.is_none())?;
        self.seats[index].occupant = Some(session);
        self.last_occupied_at = now;
        Some(index)
    }

    /// Free the seat held by `session`. A leaving driver releases the controls.
    pub fn exit(&mut self, session: SessionId, now: f64) -> bool {
        let Some(index) = self.seat_of(session) else {
            return false;
        };
        if self.seats[index].kind == SeatKind::Driver {
            self.controls = VehicleControls::default();
        }
        self.seats[index].occupant = None;
        self.last_occupied_at = now;
        true
    }

    pub fn is_driver(&self, session: SessionId) -> bool {
        self.driver() == Some(session)
    }

    /// Horn follows the driver's horn key; passengers cannot honk
    pub fn set_horn(&mut self, session: SessionId, on: bool) {
        if self.is_driver(session) {
            self.controls.horn = on;
        }
    }

    /// Record the newest vehicle input sequence, never moving backwards
    pub fn acknowledge_input(&mut self, seq: u16) {
        if crate::game::is_newer_seq(seq, self.last_processed_input_seq) {
            self.last_processed_input_seq = seq;
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::new(0.0, 0.0, 1.0)
    }

    pub fn speed(&self) -> f32 {
        self.linear_velocity.norm()
    }

    pub fn forward_speed(&self) -> f32 {
        self.linear_velocity.dot(&self.forward())
    }

    pub fn seat_world_position(&self, index: usize) -> Option<Vec3> {
        self.seats
            .get(index)
            .map(|s| self.position + self.rotation * s.offset)
    }

    /// Where an occupant is placed when leaving
    pub fn exit_position(&self) -> Vec3 {
        let [x, y, z] = EXIT_OFFSET;
        self.position + self.rotation * Vec3::new(x, y, z)
    }

    pub fn idle_for(&self, now: f64) -> f64 {
        if self.is_empty() {
            now - self.last_occupied_at
        } else {
            0.0
        }
    }

    /// Whether a ram hit on `victim` is allowed now; arms the cooldown when it is
    pub fn try_ram(&mut self, victim: SessionId, now: f64) -> bool {
        self.ram_cooldowns.retain(|_, last| now - *last < RAM_COOLDOWN);
        match self.ram_cooldowns.get(&victim) {
            Some(last) if now - last < RAM_COOLDOWN => false,
            _ => {
                self.ram_cooldowns.insert(victim, now);
                true
            }
        }
    }

    /// Pull transform and velocities from the physics body
    pub fn sync_from(&mut self, physics: &PhysicsWorld) {
        if let Some(p) = physics.translation(self.handle) {
            self.position = p;
        }
        if let Some(r) = physics.rotation(self.handle) {
            self.rotation = r;
        }
        if let Some(v) = physics.linvel(self.handle) {
            self.linear_velocity = v;
        }
        if let Some(w) = physics.angvel(self.handle) {
            self.angular_velocity = w;
        }
    }

    fn update_steering(&mut self, dt: f32) {
        let (left, right) = ackermann_angles(self.controls.steer, WHEELBASE, REAR_TRACK, TURN_RADIUS);
        let factor = steer_factor(self.speed());
        let blend = (STEER_SPEED * dt).min(1.0);
        for wheel in &mut self.wheels {
            let target = match wheel.position {
                WheelPosition::FrontLeft => left * factor,
                WheelPosition::FrontRight => right * factor,
                WheelPosition::RearLeft | WheelPosition::RearRight => continue,
            };
            wheel.steer_angle += (target - wheel.steer_angle) * blend;
        }
    }

    /// One physics step: controls, steering, wheel forces, stunts, flip recovery
    pub fn step(
        &mut self,
        physics: &mut PhysicsWorld,
        driver_actions: Option<Actions>,
        now: f64,
        dt: f32,
    ) -> VehicleStep {
        let mut outcome = VehicleStep::default();
        self.sync_from(physics);

        let horn = self.controls.horn;
        self.controls = match driver_actions {
            Some(actions) => VehicleControls::from_actions(actions, self.forward_speed()),
            None => VehicleControls::default(),
        };
        self.controls.horn = horn && driver_actions.is_some();

        self.update_steering(dt);
        let input = self.controls.drive_input();
        let (position, rotation) = (self.position, self.rotation);
        for wheel in &mut self.wheels {
            wheel.update(physics, self.handle, &position, &rotation, &input, dt);
        }

        let upright = (self.rotation * Vec3::y()).dot(&Vec3::y());
        let airborne = self.wheels.iter().all(|w| !w.grounded);
        let landed = self.wheels.iter().all(|w| w.grounded);
        if airborne {
            self.stunt.airborne = true;
            if upright < 0.0 {
                self.stunt.flipped_in_air = true;
            }
        } else if self.stunt.airborne {
            if landed && self.stunt.flipped_in_air {
                outcome.stunt_by = self.driver();
            }
            self.stunt = StuntTracker::default();
        }

        if upright < FLIP_UPRIGHT_DOT && self.speed() < FLIP_MAX_SPEED {
            let since = *self.flipped_since.get_or_insert(now);
            if now - since >= FLIP_RECOVERY_SECS {
                let lifted = self.position + Vec3::new(0.0, 10.0, 0.0);
                let heading = crate::util::math::yaw_of(&self.rotation);
                physics.set_translation(self.handle, lifted);
                physics.set_rotation(self.handle, crate::util::math::yaw_rotation(heading));
                physics.set_linvel(self.handle, Vec3::zeros());
                physics.set_angvel(self.handle, Vec3::zeros());
                self.flipped_since = None;
                self.sync_from(physics);
                outcome.recovered_from_flip = true;
            }
        } else {
            self.flipped_since = None;
        }

        if !self.is_empty() {
            self.last_occupied_at = now;
        }
        outcome
    }

    pub fn info(&self) -> VehicleInfo {
        VehicleInfo {
            id: self.id,
            position: to_array3(&self.position),
            quaternion: to_array4(&self.rotation),
            linear_velocity: to_array3(&self.linear_velocity),
            angular_velocity: to_array3(&self.angular_velocity),
            wheels: self
                .wheels
                .iter()
                .map(|w| WheelInfo {
                    radius: w.radius,
                    position: to_array3(&w.local_position()),
                    quaternion: to_array4(&w.local_rotation()),
                })
                .collect(),
            seats: self
                .seats
                .iter()
                .map(|s| SeatInfo {
                    kind: s.kind,
                    position: to_array3(&s.offset),
                    occupant: s.occupant,
                })
                .collect(),
            last_processed_input_seq: self.last_processed_input_seq,
        }
    }

    pub fn record(&self) -> VehicleRecord {
        VehicleRecord {
            id: self.id.to_string(),
            position: to_array3(&self.position),
            rotation: to_array4(&self.rotation),
            linear_velocity: to_array3(&self.linear_velocity),
            angular_velocity: to_array3(&self.angular_velocity),
            horn: self.controls.horn,
            wheels: self
                .wheels
                .iter()
                .map(|w| WheelRecord {
                    position: to_array3(&w.local_position()),
                    rotation: to_array4(&w.local_rotation()),
                })
                .collect(),
            seats: self
                .seats
                .iter()
                .map(|s| SeatRecord {
                    occupant: s.occupant.map(|id| id.to_string()),
                    position: to_array3(&s.offset),
                })
                .collect(),
            last_processed_seq: self.last_processed_input_seq,
        }
    }
}
