//! NPC decision state machine: targeting, pursuit, approach and combat timing.
//!
//! The brain never touches the physics world. The owning world feeds it a
//! [`Perception`] each gameplay tick and applies the returned [`Decision`].

use rand::Rng;

use crate::game::SessionId;
use crate::util::math::{planar_distance, Vec3};

pub const MOVE_SPEED: f32 = 4.0;
/// Beyond this distance an NPC closes in at double speed
pub const SPRINT_DISTANCE: f32 = 10.0;
pub const COMBAT_RANGE: f32 = 40.0;
pub const WAYPOINT_RADIUS: f32 = 1.0;

/// Re-path only when the target drifted this far from the last goal
pub const REPATH_DISTANCE: f32 = 2.0;
pub const REPATH_COOLDOWN: f64 = 1.0;

/// Uniform windows (seconds)
pub const REACTION_DELAY: (f64, f64) = (0.2, 0.6);
pub const SHOT_INTERVAL: (f64, f64) = (0.5, 1.0);
pub const STYLE_INTERVAL: (f64, f64) = (2.0, 4.0);
pub const STRAFE_INTERVAL: (f64, f64) = (1.0, 2.0);
pub const STRAFE_CHANCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrainState {
    Seeking,
    PursuingNoLos,
    Approaching,
    Combat,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatStyle {
    Strafe,
    Stand,
}

/// What the NPC knows about its target this tick
#[derive(Debug, Clone, Copy)]
pub struct Perception {
    pub position: Vec3,
    pub target_position: Vec3,
    pub has_los: bool,
}

impl Perception {
    pub fn distance(&self) -> f32 {
        (self.target_position - self.position).norm()
    }
}

/// Movement and weapon intent for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Desired planar velocity
    pub velocity: Vec3,
    /// Direction to face, if any
    pub facing: Option<Vec3>,
    pub aim: bool,
    pub fire: bool,
    /// Ask the world for a fresh path to this goal
    pub repath_to: Option<Vec3>,
}

impl Decision {
    pub fn idle() -> Self {
        Self {
            velocity: Vec3::zeros(),
            facing: None,
            aim: false,
            fire: false,
            repath_to: None,
        }
    }
}

fn uniform<R: Rng>(rng: &mut R, window: (f64, f64)) -> f64 {
    rng.gen_range(window.0..=window.1)
}

fn planar_direction(from: &Vec3, to: &Vec3) -> Vec3 {
    let d = Vec3::new(to.x - from.x, 0.0, to.z - from.z);
    if d.norm() > 1e-6 {
        d.normalize()
    } else {
        Vec3::zeros()
    }
}

#[derive(Debug, Clone)]
pub struct Brain {
    pub state: BrainState,
    /// Weak reference, re-validated by the world every tick
    pub target: Option<SessionId>,
    pub last_seen_at: Option<f64>,
    path: Vec<Vec3>,
    path_goal: Option<Vec3>,
    last_repath_at: f64,
    reaction_ready_at: Option<f64>,
    style: CombatStyle,
    next_style_at: f64,
    strafe_dir: f32,
    next_strafe_at: f64,
    next_shot_at: f64,
}

impl Default for Brain {
    fn default() -> Self {
        Self::new()
    }
}

impl Brain {
    pub fn new() -> Self {
        Self {
            state: BrainState::Seeking,
            target: None,
            last_seen_at: None,
            path: Vec::new(),
            path_goal: None,
            last_repath_at: f64::NEG_INFINITY,
            reaction_ready_at: None,
            style: CombatStyle::Stand,
            next_style_at: 0.0,
            strafe_dir: 1.0,
            next_strafe_at: 0.0,
            next_shot_at: 0.0,
        }
    }

    /// Switch target. A new target starts with no path and no timers.
    pub fn set_target(&mut self, target: Option<SessionId>) {
        if self.target == target {
            return;
        }
        self.target = target;
        self.last_seen_at = None;
        self.path.clear();
        self.path_goal = None;
        self.last_repath_at = f64::NEG_INFINITY;
        self.reaction_ready_at = None;
        self.next_shot_at = 0.0;
        if self.state != BrainState::Dead {
            self.state = BrainState::Seeking;
        }
    }

    pub fn set_path(&mut self, path: Vec<Vec3>) {
        self.path = path;
    }

    #[cfg(test)]
    pub fn path(&self) -> &[Vec3] {
        &self.path
    }

    /// Earliest time a shot is allowed in the current engagement
    #[cfg(test)]
    pub fn reaction_ready_at(&self) -> Option<f64> {
        self.reaction_ready_at
    }

    pub fn kill(&mut self) {
        self.state = BrainState::Dead;
        self.path.clear();
        self.reaction_ready_at = None;
    }

    pub fn is_dead(&self) -> bool {
        self.state == BrainState::Dead
    }

    /// Advance the state machine one gameplay tick
    pub fn think<R: Rng>(&mut self, now: f64, perception: Option<&Perception>, rng: &mut R) -> Decision {
        if self.is_dead() {
            return Decision::idle();
        }
        let Some(seen) = perception.filter(|_| self.target.is_some()) else {
            self.state = BrainState::Seeking;
            self.reaction_ready_at = None;
            return Decision::idle();
        };

        let distance = seen.distance();
        let towards = planar_direction(&seen.position, &seen.target_position);

        if seen.has_los {
            self.last_seen_at = Some(now);
            self.path.clear();
            self.path_goal = None;
            if distance <= COMBAT_RANGE {
                return self.combat(now, &towards, rng);
            }
            self.state = BrainState::Approaching;
            self.reaction_ready_at = None;
            let speed = if distance > SPRINT_DISTANCE {
                MOVE_SPEED * 2.0
            } else {
                MOVE_SPEED
            };
            return Decision {
                velocity: towards * speed,
                facing: Some(towards),
                ..Decision::idle()
            };
        }

        self.state = BrainState::PursuingNoLos;
        self.reaction_ready_at = None;
        self.pursue(now, seen)
    }

    fn combat<R: Rng>(&mut self, now: f64, towards: &Vec3, rng: &mut R) -> Decision {
        if self.state != BrainState::Combat || self.reaction_ready_at.is_none() {
            self.reaction_ready_at = Some(now + uniform(rng, REACTION_DELAY));
        }
        self.state = BrainState::Combat;

        if now >= self.next_style_at {
            self.style = if rng.gen_bool(STRAFE_CHANCE) {
                CombatStyle::Strafe
            } else {
                CombatStyle::Stand
            };
            self.next_style_at = now + uniform(rng, STYLE_INTERVAL);
        }

        let velocity = match self.style {
            CombatStyle::Strafe => {
                if now >= self.next_strafe_at {
                    self.strafe_dir = -self.strafe_dir;
                    self.next_strafe_at = now + uniform(rng, STRAFE_INTERVAL);
                }
                let right = Vec3::new(-towards.z, 0.0, towards.x);
                right * (self.strafe_dir * MOVE_SPEED * 0.7) + towards * (MOVE_SPEED * 0.2)
            }
            CombatStyle::Stand => Vec3::zeros(),
        };

        let ready = self.reaction_ready_at.is_some_and(|t| now >= t);
        let fire = ready && now >= self.next_shot_at;
        if fire {
            self.next_shot_at = now + uniform(rng, SHOT_INTERVAL);
        }

        Decision {
            velocity,
            facing: Some(*towards),
            aim: true,
            fire,
            repath_to: None,
        }
    }

    fn pursue(&mut self, now: f64, seen: &Perception) -> Decision {
        let mut decision = Decision::idle();

        let goal_moved = self
            .path_goal
            .map_or(true, |goal| planar_distance(&goal, &seen.target_position) > REPATH_DISTANCE);
        if goal_moved && now - self.last_repath_at >= REPATH_COOLDOWN {
            self.last_repath_at = now;
            self.path_goal = Some(seen.target_position);
            decision.repath_to = Some(seen.target_position);
        }

        while let Some(next) = self.path.first() {
            if planar_distance(next, &seen.position) <= WAYPOINT_RADIUS {
                self.path.remove(0);
            } else {
                break;
            }
        }

        let heading = match self.path.first() {
            Some(waypoint) => planar_direction(&seen.position, waypoint),
            None => planar_direction(&seen.position, &seen.target_position),
        };
        decision.velocity = heading * MOVE_SPEED;
        decision.facing = Some(planar_direction(&seen.position, &seen.target_position));
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn seen(distance: f32, has_los: bool) -> Perception {
        Perception {
            position: Vec3::zeros(),
            target_position: Vec3::new(0.0, 0.0, -distance),
            has_los,
        }
    }

    #[test]
    fn no_target_means_seeking() {
        let mut brain = Brain::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let d = brain.think(0.0, Some(&seen(5.0, true)), &mut rng);
        assert_eq!(brain.state, BrainState::Seeking);
        assert_eq!(d, Decision::idle());
    }

    #[test]
    fn states_follow_los_and_range() {
        let mut brain = Brain::new();
        brain.set_target(Some(Uuid::new_v4()));
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let d = brain.think(0.0, Some(&seen(80.0, true)), &mut rng);
        assert_eq!(brain.state, BrainState::Approaching);
        assert!(!d.fire && !d.aim);
        assert!((d.velocity.norm() - MOVE_SPEED * 2.0).abs() < 1e-5);
        assert!(d.velocity.z < 0.0);

        brain.think(0.1, Some(&seen(20.0, true)), &mut rng);
        assert_eq!(brain.state, BrainState::Combat);

        let d = brain.think(0.2, Some(&seen(20.0, false)), &mut rng);
        assert_eq!(brain.state, BrainState::PursuingNoLos);
        assert!(d.repath_to.is_some());
        assert_eq!(brain.reaction_ready_at(), None);
    }

    #[test]
    fn never_fires_before_reaction_delay() {
        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut brain = Brain::new();
            brain.set_target(Some(Uuid::new_v4()));

            // out of sight first, then LOS in range from t = 1.0
            let mut first_shot = None;
            let mut acquired_at = None;
            for tick in 0..120 {
                let now = tick as f64 / 30.0;
                let perception = seen(15.0, now >= 1.0);
                let d = brain.think(now, Some(&perception), &mut rng);
                if brain.state == BrainState::Combat && acquired_at.is_none() {
                    acquired_at = Some((now, brain.reaction_ready_at().unwrap()));
                }
                if d.fire && first_shot.is_none() {
                    first_shot = Some(now);
                }
            }

            let (acquired, ready) = acquired_at.unwrap();
            let delay = ready - acquired;
            assert!(delay >= REACTION_DELAY.0 && delay <= REACTION_DELAY.1);
            let shot = first_shot.unwrap();
            assert!(shot >= ready, "seed {seed}: shot at {shot}, ready at {ready}");
        }
    }

    #[test]
    fn shots_are_spaced_by_burst_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut brain = Brain::new();
        brain.set_target(Some(Uuid::new_v4()));
        let mut shots = Vec::new();
        for tick in 0..600 {
            let now = tick as f64 / 60.0;
            if brain.think(now, Some(&seen(10.0, true)), &mut rng).fire {
                shots.push(now);
            }
        }
        assert!(shots.len() > 3);
        for pair in shots.windows(2) {
            assert!(pair[1] - pair[0] >= SHOT_INTERVAL.0 - 1e-9);
        }
    }

    #[test]
    fn repath_respects_cooldown_and_distance() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut brain = Brain::new();
        brain.set_target(Some(Uuid::new_v4()));

        assert!(brain.think(0.0, Some(&seen(30.0, false)), &mut rng).repath_to.is_some());
        // same goal, cooldown elapsed: no new path needed
        assert!(brain.think(2.0, Some(&seen(30.0, false)), &mut rng).repath_to.is_none());
        // target moved far but within cooldown
        assert!(brain.think(2.5, Some(&seen(40.0, false)), &mut rng).repath_to.is_some());
        assert!(brain.think(3.0, Some(&seen(50.0, false)), &mut rng).repath_to.is_none());
        assert!(brain.think(3.6, Some(&seen(50.0, false)), &mut rng).repath_to.is_some());
    }

    #[test]
    fn waypoints_are_consumed_when_reached() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut brain = Brain::new();
        brain.set_target(Some(Uuid::new_v4()));
        brain.think(0.0, Some(&seen(30.0, false)), &mut rng);
        brain.set_path(vec![Vec3::new(0.5, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)]);

        let d = brain.think(0.1, Some(&seen(30.0, false)), &mut rng);
        assert_eq!(brain.path().len(), 1);
        assert!(d.velocity.x > 0.0);
    }

    #[test]
    fn new_target_resets_engagement() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut brain = Brain::new();
        brain.set_target(Some(Uuid::new_v4()));
        brain.think(0.0, Some(&seen(10.0, true)), &mut rng);
        assert!(brain.reaction_ready_at().is_some());
        brain.set_target(Some(Uuid::new_v4()));
        assert_eq!(brain.reaction_ready_at(), None);
        assert_eq!(brain.state, BrainState::Seeking);
    }
}
