//! Combat system - weapons, hit zones, damage falloff

use rand::Rng;
use serde::Serialize;

use crate::util::math::Vec3;

/// Maximum health for players and NPCs
pub const MAX_HEALTH: f32 = 100.0;

/// Hitscan range for gunfire (meters)
pub const SHOT_RANGE: f32 = 100.0;

/// Unarmed attack tuning
pub const MELEE_RANGE: f32 = 1.0;
pub const MELEE_DAMAGE: f32 = 25.0;
pub const MELEE_COOLDOWN: f64 = 0.5;

/// Kill counts that unlock an achievement bonus
pub const KILL_MILESTONES: [u32; 9] = [1, 5, 10, 25, 50, 100, 250, 500, 1000];
pub const ACHIEVEMENT_BONUS: u32 = 100;

/// Static weapon tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeaponStats {
    pub name: &'static str,
    /// Magazine size
    pub capacity: u32,
    /// Minimum seconds between shots
    pub fire_rate: f64,
    pub damage: f32,
    /// Seconds from reload start to a full magazine
    pub reload_time: f64,
}

impl WeaponStats {
    pub const PISTOL: Self = Self {
        name: "pistol",
        capacity: 16,
        fire_rate: 0.1,
        damage: 25.0,
        reload_time: 1.0,
    };
}

/// A weapon instance with its magazine state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weapon {
    pub stats: WeaponStats,
    pub ammo: u32,
    pub is_reloading: bool,
    #[serde(skip)]
    pub last_shot_at: f64,
}

impl Weapon {
    pub fn new(stats: WeaponStats) -> Self {
        Self {
            stats,
            ammo: stats.capacity,
            is_reloading: false,
            last_shot_at: f64::NEG_INFINITY,
        }
    }

    pub fn pistol() -> Self {
        Self::new(WeaponStats::PISTOL)
    }

    /// Check fire-rate, magazine and reload state
    pub fn can_shoot(&self, now: f64) -> bool {
        !self.is_reloading && self.ammo > 0 && now - self.last_shot_at >= self.stats.fire_rate
    }

    /// Consume one round. Returns false if the weapon could not fire.
    pub fn fire(&mut self, now: f64) -> bool {
        if !self.can_shoot(now) {
            return false;
        }
        self.ammo -= 1;
        self.last_shot_at = now;
        true
    }

    /// Rounds missing from a full magazine
    pub fn rounds_needed(&self) -> u32 {
        self.stats.capacity.saturating_sub(self.ammo)
    }

    /// Start a reload; false when already reloading or full
    pub fn begin_reload(&mut self) -> bool {
        if self.is_reloading || self.rounds_needed() == 0 {
            return false;
        }
        self.is_reloading = true;
        true
    }

    pub fn finish_reload(&mut self, rounds: u32) {
        self.ammo = (self.ammo + rounds).min(self.stats.capacity);
        self.is_reloading = false;
    }
}

/// Hit zones on a character collider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Head,
    Torso,
    Legs,
}

/// Per-zone damage scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageProfile {
    pub multiplier: f32,
    /// Full damage up to this distance
    pub falloff_start: f32,
    /// Damage reaches `min_factor` at this distance
    pub falloff_end: f32,
    pub min_factor: f32,
}

impl BodyPart {
    /// Classify a hit by its height relative to the struck collider's centre
    pub fn classify(height_above_center: f32) -> Self {
        if height_above_center > 0.5 {
            BodyPart::Head
        } else if height_above_center > -0.2 {
            BodyPart::Torso
        } else {
            BodyPart::Legs
        }
    }

    pub fn profile(self) -> DamageProfile {
        match self {
            BodyPart::Head => DamageProfile {
                multiplier: 2.0,
                falloff_start: 20.0,
                falloff_end: 60.0,
                min_factor: 0.5,
            },
            BodyPart::Torso => DamageProfile {
                multiplier: 1.0,
                falloff_start: 15.0,
                falloff_end: 50.0,
                min_factor: 0.4,
            },
            BodyPart::Legs => DamageProfile {
                multiplier: 0.75,
                falloff_start: 10.0,
                falloff_end: 40.0,
                min_factor: 0.3,
            },
        }
    }
}

impl DamageProfile {
    /// Linear falloff between start and end, floored at `min_factor`
    pub fn falloff(&self, distance: f32) -> f32 {
        if distance <= self.falloff_start {
            return 1.0;
        }
        if distance >= self.falloff_end {
            return self.min_factor;
        }
        let t = (distance - self.falloff_start) / (self.falloff_end - self.falloff_start);
        1.0 - t * (1.0 - self.min_factor)
    }
}

/// Outcome of a resolved hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitInfo {
    pub part: BodyPart,
    pub damage: f32,
    pub distance: f32,
}

/// Combat rules shared by players and NPCs
pub struct CombatSystem;

impl CombatSystem {
    /// Damage for a hit at `distance` on `part`
    pub fn hit_damage(base_damage: f32, part: BodyPart, distance: f32) -> f32 {
        let profile = part.profile();
        base_damage * profile.multiplier * profile.falloff(distance)
    }

    /// Classify and scale a hit
    pub fn resolve_hit(base_damage: f32, hit_point: &Vec3, target_center: &Vec3, distance: f32) -> HitInfo {
        let part = BodyPart::classify(hit_point.y - target_center.y);
        HitInfo {
            part,
            damage: Self::hit_damage(base_damage, part, distance),
            distance,
        }
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - damage.max(0.0)).clamp(0.0, MAX_HEALTH);
        (new_health, new_health <= 0.0)
    }

    pub fn heal(current_health: f32, amount: f32) -> f32 {
        (current_health + amount.max(0.0)).min(MAX_HEALTH)
    }

    /// Coins awarded for a kill
    pub fn kill_reward<R: Rng>(rng: &mut R) -> u32 {
        rng.gen_range(4..=9)
    }

    pub fn is_milestone(kill_count: u32) -> bool {
        KILL_MILESTONES.contains(&kill_count)
    }

    /// Jitter a unit direction by up to `spread` on each axis
    pub fn spread_direction<R: Rng>(direction: &Vec3, spread: f32, rng: &mut R) -> Vec3 {
        let jitter = Vec3::new(
            rng.gen_range(-spread..=spread),
            rng.gen_range(-spread..=spread),
            rng.gen_range(-spread..=spread),
        );
        let dir = direction + jitter;
        if dir.norm() > 1e-6 {
            dir.normalize()
        } else {
            *direction
        }
    }

    /// Damage dealt by a vehicle hitting a pedestrian at `speed`
    pub fn ram_damage(speed: f32) -> f32 {
        (speed / 10.0 * 100.0).min(100.0)
    }
}
