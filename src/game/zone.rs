//! Trigger volumes and one-shot interactables

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::items::ItemKind;
use super::EntityId;
use crate::util::math::{to_array3, to_array4, Quat, Vec3};

/// Radius within which a player can use an interactable
pub const INTERACT_RADIUS: f32 = 1.5;

/// What happens to a player standing inside a zone, once per physics step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneAction {
    Damage { amount: f32 },
    Heal { amount: f32 },
    /// Grants the item and removes the zone
    Pickup { item: ItemKind, amount: u32 },
    /// Marker volume, e.g. race checkpoints
    Passive,
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub id: EntityId,
    /// Minimum corner of the box
    pub position: Vec3,
    pub rotation: Quat,
    /// Width, height, depth
    pub size: Vec3,
    pub color: String,
    pub action: ZoneAction,
}

impl Zone {
    pub fn new(position: Vec3, size: Vec3, color: impl Into<String>, action: ZoneAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            rotation: Quat::identity(),
            size,
            color: color.into(),
            action,
        }
    }

    /// Axis-aligned containment test, edges inclusive
    pub fn contains(&self, point: &Vec3) -> bool {
        let max = self.position + self.size;
        (self.position.x..=max.x).contains(&point.x)
            && (self.position.y..=max.y).contains(&point.y)
            && (self.position.z..=max.z).contains(&point.z)
    }

    pub fn is_consumed_on_trigger(&self) -> bool {
        matches!(self.action, ZoneAction::Pickup { .. })
    }

    pub fn info(&self) -> ZoneInfo {
        ZoneInfo {
            id: self.id,
            position: to_array3(&self.position),
            quaternion: to_array4(&self.rotation),
            width: self.size.x,
            height: self.size.y,
            depth: self.size.z,
            color: self.color.clone(),
            action: self.action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneInfo {
    pub id: EntityId,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub color: String,
    pub action: ZoneAction,
}

/// A pickup lying in the world, used at most once
#[derive(Debug, Clone)]
pub struct Pickup {
    pub id: EntityId,
    pub position: Vec3,
    pub rotation: Quat,
    pub item: ItemKind,
    pub amount: u32,
    /// Spawner that produced it, if any
    pub spawner: Option<usize>,
    used_by: Option<Uuid>,
}

impl Pickup {
    pub fn new(position: Vec3, item: ItemKind, amount: u32, spawner: Option<usize>) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            rotation: Quat::identity(),
            item,
            amount,
            spawner,
            used_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.used_by.is_none()
    }

    /// Consume the pickup for `user`. Only the first call yields the item.
    pub fn use_by(&mut self, user: Uuid) -> Option<(ItemKind, u32)> {
        if self.used_by.is_some() {
            return None;
        }
        self.used_by = Some(user);
        Some((self.item, self.amount))
    }

    pub fn info(&self) -> InteractableInfo {
        InteractableInfo {
            id: self.id,
            position: to_array3(&self.position),
            quaternion: to_array4(&self.rotation),
            item: self.item,
            amount: self.amount,
        }
    }

    pub fn removal(&self) -> InteractableRemoved {
        InteractableRemoved {
            id: self.id,
            kind: "pickup",
            item: self.item,
            amount: self.amount,
            used_by: self.used_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractableInfo {
    pub id: EntityId,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub item: ItemKind,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractableRemoved {
    pub id: EntityId,
    pub kind: &'static str,
    pub item: ItemKind,
    pub amount: u32,
    pub used_by: Option<Uuid>,
}

/// Closest active pickup within [`INTERACT_RADIUS`] of `point`
pub fn nearest_pickup<'a>(pickups: impl Iterator<Item = &'a Pickup>, point: &Vec3) -> Option<EntityId> {
    pickups
        .filter(|p| p.is_active())
        .map(|p| (p.id, (p.position - point).norm()))
        .filter(|(_, d)| *d <= INTERACT_RADIUS)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_spans_position_to_position_plus_size() {
        let zone = Zone::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 3.0, 4.0),
            "#ff0000",
            ZoneAction::Damage { amount: 1.0 },
        );
        assert!(zone.contains(&Vec3::new(0.0, 0.0, 0.0)));
        assert!(zone.contains(&Vec3::new(2.0, 3.0, 4.0)));
        assert!(zone.contains(&Vec3::new(1.0, 1.5, 2.0)));
        assert!(!zone.contains(&Vec3::new(-0.1, 1.0, 1.0)));
        assert!(!zone.contains(&Vec3::new(1.0, 3.1, 1.0)));
    }

    #[test]
    fn pickup_is_consumed_once() {
        let mut pickup = Pickup::new(Vec3::zeros(), ItemKind::Coin, 7, None);
        let a = Uuid::new_v4();
        assert_eq!(pickup.use_by(a), Some((ItemKind::Coin, 7)));
        assert_eq!(pickup.use_by(Uuid::new_v4()), None);
        assert!(!pickup.is_active());
        assert_eq!(pickup.removal().used_by, Some(a));
    }

    #[test]
    fn nearest_pickup_respects_radius_and_activity() {
        let near = Pickup::new(Vec3::new(1.0, 0.0, 0.0), ItemKind::Coin, 5, None);
        let nearer = Pickup::new(Vec3::new(0.5, 0.0, 0.0), ItemKind::Coin, 5, None);
        let far = Pickup::new(Vec3::new(3.0, 0.0, 0.0), ItemKind::Coin, 5, None);
        let origin = Vec3::zeros();

        let all = [near.clone(), nearer.clone(), far.clone()];
        assert_eq!(nearest_pickup(all.iter(), &origin), Some(nearer.id));

        let mut used = nearer.clone();
        used.use_by(Uuid::new_v4());
        let all = [near.clone(), used, far];
        assert_eq!(nearest_pickup(all.iter(), &origin), Some(near.id));
    }

    #[test]
    fn zone_action_json_is_tagged() {
        let json = serde_json::to_value(ZoneAction::Pickup { item: ItemKind::Ammo, amount: 10 }).unwrap();
        assert_eq!(json["type"], "pickup");
        assert_eq!(json["item"], "ammo");
    }
}
