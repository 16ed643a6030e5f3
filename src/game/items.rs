//! Holdable items, hands and inventory slots

use serde::{Deserialize, Serialize};

use super::combat::Weapon;

/// Number of inventory slots per character
pub const ITEM_SLOTS: usize = 4;

/// Item kinds that can be granted by pickups, zones or starting loadouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Coin,
    Ammo,
    Pistol,
}

/// Something a character can hold in a hand
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Holdable {
    Weapon(Weapon),
}

impl Holdable {
    pub fn from_kind(kind: ItemKind) -> Option<Self> {
        match kind {
            ItemKind::Pistol => Some(Holdable::Weapon(Weapon::pistol())),
            ItemKind::Coin | ItemKind::Ammo => None,
        }
    }

    pub fn as_weapon(&self) -> Option<&Weapon> {
        match self {
            Holdable::Weapon(w) => Some(w),
        }
    }

    pub fn as_weapon_mut(&mut self) -> Option<&mut Weapon> {
        match self {
            Holdable::Weapon(w) => Some(w),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hand {
    pub side: HandSide,
    pub item: Option<Holdable>,
}

impl Hand {
    pub fn empty(side: HandSide) -> Self {
        Self { side, item: None }
    }

    pub fn weapon(&self) -> Option<&Weapon> {
        self.item.as_ref().and_then(Holdable::as_weapon)
    }

    pub fn weapon_mut(&mut self) -> Option<&mut Weapon> {
        self.item.as_mut().and_then(Holdable::as_weapon_mut)
    }
}

/// Hands plus item slots. The selected slot's item lives in the right hand while selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loadout {
    pub left_hand: Hand,
    pub right_hand: Hand,
    pub slots: Vec<Option<Holdable>>,
    pub selected: usize,
}

impl Loadout {
    pub fn new(items: &[Option<ItemKind>]) -> Self {
        let mut slots: Vec<Option<Holdable>> = items
            .iter()
            .take(ITEM_SLOTS)
            .map(|kind| kind.and_then(Holdable::from_kind))
            .collect();
        slots.resize(ITEM_SLOTS, None);

        let mut loadout = Self {
            left_hand: Hand::empty(HandSide::Left),
            right_hand: Hand::empty(HandSide::Right),
            slots,
            selected: 0,
        };
        loadout.right_hand.item = loadout.slots[0].take();
        loadout
    }

    /// Move the held item back to its slot and draw the item in `index`.
    /// Returns false for an out-of-range or already selected slot.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.slots.len() || index == self.selected {
            return false;
        }
        self.slots[self.selected] = self.right_hand.item.take();
        self.right_hand.item = self.slots[index].take();
        self.selected = index;
        true
    }

    /// Put an item in the first free slot (or draw it if the hand is empty)
    pub fn give(&mut self, item: Holdable) -> bool {
        if self.right_hand.item.is_none() {
            self.right_hand.item = Some(item);
            return true;
        }
        let selected = self.selected;
        match self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(i, slot)| *i != selected && slot.is_none())
        {
            Some((_, slot)) => {
                *slot = Some(item);
                true
            }
            None => false,
        }
    }

    pub fn weapon(&self) -> Option<&Weapon> {
        self.right_hand.weapon()
    }

    pub fn weapon_mut(&mut self) -> Option<&mut Weapon> {
        self.right_hand.weapon_mut()
    }

    /// Weapon stored in slot `index`, whether drawn or holstered
    pub fn weapon_in_slot_mut(&mut self, index: usize) -> Option<&mut Weapon> {
        if index == self.selected {
            return self.right_hand.weapon_mut();
        }
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .and_then(Holdable::as_weapon_mut)
    }
}
