//! Gameplay action bits shared by input frames and snapshots

use bitflags::bitflags;

bitflags! {
    /// One bit per gameplay action, in wire order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Actions: u16 {
        const MOVE_FORWARD = 1 << 0;
        const MOVE_BACKWARD = 1 << 1;
        const MOVE_LEFT = 1 << 2;
        const MOVE_RIGHT = 1 << 3;
        const JUMP = 1 << 4;
        const SPRINT = 1 << 5;
        const INTERACT = 1 << 6;
        const RELOAD = 1 << 7;
        const SHOOT = 1 << 8;
        const AIM = 1 << 9;
        const SPAWN_VEHICLE = 1 << 10;
        const USE_HORN = 1 << 11;
        const SLOT_1 = 1 << 12;
        const SLOT_2 = 1 << 13;
        const SLOT_3 = 1 << 14;
        const SLOT_4 = 1 << 15;
    }
}

impl Default for Actions {
    fn default() -> Self {
        Self::empty()
    }
}

impl Actions {
    pub const SLOTS: [Actions; 4] = [Self::SLOT_1, Self::SLOT_2, Self::SLOT_3, Self::SLOT_4];

    /// Bits that went from released to pressed between `previous` and `self`
    pub fn pressed_since(self, previous: Actions) -> Actions {
        self & !previous
    }

    /// Index of the lowest pressed slot key, if any
    pub fn slot_index(self) -> Option<usize> {
        Self::SLOTS.iter().position(|slot| self.contains(*slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_only_report_new_presses() {
        let prev = Actions::MOVE_FORWARD | Actions::SHOOT;
        let now = Actions::MOVE_FORWARD | Actions::JUMP;
        assert_eq!(now.pressed_since(prev), Actions::JUMP);
    }

    #[test]
    fn slot_bits_map_to_indices() {
        assert_eq!(Actions::SLOT_3.slot_index(), Some(2));
        assert_eq!((Actions::SLOT_2 | Actions::SLOT_4).slot_index(), Some(1));
        assert_eq!(Actions::AIM.slot_index(), None);
        assert_eq!(Actions::SLOT_4.bits(), 0x8000);
    }
}
