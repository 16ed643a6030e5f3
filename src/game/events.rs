//! Outgoing messages produced by a world during a tick or a message handler.
//! The server task routes them to sessions after the world returns.

use super::SessionId;
use crate::ws::protocol::{NotificationKind, PlayerEvent, ServerMsg};

/// Addressing for one outgoing message
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Everyone in the lobby
    Room(ServerMsg),
    /// Everyone in the lobby but one session
    RoomExcept(SessionId, ServerMsg),
    /// A single session
    To(SessionId, ServerMsg),
}

impl Dispatch {
    pub fn message(&self) -> &ServerMsg {
        match self {
            Dispatch::Room(msg) | Dispatch::RoomExcept(_, msg) | Dispatch::To(_, msg) => msg,
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Dispatch>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&mut self, msg: ServerMsg) {
        self.queue.push(Dispatch::Room(msg));
    }

    pub fn room_except(&mut self, except: SessionId, msg: ServerMsg) {
        self.queue.push(Dispatch::RoomExcept(except, msg));
    }

    pub fn to(&mut self, session: SessionId, msg: ServerMsg) {
        self.queue.push(Dispatch::To(session, msg));
    }

    pub fn player_event(&mut self, player_id: SessionId, event: PlayerEvent) {
        self.room(ServerMsg::PlayerEvent { player_id, event });
    }

    pub fn notify(&mut self, session: SessionId, kind: NotificationKind, content: impl Into<String>) {
        self.to(session, ServerMsg::notify(session, kind, content));
    }

    pub fn drain(&mut self) -> Vec<Dispatch> {
        std::mem::take(&mut self.queue)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
