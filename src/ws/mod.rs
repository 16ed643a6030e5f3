//! WebSocket transport: the upgrade handler and the JSON message set

pub mod handler;
pub mod protocol;
