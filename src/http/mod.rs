//! HTTP surface: health, leaderboard, server info and the websocket upgrade

pub mod routes;

pub use routes::build_router;
