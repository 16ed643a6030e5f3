//! The game server actor: one task owns every lobby and drives both tick loops

mod commands;
pub mod scheduler;

pub use scheduler::FixedStep;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::SimConfig;
use crate::game::{Dispatch, SessionId};
use crate::lobby::LobbyRegistry;
use crate::store::ServerStore;
use crate::util::time::{unix_millis, uptime_secs};
use crate::wire::InputFrame;
use crate::ws::protocol::{ClientMsg, ServerInfo, ServerMsg};

/// Queue depth of the command channel into the actor
const COMMAND_QUEUE: usize = 1024;
/// Queue depth of each session's outbound channel
pub const SESSION_QUEUE: usize = 256;

/// A frame on its way to one websocket
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
}

/// Everything a connection can ask of the game server
#[derive(Debug)]
pub enum ServerCommand {
    Connect {
        session: SessionId,
        tx: mpsc::Sender<Outbound>,
    },
    Disconnect {
        session: SessionId,
    },
    Client {
        session: SessionId,
        msg: ClientMsg,
    },
    Input {
        session: SessionId,
        frame: InputFrame,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("game server is not running")]
pub struct ServerClosed;

/// Counters published by the actor for readers outside it
#[derive(Debug, Default)]
pub struct LiveStats {
    hub_players: AtomicUsize,
    minigames: AtomicUsize,
    sessions: AtomicUsize,
}

impl LiveStats {
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }
}

/// Cloneable handle to the game server task
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::Sender<ServerCommand>,
    stats: Arc<LiveStats>,
    store: Arc<ServerStore>,
}

impl ServerHandle {
    pub async fn send(&self, command: ServerCommand) -> Result<(), ServerClosed> {
        self.tx.send(command).await.map_err(|_| ServerClosed)
    }

    pub async fn connect(&self, session: SessionId, tx: mpsc::Sender<Outbound>) -> Result<(), ServerClosed> {
        self.send(ServerCommand::Connect { session, tx }).await
    }

    pub async fn disconnect(&self, session: SessionId) -> Result<(), ServerClosed> {
        self.send(ServerCommand::Disconnect { session }).await
    }

    pub async fn client(&self, session: SessionId, msg: ClientMsg) -> Result<(), ServerClosed> {
        self.send(ServerCommand::Client { session, msg }).await
    }

    pub async fn input(&self, session: SessionId, frame: InputFrame) -> Result<(), ServerClosed> {
        self.send(ServerCommand::Input { session, frame }).await
    }

    pub fn stats(&self) -> &LiveStats {
        &self.stats
    }

    /// Latest published server summary
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            uptime_secs: uptime_secs(),
            hub_players: self.stats.hub_players.load(Ordering::Relaxed),
            minigames: self.stats.minigames.load(Ordering::Relaxed),
            total_clients: self.store.clients_seen(),
        }
    }
}

struct Session {
    tx: mpsc::Sender<Outbound>,
}

/// Owns the lobby registry and every connected session's outbound queue
pub struct GameServer {
    registry: LobbyRegistry,
    sessions: HashMap<SessionId, Session>,
    store: Arc<ServerStore>,
    stats: Arc<LiveStats>,
    sim: SimConfig,
    rng: ChaCha8Rng,
    rx: mpsc::Receiver<ServerCommand>,
}

impl GameServer {
    pub fn new(registry: LobbyRegistry, sim: SimConfig, store: Arc<ServerStore>, seed: u64) -> (Self, ServerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let stats = Arc::new(LiveStats::default());
        let handle = ServerHandle {
            tx,
            stats: Arc::clone(&stats),
            store: Arc::clone(&store),
        };
        let server = Self {
            registry,
            sessions: HashMap::new(),
            store,
            stats,
            sim,
            rng: ChaCha8Rng::seed_from_u64(seed),
            rx,
        };
        server.publish_stats();
        (server, handle)
    }

    /// Run both loops until every handle is dropped
    pub async fn run(mut self) {
        info!(
            physics_hz = self.sim.physics_hz,
            tick_hz = self.sim.tick_hz,
            "Game server started"
        );

        let mut fixed = FixedStep::new(self.sim.physics_step(), self.sim.max_frame_time);
        let mut physics = interval(Duration::from_secs_f64(self.sim.physics_step()));
        physics.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut gameplay = interval(Duration::from_secs_f64(self.sim.tick_interval()));
        gameplay.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = physics.tick() => {
                    let steps = fixed.tick(Instant::now());
                    for _ in 0..steps {
                        self.registry.fixed_update(fixed.step());
                    }
                }
                _ = gameplay.tick() => self.gameplay_tick(),
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        info!(sessions = self.sessions.len(), "Game server stopped");
    }

    /// AI and minigame progression, then events and one snapshot per occupied lobby
    pub fn gameplay_tick(&mut self) {
        self.registry.update();
        self.flush();
        self.broadcast_snapshots();
        self.publish_stats();
    }

    pub fn handle(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connect { session, tx } => self.connect(session, tx),
            ServerCommand::Disconnect { session } => self.disconnect(session),
            ServerCommand::Client { session, msg } => {
                self.handle_client(session, msg);
                self.flush();
            }
            ServerCommand::Input { session, frame } => self.handle_input(session, &frame),
        }
    }

    fn connect(&mut self, session: SessionId, tx: mpsc::Sender<Outbound>) {
        let total = self.store.client_connected();
        self.sessions.insert(session, Session { tx });
        info!(session_id = %session, total_clients = total, "Session connected");
        self.send(
            session,
            &ServerMsg::Welcome {
                session_id: session,
                server_time: unix_millis(),
            },
        );
        self.publish_stats();
    }

    fn disconnect(&mut self, session: SessionId) {
        if self.sessions.remove(&session).is_none() {
            return;
        }
        match self.registry.disconnect(session) {
            Some(profile) => {
                info!(session_id = %session, nickname = %profile.nickname, "Session disconnected")
            }
            None => info!(session_id = %session, "Session disconnected before joining"),
        }
        self.flush();
        self.publish_stats();
    }

    fn handle_input(&mut self, session: SessionId, frame: &InputFrame) {
        let Some(lobby) = self.registry.lobby_of_mut(session) else {
            trace!(session_id = %session, "Input before ready");
            return;
        };
        if !lobby.world_mut().apply_input(session, frame) {
            trace!(session_id = %session, seq = frame.seq, "Stale input frame dropped");
        }
    }

    /// Serialize and deliver every queued lobby message
    fn flush(&mut self) {
        let Self {
            registry, sessions, ..
        } = self;
        for lobby in registry.lobbies_mut() {
            let dispatches = lobby.drain_outbox();
            if dispatches.is_empty() {
                continue;
            }
            let roster: Vec<SessionId> = lobby.roster().collect();
            for dispatch in dispatches {
                let Some(text) = encode_json(dispatch.message()) else {
                    continue;
                };
                match &dispatch {
                    Dispatch::Room(_) => {
                        for id in &roster {
                            deliver(sessions, *id, Outbound::Text(text.clone()));
                        }
                    }
                    Dispatch::RoomExcept(except, _) => {
                        for id in roster.iter().filter(|id| *id != except) {
                            deliver(sessions, *id, Outbound::Text(text.clone()));
                        }
                    }
                    Dispatch::To(id, _) => deliver(sessions, *id, Outbound::Text(text)),
                }
            }
        }
    }

    /// Encode each lobby's snapshot once and fan the bytes out to its roster
    fn broadcast_snapshots(&mut self) {
        let time = unix_millis() as f64;
        let Self {
            registry, sessions, ..
        } = self;
        for lobby in registry.lobbies() {
            let Some(snapshot) = lobby.snapshot(time) else {
                continue;
            };
            let bytes = match snapshot.encode() {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(lobby_id = %lobby.id(), error = %err, "Snapshot encode failed");
                    continue;
                }
            };
            for id in lobby.roster() {
                deliver(sessions, id, Outbound::Binary(bytes.clone()));
            }
        }
    }

    fn send(&self, session: SessionId, msg: &ServerMsg) {
        if let Some(text) = encode_json(msg) {
            deliver(&self.sessions, session, Outbound::Text(text));
        }
    }

    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            uptime_secs: uptime_secs(),
            hub_players: self.registry.hub_players(),
            minigames: self.registry.minigame_count(),
            total_clients: self.store.clients_seen(),
        }
    }

    fn publish_stats(&self) {
        self.stats
            .hub_players
            .store(self.registry.hub_players(), Ordering::Relaxed);
        self.stats
            .minigames
            .store(self.registry.minigame_count(), Ordering::Relaxed);
        self.stats
            .sessions
            .store(self.sessions.len(), Ordering::Relaxed);
    }
}

fn encode_json(msg: &ServerMsg) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(text),
        Err(err) => {
            warn!(error = %err, "Failed to serialize server message");
            None
        }
    }
}

/// Queue a frame without blocking the tick. A full queue drops the frame.
fn deliver(sessions: &HashMap<SessionId, Session>, id: SessionId, frame: Outbound) {
    let Some(session) = sessions.get(&id) else {
        return;
    };
    match session.tx.try_send(frame) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!(session_id = %id, "Outbound queue full, frame dropped")
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            trace!(session_id = %id, "Outbound queue closed")
        }
    }
}
