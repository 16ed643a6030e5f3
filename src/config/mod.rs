//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::util::rate_limit::{COMMAND_RATE_LIMIT, INPUT_RATE_LIMIT};
use crate::util::time::{step_secs, PHYSICS_HZ, TICK_HZ};

/// Simulation tunables shared by every lobby
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Fixed physics steps per second
    pub physics_hz: u32,
    /// Gameplay ticks / snapshot broadcasts per second
    pub tick_hz: u32,
    /// Real elapsed time consumed per physics loop iteration is clamped to this
    pub max_frame_time: f64,
    /// Seconds an empty vehicle survives before despawning
    pub vehicle_idle_secs: f64,
    /// Seconds between an NPC's death and its removal
    pub npc_removal_delay: f64,
}

impl SimConfig {
    pub fn physics_step(&self) -> f64 {
        step_secs(self.physics_hz)
    }

    pub fn tick_interval(&self) -> f64 {
        step_secs(self.tick_hz)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            physics_hz: PHYSICS_HZ,
            tick_hz: TICK_HZ,
            max_frame_time: 0.25,
            vehicle_idle_secs: 10.0,
            npc_removal_delay: crate::game::npc::REMOVAL_DELAY,
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of the human format
    pub log_json: bool,

    /// Allowed client origins for CORS; empty means permissive
    pub client_origins: Vec<String>,

    /// Directory of `<name>.json` world templates overriding the built-in ones
    pub world_template_dir: Option<PathBuf>,

    /// Binary input frames accepted per second per session
    pub input_rate_limit: u32,
    /// JSON commands accepted per second per session
    pub command_rate_limit: u32,

    pub sim: SimConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins for hosted deployments, then SERVER_ADDR, then the default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let client_origins = env::var("CLIENT_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let defaults = SimConfig::default();
        let sim = SimConfig {
            physics_hz: parse_or("PHYSICS_HZ", defaults.physics_hz)?,
            tick_hz: parse_or("TICK_HZ", defaults.tick_hz)?,
            max_frame_time: parse_or("MAX_FRAME_TIME", defaults.max_frame_time)?,
            vehicle_idle_secs: parse_or("VEHICLE_IDLE_SECS", defaults.vehicle_idle_secs)?,
            npc_removal_delay: parse_or("NPC_REMOVAL_DELAY_SECS", defaults.npc_removal_delay)?,
        };
        if sim.physics_hz == 0 {
            return Err(ConfigError::Invalid("PHYSICS_HZ"));
        }
        if sim.tick_hz == 0 {
            return Err(ConfigError::Invalid("TICK_HZ"));
        }
        if sim.max_frame_time <= 0.0 {
            return Err(ConfigError::Invalid("MAX_FRAME_TIME"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),

            client_origins,

            world_template_dir: env::var("WORLD_TEMPLATE_DIR").ok().map(PathBuf::from),

            input_rate_limit: parse_or("INPUT_RATE_LIMIT", INPUT_RATE_LIMIT)?,
            command_rate_limit: parse_or("COMMAND_RATE_LIMIT", COMMAND_RATE_LIMIT)?,

            sim,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            log_json: false,
            client_origins: Vec::new(),
            world_template_dir: None,
            input_rate_limit: INPUT_RATE_LIMIT,
            command_rate_limit: COMMAND_RATE_LIMIT,
            sim: SimConfig::default(),
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
