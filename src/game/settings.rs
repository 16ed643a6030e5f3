//! Declarative world templates: static geometry, entities, spawners and player setup

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::items::ItemKind;
use super::npc::Obstacle;
use crate::util::math::{quat_from_array, vec_from_array, Vec3};

/// Names of the templates every server ships with
pub const BUILTIN_TEMPLATES: [&str; 3] = ["hub", "race", "deathmatch"];

/// Shortest spawner period a template may ask for, in seconds
pub const MIN_SPAWNER_DELAY: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown world template: {0}")]
    UnknownTemplate(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid template {template}: {reason}")]
    Invalid { template: String, reason: String },
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_color() -> String {
    "#808080".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxObject {
    pub name: String,
    pub position: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    /// Full extents (width, height, depth)
    pub scale: [f32; 3],
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default = "default_color")]
    pub color: String,
}

impl BoxObject {
    pub fn half_extents(&self) -> Vec3 {
        vec_from_array(self.scale) * 0.5
    }

    pub fn obstacle(&self) -> Obstacle {
        Obstacle {
            position: vec_from_array(self.position),
            rotation: quat_from_array(self.rotation),
            half_extents: self.half_extents(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnerKind {
    Coin,
    Npc,
}

/// Axis-aligned spawn area; `y` of both corners is usually equal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnArea {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnerObject {
    pub name: String,
    pub spawner_type: SpawnerKind,
    /// Seconds between spawn attempts
    pub delay: f64,
    /// Live objects from this spawner never exceed this count
    pub max_alive: usize,
    pub area: SpawnArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameObject {
    Box(BoxObject),
    Npc {
        name: String,
        position: [f32; 3],
    },
    Car {
        name: String,
        position: [f32; 3],
        #[serde(default = "identity_rotation")]
        rotation: [f32; 4],
    },
    Spawner(SpawnerObject),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinigameKind {
    Race,
    Deathmatch,
}

impl MinigameKind {
    pub fn template(self) -> &'static str {
        match self {
            MinigameKind::Race => "race",
            MinigameKind::Deathmatch => "deathmatch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinigameSettings {
    #[serde(rename = "type")]
    pub kind: MinigameKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub left_hand: Option<ItemKind>,
    /// Starting item slots; the first one is drawn into the right hand
    pub slots: Vec<Option<ItemKind>>,
    /// Used when the template has no spawn points
    pub spawn_position: [f32; 3],
    /// Spawn a car for each joining player and seat them as driver
    pub controlled_object: bool,
    pub starting_ammo: u32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            left_hand: None,
            slots: vec![Some(ItemKind::Pistol)],
            spawn_position: [0.0, 5.0, 0.0],
            controlled_object: false,
            starting_ammo: 64,
        }
    }
}

/// Walkability grid covering the playable area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavSettings {
    pub origin: [f32; 3],
    pub cell_size: f32,
    pub width: u32,
    pub depth: u32,
    /// Tallest box top an NPC walks over
    pub max_step: f32,
}

impl Default for NavSettings {
    fn default() -> Self {
        Self {
            origin: [-50.0, 0.0, -50.0],
            cell_size: 1.0,
            width: 100,
            depth: 100,
            max_step: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub name: String,
    #[serde(default)]
    pub game_objects: Vec<GameObject>,
    #[serde(default)]
    pub minigame: Option<MinigameSettings>,
    #[serde(default)]
    pub spawn_points: Vec<[f32; 3]>,
    #[serde(default)]
    pub player_settings: PlayerSettings,
    #[serde(default)]
    pub nav: NavSettings,
}

fn ground(size: f32) -> GameObject {
    GameObject::Box(BoxObject {
        name: "ground".into(),
        position: [0.0, -0.5, 0.0],
        rotation: identity_rotation(),
        scale: [size, 1.0, size],
        dynamic: false,
        color: "#3a5f3a".into(),
    })
}

fn crate_box(name: &str, position: [f32; 3], scale: [f32; 3], color: &str) -> GameObject {
    GameObject::Box(BoxObject {
        name: name.into(),
        position,
        rotation: identity_rotation(),
        scale,
        dynamic: false,
        color: color.into(),
    })
}

impl WorldSettings {
    pub fn hub() -> Self {
        Self {
            name: "hub".into(),
            game_objects: vec![
                ground(500.0),
                crate_box("wall_north", [0.0, 1.5, -30.0], [20.0, 3.0, 1.0], "#5a5a5a"),
                crate_box("wall_east", [30.0, 1.5, 0.0], [1.0, 3.0, 20.0], "#5a5a5a"),
                crate_box("step", [10.0, 0.25, -10.0], [4.0, 0.5, 4.0], "#8a6a3a"),
                GameObject::Box(BoxObject {
                    name: "crate".into(),
                    position: [5.0, 3.0, 5.0],
                    rotation: identity_rotation(),
                    scale: [1.0, 1.0, 1.0],
                    dynamic: true,
                    color: "#a0522d".into(),
                }),
                GameObject::Npc {
                    name: "guard".into(),
                    position: [-10.0, 1.0, -10.0],
                },
                GameObject::Car {
                    name: "car_a".into(),
                    position: [-20.0, 2.0, 10.0],
                    rotation: identity_rotation(),
                },
                GameObject::Car {
                    name: "car_b".into(),
                    position: [-20.0, 2.0, 20.0],
                    rotation: identity_rotation(),
                },
                GameObject::Spawner(SpawnerObject {
                    name: "coins".into(),
                    spawner_type: SpawnerKind::Coin,
                    delay: 5.0,
                    max_alive: 10,
                    area: SpawnArea {
                        min: [0.0, 0.0, 0.0],
                        max: [40.0, 0.0, 40.0],
                    },
                }),
            ],
            minigame: None,
            spawn_points: vec![[0.0, 5.0, 0.0]],
            player_settings: PlayerSettings::default(),
            nav: NavSettings {
                origin: [-60.0, 0.0, -60.0],
                width: 120,
                depth: 120,
                ..NavSettings::default()
            },
        }
    }

    pub fn race() -> Self {
        Self {
            name: "race".into(),
            game_objects: vec![ground(1000.0)],
            minigame: Some(MinigameSettings {
                kind: MinigameKind::Race,
            }),
            spawn_points: vec![[-100.0, 5.0, -120.0]],
            player_settings: PlayerSettings {
                slots: Vec::new(),
                controlled_object: true,
                starting_ammo: 0,
                ..PlayerSettings::default()
            },
            nav: NavSettings {
                width: 0,
                depth: 0,
                ..NavSettings::default()
            },
        }
    }

    pub fn deathmatch() -> Self {
        let mut game_objects = vec![ground(200.0)];
        for (i, (x, z)) in [(-15.0, -15.0), (15.0, -15.0), (-15.0, 15.0), (15.0, 15.0)]
            .into_iter()
            .enumerate()
        {
            game_objects.push(crate_box(&format!("cover_{i}"), [x, 1.0, z], [4.0, 2.0, 4.0], "#6b4f2a"));
        }
        game_objects.push(crate_box("center_wall", [0.0, 1.5, 0.0], [12.0, 3.0, 1.0], "#5a5a5a"));
        game_objects.push(GameObject::Spawner(SpawnerObject {
            name: "bots".into(),
            spawner_type: SpawnerKind::Npc,
            delay: 5.0,
            max_alive: 5,
            area: SpawnArea {
                min: [-40.0, 1.0, -40.0],
                max: [40.0, 1.0, 40.0],
            },
        }));
        game_objects.push(GameObject::Spawner(SpawnerObject {
            name: "ammo".into(),
            spawner_type: SpawnerKind::Coin,
            delay: 8.0,
            max_alive: 6,
            area: SpawnArea {
                min: [-30.0, 0.0, -30.0],
                max: [30.0, 0.0, 30.0],
            },
        }));

        Self {
            name: "deathmatch".into(),
            game_objects,
            minigame: Some(MinigameSettings {
                kind: MinigameKind::Deathmatch,
            }),
            spawn_points: vec![
                [-35.0, 3.0, -35.0],
                [35.0, 3.0, -35.0],
                [-35.0, 3.0, 35.0],
                [35.0, 3.0, 35.0],
            ],
            player_settings: PlayerSettings {
                starting_ammo: 96,
                ..PlayerSettings::default()
            },
            nav: NavSettings::default(),
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "hub" => Some(Self::hub()),
            "race" => Some(Self::race()),
            "deathmatch" => Some(Self::deathmatch()),
            _ => None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// `<dir>/<name>.json` when present, the built-in template otherwise
    pub fn load(name: &str, dir: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = dir.map(|d| d.join(format!("{name}.json"))) {
            if path.is_file() {
                info!(template = %name, path = %path.display(), "Loading world template from file");
                return Self::from_file(&path);
            }
            debug!(template = %name, "No template file, using built-in");
        }
        Self::builtin(name).ok_or_else(|| SettingsError::UnknownTemplate(name.to_string()))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |reason: String| SettingsError::Invalid {
            template: self.name.clone(),
            reason,
        };
        for object in &self.game_objects {
            match object {
                GameObject::Spawner(s) if !(s.delay.is_finite() && s.delay >= MIN_SPAWNER_DELAY) => {
                    return Err(invalid(format!("spawner {} has delay {}", s.name, s.delay)));
                }
                GameObject::Box(b) if b.scale.iter().any(|v| !(v.is_finite() && *v > 0.0)) => {
                    return Err(invalid(format!("box {} has a non-positive scale", b.name)));
                }
                _ => {}
            }
        }
        if !(self.nav.cell_size.is_finite() && self.nav.cell_size > 0.0) {
            return Err(invalid(format!("nav cell size {}", self.nav.cell_size)));
        }
        Ok(())
    }

    /// Static boxes, the source of the navigation grid
    pub fn obstacles(&self) -> Vec<Obstacle> {
        self.game_objects
            .iter()
            .filter_map(|o| match o {
                GameObject::Box(b) if !b.dynamic => Some(b.obstacle()),
                _ => None,
            })
            .collect()
    }

    pub fn spawners(&self) -> impl Iterator<Item = &SpawnerObject> {
        self.game_objects.iter().filter_map(|o| match o {
            GameObject::Spawner(s) => Some(s),
            _ => None,
        })
    }
}

/// Every template a server can build worlds from, loaded once at startup
#[derive(Debug, Clone)]
pub struct WorldTemplates {
    templates: HashMap<String, WorldSettings>,
}

impl WorldTemplates {
    pub fn load(dir: Option<&Path>) -> Result<Self, SettingsError> {
        let mut templates = HashMap::new();
        for name in BUILTIN_TEMPLATES {
            templates.insert(name.to_string(), WorldSettings::load(name, dir)?);
        }
        Ok(Self { templates })
    }

    #[cfg(test)]
    pub fn builtin() -> Self {
        let templates = BUILTIN_TEMPLATES
            .iter()
            .filter_map(|name| WorldSettings::builtin(name).map(|s| (name.to_string(), s)))
            .collect();
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Result<&WorldSettings, SettingsError> {
        self.templates
            .get(name)
            .ok_or_else(|| SettingsError::UnknownTemplate(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_are_valid() {
        for name in BUILTIN_TEMPLATES {
            let settings = WorldSettings::builtin(name).unwrap();
            settings.validate().unwrap();
            assert_eq!(settings.name, name);
        }
        assert!(WorldSettings::builtin("nope").is_none());
    }

    #[test]
    fn json_template_fills_defaults() {
        let json = r#"{
            "name": "custom",
            "game_objects": [
                {"type": "box", "name": "floor", "position": [0, -0.5, 0], "scale": [10, 1, 10]},
                {"type": "spawner", "name": "c", "spawner_type": "coin", "delay": 2.0, "max_alive": 3,
                 "area": {"min": [0, 0, 0], "max": [5, 0, 5]}}
            ],
            "spawn_points": [[0, 5, 0]]
        }"#;
        let settings: WorldSettings = serde_json::from_str(json).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.spawners().count(), 1);
        assert_eq!(settings.obstacles().len(), 1);
        assert_eq!(settings.player_settings, PlayerSettings::default());
        assert!(settings.minigame.is_none());
        match &settings.game_objects[0] {
            GameObject::Box(b) => {
                assert_eq!(b.rotation, [0.0, 0.0, 0.0, 1.0]);
                assert_eq!(b.half_extents(), Vec3::new(5.0, 0.5, 5.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn spawner_delays_below_the_floor_are_rejected() {
        for delay in [0.0, 1e-7, MIN_SPAWNER_DELAY / 2.0, f64::NAN] {
            let mut settings = WorldSettings::hub();
            settings.game_objects.push(GameObject::Spawner(SpawnerObject {
                name: "bad".into(),
                spawner_type: SpawnerKind::Npc,
                delay,
                max_alive: 1,
                area: SpawnArea {
                    min: [0.0; 3],
                    max: [0.0; 3],
                },
            }));
            assert!(
                matches!(settings.validate(), Err(SettingsError::Invalid { .. })),
                "delay {delay} accepted"
            );
        }
    }

    #[test]
    fn missing_template_dir_falls_back_to_builtin() {
        let dir = std::env::temp_dir().join("sandbox-templates-that-do-not-exist");
        let settings = WorldSettings::load("race", Some(&dir)).unwrap();
        assert_eq!(settings.minigame.map(|m| m.kind), Some(MinigameKind::Race));
        assert!(matches!(
            WorldSettings::load("castle", None),
            Err(SettingsError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn template_file_overrides_builtin() {
        let dir = std::env::temp_dir().join(format!("sandbox-templates-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hub.json"), r#"{"name": "hub", "spawn_points": [[1, 2, 3]]}"#).unwrap();

        let templates = WorldTemplates::load(Some(&dir)).unwrap();
        assert_eq!(templates.get("hub").unwrap().spawn_points, vec![[1.0, 2.0, 3.0]]);
        assert_eq!(templates.get("race").unwrap(), &WorldSettings::race());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
