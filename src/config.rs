//! Simulation tuning: actor stats, timings, bag geometry, pool sizing.
//!
//! `SimConfig::default()` carries the shipped tuning. A RON file can override
//! any subset of it; missing fields fall back to the defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gameplay::economy::bag::BagLayout;
use crate::gameplay::units::ActorKind;

// === Errors ===

/// Failure to load or validate a configuration or scenario file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Read a RON document from disk.
pub(crate) fn read_ron<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_ron(&content, &path.display().to_string())
}

/// Parse a RON document, tagging errors with `origin`.
pub(crate) fn parse_ron<T: for<'de> Deserialize<'de>>(
    content: &str,
    origin: &str,
) -> Result<T, ConfigError> {
    ron::from_str(content).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message()))
    }
}

// === Sections ===

/// Stats of one actor kind.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Reflect)]
pub struct ActorConfig {
    pub hp: f32,
    pub attack: f32,
    pub range: f32,
    pub speed: f32,
    /// Seconds per attack swing. The hit lands halfway through.
    pub attack_interval: f32,
}

impl ActorConfig {
    #[must_use]
    pub const fn new(hp: f32, attack: f32, range: f32, speed: f32, attack_interval: f32) -> Self {
        Self {
            hp,
            attack,
            range,
            speed,
            attack_interval,
        }
    }
}

/// Per-kind actor stats.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ActorTable {
    pub axe: ActorConfig,
    pub sword: ActorConfig,
    pub shield: ActorConfig,
    pub crossbow: ActorConfig,
    pub grunt: ActorConfig,
    pub archer: ActorConfig,
}

impl Default for ActorTable {
    fn default() -> Self {
        Self {
            axe: ActorConfig::new(20.0, 12.0, 7.0, 7.0, 1.0),
            sword: ActorConfig::new(12.0, 10.0, 7.0, 7.0, 0.8),
            shield: ActorConfig::new(200.0, 10.0, 7.0, 6.0, 1.2),
            crossbow: ActorConfig::new(12.0, 6.0, 9.0, 6.0, 1.0),
            grunt: ActorConfig::new(10.0, 10.0, 0.0, 6.0, 1.0),
            archer: ActorConfig::new(10.0, 4.0, 10.0, 5.0, 1.5),
        }
    }
}

impl ActorTable {
    #[must_use]
    pub const fn get(&self, kind: ActorKind) -> &ActorConfig {
        match kind {
            ActorKind::Axe => &self.axe,
            ActorKind::Sword => &self.sword,
            ActorKind::Shield => &self.shield,
            ActorKind::Crossbow => &self.crossbow,
            ActorKind::Grunt => &self.grunt,
            ActorKind::Archer => &self.archer,
        }
    }
}

/// Object pool sizing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Instances synthesized when a pool runs dry.
    pub growth: usize,
    /// Hard ceiling per pool. Acquire fails once reached.
    pub max_per_kind: usize,
    /// Preallocation for pools without an explicit entry in `counts`.
    pub default_count: usize,
    /// Preallocation per pool key.
    pub counts: HashMap<String, usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            growth: 10,
            max_per_kind: 500,
            default_count: 100,
            counts: HashMap::new(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn count_for(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(self.default_count)
    }
}

/// Locomotion tuning shared by every actor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MovementConfig {
    /// Distance under which a point counts as reached.
    pub arrival_epsilon: f32,
    /// Waypoints closer than this (planar) to a tower are deflected.
    pub deflect_proximity: f32,
    /// Lateral offset from the tower center for deflected waypoints.
    pub deflect_offset: f32,
    /// Angular step between stand positions around a besieged structure.
    pub fan_step_degrees: f32,
    /// Stand positions before the fan wraps around.
    pub fan_slots: usize,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            arrival_epsilon: 0.1,
            deflect_proximity: 3.0,
            deflect_offset: 4.0,
            fan_step_degrees: 30.0,
            fan_slots: 6,
        }
    }
}

/// Combat timings and rewards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CombatConfig {
    /// Length of the actor death clip.
    pub death_secs: f32,
    /// Length of the structure destruction clip.
    pub destroy_secs: f32,
    /// Length of the damage flinch.
    pub flinch_secs: f32,
    /// Damage that kills any actor outright (contact trades, bound units).
    pub lethal_damage: f32,
    /// Delay between consecutive muzzles of one volley.
    pub muzzle_stagger: f32,
    /// Arrow flight time.
    pub arrow_flight_secs: f32,
    /// Height above the ground that projectiles leave from.
    pub muzzle_height: f32,
    /// Tower hit points per level.
    pub tower_hp_per_level: f32,
    /// Gold dropped per tower level.
    pub tower_reward_per_level: u32,
    /// Gold dropped by a dead enemy actor.
    pub enemy_reward: u32,
    /// Fraction of the batch interval a completed batch waits before release.
    pub release_settle_fraction: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            death_secs: 1.0,
            destroy_secs: 1.5,
            flinch_secs: 0.2,
            lethal_damage: 999.0,
            muzzle_stagger: 0.1,
            arrow_flight_secs: 0.3,
            muzzle_height: 1.0,
            tower_hp_per_level: 100.0,
            tower_reward_per_level: 10,
            enemy_reward: 1,
            release_settle_fraction: 0.1,
        }
    }
}

/// The player's hero.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub speed: f32,
    pub attack: f32,
    pub attack_interval: f32,
    pub range: f32,
    pub bullet_speed: f32,
    /// Coins placed in the bag when the game starts.
    pub starting_gold: u32,
    /// Planar distance at which loose coins fly into the bag.
    pub pickup_radius: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speed: 6.0,
            attack: 10.0,
            attack_interval: 1.0,
            range: 10.0,
            bullet_speed: 30.0,
            starting_gold: 10,
            pickup_radius: 5.0,
        }
    }
}

/// Dropped gold.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LootConfig {
    pub scatter_inner: f32,
    pub scatter_outer: f32,
    pub scatter_lift: f32,
    pub scatter_secs: f32,
    /// Spin applied to scattering coins, radians per second.
    pub scatter_spin: f32,
    pub seed: u64,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            scatter_inner: 3.0,
            scatter_outer: 5.0,
            scatter_lift: 5.0,
            scatter_secs: 0.5,
            scatter_spin: std::f32::consts::TAU * 2.0,
            seed: 7,
        }
    }
}

/// Gold deposits on landmarks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LandmarkConfig {
    pub deposit_interval: f32,
    pub deposit_flight_secs: f32,
    pub deposit_lift: f32,
    /// Coins land up to this far from the centre on each planar axis.
    pub deposit_spread: f32,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            deposit_interval: 0.05,
            deposit_flight_secs: 0.3,
            deposit_lift: 2.0,
            deposit_spread: 1.0,
        }
    }
}

/// Spawn cadence applied to friendly towers by an upgrade.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct UpgradeConfig {
    pub intra_batch_delay: f32,
    pub batch_interval: f32,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            intra_batch_delay: 0.1,
            batch_interval: 3.0,
        }
    }
}

// === Resource ===

/// All simulation tuning.
#[derive(Resource, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct SimConfig {
    pub pool: PoolConfig,
    pub actors: ActorTable,
    pub movement: MovementConfig,
    pub combat: CombatConfig,
    pub player: PlayerConfig,
    pub bag: BagLayout,
    pub loot: LootConfig,
    pub landmark: LandmarkConfig,
    pub upgrade: UpgradeConfig,
}

impl SimConfig {
    /// Load and validate a RON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_ron(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a RON config document.
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_ron(content, "<inline>")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.pool.growth > 0, || "pool.growth must be positive".into())?;
        ensure(self.pool.max_per_kind > 0, || {
            "pool.max_per_kind must be positive".into()
        })?;
        for kind in ActorKind::ALL {
            let stats = self.actors.get(*kind);
            ensure(stats.hp > 0.0, || format!("{kind:?} hp must be positive"))?;
            ensure(stats.speed >= 0.0, || {
                format!("{kind:?} speed must not be negative")
            })?;
            ensure(stats.attack_interval > 0.0, || {
                format!("{kind:?} attack_interval must be positive")
            })?;
        }
        ensure(self.movement.arrival_epsilon > 0.0, || {
            "movement.arrival_epsilon must be positive".into()
        })?;
        ensure(self.movement.fan_slots > 0, || {
            "movement.fan_slots must be positive".into()
        })?;
        ensure(self.player.attack_interval > 0.0, || {
            "player.attack_interval must be positive".into()
        })?;
        ensure(self.player.bullet_speed > 0.0, || {
            "player.bullet_speed must be positive".into()
        })?;
        ensure(self.landmark.deposit_interval > 0.0, || {
            "landmark.deposit_interval must be positive".into()
        })?;
        ensure(self.landmark.deposit_spread >= 0.0, || {
            "landmark.deposit_spread must not be negative".into()
        })?;
        ensure(self.loot.scatter_inner <= self.loot.scatter_outer, || {
            "loot.scatter_inner must not exceed loot.scatter_outer".into()
        })?;
        self.bag.validate()
    }
}

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<SimConfig>();
}
