//! Map layout: lanes, structures, landmarks and the player's start.
//!
//! `Scenario::demo()` is the shipped map. A RON file can replace it; unlike
//! `SimConfig`, a scenario file must be complete.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SimConfig, parse_ron, read_ron};
use crate::gameplay::Team;
use crate::gameplay::ai::Roster;
use crate::gameplay::building::{SpawnPolicy, spawn_city, spawn_tower};
use crate::gameplay::combat::projectile::{ProjectileKind, Splash};
use crate::gameplay::economy::landmark::spawn_landmark;
use crate::gameplay::events::GameStarted;
use crate::gameplay::player::spawn_player;
use crate::gameplay::pool::{ObjectPool, setup_pools};
use crate::gameplay::units::{ActorKind, Side};
use crate::GameState;

// === Layout Types ===

/// A point on the ground plane.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct GroundPoint(pub f32, pub f32);

impl GroundPoint {
    #[must_use]
    pub const fn to_vec3(self) -> Vec3 {
        Vec3::new(self.0, self.1, 0.0)
    }
}

/// Batch production of a tower.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpawnerSpec {
    pub kinds: Vec<ActorKind>,
    pub batch_size: usize,
    pub intra_batch_delay: f32,
    pub batch_interval: f32,
    #[serde(default)]
    pub policy: SpawnPolicy,
    /// Index of the first lane waypoint the batch walks to.
    #[serde(default)]
    pub path_start: usize,
    /// Staging points, cycled by batch index. Empty stages at the origin.
    #[serde(default)]
    pub idle_points: Vec<GroundPoint>,
    /// Where members appear. Defaults to the tower itself.
    #[serde(default)]
    pub origin: Option<GroundPoint>,
}

/// Ranged attack of a tower or city.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VolleySpec {
    pub range: f32,
    pub interval: f32,
    pub damage: f32,
    pub muzzles: usize,
    pub prefer_shielded: bool,
    pub projectile: ProjectileKind,
    pub flight_secs: f32,
    pub splash: Option<Splash>,
}

impl Default for VolleySpec {
    fn default() -> Self {
        Self {
            range: 10.0,
            interval: 1.0,
            damage: 10.0,
            muzzles: 1,
            prefer_shielded: false,
            projectile: ProjectileKind::TowerBullet,
            flight_secs: 0.2,
            splash: None,
        }
    }
}

/// A tower placed at load time or built from a landmark.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TowerSpec {
    pub name: String,
    pub team: Team,
    pub level: u8,
    pub position: GroundPoint,
    /// Side lanes passing this tower are pushed to.
    #[serde(default)]
    pub side: Side,
    /// Overrides `level * combat.tower_hp_per_level`.
    #[serde(default)]
    pub hp: Option<f32>,
    pub detect_radius: f32,
    #[serde(default)]
    pub spawner: Option<SpawnerSpec>,
    #[serde(default)]
    pub volley: Option<VolleySpec>,
    /// Posts of archers bound to the tower.
    #[serde(default)]
    pub archers: Vec<GroundPoint>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CitySpec {
    pub team: Team,
    pub position: GroundPoint,
    pub hp: f32,
    /// Gold dropped on destruction.
    pub reward: u32,
    /// Radius of the breach zone.
    pub detect_radius: f32,
    #[serde(default)]
    pub volley: Option<VolleySpec>,
}

/// What a paid-off landmark does.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum LandmarkReward {
    BuildTower(TowerSpec),
    Upgrade,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LandmarkSpec {
    pub name: String,
    pub position: GroundPoint,
    pub radius: f32,
    pub cost: u32,
    pub reward: LandmarkReward,
    /// Stays locked until an enemy tower of this level is destroyed.
    #[serde(default)]
    pub unlock_level: Option<u8>,
}

// === Resources ===

/// The whole map.
#[derive(Resource, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Lane friendly actors march along, toward the enemy city.
    pub friendly_lane: Vec<GroundPoint>,
    /// Lane enemy actors march along, toward the friendly city.
    pub enemy_lane: Vec<GroundPoint>,
    pub player_start: GroundPoint,
    pub cities: Vec<CitySpec>,
    pub towers: Vec<TowerSpec>,
    pub landmarks: Vec<LandmarkSpec>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::demo()
    }
}

fn friendly_tower(name: &str, position: GroundPoint, kinds: Vec<ActorKind>, side: Side) -> TowerSpec {
    TowerSpec {
        name: name.to_string(),
        team: Team::Friendly,
        level: 1,
        position,
        side,
        hp: None,
        detect_radius: 10.0,
        spawner: Some(SpawnerSpec {
            kinds,
            batch_size: 4,
            intra_batch_delay: 0.5,
            batch_interval: 10.0,
            policy: SpawnPolicy::Continuous,
            path_start: 0,
            idle_points: vec![
                GroundPoint(position.0 - 1.0, position.1 + 2.0),
                GroundPoint(position.0 + 1.0, position.1 + 2.0),
            ],
            origin: None,
        }),
        volley: Some(VolleySpec::default()),
        archers: Vec::new(),
    }
}

impl Scenario {
    /// The shipped map: one lane between two cities, three enemy towers of
    /// rising level and six landmarks unlocked as they fall.
    #[must_use]
    pub fn demo() -> Self {
        let friendly_lane = vec![
            GroundPoint(0.0, -30.0),
            GroundPoint(0.0, -10.0),
            GroundPoint(0.0, 10.0),
            GroundPoint(0.0, 25.0),
            GroundPoint(0.0, 40.0),
            GroundPoint(0.0, 55.0),
        ];
        let enemy_lane = friendly_lane.iter().rev().copied().collect();
        let enemy_city = GroundPoint(0.0, 60.0);

        let towers = vec![
            friendly_tower("Barracks", GroundPoint(-6.0, -32.0), vec![ActorKind::Axe, ActorKind::Sword], Side::Left),
            TowerSpec {
                name: "Outpost".to_string(),
                team: Team::Enemy,
                level: 1,
                position: GroundPoint(0.0, 10.0),
                side: Side::Right,
                hp: None,
                detect_radius: 12.0,
                spawner: Some(SpawnerSpec {
                    kinds: vec![ActorKind::Grunt],
                    batch_size: 3,
                    intra_batch_delay: 0.5,
                    batch_interval: 10.0,
                    policy: SpawnPolicy::Immediate,
                    path_start: 0,
                    idle_points: Vec::new(),
                    origin: Some(enemy_city),
                }),
                volley: Some(VolleySpec::default()),
                archers: Vec::new(),
            },
            TowerSpec {
                name: "Keep".to_string(),
                team: Team::Enemy,
                level: 2,
                position: GroundPoint(-6.0, 25.0),
                side: Side::Left,
                hp: None,
                detect_radius: 12.0,
                spawner: Some(SpawnerSpec {
                    kinds: vec![ActorKind::Grunt],
                    batch_size: 4,
                    intra_batch_delay: 0.5,
                    batch_interval: 10.0,
                    policy: SpawnPolicy::Staged,
                    path_start: 2,
                    idle_points: vec![
                        GroundPoint(-3.0, 22.0),
                        GroundPoint(-1.0, 22.0),
                        GroundPoint(-3.0, 20.0),
                        GroundPoint(-1.0, 20.0),
                    ],
                    origin: None,
                }),
                volley: Some(VolleySpec {
                    muzzles: 2,
                    ..VolleySpec::default()
                }),
                archers: Vec::new(),
            },
            TowerSpec {
                name: "Archery".to_string(),
                team: Team::Enemy,
                level: 3,
                position: GroundPoint(6.0, 40.0),
                side: Side::Right,
                hp: None,
                detect_radius: 12.0,
                spawner: None,
                volley: None,
                archers: vec![
                    GroundPoint(4.0, 38.0),
                    GroundPoint(6.0, 37.0),
                    GroundPoint(8.0, 38.0),
                ],
            },
        ];

        let landmark = |name: &str, position, cost, reward, unlock_level| LandmarkSpec {
            name: name.to_string(),
            position,
            radius: 1.5,
            cost,
            reward,
            unlock_level,
        };
        let landmarks = vec![
            landmark(
                "Gate 1",
                GroundPoint(6.0, -28.0),
                10,
                LandmarkReward::BuildTower(friendly_tower(
                    "Shield Hall",
                    GroundPoint(8.0, -26.0),
                    vec![ActorKind::Shield],
                    Side::Right,
                )),
                None,
            ),
            landmark(
                "Gate 2",
                GroundPoint(-6.0, -12.0),
                20,
                LandmarkReward::BuildTower(friendly_tower(
                    "Crossbow Range",
                    GroundPoint(-8.0, -10.0),
                    vec![ActorKind::Crossbow],
                    Side::Left,
                )),
                Some(1),
            ),
            landmark("Gate 3", GroundPoint(6.0, 5.0), 30, LandmarkReward::Upgrade, Some(2)),
            landmark(
                "Gate 4",
                GroundPoint(-8.0, 18.0),
                20,
                LandmarkReward::BuildTower(friendly_tower(
                    "Forward Barracks",
                    GroundPoint(-10.0, 20.0),
                    vec![ActorKind::Axe, ActorKind::Sword],
                    Side::Left,
                )),
                Some(3),
            ),
            landmark(
                "Gate 5",
                GroundPoint(8.0, 18.0),
                20,
                LandmarkReward::BuildTower(friendly_tower(
                    "Forward Hall",
                    GroundPoint(10.0, 20.0),
                    vec![ActorKind::Shield, ActorKind::Crossbow],
                    Side::Right,
                )),
                Some(3),
            ),
            landmark("Gate 6", GroundPoint(0.0, 30.0), 40, LandmarkReward::Upgrade, Some(3)),
        ];

        let city_volley = VolleySpec {
            muzzles: 3,
            prefer_shielded: true,
            ..VolleySpec::default()
        };
        Self {
            friendly_lane,
            enemy_lane,
            player_start: GroundPoint(0.0, -35.0),
            cities: vec![
                CitySpec {
                    team: Team::Friendly,
                    position: GroundPoint(0.0, -40.0),
                    hp: 1000.0,
                    reward: 0,
                    detect_radius: 3.0,
                    volley: Some(VolleySpec::default()),
                },
                CitySpec {
                    team: Team::Enemy,
                    position: enemy_city,
                    hp: 1000.0,
                    reward: 100,
                    detect_radius: 3.0,
                    volley: Some(city_volley),
                },
            ],
            towers,
            landmarks,
        }
    }

    /// Load and validate a RON scenario file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let scenario: Self = read_ron(path)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse and validate a RON scenario document.
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        let scenario: Self = parse_ron(content, "<inline>")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Reject layouts the simulation cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid(message));
        if self.friendly_lane.is_empty() || self.enemy_lane.is_empty() {
            return invalid("lanes must not be empty".into());
        }
        for team in [Team::Friendly, Team::Enemy] {
            let cities = self.cities.iter().filter(|city| city.team == team).count();
            if cities != 1 {
                return invalid(format!("expected one {team:?} main city, found {cities}"));
            }
        }
        for city in &self.cities {
            if city.hp <= 0.0 {
                return invalid(format!("{:?} main city hp must be positive", city.team));
            }
            validate_volley(city.volley.as_ref(), &format!("{:?} main city", city.team))?;
        }
        let landmark_towers = self.landmarks.iter().filter_map(|landmark| match &landmark.reward {
            LandmarkReward::BuildTower(tower) => Some(tower),
            LandmarkReward::Upgrade => None,
        });
        for tower in self.towers.iter().chain(landmark_towers) {
            validate_tower(tower)?;
        }
        for landmark in &self.landmarks {
            if landmark.radius <= 0.0 || landmark.cost == 0 {
                return invalid(format!(
                    "landmark `{}` needs a positive radius and cost",
                    landmark.name
                ));
            }
        }
        Ok(())
    }

    /// Lanes as world positions.
    #[must_use]
    pub fn paths(&self) -> Paths {
        let lane = |points: &[GroundPoint]| points.iter().map(|point| point.to_vec3()).collect();
        Paths {
            friendly: lane(&self.friendly_lane),
            enemy: lane(&self.enemy_lane),
        }
    }
}

fn validate_volley(volley: Option<&VolleySpec>, owner: &str) -> Result<(), ConfigError> {
    let Some(volley) = volley else {
        return Ok(());
    };
    if volley.interval <= 0.0 || volley.muzzles == 0 || volley.flight_secs < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{owner} volley needs a positive interval, at least one muzzle and a non-negative flight time"
        )));
    }
    Ok(())
}

fn validate_tower(tower: &TowerSpec) -> Result<(), ConfigError> {
    if tower.level == 0 {
        return Err(ConfigError::Invalid(format!(
            "tower `{}` level must be at least 1",
            tower.name
        )));
    }
    if let Some(spawner) = &tower.spawner {
        if spawner.kinds.is_empty() || spawner.batch_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "tower `{}` spawner needs kinds and a positive batch size",
                tower.name
            )));
        }
        if spawner.intra_batch_delay < 0.0 || spawner.batch_interval < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tower `{}` spawner timings must not be negative",
                tower.name
            )));
        }
    }
    validate_volley(tower.volley.as_ref(), &format!("tower `{}`", tower.name))
}

/// Lane waypoints per team, in world coordinates.
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct Paths {
    pub friendly: Vec<Vec3>,
    pub enemy: Vec<Vec3>,
}

impl Paths {
    /// The lane actors of `team` march along.
    #[must_use]
    pub fn lane(&self, team: Team) -> &[Vec3] {
        match team {
            Team::Friendly => &self.friendly,
            Team::Enemy => &self.enemy,
        }
    }
}

// === Systems ===

/// Spawns cities, towers, landmarks and the player from the scenario.
fn spawn_scenario(
    mut commands: Commands,
    config: Res<SimConfig>,
    scenario: Res<Scenario>,
    mut pool: ResMut<ObjectPool>,
    mut roster: ResMut<Roster>,
) {
    let paths = scenario.paths();
    for city in &scenario.cities {
        spawn_city(&mut commands, &mut roster, city);
    }
    for tower in &scenario.towers {
        spawn_tower(&mut commands, &mut pool, &mut roster, &config, &paths, tower, false);
    }
    for landmark in &scenario.landmarks {
        spawn_landmark(&mut commands, &config, landmark);
    }
    spawn_player(&mut commands, &config, scenario.player_start.to_vec3());
    commands.insert_resource(paths);
    info!(
        "scenario spawned: {} towers, {} landmarks",
        scenario.towers.len(),
        scenario.landmarks.len()
    );
}

fn finish_loading(mut next_state: ResMut<NextState<GameState>>) {
    next_state.set(GameState::Playing);
}

fn start_game(mut started: MessageWriter<GameStarted>) {
    info!("game started");
    started.write(GameStarted);
}

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<Scenario>().init_resource::<Paths>();
    app.add_systems(
        OnEnter(GameState::Loading),
        (setup_pools, spawn_scenario, finish_loading).chain(),
    );
    app.add_systems(OnEnter(GameState::Playing), start_game);
}
