//! Structures: towers and main cities that spawn actors and fire volleys.

pub mod production;
pub mod volley;

use avian2d::prelude::CollidingEntities;
use bevy::prelude::*;

use crate::config::SimConfig;
use crate::gameplay::Team;
use crate::gameplay::ai::{Role, Roster};
use crate::gameplay::animation::{Animator, Clip};
use crate::gameplay::combat::death::DeathCheck;
use crate::gameplay::combat::{Health, HealthBar};
use crate::gameplay::events::{
    DamageRequest, Died, DropLoot, EnemyBreachedDefense, GameOver, StructureDestroyed,
};
use crate::gameplay::player::PlayerTargets;
use crate::gameplay::pool::{InstanceRef, ObjectPool, Pooled};
use crate::gameplay::units::{
    Actor, ActorKind, ActorSpawn, ActorStats, Breached, Readiness, Side, spawn_actor,
};
use crate::scenario::{CitySpec, Paths, TowerSpec};
use crate::third_party::{CollisionLayer, sensor_body};
use crate::{GameSet, gameplay_running};

pub use production::{SpawnPolicy, Spawner, SpawnerState};
pub use volley::{PendingShots, Volley};

// === Components ===

/// Tower or main city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum StructureKind {
    Tower,
    MainCity,
}

/// A stationary combatant.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct Structure {
    pub kind: StructureKind,
    /// Tier of a tower; main cities are level 0.
    pub level: u8,
    /// Side lanes passing the structure are pushed to.
    pub side: Side,
}

impl Structure {
    #[must_use]
    pub const fn tower(level: u8) -> Self {
        Self {
            kind: StructureKind::Tower,
            level,
            side: Side::Left,
        }
    }

    #[must_use]
    pub const fn with_side(self, side: Side) -> Self {
        Self { side, ..self }
    }

    #[must_use]
    pub const fn main_city() -> Self {
        Self {
            kind: StructureKind::MainCity,
            level: 0,
            side: Side::Left,
        }
    }
}

/// Gold dropped when the structure is destroyed.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct Bounty(pub u32);

// === Spawning ===

/// Spawn a tower, its bound archers, and register it in the roster.
///
/// `live` towers start producing at once; the others wait for
/// `GameStarted` or detection.
pub fn spawn_tower(
    commands: &mut Commands,
    pool: &mut ObjectPool,
    roster: &mut Roster,
    config: &SimConfig,
    paths: &Paths,
    spec: &TowerSpec,
    live: bool,
) -> Entity {
    let position = spec.position.to_vec3();
    let hp = spec
        .hp
        .unwrap_or(config.combat.tower_hp_per_level * f32::from(spec.level));
    let mut tower = commands.spawn((
        Name::new(spec.name.clone()),
        Structure::tower(spec.level).with_side(spec.side),
        spec.team,
        Health::new(hp),
        HealthBar::default(),
        Animator::new(Clip::Idle),
        Bounty(config.combat.tower_reward_per_level * u32::from(spec.level)),
        Transform::from_translation(position),
        sensor_body(spec.detect_radius, CollisionLayer::Check, false),
    ));
    if let Some(spawner) = &spec.spawner {
        let mut spawner = Spawner::from_spec(
            spawner,
            position,
            paths.lane(spec.team),
            config.combat.release_settle_fraction,
        );
        if live {
            spawner.activate();
        }
        tower.insert(spawner);
    }
    if let Some(volley) = &spec.volley {
        tower.insert((Volley::from_spec(volley), PendingShots::default()));
    }
    let entity = tower.id();
    roster.enlist(entity, spec.team, Role::Structure);

    for (index, post) in spec.archers.iter().enumerate() {
        spawn_actor(
            commands,
            pool,
            roster,
            config,
            ActorSpawn {
                kind: ActorKind::Archer,
                position,
                idle_point: post.to_vec3(),
                path: Vec::new(),
                group_index: index,
                ready: false,
                held: false,
                bound_to: Some(entity),
            },
        );
    }
    info!(
        "{:?} tower `{}` (level {}) at {position}",
        spec.team, spec.name, spec.level
    );
    entity
}

/// Spawn a main city and register it in the roster.
pub fn spawn_city(commands: &mut Commands, roster: &mut Roster, spec: &CitySpec) -> Entity {
    let position = spec.position.to_vec3();
    let mut city = commands.spawn((
        Name::new(format!("{:?} Main City", spec.team)),
        Structure::main_city(),
        spec.team,
        Health::new(spec.hp),
        HealthBar::default(),
        Animator::new(Clip::Idle),
        Bounty(spec.reward),
        Transform::from_translation(position),
        sensor_body(spec.detect_radius, CollisionLayer::Check, false),
    ));
    if let Some(volley) = &spec.volley {
        city.insert((Volley::from_spec(volley), PendingShots::default()));
    }
    let entity = city.id();
    roster.enlist(entity, spec.team, Role::Structure);
    info!("{:?} main city at {position}", spec.team);
    entity
}

// === Systems ===

/// Enemy actors touching the friendly main city hit it and die.
/// Runs in `GameSet::Combat`.
fn detect_breaches(
    config: Res<SimConfig>,
    mut commands: Commands,
    cities: Query<(Entity, &Structure, &Team, &Health, &CollidingEntities)>,
    intruders: Query<(&Team, &ActorStats, &Health, Option<&Pooled>), (With<Actor>, Without<Breached>)>,
    mut damage: MessageWriter<DamageRequest>,
    mut breached: MessageWriter<EnemyBreachedDefense>,
) {
    for (city, structure, team, health, colliding) in &cities {
        if structure.kind != StructureKind::MainCity || *team != Team::Friendly || health.is_dead()
        {
            continue;
        }
        for &enemy in colliding.iter() {
            let Ok((enemy_team, stats, enemy_health, pooled)) = intruders.get(enemy) else {
                continue;
            };
            if *enemy_team != Team::Enemy || enemy_health.is_dead() {
                continue;
            }
            damage.write(DamageRequest {
                target: InstanceRef::fixed(city),
                amount: stats.attack,
            });
            damage.write(DamageRequest {
                target: InstanceRef::of(enemy, pooled),
                amount: config.combat.lethal_damage,
            });
            breached.write(EnemyBreachedDefense { enemy, city });
            commands.entity(enemy).insert(Breached);
            debug!("{enemy} breached the main city");
        }
    }
}

/// Enemy structures join the player's targets once a friendly actor enters
/// their detection sensor.
/// Runs in `GameSet::Triggers`.
fn target_detected_structures(
    mut targets: ResMut<PlayerTargets>,
    structures: Query<(Entity, &Name, &Team, &Health, &CollidingEntities), With<Structure>>,
    intruders: Query<(&Team, &Health), With<Actor>>,
) {
    for (entity, name, team, health, colliding) in &structures {
        if *team != Team::Enemy || health.is_dead() || targets.entities().contains(&entity) {
            continue;
        }
        let detected = colliding.iter().any(|other| {
            intruders.get(*other).is_ok_and(|(other_team, other_health)| {
                *other_team == Team::Friendly && !other_health.is_dead()
            })
        });
        if detected && targets.add(entity) {
            debug!("`{name}` is now a player target");
        }
    }
}

/// Destruction fallout: releases held batch members, reports the loss, drops
/// the bounty, and ends the game when a main city falls.
/// Runs in `GameSet::Death`, after `DeathCheck`.
fn on_structure_died(
    mut died: MessageReader<Died>,
    mut structures: Query<(
        &Structure,
        &Team,
        &Transform,
        Option<&Bounty>,
        Option<&mut Spawner>,
        Option<&mut PendingShots>,
    )>,
    mut members: Query<(&mut Readiness, Option<&Pooled>)>,
    mut destroyed: MessageWriter<StructureDestroyed>,
    mut loot: MessageWriter<DropLoot>,
    mut game_over: MessageWriter<GameOver>,
) {
    for death in died.read() {
        let Ok((structure, team, transform, bounty, spawner, pending)) =
            structures.get_mut(death.entity)
        else {
            continue;
        };

        if let Some(mut spawner) = spawner {
            for member in spawner.release_all() {
                if let Ok((mut readiness, pooled)) = members.get_mut(member.entity) {
                    if member.is_current(pooled) {
                        readiness.release();
                    }
                }
            }
        }
        if let Some(mut pending) = pending {
            pending.0.clear();
        }

        destroyed.write(StructureDestroyed {
            structure: death.entity,
            team: *team,
            level: structure.level,
        });
        if let Some(&Bounty(amount)) = bounty {
            if amount > 0 {
                loot.write(DropLoot {
                    at: transform.translation,
                    amount,
                });
            }
        }
        info!("{team:?} {:?} destroyed", structure.kind);

        if structure.kind == StructureKind::MainCity {
            let victory = *team == Team::Enemy;
            game_over.write(GameOver { victory });
        }
    }
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Structure>()
        .register_type::<Bounty>()
        .register_type::<Spawner>()
        .register_type::<Volley>()
        .register_type::<PendingShots>();
    app.add_systems(
        Update,
        (
            target_detected_structures.in_set(GameSet::Triggers),
            detect_breaches.in_set(GameSet::Combat),
            on_structure_died.in_set(GameSet::Death).after(DeathCheck),
        )
            .run_if(gameplay_running),
    );
    app.add_plugins((production::plugin, volley::plugin));
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::scenario::{GroundPoint, SpawnerSpec};
    use crate::testing::{advance_secs, collect_messages, collide, create_gameplay_test_app};
    use pretty_assertions::assert_eq;

    fn create_structure_test_app() -> App {
        let mut app = create_gameplay_test_app();
        app.add_systems(
            Update,
            (target_detected_structures, detect_breaches, on_structure_died).chain(),
        );
        app
    }

    fn spawn_held_member(app: &mut App) -> InstanceRef {
        let entity = app
            .world_mut()
            .spawn(Readiness {
                ready: false,
                held: true,
            })
            .id();
        InstanceRef::fixed(entity)
    }

    fn staged_spawner() -> Spawner {
        Spawner::from_spec(
            &SpawnerSpec {
                kinds: vec![ActorKind::Grunt],
                batch_size: 3,
                intra_batch_delay: 0.3,
                batch_interval: 5.0,
                policy: SpawnPolicy::Staged,
                path_start: 0,
                idle_points: vec![GroundPoint(0.0, 1.0)],
                origin: None,
            },
            Vec3::ZERO,
            &[],
            0.1,
        )
    }

    #[test]
    fn destroyed_tower_releases_held_batch() {
        let mut app = create_structure_test_app();
        let members: Vec<InstanceRef> = (0..3).map(|_| spawn_held_member(&mut app)).collect();
        let mut spawner = staged_spawner();
        spawner.batch = members.clone();
        spawner.state = SpawnerState::Holding;
        let tower = app
            .world_mut()
            .spawn((
                Structure::tower(2),
                Team::Enemy,
                Transform::from_xyz(0.0, 10.0, 0.0),
                Bounty(20),
                spawner,
            ))
            .id();

        app.world_mut().write_message(Died {
            entity: tower,
            team: Team::Enemy,
        });
        advance_secs(&mut app, 0.1);

        for member in &members {
            let readiness = app.world().get::<Readiness>(member.entity).unwrap();
            assert!(readiness.ready);
            assert!(!readiness.held);
        }
        let spawner = app.world().get::<Spawner>(tower).unwrap();
        assert!(spawner.batch.is_empty());
        assert_eq!(spawner.state, SpawnerState::Dormant);
        assert_eq!(
            collect_messages::<StructureDestroyed>(&app),
            vec![StructureDestroyed {
                structure: tower,
                team: Team::Enemy,
                level: 2
            }]
        );
        assert_eq!(
            collect_messages::<DropLoot>(&app),
            vec![DropLoot {
                at: Vec3::new(0.0, 10.0, 0.0),
                amount: 20
            }]
        );
        assert!(collect_messages::<GameOver>(&app).is_empty());
    }

    #[test]
    fn main_city_fall_decides_the_game() {
        let mut app = create_structure_test_app();
        let enemy_city = app
            .world_mut()
            .spawn((Structure::main_city(), Team::Enemy, Transform::default()))
            .id();
        app.world_mut().write_message(Died {
            entity: enemy_city,
            team: Team::Enemy,
        });
        advance_secs(&mut app, 0.1);

        assert_eq!(
            collect_messages::<GameOver>(&app),
            vec![GameOver { victory: true }]
        );
    }

    fn spawn_grunt(app: &mut App, team: Team) -> Entity {
        let stats = *SimConfig::default().actors.get(ActorKind::Grunt);
        app.world_mut()
            .spawn((
                Actor {
                    kind: ActorKind::Grunt,
                    group_index: 0,
                },
                team,
                ActorStats(stats),
                Health::new(stats.hp),
            ))
            .id()
    }

    #[test]
    fn enemy_tower_becomes_player_target_when_detecting_friendlies() {
        let mut app = create_structure_test_app();
        let spawn_tower = |app: &mut App, name: &str, team: Team| {
            app.world_mut()
                .spawn((
                    Name::new(name.to_owned()),
                    Structure::tower(1),
                    team,
                    Health::new(300.0),
                    Transform::default(),
                ))
                .id()
        };
        let archery = spawn_tower(&mut app, "Archery", Team::Enemy);
        let quiet = spawn_tower(&mut app, "Quiet", Team::Enemy);
        let barracks = spawn_tower(&mut app, "Barracks", Team::Friendly);
        let knight = spawn_grunt(&mut app, Team::Friendly);
        let grunt = spawn_grunt(&mut app, Team::Enemy);
        collide(&mut app, archery, &[knight]);
        collide(&mut app, quiet, &[grunt]);
        collide(&mut app, barracks, &[grunt]);

        advance_secs(&mut app, 0.1);
        advance_secs(&mut app, 0.1);
        assert_eq!(app.world().resource::<PlayerTargets>().entities(), &[archery]);
    }

    #[test]
    fn enemy_touching_friendly_city_breaches_once() {
        let mut app = create_structure_test_app();
        let city = app
            .world_mut()
            .spawn((
                Structure::main_city(),
                Team::Friendly,
                Health::new(100.0),
                Transform::default(),
            ))
            .id();
        let stats = *SimConfig::default().actors.get(ActorKind::Grunt);
        let grunt = app
            .world_mut()
            .spawn((
                Actor {
                    kind: ActorKind::Grunt,
                    group_index: 0,
                },
                Team::Enemy,
                ActorStats(stats),
                Health::new(stats.hp),
            ))
            .id();
        collide(&mut app, city, &[grunt]);

        advance_secs(&mut app, 0.1);
        assert_eq!(
            collect_messages::<EnemyBreachedDefense>(&app),
            vec![EnemyBreachedDefense { enemy: grunt, city }]
        );
        assert_eq!(
            collect_messages::<DamageRequest>(&app),
            vec![
                DamageRequest {
                    target: InstanceRef::fixed(city),
                    amount: 10.0
                },
                DamageRequest {
                    target: InstanceRef::fixed(grunt),
                    amount: 999.0
                },
            ]
        );

        advance_secs(&mut app, 0.1);
        advance_secs(&mut app, 0.1);
        assert!(collect_messages::<EnemyBreachedDefense>(&app).is_empty());
    }
}
