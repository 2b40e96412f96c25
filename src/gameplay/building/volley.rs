//! Stationary ranged attacks for towers and cities.

use bevy::prelude::*;

use crate::config::SimConfig;
use crate::gameplay::Team;
use crate::gameplay::ai::{DistanceMode, Roster, rank_in_range};
use crate::gameplay::combat::Health;
use crate::gameplay::combat::projectile::{Launch, ProjectileKind, Splash, launch_projectile};
use crate::gameplay::pool::{InstanceRef, ObjectPool, Pooled};
use crate::gameplay::units::{ActorKind, Readiness};
use crate::scenario::VolleySpec;
use crate::{GameSet, UP, gameplay_running};

/// Repeating multi-muzzle attack.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Volley {
    pub timer: Timer,
    pub range: f32,
    pub damage: f32,
    pub muzzles: usize,
    /// Shield units are targeted before anything closer.
    pub prefer_shielded: bool,
    pub projectile: ProjectileKind,
    pub flight_secs: f32,
    pub splash: Option<Splash>,
}

impl Volley {
    #[must_use]
    pub fn from_spec(spec: &VolleySpec) -> Self {
        Self {
            timer: Timer::from_seconds(spec.interval, TimerMode::Repeating),
            range: spec.range,
            damage: spec.damage,
            muzzles: spec.muzzles,
            prefer_shielded: spec.prefer_shielded,
            projectile: spec.projectile,
            flight_secs: spec.flight_secs,
            splash: spec.splash,
        }
    }
}

/// One muzzle waiting for its turn.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct PendingShot {
    pub delay: f32,
    pub target: InstanceRef,
}

/// Shots of the current volley not fired yet. Cleared when the owner dies
/// or the game ends.
#[derive(Component, Debug, Clone, Default, Reflect)]
#[reflect(Component)]
pub struct PendingShots(pub Vec<PendingShot>);

/// Moves shielded candidates ahead of the rest, keeping distance order
/// within each group.
#[must_use]
pub fn shielded_first(ranked: Vec<(Entity, f32)>, is_shielded: impl Fn(Entity) -> bool) -> Vec<(Entity, f32)> {
    let (mut shielded, rest): (Vec<_>, Vec<_>) =
        ranked.into_iter().partition(|(entity, _)| is_shielded(*entity));
    shielded.extend(rest);
    shielded
}

/// Target of each muzzle: muzzle `i` takes `ranked[i % ranked.len()]`.
#[must_use]
pub fn assign_muzzles<T: Copy>(ranked: &[T], muzzles: usize) -> Vec<T> {
    if ranked.is_empty() {
        return Vec::new();
    }
    (0..muzzles).map(|muzzle| ranked[muzzle % ranked.len()]).collect()
}

/// Schedules a volley whenever a structure's timer fires and launches every
/// muzzle whose stagger has elapsed. Targets are ready opposing actors in
/// planar range.
/// Runs in `GameSet::Combat`.
fn fire_volleys(
    time: Res<Time>,
    config: Res<SimConfig>,
    roster: Res<Roster>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut structures: Query<(&Team, &Transform, &Health, &mut Volley, &mut PendingShots)>,
    targets: Query<(
        &Transform,
        &Health,
        Option<&Readiness>,
        Option<&Pooled>,
        Option<&ActorKind>,
    )>,
) {
    let dt = time.delta_secs();
    let stagger = config.combat.muzzle_stagger;

    for (team, transform, health, mut volley, mut pending) in &mut structures {
        if health.is_dead() {
            pending.0.clear();
            continue;
        }
        for shot in &mut pending.0 {
            shot.delay -= dt;
        }

        volley.timer.tick(time.delta());
        if volley.timer.just_finished() {
            let origin = transform.translation;
            let candidates = roster.actors(team.opposing()).iter().filter_map(|&entity| {
                let (target, health, readiness, _, _) = targets.get(entity).ok()?;
                (health.can_be_damaged() && readiness.is_some_and(|readiness| readiness.ready))
                    .then_some((entity, target.translation))
            });
            let mut ranked = rank_in_range(candidates, origin, volley.range, DistanceMode::Planar);
            if volley.prefer_shielded {
                ranked = shielded_first(ranked, |entity| {
                    targets
                        .get(entity)
                        .is_ok_and(|(_, _, _, _, kind)| kind.is_some_and(|kind| kind.is_shielded()))
                });
            }
            let picks: Vec<Entity> = ranked.iter().map(|(entity, _)| *entity).collect();
            #[allow(clippy::cast_precision_loss)]
            pending.0.extend(
                assign_muzzles(&picks, volley.muzzles)
                    .into_iter()
                    .enumerate()
                    .filter_map(|(muzzle, entity)| {
                        let (_, _, _, pooled, _) = targets.get(entity).ok()?;
                        Some(PendingShot {
                            delay: muzzle as f32 * stagger,
                            target: InstanceRef::of(entity, pooled),
                        })
                    }),
            );
        }

        let muzzle = transform.translation + UP * config.combat.muzzle_height;
        let (due, waiting): (Vec<_>, Vec<_>) =
            pending.0.drain(..).partition(|shot| shot.delay <= 1e-4);
        pending.0 = waiting;
        for shot in due {
            // The target may have died or been recycled while the muzzle waited.
            let Ok((target, target_health, _, pooled, _)) = targets.get(shot.target.entity) else {
                continue;
            };
            if !target_health.can_be_damaged() || !shot.target.is_current(pooled) {
                continue;
            }
            launch_projectile(
                &mut commands,
                &mut pool,
                Launch {
                    kind: volley.projectile,
                    team: *team,
                    origin: muzzle,
                    target: shot.target,
                    aim: target.translation,
                    damage: volley.damage,
                    duration: volley.flight_secs,
                    splash: volley.splash,
                },
            );
        }
    }
}

pub(super) fn plugin(app: &mut App) {
    app.add_systems(
        Update,
        fire_volleys.in_set(GameSet::Combat).run_if(gameplay_running),
    );
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::gameplay::ai::Role;
    use crate::gameplay::combat::projectile::Projectile;
    use crate::testing::{advance_frames, advance_secs, create_gameplay_test_app, with_pool};
    use pretty_assertions::assert_eq;

    fn create_volley_test_app() -> App {
        let mut app = create_gameplay_test_app();
        app.add_systems(Update, fire_volleys);
        with_pool(&mut app, |pool, commands| {
            let kind = ProjectileKind::TowerBullet;
            pool.init(commands, kind.pool_key(), kind.template(), 8);
        });
        app
    }

    fn spawn_tower(app: &mut App, muzzles: usize, prefer_shielded: bool) -> Entity {
        let spec = VolleySpec {
            range: 10.0,
            interval: 1.0,
            damage: 5.0,
            muzzles,
            prefer_shielded,
            ..VolleySpec::default()
        };
        app.world_mut()
            .spawn((
                Team::Enemy,
                Transform::default(),
                Health::new(100.0),
                Volley::from_spec(&spec),
                PendingShots::default(),
            ))
            .id()
    }

    fn spawn_target(app: &mut App, kind: ActorKind, x: f32, ready: bool) -> Entity {
        let entity = app
            .world_mut()
            .spawn((
                kind,
                Team::Friendly,
                Transform::from_xyz(x, 0.0, 0.0),
                Health::new(20.0),
                Readiness { ready, held: false },
            ))
            .id();
        let mut roster = app.world_mut().resource_mut::<Roster>();
        roster.enlist(entity, Team::Friendly, Role::Actor);
        roster.apply_pending();
        entity
    }

    fn projectile_targets(app: &mut App) -> Vec<Entity> {
        app.world_mut()
            .query::<&Projectile>()
            .iter(app.world())
            .map(|projectile| projectile.target.entity)
            .collect()
    }

    #[test]
    fn muzzles_fire_staggered_at_ranked_targets() {
        let mut app = create_volley_test_app();
        spawn_tower(&mut app, 3, false);
        let near = spawn_target(&mut app, ActorKind::Sword, 2.0, true);
        let far = spawn_target(&mut app, ActorKind::Axe, 6.0, true);

        advance_frames(&mut app, 3, 0.25);
        assert!(projectile_targets(&mut app).is_empty());

        advance_secs(&mut app, 0.25);
        assert_eq!(projectile_targets(&mut app), vec![near]);

        advance_secs(&mut app, 0.25);
        let targets = projectile_targets(&mut app);
        assert_eq!(targets.len(), 3);
        assert_eq!(targets.iter().filter(|&&target| target == near).count(), 2);
        assert_eq!(targets.iter().filter(|&&target| target == far).count(), 1);
    }

    #[test]
    fn staged_and_distant_actors_are_ignored() {
        let mut app = create_volley_test_app();
        spawn_tower(&mut app, 1, false);
        spawn_target(&mut app, ActorKind::Sword, 2.0, false);
        spawn_target(&mut app, ActorKind::Sword, 30.0, true);

        advance_frames(&mut app, 5, 0.25);
        assert!(projectile_targets(&mut app).is_empty());
    }

    #[test]
    fn shield_units_are_preferred_when_configured() {
        let mut app = create_volley_test_app();
        spawn_tower(&mut app, 1, true);
        spawn_target(&mut app, ActorKind::Sword, 2.0, true);
        let shield = spawn_target(&mut app, ActorKind::Shield, 8.0, true);

        advance_frames(&mut app, 4, 0.25);
        assert_eq!(projectile_targets(&mut app), vec![shield]);
    }

    #[test]
    fn dead_tower_drops_pending_shots() {
        let mut app = create_volley_test_app();
        let tower = spawn_tower(&mut app, 3, false);
        spawn_target(&mut app, ActorKind::Sword, 2.0, true);

        advance_frames(&mut app, 4, 0.25);
        assert_eq!(app.world().get::<PendingShots>(tower).unwrap().0.len(), 2);

        app.world_mut().get_mut::<Health>(tower).unwrap().apply_damage(1000.0);
        advance_secs(&mut app, 0.25);
        assert!(app.world().get::<PendingShots>(tower).unwrap().0.is_empty());
        assert_eq!(projectile_targets(&mut app).len(), 1);
    }
}
