//! Target acquisition and attacks for actors, plus contact trades.

use avian2d::prelude::CollidingEntities;
use bevy::prelude::*;

use super::{
    Actor, ActorPhase, ActorStats, AttackCycle, Behavior, BoundTo, Engagement, Readiness,
    fan_station,
};
use crate::config::SimConfig;
use crate::gameplay::Team;
use crate::gameplay::ai::{DistanceMode, Role, Roster, find_nearest_opposing};
use crate::gameplay::combat::Health;
use crate::gameplay::combat::death::DeathCheck;
use crate::gameplay::combat::projectile::{Launch, ProjectileKind, launch_projectile};
use crate::gameplay::events::{DamageRequest, Died, DropLoot, StructureDestroyed};
use crate::gameplay::player::PlayerTargets;
use crate::gameplay::pool::{InstanceRef, ObjectPool, Pooled};
use crate::{GameSet, UP, gameplay_running};

/// Picks targets for friendly actors (nearest enemy structure, spatial) and
/// archers (nearest ready friendly actor, planar). Keeps a target while it
/// stays valid and in range.
/// Runs in `GameSet::Ai`.
fn acquire_targets(
    config: Res<SimConfig>,
    roster: Res<Roster>,
    mut actors: Query<(
        &Actor,
        &Team,
        &ActorStats,
        &Readiness,
        &Health,
        &Transform,
        &mut Engagement,
    )>,
    candidates: Query<(&Transform, &Health, Option<&Readiness>, Option<&Pooled>)>,
) {
    let valid = |entity: Entity, needs_ready: bool| {
        candidates
            .get(entity)
            .ok()
            .filter(|(_, health, readiness, _)| {
                health.can_be_damaged()
                    && (!needs_ready || readiness.is_some_and(|readiness| readiness.ready))
            })
            .map(|(transform, _, _, pooled)| (transform.translation, pooled))
    };

    for (actor, team, stats, readiness, health, transform, mut engagement) in &mut actors {
        if health.is_dead() || !readiness.ready {
            continue;
        }
        let origin = transform.translation;
        let behavior = actor.kind.behavior();
        let (role, mode, needs_ready) = match behavior {
            Behavior::FriendlyMelee | Behavior::FriendlyRanged => {
                (Role::Structure, DistanceMode::Spatial, false)
            }
            Behavior::EnemyRanged => (Role::Actor, DistanceMode::Planar, true),
            Behavior::EnemyMelee => continue,
        };

        // Keep the current target while it lives and stays in range.
        if let Some(current) = engagement.target {
            let kept = valid(current.entity, needs_ready).filter(|(position, pooled)| {
                current.is_current(*pooled) && mode.distance(origin, *position) <= stats.range
            });
            if let Some((position, _)) = kept {
                engagement.aim = position;
                continue;
            }
            engagement.clear();
        }

        let found = find_nearest_opposing(&roster, *team, role, origin, stats.range, mode, |entity| {
            valid(entity, needs_ready).map(|(position, _)| position)
        });
        let Some(target) = found else {
            continue;
        };
        let Some((position, pooled)) = valid(target, needs_ready) else {
            continue;
        };
        engagement.target = Some(InstanceRef::of(target, pooled));
        engagement.aim = position;
        engagement.station = match behavior {
            Behavior::FriendlyMelee | Behavior::FriendlyRanged => Some(fan_station(
                position,
                actor.group_index,
                stats.range,
                &config.movement,
            )),
            Behavior::EnemyMelee | Behavior::EnemyRanged => None,
        };
        debug!("{:?} engages {target}", actor.kind);
    }
}

/// Runs attack cycles for engaged actors: melee hits land as damage requests,
/// ranged hits launch arrows.
/// Runs in `GameSet::Combat`.
fn run_engagements(
    time: Res<Time>,
    config: Res<SimConfig>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut actors: Query<(
        &Actor,
        &Team,
        &ActorStats,
        &Health,
        &Transform,
        &mut Engagement,
        &mut AttackCycle,
    )>,
    targets: Query<(&Health, Option<&Pooled>)>,
    mut damage: MessageWriter<DamageRequest>,
) {
    let dt = time.delta_secs();
    let epsilon = config.movement.arrival_epsilon;
    for (actor, team, stats, health, transform, mut engagement, mut cycle) in &mut actors {
        if health.is_dead() {
            continue;
        }
        let Some(target) = engagement.target else {
            cycle.reset();
            continue;
        };
        let alive = targets
            .get(target.entity)
            .is_ok_and(|(health, pooled)| health.can_be_damaged() && target.is_current(pooled));
        if !alive {
            engagement.clear();
            cycle.reset();
            continue;
        }
        let stationed = engagement
            .station
            .is_none_or(|station| transform.translation.distance(station) < epsilon);
        if !stationed {
            continue;
        }
        if !cycle.advance(dt) {
            continue;
        }

        if actor.kind.behavior().is_ranged() {
            let origin = transform.translation + UP * config.combat.muzzle_height;
            launch_projectile(
                &mut commands,
                &mut pool,
                Launch {
                    kind: ProjectileKind::Arrow,
                    team: *team,
                    origin,
                    target,
                    aim: engagement.aim,
                    damage: stats.attack,
                    duration: config.combat.arrow_flight_secs,
                    splash: None,
                },
            );
        } else {
            damage.write(DamageRequest {
                target,
                amount: stats.attack,
            });
        }
    }
}

/// A ready friendly actor touching a live enemy actor hits it and dies.
/// Runs in `GameSet::Combat`.
fn resolve_clashes(
    config: Res<SimConfig>,
    friendlies: Query<
        (
            Entity,
            &Team,
            &ActorStats,
            &Readiness,
            &Health,
            Option<&Pooled>,
            &CollidingEntities,
        ),
        With<Actor>,
    >,
    others: Query<(&Team, &Health, Option<&Pooled>), With<Actor>>,
    mut damage: MessageWriter<DamageRequest>,
) {
    for (entity, team, stats, readiness, health, pooled, colliding) in &friendlies {
        if *team != Team::Friendly || !readiness.ready || health.is_dead() {
            continue;
        }
        let victim = colliding.iter().copied().find(|other| {
            others.get(*other).is_ok_and(|(other_team, other_health, _)| {
                *other_team == Team::Enemy && other_health.can_be_damaged()
            })
        });
        let Some(victim) = victim else {
            continue;
        };
        let victim_pooled = others.get(victim).ok().and_then(|(_, _, pooled)| pooled);
        damage.write(DamageRequest {
            target: InstanceRef::of(victim, victim_pooled),
            amount: stats.attack,
        });
        damage.write(DamageRequest {
            target: InstanceRef::of(entity, pooled),
            amount: config.combat.lethal_damage,
        });
    }
}

/// Ready enemy melee actors become targets for the player.
/// Runs in `GameSet::Ai`.
fn register_player_targets(
    mut targets: ResMut<PlayerTargets>,
    actors: Query<(Entity, &Actor, &Readiness, &Health)>,
) {
    for (entity, actor, readiness, health) in &actors {
        if actor.kind.behavior() == Behavior::EnemyMelee && readiness.ready && !health.is_dead() {
            targets.add(entity);
        }
    }
}

/// Actors bound to a destroyed structure die with it.
/// Runs in `GameSet::Triggers`.
fn kill_bound_actors(
    config: Res<SimConfig>,
    mut destroyed: MessageReader<StructureDestroyed>,
    bound: Query<(Entity, &BoundTo, &Health, Option<&Pooled>)>,
    mut damage: MessageWriter<DamageRequest>,
) {
    for destruction in destroyed.read() {
        for (entity, bound_to, health, pooled) in &bound {
            if bound_to.0 == destruction.structure && !health.is_dead() {
                damage.write(DamageRequest {
                    target: InstanceRef::of(entity, pooled),
                    amount: config.combat.lethal_damage,
                });
            }
        }
    }
}

/// Dead actors stop fighting; enemies drop gold and leave the player's list.
/// Runs in `GameSet::Death`, after `DeathCheck`.
fn on_actor_died(
    config: Res<SimConfig>,
    mut died: MessageReader<Died>,
    mut player_targets: ResMut<PlayerTargets>,
    mut actors: Query<(&Transform, &mut ActorPhase, &mut Engagement), With<Actor>>,
    mut loot: MessageWriter<DropLoot>,
) {
    for death in died.read() {
        let Ok((transform, mut phase, mut engagement)) = actors.get_mut(death.entity) else {
            continue;
        };
        *phase = ActorPhase::Dying;
        engagement.clear();
        if death.team == Team::Enemy {
            player_targets.remove(death.entity);
            if config.combat.enemy_reward > 0 {
                loot.write(DropLoot {
                    at: transform.translation,
                    amount: config.combat.enemy_reward,
                });
            }
        }
    }
}

pub(super) fn plugin(app: &mut App) {
    app.add_systems(
        Update,
        (
            kill_bound_actors.in_set(GameSet::Triggers),
            (register_player_targets, acquire_targets).in_set(GameSet::Ai),
            (run_engagements, resolve_clashes).in_set(GameSet::Combat),
            on_actor_died.in_set(GameSet::Death).after(DeathCheck),
        )
            .run_if(gameplay_running),
    );
}
