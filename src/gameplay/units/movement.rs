//! Staging, lane following with tower deflection, and stand positions.

use bevy::prelude::*;

use super::{Actor, ActorPhase, ActorStats, Engagement, Locomotion, Readiness, Side};
use crate::config::{MovementConfig, SimConfig};
use crate::gameplay::animation::{Animator, Clip};
use crate::gameplay::building::{Structure, StructureKind};
use crate::gameplay::combat::Health;
use crate::gameplay::{Team, heading_toward};
use crate::{GameSet, gameplay_running};

/// Move from `from` toward `to` by at most `max_step`.
///
/// Returns the new position and whether `to` counts as reached (closer than
/// `epsilon` after the step).
#[must_use]
pub fn step_toward(from: Vec3, to: Vec3, max_step: f32, epsilon: f32) -> (Vec3, bool) {
    let delta = to - from;
    let distance = delta.length();
    if distance < epsilon {
        return (from, true);
    }
    if distance <= max_step {
        return (to, true);
    }
    let next = from + delta / distance * max_step;
    (next, next.distance(to) < epsilon)
}

/// Waypoints hugging a tower are pushed sideways so the lane passes it.
///
/// Towers are `(position, side)` pairs. The last tower within `proximity`
/// (planar) of `waypoint` wins; the deflected point sits at
/// `tower.x + side * offset`, keeping the waypoint's other coordinates.
#[must_use]
pub fn deflect_waypoint(
    waypoint: Vec3,
    towers: impl IntoIterator<Item = (Vec3, Side)>,
    proximity: f32,
    offset: f32,
) -> Vec3 {
    towers
        .into_iter()
        .filter(|(tower, _)| tower.truncate().distance(waypoint.truncate()) <= proximity)
        .last()
        .map_or(waypoint, |(tower, side)| {
            Vec3::new(tower.x + side.sign() * offset, waypoint.y, waypoint.z)
        })
}

/// Stand position around a besieged structure.
///
/// Group members fan out in `fan_step_degrees` increments on a circle of
/// radius `range / 2`, wrapping after `fan_slots` positions.
#[must_use]
pub fn fan_station(structure: Vec3, group_index: usize, range: f32, movement: &MovementConfig) -> Vec3 {
    let slot = group_index % movement.fan_slots.max(1);
    #[allow(clippy::cast_precision_loss)]
    let theta = (slot as f32 * movement.fan_step_degrees).to_radians();
    structure + Vec3::new(theta.cos(), theta.sin(), 0.0) * (range * 0.5)
}

/// Drives every living actor one step: staging, engaging stand position, lane
/// following, or idling at the end of the lane.
/// Runs in `GameSet::Movement`.
fn advance_actors(
    time: Res<Time>,
    config: Res<SimConfig>,
    mut actors: Query<
        (
            &Team,
            &ActorStats,
            &Health,
            &Engagement,
            &mut Locomotion,
            &mut Readiness,
            &mut ActorPhase,
            &mut Transform,
            Option<&mut Animator>,
        ),
        (With<Actor>, Without<Structure>),
    >,
    structures: Query<(&Structure, &Team, &Transform, &Health), Without<Actor>>,
) {
    let dt = time.delta_secs();
    let movement = &config.movement;
    let towers: Vec<(Team, Vec3, Side)> = structures
        .iter()
        .filter(|(structure, _, _, health)| {
            structure.kind == StructureKind::Tower && !health.is_dead()
        })
        .map(|(structure, team, transform, _)| (*team, transform.translation, structure.side))
        .collect();

    for (
        team,
        stats,
        health,
        engagement,
        mut locomotion,
        mut readiness,
        mut phase,
        mut transform,
        animator,
    ) in &mut actors
    {
        if health.is_dead() {
            continue;
        }
        let position = transform.translation;
        let max_step = stats.speed * dt;

        let (next_phase, goal) = if !readiness.ready {
            (ActorPhase::Staging, Some(locomotion.idle_point))
        } else if let Some(station) = engagement.station {
            (ActorPhase::Engaging, Some(station))
        } else if engagement.target.is_some() {
            (ActorPhase::Engaging, None)
        } else if let Some(waypoint) = locomotion.current_waypoint() {
            // Friendly lanes only bend around friendly towers.
            let passable = towers.iter().filter(|(owner, _, _)| {
                *team == Team::Enemy || *owner == Team::Friendly
            });
            let goal = deflect_waypoint(
                waypoint,
                passable.map(|&(_, tower, side)| (tower, side)),
                movement.deflect_proximity,
                movement.deflect_offset,
            );
            (ActorPhase::PathFollowing, Some(goal))
        } else {
            (ActorPhase::Idling, None)
        };
        locomotion.move_target = goal;

        let mut moving = false;
        if let Some(goal) = goal {
            let (next, arrived) = step_toward(position, goal, max_step, movement.arrival_epsilon);
            if next != position {
                moving = true;
                if let Some(rotation) = heading_toward(position, next) {
                    transform.rotation = rotation;
                }
                transform.translation = next;
            }
            if arrived {
                match next_phase {
                    ActorPhase::Staging if !readiness.held => readiness.ready = true,
                    ActorPhase::PathFollowing => locomotion.path_index += 1,
                    _ => {}
                }
            }
        }

        // Stationed or staged: face the target, else the team's default heading.
        if !moving {
            let facing = match next_phase {
                ActorPhase::Engaging => heading_toward(transform.translation, engagement.aim),
                _ => Some(Quat::from_rotation_z(team.default_heading())),
            };
            if let Some(rotation) = facing {
                transform.rotation = rotation;
            }
        }

        *phase = next_phase;
        if let Some(mut animator) = animator {
            match (next_phase, moving) {
                (_, true) => animator.play(Clip::Run),
                (ActorPhase::Engaging, false) => animator.play(Clip::Attack),
                _ => animator.play(Clip::Idle),
            }
        }
    }
}

pub(super) fn plugin(app: &mut App) {
    app.add_systems(
        Update,
        advance_actors
            .in_set(GameSet::Movement)
            .run_if(gameplay_running),
    );
}
