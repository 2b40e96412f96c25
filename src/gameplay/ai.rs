//! Roster of live combatants and the shared nearest-in-range search.
//!
//! Every attacker (player, towers, cities, actors) picks targets through
//! [`find_nearest`] or [`rank_in_range`], so tie-breaking and distance
//! semantics are the same everywhere: the strictly closer candidate wins, and
//! on equal distance the one listed first in the roster wins.

use bevy::prelude::*;

use crate::gameplay::Team;
use crate::gameplay::events::Died;
use crate::{GameSet, gameplay_running};

// === Distance ===

/// How range is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum DistanceMode {
    /// Ground-plane distance, ignoring height.
    Planar,
    /// Full 3D distance.
    Spatial,
}

impl DistanceMode {
    #[must_use]
    pub fn distance(self, a: Vec3, b: Vec3) -> f32 {
        match self {
            Self::Planar => a.truncate().distance(b.truncate()),
            Self::Spatial => a.distance(b),
        }
    }
}

/// Nearest candidate within `range` (inclusive) of `origin`.
///
/// Candidates must already be filtered to valid, living entities.
#[must_use]
pub fn find_nearest(
    candidates: impl IntoIterator<Item = (Entity, Vec3)>,
    origin: Vec3,
    range: f32,
    mode: DistanceMode,
) -> Option<Entity> {
    let mut best: Option<(Entity, f32)> = None;
    for (entity, position) in candidates {
        let distance = mode.distance(origin, position);
        if distance > range {
            continue;
        }
        if best.is_none_or(|(_, closest)| distance < closest) {
            best = Some((entity, distance));
        }
    }
    best.map(|(entity, _)| entity)
}

/// All candidates within `range`, nearest first, ties kept in list order.
#[must_use]
pub fn rank_in_range(
    candidates: impl IntoIterator<Item = (Entity, Vec3)>,
    origin: Vec3,
    range: f32,
    mode: DistanceMode,
) -> Vec<(Entity, f32)> {
    let mut ranked: Vec<(Entity, f32)> = candidates
        .into_iter()
        .map(|(entity, position)| (entity, mode.distance(origin, position)))
        .filter(|(_, distance)| *distance <= range)
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
}

// === Roster ===

/// What a roster entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum Role {
    Actor,
    Structure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RosterChange {
    Enlist { entity: Entity, team: Team, role: Role },
    Discharge(Entity),
}

/// Live combatants per team, in enlistment order.
///
/// Enlist and discharge calls are queued and applied in `GameSet::Cleanup`,
/// so all queries within a tick see the roster as it was when the tick began.
#[derive(Resource, Debug, Default)]
pub struct Roster {
    friendly_actors: Vec<Entity>,
    enemy_actors: Vec<Entity>,
    friendly_structures: Vec<Entity>,
    enemy_structures: Vec<Entity>,
    pending: Vec<RosterChange>,
}

impl Roster {
    /// Queue `entity` for enlistment at the end of the tick.
    pub fn enlist(&mut self, entity: Entity, team: Team, role: Role) {
        self.pending.push(RosterChange::Enlist { entity, team, role });
    }

    /// Queue `entity` for removal at the end of the tick.
    pub fn discharge(&mut self, entity: Entity) {
        self.pending.push(RosterChange::Discharge(entity));
    }

    /// Apply queued changes in call order. Returns how many changed the roster.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        for change in std::mem::take(&mut self.pending) {
            match change {
                RosterChange::Enlist { entity, team, role } => {
                    let list = self.list_mut(team, role);
                    if !list.contains(&entity) {
                        list.push(entity);
                        applied += 1;
                    }
                }
                RosterChange::Discharge(entity) => {
                    let before = self.len();
                    for list in [
                        &mut self.friendly_actors,
                        &mut self.enemy_actors,
                        &mut self.friendly_structures,
                        &mut self.enemy_structures,
                    ] {
                        list.retain(|&listed| listed != entity);
                    }
                    applied += before - self.len();
                }
            }
        }
        applied
    }

    #[must_use]
    pub fn actors(&self, team: Team) -> &[Entity] {
        match team {
            Team::Friendly => &self.friendly_actors,
            Team::Enemy => &self.enemy_actors,
        }
    }

    #[must_use]
    pub fn structures(&self, team: Team) -> &[Entity] {
        match team {
            Team::Friendly => &self.friendly_structures,
            Team::Enemy => &self.enemy_structures,
        }
    }

    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        [
            &self.friendly_actors,
            &self.enemy_actors,
            &self.friendly_structures,
            &self.enemy_structures,
        ]
        .iter()
        .any(|list| list.contains(&entity))
    }

    /// Total enlisted entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.friendly_actors.len()
            + self.enemy_actors.len()
            + self.friendly_structures.len()
            + self.enemy_structures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn list_mut(&mut self, team: Team, role: Role) -> &mut Vec<Entity> {
        match (team, role) {
            (Team::Friendly, Role::Actor) => &mut self.friendly_actors,
            (Team::Enemy, Role::Actor) => &mut self.enemy_actors,
            (Team::Friendly, Role::Structure) => &mut self.friendly_structures,
            (Team::Enemy, Role::Structure) => &mut self.enemy_structures,
        }
    }
}

/// Nearest opposing roster entry of `role` within range of `origin`.
///
/// `probe` returns the position of a candidate that is still a valid target
/// (alive, ready, whatever the caller requires) and `None` otherwise.
#[must_use]
pub fn find_nearest_opposing(
    roster: &Roster,
    team: Team,
    role: Role,
    origin: Vec3,
    range: f32,
    mode: DistanceMode,
    probe: impl Fn(Entity) -> Option<Vec3>,
) -> Option<Entity> {
    let opposing = match role {
        Role::Actor => roster.actors(team.opposing()),
        Role::Structure => roster.structures(team.opposing()),
    };
    find_nearest(
        opposing
            .iter()
            .filter_map(|&entity| probe(entity).map(|position| (entity, position))),
        origin,
        range,
        mode,
    )
}

// === Systems ===

/// Discharges the dead and applies all queued roster changes.
/// Runs in `GameSet::Cleanup`.
fn sync_roster(mut roster: ResMut<Roster>, mut died: MessageReader<Died>) {
    for death in died.read() {
        roster.discharge(death.entity);
    }
    let changed = roster.apply_pending();
    if changed > 0 {
        debug!("roster updated: {changed} changes, {} entries", roster.len());
    }
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<Roster>();
    app.add_systems(
        Update,
        sync_roster
            .in_set(GameSet::Cleanup)
            .run_if(gameplay_running),
    );
}
