//! Batched actor production and staged readiness release.
//!
//! A spawner runs one clock through a fixed cycle: spawn a batch staggered by
//! `intra_batch_delay`, optionally hold it, release it with the same stagger,
//! then cool down for `batch_interval` before the next batch.

use avian2d::prelude::CollidingEntities;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::Structure;
use crate::config::SimConfig;
use crate::gameplay::Team;
use crate::gameplay::ai::Roster;
use crate::gameplay::combat::Health;
use crate::gameplay::events::{GameStarted, Upgrade};
use crate::gameplay::pool::{InstanceRef, ObjectPool, Pooled};
use crate::gameplay::units::{Actor, ActorKind, ActorSpawn, Readiness, spawn_actor};
use crate::scenario::SpawnerSpec;
use crate::{GameSet, gameplay_running};

/// Absorbs float drift in accumulated clocks.
const CLOCK_EPSILON: f32 = 1e-4;

/// How a spawner starts and hands its batches over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum SpawnPolicy {
    /// Active from `GameStarted`; every batch is held, then released.
    #[default]
    Continuous,
    /// Dormant until detection; batches spawn ready.
    Immediate,
    /// Prestages a held batch on `GameStarted`, releases it on detection.
    Staged,
}

/// Position in the production cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub enum SpawnerState {
    #[default]
    Dormant,
    Spawning {
        clock: f32,
        spawned: usize,
    },
    /// Batch complete, waiting for activation.
    Holding,
    Settling {
        remaining: f32,
    },
    Releasing {
        clock: f32,
        released: usize,
    },
    Cooldown {
        remaining: f32,
    },
}

/// What the spawner wants done this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnerAction {
    /// Spawn batch member `index`.
    Spawn { index: usize },
    /// Release batch member `index`.
    Release { index: usize },
    /// Forget the finished batch.
    Retire,
}

/// Members of a batch due by `clock`: member `i` is due at `i * delay`.
#[must_use]
pub fn due_in_batch(clock: f32, delay: f32, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    if delay <= 0.0 {
        return batch_size;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let due = ((clock.max(0.0) + CLOCK_EPSILON) / delay).floor() as usize + 1;
    due.min(batch_size)
}

/// Batch production attached to a structure.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Spawner {
    /// Kinds cycled through by batch index.
    pub kinds: Vec<ActorKind>,
    pub batch_size: usize,
    pub intra_batch_delay: f32,
    pub batch_interval: f32,
    pub policy: SpawnPolicy,
    /// Lane from the configured start waypoint on.
    pub path: Vec<Vec3>,
    pub idle_points: Vec<Vec3>,
    pub origin: Vec3,
    /// Fraction of `batch_interval` a complete batch waits before release.
    pub settle_fraction: f32,
    pub state: SpawnerState,
    pub activated: bool,
    /// Members of the current batch, in spawn order.
    pub batch: Vec<InstanceRef>,
}

impl Spawner {
    #[must_use]
    pub fn from_spec(spec: &SpawnerSpec, position: Vec3, lane: &[Vec3], settle_fraction: f32) -> Self {
        let start = spec.path_start.min(lane.len());
        Self {
            kinds: spec.kinds.clone(),
            batch_size: spec.batch_size,
            intra_batch_delay: spec.intra_batch_delay,
            batch_interval: spec.batch_interval,
            policy: spec.policy,
            path: lane[start..].to_vec(),
            idle_points: spec.idle_points.iter().map(|point| point.to_vec3()).collect(),
            origin: spec.origin.map_or(position, |origin| origin.to_vec3()),
            settle_fraction,
            state: SpawnerState::Dormant,
            activated: false,
            batch: Vec::new(),
        }
    }

    /// Start production (or release the held batch). Returns `false` if
    /// already activated.
    pub fn activate(&mut self) -> bool {
        if self.activated {
            return false;
        }
        self.activated = true;
        match self.state {
            SpawnerState::Dormant => self.state = SpawnerState::Spawning { clock: 0.0, spawned: 0 },
            SpawnerState::Holding => self.state = self.settling(),
            _ => {}
        }
        true
    }

    /// Spawn a held batch ahead of activation.
    pub fn prestage(&mut self) {
        if self.policy == SpawnPolicy::Staged && self.state == SpawnerState::Dormant {
            self.state = SpawnerState::Spawning { clock: 0.0, spawned: 0 };
        }
    }

    /// Switch to a new cadence. Takes effect from the next delay computed.
    pub fn retime(&mut self, intra_batch_delay: f32, batch_interval: f32) {
        self.intra_batch_delay = intra_batch_delay;
        self.batch_interval = batch_interval;
    }

    /// Stop production and hand back every batch member.
    pub fn release_all(&mut self) -> Vec<InstanceRef> {
        self.state = SpawnerState::Dormant;
        std::mem::take(&mut self.batch)
    }

    /// Whether spawned members wait for a release.
    #[must_use]
    pub fn holds_members(&self) -> bool {
        self.policy != SpawnPolicy::Immediate
    }

    /// Spawn request for batch member `index`.
    #[must_use]
    pub fn member(&self, index: usize) -> Option<ActorSpawn> {
        let kind = *self.kinds.get(index % self.kinds.len().max(1))?;
        let idle_point = if self.idle_points.is_empty() {
            self.origin
        } else {
            self.idle_points[index % self.idle_points.len()]
        };
        let held = self.holds_members();
        Some(ActorSpawn {
            kind,
            position: self.origin,
            idle_point,
            path: self.path.clone(),
            group_index: index,
            ready: !held,
            held,
            bound_to: None,
        })
    }

    fn settling(&self) -> SpawnerState {
        SpawnerState::Settling {
            remaining: self.batch_interval * self.settle_fraction,
        }
    }

    fn after_batch(&self, actions: &mut Vec<SpawnerAction>) -> SpawnerState {
        match self.policy {
            SpawnPolicy::Immediate => {
                actions.push(SpawnerAction::Retire);
                SpawnerState::Cooldown {
                    remaining: self.batch_interval,
                }
            }
            SpawnPolicy::Staged if !self.activated => SpawnerState::Holding,
            SpawnPolicy::Staged => self.settling(),
            SpawnPolicy::Continuous => SpawnerState::Releasing {
                clock: 0.0,
                released: 0,
            },
        }
    }

    /// Advance the production clock by `dt`.
    ///
    /// Spawn and release requests are returned in order and must be applied
    /// in that order: a release may name a member spawned earlier in the same
    /// list. A state entered with nothing left to wait for acts within the
    /// same call, on the same `dt`.
    pub fn advance(&mut self, dt: f32) -> Vec<SpawnerAction> {
        let mut actions = Vec::new();
        // Spawns requested in this call, not yet in `batch`.
        let mut pending = 0;
        // Each pass either waits or enters the next state; a full cycle is
        // at most three immediate transitions.
        for _ in 0..4 {
            let previous = self.state;
            match self.state {
                SpawnerState::Dormant | SpawnerState::Holding => {}
                SpawnerState::Spawning { clock, spawned } => {
                    let due = due_in_batch(clock, self.intra_batch_delay, self.batch_size);
                    actions.extend((spawned..due).map(|index| SpawnerAction::Spawn { index }));
                    pending += due.saturating_sub(spawned);
                    self.state = if due >= self.batch_size {
                        self.after_batch(&mut actions)
                    } else {
                        SpawnerState::Spawning {
                            clock: clock + dt,
                            spawned: due,
                        }
                    };
                }
                SpawnerState::Settling { remaining } => {
                    let remaining = remaining - dt;
                    self.state = if remaining <= CLOCK_EPSILON {
                        SpawnerState::Releasing {
                            clock: 0.0,
                            released: 0,
                        }
                    } else {
                        SpawnerState::Settling { remaining }
                    };
                }
                SpawnerState::Releasing { clock, released } => {
                    let members = self.batch.len() + pending;
                    let due = due_in_batch(clock, self.intra_batch_delay, members);
                    actions.extend((released..due).map(|index| SpawnerAction::Release { index }));
                    self.state = if due >= members {
                        actions.push(SpawnerAction::Retire);
                        SpawnerState::Cooldown {
                            remaining: self.batch_interval,
                        }
                    } else {
                        SpawnerState::Releasing {
                            clock: clock + dt,
                            released: due,
                        }
                    };
                }
                SpawnerState::Cooldown { remaining } => {
                    let remaining = remaining - dt;
                    self.state = if remaining <= CLOCK_EPSILON {
                        SpawnerState::Spawning {
                            clock: 0.0,
                            spawned: 0,
                        }
                    } else {
                        SpawnerState::Cooldown { remaining }
                    };
                }
            }
            let entered_fresh = matches!(
                self.state,
                SpawnerState::Spawning { spawned: 0, .. }
                    | SpawnerState::Releasing { released: 0, .. }
            ) || matches!(self.state, SpawnerState::Settling { remaining } if remaining <= 0.0);
            if self.state == previous || !entered_fresh {
                break;
            }
        }
        actions
    }
}

// === Systems ===

/// `GameStarted` activates continuous spawners and prestages staged ones;
/// an opposing actor inside a structure's detection sensor activates it.
/// Runs in `GameSet::Triggers`.
fn activate_spawners(
    mut started: MessageReader<GameStarted>,
    mut spawners: Query<(
        &Name,
        &Team,
        &Health,
        &mut Spawner,
        Option<&CollidingEntities>,
    )>,
    intruders: Query<(&Team, &Health), With<Actor>>,
) {
    let game_started = started.read().count() > 0;
    for (name, team, health, mut spawner, colliding) in &mut spawners {
        if health.is_dead() {
            continue;
        }
        if game_started {
            match spawner.policy {
                SpawnPolicy::Continuous => {
                    spawner.activate();
                }
                SpawnPolicy::Staged => spawner.prestage(),
                SpawnPolicy::Immediate => {}
            }
        }
        if spawner.activated {
            continue;
        }
        let detected = colliding.is_some_and(|colliding| {
            colliding.iter().any(|other| {
                intruders.get(*other).is_ok_and(|(other_team, other_health)| {
                    *other_team == team.opposing() && !other_health.is_dead()
                })
            })
        });
        if detected && spawner.activate() {
            info!("`{name}` detected intruders and activated");
        }
    }
}

/// Friendly spawners switch to the upgraded cadence.
/// Runs in `GameSet::Triggers`.
fn apply_upgrades(
    config: Res<SimConfig>,
    mut upgrades: MessageReader<Upgrade>,
    mut spawners: Query<(&Team, &mut Spawner)>,
) {
    if upgrades.read().count() == 0 {
        return;
    }
    for (team, mut spawner) in &mut spawners {
        if *team == Team::Friendly {
            spawner.retime(config.upgrade.intra_batch_delay, config.upgrade.batch_interval);
        }
    }
    info!("friendly spawners upgraded");
}

/// Advances every spawner clock, spawning and releasing batch members.
/// Runs in `GameSet::Production`.
fn run_spawners(
    time: Res<Time>,
    config: Res<SimConfig>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut roster: ResMut<Roster>,
    mut spawners: Query<(&Health, &mut Spawner), With<Structure>>,
    mut members: Query<(&mut Readiness, Option<&Pooled>)>,
) {
    let dt = time.delta_secs();
    for (health, mut spawner) in &mut spawners {
        if health.is_dead() {
            continue;
        }
        for action in spawner.advance(dt) {
            match action {
                SpawnerAction::Spawn { index } => {
                    let Some(spawn) = spawner.member(index) else {
                        continue;
                    };
                    if let Some(instance) =
                        spawn_actor(&mut commands, &mut pool, &mut roster, &config, spawn)
                    {
                        spawner.batch.push(instance);
                    }
                }
                SpawnerAction::Release { index } => {
                    let Some(member) = spawner.batch.get(index).copied() else {
                        continue;
                    };
                    if let Ok((mut readiness, pooled)) = members.get_mut(member.entity) {
                        if member.is_current(pooled) {
                            readiness.release();
                        }
                    }
                }
                SpawnerAction::Retire => spawner.batch.clear(),
            }
        }
    }
}

pub(super) fn plugin(app: &mut App) {
    app.add_systems(
        Update,
        (
            (activate_spawners, apply_upgrades).in_set(GameSet::Triggers),
            run_spawners.in_set(GameSet::Production),
        )
            .run_if(gameplay_running),
    );
}
