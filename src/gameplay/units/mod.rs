//! Actors: pooled mobile combatants that stage, march along a lane and engage.

pub mod engage;
mod movement;

use bevy::ecs::system::EntityCommands;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ActorConfig, SimConfig};
use crate::gameplay::Team;
use crate::gameplay::ai::{Role, Roster};
use crate::gameplay::animation::{Animator, Clip};
use crate::gameplay::combat::{Health, HealthBar};
use crate::gameplay::pool::{InstanceRef, ObjectPool, PoolKey, PoolTemplate};
use crate::third_party::{CollisionLayer, sensor_body};

pub use movement::{deflect_waypoint, fan_station, step_toward};

/// Radius of an actor's contact sensor.
pub const ACTOR_RADIUS: f32 = 0.5;

// === Kinds ===

/// Every actor archetype, one pool each.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize,
)]
#[reflect(Component)]
pub enum ActorKind {
    Axe,
    Sword,
    Shield,
    Crossbow,
    Grunt,
    Archer,
}

impl ActorKind {
    /// All actor kinds, for iteration.
    pub const ALL: &[Self] = &[
        Self::Axe,
        Self::Sword,
        Self::Shield,
        Self::Crossbow,
        Self::Grunt,
        Self::Archer,
    ];

    #[must_use]
    pub const fn team(self) -> Team {
        match self {
            Self::Axe | Self::Sword | Self::Shield | Self::Crossbow => Team::Friendly,
            Self::Grunt | Self::Archer => Team::Enemy,
        }
    }

    #[must_use]
    pub const fn behavior(self) -> Behavior {
        match self {
            Self::Axe | Self::Sword | Self::Shield => Behavior::FriendlyMelee,
            Self::Crossbow => Behavior::FriendlyRanged,
            Self::Grunt => Behavior::EnemyMelee,
            Self::Archer => Behavior::EnemyRanged,
        }
    }

    #[must_use]
    pub const fn pool_key(self) -> PoolKey {
        match self {
            Self::Axe => PoolKey("axe"),
            Self::Sword => PoolKey("sword"),
            Self::Shield => PoolKey("shield"),
            Self::Crossbow => PoolKey("crossbow"),
            Self::Grunt => PoolKey("grunt"),
            Self::Archer => PoolKey("archer"),
        }
    }

    /// Towers configured to prefer shields aim at these first.
    #[must_use]
    pub const fn is_shielded(self) -> bool {
        matches!(self, Self::Shield)
    }

    /// Pool template for this kind.
    #[must_use]
    pub fn template(self) -> PoolTemplate {
        match self.team() {
            Team::Friendly => friendly_body,
            Team::Enemy => enemy_body,
        }
    }
}

fn friendly_body(instance: &mut EntityCommands) {
    instance.insert(sensor_body(ACTOR_RADIUS, CollisionLayer::Friendly, true));
}

fn enemy_body(instance: &mut EntityCommands) {
    instance.insert(sensor_body(ACTOR_RADIUS, CollisionLayer::Enemy, true));
}

/// Movement and targeting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum Behavior {
    /// Besieges the nearest enemy structure and strikes it.
    FriendlyMelee,
    /// Besieges the nearest enemy structure and shoots it.
    FriendlyRanged,
    /// Marches on the friendly main city; the player hunts it.
    EnemyMelee,
    /// Holds its post and shoots ready friendly actors.
    EnemyRanged,
}

impl Behavior {
    #[must_use]
    pub const fn is_ranged(self) -> bool {
        matches!(self, Self::FriendlyRanged | Self::EnemyRanged)
    }
}

/// Which side of a tower deflected waypoints pass on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum Side {
    #[default]
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub const fn sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

// === Components ===

/// A live actor.
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct Actor {
    pub kind: ActorKind,
    /// Spawn order within the owning spawner. Picks the stand position.
    pub group_index: usize,
}

/// Stats the actor was spawned with.
#[derive(Component, Debug, Clone, Copy, Deref, Reflect)]
#[reflect(Component)]
pub struct ActorStats(pub ActorConfig);

/// Staging point and lane.
#[derive(Component, Debug, Clone, Default, Reflect)]
#[reflect(Component)]
pub struct Locomotion {
    pub idle_point: Vec3,
    pub path: Vec<Vec3>,
    pub path_index: usize,
    /// Point currently steered toward.
    pub move_target: Option<Vec3>,
}

impl Locomotion {
    #[must_use]
    pub fn current_waypoint(&self) -> Option<Vec3> {
        self.path.get(self.path_index).copied()
    }
}

/// Two-phase activation. Not-ready actors are inert and untargetable.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct Readiness {
    pub ready: bool,
    /// Kept staged by the owning spawner until released.
    pub held: bool,
}

impl Readiness {
    pub const fn release(&mut self) {
        self.ready = true;
        self.held = false;
    }
}

/// Coarse state for the host and for debugging.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub enum ActorPhase {
    #[default]
    Staging,
    Idling,
    PathFollowing,
    Engaging,
    Dying,
}

/// Current target and where to stand while attacking it.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Reflect)]
#[reflect(Component)]
pub struct Engagement {
    pub target: Option<InstanceRef>,
    /// Stand position; `None` for actors that attack from where they are.
    pub station: Option<Vec3>,
    /// Target position when it was last acquired.
    pub aim: Vec3,
}

impl Engagement {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Swing timing. Each swing lasts `interval` and lands halfway through.
#[derive(Component, Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Component)]
pub struct AttackCycle {
    pub interval: f32,
    pub elapsed: f32,
    struck: bool,
}

impl AttackCycle {
    #[must_use]
    pub const fn new(interval: f32) -> Self {
        Self {
            interval,
            elapsed: 0.0,
            struck: false,
        }
    }

    /// Advance by `dt`. Returns `true` when the hit of the current swing lands.
    pub fn advance(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        if self.elapsed >= self.interval {
            self.elapsed -= self.interval;
            let missed = !self.struck;
            self.struck = self.elapsed >= self.interval * 0.5;
            return missed || self.struck;
        }
        if !self.struck && self.elapsed >= self.interval * 0.5 {
            self.struck = true;
            return true;
        }
        false
    }

    pub const fn reset(&mut self) {
        self.elapsed = 0.0;
        self.struck = false;
    }
}

/// Dies with the structure it is bound to.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct BoundTo(pub Entity);

/// Already traded itself against the friendly main city.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Breached;

// === Spawning ===

/// Everything needed to put one actor on the field.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSpawn {
    pub kind: ActorKind,
    pub position: Vec3,
    pub idle_point: Vec3,
    pub path: Vec<Vec3>,
    pub group_index: usize,
    pub ready: bool,
    pub held: bool,
    pub bound_to: Option<Entity>,
}

impl ActorSpawn {
    /// Ready actor at `position` with no lane.
    #[must_use]
    pub const fn at(kind: ActorKind, position: Vec3) -> Self {
        Self {
            kind,
            position,
            idle_point: position,
            path: Vec::new(),
            group_index: 0,
            ready: true,
            held: false,
            bound_to: None,
        }
    }
}

/// Acquire an actor from its pool and initialize it. The roster entry lands
/// at the end of the tick. Returns `None` when the pool cannot supply one.
pub fn spawn_actor(
    commands: &mut Commands,
    pool: &mut ObjectPool,
    roster: &mut Roster,
    config: &SimConfig,
    spawn: ActorSpawn,
) -> Option<InstanceRef> {
    let kind = spawn.kind;
    let team = kind.team();
    let stats = *config.actors.get(kind);
    let instance = pool.acquire(commands, kind.pool_key(), None, Some(spawn.position))?;

    let phase = if spawn.ready {
        ActorPhase::Idling
    } else {
        ActorPhase::Staging
    };
    let mut actor = commands.entity(instance.entity);
    actor.insert((
        Actor {
            kind,
            group_index: spawn.group_index,
        },
        kind,
        team,
        ActorStats(stats),
        Health::new(stats.hp),
        HealthBar::default(),
        Animator::new(Clip::Run),
        Locomotion {
            idle_point: spawn.idle_point,
            path: spawn.path,
            path_index: 0,
            move_target: None,
        },
        Readiness {
            ready: spawn.ready,
            held: spawn.held,
        },
        phase,
        Engagement::default(),
        AttackCycle::new(stats.attack_interval),
    ));
    actor.insert(Transform::from_translation(spawn.position).with_rotation(
        Quat::from_rotation_z(team.default_heading()),
    ));
    if let Some(structure) = spawn.bound_to {
        actor.insert(BoundTo(structure));
    }
    roster.enlist(instance.entity, team, Role::Actor);
    debug!(
        "spawned {kind:?} #{} at {}",
        spawn.group_index, spawn.position
    );
    Some(instance)
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Actor>()
        .register_type::<ActorKind>()
        .register_type::<ActorStats>()
        .register_type::<Locomotion>()
        .register_type::<Readiness>()
        .register_type::<ActorPhase>()
        .register_type::<Engagement>()
        .register_type::<AttackCycle>()
        .register_type::<BoundTo>()
        .register_type::<Breached>();
    app.add_plugins((movement::plugin, engage::plugin));
}
