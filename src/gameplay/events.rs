//! Typed message bus for cross-cutting gameplay signals.

use bevy::prelude::*;

use crate::gameplay::Team;
use crate::gameplay::pool::InstanceRef;
use crate::gameplay::tween::FlightPurpose;

/// The run has started. Spawners prestage, the player receives starting gold.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStarted;

/// A main city fell.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOver {
    pub victory: bool,
}

/// A tower or main city was destroyed.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureDestroyed {
    pub structure: Entity,
    pub team: Team,
    pub level: u8,
}

/// An enemy actor reached the friendly main city.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnemyBreachedDefense {
    pub enemy: Entity,
    pub city: Entity,
}

/// Friendly spawners switch to the upgraded cadence.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upgrade;

/// Request to apply damage. Stale targets are discarded.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct DamageRequest {
    pub target: InstanceRef,
    pub amount: f32,
}

/// A combatant's health crossed zero. Emitted exactly once per life.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Died {
    pub entity: Entity,
    pub team: Team,
}

/// Scatter `amount` gold coins around `at`.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct DropLoot {
    pub at: Vec3,
    pub amount: u32,
}

/// Direction of a bag transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum TransferDirection {
    In,
    Out,
}

/// Completion notice for a bag insertion or removal.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BagTransfer {
    pub bag: Entity,
    pub item: Entity,
    pub direction: TransferDirection,
    pub success: bool,
}

/// A curve flight reached its end point.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightLanded {
    pub entity: Entity,
    pub purpose: FlightPurpose,
}

pub(crate) fn plugin(app: &mut App) {
    app.add_message::<GameStarted>()
        .add_message::<GameOver>()
        .add_message::<StructureDestroyed>()
        .add_message::<EnemyBreachedDefense>()
        .add_message::<Upgrade>()
        .add_message::<DamageRequest>()
        .add_message::<Died>()
        .add_message::<DropLoot>()
        .add_message::<BagTransfer>()
        .add_message::<FlightLanded>();
}
