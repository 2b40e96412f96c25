//! Gameplay domain plugins: pools, combat, units, buildings, economy, player.

pub mod ai;
pub mod animation;
pub mod building;
pub mod combat;
pub mod economy;
pub mod endgame;
pub mod events;
pub mod player;
pub mod pool;
pub mod tween;
pub mod units;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

// === Shared Components ===

/// Allegiance of a combatant.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize,
)]
#[reflect(Component)]
pub enum Team {
    Friendly,
    Enemy,
}

impl Team {
    /// The team this one fights.
    #[must_use]
    pub const fn opposing(self) -> Self {
        match self {
            Self::Friendly => Self::Enemy,
            Self::Enemy => Self::Friendly,
        }
    }

    /// Heading (radians about +Z) an idle combatant of this team faces.
    #[must_use]
    pub const fn default_heading(self) -> f32 {
        match self {
            Self::Friendly => 0.0,
            Self::Enemy => std::f32::consts::PI,
        }
    }
}

/// Rotation about the vertical axis that looks from `from` toward `to`.
/// Returns `None` when the points coincide on the ground plane.
#[must_use]
pub fn heading_toward(from: Vec3, to: Vec3) -> Option<Quat> {
    let delta = (to - from).truncate();
    (delta.length_squared() > f32::EPSILON).then(|| Quat::from_rotation_z(delta.y.atan2(delta.x)))
}

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Team>();
    app.add_plugins((
        events::plugin,
        pool::plugin,
        ai::plugin,
        animation::plugin,
        tween::plugin,
        combat::plugin,
        units::plugin,
        building::plugin,
        economy::plugin,
        player::plugin,
        endgame::plugin,
    ));
}
