//! Avian2d physics configuration for trigger-driven gameplay.
//!
//! Every gameplay collider is a sensor: the simulation never resolves contacts,
//! it only reads `CollidingEntities` to learn who touches whom.

use avian2d::prelude::*;
use bevy::prelude::*;

// === Collision Layers ===

/// Physics collision layers, one per trigger group.
#[derive(PhysicsLayer, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollisionLayer {
    /// Scenery. Interacts with everything.
    #[default]
    Default,
    /// The player's hero.
    Player,
    /// Friendly actors.
    Friendly,
    /// Enemy actors.
    Enemy,
    /// Landmark deposit zones.
    Landmark,
    /// Detection and breach zones around structures.
    Check,
}

impl CollisionLayer {
    /// Layers this layer's sensors report.
    #[must_use]
    pub fn filters(self) -> LayerMask {
        match self {
            Self::Default => LayerMask::ALL,
            Self::Player => [Self::Default, Self::Landmark].into(),
            Self::Friendly => [Self::Default, Self::Enemy, Self::Check].into(),
            Self::Enemy => [Self::Default, Self::Friendly, Self::Check].into(),
            Self::Landmark => [Self::Default, Self::Player].into(),
            Self::Check => [Self::Default, Self::Friendly, Self::Enemy].into(),
        }
    }
}

// === Helpers ===

/// Membership plus the matching filter set for a trigger group.
#[must_use]
pub fn sensor_layers(layer: CollisionLayer) -> CollisionLayers {
    CollisionLayers::new(layer, layer.filters())
}

/// Circular sensor that records overlaps in `CollidingEntities`.
///
/// Mobile bodies are kinematic so gameplay code can move them through
/// `Transform`; structures and landmarks are static.
pub fn sensor_body(radius: f32, layer: CollisionLayer, mobile: bool) -> impl Bundle {
    let body = if mobile {
        RigidBody::Kinematic
    } else {
        RigidBody::Static
    };
    (
        body,
        Collider::circle(radius),
        Sensor,
        sensor_layers(layer),
        CollisionEventsEnabled,
        CollidingEntities::default(),
    )
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.add_plugins(PhysicsPlugins::default().with_length_unit(1.0));
    app.insert_resource(Gravity::ZERO);
}
