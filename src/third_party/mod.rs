//! Third-party plugin isolation.

mod avian;

pub use avian::{CollisionLayer, sensor_body, sensor_layers};

/// Physics plugin for hosts that want real collision detection.
///
/// The gameplay plugin only reads `CollidingEntities`; tests fill those sets
/// directly and never add this plugin.
pub fn plugin(app: &mut bevy::prelude::App) {
    app.add_plugins(avian::plugin);
}
