//! Curve flights and bounce deformation, advanced by elapsed time.

use bevy::prelude::*;

use crate::gameplay::events::FlightLanded;
use crate::{GameSet, UP, gameplay_running};

// === Curves ===

/// Point on the quadratic Bézier curve `start → control → end` at `t`.
#[must_use]
pub fn quadratic_bezier(t: f32, start: Vec3, control: Vec3, end: Vec3) -> Vec3 {
    let t = t.clamp(0.0, 1.0);
    let u = 1.0 - t;
    start * (u * u) + control * (2.0 * t * u) + end * (t * t)
}

/// Control point halfway between `start` and `end`, raised by `lift`.
#[must_use]
pub fn arc_control(start: Vec3, end: Vec3, lift: f32) -> Vec3 {
    (start + end) * 0.5 + UP * lift
}

// === Components ===

/// Why an entity is flying. Reported back in `FlightLanded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum FlightPurpose {
    /// Dropped loot scattering to the ground.
    Scatter,
    /// Gold paid into a landmark.
    Deposit { landmark: Entity },
}

/// Fixed-endpoint flight along a quadratic curve.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct CurveFlight {
    pub start: Vec3,
    pub control: Vec3,
    pub end: Vec3,
    pub elapsed: f32,
    pub duration: f32,
    /// Spin about the vertical axis, radians per second.
    pub spin: f32,
    pub purpose: FlightPurpose,
}

impl CurveFlight {
    #[must_use]
    pub const fn new(
        start: Vec3,
        control: Vec3,
        end: Vec3,
        duration: f32,
        purpose: FlightPurpose,
    ) -> Self {
        Self {
            start,
            control,
            end,
            elapsed: 0.0,
            duration,
            spin: 0.0,
            purpose,
        }
    }

    #[must_use]
    pub const fn with_spin(mut self, spin: f32) -> Self {
        self.spin = spin;
        self
    }

    /// Progress in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }
}

/// Jelly keyframes: `(seconds, scale x, scale vertical, scale y)` from zero scale.
const BOUNCE_KEYS: [(f32, Vec3); 6] = [
    (0.1, Vec3::new(1.0, 1.0, 1.0)),
    (0.05, Vec3::new(1.4, 1.0, 0.53)),
    (0.09, Vec3::new(0.8, 1.0, 1.2)),
    (0.04, Vec3::new(1.2, 1.0, 0.7)),
    (0.04, Vec3::new(0.85, 1.0, 1.1)),
    (0.04, Vec3::new(1.0, 1.0, 1.0)),
];

/// Squash-and-stretch played when an item lands.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Bounce {
    pub elapsed: f32,
}

impl Bounce {
    /// Total length of the keyframe track.
    #[must_use]
    pub fn duration() -> f32 {
        BOUNCE_KEYS.iter().map(|(secs, _)| secs).sum()
    }

    /// Scale at the current time; linear between keyframes.
    #[must_use]
    pub fn sample(&self) -> Vec3 {
        if self.is_finished() {
            return Vec3::ONE;
        }
        let mut from = Vec3::ZERO;
        let mut remaining = self.elapsed;
        for (secs, to) in BOUNCE_KEYS {
            if remaining < secs {
                return from.lerp(to, remaining / secs);
            }
            remaining -= secs;
            from = to;
        }
        from
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.elapsed >= Self::duration()
    }
}

// === Systems ===

/// Moves curve flights and reports landings.
/// Runs in `GameSet::Loot`.
fn advance_curve_flights(
    time: Res<Time>,
    mut commands: Commands,
    mut flights: Query<(Entity, &mut CurveFlight, &mut Transform)>,
    mut landed: MessageWriter<FlightLanded>,
) {
    let dt = time.delta_secs();
    for (entity, mut flight, mut transform) in &mut flights {
        flight.elapsed += dt;
        let t = flight.progress();
        transform.translation = quadratic_bezier(t, flight.start, flight.control, flight.end);
        if flight.spin != 0.0 {
            transform.rotate_z(flight.spin * dt);
        }
        if t >= 1.0 {
            commands.entity(entity).remove::<CurveFlight>();
            landed.write(FlightLanded {
                entity,
                purpose: flight.purpose,
            });
        }
    }
}

/// Advances bounce deformation and clears it when done.
fn animate_bounces(
    time: Res<Time>,
    mut commands: Commands,
    mut bouncing: Query<(Entity, &mut Bounce, &mut Transform)>,
) {
    for (entity, mut bounce, mut transform) in &mut bouncing {
        bounce.elapsed += time.delta_secs();
        transform.scale = bounce.sample();
        if bounce.is_finished() {
            transform.scale = Vec3::ONE;
            commands.entity(entity).remove::<Bounce>();
        }
    }
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.register_type::<CurveFlight>().register_type::<Bounce>();
    app.add_systems(
        Update,
        (advance_curve_flights, animate_bounces)
            .in_set(GameSet::Loot)
            .run_if(gameplay_running),
    );
}
