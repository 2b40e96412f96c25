//! Pooled projectiles: fixed-duration flights that track their target.

use bevy::ecs::system::EntityCommands;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::gameplay::ai::{DistanceMode, Roster, rank_in_range};
use crate::gameplay::combat::Health;
use crate::gameplay::events::DamageRequest;
use crate::gameplay::pool::{InstanceRef, ObjectPool, PoolKey, PoolTemplate, Pooled};
use crate::gameplay::{Team, heading_toward};
use crate::{GameSet, gameplay_running};

// === Components ===

/// Kind of projectile, one pool each.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize,
)]
#[reflect(Component)]
pub enum ProjectileKind {
    /// Fired by the player.
    PlayerBullet,
    /// Fired by towers and cities.
    TowerBullet,
    /// Fired by archers and crossbows.
    Arrow,
}

impl ProjectileKind {
    pub const ALL: &[Self] = &[Self::PlayerBullet, Self::TowerBullet, Self::Arrow];

    #[must_use]
    pub const fn pool_key(self) -> PoolKey {
        match self {
            Self::PlayerBullet => PoolKey("player_bullet"),
            Self::TowerBullet => PoolKey("tower_bullet"),
            Self::Arrow => PoolKey("arrow"),
        }
    }

    /// Whether the body turns to face its direction of travel.
    #[must_use]
    pub const fn faces_travel(self) -> bool {
        matches!(self, Self::Arrow)
    }

    /// Pool template for this kind.
    #[must_use]
    pub fn template(self) -> PoolTemplate {
        match self {
            Self::PlayerBullet => player_bullet_body,
            Self::TowerBullet => tower_bullet_body,
            Self::Arrow => arrow_body,
        }
    }
}

fn player_bullet_body(instance: &mut EntityCommands) {
    instance.insert((Name::new("Player Bullet"), ProjectileKind::PlayerBullet));
}

fn tower_bullet_body(instance: &mut EntityCommands) {
    instance.insert((Name::new("Tower Bullet"), ProjectileKind::TowerBullet));
}

fn arrow_body(instance: &mut EntityCommands) {
    instance.insert((Name::new("Arrow"), ProjectileKind::Arrow));
}

/// Area damage on impact: every opposing actor within `radius` takes
/// `damage * falloff^rank`, rank 0 being the closest.
#[derive(Debug, Clone, Copy, PartialEq, Reflect, Serialize, Deserialize)]
pub struct Splash {
    pub radius: f32,
    pub falloff: f32,
}

impl Splash {
    #[must_use]
    pub fn damage_at_rank(&self, damage: f32, rank: usize) -> f32 {
        damage * self.falloff.powi(i32::try_from(rank).unwrap_or(i32::MAX))
    }
}

/// A projectile in flight.
///
/// Travels from `origin` to `aim` over `duration`. While the target lives,
/// `aim` follows its current position.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Projectile {
    pub target: InstanceRef,
    pub team: Team,
    pub damage: f32,
    pub origin: Vec3,
    pub aim: Vec3,
    pub elapsed: f32,
    pub duration: f32,
    pub splash: Option<Splash>,
}

impl Projectile {
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }
}

/// Everything needed to fire one projectile.
#[derive(Debug, Clone, Copy)]
pub struct Launch {
    pub kind: ProjectileKind,
    pub team: Team,
    pub origin: Vec3,
    pub target: InstanceRef,
    pub aim: Vec3,
    pub damage: f32,
    pub duration: f32,
    pub splash: Option<Splash>,
}

/// Acquire a projectile from its pool and send it on its way.
/// Returns `None` when the pool cannot supply one.
pub fn launch_projectile(
    commands: &mut Commands,
    pool: &mut ObjectPool,
    launch: Launch,
) -> Option<Entity> {
    let instance = pool.acquire(commands, launch.kind.pool_key(), None, Some(launch.origin))?;
    commands.entity(instance.entity).insert(Projectile {
        target: launch.target,
        team: launch.team,
        damage: launch.damage,
        origin: launch.origin,
        aim: launch.aim,
        elapsed: 0.0,
        duration: launch.duration,
        splash: launch.splash,
    });
    Some(instance.entity)
}

// === Systems ===

/// Moves projectiles, applies damage on arrival, and returns them to their pool.
/// Runs in `GameSet::Combat`.
fn fly_projectiles(
    time: Res<Time>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    roster: Res<Roster>,
    mut projectiles: Query<(
        Entity,
        &mut Projectile,
        &mut Transform,
        &Pooled,
        Option<&ProjectileKind>,
    )>,
    targets: Query<(&Transform, &Health, Option<&Pooled>), Without<Projectile>>,
    mut damage: MessageWriter<DamageRequest>,
) {
    let dt = time.delta_secs();
    let alive = |target: InstanceRef| {
        targets
            .get(target.entity)
            .ok()
            .filter(|(_, health, pooled)| target.is_current(*pooled) && health.can_be_damaged())
            .map(|(transform, _, _)| transform.translation)
    };

    for (entity, mut projectile, mut transform, pooled, kind) in &mut projectiles {
        let target_position = alive(projectile.target);
        if let Some(position) = target_position {
            projectile.aim = position;
        }

        projectile.elapsed += dt;
        let t = projectile.progress();
        let previous = transform.translation;
        transform.translation = projectile.origin.lerp(projectile.aim, t);
        if kind.is_some_and(|kind| kind.faces_travel()) {
            if let Some(rotation) = heading_toward(previous, transform.translation) {
                transform.rotation = rotation;
            }
        }
        if t < 1.0 {
            continue;
        }

        match projectile.splash {
            Some(splash) => {
                let candidates = roster
                    .actors(projectile.team.opposing())
                    .iter()
                    .filter_map(|&victim| {
                        targets
                            .get(victim)
                            .ok()
                            .filter(|(_, health, _)| health.can_be_damaged())
                            .map(|(transform, _, _)| (victim, transform.translation))
                    });
                let victims = rank_in_range(
                    candidates,
                    projectile.aim,
                    splash.radius,
                    DistanceMode::Planar,
                );
                for (rank, (victim, _)) in victims.into_iter().enumerate() {
                    let pooled = targets.get(victim).ok().and_then(|(_, _, pooled)| pooled);
                    damage.write(DamageRequest {
                        target: InstanceRef::of(victim, pooled),
                        amount: splash.damage_at_rank(projectile.damage, rank),
                    });
                }
            }
            None if target_position.is_some() => {
                damage.write(DamageRequest {
                    target: projectile.target,
                    amount: projectile.damage,
                });
            }
            // Target died or was recycled mid-flight: the shot fizzles.
            None => {}
        }
        pool.release(&mut commands, pooled.key, entity);
    }
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Projectile>()
        .register_type::<ProjectileKind>();
    app.add_systems(
        Update,
        fly_projectiles
            .in_set(GameSet::Combat)
            .run_if(gameplay_running),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splash_falls_off_by_rank() {
        let splash = Splash {
            radius: 3.0,
            falloff: 0.5,
        };
        assert_eq!(splash.damage_at_rank(20.0, 0), 20.0);
        assert_eq!(splash.damage_at_rank(20.0, 1), 10.0);
        assert_eq!(splash.damage_at_rank(20.0, 2), 5.0);
    }

    #[test]
    fn pool_keys_are_distinct() {
        let keys: std::collections::HashSet<_> =
            ProjectileKind::ALL.iter().map(|kind| kind.pool_key()).collect();
        assert_eq!(keys.len(), ProjectileKind::ALL.len());
    }
}
