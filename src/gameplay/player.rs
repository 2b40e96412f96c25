//! The player's hero: moves on host intent, shoots the nearest registered
//! enemy and carries the bag.

use bevy::prelude::*;

use crate::config::SimConfig;
use crate::gameplay::ai::{DistanceMode, find_nearest};
use crate::gameplay::animation::{Animator, Clip};
use crate::gameplay::combat::Health;
use crate::gameplay::combat::projectile::{Launch, ProjectileKind, launch_projectile};
use crate::gameplay::economy::bag::Bag;
use crate::gameplay::pool::{InstanceRef, ObjectPool, Pooled};
use crate::gameplay::{Team, heading_toward};
use crate::third_party::{CollisionLayer, sensor_body};
use crate::{GameSet, gameplay_running};

const PLAYER_RADIUS: f32 = 0.5;

// === Components ===

/// Marker for the hero.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Player;

/// Auto-fire cadence of the hero.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct PlayerWeapon {
    pub timer: Timer,
}

impl PlayerWeapon {
    #[must_use]
    pub fn new(interval: f32) -> Self {
        Self {
            timer: Timer::from_seconds(interval, TimerMode::Repeating),
        }
    }
}

/// Planar move direction written by the host. Longer than one is clamped.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Reflect)]
#[reflect(Component)]
pub struct PlayerIntent(pub Vec2);

// === Resources ===

/// Enemies the hero may shoot, in registration order.
#[derive(Resource, Debug, Default)]
pub struct PlayerTargets(Vec<Entity>);

impl PlayerTargets {
    /// Returns `false` if `entity` was already listed.
    pub fn add(&mut self, entity: Entity) -> bool {
        if self.0.contains(&entity) {
            return false;
        }
        self.0.push(entity);
        true
    }

    /// Returns `false` if `entity` was not listed.
    pub fn remove(&mut self, entity: Entity) -> bool {
        let before = self.0.len();
        self.0.retain(|&listed| listed != entity);
        self.0.len() != before
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.0
    }

    pub fn retain(&mut self, keep: impl FnMut(&Entity) -> bool) {
        self.0.retain(keep);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

pub fn spawn_player(commands: &mut Commands, config: &SimConfig, position: Vec3) -> Entity {
    let player = commands
        .spawn((
            Name::new("Player"),
            Player,
            PlayerWeapon::new(config.player.attack_interval),
            PlayerIntent::default(),
            Bag::new(config.bag.clone()),
            Animator::new(Clip::Idle),
            Transform::from_translation(position),
            sensor_body(PLAYER_RADIUS, CollisionLayer::Player, true),
        ))
        .id();
    info!("player at {position}");
    player
}

// === Systems ===

/// Runs in `GameSet::Movement`.
fn move_player(
    time: Res<Time>,
    config: Res<SimConfig>,
    mut players: Query<(&PlayerIntent, &mut Transform, &mut Animator), With<Player>>,
) {
    let step = config.player.speed * time.delta_secs();
    for (intent, mut transform, mut animator) in &mut players {
        let direction = intent.0.clamp_length_max(1.0);
        if direction == Vec2::ZERO {
            if animator.clip() == Clip::Run {
                animator.play(Clip::Idle);
            }
            continue;
        }
        let from = transform.translation;
        transform.translation += direction.extend(0.0) * step;
        if let Some(rotation) = heading_toward(from, transform.translation) {
            transform.rotation = rotation;
        }
        animator.play(Clip::Run);
    }
}

/// Fires a bullet at the nearest registered target every attack interval.
/// Runs in `GameSet::Combat`.
fn player_attack(
    time: Res<Time>,
    config: Res<SimConfig>,
    targets: Res<PlayerTargets>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut players: Query<(&Transform, &mut PlayerWeapon, &mut Animator), With<Player>>,
    candidates: Query<(&Transform, &Health, Option<&Pooled>), Without<Player>>,
) {
    let player = &config.player;
    for (transform, mut weapon, mut animator) in &mut players {
        weapon.timer.tick(time.delta());
        if !weapon.timer.just_finished() {
            continue;
        }
        let origin = transform.translation;
        let living = targets.entities().iter().filter_map(|&entity| {
            candidates
                .get(entity)
                .ok()
                .filter(|(_, health, _)| health.can_be_damaged())
                .map(|(target, _, _)| (entity, target.translation))
        });
        let Some(target) = find_nearest(living, origin, player.range, DistanceMode::Spatial) else {
            continue;
        };
        let Ok((target_transform, _, pooled)) = candidates.get(target) else {
            continue;
        };
        let aim = target_transform.translation;
        let duration = if player.bullet_speed > 0.0 {
            origin.distance(aim) / player.bullet_speed
        } else {
            0.0
        };
        launch_projectile(
            &mut commands,
            &mut pool,
            Launch {
                kind: ProjectileKind::PlayerBullet,
                team: Team::Friendly,
                origin,
                target: InstanceRef::of(target, pooled),
                aim,
                damage: player.attack,
                duration,
                splash: None,
            },
        );
        animator.play(Clip::Attack);
    }
}

/// Drops listed targets that died or went back to their pool.
/// Runs in `GameSet::Cleanup`.
fn prune_player_targets(mut targets: ResMut<PlayerTargets>, health: Query<&Health>) {
    targets.retain(|&entity| health.get(entity).is_ok_and(|health| !health.is_dead()));
}

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Player>()
        .register_type::<PlayerWeapon>()
        .register_type::<PlayerIntent>()
        .init_resource::<PlayerTargets>();
    app.add_systems(
        Update,
        (
            move_player.in_set(GameSet::Movement),
            player_attack.in_set(GameSet::Combat),
            prune_player_targets.in_set(GameSet::Cleanup),
        )
            .run_if(gameplay_running),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn targets_keep_insertion_order_and_ignore_repeats() {
        let a = Entity::from_raw_u32(1).unwrap();
        let b = Entity::from_raw_u32(2).unwrap();
        let mut targets = PlayerTargets::default();
        assert!(targets.add(b));
        assert!(targets.add(a));
        assert!(!targets.add(b));
        assert_eq!(targets.entities(), &[b, a]);

        assert!(targets.remove(b));
        assert!(!targets.remove(b));
        assert_eq!(targets.entities(), &[a]);
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::gameplay::combat::projectile::Projectile;
    use crate::testing::{advance_secs, create_gameplay_test_app, with_pool};
    use pretty_assertions::assert_eq;

    fn create_player_test_app() -> App {
        let mut app = create_gameplay_test_app();
        app.add_systems(
            Update,
            (move_player, player_attack, prune_player_targets).chain(),
        );
        with_pool(&mut app, |pool, commands| {
            let kind = ProjectileKind::PlayerBullet;
            pool.init(commands, kind.pool_key(), kind.template(), 4);
        });
        app
    }

    fn spawn_test_player(app: &mut App, at: Vec3) -> Entity {
        let world = app.world_mut();
        let config = world.resource::<SimConfig>().clone();
        let mut commands = world.commands();
        let player = spawn_player(&mut commands, &config, at);
        world.flush();
        player
    }

    fn spawn_target(app: &mut App, at: Vec3) -> Entity {
        let target = app
            .world_mut()
            .spawn((Health::new(50.0), Transform::from_translation(at)))
            .id();
        app.world_mut().resource_mut::<PlayerTargets>().add(target);
        target
    }

    fn bullets(app: &mut App) -> Vec<Projectile> {
        app.world_mut()
            .query::<&Projectile>()
            .iter(app.world())
            .cloned()
            .collect()
    }

    #[test]
    fn intent_moves_player_at_configured_speed() {
        let mut app = create_player_test_app();
        let player = spawn_test_player(&mut app, Vec3::ZERO);
        app.world_mut().get_mut::<PlayerIntent>(player).unwrap().0 = Vec2::new(0.0, 3.0);

        advance_secs(&mut app, 0.25);
        let transform = app.world().get::<Transform>(player).unwrap();
        assert!((transform.translation - Vec3::new(0.0, 1.5, 0.0)).length() < 1e-4);
        assert_eq!(app.world().get::<Animator>(player).unwrap().clip(), Clip::Run);
    }

    #[test]
    fn fires_at_nearest_target_once_per_interval() {
        let mut app = create_player_test_app();
        spawn_test_player(&mut app, Vec3::ZERO);
        spawn_target(&mut app, Vec3::new(9.0, 0.0, 0.0));
        let near = spawn_target(&mut app, Vec3::new(0.0, 6.0, 0.0));

        for _ in 0..4 {
            advance_secs(&mut app, 0.25);
        }
        let fired = bullets(&mut app);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].target.entity, near);
        assert!((fired[0].duration - 0.2).abs() < 1e-4);
        assert_eq!(fired[0].damage, 10.0);
    }

    #[test]
    fn out_of_range_targets_are_ignored() {
        let mut app = create_player_test_app();
        spawn_test_player(&mut app, Vec3::ZERO);
        spawn_target(&mut app, Vec3::new(0.0, 10.5, 0.0));

        for _ in 0..4 {
            advance_secs(&mut app, 0.25);
        }
        assert!(bullets(&mut app).is_empty());
    }

    #[test]
    fn dead_targets_are_pruned() {
        let mut app = create_player_test_app();
        let target = spawn_target(&mut app, Vec3::new(2.0, 0.0, 0.0));
        let gone = spawn_target(&mut app, Vec3::new(3.0, 0.0, 0.0));
        app.world_mut()
            .get_mut::<Health>(target)
            .unwrap()
            .apply_damage(100.0);
        app.world_mut().entity_mut(gone).remove::<Health>();

        advance_secs(&mut app, 0.1);
        assert!(app.world().resource::<PlayerTargets>().entities().is_empty());
    }
}
