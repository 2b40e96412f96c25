//! Reusable instance pools keyed by type name.
//!
//! Pooled entities are never despawned. Releasing one strips every gameplay
//! component (which also cancels any timer or flight it owned), parks it at
//! the identity transform and hides it. Each acquire stamps a fresh
//! generation into `Pooled`, so an [`InstanceRef`] taken during an earlier
//! life stops matching once the instance is reused.

use std::collections::{HashMap, HashSet};

use bevy::ecs::system::EntityCommands;
use bevy::prelude::*;

use crate::config::SimConfig;
use crate::gameplay::combat::projectile::ProjectileKind;
use crate::gameplay::economy::{GOLD_KEY, coin_template};
use crate::gameplay::units::ActorKind;

/// Builds the inert body of a pooled instance. Re-applied on every acquire.
pub type PoolTemplate = fn(&mut EntityCommands);

// === Components ===

/// Name of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub struct PoolKey(pub &'static str);

impl PoolKey {
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

/// Pool membership of an entity, with the generation of its current life.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct Pooled {
    pub key: PoolKey,
    pub generation: u32,
}

/// Marks an instance parked in its pool.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Dormant;

/// Handle to one life of a possibly pooled entity.
///
/// Entities that never come from a pool use generation 0; pooled generations
/// start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub struct InstanceRef {
    pub entity: Entity,
    pub generation: u32,
}

impl InstanceRef {
    /// Reference to an entity that is not pooled.
    #[must_use]
    pub const fn fixed(entity: Entity) -> Self {
        Self {
            entity,
            generation: 0,
        }
    }

    /// Reference to the current life of `entity`.
    #[must_use]
    pub fn of(entity: Entity, pooled: Option<&Pooled>) -> Self {
        Self {
            entity,
            generation: pooled.map_or(0, |pooled| pooled.generation),
        }
    }

    /// Whether the entity is still in the life this reference was taken in.
    #[must_use]
    pub fn is_current(&self, pooled: Option<&Pooled>) -> bool {
        pooled.map_or(0, |pooled| pooled.generation) == self.generation
    }
}

// === Resource ===

#[derive(Debug)]
struct PoolBucket {
    template: PoolTemplate,
    idle: Vec<Entity>,
    live: HashSet<Entity>,
    total: usize,
    generation: u32,
    exhausted: bool,
}

/// All object pools.
#[derive(Resource, Debug)]
pub struct ObjectPool {
    buckets: HashMap<PoolKey, PoolBucket>,
    growth: usize,
    max_per_kind: usize,
}

impl Default for ObjectPool {
    fn default() -> Self {
        Self::new(10, 500)
    }
}

impl ObjectPool {
    /// Empty pool set that grows by `growth` up to `max_per_kind` instances per pool.
    #[must_use]
    pub fn new(growth: usize, max_per_kind: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            growth: growth.max(1),
            max_per_kind,
        }
    }

    /// Register pool `key` and preallocate `count` inert instances.
    /// Returns `false` if the pool already exists.
    pub fn init(
        &mut self,
        commands: &mut Commands,
        key: PoolKey,
        template: PoolTemplate,
        count: usize,
    ) -> bool {
        if self.buckets.contains_key(&key) {
            warn!("pool `{}` is already registered", key.name());
            return false;
        }
        let count = count.min(self.max_per_kind);
        let idle = (0..count).map(|_| spawn_inert(commands, key)).collect();
        self.buckets.insert(
            key,
            PoolBucket {
                template,
                idle,
                live: HashSet::new(),
                total: count,
                generation: 0,
                exhausted: false,
            },
        );
        debug!("pool `{}` preallocated {count} instances", key.name());
        true
    }

    /// Hand out an instance of `key`.
    ///
    /// The instance is active, carries the pool template and is reparented.
    /// `position` is in world space; under a parent it is converted through
    /// the parent's `GlobalTransform` when the commands apply. Without a
    /// position the instance sits at its local origin. Returns `None` for
    /// unknown pools and exhausted ones.
    pub fn acquire(
        &mut self,
        commands: &mut Commands,
        key: PoolKey,
        parent: Option<Entity>,
        position: Option<Vec3>,
    ) -> Option<InstanceRef> {
        let Some(bucket) = self.buckets.get_mut(&key) else {
            warn!("acquire from unknown pool `{}`", key.name());
            return None;
        };

        if bucket.idle.is_empty() {
            let batch = self.growth.min(self.max_per_kind.saturating_sub(bucket.total));
            if batch == 0 {
                if !bucket.exhausted {
                    bucket.exhausted = true;
                    warn!(
                        "pool `{}` reached its ceiling of {} instances",
                        key.name(),
                        self.max_per_kind
                    );
                }
                return None;
            }
            bucket
                .idle
                .extend((0..batch).map(|_| spawn_inert(commands, key)));
            bucket.total += batch;
            debug!("pool `{}` grew to {} instances", key.name(), bucket.total);
        }

        let entity = bucket.idle.pop()?;
        bucket.generation = bucket.generation.wrapping_add(1).max(1);
        bucket.live.insert(entity);
        let generation = bucket.generation;

        let mut instance = commands.entity(entity);
        instance.remove::<Dormant>();
        (bucket.template)(&mut instance);
        instance.insert((
            position.map_or(Transform::IDENTITY, Transform::from_translation),
            Visibility::Inherited,
            Pooled { key, generation },
        ));
        if let Some(parent) = parent {
            instance.insert(ChildOf(parent));
            if let Some(world_position) = position {
                commands.queue(move |world: &mut World| {
                    place_under_parent(world, entity, parent, world_position);
                });
            }
        }

        Some(InstanceRef { entity, generation })
    }

    /// Return a live instance to pool `key`.
    ///
    /// Returns `false` (and does nothing) if the instance is not live in that pool.
    pub fn release(&mut self, commands: &mut Commands, key: PoolKey, entity: Entity) -> bool {
        let Some(bucket) = self.buckets.get_mut(&key) else {
            return false;
        };
        if !bucket.live.remove(&entity) {
            return false;
        }
        bucket.idle.push(entity);
        bucket.exhausted = false;
        commands
            .entity(entity)
            .retain::<(Pooled, Name)>()
            .insert((Transform::IDENTITY, Visibility::Hidden, Dormant));
        true
    }

    #[must_use]
    pub fn is_registered(&self, key: PoolKey) -> bool {
        self.buckets.contains_key(&key)
    }

    #[must_use]
    pub fn live_count(&self, key: PoolKey) -> usize {
        self.buckets.get(&key).map_or(0, |bucket| bucket.live.len())
    }

    #[must_use]
    pub fn idle_count(&self, key: PoolKey) -> usize {
        self.buckets.get(&key).map_or(0, |bucket| bucket.idle.len())
    }

    #[must_use]
    pub fn is_live(&self, key: PoolKey, entity: Entity) -> bool {
        self.buckets
            .get(&key)
            .is_some_and(|bucket| bucket.live.contains(&entity))
    }
}

fn spawn_inert(commands: &mut Commands, key: PoolKey) -> Entity {
    commands
        .spawn((
            Name::new(key.name()),
            Dormant,
            Transform::IDENTITY,
            Visibility::Hidden,
        ))
        .id()
}

/// Set the local translation that puts `entity` at `world_position` under
/// `parent`. A parent without a `GlobalTransform` counts as the identity.
fn place_under_parent(world: &mut World, entity: Entity, parent: Entity, world_position: Vec3) {
    let local = world
        .get::<GlobalTransform>(parent)
        .map_or(world_position, |global| {
            global.affine().inverse().transform_point3(world_position)
        });
    if let Some(mut transform) = world.get_mut::<Transform>(entity) {
        transform.translation = local;
    }
}

// === Systems ===

/// Every pool the simulation draws from, with its template.
fn pool_templates() -> Vec<(PoolKey, PoolTemplate)> {
    let mut templates: Vec<(PoolKey, PoolTemplate)> = ActorKind::ALL
        .iter()
        .map(|kind| (kind.pool_key(), kind.template()))
        .collect();
    templates.extend(
        ProjectileKind::ALL
            .iter()
            .map(|kind| (kind.pool_key(), kind.template())),
    );
    templates.push((GOLD_KEY, coin_template));
    templates
}

/// Replace the pool set with freshly preallocated pools sized from config.
pub fn setup_pools(mut commands: Commands, config: Res<SimConfig>) {
    let mut pool = ObjectPool::new(config.pool.growth, config.pool.max_per_kind);
    for (key, template) in pool_templates() {
        pool.init(&mut commands, key, template, config.pool.count_for(key.name()));
    }
    commands.insert_resource(pool);
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Pooled>().register_type::<Dormant>();
    app.init_resource::<ObjectPool>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_entity_count, create_test_app, with_pool};
    use pretty_assertions::assert_eq;

    const TEST_KEY: PoolKey = PoolKey("test");

    #[derive(Component)]
    struct Shell;

    #[derive(Component)]
    struct Scratch;

    fn shell_template(instance: &mut EntityCommands) {
        instance.insert(Shell);
    }

    fn pool_app(growth: usize, max: usize, count: usize) -> App {
        let mut app = create_test_app();
        app.insert_resource(ObjectPool::new(growth, max));
        with_pool(&mut app, |pool, commands| {
            pool.init(commands, TEST_KEY, shell_template, count);
        });
        app
    }

    #[test]
    fn init_preallocates_dormant_instances() {
        let mut app = pool_app(10, 100, 4);

        assert_entity_count::<With<Dormant>>(&mut app, 4);
        assert_entity_count::<With<Shell>>(&mut app, 0);
        let pool = app.world().resource::<ObjectPool>();
        assert_eq!(pool.idle_count(TEST_KEY), 4);
        assert_eq!(pool.live_count(TEST_KEY), 0);
    }

    #[test]
    fn duplicate_init_is_rejected() {
        let mut app = pool_app(10, 100, 2);
        let accepted = with_pool(&mut app, |pool, commands| {
            pool.init(commands, TEST_KEY, shell_template, 5)
        });
        assert!(!accepted);
        assert_entity_count::<With<Dormant>>(&mut app, 2);
    }

    #[test]
    fn unknown_pool_yields_none() {
        let mut app = pool_app(10, 100, 1);
        let instance = with_pool(&mut app, |pool, commands| {
            pool.acquire(commands, PoolKey("missing"), None, None)
        });
        assert!(instance.is_none());
    }

    #[test]
    fn acquire_activates_at_position() {
        let mut app = pool_app(10, 100, 1);
        let instance = with_pool(&mut app, |pool, commands| {
            pool.acquire(commands, TEST_KEY, None, Some(Vec3::new(3.0, 4.0, 0.0)))
        })
        .unwrap();

        let entity = app.world().entity(instance.entity);
        assert!(entity.contains::<Shell>());
        assert!(!entity.contains::<Dormant>());
        assert_eq!(entity.get::<Visibility>(), Some(&Visibility::Inherited));
        assert_eq!(
            entity.get::<Transform>().unwrap().translation,
            Vec3::new(3.0, 4.0, 0.0)
        );
        assert_eq!(entity.get::<Pooled>().unwrap().generation, instance.generation);
    }

    #[test]
    fn acquire_without_position_uses_origin_and_parent() {
        let mut app = pool_app(10, 100, 1);
        let parent = app.world_mut().spawn(Transform::default()).id();
        let instance = with_pool(&mut app, |pool, commands| {
            pool.acquire(commands, TEST_KEY, Some(parent), None)
        })
        .unwrap();

        let entity = app.world().entity(instance.entity);
        assert_eq!(entity.get::<Transform>().unwrap().translation, Vec3::ZERO);
        assert_eq!(entity.get::<ChildOf>().unwrap().parent(), parent);
    }

    #[test]
    fn parented_acquire_keeps_the_world_position() {
        let mut app = pool_app(10, 100, 1);
        let parent = app
            .world_mut()
            .spawn((
                Transform::from_xyz(10.0, 0.0, 0.0),
                GlobalTransform::from_translation(Vec3::new(10.0, 0.0, 0.0)),
            ))
            .id();
        let instance = with_pool(&mut app, |pool, commands| {
            pool.acquire(commands, TEST_KEY, Some(parent), Some(Vec3::new(12.0, 3.0, 0.0)))
        })
        .unwrap();

        let entity = app.world().entity(instance.entity);
        assert_eq!(entity.get::<ChildOf>().unwrap().parent(), parent);
        assert_eq!(
            entity.get::<Transform>().unwrap().translation,
            Vec3::new(2.0, 3.0, 0.0)
        );
    }

    #[test]
    fn release_then_acquire_returns_clean_instance() {
        let mut app = pool_app(10, 100, 1);
        let first = with_pool(&mut app, |pool, commands| {
            pool.acquire(commands, TEST_KEY, None, Some(Vec3::X))
        })
        .unwrap();
        {
            let mut entity = app.world_mut().entity_mut(first.entity);
            entity.insert(Scratch);
            let mut transform = entity.get_mut::<Transform>().unwrap();
            transform.scale = Vec3::splat(2.5);
            transform.rotation = Quat::from_rotation_z(1.0);
        }

        let released = with_pool(&mut app, |pool, commands| {
            pool.release(commands, TEST_KEY, first.entity)
        });
        assert!(released);
        assert!(app.world().entity(first.entity).contains::<Dormant>());
        assert!(!app.world().entity(first.entity).contains::<Scratch>());

        let second = with_pool(&mut app, |pool, commands| {
            pool.acquire(commands, TEST_KEY, None, None)
        })
        .unwrap();

        assert_eq!(second.entity, first.entity);
        assert_ne!(second.generation, first.generation);
        let entity = app.world().entity(second.entity);
        let transform = entity.get::<Transform>().unwrap();
        assert_eq!(transform.scale, Vec3::ONE);
        assert_eq!(transform.rotation, Quat::IDENTITY);
        assert!(!entity.contains::<Dormant>());
        assert!(!entity.contains::<Scratch>());
        assert!(entity.contains::<Shell>());
    }

    #[test]
    fn stale_reference_no_longer_current() {
        let mut app = pool_app(10, 100, 1);
        let first = with_pool(&mut app, |pool, commands| {
            let first = pool.acquire(commands, TEST_KEY, None, None).unwrap();
            pool.release(commands, TEST_KEY, first.entity);
            first
        });
        let second = with_pool(&mut app, |pool, commands| {
            pool.acquire(commands, TEST_KEY, None, None)
        })
        .unwrap();

        let pooled = app.world().get::<Pooled>(second.entity);
        assert!(second.is_current(pooled));
        assert!(!first.is_current(pooled));
    }

    #[test]
    fn release_is_idempotent() {
        let mut app = pool_app(10, 100, 1);
        let (first, second, wrong_key) = with_pool(&mut app, |pool, commands| {
            let instance = pool.acquire(commands, TEST_KEY, None, None).unwrap();
            let wrong_key = pool.release(commands, PoolKey("other"), instance.entity);
            (
                pool.release(commands, TEST_KEY, instance.entity),
                pool.release(commands, TEST_KEY, instance.entity),
                wrong_key,
            )
        });
        assert!(first);
        assert!(!second);
        assert!(!wrong_key);
        assert_eq!(app.world().resource::<ObjectPool>().idle_count(TEST_KEY), 1);
    }

    #[test]
    fn exhausted_pool_grows_in_batches() {
        let mut app = pool_app(10, 100, 1);
        with_pool(&mut app, |pool, commands| {
            assert!(pool.acquire(commands, TEST_KEY, None, None).is_some());
            assert!(pool.acquire(commands, TEST_KEY, None, None).is_some());
        });

        let pool = app.world().resource::<ObjectPool>();
        assert_eq!(pool.live_count(TEST_KEY), 2);
        assert_eq!(pool.idle_count(TEST_KEY), 9);
        assert_entity_count::<With<Pooled>>(&mut app, 2);
        assert_entity_count::<With<Dormant>>(&mut app, 9);
    }

    #[test]
    fn growth_stops_at_ceiling() {
        let mut app = pool_app(2, 3, 1);
        let acquired = with_pool(&mut app, |pool, commands| {
            (0..5)
                .filter_map(|_| pool.acquire(commands, TEST_KEY, None, None))
                .count()
        });
        assert_eq!(acquired, 3);
        assert_eq!(app.world().resource::<ObjectPool>().live_count(TEST_KEY), 3);
    }

    #[test]
    fn released_instance_frees_room_under_ceiling() {
        let mut app = pool_app(1, 1, 1);
        let reacquired = with_pool(&mut app, |pool, commands| {
            let instance = pool.acquire(commands, TEST_KEY, None, None).unwrap();
            assert!(pool.acquire(commands, TEST_KEY, None, None).is_none());
            pool.release(commands, TEST_KEY, instance.entity);
            pool.acquire(commands, TEST_KEY, None, None)
        });
        assert!(reacquired.is_some());
    }

    #[test]
    fn setup_pools_registers_every_kind() {
        let mut app = create_test_app();
        let mut config = SimConfig::default();
        config.pool.default_count = 2;
        app.insert_resource(config);
        app.world_mut().run_system_cached(setup_pools).unwrap();

        let pool = app.world().resource::<ObjectPool>();
        for kind in ActorKind::ALL {
            assert!(pool.is_registered(kind.pool_key()));
            assert_eq!(pool.idle_count(kind.pool_key()), 2);
        }
        for kind in ProjectileKind::ALL {
            assert!(pool.is_registered(kind.pool_key()));
        }
        assert!(pool.is_registered(GOLD_KEY));
    }
}
