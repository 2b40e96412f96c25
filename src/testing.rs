//! Testing utilities for Bevy systems.

#![cfg(test)]

use std::time::Duration;

use avian2d::prelude::CollidingEntities;
use bevy::ecs::entity::EntityHashSet;
use bevy::ecs::message::Messages;
use bevy::ecs::query::QueryFilter;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;

use crate::config::SimConfig;
use crate::gameplay::ai::Roster;
use crate::gameplay::economy::LootRng;
use crate::gameplay::events;
use crate::gameplay::player::PlayerTargets;
use crate::gameplay::pool::ObjectPool;
use crate::scenario::Paths;

/// Creates a minimal app with manually stepped time.
///
/// The first frame (delta 0) has already run, so the next `advance` moves
/// the clock by exactly the requested amount.
pub fn create_test_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::ZERO));
    app.update();
    app
}

/// Test app carrying the shared gameplay resources and every message type.
pub fn create_gameplay_test_app() -> App {
    let mut app = create_test_app();
    events::plugin(&mut app);
    app.init_resource::<SimConfig>()
        .init_resource::<Roster>()
        .init_resource::<ObjectPool>()
        .init_resource::<PlayerTargets>()
        .init_resource::<LootRng>()
        .init_resource::<Paths>();
    app
}

/// Advance the clock by `dt` and run one frame.
pub fn advance(app: &mut App, dt: Duration) {
    app.insert_resource(TimeUpdateStrategy::ManualDuration(dt));
    app.update();
}

/// Advance the clock by `secs` and run one frame. Keep steps at or below
/// 0.25 s, the virtual clock's maximum delta.
pub fn advance_secs(app: &mut App, secs: f32) {
    advance(app, Duration::from_secs_f32(secs));
}

/// Run `frames` frames of `secs` each.
pub fn advance_frames(app: &mut App, frames: usize, secs: f32) {
    for _ in 0..frames {
        advance_secs(app, secs);
    }
}

/// Assert the number of entities matching the filter `F`.
pub fn assert_entity_count<F: QueryFilter>(app: &mut App, expected: usize) {
    let count = app
        .world_mut()
        .query_filtered::<(), F>()
        .iter(app.world())
        .count();
    assert_eq!(count, expected);
}

/// Messages of type `M` still buffered (written during the last two frames).
pub fn collect_messages<M: Message + Clone>(app: &App) -> Vec<M> {
    let messages = app.world().resource::<Messages<M>>();
    messages.get_cursor().read(messages).cloned().collect()
}

/// Run `f` against the object pool with a command queue, then apply the commands.
pub fn with_pool<R>(app: &mut App, f: impl FnOnce(&mut ObjectPool, &mut Commands) -> R) -> R {
    let world = app.world_mut();
    world.init_resource::<ObjectPool>();
    let result = world.resource_scope(|world, mut pool: Mut<ObjectPool>| {
        let mut commands = world.commands();
        f(&mut pool, &mut commands)
    });
    world.flush();
    result
}

/// Make `entity`'s sensor report contact with `others`, as the physics step would.
pub fn collide(app: &mut App, entity: Entity, others: &[Entity]) {
    let contacts = CollidingEntities(EntityHashSet::from_iter(others.iter().copied()));
    app.world_mut().entity_mut(entity).insert(contacts);
}
