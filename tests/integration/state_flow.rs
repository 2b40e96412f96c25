//! Loading spawns the map and hands over to play.

use bevy::prelude::*;
use pretty_assertions::assert_eq;
use tower_siege::GameState;
use tower_siege::gameplay::building::{Structure, StructureKind};
use tower_siege::gameplay::economy::bag::Bag;
use tower_siege::gameplay::economy::landmark::{Landmark, Locked};
use tower_siege::gameplay::player::Player;

use crate::{create_sim_app, run_frames};

fn state(app: &App) -> GameState {
    *app.world().resource::<State<GameState>>().get()
}

#[test]
fn loading_moves_on_to_playing() {
    let mut app = create_sim_app();
    assert_eq!(state(&app), GameState::Loading);
    run_frames(&mut app, 2);
    assert_eq!(state(&app), GameState::Playing);
}

#[test]
fn demo_map_is_spawned() {
    let mut app = create_sim_app();
    run_frames(&mut app, 2);

    let world = app.world_mut();
    let kinds: Vec<StructureKind> = world
        .query::<&Structure>()
        .iter(world)
        .map(|structure| structure.kind)
        .collect();
    assert_eq!(kinds.iter().filter(|kind| **kind == StructureKind::MainCity).count(), 2);
    assert_eq!(kinds.iter().filter(|kind| **kind == StructureKind::Tower).count(), 4);

    let landmarks = world.query::<&Landmark>().iter(world).count();
    let locked = world
        .query_filtered::<(), (With<Landmark>, With<Locked>)>()
        .iter(world)
        .count();
    assert_eq!(landmarks, 6);
    assert_eq!(locked, 5);
}

#[test]
fn player_starts_with_gold() {
    let mut app = create_sim_app();
    run_frames(&mut app, 3);

    let world = app.world_mut();
    let bag = world
        .query_filtered::<&Bag, With<Player>>()
        .single(world)
        .unwrap();
    assert_eq!(bag.len(), 10);
}
