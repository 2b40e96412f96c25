//! A few simulated seconds of the demo battle.

use bevy::prelude::*;
use tower_siege::gameplay::Team;
use tower_siege::gameplay::ai::Roster;
use tower_siege::gameplay::pool::Dormant;
use tower_siege::gameplay::units::Actor;

use crate::{create_sim_app, run_frames};

fn live_actors(app: &mut App, team: Team) -> usize {
    let world = app.world_mut();
    world
        .query_filtered::<&Team, (With<Actor>, Without<Dormant>)>()
        .iter(world)
        .filter(|actor_team| **actor_team == team)
        .count()
}

#[test]
fn barracks_sends_friendly_troops() {
    let mut app = create_sim_app();
    run_frames(&mut app, 30);

    assert!(live_actors(&mut app, Team::Friendly) > 0);
    assert!(!app.world().resource::<Roster>().actors(Team::Friendly).is_empty());
}

#[test]
fn structures_are_enlisted() {
    let mut app = create_sim_app();
    run_frames(&mut app, 3);

    let roster = app.world().resource::<Roster>();
    assert_eq!(roster.structures(Team::Friendly).len(), 2);
    assert_eq!(roster.structures(Team::Enemy).len(), 4);
}
