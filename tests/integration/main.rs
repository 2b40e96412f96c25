//! End-to-end runs of the full plugin on the demo scenario.

mod battle;
mod state_flow;

use std::time::Duration;

use bevy::prelude::*;
use bevy::state::app::StatesPlugin;
use bevy::time::TimeUpdateStrategy;
use tower_siege::config::SimConfig;

/// The full simulation without physics, stepped by hand.
pub fn create_sim_app() -> App {
    let mut config = SimConfig::default();
    config.pool.default_count = 20;
    config.pool.counts.clear();

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, StatesPlugin));
    app.insert_resource(config);
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)));
    app.add_plugins(tower_siege::plugin);
    app
}

pub fn run_frames(app: &mut App, frames: usize) {
    for _ in 0..frames {
        app.update();
    }
}
