//! Headless battle runner.
//!
//! Usage: `tower-siege [config.ron] [scenario.ron]`. Missing or invalid files
//! fall back to the shipped tuning and the demo map.

use std::path::Path;
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::state::app::StatesPlugin;
use tower_siege::config::SimConfig;
use tower_siege::gameplay::endgame::Outcome;
use tower_siege::scenario::Scenario;

/// Simulated seconds before the runner gives up on a decision.
const TIME_LIMIT_SECS: f32 = 600.0;
const TICK: Duration = Duration::from_millis(16);

fn main() -> AppExit {
    let mut args = std::env::args().skip(1);
    let config = args.next().map_or_else(SimConfig::default, |path| {
        SimConfig::load(Path::new(&path)).unwrap_or_else(|err| {
            eprintln!("{err}, using default tuning");
            SimConfig::default()
        })
    });
    let scenario = args.next().map_or_else(Scenario::demo, |path| {
        Scenario::load(Path::new(&path)).unwrap_or_else(|err| {
            eprintln!("{err}, using the demo scenario");
            Scenario::demo()
        })
    });

    App::new()
        .add_plugins((
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(TICK)),
            LogPlugin::default(),
            TransformPlugin,
            StatesPlugin,
        ))
        .insert_resource(config)
        .insert_resource(scenario)
        .add_plugins((tower_siege::third_party::plugin, tower_siege::plugin))
        .add_systems(Update, stop_when_decided)
        .run()
}

fn stop_when_decided(
    time: Res<Time>,
    outcome: Option<Res<Outcome>>,
    mut exit: MessageWriter<AppExit>,
) {
    if let Some(outcome) = outcome {
        info!("battle decided: {:?}", *outcome);
        exit.write(AppExit::Success);
    } else if time.elapsed_secs() > TIME_LIMIT_SECS {
        warn!("no decision after {TIME_LIMIT_SECS} s");
        exit.write(AppExit::Success);
    }
}
