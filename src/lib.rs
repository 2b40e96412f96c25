//! Tower-siege combat simulation library.
//!
//! A headless tower-defense core: pooled actors march along lanes, towers
//! batch-spawn reinforcements and fire volleys, loot flows into the player's
//! bag and is spent on landmarks. The battlefield ground plane is XY and the
//! vertical axis is +Z.

pub mod config;
pub mod gameplay;
pub mod scenario;
#[cfg(test)]
pub mod testing;
pub mod third_party;

use bevy::prelude::*;

/// Vertical axis of the battlefield.
pub const UP: Vec3 = Vec3::Z;

/// Primary simulation states.
#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameState {
    /// Pools are filled and the scenario is spawned.
    #[default]
    Loading,
    /// Simulation ticking.
    Playing,
    /// A main city fell. All pending work is cancelled.
    Over,
}

/// Ordering of gameplay systems within `Update`.
///
/// Damage requested anywhere before `Damage` lands in the same tick; roster
/// changes are applied in `Cleanup` so every query sees the start-of-tick roster.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameSet {
    /// Activation signals: game start, detection sensors, upgrades, unlocks.
    Triggers,
    /// Batch spawning and readiness release.
    Production,
    /// Target acquisition.
    Ai,
    /// Staging, path following, player movement.
    Movement,
    /// Attack cycles, volleys, projectiles, contact trades.
    Combat,
    /// Damage application.
    Damage,
    /// Death transitions and pool release.
    Death,
    /// Loot scatter, pickup, bag flights, landmark deposits.
    Loot,
    /// Deferred roster and target-list maintenance.
    Cleanup,
}

/// Run condition: true while the simulation is in `GameState::Playing`.
pub fn gameplay_running(state: Option<Res<State<GameState>>>) -> bool {
    state.is_some_and(|state| *state.get() == GameState::Playing)
}

/// Core plugin. Requires `StatesPlugin` (or `DefaultPlugins`) in the host app.
pub fn plugin(app: &mut App) {
    app.init_state::<GameState>();
    app.configure_sets(
        Update,
        (
            GameSet::Triggers,
            GameSet::Production,
            GameSet::Ai,
            GameSet::Movement,
            GameSet::Combat,
            GameSet::Damage,
            GameSet::Death,
            GameSet::Loot,
            GameSet::Cleanup,
        )
            .chain(),
    );
    app.add_plugins((config::plugin, gameplay::plugin, scenario::plugin));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::state::app::StatesPlugin;
    use pretty_assertions::assert_eq;

    #[test]
    fn game_state_default_is_loading() {
        assert_eq!(GameState::default(), GameState::Loading);
    }

    #[test]
    fn game_states_are_distinct() {
        assert_ne!(GameState::Loading, GameState::Playing);
        assert_ne!(GameState::Playing, GameState::Over);
    }

    #[test]
    fn gameplay_running_false_without_state() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        let running = app
            .world_mut()
            .run_system_cached(gameplay_running)
            .unwrap();
        assert!(!running);
    }

    #[test]
    fn gameplay_running_follows_state() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, StatesPlugin));
        app.init_state::<GameState>();
        app.update();
        assert!(!app.world_mut().run_system_cached(gameplay_running).unwrap());

        app.world_mut()
            .resource_mut::<NextState<GameState>>()
            .set(GameState::Playing);
        app.update();
        assert!(app.world_mut().run_system_cached(gameplay_running).unwrap());
    }
}
