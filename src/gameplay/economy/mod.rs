//! Economy: pooled gold coins, the player's bag, and landmarks that spend it.

pub mod bag;
pub mod landmark;
mod loot;

use bevy::ecs::system::EntityCommands;
use bevy::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::GameState;
use crate::config::{LootConfig, SimConfig};
use crate::gameplay::pool::PoolKey;

pub use loot::scatter_point;

// === Constants ===

/// Pool of gold coins.
pub const GOLD_KEY: PoolKey = PoolKey("gold");

// === Components ===

/// Where a coin is in its life.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Reflect)]
pub enum CoinState {
    /// Flying out of a dead combatant.
    #[default]
    Scattering,
    /// Landed, playing the bounce.
    Bouncing,
    /// On the ground, waiting for the player.
    Collectable,
    /// Flying into or held by the bag.
    Carried,
    /// Flying into a landmark.
    Deposited,
}

/// A gold coin.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct GoldCoin {
    pub state: CoinState,
}

impl GoldCoin {
    #[must_use]
    pub const fn new(state: CoinState) -> Self {
        Self { state }
    }
}

/// Pool template for coins.
pub fn coin_template(instance: &mut EntityCommands) {
    instance.insert((Name::new("Gold"), GoldCoin::default()));
}

// === Resources ===

/// Seeded randomness for loot scatter.
#[derive(Resource, Debug, Clone)]
pub struct LootRng(pub StdRng);

impl Default for LootRng {
    fn default() -> Self {
        Self(StdRng::seed_from_u64(LootConfig::default().seed))
    }
}

fn seed_loot_rng(mut commands: Commands, config: Res<SimConfig>) {
    commands.insert_resource(LootRng(StdRng::seed_from_u64(config.loot.seed)));
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.register_type::<GoldCoin>().init_resource::<LootRng>();
    app.add_systems(OnEnter(GameState::Loading), seed_loot_rng);

    bag::plugin(app);
    loot::plugin(app);
    landmark::plugin(app);
}
