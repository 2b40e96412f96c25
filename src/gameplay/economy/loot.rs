//! Dropped gold: scatter, bounce, pickup, and the starting purse.

use bevy::prelude::*;
use rand::Rng;

use super::bag::{Bag, send_to_bag};
use super::{CoinState, GOLD_KEY, GoldCoin, LootRng};
use crate::config::SimConfig;
use crate::gameplay::events::{BagTransfer, DropLoot, FlightLanded, GameStarted};
use crate::gameplay::player::Player;
use crate::gameplay::pool::ObjectPool;
use crate::gameplay::tween::{Bounce, CurveFlight, FlightPurpose};
use crate::{GameSet, UP, gameplay_running};

/// Random point in the planar ring `[inner, outer]` around `center`.
pub fn scatter_point(rng: &mut impl Rng, center: Vec3, inner: f32, outer: f32) -> Vec3 {
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    let radius = if outer > inner {
        rng.random_range(inner..=outer)
    } else {
        inner
    };
    center + Vec3::new(angle.cos(), angle.sin(), 0.0) * radius
}

/// Scatters `amount` coins around each drop point.
/// Runs in `GameSet::Loot`.
fn drop_loot(
    config: Res<SimConfig>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut rng: ResMut<LootRng>,
    mut drops: MessageReader<DropLoot>,
) {
    let loot = &config.loot;
    for drop in drops.read() {
        for _ in 0..drop.amount {
            let Some(coin) = pool.acquire(&mut commands, GOLD_KEY, None, Some(drop.at)) else {
                break;
            };
            let end = scatter_point(&mut rng.0, drop.at, loot.scatter_inner, loot.scatter_outer);
            commands.entity(coin.entity).insert(
                CurveFlight::new(
                    drop.at,
                    end + UP * loot.scatter_lift,
                    end,
                    loot.scatter_secs,
                    FlightPurpose::Scatter,
                )
                .with_spin(loot.scatter_spin),
            );
        }
        debug!("dropped {} gold at {}", drop.amount, drop.at);
    }
}

/// Scattered coins that touched down start bouncing.
fn land_scattered(
    mut commands: Commands,
    mut landed: MessageReader<FlightLanded>,
    mut coins: Query<&mut GoldCoin>,
) {
    for landing in landed.read() {
        if landing.purpose != FlightPurpose::Scatter {
            continue;
        }
        let Ok(mut coin) = coins.get_mut(landing.entity) else {
            continue;
        };
        if coin.state == CoinState::Scattering {
            coin.state = CoinState::Bouncing;
            commands.entity(landing.entity).insert(Bounce::default());
        }
    }
}

/// Coins whose bounce finished can be picked up.
fn settle_coins(mut coins: Query<&mut GoldCoin, Without<Bounce>>) {
    for mut coin in &mut coins {
        if coin.state == CoinState::Bouncing {
            coin.state = CoinState::Collectable;
        }
    }
}

/// Collectable coins near the player fly into the bag. Nothing is attempted
/// while the bag cannot take more.
fn collect_gold(
    config: Res<SimConfig>,
    mut commands: Commands,
    mut transfers: MessageWriter<BagTransfer>,
    mut players: Query<(Entity, &Transform, &mut Bag), With<Player>>,
    mut coins: Query<(Entity, &Transform, &mut GoldCoin), Without<Player>>,
) {
    let Ok((player, anchor, mut bag)) = players.single_mut() else {
        return;
    };
    let radius = config.player.pickup_radius;
    for (entity, transform, mut coin) in &mut coins {
        if !bag.is_accepting() || bag.is_full() {
            return;
        }
        if coin.state != CoinState::Collectable
            || transform.translation.truncate().distance(anchor.translation.truncate()) > radius
        {
            continue;
        }
        if send_to_bag(
            &mut commands,
            &mut transfers,
            player,
            &mut bag,
            entity,
            transform.translation,
        )
        .is_ok()
        {
            coin.state = CoinState::Carried;
        }
    }
}

/// Fills the player's bag with the starting gold.
fn grant_starting_gold(
    config: Res<SimConfig>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut started: MessageReader<GameStarted>,
    mut players: Query<(&Transform, &mut Bag), With<Player>>,
) {
    if started.read().count() == 0 {
        return;
    }
    let Ok((anchor, mut bag)) = players.single_mut() else {
        return;
    };
    let mut granted = 0;
    for _ in 0..config.player.starting_gold {
        let Some(coin) = pool.acquire(&mut commands, GOLD_KEY, None, Some(anchor.translation))
        else {
            break;
        };
        if bag.direct_add(coin.entity).is_err() {
            pool.release(&mut commands, GOLD_KEY, coin.entity);
            break;
        }
        commands
            .entity(coin.entity)
            .insert(GoldCoin::new(CoinState::Carried));
        granted += 1;
    }
    info!("player starts with {granted} gold");
}

pub(super) fn plugin(app: &mut App) {
    app.add_systems(
        Update,
        (
            grant_starting_gold,
            drop_loot,
            settle_coins,
            land_scattered,
            collect_gold,
        )
            .chain()
            .in_set(GameSet::Loot)
            .run_if(gameplay_running),
    );
}
