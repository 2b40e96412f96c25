//! Endgame: a fallen main city ends the run and pending work is cancelled.

use bevy::prelude::*;

use crate::gameplay::building::{PendingShots, Spawner};
use crate::gameplay::combat::projectile::{Projectile, ProjectileKind};
use crate::gameplay::economy::bag::{Bag, BagFlight};
use crate::gameplay::economy::{CoinState, GOLD_KEY, GoldCoin};
use crate::gameplay::events::GameOver;
use crate::gameplay::pool::ObjectPool;
use crate::gameplay::tween::CurveFlight;
use crate::{GameSet, GameState, gameplay_running};

/// How the run ended. Present only once the game is over.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Victory,
    Defeat,
}

/// Switches to `GameState::Over` on the first `GameOver`.
/// Runs in `GameSet::Cleanup`.
fn detect_game_over(
    mut commands: Commands,
    mut game_over: MessageReader<GameOver>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let Some(ending) = game_over.read().next() else {
        return;
    };
    let outcome = if ending.victory {
        Outcome::Victory
    } else {
        Outcome::Defeat
    };
    info!("game over: {outcome:?}");
    commands.insert_resource(outcome);
    next_state.set(GameState::Over);
}

/// Drops every volley, projectile, flight and spawner clock still pending.
fn cancel_pending_work(
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut volleys: Query<&mut PendingShots>,
    mut spawners: Query<&mut Spawner>,
    projectiles: Query<(Entity, &ProjectileKind), With<Projectile>>,
    flights: Query<(Entity, Option<&GoldCoin>), With<CurveFlight>>,
    mut bags: Query<&mut Bag>,
    bag_flights: Query<Entity, With<BagFlight>>,
) {
    for mut pending in &mut volleys {
        pending.0.clear();
    }
    for mut spawner in &mut spawners {
        spawner.release_all();
    }
    let mut released = 0;
    for (entity, kind) in &projectiles {
        if pool.release(&mut commands, kind.pool_key(), entity) {
            released += 1;
        }
    }
    for (entity, coin) in &flights {
        if coin.is_some_and(|coin| coin.state == CoinState::Deposited) {
            pool.release(&mut commands, GOLD_KEY, entity);
        } else {
            commands.entity(entity).remove::<CurveFlight>();
        }
    }
    for mut bag in &mut bags {
        for item in bag.cancel_transfers() {
            pool.release(&mut commands, GOLD_KEY, item);
        }
    }
    for entity in &bag_flights {
        commands.entity(entity).remove::<BagFlight>();
    }
    debug!("game over: released {released} projectiles");
}

pub(super) fn plugin(app: &mut App) {
    app.add_systems(
        Update,
        detect_game_over
            .in_set(GameSet::Cleanup)
            .run_if(gameplay_running),
    );
    app.add_systems(OnEnter(GameState::Over), cancel_pending_work);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameplay::building::volley::PendingShot;
    use crate::gameplay::economy::bag::BagLayout;
    use crate::gameplay::economy::coin_template;
    use crate::gameplay::pool::{Dormant, InstanceRef};
    use crate::gameplay::tween::FlightPurpose;
    use crate::testing::{advance_secs, create_gameplay_test_app, with_pool};
    use bevy::state::app::StatesPlugin;
    use pretty_assertions::assert_eq;

    fn create_endgame_test_app() -> App {
        let mut app = create_gameplay_test_app();
        app.add_plugins(StatesPlugin);
        app.init_state::<GameState>();
        plugin(&mut app);
        app.world_mut()
            .resource_mut::<NextState<GameState>>()
            .set(GameState::Playing);
        app.update();
        app
    }

    fn state(app: &App) -> GameState {
        *app.world().resource::<State<GameState>>().get()
    }

    #[test]
    fn victory_ends_the_run() {
        let mut app = create_endgame_test_app();
        app.world_mut().write_message(GameOver { victory: true });
        advance_secs(&mut app, 0.1);
        app.update();

        assert_eq!(state(&app), GameState::Over);
        assert_eq!(*app.world().resource::<Outcome>(), Outcome::Victory);
    }

    #[test]
    fn defeat_is_recorded() {
        let mut app = create_endgame_test_app();
        app.world_mut().write_message(GameOver { victory: false });
        advance_secs(&mut app, 0.1);
        app.update();
        assert_eq!(*app.world().resource::<Outcome>(), Outcome::Defeat);
    }

    #[test]
    fn running_game_has_no_outcome() {
        let mut app = create_endgame_test_app();
        advance_secs(&mut app, 0.1);
        assert_eq!(state(&app), GameState::Playing);
        assert!(app.world().get_resource::<Outcome>().is_none());
    }

    #[test]
    fn game_over_cancels_pending_work() {
        let mut app = create_endgame_test_app();
        let bullet_kind = ProjectileKind::TowerBullet;
        let (bullet, deposit) = with_pool(&mut app, |pool, commands| {
            pool.init(commands, bullet_kind.pool_key(), bullet_kind.template(), 1);
            pool.init(commands, GOLD_KEY, coin_template, 2);
            let bullet = pool.acquire(commands, bullet_kind.pool_key(), None, None);
            let deposit = pool.acquire(commands, GOLD_KEY, None, None);
            (bullet.unwrap().entity, deposit.unwrap().entity)
        });
        app.world_mut().entity_mut(bullet).insert(Projectile {
            target: InstanceRef::fixed(Entity::PLACEHOLDER),
            team: crate::gameplay::Team::Enemy,
            damage: 10.0,
            origin: Vec3::ZERO,
            aim: Vec3::X,
            elapsed: 0.0,
            duration: 1.0,
            splash: None,
        });
        let flight = |purpose| CurveFlight::new(Vec3::ZERO, Vec3::Z, Vec3::X, 1.0, purpose);
        app.world_mut().entity_mut(deposit).insert((
            GoldCoin::new(CoinState::Deposited),
            flight(FlightPurpose::Deposit {
                landmark: Entity::PLACEHOLDER,
            }),
        ));
        let scattering = app
            .world_mut()
            .spawn((GoldCoin::default(), flight(FlightPurpose::Scatter)))
            .id();
        let tower = app
            .world_mut()
            .spawn(PendingShots(vec![PendingShot {
                delay: 0.1,
                target: InstanceRef::fixed(Entity::PLACEHOLDER),
            }]))
            .id();
        let incoming = app.world_mut().spawn_empty().id();
        let mut bag = Bag::new(BagLayout::default());
        bag.begin_add(incoming).unwrap();
        let player = app.world_mut().spawn(bag).id();

        app.world_mut().write_message(GameOver { victory: false });
        advance_secs(&mut app, 0.1);
        app.update();

        let world = app.world();
        assert!(world.get::<Dormant>(bullet).is_some());
        assert!(world.get::<Dormant>(deposit).is_some());
        assert!(world.get::<CurveFlight>(scattering).is_none());
        assert!(world.get::<PendingShots>(tower).unwrap().0.is_empty());
        assert!(world.get::<Bag>(player).unwrap().flying_in().is_empty());
    }
}
