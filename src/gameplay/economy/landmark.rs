//! Landmarks: map gates that take gold from the bag and pay out a reward.

use avian2d::prelude::CollidingEntities;
use bevy::prelude::*;
use rand::Rng;

use super::bag::Bag;
use super::{CoinState, GOLD_KEY, GoldCoin, LootRng};
use crate::config::SimConfig;
use crate::gameplay::Team;
use crate::gameplay::ai::Roster;
use crate::gameplay::building::spawn_tower;
use crate::gameplay::events::{FlightLanded, StructureDestroyed, Upgrade};
use crate::gameplay::player::Player;
use crate::gameplay::pool::ObjectPool;
use crate::gameplay::tween::{CurveFlight, FlightPurpose, arc_control};
use crate::scenario::{LandmarkReward, LandmarkSpec, Paths};
use crate::third_party::{CollisionLayer, sensor_body};
use crate::{GameSet, gameplay_running};

// === Components ===

#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component, from_reflect = false)]
pub struct Landmark {
    pub cost: u32,
    /// Coins that landed.
    pub paid: u32,
    /// Coins on their way.
    pub in_flight: u32,
    #[reflect(ignore)]
    pub reward: LandmarkReward,
    pub unlock_level: Option<u8>,
    pub deposit_clock: Timer,
}

impl Landmark {
    #[must_use]
    pub fn new(spec: &LandmarkSpec, deposit_interval: f32) -> Self {
        Self {
            cost: spec.cost,
            paid: 0,
            in_flight: 0,
            reward: spec.reward.clone(),
            unlock_level: spec.unlock_level,
            deposit_clock: Timer::from_seconds(deposit_interval, TimerMode::Repeating),
        }
    }

    /// Coins still to be sent.
    #[must_use]
    pub const fn outstanding(&self) -> u32 {
        self.cost.saturating_sub(self.paid + self.in_flight)
    }
}

/// Landmark waiting for an enemy tower of its unlock level to fall.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Locked;

/// Landmark whose reward has been paid out.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Spent;

pub fn spawn_landmark(commands: &mut Commands, config: &SimConfig, spec: &LandmarkSpec) -> Entity {
    let mut landmark = commands.spawn((
        Name::new(spec.name.clone()),
        Landmark::new(spec, config.landmark.deposit_interval),
        Transform::from_translation(spec.position.to_vec3()),
        sensor_body(spec.radius, CollisionLayer::Landmark, false),
    ));
    if spec.unlock_level.is_some() {
        landmark.insert(Locked);
    }
    landmark.id()
}

// === Systems ===

/// Unlocks landmarks waiting on the level of a destroyed enemy tower.
/// Runs in `GameSet::Triggers`.
fn unlock_landmarks(
    mut commands: Commands,
    mut destroyed: MessageReader<StructureDestroyed>,
    locked: Query<(Entity, &Name, &Landmark), With<Locked>>,
) {
    for destruction in destroyed.read() {
        if destruction.team != Team::Enemy {
            continue;
        }
        for (entity, name, landmark) in &locked {
            if landmark.unlock_level == Some(destruction.level) {
                commands.entity(entity).remove::<Locked>();
                info!("landmark `{name}` unlocked");
            }
        }
    }
}

/// While the player stands on an open landmark the bag stops accepting and
/// pays one coin per deposit interval.
/// Runs in `GameSet::Loot`.
fn visit_landmarks(
    time: Res<Time>,
    config: Res<SimConfig>,
    mut commands: Commands,
    mut rng: ResMut<LootRng>,
    mut players: Query<(Entity, &mut Bag), With<Player>>,
    mut landmarks: Query<
        (Entity, &Transform, &mut Landmark, &CollidingEntities),
        (Without<Locked>, Without<Spent>),
    >,
    mut coins: Query<(&Transform, &mut GoldCoin), Without<Landmark>>,
) {
    let Ok((player, mut bag)) = players.single_mut() else {
        return;
    };
    let mut visiting = false;
    for (entity, transform, mut landmark, colliding) in &mut landmarks {
        if !colliding.contains(&player) {
            landmark.deposit_clock.reset();
            continue;
        }
        visiting = true;
        landmark.deposit_clock.tick(time.delta());
        if !landmark.deposit_clock.just_finished() || landmark.outstanding() == 0 {
            continue;
        }
        let Some(coin) = bag.pop() else {
            continue;
        };
        let Ok((coin_transform, mut state)) = coins.get_mut(coin) else {
            continue;
        };
        let start = coin_transform.translation;
        let spread = config.landmark.deposit_spread;
        let end = transform.translation
            + Vec3::new(
                rng.0.random_range(-spread..=spread),
                rng.0.random_range(-spread..=spread),
                0.0,
            );
        commands.entity(coin).insert(CurveFlight::new(
            start,
            arc_control(start, end, config.landmark.deposit_lift),
            end,
            config.landmark.deposit_flight_secs,
            FlightPurpose::Deposit { landmark: entity },
        ));
        state.state = CoinState::Deposited;
        landmark.in_flight += 1;
    }
    bag.set_accepting(!visiting);
}

/// Counts landed deposits and pays out the reward once the cost is met.
/// Runs in `GameSet::Loot`.
fn settle_deposits(
    config: Res<SimConfig>,
    paths: Res<Paths>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut roster: ResMut<Roster>,
    mut landed: MessageReader<FlightLanded>,
    mut landmarks: Query<(&Name, &mut Landmark), Without<Spent>>,
    mut upgrades: MessageWriter<Upgrade>,
) {
    for landing in landed.read() {
        let FlightPurpose::Deposit { landmark: entity } = landing.purpose else {
            continue;
        };
        pool.release(&mut commands, GOLD_KEY, landing.entity);
        let Ok((name, mut landmark)) = landmarks.get_mut(entity) else {
            continue;
        };
        landmark.in_flight = landmark.in_flight.saturating_sub(1);
        landmark.paid += 1;
        if landmark.paid != landmark.cost {
            continue;
        }
        commands.entity(entity).insert(Spent);
        match &landmark.reward {
            LandmarkReward::BuildTower(spec) => {
                spawn_tower(&mut commands, &mut pool, &mut roster, &config, &paths, spec, true);
            }
            LandmarkReward::Upgrade => {
                upgrades.write(Upgrade);
            }
        }
        info!("landmark `{name}` paid off");
    }
}

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Landmark>()
        .register_type::<Locked>()
        .register_type::<Spent>();
    app.add_systems(
        Update,
        (
            unlock_landmarks.in_set(GameSet::Triggers),
            (visit_landmarks, settle_deposits)
                .chain()
                .in_set(GameSet::Loot),
        )
            .run_if(gameplay_running),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::GroundPoint;
    use pretty_assertions::assert_eq;

    #[test]
    fn outstanding_counts_coins_in_flight() {
        let spec = LandmarkSpec {
            name: "Gate".into(),
            position: GroundPoint::default(),
            radius: 1.0,
            cost: 5,
            reward: LandmarkReward::Upgrade,
            unlock_level: None,
        };
        let mut landmark = Landmark::new(&spec, 0.05);
        landmark.paid = 2;
        landmark.in_flight = 2;
        assert_eq!(landmark.outstanding(), 1);
        landmark.in_flight = 4;
        assert_eq!(landmark.outstanding(), 0);
    }
}
