//! Death transition: play the death clip, then recycle or despawn.

use bevy::prelude::*;

use crate::config::SimConfig;
use crate::gameplay::animation::{Animator, Clip};
use crate::gameplay::building::Structure;
use crate::gameplay::events::Died;
use crate::gameplay::pool::{ObjectPool, Pooled};
use crate::{GameSet, gameplay_running};

/// `SystemSet` for the start of the death transition. Systems that react to
/// a death (loot, rewards, target-list cleanup) order against this.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeathCheck;

/// Death clip in progress. The entity is inert until the timer runs out.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Dying {
    pub timer: Timer,
}

impl Dying {
    #[must_use]
    pub fn new(secs: f32) -> Self {
        Self {
            timer: Timer::from_seconds(secs, TimerMode::Once),
        }
    }
}

/// Starts the death clip for every combatant that died this tick.
fn begin_dying(
    config: Res<SimConfig>,
    mut commands: Commands,
    mut died: MessageReader<Died>,
    mut victims: Query<(Has<Structure>, Option<&mut Animator>), Without<Dying>>,
) {
    for death in died.read() {
        let Ok((is_structure, animator)) = victims.get_mut(death.entity) else {
            continue;
        };
        let (clip, secs) = if is_structure {
            (Clip::Destroy, config.combat.destroy_secs)
        } else {
            (Clip::Die, config.combat.death_secs)
        };
        if let Some(mut animator) = animator {
            animator.play(clip);
        }
        commands.entity(death.entity).insert(Dying::new(secs));
    }
}

/// Returns pooled bodies to their pool and despawns the rest once the clip ends.
fn finish_dying(
    time: Res<Time>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut dying: Query<(Entity, &mut Dying, Option<&Pooled>)>,
) {
    for (entity, mut dying, pooled) in &mut dying {
        dying.timer.tick(time.delta());
        if !dying.timer.just_finished() {
            continue;
        }
        match pooled {
            Some(pooled) => {
                pool.release(&mut commands, pooled.key, entity);
            }
            None => commands.entity(entity).despawn(),
        }
    }
}

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Dying>();
    app.add_systems(
        Update,
        (
            finish_dying,
            begin_dying.in_set(DeathCheck),
        )
            .chain()
            .in_set(GameSet::Death)
            .run_if(gameplay_running),
    );
}
