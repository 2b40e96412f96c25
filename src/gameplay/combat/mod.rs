//! Combat core: hit points, damage application, death, and projectiles.

pub mod death;
pub mod projectile;

use bevy::prelude::*;

use crate::config::SimConfig;
use crate::gameplay::Team;
use crate::gameplay::animation::Animator;
use crate::gameplay::events::{DamageRequest, Died};
use crate::gameplay::pool::Pooled;
use crate::{GameSet, gameplay_running};

// === Components ===

/// Hit points of a combatant.
///
/// `current` may go negative. Death is latched: once `is_dead` turns true it
/// never turns back, and further damage is ignored.
#[derive(Component, Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Component)]
pub struct Health {
    pub current: f32,
    pub max: f32,
    dead: bool,
}

/// Result of one damage application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Target was already dead; nothing changed.
    Ignored,
    /// Target lost hit points and lives.
    Wounded,
    /// This hit killed the target.
    Killed,
}

impl Health {
    #[must_use]
    pub const fn new(max: f32) -> Self {
        Self {
            current: max,
            max,
            dead: false,
        }
    }

    /// Refill to `max` and revive.
    pub const fn reset(&mut self, max: f32) {
        *self = Self::new(max);
    }

    /// Subtract `amount` (negative amounts count as zero).
    pub fn apply_damage(&mut self, amount: f32) -> DamageOutcome {
        if self.dead {
            return DamageOutcome::Ignored;
        }
        self.current -= amount.max(0.0);
        if self.current <= 0.0 {
            self.dead = true;
            DamageOutcome::Killed
        } else {
            DamageOutcome::Wounded
        }
    }

    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.dead
    }

    #[must_use]
    pub const fn can_be_damaged(&self) -> bool {
        !self.dead
    }

    /// Remaining fraction of hit points, clamped to `[0, 1]`.
    #[must_use]
    pub fn fill_ratio(&self) -> f32 {
        if self.max <= 0.0 {
            0.0
        } else {
            (self.current / self.max).clamp(0.0, 1.0)
        }
    }
}

/// Health bar state mirrored from `Health` for the host renderer.
#[derive(Component, Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Component)]
pub struct HealthBar {
    pub fill: f32,
    /// Shown once damaged, hidden on death.
    pub visible: bool,
}

impl Default for HealthBar {
    fn default() -> Self {
        Self {
            fill: 1.0,
            visible: false,
        }
    }
}

// === Systems ===

/// Applies queued damage. Emits `Died` for each kill.
/// Runs in `GameSet::Damage`.
fn apply_damage_requests(
    config: Res<SimConfig>,
    mut requests: MessageReader<DamageRequest>,
    mut targets: Query<(
        &mut Health,
        &Team,
        Option<&Pooled>,
        Option<&mut HealthBar>,
        Option<&mut Animator>,
    )>,
    mut died: MessageWriter<Died>,
) {
    for request in requests.read() {
        let Ok((mut health, team, pooled, bar, animator)) = targets.get_mut(request.target.entity)
        else {
            continue;
        };
        // Stale handle: the instance was recycled since the request was made.
        if !request.target.is_current(pooled) {
            continue;
        }

        let outcome = health.apply_damage(request.amount);
        if outcome == DamageOutcome::Ignored {
            continue;
        }
        if let Some(mut bar) = bar {
            bar.fill = health.fill_ratio();
            bar.visible = !health.is_dead();
        }
        if let Some(mut animator) = animator {
            animator.flinch(config.combat.flinch_secs);
        }
        if outcome == DamageOutcome::Killed {
            died.write(Died {
                entity: request.target.entity,
                team: *team,
            });
        }
    }
}

// === Plugin ===

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Health>().register_type::<HealthBar>();
    app.add_systems(
        Update,
        apply_damage_requests
            .in_set(GameSet::Damage)
            .run_if(gameplay_running),
    );
    app.add_plugins((death::plugin, projectile::plugin));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn damage_then_kill() {
        let mut health = Health::new(20.0);

        assert_eq!(health.apply_damage(12.0), DamageOutcome::Wounded);
        assert_eq!(health.current, 8.0);
        assert!(!health.is_dead());

        assert_eq!(health.apply_damage(12.0), DamageOutcome::Killed);
        assert_eq!(health.current, -4.0);
        assert!(health.is_dead());
        assert!(!health.can_be_damaged());
    }

    #[test]
    fn damage_after_death_is_ignored() {
        let mut health = Health::new(5.0);
        health.apply_damage(5.0);

        assert_eq!(health.apply_damage(100.0), DamageOutcome::Ignored);
        assert_eq!(health.current, 0.0);
    }

    #[test]
    fn hit_points_never_increase() {
        let mut health = Health::new(50.0);
        let mut previous = health.current;
        for amount in [3.0, -10.0, 0.0, 20.0, -1.0, 40.0, 7.0] {
            health.apply_damage(amount);
            assert!(health.current <= previous);
            previous = health.current;
        }
        assert!(health.is_dead());
    }

    #[test]
    fn exactly_zero_kills() {
        let mut health = Health::new(10.0);
        assert_eq!(health.apply_damage(10.0), DamageOutcome::Killed);
    }

    #[test]
    fn reset_revives() {
        let mut health = Health::new(10.0);
        health.apply_damage(15.0);
        health.reset(30.0);
        assert_eq!(health, Health::new(30.0));
        assert!(health.can_be_damaged());
    }

    #[test]
    fn fill_ratio_clamps() {
        let mut health = Health::new(40.0);
        assert_eq!(health.fill_ratio(), 1.0);
        health.apply_damage(10.0);
        assert_eq!(health.fill_ratio(), 0.75);
        health.apply_damage(100.0);
        assert_eq!(health.fill_ratio(), 0.0);
    }
}
