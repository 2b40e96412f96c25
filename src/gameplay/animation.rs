//! Animation tags: which clip a combatant is playing, plus the damage flinch.
//!
//! Clips are not rendered here. Gameplay reads and writes the tag so a host
//! renderer can mirror it, and timers elsewhere stand in for clip lengths.

use bevy::prelude::*;

use crate::{GameSet, gameplay_running};

/// Named clips shared by actors and structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Reflect)]
pub enum Clip {
    #[default]
    Idle,
    Run,
    Attack,
    Die,
    Destroy,
}

/// Current clip and flinch overlay.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Animator {
    clip: Clip,
    /// Seconds the current clip has been playing.
    pub elapsed: f32,
    /// Seconds of flinch overlay left.
    pub flinch: f32,
}

impl Animator {
    #[must_use]
    pub const fn new(clip: Clip) -> Self {
        Self {
            clip,
            elapsed: 0.0,
            flinch: 0.0,
        }
    }

    #[must_use]
    pub const fn clip(&self) -> Clip {
        self.clip
    }

    /// Switch clips. Replaying the current clip keeps its progress.
    pub fn play(&mut self, clip: Clip) {
        if self.clip != clip {
            self.clip = clip;
            self.elapsed = 0.0;
        }
    }

    pub const fn flinch(&mut self, secs: f32) {
        self.flinch = secs;
    }

    #[must_use]
    pub fn is_flinching(&self) -> bool {
        self.flinch > 0.0
    }
}

fn tick_animators(time: Res<Time>, mut animators: Query<&mut Animator>) {
    let dt = time.delta_secs();
    for mut animator in &mut animators {
        animator.elapsed += dt;
        if animator.flinch > 0.0 {
            animator.flinch = (animator.flinch - dt).max(0.0);
        }
    }
}

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Animator>();
    app.add_systems(
        Update,
        tick_animators
            .in_set(GameSet::Cleanup)
            .run_if(gameplay_running),
    );
}
