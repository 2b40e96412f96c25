//! Slot inventory carried by the player.
//!
//! Items live in exactly one of three sets: settled `items` (insertion order
//! is display order), `flying_in` or `flying_out`. Slots are a pure function
//! of an item's index, so relayout is idempotent.

use bevy::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::gameplay::events::{BagTransfer, TransferDirection};
use crate::gameplay::pool::{Dormant, ObjectPool, Pooled};
use crate::gameplay::tween::{Bounce, arc_control, quadratic_bezier};
use crate::{GameSet, gameplay_running};

// === Layout ===

/// Grid geometry and timings of a bag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Reflect)]
#[serde(default)]
pub struct BagLayout {
    pub cols: usize,
    pub rows: usize,
    pub col_sep: f32,
    pub row_sep: f32,
    pub layer_sep: f32,
    /// Layers shown before items stack on the top one.
    pub max_height: usize,
    /// Capacity is `max_height * overflow_multiple` layers.
    pub overflow_multiple: f32,
    /// Items past this count are returned to their pool on arrival.
    pub max_show: usize,
    pub fly_in_secs: f32,
    pub fly_out_secs: f32,
    /// Height the insertion curve rises above the midpoint.
    pub arc_lift: f32,
    /// Offset of slot zero from the bag anchor.
    pub save_offset: [f32; 3],
}

impl Default for BagLayout {
    fn default() -> Self {
        Self {
            cols: 2,
            rows: 2,
            col_sep: 0.3,
            row_sep: 0.3,
            layer_sep: 0.1,
            max_height: 20,
            overflow_multiple: 1.5,
            max_show: 999_999,
            fly_in_secs: 0.2,
            fly_out_secs: 0.2,
            arc_lift: 2.0,
            save_offset: [0.0, -0.6, 0.5],
        }
    }
}

impl BagLayout {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 || self.max_height == 0 || self.max_show == 0 {
            return Err(ConfigError::Invalid(
                "bag grid dimensions must be positive".into(),
            ));
        }
        if self.overflow_multiple < 1.0 {
            return Err(ConfigError::Invalid(
                "bag.overflow_multiple must be at least 1".into(),
            ));
        }
        if self.fly_in_secs < 0.0 || self.fly_out_secs < 0.0 {
            return Err(ConfigError::Invalid(
                "bag flight times must not be negative".into(),
            ));
        }
        Ok(())
    }

    const fn layer_size(&self) -> usize {
        self.cols * self.rows
    }

    /// Items that fit before the display stops growing.
    #[must_use]
    pub const fn visible_limit(&self) -> usize {
        self.max_height * self.layer_size()
    }

    /// Most items the bag accepts, counting those still flying in.
    #[must_use]
    pub fn capacity(&self) -> usize {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let capacity = (self.max_height as f32 * self.overflow_multiple * self.layer_size() as f32)
            .floor() as usize;
        capacity
    }

    /// `(column, row, layer)` of slot `index`.
    ///
    /// Indices past the visible limit stay on the top layer and keep cycling
    /// through its cells.
    #[must_use]
    pub fn cell(&self, index: usize) -> (usize, usize, usize) {
        let index = index.min(self.max_show.saturating_sub(1));
        let layer_size = self.layer_size();
        let layer = if index < self.visible_limit() {
            index / layer_size
        } else {
            self.max_height - 1
        };
        let cell = index % layer_size;
        (cell % self.cols, cell / self.cols, layer)
    }

    /// Offset of slot `index` from the bag anchor.
    #[must_use]
    pub fn slot_offset(&self, index: usize) -> Vec3 {
        let (col, row, layer) = self.cell(index);
        #[allow(clippy::cast_precision_loss)]
        let offset = Vec3::new(
            col as f32 * self.col_sep,
            -(row as f32) * self.row_sep,
            layer as f32 * self.layer_sep,
        );
        offset + Vec3::from_array(self.save_offset)
    }
}

// === Bag ===

/// Why a bag refused an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BagRejection {
    #[error("item is already held or in transit")]
    AlreadyHeld,
    #[error("item no longer exists")]
    InvalidItem,
    #[error("bag is not accepting items")]
    Closed,
    #[error("bag is full")]
    Full,
    #[error("item is not settled in the bag")]
    NotInBag,
}

/// Which set an item is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holding {
    Settled,
    FlyingIn,
    FlyingOut,
}

#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Bag {
    layout: BagLayout,
    items: Vec<Entity>,
    flying_in: Vec<Entity>,
    flying_out: Vec<Entity>,
    accepting: bool,
}

impl Bag {
    #[must_use]
    pub const fn new(layout: BagLayout) -> Self {
        Self {
            layout,
            items: Vec::new(),
            flying_in: Vec::new(),
            flying_out: Vec::new(),
            accepting: true,
        }
    }

    #[must_use]
    pub const fn layout(&self) -> &BagLayout {
        &self.layout
    }

    /// Settled items in display order.
    #[must_use]
    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    #[must_use]
    pub fn flying_in(&self) -> &[Entity] {
        &self.flying_in
    }

    #[must_use]
    pub fn flying_out(&self) -> &[Entity] {
        &self.flying_out
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub const fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    #[must_use]
    pub fn holding(&self, item: Entity) -> Option<Holding> {
        if self.items.contains(&item) {
            Some(Holding::Settled)
        } else if self.flying_in.contains(&item) {
            Some(Holding::FlyingIn)
        } else if self.flying_out.contains(&item) {
            Some(Holding::FlyingOut)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() + self.flying_in.len() >= self.layout.capacity()
    }

    /// Slot the next incoming item will take.
    #[must_use]
    pub fn free_slot(&self) -> usize {
        self.items.len() + self.flying_in.len()
    }

    fn check_add(&self, item: Entity) -> Result<(), BagRejection> {
        if self.holding(item).is_some() {
            return Err(BagRejection::AlreadyHeld);
        }
        if !self.accepting {
            return Err(BagRejection::Closed);
        }
        if self.is_full() {
            return Err(BagRejection::Full);
        }
        Ok(())
    }

    /// Reserve a slot for `item` and mark it flying in.
    pub fn begin_add(&mut self, item: Entity) -> Result<usize, BagRejection> {
        self.check_add(item)?;
        let slot = self.free_slot();
        self.flying_in.push(item);
        Ok(slot)
    }

    /// Settle an item that finished flying in. Returns `false` if it was not
    /// flying in.
    pub fn finish_add(&mut self, item: Entity) -> bool {
        let Some(index) = self.flying_in.iter().position(|&entry| entry == item) else {
            return false;
        };
        self.flying_in.remove(index);
        self.items.push(item);
        true
    }

    /// Take a settled item out and mark it flying out.
    pub fn begin_remove(&mut self, item: Entity) -> Result<(), BagRejection> {
        self.take(item)?;
        self.flying_out.push(item);
        Ok(())
    }

    /// Free an item that finished flying out. Returns `false` if it was not
    /// flying out.
    pub fn finish_remove(&mut self, item: Entity) -> bool {
        let Some(index) = self.flying_out.iter().position(|&entry| entry == item) else {
            return false;
        };
        self.flying_out.remove(index);
        true
    }

    /// Settle `item` without a flight.
    pub fn direct_add(&mut self, item: Entity) -> Result<(), BagRejection> {
        self.check_add(item)?;
        self.items.push(item);
        Ok(())
    }

    /// Take a settled item out without a flight.
    pub fn direct_remove(&mut self, item: Entity) -> Result<(), BagRejection> {
        self.take(item)
    }

    /// Take the most recently settled item out without a flight.
    pub fn pop(&mut self) -> Option<Entity> {
        self.items.pop()
    }

    fn take(&mut self, item: Entity) -> Result<(), BagRejection> {
        let index = self
            .items
            .iter()
            .position(|&entry| entry == item)
            .ok_or(BagRejection::NotInBag)?;
        self.items.remove(index);
        Ok(())
    }

    /// Drop `item` from whichever set holds it.
    pub fn forget(&mut self, item: Entity) -> Option<Holding> {
        let holding = self.holding(item)?;
        self.retain(|entry, _| entry != item);
        Some(holding)
    }

    /// Keep only entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(Entity, Holding) -> bool) -> usize {
        let before = self.items.len() + self.flying_in.len() + self.flying_out.len();
        self.items.retain(|&item| keep(item, Holding::Settled));
        self.flying_in.retain(|&item| keep(item, Holding::FlyingIn));
        self.flying_out.retain(|&item| keep(item, Holding::FlyingOut));
        before - (self.items.len() + self.flying_in.len() + self.flying_out.len())
    }

    /// Abandon every transfer in progress.
    pub fn cancel_transfers(&mut self) -> Vec<Entity> {
        let mut cancelled = std::mem::take(&mut self.flying_in);
        cancelled.append(&mut self.flying_out);
        cancelled
    }

    /// Slot offset and visibility of every settled item.
    #[must_use]
    pub fn arrangement(&self) -> Vec<(Entity, Vec3, bool)> {
        let visible_limit = self.layout.visible_limit();
        self.items
            .iter()
            .enumerate()
            .map(|(index, &item)| (item, self.layout.slot_offset(index), index < visible_limit))
            .collect()
    }
}

// === Flights ===

/// An item flying into or out of a bag.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct BagFlight {
    pub bag: Entity,
    pub direction: TransferDirection,
    pub start: Vec3,
    /// Slot reserved for an insertion. The end point follows the bag.
    pub slot: usize,
    /// End point of a removal.
    pub destination: Vec3,
    /// Offset added to the control point.
    pub jitter: Vec3,
    /// Spin about the vertical axis, radians per second.
    pub spin: f32,
    pub elapsed: f32,
    pub duration: f32,
}

impl BagFlight {
    fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }
}

/// Send `item` flying from `from` into the bag.
///
/// A refusal is reported as a failed `BagTransfer` and returned.
pub fn send_to_bag(
    commands: &mut Commands,
    transfers: &mut MessageWriter<BagTransfer>,
    bag_entity: Entity,
    bag: &mut Bag,
    item: Entity,
    from: Vec3,
) -> Result<usize, BagRejection> {
    let result = match commands.get_entity(item) {
        Ok(_) => bag.begin_add(item),
        Err(_) => Err(BagRejection::InvalidItem),
    };
    match result {
        Ok(slot) => {
            commands.entity(item).insert(BagFlight {
                bag: bag_entity,
                direction: TransferDirection::In,
                start: from,
                slot,
                destination: Vec3::ZERO,
                jitter: Vec3::ZERO,
                spin: 0.0,
                elapsed: 0.0,
                duration: bag.layout().fly_in_secs,
            });
        }
        Err(_) => {
            transfers.write(BagTransfer {
                bag: bag_entity,
                item,
                direction: TransferDirection::In,
                success: false,
            });
        }
    }
    result
}

/// Send a settled item flying from `from` to `destination`.
///
/// With `scatter`, the flight ends at a random point within 1 unit of the
/// destination, its control point is jittered by up to 1 unit on the ground
/// plane, and the item spins.
pub fn take_from_bag(
    commands: &mut Commands,
    transfers: &mut MessageWriter<BagTransfer>,
    bag_entity: Entity,
    bag: &mut Bag,
    item: Entity,
    from: Vec3,
    destination: Vec3,
    scatter: Option<&mut impl Rng>,
) -> Result<(), BagRejection> {
    if let Err(rejection) = bag.begin_remove(item) {
        transfers.write(BagTransfer {
            bag: bag_entity,
            item,
            direction: TransferDirection::Out,
            success: false,
        });
        return Err(rejection);
    }
    let (destination, jitter, spin) = match scatter {
        Some(rng) => {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            let radius = rng.random_range(0.0..=1.0_f32);
            let landing = destination + Vec3::new(angle.cos(), angle.sin(), 0.0) * radius;
            let jitter = Vec3::new(rng.random_range(-1.0..=1.0), rng.random_range(-1.0..=1.0), 0.0);
            (landing, jitter, std::f32::consts::TAU)
        }
        None => (destination, Vec3::ZERO, 0.0),
    };
    commands.entity(item).insert(BagFlight {
        bag: bag_entity,
        direction: TransferDirection::Out,
        start: from,
        slot: 0,
        destination,
        jitter,
        spin,
        elapsed: 0.0,
        duration: bag.layout().fly_out_secs,
    });
    Ok(())
}

// === Systems ===

/// Moves items along their bag flights and settles or frees them on arrival.
/// Runs in `GameSet::Loot`.
fn advance_bag_flights(
    time: Res<Time>,
    mut commands: Commands,
    mut pool: ResMut<ObjectPool>,
    mut bags: Query<(&mut Bag, &Transform)>,
    mut flights: Query<(Entity, &mut BagFlight, &mut Transform, Option<&Pooled>), Without<Bag>>,
    mut transfers: MessageWriter<BagTransfer>,
) {
    let dt = time.delta_secs();
    for (item, mut flight, mut transform, pooled) in &mut flights {
        let Ok((mut bag, anchor)) = bags.get_mut(flight.bag) else {
            commands.entity(item).remove::<BagFlight>();
            continue;
        };
        flight.elapsed += dt;
        let t = flight.progress();
        let end = match flight.direction {
            TransferDirection::In => anchor.transform_point(bag.layout().slot_offset(flight.slot)),
            TransferDirection::Out => flight.destination,
        };
        let control = arc_control(flight.start, end, bag.layout().arc_lift) + flight.jitter;
        transform.translation = quadratic_bezier(t, flight.start, control, end);
        if flight.spin != 0.0 {
            transform.rotate_z(flight.spin * dt);
        }
        if t < 1.0 {
            continue;
        }

        commands.entity(item).remove::<BagFlight>();
        let landed = match flight.direction {
            TransferDirection::In => bag.finish_add(item),
            TransferDirection::Out => bag.finish_remove(item),
        };
        if !landed {
            continue;
        }
        commands.entity(item).insert(Bounce::default());
        transfers.write(BagTransfer {
            bag: flight.bag,
            item,
            direction: flight.direction,
            success: true,
        });
        if flight.direction == TransferDirection::In && bag.len() > bag.layout().max_show {
            bag.forget(item);
            match pooled {
                Some(pooled) => {
                    pool.release(&mut commands, pooled.key, item);
                }
                None => commands.entity(item).despawn(),
            }
        }
    }
}

/// Places settled items in their slots relative to the bag anchor.
/// Runs in `GameSet::Loot`, after flights.
fn layout_bags(
    bags: Query<(&Bag, &Transform)>,
    mut items: Query<(&mut Transform, Option<&mut Visibility>), Without<Bag>>,
) {
    for (bag, anchor) in &bags {
        for (item, offset, visible) in bag.arrangement() {
            let Ok((mut transform, visibility)) = items.get_mut(item) else {
                continue;
            };
            transform.translation = anchor.transform_point(offset);
            if let Some(mut visibility) = visibility {
                visibility.set_if_neq(if visible {
                    Visibility::Inherited
                } else {
                    Visibility::Hidden
                });
            }
        }
    }
}

/// Drops entries whose item is gone or back in its pool, and transit
/// entries whose flight was stripped.
/// Runs in `GameSet::Cleanup`.
fn prune_bags(mut bags: Query<&mut Bag>, items: Query<(Has<BagFlight>, Has<Dormant>)>) {
    for mut bag in &mut bags {
        let dropped = bag.retain(|item, holding| {
            items.get(item).is_ok_and(|(in_flight, dormant)| {
                !dormant && (holding == Holding::Settled || in_flight)
            })
        });
        if dropped > 0 {
            debug!("dropped {dropped} stale bag entries");
        }
    }
}

pub(super) fn plugin(app: &mut App) {
    app.register_type::<Bag>().register_type::<BagFlight>();
    app.add_systems(
        Update,
        (
            (advance_bag_flights, layout_bags)
                .chain()
                .in_set(GameSet::Loot),
            prune_bags.in_set(GameSet::Cleanup),
        )
            .run_if(gameplay_running),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entity(index: u32) -> Entity {
        Entity::from_raw_u32(index).unwrap()
    }

    fn small_layout() -> BagLayout {
        BagLayout {
            cols: 2,
            rows: 2,
            col_sep: 1.0,
            row_sep: 1.0,
            layer_sep: 0.1,
            max_height: 2,
            overflow_multiple: 1.5,
            save_offset: [0.0; 3],
            ..BagLayout::default()
        }
    }

    #[test]
    fn fifth_item_opens_second_layer() {
        let layout = small_layout();
        assert_eq!(layout.cell(4), (0, 0, 1));
        assert_eq!(layout.cell(3), (1, 1, 0));
        let offset = layout.slot_offset(4);
        assert!((offset - Vec3::new(0.0, 0.0, 0.1)).length() < 1e-6);
    }

    #[test]
    fn overflow_stacks_on_top_layer() {
        let layout = small_layout();
        // Visible limit is 8; index 9 cycles to cell 1 on layer 1.
        assert_eq!(layout.cell(9), (1, 0, 1));
        assert_eq!(layout.cell(12), (0, 0, 1));
    }

    #[test]
    fn index_is_clipped_to_max_show() {
        let layout = BagLayout {
            max_show: 3,
            ..small_layout()
        };
        assert_eq!(layout.cell(10), layout.cell(2));
    }

    #[test]
    fn capacity_counts_overflow_layers() {
        assert_eq!(small_layout().capacity(), 12);
        assert_eq!(BagLayout::default().capacity(), 120);
    }

    #[test]
    fn add_is_refused_when_full() {
        let mut bag = Bag::new(BagLayout {
            max_height: 1,
            overflow_multiple: 1.0,
            cols: 1,
            rows: 2,
            ..small_layout()
        });
        assert_eq!(bag.direct_add(entity(1)), Ok(()));
        assert_eq!(bag.begin_add(entity(2)), Ok(1));
        assert_eq!(bag.begin_add(entity(3)), Err(BagRejection::Full));
        assert!(bag.finish_add(entity(2)));
        assert_eq!(bag.items(), &[entity(1), entity(2)]);
    }

    #[test]
    fn item_is_never_held_twice() {
        let mut bag = Bag::new(small_layout());
        assert_eq!(bag.begin_add(entity(1)), Ok(0));
        assert_eq!(bag.begin_add(entity(1)), Err(BagRejection::AlreadyHeld));
        assert_eq!(bag.direct_add(entity(1)), Err(BagRejection::AlreadyHeld));
        assert!(bag.finish_add(entity(1)));
        assert!(!bag.finish_add(entity(1)));

        bag.begin_remove(entity(1)).unwrap();
        assert_eq!(bag.begin_remove(entity(1)), Err(BagRejection::NotInBag));
        assert_eq!(bag.begin_add(entity(1)), Err(BagRejection::AlreadyHeld));
        assert!(bag.finish_remove(entity(1)));
        assert_eq!(bag.holding(entity(1)), None);
    }

    #[test]
    fn closed_bag_refuses_items() {
        let mut bag = Bag::new(small_layout());
        bag.set_accepting(false);
        assert_eq!(bag.begin_add(entity(1)), Err(BagRejection::Closed));
        bag.set_accepting(true);
        assert_eq!(bag.begin_add(entity(1)), Ok(0));
    }

    #[test]
    fn free_slot_counts_items_in_flight() {
        let mut bag = Bag::new(small_layout());
        bag.direct_add(entity(1)).unwrap();
        bag.begin_add(entity(2)).unwrap();
        assert_eq!(bag.free_slot(), 2);
    }

    #[test]
    fn removal_compacts_the_arrangement() {
        let mut bag = Bag::new(small_layout());
        for index in 1..=3 {
            bag.direct_add(entity(index)).unwrap();
        }
        bag.direct_remove(entity(1)).unwrap();

        let arrangement = bag.arrangement();
        assert_eq!(arrangement[0].0, entity(2));
        assert_eq!(arrangement[0].1, bag.layout().slot_offset(0));
        assert_eq!(arrangement, bag.arrangement());
    }

    #[test]
    fn items_past_visible_limit_are_hidden() {
        let mut bag = Bag::new(small_layout());
        for index in 1..=10 {
            bag.direct_add(entity(index)).unwrap();
        }
        let hidden: Vec<Entity> = bag
            .arrangement()
            .into_iter()
            .filter(|(_, _, visible)| !visible)
            .map(|(item, _, _)| item)
            .collect();
        assert_eq!(hidden, vec![entity(9), entity(10)]);
    }

    #[test]
    fn cancel_clears_transit_sets_only() {
        let mut bag = Bag::new(small_layout());
        bag.direct_add(entity(1)).unwrap();
        bag.direct_add(entity(2)).unwrap();
        bag.begin_add(entity(3)).unwrap();
        bag.begin_remove(entity(2)).unwrap();

        let mut cancelled = bag.cancel_transfers();
        cancelled.sort();
        assert_eq!(cancelled.len(), 2);
        assert_eq!(bag.items(), &[entity(1)]);
        assert!(bag.flying_in().is_empty());
        assert!(bag.flying_out().is_empty());
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        let layout = BagLayout {
            cols: 0,
            ..BagLayout::default()
        };
        assert!(layout.validate().is_err());
        assert!(BagLayout::default().validate().is_ok());
    }
}
