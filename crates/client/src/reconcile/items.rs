use std::collections::BTreeMap;

use tilefall_engine::{DrawLayer, EntityId, NodeSpec, Vec2};
use tracing::debug;

use crate::world::{topic, BusEvent, World};

/// World items carry no stable authority id; drops and removals are matched
/// by their composite label plus spatial proximity. The join is kept
/// deterministic: nearest label match within this radius, ties to the
/// lowest entity id.
pub const ITEM_MATCH_RADIUS: f32 = 1.5;

/// Unclaimed drops fade out of the world after a minute of simulation time.
pub const ITEM_TTL_MS: u64 = 60_000;

#[derive(Debug, Default)]
pub struct ItemIndex {
    labels: BTreeMap<EntityId, String>,
}

impl ItemIndex {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, entity: EntityId) -> Option<&str> {
        self.labels.get(&entity).map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &str)> {
        self.labels
            .iter()
            .map(|(entity, label)| (*entity, label.as_str()))
    }

    pub(crate) fn insert(&mut self, entity: EntityId, label: &str) {
        self.labels.insert(entity, label.to_string());
    }

    pub(crate) fn forget(&mut self, entity: EntityId) {
        self.labels.remove(&entity);
    }
}

/// Nearest item with a matching label within the match radius.
pub(crate) fn find_matching(world: &World, label: &str, position: Vec2) -> Option<EntityId> {
    let radius_sq = ITEM_MATCH_RADIUS * ITEM_MATCH_RADIUS;
    let mut best: Option<(f32, EntityId)> = None;
    for (entity, item_label) in world.items.entities() {
        if item_label != label {
            continue;
        }
        let Some(item_position) = world.scene.absolute_position(entity) else {
            continue;
        };
        let dx = item_position.x - position.x;
        let dy = item_position.y - position.y;
        let distance_sq = dx * dx + dy * dy;
        if distance_sq > radius_sq {
            continue;
        }
        let closer = match best {
            None => true,
            Some((best_sq, best_id)) => {
                distance_sq < best_sq || (distance_sq == best_sq && entity < best_id)
            }
        };
        if closer {
            best = Some((distance_sq, entity));
        }
    }
    best.map(|(_, entity)| entity)
}

/// Spawns a dropped world item unless a matching one already exists, which
/// makes replayed item-dropped events no-ops.
pub(crate) fn spawn_dropped(world: &mut World, label: &str, position: Vec2) -> Option<EntityId> {
    if let Some(existing) = find_matching(world, label, position) {
        debug!(label, entity = existing.0, "item_drop_already_present");
        return None;
    }
    let root = world.scene.root();
    let entity = world
        .scene
        .attach_new(
            root,
            NodeSpec::default()
                .with_position(position)
                .with_layer(DrawLayer::Ground),
        )
        .ok()?;
    world.items.insert(entity, label);
    let now = world.clock.now_ms();
    world.scheduler.schedule_in(now, ITEM_TTL_MS, move |world: &mut World| {
        // Entity ids are never reused, so this fires harmlessly when the
        // item was already picked apart by an item-destroyed event.
        if world.items.label(entity).is_some() {
            debug!(entity = entity.0, "item_drop_expired");
            world.destroy_entity(entity);
        }
    });
    world.publish(
        topic::ITEM_DROPPED,
        &BusEvent::ItemDropped {
            entity,
            label: label.to_string(),
        },
    );
    Some(entity)
}

/// Removes the matching world item, if any. Missing matches are silent
/// no-ops, which also makes replayed item-destroyed events harmless.
pub(crate) fn remove_dropped(world: &mut World, label: &str, position: Vec2) -> bool {
    let Some(entity) = find_matching(world, label, position) else {
        return false;
    };
    world.destroy_entity(entity);
    world.publish(
        topic::ITEM_REMOVED,
        &BusEvent::ItemRemoved {
            label: label.to_string(),
        },
    );
    true
}
