use std::collections::BTreeSet;

use rand::Rng;
use tilefall_engine::{nearest_in_box, EntityId, RangeBox, Vec2};
use tracing::debug;

use super::skill::{effectiveness, SkillType};
use super::unit::{EquipSlot, Equipment, HeroId};
use crate::world::{topic, BusEvent, World};

/// Target scans run at most once per 100 ms of simulation time.
pub const SCAN_INTERVAL_MS: u64 = 100;
/// Each attacker fires at most once per 1000 ms of simulation time.
pub const ATTACK_INTERVAL_MS: u64 = 1000;
/// Half-width of the axis-aligned targeting box, in grid cells.
pub const TARGET_BOX_HALF_EXTENT: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttackOutcome {
    NotReady,
    NoTarget,
    StaleTarget,
    Hit { damage: f32 },
    Destroyed { damage: f32 },
}

/// Per-entity combat step, called from the world's traversal. Idle deployed
/// units scan for a target; engaged units try to attack.
pub(crate) fn step_unit(world: &mut World, entity: EntityId) {
    let Some(unit) = world.units.get(&entity) else {
        return;
    };
    if !unit.deployed {
        return;
    }
    if unit.targeting.is_empty() {
        try_scan(world, entity);
    } else {
        try_attack(world, entity, None);
    }
}

fn try_scan(world: &mut World, entity: EntityId) {
    let now = world.clock.now_ms();
    let (scanning_enemy, last_scan_at) = match world.units.get(&entity) {
        Some(unit) => (unit.enemy, unit.last_scan_at),
        None => return,
    };
    if let Some(last) = last_scan_at {
        if now.saturating_sub(last) < SCAN_INTERVAL_MS {
            return;
        }
    }
    if let Some(unit) = world.units.get_mut(&entity) {
        unit.last_scan_at = Some(now);
    }

    let Some(center) = world.scene.absolute_position(entity) else {
        return;
    };
    let range = RangeBox::around(center, TARGET_BOX_HALF_EXTENT);
    let candidates: Vec<(EntityId, Vec2)> = world
        .units
        .iter()
        .filter(|(other, unit)| {
            **other != entity && unit.deployed && unit.enemy != scanning_enemy
        })
        .filter_map(|(other, _)| {
            world
                .scene
                .absolute_position(*other)
                .map(|position| (*other, position))
        })
        .collect();

    if let Some((target, _)) = nearest_in_box(range, candidates) {
        engage_mutual(world, entity, target);
    }
}

/// Symmetrically records the engagement on both units: each targets the
/// other and knows it is targeted back, and both transition to Engaged.
pub fn engage_mutual(world: &mut World, a: EntityId, b: EntityId) -> bool {
    if a == b || !world.units.contains_key(&a) || !world.units.contains_key(&b) {
        return false;
    }
    if let Some(unit) = world.units.get_mut(&a) {
        unit.targeting.insert(b);
        unit.targeted_by.insert(b);
    }
    if let Some(unit) = world.units.get_mut(&b) {
        unit.targeting.insert(a);
        unit.targeted_by.insert(a);
    }
    debug!(a = a.0, b = b.0, "engagement_started");
    true
}

pub fn disengage_pair(world: &mut World, a: EntityId, b: EntityId) {
    if let Some(unit) = world.units.get_mut(&a) {
        unit.targeting.remove(&b);
        unit.targeted_by.remove(&b);
    }
    if let Some(unit) = world.units.get_mut(&b) {
        unit.targeting.remove(&a);
        unit.targeted_by.remove(&a);
    }
}

/// Attempts one attack against the attacker's first target. `forced_slot`
/// carries a player-selected slot; autonomous attacks pick a random
/// equipped slot. Both paths resolve through the same damage law.
pub fn try_attack(
    world: &mut World,
    attacker: EntityId,
    forced_slot: Option<EquipSlot>,
) -> AttackOutcome {
    let now = world.clock.now_ms();
    let Some(unit) = world.units.get(&attacker) else {
        return AttackOutcome::NoTarget;
    };
    if !unit.deployed {
        return AttackOutcome::NoTarget;
    }
    if let Some(last) = unit.last_attack_at {
        if now.saturating_sub(last) < ATTACK_INTERVAL_MS {
            return AttackOutcome::NotReady;
        }
    }
    let Some(target) = unit.targeting.iter().next().copied() else {
        return AttackOutcome::NoTarget;
    };

    let in_range = match (
        world.scene.absolute_position(attacker),
        world.scene.absolute_position(target),
    ) {
        (Some(center), Some(position)) => {
            RangeBox::around(center, TARGET_BOX_HALF_EXTENT).contains(position)
        }
        _ => false,
    };
    let reciprocal = world
        .units
        .get(&target)
        .is_some_and(|unit| unit.deployed && unit.targeting.contains(&attacker));

    if !in_range || !reciprocal {
        // Stale target: abort the attack and treat it as an implicit
        // untarget. Non-fatal.
        debug!(
            attacker = attacker.0,
            target = target.0,
            in_range,
            reciprocal,
            "attack_aborted_stale_target"
        );
        disengage_pair(world, attacker, target);
        return AttackOutcome::StaleTarget;
    }

    if let Some(unit) = world.units.get_mut(&attacker) {
        unit.last_attack_at = Some(now);
    }
    resolve_hit(world, attacker, target, forced_slot)
}

fn choose_slot(world: &mut World, attacker: EntityId) -> Option<EquipSlot> {
    let slots = world.units.get(&attacker)?.equipped_slots();
    if slots.is_empty() {
        return None;
    }
    let index = world.rng.gen_range(0..slots.len());
    Some(slots[index])
}

/// damage = attacker level x slot multiplier (default 1) x type
/// effectiveness. Unarmed attacks carry no skill and resolve neutrally.
pub fn attack_damage(
    level: u32,
    equipment: Option<Equipment>,
    defender_skill: Option<SkillType>,
) -> f32 {
    let multiplier = equipment.map_or(1.0, |equipment| equipment.damage_multiplier);
    let type_multiplier = match (equipment.map(|equipment| equipment.skill), defender_skill) {
        (Some(attack_skill), Some(defense_skill)) => effectiveness(attack_skill, defense_skill),
        _ => 1.0,
    };
    level as f32 * multiplier * type_multiplier
}

fn resolve_hit(
    world: &mut World,
    attacker: EntityId,
    target: EntityId,
    forced_slot: Option<EquipSlot>,
) -> AttackOutcome {
    let slot = forced_slot.or_else(|| choose_slot(world, attacker));
    let (level, equipment, winner_hero_id) = match world.units.get(&attacker) {
        Some(unit) => (
            unit.level,
            slot.and_then(|slot| unit.equipped(slot)),
            unit.owner,
        ),
        None => return AttackOutcome::NoTarget,
    };
    let defender_skill = world
        .units
        .get(&target)
        .and_then(|unit| unit.defense_skill());
    let damage = attack_damage(level, equipment, defender_skill);

    let remaining = match world.units.get_mut(&target) {
        Some(unit) => unit.apply_damage(damage),
        None => return AttackOutcome::NoTarget,
    };
    debug!(
        attacker = attacker.0,
        target = target.0,
        damage,
        remaining,
        "attack_hit"
    );

    if remaining <= 0.0 {
        destroy_unit(world, target, winner_hero_id);
        AttackOutcome::Destroyed { damage }
    } else {
        AttackOutcome::Hit { damage }
    }
}

/// Terminal transition: the unit is marked undeployed, every mutual target
/// link on both sides is cleared, its subtree is destroyed, and the
/// destroyed notification is published for reward distribution.
pub fn destroy_unit(world: &mut World, victim: EntityId, winner_hero_id: Option<HeroId>) {
    let (remote_id, level, partners) = match world.units.get(&victim) {
        Some(unit) => {
            let partners: BTreeSet<EntityId> = unit
                .targeting
                .iter()
                .chain(unit.targeted_by.iter())
                .copied()
                .collect();
            (unit.remote_id, unit.level, partners)
        }
        None => return,
    };
    for partner in partners {
        disengage_pair(world, victim, partner);
    }
    if let Some(unit) = world.units.get_mut(&victim) {
        unit.deployed = false;
    }
    world.destroy_entity(victim);
    world.publish(
        topic::UNIT_DESTROYED,
        &BusEvent::UnitDestroyed {
            remote_id,
            level,
            winner_hero_id,
        },
    );
}
