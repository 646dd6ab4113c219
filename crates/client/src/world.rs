use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use rand::SeedableRng;
use rand_pcg::Pcg32;
use tilefall_engine::{
    dispatch, EntityId, EventBus, NodeSpec, SceneError, SceneGraph, Scheduler, SimClock, Vec2,
};
use tracing::{debug, info};

use crate::combat::engage;
use crate::combat::unit::{CombatUnit, Equipment, HeroId, UnitPreset, EQUIP_SLOTS};
use crate::net::wire::{EquipmentRecord, HeroSummary, UnitRecord, WirePosition};
use crate::reconcile::chat::Transcript;
use crate::reconcile::items::ItemIndex;
use crate::reconcile::party::PartyRoster;
use crate::reconcile::purchases::PurchaseLedger;

const EXPERIENCE_PER_LEVEL: u64 = 25;

pub mod topic {
    pub const UNIT_DEPLOYED: &str = "unit-deployed";
    pub const UNIT_RECALLED: &str = "unit-recalled";
    pub const UNIT_DESTROYED: &str = "unit-destroyed";
    pub const CHAT_POSTED: &str = "chat-posted";
    pub const ITEM_DROPPED: &str = "item-dropped";
    pub const ITEM_REMOVED: &str = "item-removed";
    pub const PARTY_CHANGED: &str = "party-changed";
    pub const PURCHASE_CONFIRMED: &str = "purchase-confirmed";
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    UnitDeployed {
        entity: EntityId,
        remote_id: i64,
        owner: Option<HeroId>,
    },
    UnitRecalled {
        remote_id: i64,
        owner: Option<HeroId>,
    },
    UnitDestroyed {
        remote_id: i64,
        level: u32,
        winner_hero_id: Option<HeroId>,
    },
    ChatPosted {
        hero_id: HeroId,
        text: String,
    },
    ItemDropped {
        entity: EntityId,
        label: String,
    },
    ItemRemoved {
        label: String,
    },
    PartyChanged {
        member_count: usize,
    },
    PurchaseConfirmed {
        purchase_id: i64,
        item_label: String,
        price: u32,
    },
}

#[derive(Debug, Clone)]
pub struct HeroProfile {
    pub hero_id: HeroId,
    pub name: String,
    pub map: String,
    pub speed: f32,
}

#[derive(Debug)]
pub struct HeroState {
    pub entity: EntityId,
    pub name: String,
    pub speed: f32,
    pub map: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewardLedger {
    pub experience: u64,
    pub victories: u32,
}

/// The whole client-side simulation context: scene graph, event bus, clock,
/// scheduler, RNG and every piece of reconciled game state, passed
/// explicitly instead of living in module globals.
pub struct World {
    pub scene: SceneGraph,
    pub bus: EventBus<World, BusEvent>,
    pub clock: SimClock,
    pub scheduler: Scheduler<World>,
    pub rng: Pcg32,
    pub units: BTreeMap<EntityId, CombatUnit>,
    pub heroes: BTreeMap<HeroId, HeroState>,
    pub items: ItemIndex,
    pub transcript: Transcript,
    pub party: PartyRoster,
    pub purchases: PurchaseLedger,
    pub rewards: RewardLedger,
    pub local: HeroProfile,
    unit_by_remote: HashMap<i64, EntityId>,
    local_hero_entity: EntityId,
    next_ephemeral_remote_id: i64,
}

impl World {
    pub fn new(profile: HeroProfile, seed: u64) -> Self {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let local_hero_entity = scene
            .attach_new(root, NodeSpec::default().with_solid(true))
            .expect("root exists at construction");

        let mut world = Self {
            scene,
            bus: EventBus::new(),
            clock: SimClock::new(),
            scheduler: Scheduler::new(),
            rng: Pcg32::seed_from_u64(seed),
            units: BTreeMap::new(),
            heroes: BTreeMap::new(),
            items: ItemIndex::default(),
            transcript: Transcript::new(),
            party: PartyRoster::new(),
            purchases: PurchaseLedger::default(),
            rewards: RewardLedger::default(),
            local: profile,
            unit_by_remote: HashMap::new(),
            local_hero_entity,
            next_ephemeral_remote_id: -1,
        };
        world.heroes.insert(
            world.local.hero_id,
            HeroState {
                entity: local_hero_entity,
                name: world.local.name.clone(),
                speed: world.local.speed,
                map: world.local.map.clone(),
            },
        );
        world.install_reward_subscription();
        world
    }

    /// Reward distribution has exactly one path: the destroyed notification
    /// on the bus, whether the kill happened locally or arrived replayed
    /// from the authority.
    fn install_reward_subscription(&mut self) {
        let owner = self.local_hero_entity;
        self.bus.subscribe(
            topic::UNIT_DESTROYED,
            owner,
            |world: &mut World, event: &BusEvent| {
                if let BusEvent::UnitDestroyed {
                    winner_hero_id: Some(winner),
                    level,
                    ..
                } = event
                {
                    if *winner == world.local.hero_id {
                        world.grant_victory_reward(*level);
                    }
                }
            },
        );
    }

    pub fn local_hero_entity(&self) -> EntityId {
        self.local_hero_entity
    }

    pub fn hero_entity(&self, hero_id: HeroId) -> Option<EntityId> {
        self.heroes.get(&hero_id).map(|hero| hero.entity)
    }

    pub fn unit_entity_by_remote(&self, remote_id: i64) -> Option<EntityId> {
        self.unit_by_remote.get(&remote_id).copied()
    }

    /// Client-only objects get negative, never-reused remote ids.
    pub fn alloc_ephemeral_remote_id(&mut self) -> i64 {
        let id = self.next_ephemeral_remote_id;
        self.next_ephemeral_remote_id = self.next_ephemeral_remote_id.saturating_sub(1);
        id
    }

    pub fn publish(&mut self, event_name: &str, event: &BusEvent) -> usize {
        let handlers = self.bus.handlers_for(event_name);
        dispatch(handlers, event_name, self, event)
    }

    /// Destroys the subtree and removes every bus subscription and side-table
    /// entry owned by any destroyed node, before anything becomes
    /// unreachable.
    pub fn destroy_entity(&mut self, id: EntityId) -> Vec<EntityId> {
        let destroyed = self.scene.destroy(id);
        for entity in &destroyed {
            self.bus.unsubscribe_owner(*entity);
            if let Some(unit) = self.units.remove(entity) {
                self.unit_by_remote.remove(&unit.remote_id);
            }
            self.items.forget(*entity);
            self.heroes.retain(|_, hero| hero.entity != *entity);
        }
        destroyed
    }

    pub fn spawn_unit(
        &mut self,
        parent: EntityId,
        local_position: Vec2,
        unit: CombatUnit,
    ) -> Result<EntityId, SceneError> {
        let entity = self.scene.attach_new(
            parent,
            NodeSpec::default()
                .with_position(local_position)
                .with_solid(true),
        )?;
        self.unit_by_remote.insert(unit.remote_id, entity);
        self.units.insert(entity, unit);
        Ok(entity)
    }

    pub fn spawn_npc(&mut self, preset_name: &str, position: Vec2) -> Option<EntityId> {
        let preset = UnitPreset::by_name(preset_name)?;
        let remote_id = self.alloc_ephemeral_remote_id();
        let unit = CombatUnit::from_preset(remote_id, None, &preset);
        self.spawn_unit(self.scene.root(), position, unit).ok()
    }

    /// One fixed step: advance the clock, fire due scheduler tasks, then
    /// walk the traversal firing one-shot readies and the per-unit combat
    /// step.
    pub fn step(&mut self, fixed_dt: Duration) {
        self.clock.advance(fixed_dt);
        let due = self.scheduler.take_due(self.clock.now_ms());
        for task in due {
            task(self);
        }

        for entity in self.scene.step_order() {
            if !self.scene.contains(entity) {
                // Destroyed earlier in this same step pass.
                continue;
            }
            if self.scene.fire_ready(entity) {
                self.on_entity_ready(entity);
            }
            engage::step_unit(self, entity);
        }
    }

    fn on_entity_ready(&mut self, entity: EntityId) {
        if let Some(unit) = self.units.get(&entity) {
            debug!(
                entity = entity.0,
                remote_id = unit.remote_id,
                "unit_entity_ready"
            );
        }
    }

    pub fn grant_victory_reward(&mut self, defeated_level: u32) {
        self.rewards.experience = self
            .rewards
            .experience
            .saturating_add(u64::from(defeated_level).saturating_mul(EXPERIENCE_PER_LEVEL));
        self.rewards.victories = self.rewards.victories.saturating_add(1);
        info!(
            defeated_level,
            experience = self.rewards.experience,
            victories = self.rewards.victories,
            "victory_reward_granted"
        );
    }

    /// The poll request payload: how this client reports itself.
    pub fn local_summary(&self) -> HeroSummary {
        let position = self
            .scene
            .absolute_position(self.local_hero_entity)
            .unwrap_or_default();
        let units = self
            .units
            .iter()
            .filter(|(_, unit)| unit.owner == Some(self.local.hero_id))
            .filter_map(|(entity, _)| self.unit_record(*entity))
            .collect();
        HeroSummary {
            id: self.local.hero_id,
            name: self.local.name.clone(),
            position: WirePosition {
                x: position.x,
                y: position.y,
            },
            speed: self.local.speed,
            map: self.local.map.clone(),
            units,
        }
    }

    pub fn unit_record(&self, entity: EntityId) -> Option<UnitRecord> {
        let unit = self.units.get(&entity)?;
        let position = self.scene.absolute_position(entity)?;
        Some(UnitRecord {
            id: unit.remote_id,
            owner_hero_id: unit.owner,
            level: unit.level,
            hit_points: unit.hit_points,
            max_hit_points: unit.max_hit_points,
            position: WirePosition {
                x: position.x,
                y: position.y,
            },
            deployed: unit.deployed,
            enemy: unit.enemy,
            loadout: loadout_to_records(&unit.loadout),
        })
    }

    /// Recursively destroys the scene graph, cascading subscription removal.
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        let root = self.scene.root();
        let destroyed = self.destroy_entity(root);
        info!(
            destroyed = destroyed.len(),
            remaining_subscriptions = self.bus.subscription_count(),
            "world_teardown"
        );
    }
}

pub fn loadout_from_records(records: &[EquipmentRecord]) -> [Option<Equipment>; 4] {
    let mut loadout = [None, None, None, None];
    for record in records {
        loadout[record.slot.index()] = Some(Equipment {
            skill: record.skill,
            damage_multiplier: record.damage_multiplier,
        });
    }
    loadout
}

pub fn loadout_to_records(loadout: &[Option<Equipment>; 4]) -> Vec<EquipmentRecord> {
    EQUIP_SLOTS
        .into_iter()
        .filter_map(|slot| {
            loadout[slot.index()].map(|equipment| EquipmentRecord {
                slot,
                skill: equipment.skill,
                damage_multiplier: equipment.damage_multiplier,
            })
        })
        .collect()
}

pub fn unit_from_record(record: &UnitRecord, owner: Option<HeroId>) -> CombatUnit {
    CombatUnit {
        remote_id: record.id,
        owner,
        level: record.level,
        hit_points: record.hit_points.min(record.max_hit_points).max(0.0),
        max_hit_points: record.max_hit_points,
        loadout: loadout_from_records(&record.loadout),
        deployed: record.deployed,
        enemy: record.enemy,
        targeting: Default::default(),
        targeted_by: Default::default(),
        last_attack_at: None,
        last_scan_at: None,
    }
}

#[cfg(test)]
pub(crate) fn test_world() -> World {
    World::new(
        HeroProfile {
            hero_id: 1,
            name: "tester".to_string(),
            map: "proving-grounds".to_string(),
            speed: 2.5,
        },
        7,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::skill::SkillType;

    fn npc_at(world: &mut World, preset: &str, x: f32, y: f32) -> EntityId {
        world.spawn_npc(preset, Vec2::new(x, y)).expect("preset spawns")
    }

    #[test]
    fn destroying_a_unit_clears_its_side_tables_and_subscriptions() {
        let mut world = test_world();
        let raider = npc_at(&mut world, "raider", 1.0, 1.0);
        world
            .bus
            .subscribe(topic::CHAT_POSTED, raider, |_: &mut World, _| {});
        let remote_id = world.units[&raider].remote_id;

        world.destroy_entity(raider);

        assert!(!world.units.contains_key(&raider));
        assert_eq!(world.unit_entity_by_remote(remote_id), None);
        assert_eq!(world.bus.subscription_count_for(topic::CHAT_POSTED), 0);
    }

    #[test]
    fn destroying_a_parent_cascades_over_child_subscriptions() {
        let mut world = test_world();
        let parent = world
            .scene
            .attach_new(world.scene.root(), NodeSpec::default())
            .expect("parent");
        let child = world
            .scene
            .attach_new(parent, NodeSpec::default())
            .expect("child");
        world
            .bus
            .subscribe(topic::ITEM_DROPPED, child, |_: &mut World, _| {});

        let destroyed = world.destroy_entity(parent);

        assert_eq!(destroyed, vec![child, parent]);
        assert_eq!(world.bus.subscription_count_for(topic::ITEM_DROPPED), 0);
    }

    #[test]
    fn destroyed_notification_rewards_the_winning_local_hero() {
        let mut world = test_world();
        world.publish(
            topic::UNIT_DESTROYED,
            &BusEvent::UnitDestroyed {
                remote_id: 50,
                level: 4,
                winner_hero_id: Some(1),
            },
        );
        assert_eq!(world.rewards.experience, 100);
        assert_eq!(world.rewards.victories, 1);

        // Somebody else's kill grants nothing.
        world.publish(
            topic::UNIT_DESTROYED,
            &BusEvent::UnitDestroyed {
                remote_id: 51,
                level: 9,
                winner_hero_id: Some(2),
            },
        );
        assert_eq!(world.rewards.victories, 1);
    }

    #[test]
    fn ephemeral_remote_ids_are_negative_and_unique() {
        let mut world = test_world();
        let first = world.alloc_ephemeral_remote_id();
        let second = world.alloc_ephemeral_remote_id();
        assert!(first < 0 && second < 0);
        assert_ne!(first, second);
    }

    #[test]
    fn local_summary_reports_only_the_local_heroes_units() {
        let mut world = test_world();
        npc_at(&mut world, "raider", 3.0, 3.0);

        let preset = UnitPreset::by_name("vanguard").expect("vanguard");
        let remote_id = world.alloc_ephemeral_remote_id();
        let unit = CombatUnit::from_preset(remote_id, Some(1), &preset);
        let hero_entity = world.local_hero_entity();
        world
            .spawn_unit(hero_entity, Vec2::new(0.5, 0.0), unit)
            .expect("spawn");

        let summary = world.local_summary();
        assert_eq!(summary.id, 1);
        assert_eq!(summary.units.len(), 1);
        assert_eq!(summary.units[0].id, remote_id);
        assert_eq!(summary.units[0].loadout.len(), 2);
    }

    #[test]
    fn teardown_empties_the_world_and_the_bus() {
        let mut world = test_world();
        npc_at(&mut world, "sentry", 2.0, 2.0);

        world.teardown();

        assert!(world.units.is_empty());
        assert!(world.heroes.is_empty());
        assert!(world.bus.is_empty());
        assert_eq!(world.scene.len(), 1);

        // A second teardown is harmless.
        world.teardown();
    }

    #[test]
    fn loadout_record_conversion_round_trips() {
        let records = vec![
            EquipmentRecord {
                slot: crate::combat::unit::EquipSlot::Head,
                skill: SkillType::Armor,
                damage_multiplier: 1.0,
            },
            EquipmentRecord {
                slot: crate::combat::unit::EquipSlot::RightArm,
                skill: SkillType::Ranged,
                damage_multiplier: 1.5,
            },
        ];
        let loadout = loadout_from_records(&records);
        assert_eq!(loadout_to_records(&loadout), records);
    }

    #[test]
    fn unit_from_record_clamps_hit_points_into_range() {
        let record = UnitRecord {
            id: 9,
            owner_hero_id: None,
            level: 3,
            hit_points: -5.0,
            max_hit_points: 60.0,
            position: WirePosition { x: 0.0, y: 0.0 },
            deployed: true,
            enemy: true,
            loadout: Vec::new(),
        };
        assert_eq!(unit_from_record(&record, None).hit_points, 0.0);
    }
}
