use std::collections::BTreeSet;

use tilefall_engine::{EntityId, NodeSpec, Vec2};
use tracing::{debug, warn};

pub mod chat;
pub mod items;
pub mod party;
pub mod purchases;

pub use chat::{ChatEntry, Transcript};
pub use items::{ItemIndex, ITEM_MATCH_RADIUS};
pub use party::{PartyMember, PartyRoster, PendingParty};
pub use purchases::{PurchaseLedger, PurchaseOrder, PurchasePhase};

use crate::combat::engage;
use crate::combat::unit::{EquipSlot, HeroId};
use crate::net::wire::{
    decode_event, DecodedEvent, EventId, HeroSummary, PartyMemberRecord, PollResponse,
    PurchaseRecord, ReconcileAction, UnitRecord,
};
use crate::world::{loadout_from_records, topic, unit_from_record, BusEvent, HeroState, World};

/// The explicit result of one reconciliation pass. The original swallowed
/// all of this; here every skipped event is accounted for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub applied: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub unknown: usize,
    pub heroes_synced: usize,
    pub chat_appended: usize,
}

/// Merges polled authority snapshots into the world. The poll response is a
/// complete snapshot, never a delta; the reconciler computes the delta
/// itself by id membership, dispatches only unseen events in response
/// order, and then replaces its id set wholesale. Events that age out of
/// the authority's retention window between two polls are permanently
/// invisible to this client.
#[derive(Debug, Default)]
pub struct Reconciler {
    seen_ids: BTreeSet<EventId>,
    // Attacks are the one effect with no natural state guard, so replays
    // (after a reconnect resets seen_ids) are fenced by event id here.
    resolved_attack_ids: BTreeSet<EventId>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_ids(&self) -> &BTreeSet<EventId> {
        &self.seen_ids
    }

    /// Reconnect path: forget which event ids were applied. Handlers are
    /// idempotent, so the redelivery this causes is harmless.
    pub fn clear_seen(&mut self) {
        self.seen_ids.clear();
    }

    pub fn apply_response(&mut self, world: &mut World, response: &PollResponse) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome {
            heroes_synced: sync_heroes(world, response),
            ..ReconcileOutcome::default()
        };
        let local_hero = world.local.hero_id;
        outcome.chat_appended = world.transcript.sync_snapshot(&response.chat, local_hero);

        for event in &response.events {
            if self.seen_ids.contains(&event.id) {
                outcome.duplicates = outcome.duplicates.saturating_add(1);
                continue;
            }
            match decode_event(event) {
                Ok(decoded) => {
                    self.apply_decoded(world, &decoded);
                    outcome.applied = outcome.applied.saturating_add(1);
                }
                Err(error) if error.is_unknown_type() => {
                    outcome.unknown = outcome.unknown.saturating_add(1);
                    warn!(
                        event_id = event.id,
                        event_type = %event.event_type,
                        "event_type_unknown_skipped"
                    );
                }
                Err(error) => {
                    // Only this one event is lost; the rest of the pass
                    // proceeds.
                    outcome.malformed = outcome.malformed.saturating_add(1);
                    warn!(
                        event_id = event.id,
                        error = %error,
                        "event_decode_failed_skipped"
                    );
                }
            }
        }

        // Replace, never merge: this is the no-redelivery-guarantee log.
        self.seen_ids = response.events.iter().map(|event| event.id).collect();
        outcome
    }

    fn apply_decoded(&mut self, world: &mut World, decoded: &DecodedEvent) {
        match &decoded.action {
            ReconcileAction::Deploy { unit } => handle_deploy(world, decoded.hero_id, unit),
            ReconcileAction::Recall { unit_id } => {
                recall_unit(world, *unit_id);
            }
            ReconcileAction::Destroyed {
                unit_id,
                winner_hero_id,
                ..
            } => handle_destroyed(world, *unit_id, *winner_hero_id),
            ReconcileAction::StartFight {
                attacker_unit_id,
                defender_unit_id,
            } => handle_start_fight(world, *attacker_unit_id, *defender_unit_id),
            ReconcileAction::AttackSelected { unit_id, slot } => {
                self.handle_attack_selected(world, decoded.id, *unit_id, *slot)
            }
            ReconcileAction::ItemDropped { item } => {
                let _ = items::spawn_dropped(
                    world,
                    &item.label,
                    Vec2::new(item.position.x, item.position.y),
                );
            }
            ReconcileAction::ItemDestroyed { label, position } => {
                items::remove_dropped(world, label, Vec2::new(position.x, position.y));
            }
            ReconcileAction::BuyItem { purchase } => handle_buy_item(world, purchase),
            ReconcileAction::BuyItemConfirmed { purchase_id } => {
                handle_buy_item_confirmed(world, *purchase_id)
            }
            ReconcileAction::Chat { text } => handle_chat(world, decoded, text, false),
            ReconcileAction::Whisper { to_hero_id, text } => {
                let local = world.local.hero_id;
                if *to_hero_id != local && decoded.hero_id != local {
                    return;
                }
                handle_chat(world, decoded, text, true);
            }
            ReconcileAction::PartyUp { members } => {
                handle_party_up(world, decoded.hero_id, members)
            }
            ReconcileAction::PartyInviteAccepted { member } => {
                handle_party_invite_accepted(world, member)
            }
        }
    }

    fn handle_attack_selected(
        &mut self,
        world: &mut World,
        event_id: EventId,
        unit_id: i64,
        slot: EquipSlot,
    ) {
        if !self.resolved_attack_ids.insert(event_id) {
            return;
        }
        let Some(entity) = world.unit_entity_by_remote(unit_id) else {
            return;
        };
        if is_locally_owned(world, entity) {
            // Local units attack under local authority only.
            debug!(unit_id, "attack_selected_skipped_for_local_unit");
            return;
        }
        let outcome = engage::try_attack(world, entity, Some(slot));
        debug!(unit_id, ?slot, ?outcome, "attack_selected_replayed");
    }
}

fn is_locally_owned(world: &World, entity: EntityId) -> bool {
    world
        .units
        .get(&entity)
        .is_some_and(|unit| unit.owner == Some(world.local.hero_id))
}

/// Full hero-roster reconciliation: the response lists every other hero on
/// the map, so heroes missing from it have left and their subtrees go away.
fn sync_heroes(world: &mut World, response: &PollResponse) -> usize {
    let local = world.local.hero_id;
    let mut present: BTreeSet<HeroId> = BTreeSet::new();
    present.insert(local);

    let mut synced = 0usize;
    for hero in &response.heroes {
        if hero.id == local {
            continue;
        }
        present.insert(hero.id);
        upsert_hero(world, hero);
        for record in &hero.units {
            upsert_unit(world, record, Some(hero.id));
        }
        synced = synced.saturating_add(1);
    }

    let stale: Vec<(HeroId, EntityId)> = world
        .heroes
        .iter()
        .filter(|(hero_id, _)| !present.contains(hero_id))
        .map(|(hero_id, hero)| (*hero_id, hero.entity))
        .collect();
    for (hero_id, entity) in stale {
        debug!(hero_id, "hero_left_roster");
        world.destroy_entity(entity);
    }
    synced
}

fn upsert_hero(world: &mut World, summary: &HeroSummary) {
    let position = Vec2::new(summary.position.x, summary.position.y);
    match world.hero_entity(summary.id) {
        Some(entity) => {
            if let Some(node) = world.scene.node_mut(entity) {
                node.set_position(position);
            }
            if let Some(state) = world.heroes.get_mut(&summary.id) {
                state.name = summary.name.clone();
                state.speed = summary.speed;
                state.map = summary.map.clone();
            }
        }
        None => {
            let root = world.scene.root();
            match world.scene.attach_new(
                root,
                NodeSpec::default().with_position(position).with_solid(true),
            ) {
                Ok(entity) => {
                    world.heroes.insert(
                        summary.id,
                        HeroState {
                            entity,
                            name: summary.name.clone(),
                            speed: summary.speed,
                            map: summary.map.clone(),
                        },
                    );
                }
                Err(error) => warn!(hero_id = summary.id, error = %error, "hero_spawn_failed"),
            }
        }
    }
}

/// Instantiates or refreshes one unit by its remote id. Re-applying the
/// same record is a no-op in effect: the unit ends in the same state.
fn upsert_unit(world: &mut World, record: &UnitRecord, fallback_owner: Option<HeroId>) {
    let owner = record.owner_hero_id.or(fallback_owner);

    if let Some(entity) = world.unit_entity_by_remote(record.id) {
        let parent = world
            .scene
            .node(entity)
            .and_then(|node| node.parent())
            .unwrap_or_else(|| world.scene.root());
        let parent_absolute = world.scene.absolute_position(parent).unwrap_or_default();
        let was_deployed = world
            .units
            .get(&entity)
            .map(|unit| unit.deployed)
            .unwrap_or(false);
        if let Some(unit) = world.units.get_mut(&entity) {
            unit.owner = owner;
            unit.level = record.level;
            unit.max_hit_points = record.max_hit_points;
            unit.hit_points = record.hit_points.min(record.max_hit_points).max(0.0);
            unit.loadout = loadout_from_records(&record.loadout);
            unit.deployed = record.deployed;
            unit.enemy = record.enemy;
        }
        if let Some(node) = world.scene.node_mut(entity) {
            node.set_position(Vec2::new(
                record.position.x - parent_absolute.x,
                record.position.y - parent_absolute.y,
            ));
        }
        if record.deployed && !was_deployed {
            world.publish(
                topic::UNIT_DEPLOYED,
                &BusEvent::UnitDeployed {
                    entity,
                    remote_id: record.id,
                    owner,
                },
            );
        }
        return;
    }

    let parent = owner
        .and_then(|hero_id| world.hero_entity(hero_id))
        .unwrap_or_else(|| world.scene.root());
    let parent_absolute = world.scene.absolute_position(parent).unwrap_or_default();
    let local_position = Vec2::new(
        record.position.x - parent_absolute.x,
        record.position.y - parent_absolute.y,
    );
    let unit = unit_from_record(record, owner);
    match world.spawn_unit(parent, local_position, unit) {
        Ok(entity) => {
            if record.deployed {
                world.publish(
                    topic::UNIT_DEPLOYED,
                    &BusEvent::UnitDeployed {
                        entity,
                        remote_id: record.id,
                        owner,
                    },
                );
            }
        }
        Err(error) => warn!(unit_id = record.id, error = %error, "unit_spawn_failed"),
    }
}

fn handle_deploy(world: &mut World, event_hero: HeroId, record: &UnitRecord) {
    let fallback = (event_hero >= 0).then_some(event_hero);
    upsert_unit(world, record, fallback);
}

/// The inverse of deploy: clears the unit's engagements, marks it
/// undeployed, and removes its subtree. Shared between the replayed recall
/// handler and the local recall action. Missing units are silent no-ops.
pub(crate) fn recall_unit(world: &mut World, unit_id: i64) -> bool {
    let Some(entity) = world.unit_entity_by_remote(unit_id) else {
        return false;
    };
    let (owner, partners) = match world.units.get(&entity) {
        Some(unit) => (
            unit.owner,
            unit.targeting
                .iter()
                .chain(unit.targeted_by.iter())
                .copied()
                .collect::<BTreeSet<_>>(),
        ),
        None => return false,
    };
    for partner in partners {
        engage::disengage_pair(world, entity, partner);
    }
    if let Some(unit) = world.units.get_mut(&entity) {
        unit.deployed = false;
    }
    world.destroy_entity(entity);
    world.publish(
        topic::UNIT_RECALLED,
        &BusEvent::UnitRecalled {
            remote_id: unit_id,
            owner,
        },
    );
    true
}

fn handle_destroyed(world: &mut World, unit_id: i64, winner_hero_id: Option<HeroId>) {
    let Some(entity) = world.unit_entity_by_remote(unit_id) else {
        // Already gone; a replayed destruction changes nothing.
        debug!(unit_id, "destroyed_event_for_unknown_unit");
        return;
    };
    engage::destroy_unit(world, entity, winner_hero_id);
}

fn handle_start_fight(world: &mut World, attacker_unit_id: i64, defender_unit_id: i64) {
    let (Some(attacker), Some(defender)) = (
        world.unit_entity_by_remote(attacker_unit_id),
        world.unit_entity_by_remote(defender_unit_id),
    ) else {
        return;
    };
    if is_locally_owned(world, attacker) || is_locally_owned(world, defender) {
        // Local units pick their own targets; the relayed lock only applies
        // to fights between remote-owned units.
        debug!(
            attacker_unit_id,
            defender_unit_id, "start_fight_skipped_local_authority"
        );
        return;
    }
    engage::engage_mutual(world, attacker, defender);
}

fn handle_buy_item(world: &mut World, purchase: &PurchaseRecord) {
    if world.purchases.begin(purchase) {
        debug!(
            purchase_id = purchase.purchase_id,
            item = %purchase.item_label,
            "purchase_pending"
        );
    }
}

fn handle_buy_item_confirmed(world: &mut World, purchase_id: i64) {
    if let Some(order) = world.purchases.confirm(purchase_id) {
        world.publish(
            topic::PURCHASE_CONFIRMED,
            &BusEvent::PurchaseConfirmed {
                purchase_id: order.purchase_id,
                item_label: order.item_label.clone(),
                price: order.price,
            },
        );
    }
}

fn handle_chat(world: &mut World, decoded: &DecodedEvent, text: &str, whisper: bool) {
    let local = world.local.hero_id;
    let name = world
        .heroes
        .get(&decoded.hero_id)
        .map(|hero| hero.name.clone())
        .unwrap_or_else(|| format!("hero-{}", decoded.hero_id));
    let appended = world.transcript.apply_event(
        decoded.id,
        decoded.hero_id,
        &name,
        text,
        decoded.timestamp_ms,
        whisper,
        local,
    );
    if appended {
        world.publish(
            topic::CHAT_POSTED,
            &BusEvent::ChatPosted {
                hero_id: decoded.hero_id,
                text: text.to_string(),
            },
        );
    }
}

fn handle_party_up(world: &mut World, proposed_by: HeroId, members: &[PartyMemberRecord]) {
    let members: Vec<PartyMember> = members.iter().map(PartyMember::from).collect();
    world.party.propose(proposed_by, members);
    if proposed_by == world.local.hero_id {
        // The local hero formed this party; no confirmation step needed.
        world.party.confirm_pending();
        let member_count = world.party.members().len();
        world.publish(
            topic::PARTY_CHANGED,
            &BusEvent::PartyChanged { member_count },
        );
    }
}

fn handle_party_invite_accepted(world: &mut World, member: &PartyMemberRecord) {
    if world.party.accept_member(PartyMember::from(member)) {
        let member_count = world.party.members().len();
        world.publish(
            topic::PARTY_CHANGED,
            &BusEvent::PartyChanged { member_count },
        );
    }
}
