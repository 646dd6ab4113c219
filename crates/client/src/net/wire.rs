use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combat::skill::SkillType;
use crate::combat::unit::{EquipSlot, HeroId};

pub type EventId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePosition {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    pub slot: EquipSlot,
    pub skill: SkillType,
    pub damage_multiplier: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: i64,
    #[serde(default)]
    pub owner_hero_id: Option<HeroId>,
    pub level: u32,
    pub hit_points: f32,
    pub max_hit_points: f32,
    pub position: WirePosition,
    pub deployed: bool,
    pub enemy: bool,
    #[serde(default)]
    pub loadout: Vec<EquipmentRecord>,
}

/// Also the poll request payload: the client reports itself in this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroSummary {
    pub id: HeroId,
    pub name: String,
    pub position: WirePosition,
    pub speed: f32,
    pub map: String,
    #[serde(default)]
    pub units: Vec<UnitRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub hero_id: HeroId,
    pub hero_name: String,
    pub text: String,
    pub timestamp_ms: i64,
}

/// Immutable, server-ordered record of something that happened. `data`
/// values are themselves per-type-encoded JSON sub-records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub hero_id: HeroId,
    pub timestamp_ms: i64,
    pub event_type: String,
    pub map: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// A complete snapshot of the authority's recent view, never a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub map: String,
    pub position: WirePosition,
    #[serde(default)]
    pub heroes: Vec<HeroSummary>,
    #[serde(default)]
    pub chat: Vec<ChatMessage>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

/// Outbound event: the same record shape minus the id, which the authority
/// assigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitEvent {
    pub hero_id: HeroId,
    pub event_type: String,
    pub map: String,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeleteEvent {
    pub event_id: EventId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Deploy,
    Recall,
    Destroyed,
    StartFight,
    AttackSelected,
    ItemDestroyed,
    ItemDropped,
    BuyItem,
    BuyItemConfirmed,
    Chat,
    Whisper,
    PartyUp,
    PartyInviteAccepted,
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Option<EventKind> {
        let kind = match tag {
            "deploy" => EventKind::Deploy,
            "recall" => EventKind::Recall,
            "destroyed" => EventKind::Destroyed,
            "start-fight" => EventKind::StartFight,
            "attack-selected" => EventKind::AttackSelected,
            "item-destroyed" => EventKind::ItemDestroyed,
            "item-dropped" => EventKind::ItemDropped,
            "buy-item" => EventKind::BuyItem,
            "buy-item-confirmed" => EventKind::BuyItemConfirmed,
            "chat" => EventKind::Chat,
            "whisper" => EventKind::Whisper,
            "party-up" => EventKind::PartyUp,
            "party-invite-accepted" => EventKind::PartyInviteAccepted,
            _ => return None,
        };
        Some(kind)
    }

    pub fn tag(self) -> &'static str {
        match self {
            EventKind::Deploy => "deploy",
            EventKind::Recall => "recall",
            EventKind::Destroyed => "destroyed",
            EventKind::StartFight => "start-fight",
            EventKind::AttackSelected => "attack-selected",
            EventKind::ItemDestroyed => "item-destroyed",
            EventKind::ItemDropped => "item-dropped",
            EventKind::BuyItem => "buy-item",
            EventKind::BuyItemConfirmed => "buy-item-confirmed",
            EventKind::Chat => "chat",
            EventKind::Whisper => "whisper",
            EventKind::PartyUp => "party-up",
            EventKind::PartyInviteAccepted => "party-invite-accepted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub label: String,
    pub position: WirePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub purchase_id: i64,
    pub item_label: String,
    pub price: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyMemberRecord {
    pub hero_id: HeroId,
    pub name: String,
    pub level: u32,
}

/// Closed union of event payloads, validated once at the reconciliation
/// boundary. Handlers never look at raw `data` maps.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    Deploy { unit: UnitRecord },
    Recall { unit_id: i64 },
    Destroyed {
        unit_id: i64,
        winner_hero_id: Option<HeroId>,
        unit_level: u32,
    },
    StartFight {
        attacker_unit_id: i64,
        defender_unit_id: i64,
    },
    AttackSelected { unit_id: i64, slot: EquipSlot },
    ItemDropped { item: ItemRecord },
    ItemDestroyed {
        label: String,
        position: WirePosition,
    },
    BuyItem { purchase: PurchaseRecord },
    BuyItemConfirmed { purchase_id: i64 },
    Chat { text: String },
    Whisper { to_hero_id: HeroId, text: String },
    PartyUp { members: Vec<PartyMemberRecord> },
    PartyInviteAccepted { member: PartyMemberRecord },
}

#[derive(Debug)]
pub struct DecodedEvent {
    pub id: EventId,
    pub hero_id: HeroId,
    pub timestamp_ms: i64,
    pub map: String,
    pub action: ReconcileAction,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown event type tag '{tag}'")]
    UnknownEventType { tag: String },
    #[error("event type '{event_type}' is missing required field '{field}'")]
    MissingField {
        event_type: &'static str,
        field: &'static str,
    },
    #[error("failed to decode field '{field}' at {path}: {source}")]
    Payload {
        field: &'static str,
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, DecodeError::UnknownEventType { .. })
    }
}

fn sub_record<T: DeserializeOwned>(
    data: &BTreeMap<String, String>,
    event_type: &'static str,
    field: &'static str,
) -> Result<T, DecodeError> {
    let raw = data.get(field).ok_or(DecodeError::MissingField { event_type, field })?;
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| DecodeError::Payload {
        field,
        path: error.path().to_string(),
        source: error.into_inner(),
    })
}

fn sub_record_opt<T: DeserializeOwned>(
    data: &BTreeMap<String, String>,
    event_type: &'static str,
    field: &'static str,
) -> Result<Option<T>, DecodeError> {
    if !data.contains_key(field) {
        return Ok(None);
    }
    sub_record(data, event_type, field).map(Some)
}

/// Decodes one wire record into the typed union. Malformed sub-records fail
/// here, once, so a handler never sees a half-decoded payload.
pub fn decode_event(record: &EventRecord) -> Result<DecodedEvent, DecodeError> {
    let kind = EventKind::from_tag(&record.event_type).ok_or_else(|| {
        DecodeError::UnknownEventType {
            tag: record.event_type.clone(),
        }
    })?;

    let data = &record.data;
    let action = match kind {
        EventKind::Deploy => ReconcileAction::Deploy {
            unit: sub_record(data, "deploy", "unit")?,
        },
        EventKind::Recall => ReconcileAction::Recall {
            unit_id: sub_record(data, "recall", "unit_id")?,
        },
        EventKind::Destroyed => ReconcileAction::Destroyed {
            unit_id: sub_record(data, "destroyed", "unit_id")?,
            winner_hero_id: sub_record_opt(data, "destroyed", "winner_hero_id")?,
            unit_level: sub_record(data, "destroyed", "unit_level")?,
        },
        EventKind::StartFight => ReconcileAction::StartFight {
            attacker_unit_id: sub_record(data, "start-fight", "attacker_unit_id")?,
            defender_unit_id: sub_record(data, "start-fight", "defender_unit_id")?,
        },
        EventKind::AttackSelected => ReconcileAction::AttackSelected {
            unit_id: sub_record(data, "attack-selected", "unit_id")?,
            slot: sub_record(data, "attack-selected", "slot")?,
        },
        EventKind::ItemDropped => ReconcileAction::ItemDropped {
            item: sub_record(data, "item-dropped", "item")?,
        },
        EventKind::ItemDestroyed => ReconcileAction::ItemDestroyed {
            label: sub_record(data, "item-destroyed", "label")?,
            position: sub_record(data, "item-destroyed", "position")?,
        },
        EventKind::BuyItem => ReconcileAction::BuyItem {
            purchase: sub_record(data, "buy-item", "purchase")?,
        },
        EventKind::BuyItemConfirmed => ReconcileAction::BuyItemConfirmed {
            purchase_id: sub_record(data, "buy-item-confirmed", "purchase_id")?,
        },
        EventKind::Chat => ReconcileAction::Chat {
            text: sub_record(data, "chat", "text")?,
        },
        EventKind::Whisper => ReconcileAction::Whisper {
            to_hero_id: sub_record(data, "whisper", "to_hero_id")?,
            text: sub_record(data, "whisper", "text")?,
        },
        EventKind::PartyUp => ReconcileAction::PartyUp {
            members: sub_record(data, "party-up", "members")?,
        },
        EventKind::PartyInviteAccepted => ReconcileAction::PartyInviteAccepted {
            member: sub_record(data, "party-invite-accepted", "member")?,
        },
    };

    Ok(DecodedEvent {
        id: record.id,
        hero_id: record.hero_id,
        timestamp_ms: record.timestamp_ms,
        map: record.map.clone(),
        action,
    })
}

fn encode_value<T: Serialize>(value: &T) -> String {
    // These records are plain data; encoding them cannot realistically fail.
    serde_json::to_string(value).unwrap_or_default()
}

fn submit(
    hero_id: HeroId,
    map: &str,
    timestamp_ms: i64,
    kind: EventKind,
    data: BTreeMap<String, String>,
) -> SubmitEvent {
    SubmitEvent {
        hero_id,
        event_type: kind.tag().to_string(),
        map: map.to_string(),
        timestamp_ms,
        data,
    }
}

pub fn deploy_event(hero_id: HeroId, map: &str, timestamp_ms: i64, unit: &UnitRecord) -> SubmitEvent {
    let mut data = BTreeMap::new();
    data.insert("unit".to_string(), encode_value(unit));
    submit(hero_id, map, timestamp_ms, EventKind::Deploy, data)
}

pub fn recall_event(hero_id: HeroId, map: &str, timestamp_ms: i64, unit_id: i64) -> SubmitEvent {
    let mut data = BTreeMap::new();
    data.insert("unit_id".to_string(), encode_value(&unit_id));
    submit(hero_id, map, timestamp_ms, EventKind::Recall, data)
}

pub fn destroyed_event(
    hero_id: HeroId,
    map: &str,
    timestamp_ms: i64,
    unit_id: i64,
    winner_hero_id: Option<HeroId>,
    unit_level: u32,
) -> SubmitEvent {
    let mut data = BTreeMap::new();
    data.insert("unit_id".to_string(), encode_value(&unit_id));
    data.insert("unit_level".to_string(), encode_value(&unit_level));
    if let Some(winner) = winner_hero_id {
        data.insert("winner_hero_id".to_string(), encode_value(&winner));
    }
    submit(hero_id, map, timestamp_ms, EventKind::Destroyed, data)
}

pub fn chat_event(hero_id: HeroId, map: &str, timestamp_ms: i64, text: &str) -> SubmitEvent {
    let mut data = BTreeMap::new();
    data.insert("text".to_string(), encode_value(&text));
    submit(hero_id, map, timestamp_ms, EventKind::Chat, data)
}

pub fn whisper_event(
    hero_id: HeroId,
    map: &str,
    timestamp_ms: i64,
    to_hero_id: HeroId,
    text: &str,
) -> SubmitEvent {
    let mut data = BTreeMap::new();
    data.insert("to_hero_id".to_string(), encode_value(&to_hero_id));
    data.insert("text".to_string(), encode_value(&text));
    submit(hero_id, map, timestamp_ms, EventKind::Whisper, data)
}

pub fn attack_selected_event(
    hero_id: HeroId,
    map: &str,
    timestamp_ms: i64,
    unit_id: i64,
    slot: EquipSlot,
) -> SubmitEvent {
    let mut data = BTreeMap::new();
    data.insert("unit_id".to_string(), encode_value(&unit_id));
    data.insert("slot".to_string(), encode_value(&slot));
    submit(hero_id, map, timestamp_ms, EventKind::AttackSelected, data)
}

pub fn buy_item_event(
    hero_id: HeroId,
    map: &str,
    timestamp_ms: i64,
    purchase: &PurchaseRecord,
) -> SubmitEvent {
    let mut data = BTreeMap::new();
    data.insert("purchase".to_string(), encode_value(purchase));
    submit(hero_id, map, timestamp_ms, EventKind::BuyItem, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::skill::SkillType;

    fn event_with(event_type: &str, data: &[(&str, &str)]) -> EventRecord {
        EventRecord {
            id: 10,
            hero_id: 3,
            timestamp_ms: 1_700_000_000_000,
            event_type: event_type.to_string(),
            map: "outskirts".to_string(),
            data: data
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    #[test]
    fn every_tag_round_trips_through_event_kind() {
        let kinds = [
            EventKind::Deploy,
            EventKind::Recall,
            EventKind::Destroyed,
            EventKind::StartFight,
            EventKind::AttackSelected,
            EventKind::ItemDestroyed,
            EventKind::ItemDropped,
            EventKind::BuyItem,
            EventKind::BuyItemConfirmed,
            EventKind::Chat,
            EventKind::Whisper,
            EventKind::PartyUp,
            EventKind::PartyInviteAccepted,
        ];
        for kind in kinds {
            assert_eq!(EventKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EventKind::from_tag("teleport"), None);
    }

    #[test]
    fn decode_deploy_produces_a_typed_unit_record() {
        let unit_json = r#"{"id":44,"owner_hero_id":3,"level":2,"hit_points":40.0,
            "max_hit_points":40.0,"position":{"x":1.0,"y":2.0},"deployed":true,
            "enemy":false,"loadout":[{"slot":"left-arm","skill":"strength","damage_multiplier":2.0}]}"#;
        let record = event_with("deploy", &[("unit", unit_json)]);

        let decoded = decode_event(&record).expect("decode");
        let ReconcileAction::Deploy { unit } = decoded.action else {
            panic!("expected deploy action");
        };
        assert_eq!(unit.id, 44);
        assert_eq!(unit.loadout[0].skill, SkillType::Strength);
        assert_eq!(unit.loadout[0].slot, EquipSlot::LeftArm);
    }

    #[test]
    fn decode_destroyed_tolerates_missing_winner() {
        let record = event_with("destroyed", &[("unit_id", "44"), ("unit_level", "2")]);
        let decoded = decode_event(&record).expect("decode");
        assert_eq!(
            decoded.action,
            ReconcileAction::Destroyed {
                unit_id: 44,
                winner_hero_id: None,
                unit_level: 2,
            }
        );
    }

    #[test]
    fn decode_chat_unwraps_the_json_string_payload() {
        let record = event_with("chat", &[("text", "\"hello there\"")]);
        let decoded = decode_event(&record).expect("decode");
        assert_eq!(
            decoded.action,
            ReconcileAction::Chat {
                text: "hello there".to_string()
            }
        );
    }

    #[test]
    fn unknown_event_type_is_its_own_error() {
        let record = event_with("teleport", &[]);
        let error = decode_event(&record).expect_err("should fail");
        assert!(error.is_unknown_type());
    }

    #[test]
    fn missing_required_field_is_reported_by_name() {
        let record = event_with("recall", &[]);
        let error = decode_event(&record).expect_err("should fail");
        assert_eq!(
            error.to_string(),
            "event type 'recall' is missing required field 'unit_id'"
        );
    }

    #[test]
    fn malformed_sub_record_reports_the_failing_path() {
        let unit_json = r#"{"id":44,"level":"not-a-number","hit_points":40.0,
            "max_hit_points":40.0,"position":{"x":1.0,"y":2.0},"deployed":true,"enemy":false}"#;
        let record = event_with("deploy", &[("unit", unit_json)]);

        let error = decode_event(&record).expect_err("should fail");
        let DecodeError::Payload { field, path, .. } = &error else {
            panic!("expected payload error, got {error:?}");
        };
        assert_eq!(*field, "unit");
        assert_eq!(path, "level");
    }

    #[test]
    fn outbound_chat_event_round_trips_through_decode() {
        let submitted = chat_event(3, "outskirts", 1_700_000_000_123, "gl hf");
        let record = EventRecord {
            id: 99,
            hero_id: submitted.hero_id,
            timestamp_ms: submitted.timestamp_ms,
            event_type: submitted.event_type.clone(),
            map: submitted.map.clone(),
            data: submitted.data.clone(),
        };

        let decoded = decode_event(&record).expect("decode");
        assert_eq!(
            decoded.action,
            ReconcileAction::Chat {
                text: "gl hf".to_string()
            }
        );
    }

    #[test]
    fn poll_response_with_absent_collections_decodes_to_empty() {
        let response: PollResponse =
            serde_json::from_str(r#"{"map":"outskirts","position":{"x":0.0,"y":0.0}}"#)
                .expect("decode");
        assert!(response.heroes.is_empty());
        assert!(response.chat.is_empty());
        assert!(response.events.is_empty());
    }
}
