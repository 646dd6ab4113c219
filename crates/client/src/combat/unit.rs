use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tilefall_engine::EntityId;

use super::skill::SkillType;

pub type HeroId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquipSlot {
    Head,
    Legs,
    LeftArm,
    RightArm,
}

pub const EQUIP_SLOTS: [EquipSlot; 4] = [
    EquipSlot::Head,
    EquipSlot::Legs,
    EquipSlot::LeftArm,
    EquipSlot::RightArm,
];

impl EquipSlot {
    pub fn index(self) -> usize {
        match self {
            EquipSlot::Head => 0,
            EquipSlot::Legs => 1,
            EquipSlot::LeftArm => 2,
            EquipSlot::RightArm => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub skill: SkillType,
    pub damage_multiplier: f32,
}

/// Data-driven configuration for locally spawned units. One combat-entity
/// type, many presets; behavior never varies per preset.
#[derive(Debug, Clone)]
pub struct UnitPreset {
    pub level: u32,
    pub max_hit_points: f32,
    pub enemy: bool,
    pub loadout: [Option<Equipment>; 4],
}

impl UnitPreset {
    pub fn by_name(name: &str) -> Option<UnitPreset> {
        let preset = match name {
            "raider" => UnitPreset {
                level: 2,
                max_hit_points: 40.0,
                enemy: true,
                loadout: [
                    None,
                    None,
                    Some(Equipment {
                        skill: SkillType::Strength,
                        damage_multiplier: 2.0,
                    }),
                    None,
                ],
            },
            "sentry" => UnitPreset {
                level: 3,
                max_hit_points: 60.0,
                enemy: true,
                loadout: [
                    Some(Equipment {
                        skill: SkillType::Armor,
                        damage_multiplier: 1.0,
                    }),
                    None,
                    None,
                    Some(Equipment {
                        skill: SkillType::Ranged,
                        damage_multiplier: 1.5,
                    }),
                ],
            },
            "stalker" => UnitPreset {
                level: 4,
                max_hit_points: 55.0,
                enemy: true,
                loadout: [
                    None,
                    Some(Equipment {
                        skill: SkillType::Speed,
                        damage_multiplier: 1.0,
                    }),
                    Some(Equipment {
                        skill: SkillType::Stealth,
                        damage_multiplier: 2.5,
                    }),
                    None,
                ],
            },
            "vanguard" => UnitPreset {
                level: 5,
                max_hit_points: 100.0,
                enemy: false,
                loadout: [
                    Some(Equipment {
                        skill: SkillType::Armor,
                        damage_multiplier: 1.0,
                    }),
                    None,
                    Some(Equipment {
                        skill: SkillType::Strength,
                        damage_multiplier: 3.0,
                    }),
                    None,
                ],
            },
            _ => return None,
        };
        Some(preset)
    }
}

/// Per-unit combat lifecycle, derived from the deployed flag and the
/// targeting set. Destroyed units leave the world entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatState {
    Dormant,
    Idle,
    Engaged,
}

/// One deployed combat entity. `remote_id` is the authority-assigned
/// identity; negative ids are allocated locally for client-only ephemeral
/// units.
#[derive(Debug)]
pub struct CombatUnit {
    pub remote_id: i64,
    pub owner: Option<HeroId>,
    pub level: u32,
    pub hit_points: f32,
    pub max_hit_points: f32,
    pub loadout: [Option<Equipment>; 4],
    pub deployed: bool,
    pub enemy: bool,
    pub targeting: BTreeSet<EntityId>,
    pub targeted_by: BTreeSet<EntityId>,
    pub last_attack_at: Option<u64>,
    pub last_scan_at: Option<u64>,
}

impl CombatUnit {
    pub fn from_preset(remote_id: i64, owner: Option<HeroId>, preset: &UnitPreset) -> Self {
        Self {
            remote_id,
            owner,
            level: preset.level,
            hit_points: preset.max_hit_points,
            max_hit_points: preset.max_hit_points,
            loadout: preset.loadout,
            deployed: true,
            enemy: preset.enemy,
            targeting: BTreeSet::new(),
            targeted_by: BTreeSet::new(),
            last_attack_at: None,
            last_scan_at: None,
        }
    }

    /// Absent or negative owning-hero identity means NPC-controlled.
    pub fn npc_controlled(&self) -> bool {
        self.owner.map_or(true, |hero| hero < 0)
    }

    pub fn combat_state(&self) -> CombatState {
        if !self.deployed {
            CombatState::Dormant
        } else if self.targeting.is_empty() {
            CombatState::Idle
        } else {
            CombatState::Engaged
        }
    }

    pub fn equipped(&self, slot: EquipSlot) -> Option<Equipment> {
        self.loadout[slot.index()]
    }

    pub fn equipped_slots(&self) -> Vec<EquipSlot> {
        EQUIP_SLOTS
            .into_iter()
            .filter(|slot| self.loadout[slot.index()].is_some())
            .collect()
    }

    /// The skill the unit defends with: its first equipped slot in fixed
    /// slot order, unarmored units defend with nothing.
    pub fn defense_skill(&self) -> Option<SkillType> {
        EQUIP_SLOTS
            .into_iter()
            .find_map(|slot| self.loadout[slot.index()].map(|equipment| equipment.skill))
    }

    /// Hit points are clamped at zero, never negative. Returns the
    /// remaining hit points.
    pub fn apply_damage(&mut self, amount: f32) -> f32 {
        self.hit_points = (self.hit_points - amount).max(0.0);
        self.hit_points
    }
}
