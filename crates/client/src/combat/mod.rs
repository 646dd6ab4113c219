pub mod engage;
pub mod skill;
pub mod unit;

pub use engage::{
    destroy_unit, disengage_pair, engage_mutual, try_attack, AttackOutcome, ATTACK_INTERVAL_MS,
    SCAN_INTERVAL_MS, TARGET_BOX_HALF_EXTENT,
};
pub use skill::{effectiveness, SkillType, SKILL_WHEEL};
pub use unit::{CombatState, CombatUnit, EquipSlot, Equipment, HeroId, UnitPreset, EQUIP_SLOTS};
