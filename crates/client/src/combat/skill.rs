use serde::{Deserialize, Serialize};

/// Combat skill types. The wheel below defines the counter relation:
/// each type counters its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillType {
    Speed,
    Strength,
    Armor,
    Ranged,
    Stealth,
    Intelligence,
}

pub const SKILL_WHEEL: [SkillType; 6] = [
    SkillType::Speed,
    SkillType::Strength,
    SkillType::Armor,
    SkillType::Ranged,
    SkillType::Stealth,
    SkillType::Intelligence,
];

pub const EFFECTIVE_MULTIPLIER: f32 = 2.0;
pub const COUNTERED_MULTIPLIER: f32 = 0.5;
pub const NEUTRAL_MULTIPLIER: f32 = 1.0;

impl SkillType {
    fn wheel_index(self) -> usize {
        match self {
            SkillType::Speed => 0,
            SkillType::Strength => 1,
            SkillType::Armor => 2,
            SkillType::Ranged => 3,
            SkillType::Stealth => 4,
            SkillType::Intelligence => 5,
        }
    }

    /// The type this one counters: its successor on the wheel.
    pub fn counters(self) -> SkillType {
        SKILL_WHEEL[(self.wheel_index() + 1) % SKILL_WHEEL.len()]
    }

    /// The type this one is countered by: its predecessor on the wheel.
    pub fn countered_by(self) -> SkillType {
        SKILL_WHEEL[(self.wheel_index() + SKILL_WHEEL.len() - 1) % SKILL_WHEEL.len()]
    }
}

/// Shared damage-multiplier lookup. Both the autonomous-combat path and the
/// player-initiated attack path resolve through this one function.
pub fn effectiveness(attacker: SkillType, defender: SkillType) -> f32 {
    if attacker.counters() == defender {
        EFFECTIVE_MULTIPLIER
    } else if defender.counters() == attacker {
        COUNTERED_MULTIPLIER
    } else {
        NEUTRAL_MULTIPLIER
    }
}
