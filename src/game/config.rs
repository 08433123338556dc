//! Simulation Configuration
//!
//! Engine tunables shared by the validator, the applier and the tick
//! pipeline, plus the per-run [`ConfigSnapshot`] that is signed into the
//! run token.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, FIXED_ONE, from_int};
use crate::core::vec2::FixedVec2;
use crate::game::definitions::Definitions;

/// Gold debited by `REROLL_RELICS`.
pub const REROLL_COST: u32 = 10;

/// Configuration for run simulation.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Arena width (x in `[0, arena_width]`).
    pub arena_width: Fixed,
    /// Arena height (y in `[0, arena_height]`).
    pub arena_height: Fixed,
    /// Gold cost of a relic reroll.
    pub reroll_cost: u32,
    /// Number of options offered by a relic choice.
    pub relic_choice_size: usize,
    /// Maximum live militia units.
    pub militia_cap: usize,
    /// Largest squad accepted by `SPAWN_MILITIA`.
    pub max_squad_size: u32,
    /// Vertical spacing between squad members.
    pub squad_spacing: Fixed,
    /// Ticks an overcharge lasts.
    pub overcharge_duration: u32,
    /// Ticks before a turret can overcharge again.
    pub overcharge_cooldown: u32,
    /// Ticks before the matrix can snap again.
    pub matrix_cooldown: u32,
    /// Cooldown for skills without an explicit definition.
    pub default_skill_cooldown: u32,
    /// Where retreating heroes regroup.
    pub rally_point: FixedVec2,
    /// Static definitions lookup.
    pub definitions: Definitions,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arena_width: from_int(40),
            arena_height: from_int(15),
            reroll_cost: REROLL_COST,
            relic_choice_size: 3,
            militia_cap: 12,
            max_squad_size: 5,
            squad_spacing: from_int(1),
            overcharge_duration: 300, // 5 seconds
            overcharge_cooldown: 1800, // 30 seconds
            matrix_cooldown: 3600,
            default_skill_cooldown: 600,
            rally_point: FixedVec2::from_ints(3, 7),
            definitions: Definitions::builtin(),
        }
    }
}

impl SimConfig {
    /// Base cooldown for a skill.
    pub fn skill_cooldown(&self, skill_id: &str) -> u32 {
        self.definitions
            .skill_cooldowns
            .get(skill_id)
            .copied()
            .unwrap_or(self.default_skill_cooldown)
    }
}

// =============================================================================
// RUN SNAPSHOT
// =============================================================================

/// Turret placed at run start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurretLoadout {
    /// Slot on the fortress.
    pub slot_index: u8,
    /// Turret type id.
    pub definition_id: String,
}

/// The restricted subset of run configuration that affects outcomes.
///
/// Only these fields are signed into the run token. Anything not listed
/// here cannot influence a replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Fortress class id.
    pub fortress_class: String,
    /// Gold at tick 0.
    pub starting_gold: u32,
    /// Fortress max HP before bonuses.
    pub fortress_base_hp: i32,
    /// Hero loadout (definition ids).
    pub heroes: Vec<String>,
    /// Turret loadout.
    pub turrets: Vec<TurretLoadout>,
    /// Progression max HP bonus (fixed-point fraction, `FIXED_ONE / 10` = +10%).
    pub hp_bonus: Fixed,
    /// Ticks per wave. Zero disables automatic waves.
    pub wave_interval_ticks: u32,
    /// Whether the matrix mechanic is available this run.
    pub matrix_unlocked: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            fortress_class: "bastion".into(),
            starting_gold: 0,
            fortress_base_hp: 1000,
            heroes: vec!["knight".into()],
            turrets: vec![TurretLoadout { slot_index: 0, definition_id: "arrow".into() }],
            hp_bonus: 0,
            wave_interval_ticks: 600,
            matrix_unlocked: false,
        }
    }
}

impl ConfigSnapshot {
    /// Fortress max HP with the progression bonus applied (floored).
    pub fn fortress_max_hp(&self) -> i32 {
        let mult = FIXED_ONE as i64 + self.hp_bonus as i64;
        let hp = (self.fortress_base_hp as i64 * mult).div_euclid(FIXED_ONE as i64);
        hp.clamp(1, i32::MAX as i64) as i32
    }
}
