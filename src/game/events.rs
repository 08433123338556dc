//! Player Events
//!
//! The closed set of commands a client can submit. Every variant carries the
//! tick it targets. On the wire this is a JSON object tagged by `type`:
//!
//! ```json
//! { "type": "PLACE_WALL", "tick": 10, "wallType": "palisade", "x": 393216, "y": 131072 }
//! ```
//!
//! Coordinates are Q16.16 integers, enums are lowercase strings.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::fixed::Fixed;

// =============================================================================
// EVENTS
// =============================================================================

/// Kind of hero command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeroCommandType {
    /// Walk to a position.
    Move,
    /// Attack a specific enemy.
    Focus,
    /// Fall back to the rally point.
    Retreat,
}

/// A player-issued event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimEvent {
    /// Pick one option of the pending relic choice.
    #[serde(rename_all = "camelCase")]
    ChooseRelic {
        /// Target tick.
        tick: u32,
        /// Wave of the choice being answered.
        wave: u32,
        /// Index into the offered options.
        option_index: u32,
    },

    /// Pay to replace the offered relics.
    #[serde(rename_all = "camelCase")]
    RerollRelics {
        /// Target tick.
        tick: u32,
    },

    /// Fire the matrix ultimate.
    #[serde(rename_all = "camelCase")]
    ActivateSnap {
        /// Target tick.
        tick: u32,
    },

    /// Order one or all heroes.
    #[serde(rename_all = "camelCase")]
    HeroCommand {
        /// Target tick.
        tick: u32,
        /// What to do.
        command_type: HeroCommandType,
        /// Hero to order; `None` means every hero where allowed.
        #[serde(default)]
        hero_id: Option<String>,
        /// Destination x for `move`.
        #[serde(default)]
        target_x: Option<Fixed>,
        /// Destination y for `move`.
        #[serde(default)]
        target_y: Option<Fixed>,
        /// Enemy for `focus`.
        #[serde(default)]
        target_enemy_id: Option<u32>,
    },

    /// Toggle manual control of a hero.
    #[serde(rename_all = "camelCase")]
    HeroControl {
        /// Target tick.
        tick: u32,
        /// Hero to toggle.
        hero_id: String,
        /// Enable or disable.
        enabled: bool,
    },

    /// Use an active skill.
    #[serde(rename_all = "camelCase")]
    ActivateSkill {
        /// Target tick.
        tick: u32,
        /// Skill id.
        skill_id: String,
    },

    /// Build a wall centered at `(x, y)`.
    #[serde(rename_all = "camelCase")]
    PlaceWall {
        /// Target tick.
        tick: u32,
        /// Wall type id.
        wall_type: String,
        /// Center x (Q16.16).
        x: Fixed,
        /// Center y (Q16.16).
        y: Fixed,
    },

    /// Demolish a wall. No refund.
    #[serde(rename_all = "camelCase")]
    RemoveWall {
        /// Target tick.
        tick: u32,
        /// Wall id.
        wall_id: u32,
    },

    /// Change how a turret picks targets.
    #[serde(rename_all = "camelCase")]
    SetTurretTargeting {
        /// Target tick.
        tick: u32,
        /// Turret slot.
        slot_index: u8,
        /// Mode name (`closest`, `weakest`, ...).
        mode: String,
    },

    /// Overcharge a turret.
    #[serde(rename_all = "camelCase")]
    ActivateOvercharge {
        /// Target tick.
        tick: u32,
        /// Turret slot.
        slot_index: u8,
    },

    /// Spawn a militia unit or squad at `(x, y)`.
    #[serde(rename_all = "camelCase")]
    SpawnMilitia {
        /// Target tick.
        tick: u32,
        /// Militia type id.
        militia_type: String,
        /// Spawn x (Q16.16).
        x: Fixed,
        /// Spawn y (Q16.16).
        y: Fixed,
        /// Squad size; absent means a single unit.
        #[serde(default)]
        count: Option<u32>,
    },
}

impl SimEvent {
    /// Tick this event targets.
    pub fn tick(&self) -> u32 {
        match self {
            Self::ChooseRelic { tick, .. }
            | Self::RerollRelics { tick }
            | Self::ActivateSnap { tick }
            | Self::HeroCommand { tick, .. }
            | Self::HeroControl { tick, .. }
            | Self::ActivateSkill { tick, .. }
            | Self::PlaceWall { tick, .. }
            | Self::RemoveWall { tick, .. }
            | Self::SetTurretTargeting { tick, .. }
            | Self::ActivateOvercharge { tick, .. }
            | Self::SpawnMilitia { tick, .. } => *tick,
        }
    }

    /// Wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChooseRelic { .. } => "CHOOSE_RELIC",
            Self::RerollRelics { .. } => "REROLL_RELICS",
            Self::ActivateSnap { .. } => "ACTIVATE_SNAP",
            Self::HeroCommand { .. } => "HERO_COMMAND",
            Self::HeroControl { .. } => "HERO_CONTROL",
            Self::ActivateSkill { .. } => "ACTIVATE_SKILL",
            Self::PlaceWall { .. } => "PLACE_WALL",
            Self::RemoveWall { .. } => "REMOVE_WALL",
            Self::SetTurretTargeting { .. } => "SET_TURRET_TARGETING",
            Self::ActivateOvercharge { .. } => "ACTIVATE_OVERCHARGE",
            Self::SpawnMilitia { .. } => "SPAWN_MILITIA",
        }
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// What a successfully applied event did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Applied {
    /// State changed; nothing to report.
    Accepted,
    /// Relic added to the run.
    RelicChosen {
        /// Chosen relic id.
        relic_id: String,
    },
    /// Choice options replaced.
    RelicsRerolled {
        /// New options.
        options: Vec<String>,
    },
    /// Intent queued for the tick pipeline.
    IntentQueued,
    /// Wall built.
    WallPlaced {
        /// New wall id.
        wall_id: u32,
    },
    /// Wall demolished.
    WallRemoved {
        /// Removed wall id.
        wall_id: u32,
    },
    /// Militia spawned.
    MilitiaSpawned {
        /// New unit ids.
        ids: Vec<u32>,
    },
}

/// Why an event was rejected.
///
/// `Display` is the human-readable reason; [`EventRejection::code`] is the
/// stable wire code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventRejection {
    /// Event targets a tick already simulated.
    #[error("Stale event: tick {event_tick} is before current tick {state_tick}")]
    StaleTick {
        /// Tick in the event.
        event_tick: u32,
        /// Current state tick.
        state_tick: u32,
    },

    /// Run is over.
    #[error("Run has ended")]
    RunEnded,

    /// No relic choice is open.
    #[error("No relic choice pending")]
    NotInChoice,

    /// Choice answered for the wrong wave.
    #[error("Wave mismatch: choice is for wave {expected}, got {got}")]
    WaveMismatch {
        /// Wave of the open choice.
        expected: u32,
        /// Wave in the event.
        got: u32,
    },

    /// Option index out of range.
    #[error("Invalid option index")]
    InvalidOptionIndex(u32),

    /// Event predates the choice it answers.
    #[error("Choice not yet available")]
    ChoiceNotYetOpen,

    /// Not enough gold.
    #[error("Not enough gold")]
    NotEnoughGold {
        /// Gold needed.
        required: u32,
        /// Gold held.
        available: u32,
    },

    /// Option generator produced nothing.
    #[error("No relic options available")]
    NoRelicOptions,

    /// Matrix missing or incomplete.
    #[error("Matrix not assembled")]
    MatrixNotAssembled,

    /// Matrix recharging.
    #[error("Snap on cooldown")]
    SnapOnCooldown,

    /// Nothing to hit.
    #[error("No enemies present")]
    NoEnemies,

    /// Same intent already waiting for resolution this tick.
    #[error("Already activated this tick")]
    AlreadyQueued,

    /// Hero id does not resolve.
    #[error("Hero not found")]
    HeroNotFound(String),

    /// Enemy id does not resolve.
    #[error("Target not found")]
    TargetNotFound(u32),

    /// Command needs a target that was not supplied.
    #[error("Missing command target")]
    MissingTarget,

    /// Skill not in the active set.
    #[error("Skill not active")]
    SkillNotActive(String),

    /// Skill recharging.
    #[error("Skill on cooldown")]
    SkillOnCooldown(String),

    /// Wall type not in the catalogue.
    #[error("Unknown wall type")]
    UnknownWallType(String),

    /// Footprint leaves the arena.
    #[error("Wall out of bounds")]
    OutOfBounds,

    /// Footprint overlaps an existing wall.
    #[error("Wall overlaps existing wall")]
    WallOverlap {
        /// Wall in the way.
        wall_id: u32,
    },

    /// Wall id does not resolve.
    #[error("Wall not found")]
    WallNotFound(u32),

    /// Slot has no turret.
    #[error("Turret not found")]
    TurretNotFound(u8),

    /// Mode string not recognised.
    #[error("Invalid targeting mode")]
    InvalidTargetingMode(String),

    /// Overcharge recharging.
    #[error("Overcharge on cooldown")]
    OverchargeOnCooldown,

    /// Overcharge already running.
    #[error("Overcharge already active")]
    OverchargeActive,

    /// Militia type not in the catalogue.
    #[error("Unknown militia type")]
    UnknownMilitiaType(String),

    /// Global militia cap reached.
    #[error("Militia cap reached")]
    MilitiaCapReached,

    /// Type still recharging.
    #[error("Militia spawn on cooldown")]
    MilitiaOnCooldown(String),

    /// Squad size zero or above the maximum.
    #[error("Invalid squad size")]
    InvalidSquadSize(u32),
}

impl EventRejection {
    /// Stable snake_case code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StaleTick { .. } => "stale_tick",
            Self::RunEnded => "run_ended",
            Self::NotInChoice => "not_in_choice",
            Self::WaveMismatch { .. } => "wave_mismatch",
            Self::InvalidOptionIndex(_) => "invalid_option_index",
            Self::ChoiceNotYetOpen => "choice_not_open",
            Self::NotEnoughGold { .. } => "not_enough_gold",
            Self::NoRelicOptions => "no_relic_options",
            Self::MatrixNotAssembled => "matrix_not_assembled",
            Self::SnapOnCooldown => "snap_on_cooldown",
            Self::NoEnemies => "no_enemies",
            Self::AlreadyQueued => "already_queued",
            Self::HeroNotFound(_) => "hero_not_found",
            Self::TargetNotFound(_) => "target_not_found",
            Self::MissingTarget => "missing_target",
            Self::SkillNotActive(_) => "skill_not_active",
            Self::SkillOnCooldown(_) => "skill_on_cooldown",
            Self::UnknownWallType(_) => "unknown_wall_type",
            Self::OutOfBounds => "out_of_bounds",
            Self::WallOverlap { .. } => "wall_overlap",
            Self::WallNotFound(_) => "wall_not_found",
            Self::TurretNotFound(_) => "turret_not_found",
            Self::InvalidTargetingMode(_) => "invalid_targeting_mode",
            Self::OverchargeOnCooldown => "overcharge_on_cooldown",
            Self::OverchargeActive => "overcharge_active",
            Self::UnknownMilitiaType(_) => "unknown_militia_type",
            Self::MilitiaCapReached => "militia_cap_reached",
            Self::MilitiaOnCooldown(_) => "militia_on_cooldown",
            Self::InvalidSquadSize(_) => "invalid_squad_size",
        }
    }
}
