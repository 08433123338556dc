//! Game State Definitions
//!
//! The aggregate record of one simulation instant.
//! Uses BTreeMap for deterministic iteration order.
//!
//! Fields whose consistency matters (tick, relics and modifiers, the relic
//! choice) are private and only change through the methods below.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use crate::core::rng::DeterministicRng;
use crate::core::hash::StateHash;
use crate::game::config::{ConfigSnapshot, SimConfig};
use crate::game::definitions::Definitions;
use crate::game::relic::{ActiveRelic, PendingChoice, RelicModifiers, reconcile_max_hp};

/// Fortress HP of a bare state built with [`GameState::new`].
pub const DEFAULT_FORTRESS_HP: i32 = 1000;

// =============================================================================
// HEROES
// =============================================================================

/// What a hero is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
#[derive(Default)]
pub enum HeroActivity {
    /// No enemies, no orders.
    #[default]
    Idle = 0,
    /// Fighting.
    Combat = 1,
    /// Walking to a commanded position.
    Moving = 2,
    /// Falling back to the rally point.
    Retreating = 3,
}

/// State of a single hero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroState {
    /// Hero type id (also the collection key).
    pub definition_id: String,
    /// Current position.
    pub position: FixedVec2,
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Current activity.
    pub state: HeroActivity,
    /// Ordered destination, if any.
    pub command_target: Option<FixedVec2>,
    /// Following a player order rather than AI.
    pub is_commanded: bool,
    /// Enemy the player asked this hero to focus.
    pub focus_target_id: Option<u32>,
    /// Enemy currently being attacked.
    pub target_id: Option<u32>,
    /// Under manual control.
    pub manual_control: bool,
}

impl HeroState {
    /// Fresh hero at `position`.
    pub fn new(definition_id: &str, position: FixedVec2, max_hp: u32) -> Self {
        Self {
            definition_id: definition_id.to_string(),
            position,
            hp: max_hp,
            max_hp,
            state: HeroActivity::Idle,
            command_target: None,
            is_commanded: false,
            focus_target_id: None,
            target_id: None,
            manual_control: false,
        }
    }
}

// =============================================================================
// ENEMIES
// =============================================================================

/// State of a single enemy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyState {
    /// Unique id within the run.
    pub id: u32,
    /// Enemy type id.
    pub kind: String,
    /// Current position.
    pub position: FixedVec2,
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
}

impl EnemyState {
    /// Still in the fight?
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

// =============================================================================
// TURRETS
// =============================================================================

/// Turret target selection mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
#[derive(Default)]
pub enum TargetingMode {
    /// Nearest enemy.
    #[default]
    Closest = 0,
    /// Lowest HP.
    Weakest = 1,
    /// Highest HP.
    Strongest = 2,
    /// Furthest along the path.
    First = 3,
    /// Least far along the path.
    Last = 4,
    /// Fastest moving.
    Fastest = 5,
}

impl TargetingMode {
    /// Every mode, in wire order.
    pub const ALL: [TargetingMode; 6] = [
        Self::Closest,
        Self::Weakest,
        Self::Strongest,
        Self::First,
        Self::Last,
        Self::Fastest,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closest => "closest",
            Self::Weakest => "weakest",
            Self::Strongest => "strongest",
            Self::First => "first",
            Self::Last => "last",
            Self::Fastest => "fastest",
        }
    }
}

impl fmt::Display for TargetingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised targeting mode string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown targeting mode: {0}")]
pub struct UnknownTargetingMode(pub String);

impl FromStr for TargetingMode {
    type Err = UnknownTargetingMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownTargetingMode(s.to_string()))
    }
}

/// State of a turret in a fortress slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurretState {
    /// Slot index (collection key).
    pub slot_index: u8,
    /// Turret type id.
    pub definition_id: String,
    /// Target selection mode.
    pub targeting: TargetingMode,
    /// Ticks until overcharge is available (0 = ready).
    pub overcharge_cooldown: u32,
    /// Ticks of overcharge left (0 = inactive).
    pub overcharge_active_ticks: u32,
}

impl TurretState {
    /// Fresh turret with default targeting.
    pub fn new(slot_index: u8, definition_id: &str) -> Self {
        Self {
            slot_index,
            definition_id: definition_id.to_string(),
            targeting: TargetingMode::default(),
            overcharge_cooldown: 0,
            overcharge_active_ticks: 0,
        }
    }

    /// Is overcharge running?
    #[inline]
    pub fn is_overcharged(&self) -> bool {
        self.overcharge_active_ticks > 0
    }
}

// =============================================================================
// WALLS & MILITIA
// =============================================================================

/// A placed wall. `position` is the footprint center.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallState {
    /// Unique id within the run.
    pub id: u32,
    /// Wall type id.
    pub wall_type: String,
    /// Footprint center.
    pub position: FixedVec2,
    /// Footprint width.
    pub width: Fixed,
    /// Footprint height.
    pub height: Fixed,
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
}

/// A militia unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilitiaState {
    /// Unique id within the run.
    pub id: u32,
    /// Militia type id.
    pub militia_type: String,
    /// Current position.
    pub position: FixedVec2,
    /// Current hit points.
    pub hp: u32,
    /// Ticks until the unit disbands.
    pub remaining_ticks: u32,
}

// =============================================================================
// MATRIX & INTENTS
// =============================================================================

/// Late-game matrix mechanic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixState {
    /// All pieces collected.
    pub assembled: bool,
    /// Ticks until the snap is available again.
    pub cooldown: u32,
}

/// Effect accepted by the event engine, executed by the tick pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingIntent {
    /// Matrix snap.
    Snap,
    /// Skill activation.
    Skill {
        /// Skill id.
        skill_id: String,
    },
}

/// Hard bounds for a run, taken from the run token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// The run ends when the tick reaches this value (0 = unbounded).
    pub max_ticks: u32,
    /// The run ends when the wave exceeds this value (0 = unbounded).
    pub max_waves: u32,
}

// =============================================================================
// SETUP ERRORS
// =============================================================================

/// A run snapshot that cannot produce a valid starting state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    /// Hero id not in the catalogue.
    #[error("unknown hero: {0}")]
    UnknownHero(String),

    /// Same hero listed twice.
    #[error("duplicate hero: {0}")]
    DuplicateHero(String),

    /// Turret id not in the catalogue.
    #[error("unknown turret: {0}")]
    UnknownTurret(String),

    /// Two turrets in one slot.
    #[error("duplicate turret slot: {0}")]
    DuplicateTurretSlot(u8),

    /// Base HP must be positive.
    #[error("invalid fortress base hp: {0}")]
    InvalidBaseHp(i32),
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Complete state of one run.
///
/// Serialize-only. Relics and their derived modifiers change only through
/// the event engine.
#[derive(Clone, Debug, Serialize)]
pub struct GameState {
    tick: u32,
    ended: bool,

    /// Spendable gold.
    pub gold: u32,
    /// Current fortress HP.
    pub fortress_hp: i32,
    /// Maximum fortress HP. Never decreases within a run.
    pub fortress_max_hp: i32,
    /// Current wave (0 before the first wave).
    pub wave: u32,

    relics: Vec<ActiveRelic>,
    modifiers: RelicModifiers,
    choice: Option<PendingChoice>,
    choice_tick: u32,

    /// Heroes by definition id.
    pub heroes: BTreeMap<String, HeroState>,
    /// Enemies by id.
    pub enemies: BTreeMap<u32, EnemyState>,
    /// Turrets by slot.
    pub turrets: BTreeMap<u8, TurretState>,
    /// Walls by id.
    pub walls: BTreeMap<u32, WallState>,
    /// Militia by id.
    pub militia: BTreeMap<u32, MilitiaState>,

    /// Skills available this run.
    pub active_skills: BTreeSet<String>,
    /// Ticks remaining per skill (0 = ready).
    pub skill_cooldowns: BTreeMap<String, u32>,
    /// Ticks remaining per militia type before it can spawn again.
    pub militia_spawn_cooldowns: BTreeMap<String, u32>,
    /// Matrix mechanic, if unlocked.
    pub matrix_state: Option<MatrixState>,

    pending_intents: Vec<PendingIntent>,

    /// Deterministic RNG owned by this run.
    pub rng: DeterministicRng,

    next_enemy_id: u32,
    next_wall_id: u32,
    next_militia_id: u32,

    /// Ticks per wave (0 = waves advance only when started explicitly).
    pub wave_interval: u32,
    /// Hard run bounds.
    pub limits: RunLimits,
}

impl GameState {
    /// Create an empty state seeded with `seed`.
    pub fn new(seed: u32) -> Self {
        Self {
            tick: 0,
            ended: false,
            gold: 0,
            fortress_hp: DEFAULT_FORTRESS_HP,
            fortress_max_hp: DEFAULT_FORTRESS_HP,
            wave: 0,
            relics: Vec::new(),
            modifiers: RelicModifiers::NEUTRAL,
            choice: None,
            choice_tick: 0,
            heroes: BTreeMap::new(),
            enemies: BTreeMap::new(),
            turrets: BTreeMap::new(),
            walls: BTreeMap::new(),
            militia: BTreeMap::new(),
            active_skills: BTreeSet::new(),
            skill_cooldowns: BTreeMap::new(),
            militia_spawn_cooldowns: BTreeMap::new(),
            matrix_state: None,
            pending_intents: Vec::new(),
            rng: DeterministicRng::new(seed),
            next_enemy_id: 1,
            next_wall_id: 1,
            next_militia_id: 1,
            wave_interval: 0,
            limits: RunLimits::default(),
        }
    }

    /// Build the starting state of a run from its signed snapshot.
    ///
    /// Heroes stand in a column near the rally point; their skills become
    /// active with zero cooldown.
    pub fn new_run(seed: u32, snapshot: &ConfigSnapshot, config: &SimConfig) -> Result<Self, SetupError> {
        if snapshot.fortress_base_hp <= 0 {
            return Err(SetupError::InvalidBaseHp(snapshot.fortress_base_hp));
        }

        let mut state = Self::new(seed);
        state.gold = snapshot.starting_gold;
        state.fortress_max_hp = snapshot.fortress_max_hp();
        state.fortress_hp = state.fortress_max_hp;
        state.wave_interval = snapshot.wave_interval_ticks;

        for (i, hero_id) in snapshot.heroes.iter().enumerate() {
            let def = config
                .definitions
                .hero(hero_id)
                .ok_or_else(|| SetupError::UnknownHero(hero_id.clone()))?;
            if state.heroes.contains_key(hero_id) {
                return Err(SetupError::DuplicateHero(hero_id.clone()));
            }

            let offset = FixedVec2::new(0, (i as Fixed).wrapping_mul(config.squad_spacing));
            let position = (config.rally_point + offset)
                .clamp_to_field(config.arena_width, config.arena_height);
            state.heroes.insert(hero_id.clone(), HeroState::new(hero_id, position, def.max_hp));

            for skill in &def.skills {
                state.active_skills.insert(skill.clone());
                state.skill_cooldowns.insert(skill.clone(), 0);
            }
        }

        for loadout in &snapshot.turrets {
            if config.definitions.turret(&loadout.definition_id).is_none() {
                return Err(SetupError::UnknownTurret(loadout.definition_id.clone()));
            }
            if state.turrets.contains_key(&loadout.slot_index) {
                return Err(SetupError::DuplicateTurretSlot(loadout.slot_index));
            }
            state.turrets.insert(
                loadout.slot_index,
                TurretState::new(loadout.slot_index, &loadout.definition_id),
            );
        }

        if snapshot.matrix_unlocked {
            state.matrix_state = Some(MatrixState::default());
        }

        Ok(state)
    }

    /// Attach run bounds.
    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    // =========================================================================
    // Tick & lifecycle
    // =========================================================================

    /// Current tick.
    #[inline]
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Advance one tick.
    pub fn advance_tick(&mut self) {
        self.tick = self.tick.saturating_add(1);
    }

    /// Move forward to `tick`. Never moves backwards.
    pub fn advance_to(&mut self, tick: u32) {
        self.tick = self.tick.max(tick);
    }

    /// Has the run ended?
    #[inline]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// End the run. Irreversible.
    pub fn end(&mut self) {
        self.ended = true;
    }

    // =========================================================================
    // Relics
    // =========================================================================

    /// Owned relics in acquisition order.
    pub fn relics(&self) -> &[ActiveRelic] {
        &self.relics
    }

    /// Modifiers derived from the owned relics.
    pub fn modifiers(&self) -> &RelicModifiers {
        &self.modifiers
    }

    /// Does the run own this relic?
    pub fn owns_relic(&self, id: &str) -> bool {
        self.relics.iter().any(|r| r.id == id)
    }

    /// Append a relic, recompute modifiers and reconcile fortress HP.
    ///
    /// The only way relics or modifiers change.
    pub(crate) fn acquire_relic(&mut self, id: &str, wave: u32, defs: &Definitions) {
        let previous = self.modifiers;
        self.relics.push(ActiveRelic {
            id: id.to_string(),
            acquired_wave: wave,
            acquired_tick: self.tick,
        });
        self.modifiers = RelicModifiers::from_relics(&self.relics, defs);

        let (max_hp, hp) = reconcile_max_hp(
            self.fortress_max_hp,
            self.fortress_hp,
            previous.max_hp_mult,
            self.modifiers.max_hp_mult,
        );
        self.fortress_max_hp = max_hp;
        self.fortress_hp = hp;
    }

    // =========================================================================
    // Relic choice
    // =========================================================================

    /// Is a relic choice pending?
    #[inline]
    pub fn in_choice(&self) -> bool {
        self.choice.is_some()
    }

    /// The pending choice, if any.
    pub fn pending_choice(&self) -> Option<&PendingChoice> {
        self.choice.as_ref()
    }

    /// Tick at which the pending choice opened.
    pub fn pending_choice_tick(&self) -> Option<u32> {
        self.choice.as_ref().map(|_| self.choice_tick)
    }

    /// Open a relic choice at the current tick. Replaces any open choice.
    pub(crate) fn open_choice(&mut self, wave: u32, options: Vec<String>) {
        self.choice = Some(PendingChoice { wave, options });
        self.choice_tick = self.tick;
    }

    /// Close the pending choice, returning it.
    pub(crate) fn take_choice(&mut self) -> Option<PendingChoice> {
        self.choice_tick = 0;
        self.choice.take()
    }

    /// Swap the options of the pending choice. No-op without a choice.
    pub(crate) fn replace_choice_options(&mut self, options: Vec<String>) {
        if let Some(choice) = self.choice.as_mut() {
            choice.options = options;
        }
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Add an enemy, returning its id.
    pub fn spawn_enemy(&mut self, kind: &str, position: FixedVec2, hp: u32) -> u32 {
        let id = self.next_enemy_id;
        self.next_enemy_id = self.next_enemy_id.wrapping_add(1);
        self.enemies.insert(id, EnemyState {
            id,
            kind: kind.to_string(),
            position,
            hp,
            max_hp: hp,
        });
        id
    }

    /// Ids of enemies with HP left, ascending.
    pub fn live_enemy_ids(&self) -> Vec<u32> {
        self.enemies
            .values()
            .filter(|e| e.is_alive())
            .map(|e| e.id)
            .collect()
    }

    /// Any enemy with HP left?
    pub fn has_live_enemies(&self) -> bool {
        self.enemies.values().any(EnemyState::is_alive)
    }

    pub(crate) fn allocate_wall_id(&mut self) -> u32 {
        let id = self.next_wall_id;
        self.next_wall_id = self.next_wall_id.wrapping_add(1);
        id
    }

    pub(crate) fn allocate_militia_id(&mut self) -> u32 {
        let id = self.next_militia_id;
        self.next_militia_id = self.next_militia_id.wrapping_add(1);
        id
    }

    /// Next ids to be handed out: (enemy, wall, militia).
    pub fn id_counters(&self) -> (u32, u32, u32) {
        (self.next_enemy_id, self.next_wall_id, self.next_militia_id)
    }

    /// Mark the matrix as assembled. No-op if the mechanic is locked.
    pub fn assemble_matrix(&mut self) {
        if let Some(matrix) = self.matrix_state.as_mut() {
            matrix.assembled = true;
        }
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Queued intents awaiting resolution.
    pub fn pending_intents(&self) -> &[PendingIntent] {
        &self.pending_intents
    }

    pub(crate) fn queue_intent(&mut self, intent: PendingIntent) {
        self.pending_intents.push(intent);
    }

    /// Take queued intents (clears the queue).
    pub fn take_intents(&mut self) -> Vec<PendingIntent> {
        std::mem::take(&mut self.pending_intents)
    }

    /// Compute the audit fingerprint of this state.
    pub fn fingerprint(&self) -> StateHash {
        crate::audit::fingerprint::state_fingerprint(self)
    }
}

// =============================================================================
// TESTS
// =============================================================================
