//! Authoritative Simulation Tick
//!
//! The step function that must be 100% deterministic. Client and audit
//! replayer both run exactly this code.
//!
//! Order within a tick:
//!
//! 1. Apply the tick's events in submission order
//! 2. Resolve queued intents (snap, skills)
//! 3. Clear dead enemies
//! 4. Decay timers
//! 5. Advance the tick counter
//! 6. Start the next wave when the interval elapses
//! 7. Check end conditions

use tracing::debug;

use crate::core::fixed::{fixed_mul, from_int, to_int};
use crate::core::vec2::FixedVec2;
use crate::game::apply::apply_event;
use crate::game::config::SimConfig;
use crate::game::events::{Applied, EventRejection, SimEvent};
use crate::game::relic::RelicOptionGenerator;
use crate::game::state::{GameState, PendingIntent};

/// Gold granted at the start of each wave, before the gold multiplier.
pub const WAVE_GOLD_REWARD: u32 = 40;

/// Every n-th wave ends with a boss that grants a relic choice.
pub const BOSS_WAVE_INTERVAL: u32 = 5;

/// Most enemies spawned by a single wave.
pub const MAX_WAVE_ENEMIES: u32 = 20;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Outcome per input event, in submission order.
    pub outcomes: Vec<Result<Applied, EventRejection>>,
    /// Enemies removed by a snap this tick.
    pub snapped: Vec<u32>,
    /// Skills that fired this tick.
    pub skills_fired: Vec<String>,
    /// Wave started at the end of this tick.
    pub wave_started: Option<u32>,
    /// Whether the run ended this tick.
    pub run_ended: bool,
}

impl TickResult {
    /// Number of rejected events.
    pub fn rejected_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_err()).count()
    }
}

/// Run one simulation tick.
///
/// # Arguments
///
/// * `state` - The run state (will be mutated)
/// * `events` - Events for this tick, in submission order
/// * `config` - Simulation configuration
/// * `generator` - Relic option source for rerolls and boss choices
///
/// # Determinism
///
/// - Uses BTreeMap for iteration order
/// - Uses fixed-point math only
/// - Uses deterministic RNG (state.rng)
/// - No system calls, no floating point
pub fn step(
    state: &mut GameState,
    events: &[SimEvent],
    config: &SimConfig,
    generator: &mut dyn RelicOptionGenerator,
) -> TickResult {
    let mut result = TickResult::default();

    if state.is_ended() {
        result.outcomes = events.iter().map(|_| Err(EventRejection::RunEnded)).collect();
        result.run_ended = true;
        return result;
    }

    // 1. Events
    for event in events {
        result.outcomes.push(apply_event(event, state, config, generator));
    }

    // 2. Intents
    resolve_intents(state, config, &mut result);

    // 3. Corpses
    state.enemies.retain(|_, enemy| enemy.is_alive());

    // 4. Timers
    decay_timers(state);

    // 5. Tick
    state.advance_tick();

    // 6. Waves
    if state.wave_interval > 0 && state.tick() % state.wave_interval == 0 {
        result.wave_started = start_wave(state, config, generator);
    }

    // 7. End conditions
    check_end_conditions(state);
    result.run_ended = state.is_ended();

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(
        tick = state.tick(),
        fingerprint = %crate::core::hash::hash_to_hex(&state.fingerprint()),
        "Tick complete"
    );

    result
}

/// Execute intents queued by `ACTIVATE_SNAP` / `ACTIVATE_SKILL`.
fn resolve_intents(state: &mut GameState, config: &SimConfig, result: &mut TickResult) {
    for intent in state.take_intents() {
        match intent {
            PendingIntent::Snap => {
                let live = state.live_enemy_ids();
                let victims = state.rng.pick_n(&live, live.len().div_ceil(2));
                for id in &victims {
                    state.enemies.remove(id);
                }
                if let Some(matrix) = state.matrix_state.as_mut() {
                    matrix.cooldown = config.matrix_cooldown;
                }
                debug!(tick = state.tick(), removed = victims.len(), "Snap resolved");
                result.snapped.extend(victims);
            }
            PendingIntent::Skill { skill_id } => {
                let cooldown = state.modifiers().reduce_cooldown(config.skill_cooldown(&skill_id));
                state.skill_cooldowns.insert(skill_id.clone(), cooldown);
                debug!(tick = state.tick(), skill = %skill_id, cooldown, "Skill resolved");
                result.skills_fired.push(skill_id);
            }
        }
    }
}

/// Count every timer down by one tick. Expired militia disband.
fn decay_timers(state: &mut GameState) {
    for cooldown in state.skill_cooldowns.values_mut() {
        *cooldown = cooldown.saturating_sub(1);
    }

    if let Some(matrix) = state.matrix_state.as_mut() {
        matrix.cooldown = matrix.cooldown.saturating_sub(1);
    }

    for turret in state.turrets.values_mut() {
        turret.overcharge_cooldown = turret.overcharge_cooldown.saturating_sub(1);
        turret.overcharge_active_ticks = turret.overcharge_active_ticks.saturating_sub(1);
    }

    for unit in state.militia.values_mut() {
        unit.remaining_ticks = unit.remaining_ticks.saturating_sub(1);
    }
    state.militia.retain(|_, unit| unit.remaining_ticks > 0);

    for cooldown in state.militia_spawn_cooldowns.values_mut() {
        *cooldown = cooldown.saturating_sub(1);
    }
    state.militia_spawn_cooldowns.retain(|_, cooldown| *cooldown > 0);
}

/// Begin the next wave: grant gold, spawn enemies, open a relic choice on
/// boss waves. Returns the new wave number, or `None` if the wave bound
/// ended the run instead.
fn start_wave(
    state: &mut GameState,
    config: &SimConfig,
    generator: &mut dyn RelicOptionGenerator,
) -> Option<u32> {
    let wave = state.wave + 1;
    if state.limits.max_waves > 0 && wave > state.limits.max_waves {
        state.end();
        return None;
    }
    state.wave = wave;

    let reward = fixed_mul(from_int(WAVE_GOLD_REWARD as i32), state.modifiers().gold_mult);
    state.gold = state.gold.saturating_add(to_int(reward).max(0) as u32);

    let count = (2 + wave).min(MAX_WAVE_ENEMIES);
    let max_row = to_int(config.arena_height);
    for _ in 0..count {
        let row = state.rng.next_int(0, max_row);
        let position = FixedVec2::new(config.arena_width, from_int(row));
        state.spawn_enemy("grunt", position, 40 + 10 * wave);
    }

    if wave % BOSS_WAVE_INTERVAL == 0 {
        state.spawn_enemy("boss", FixedVec2::new(config.arena_width, config.arena_height / 2), 200 * wave);
        if !state.in_choice() {
            open_relic_choice(state, generator);
        }
    }

    debug!(tick = state.tick(), wave, enemies = state.enemies.len(), gold = state.gold, "Wave started");
    Some(wave)
}

/// Move the run from idle into a relic choice for the current wave.
///
/// Draws from the run RNG. Returns `false` (and stays idle) when already in
/// a choice or when the generator has nothing to offer.
pub fn open_relic_choice(state: &mut GameState, generator: &mut dyn RelicOptionGenerator) -> bool {
    if state.in_choice() {
        return false;
    }
    let mut rng = state.rng.clone();
    let options = generator.generate(state.wave, state, &mut rng);
    state.rng = rng;
    if options.is_empty() {
        return false;
    }
    state.open_choice(state.wave, options);
    true
}

fn check_end_conditions(state: &mut GameState) {
    if state.fortress_hp <= 0 {
        debug!(tick = state.tick(), "Fortress destroyed");
        state.end();
    }
    if state.limits.max_ticks > 0 && state.tick() >= state.limits.max_ticks {
        state.end();
    }
}

// =============================================================================
// TESTS
// =============================================================================
