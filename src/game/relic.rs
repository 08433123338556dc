//! Relics
//!
//! Acquired relics, the modifiers derived from them, the pending-choice
//! sub-state and the option generator used for choices and rerolls.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, FIXED_ONE, fixed_add, fixed_clamp, fixed_mul};
use crate::core::rng::DeterministicRng;
use crate::game::config::SimConfig;
use crate::game::definitions::Definitions;
use crate::game::state::GameState;

/// Upper bound on skill cooldown reduction (50%).
pub const MAX_COOLDOWN_REDUCTION: Fixed = FIXED_ONE / 2;

// =============================================================================
// ACTIVE RELIC
// =============================================================================

/// A relic owned by the run. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRelic {
    /// Relic definition id.
    pub id: String,
    /// Wave during which it was chosen.
    pub acquired_wave: u32,
    /// Tick at which it was chosen.
    pub acquired_tick: u32,
}

// =============================================================================
// DERIVED MODIFIERS
// =============================================================================

/// Aggregate modifiers. Always the pure image of the owned relic list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelicModifiers {
    /// Damage multiplier.
    pub damage_mult: Fixed,
    /// Fortress max HP multiplier.
    pub max_hp_mult: Fixed,
    /// Gold income multiplier.
    pub gold_mult: Fixed,
    /// Fraction shaved off skill cooldowns, in `[0, MAX_COOLDOWN_REDUCTION]`.
    pub cooldown_reduction: Fixed,
}

impl Default for RelicModifiers {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl RelicModifiers {
    /// Modifiers with no relics.
    pub const NEUTRAL: Self = Self {
        damage_mult: FIXED_ONE,
        max_hp_mult: FIXED_ONE,
        gold_mult: FIXED_ONE,
        cooldown_reduction: 0,
    };

    /// Compute modifiers from a relic list. Unknown ids contribute nothing.
    pub fn from_relics(relics: &[ActiveRelic], defs: &Definitions) -> Self {
        let mut mods = Self::NEUTRAL;
        for relic in relics {
            if let Some(def) = defs.relic(&relic.id) {
                mods.damage_mult = fixed_add(mods.damage_mult, def.bonus.damage);
                mods.max_hp_mult = fixed_add(mods.max_hp_mult, def.bonus.max_hp);
                mods.gold_mult = fixed_add(mods.gold_mult, def.bonus.gold);
                mods.cooldown_reduction = fixed_add(mods.cooldown_reduction, def.bonus.cooldown_reduction);
            }
        }
        mods.cooldown_reduction = fixed_clamp(mods.cooldown_reduction, 0, MAX_COOLDOWN_REDUCTION);
        mods
    }

    /// Apply cooldown reduction to a base cooldown (in ticks).
    pub fn reduce_cooldown(&self, base: u32) -> u32 {
        let base_fixed = base.min(i16::MAX as u32) as Fixed * FIXED_ONE;
        let shaved = fixed_mul(base_fixed, self.cooldown_reduction) >> 16;
        base.saturating_sub(shaved.max(0) as u32)
    }
}

/// Reconcile fortress HP after the max HP multiplier changes.
///
/// Divides the previous multiplier out of the current max to recover the
/// base, reapplies the new multiplier, and only ever grants the difference.
/// Both steps floor. A non-positive previous multiplier leaves the current
/// max as the base. Returns `(max_hp, hp)`.
pub fn reconcile_max_hp(max_hp: i32, hp: i32, prev_mult: Fixed, new_mult: Fixed) -> (i32, i32) {
    let one = FIXED_ONE as i64;
    let base = if prev_mult <= 0 {
        max_hp as i64
    } else {
        (max_hp as i64 * one).div_euclid(prev_mult as i64)
    };
    let candidate = (base * new_mult as i64).div_euclid(one).min(i32::MAX as i64);

    if candidate <= max_hp as i64 {
        return (max_hp, hp);
    }

    let delta = candidate - max_hp as i64;
    let new_max = candidate as i32;
    let new_hp = (hp as i64 + delta).min(new_max as i64) as i32;
    (new_max, new_hp)
}

// =============================================================================
// PENDING CHOICE
// =============================================================================

/// A "pick one of N relics" offer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChoice {
    /// Wave that granted the choice.
    pub wave: u32,
    /// Offered relic ids.
    pub options: Vec<String>,
}

// =============================================================================
// OPTION GENERATION
// =============================================================================

/// Supplies relic options for choices and rerolls.
///
/// Receives a generator to draw from; the caller decides whether the draws
/// are committed to the run RNG.
pub trait RelicOptionGenerator {
    /// Produce the options for `wave`. An empty result means nothing can be offered.
    fn generate(&mut self, wave: u32, state: &GameState, rng: &mut DeterministicRng) -> Vec<String>;
}

impl<F> RelicOptionGenerator for F
where
    F: FnMut(u32, &GameState, &mut DeterministicRng) -> Vec<String>,
{
    fn generate(&mut self, wave: u32, state: &GameState, rng: &mut DeterministicRng) -> Vec<String> {
        self(wave, state, rng)
    }
}

/// Draws options uniformly from catalogue relics the run does not own.
#[derive(Clone, Debug)]
pub struct SeededRelicPool {
    relic_ids: Vec<String>,
    choice_size: usize,
}

impl SeededRelicPool {
    /// Create a pool over explicit ids.
    pub fn new(relic_ids: Vec<String>, choice_size: usize) -> Self {
        Self { relic_ids, choice_size }
    }

    /// Pool over every relic in the config catalogue.
    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.definitions.relic_ids(), config.relic_choice_size)
    }
}

impl RelicOptionGenerator for SeededRelicPool {
    fn generate(&mut self, _wave: u32, state: &GameState, rng: &mut DeterministicRng) -> Vec<String> {
        let available: Vec<String> = self
            .relic_ids
            .iter()
            .filter(|id| !state.owns_relic(id))
            .cloned()
            .collect();
        rng.pick_n(&available, self.choice_size)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::from_int;

    fn relic(id: &str) -> ActiveRelic {
        ActiveRelic { id: id.into(), acquired_wave: 1, acquired_tick: 10 }
    }

    #[test]
    fn test_modifiers_from_relics() {
        let defs = Definitions::builtin();
        assert_eq!(RelicModifiers::from_relics(&[], &defs), RelicModifiers::NEUTRAL);

        let mods = RelicModifiers::from_relics(&[relic("iron_heart"), relic("titan_core")], &defs);
        assert!(mods.max_hp_mult > FIXED_ONE);
        assert!(mods.damage_mult > FIXED_ONE);
        assert_eq!(mods.gold_mult, FIXED_ONE);

        // Unknown relic is ignored
        let mods2 = RelicModifiers::from_relics(&[relic("iron_heart"), relic("nope")], &defs);
        assert_eq!(mods2, RelicModifiers::from_relics(&[relic("iron_heart")], &defs));
    }

    #[test]
    fn test_cooldown_reduction_capped() {
        let defs = Definitions::builtin();
        let many: Vec<_> = (0..20).map(|_| relic("hourglass")).collect();
        let mods = RelicModifiers::from_relics(&many, &defs);
        assert_eq!(mods.cooldown_reduction, MAX_COOLDOWN_REDUCTION);
        assert_eq!(mods.reduce_cooldown(600), 300);
        assert_eq!(RelicModifiers::NEUTRAL.reduce_cooldown(600), 600);
    }

    #[test]
    fn test_reconcile_grants_delta() {
        // 1000 max at 1.0 -> 1.2: +200, damaged fortress heals by exactly 200
        let (max, hp) = reconcile_max_hp(1000, 600, FIXED_ONE, FIXED_ONE + FIXED_ONE / 5);
        assert_eq!(max, 1199); // 0.2 is not exact in Q16.16; floor loses a unit
        assert_eq!(hp, 799);
    }

    #[test]
    fn test_reconcile_exact_multiplier() {
        let (max, hp) = reconcile_max_hp(1000, 1000, FIXED_ONE, from_int(2));
        assert_eq!((max, hp), (2000, 2000));

        let (max, hp) = reconcile_max_hp(2000, 500, from_int(2), from_int(3));
        assert_eq!((max, hp), (3000, 1500));
    }

    #[test]
    fn test_reconcile_never_shrinks() {
        let (max, hp) = reconcile_max_hp(1000, 900, FIXED_ONE, FIXED_ONE / 2);
        assert_eq!((max, hp), (1000, 900));
    }

    #[test]
    fn test_reconcile_non_positive_previous() {
        let (max, hp) = reconcile_max_hp(1000, 400, 0, from_int(2));
        assert_eq!((max, hp), (2000, 1400));

        let (max, hp) = reconcile_max_hp(1000, 400, -FIXED_ONE, FIXED_ONE);
        assert_eq!((max, hp), (1000, 400));
    }

    #[test]
    fn test_closure_generator() {
        let state = GameState::new(7);
        let mut rng = DeterministicRng::new(7);
        let mut gen = |wave: u32, _: &GameState, _: &mut DeterministicRng| vec![format!("relic_{wave}")];
        assert_eq!(gen.generate(4, &state, &mut rng), vec!["relic_4".to_string()]);
    }

    #[test]
    fn test_seeded_pool_excludes_owned() {
        let config = SimConfig::default();
        let mut state = GameState::new(99);
        state.acquire_relic("iron_heart", 1, &config.definitions);

        let mut pool = SeededRelicPool::from_config(&config);
        let mut rng = DeterministicRng::new(5);
        for _ in 0..50 {
            let options = pool.generate(2, &state, &mut rng);
            assert_eq!(options.len(), config.relic_choice_size);
            assert!(!options.iter().any(|o| o == "iron_heart"));
        }
    }
}
