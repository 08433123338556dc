//! State Fingerprints
//!
//! Canonical encoding of a [`GameState`] into a SHA-256 digest, and the
//! comparison of client-reported fingerprints against replayed ones.
//!
//! Encoding order (all integers little-endian, strings length-prefixed):
//!
//! ```text
//! tick, ended, gold, fortress hp, fortress max hp, wave, rng word,
//! relics, relic choice, heroes, enemies, turrets, walls, militia,
//! active skills, skill cooldowns, militia spawn cooldowns, matrix,
//! pending intents, id counters
//! ```
//!
//! Collections are written as a u32 count followed by entries in key order.
//! Modifiers are not written: they are a function of the relics.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};

use crate::core::hash::{hash_from_hex, hash_to_hex, StateHash, StateHasher};
use crate::game::state::{GameState, PendingIntent};

/// Fingerprint `state`.
pub fn state_fingerprint(state: &GameState) -> StateHash {
    let mut h = StateHasher::for_run_state();

    h.update_u32(state.tick());
    h.update_bool(state.is_ended());
    h.update_u32(state.gold);
    h.update_i32(state.fortress_hp);
    h.update_i32(state.fortress_max_hp);
    h.update_u32(state.wave);
    h.update_u32(state.rng.state());

    h.update_u32(state.relics().len() as u32);
    for relic in state.relics() {
        h.update_str(&relic.id);
        h.update_u32(relic.acquired_wave);
        h.update_u32(relic.acquired_tick);
    }

    match (state.pending_choice(), state.pending_choice_tick()) {
        (Some(choice), Some(tick)) => {
            h.update_u8(1);
            h.update_u32(choice.wave);
            h.update_u32(choice.options.len() as u32);
            for option in &choice.options {
                h.update_str(option);
            }
            h.update_u32(tick);
        }
        _ => h.update_u8(0),
    }

    h.update_u32(state.heroes.len() as u32);
    for (id, hero) in &state.heroes {
        h.update_str(id);
        h.update_vec2(hero.position);
        h.update_u32(hero.hp);
        h.update_u32(hero.max_hp);
        h.update_u8(hero.state as u8);
        h.update_opt_vec2(hero.command_target);
        h.update_bool(hero.is_commanded);
        h.update_opt_u32(hero.focus_target_id);
        h.update_opt_u32(hero.target_id);
        h.update_bool(hero.manual_control);
    }

    h.update_u32(state.enemies.len() as u32);
    for enemy in state.enemies.values() {
        h.update_u32(enemy.id);
        h.update_str(&enemy.kind);
        h.update_vec2(enemy.position);
        h.update_u32(enemy.hp);
        h.update_u32(enemy.max_hp);
    }

    h.update_u32(state.turrets.len() as u32);
    for turret in state.turrets.values() {
        h.update_u8(turret.slot_index);
        h.update_str(&turret.definition_id);
        h.update_u8(turret.targeting as u8);
        h.update_u32(turret.overcharge_cooldown);
        h.update_u32(turret.overcharge_active_ticks);
    }

    h.update_u32(state.walls.len() as u32);
    for wall in state.walls.values() {
        h.update_u32(wall.id);
        h.update_str(&wall.wall_type);
        h.update_vec2(wall.position);
        h.update_fixed(wall.width);
        h.update_fixed(wall.height);
        h.update_u32(wall.hp);
        h.update_u32(wall.max_hp);
    }

    h.update_u32(state.militia.len() as u32);
    for unit in state.militia.values() {
        h.update_u32(unit.id);
        h.update_str(&unit.militia_type);
        h.update_vec2(unit.position);
        h.update_u32(unit.hp);
        h.update_u32(unit.remaining_ticks);
    }

    h.update_u32(state.active_skills.len() as u32);
    for skill in &state.active_skills {
        h.update_str(skill);
    }

    h.update_u32(state.skill_cooldowns.len() as u32);
    for (skill, ticks) in &state.skill_cooldowns {
        h.update_str(skill);
        h.update_u32(*ticks);
    }

    h.update_u32(state.militia_spawn_cooldowns.len() as u32);
    for (kind, ticks) in &state.militia_spawn_cooldowns {
        h.update_str(kind);
        h.update_u32(*ticks);
    }

    match state.matrix_state {
        Some(matrix) => {
            h.update_u8(1);
            h.update_bool(matrix.assembled);
            h.update_u32(matrix.cooldown);
        }
        None => h.update_u8(0),
    }

    h.update_u32(state.pending_intents().len() as u32);
    for intent in state.pending_intents() {
        match intent {
            PendingIntent::Snap => h.update_u8(0),
            PendingIntent::Skill { skill_id } => {
                h.update_u8(1);
                h.update_str(skill_id);
            }
        }
    }

    let (enemy_id, wall_id, militia_id) = state.id_counters();
    h.update_u32(enemy_id);
    h.update_u32(wall_id);
    h.update_u32(militia_id);

    h.finalize()
}

/// Fingerprint `state` as lowercase hex.
pub fn fingerprint_hex(state: &GameState) -> String {
    hash_to_hex(&state_fingerprint(state))
}

// =============================================================================
// CHECKPOINT COMPARISON
// =============================================================================

/// Outcome of auditing a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditVerdict {
    /// Every audit tick matched.
    Verified,
    /// Fingerprints disagreed (or were malformed) at these ticks.
    Mismatch {
        /// Offending ticks, ascending.
        ticks: Vec<u32>,
    },
    /// The client did not report these ticks.
    Incomplete {
        /// Missing ticks, ascending.
        missing: Vec<u32>,
    },
    /// The token names ticks the replay produced no fingerprint for.
    Unreachable {
        /// Unchecked ticks, ascending.
        ticks: Vec<u32>,
    },
    /// The run token expired before the audit ran.
    Stale,
    /// The audit could not run (bad token, bad snapshot).
    Rejected {
        /// Why.
        reason: String,
    },
}

impl AuditVerdict {
    /// Can rewards for this run be trusted?
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Compare reported fingerprints against replayed ones at every claimed
/// audit tick.
///
/// `claimed` is the token's tick list, so a replay that produced fewer
/// checkpoints cannot pass by having nothing to compare. No claimed ticks at
/// all is a rejection. Mismatches outrank unreachable ticks, which outrank
/// missing reports.
pub fn audit_checkpoints(
    claimed: &[u32],
    expected: &BTreeMap<u32, StateHash>,
    reported: &BTreeMap<u32, String>,
) -> AuditVerdict {
    if claimed.is_empty() {
        return AuditVerdict::Rejected { reason: "token names no audit ticks".into() };
    }

    let mut mismatched = Vec::new();
    let mut unreachable = Vec::new();
    let mut missing = Vec::new();

    let ticks: BTreeSet<u32> = claimed.iter().copied().collect();
    for tick in ticks {
        let Some(hash) = expected.get(&tick) else {
            unreachable.push(tick);
            continue;
        };
        match reported.get(&tick) {
            None => missing.push(tick),
            Some(hex) => {
                if hash_from_hex(&hex.to_ascii_lowercase()) != Some(*hash) {
                    mismatched.push(tick);
                }
            }
        }
    }

    if !mismatched.is_empty() {
        AuditVerdict::Mismatch { ticks: mismatched }
    } else if !unreachable.is_empty() {
        AuditVerdict::Unreachable { ticks: unreachable }
    } else if !missing.is_empty() {
        AuditVerdict::Incomplete { missing }
    } else {
        AuditVerdict::Verified
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use crate::game::definitions::Definitions;

    #[test]
    fn test_fingerprint_deterministic() {
        let mut a = GameState::new(42);
        let mut b = GameState::new(42);
        a.spawn_enemy("grunt", FixedVec2::from_ints(30, 5), 40);
        b.spawn_enemy("grunt", FixedVec2::from_ints(30, 5), 40);

        assert_eq!(state_fingerprint(&a), state_fingerprint(&b));
        assert_eq!(fingerprint_hex(&a).len(), 64);
        assert_eq!(fingerprint_hex(&a), fingerprint_hex(&a).to_lowercase());
    }

    #[test]
    fn test_fingerprint_sensitive_to_state() {
        let base = GameState::new(42);
        let reference = state_fingerprint(&base);

        let mut gold = base.clone();
        gold.gold += 1;
        assert_ne!(state_fingerprint(&gold), reference);

        let mut rng = base.clone();
        rng.rng.next_u32();
        assert_ne!(state_fingerprint(&rng), reference);

        let mut tick = base.clone();
        tick.advance_tick();
        assert_ne!(state_fingerprint(&tick), reference);

        let mut relic = base.clone();
        relic.acquire_relic("hourglass", 1, &Definitions::builtin());
        assert_ne!(state_fingerprint(&relic), reference);

        let mut choice = base.clone();
        choice.open_choice(1, vec![]);
        assert_ne!(state_fingerprint(&choice), reference);

        assert_ne!(state_fingerprint(&GameState::new(43)), reference);
    }

    #[test]
    fn test_audit_verified() {
        let state = GameState::new(1);
        let hash = state_fingerprint(&state);
        let expected = BTreeMap::from([(10, hash), (20, hash)]);
        let reported = BTreeMap::from([
            (10, hash_to_hex(&hash)),
            (20, hash_to_hex(&hash).to_uppercase()),
            (99, "extra ticks are ignored".to_string()),
        ]);
        assert_eq!(audit_checkpoints(&[10, 20], &expected, &reported), AuditVerdict::Verified);
        assert!(AuditVerdict::Verified.is_trusted());
    }

    #[test]
    fn test_audit_mismatch_and_missing() {
        let a = state_fingerprint(&GameState::new(1));
        let b = state_fingerprint(&GameState::new(2));
        let expected = BTreeMap::from([(10, a), (20, a), (30, a)]);

        let reported = BTreeMap::from([(10, hash_to_hex(&a)), (20, hash_to_hex(&b)), (30, "zz".to_string())]);
        assert_eq!(
            audit_checkpoints(&[10, 20, 30], &expected, &reported),
            AuditVerdict::Mismatch { ticks: vec![20, 30] }
        );

        let partial = BTreeMap::from([(10, hash_to_hex(&a))]);
        let verdict = audit_checkpoints(&[10, 20, 30], &expected, &partial);
        assert_eq!(verdict, AuditVerdict::Incomplete { missing: vec![20, 30] });
        assert!(!verdict.is_trusted());
    }

    #[test]
    fn test_audit_claimed_ticks_must_be_checked() {
        let a = state_fingerprint(&GameState::new(1));
        let expected = BTreeMap::from([(10, a)]);
        let garbage = hash_to_hex(&[0u8; 32]);
        let reported = BTreeMap::from([(10, hash_to_hex(&a)), (40_000, garbage.clone())]);

        // A tick the replay never produced is not a free pass
        let verdict = audit_checkpoints(&[10, 40_000], &expected, &reported);
        assert_eq!(verdict, AuditVerdict::Unreachable { ticks: vec![40_000] });
        assert!(!verdict.is_trusted());

        let nothing = audit_checkpoints(&[40_000], &BTreeMap::new(), &reported);
        assert_ne!(nothing, AuditVerdict::Verified);

        let none_claimed = audit_checkpoints(&[], &expected, &reported);
        assert!(matches!(none_claimed, AuditVerdict::Rejected { .. }));

        // A forged fingerprint still dominates
        let forged = BTreeMap::from([(10, garbage)]);
        assert_eq!(
            audit_checkpoints(&[10, 40_000], &expected, &forged),
            AuditVerdict::Mismatch { ticks: vec![10] }
        );
    }
}
