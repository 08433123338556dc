//! Property tests for the deterministic core and event legality.

use proptest::prelude::*;

use fortress_sim::core::fixed::{
    fixed_add, fixed_div, fixed_mul, fixed_sub, from_float, from_int, to_float, to_int, Fixed,
    FIXED_INT_MAX, FIXED_INT_MIN, FIXED_MAX, FIXED_MIN, FIXED_ONE,
};
use fortress_sim::core::rng::DeterministicRng;
use fortress_sim::game::{
    validate, EventRejection, GameState, HeroCommandType, SimConfig, SimEvent,
};

const WALL_TYPES: [&str; 3] = ["palisade", "stone", "fortified"];

fn every_event(tick: u32) -> Vec<SimEvent> {
    vec![
        SimEvent::ChooseRelic { tick, wave: 1, option_index: 0 },
        SimEvent::RerollRelics { tick },
        SimEvent::ActivateSnap { tick },
        SimEvent::HeroCommand {
            tick,
            command_type: HeroCommandType::Retreat,
            hero_id: None,
            target_x: None,
            target_y: None,
            target_enemy_id: None,
        },
        SimEvent::HeroControl { tick, hero_id: "knight".into(), enabled: true },
        SimEvent::ActivateSkill { tick, skill_id: "volley".into() },
        SimEvent::PlaceWall { tick, wall_type: "palisade".into(), x: from_int(5), y: from_int(5) },
        SimEvent::RemoveWall { tick, wall_id: 1 },
        SimEvent::SetTurretTargeting { tick, slot_index: 0, mode: "weakest".into() },
        SimEvent::ActivateOvercharge { tick, slot_index: 0 },
        SimEvent::SpawnMilitia { tick, militia_type: "footman".into(), x: from_int(8), y: from_int(7), count: None },
    ]
}

fn wall(tick: u32, wall_type: &str, x: i32, y: i32) -> SimEvent {
    SimEvent::PlaceWall { tick, wall_type: wall_type.into(), x: from_int(x), y: from_int(y) }
}

// =============================================================================
// FIXED-POINT
// =============================================================================

proptest! {
    #[test]
    fn float_round_trip_within_one_ulp(f in -32_000.0f64..32_000.0) {
        let fixed = from_float(f).unwrap();
        prop_assert!((to_float(fixed) - f).abs() <= 1.0 / FIXED_ONE as f64);
    }

    #[test]
    fn int_round_trip(n in FIXED_INT_MIN..=FIXED_INT_MAX) {
        prop_assert_eq!(to_int(from_int(n)), n);
    }

    #[test]
    fn add_sub_mul_wrap_to_32_bits(a in any::<Fixed>(), b in any::<Fixed>()) {
        prop_assert_eq!(fixed_add(a, b), (a as i64 + b as i64) as i32);
        prop_assert_eq!(fixed_sub(a, b), (a as i64 - b as i64) as i32);
        prop_assert_eq!(fixed_mul(a, b), ((a as i64 * b as i64) >> 16) as i32);
    }

    #[test]
    fn div_by_zero_saturates(a in any::<Fixed>()) {
        let expected = if a >= 0 { FIXED_MAX } else { FIXED_MIN };
        prop_assert_eq!(fixed_div(a, 0), expected);
    }

    #[test]
    fn div_inverts_mul_for_small_values(a in -100i32..100, b in 1i32..100) {
        let product = fixed_mul(from_int(a), from_int(b));
        prop_assert_eq!(fixed_div(product, from_int(b)), from_int(a));
    }
}

// =============================================================================
// RNG
// =============================================================================

proptest! {
    #[test]
    fn rng_reproducible(seed in any::<u32>(), ops in proptest::collection::vec(0u8..4, 0..64)) {
        let mut a = DeterministicRng::new(seed);
        let mut b = DeterministicRng::new(seed);
        for op in ops {
            match op {
                0 => prop_assert_eq!(a.next_u32(), b.next_u32()),
                1 => prop_assert_eq!(a.next_int(-50, 50), b.next_int(-50, 50)),
                2 => prop_assert_eq!(a.next_bool(0.3), b.next_bool(0.3)),
                _ => prop_assert_eq!(a.pick_n(&[1, 2, 3, 4, 5], 3), b.pick_n(&[1, 2, 3, 4, 5], 3)),
            }
        }

        let mut fork = a.clone();
        prop_assert_eq!(fork.next_u32(), a.next_u32());
        prop_assert_eq!(fork.state(), a.state());
    }

    #[test]
    fn next_int_stays_in_range(seed in any::<u32>(), min in -1_000i32..1_000, span in 0i32..1_000) {
        let mut rng = DeterministicRng::new(seed);
        let max = min + span;
        for _ in 0..32 {
            let v = rng.next_int(min, max);
            prop_assert!(v >= min && v <= max);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn next_float_buckets_are_even(seed in 1u32..u32::MAX) {
        let mut rng = DeterministicRng::new(seed);
        let mut buckets = [0u32; 5];
        for _ in 0..10_000 {
            let f = rng.next_float();
            prop_assert!((0.0..1.0).contains(&f));
            buckets[((f * 5.0) as usize).min(4)] += 1;
        }
        for count in buckets {
            prop_assert!((1_700..=2_300).contains(&count), "bucket count {}", count);
        }
    }

    #[test]
    fn next_bool_tracks_probability(seed in 1u32..u32::MAX, p in 0.05f64..0.95) {
        let mut rng = DeterministicRng::new(seed);
        let hits = (0..10_000).filter(|_| rng.next_bool(p)).count();
        let freq = hits as f64 / 10_000.0;
        prop_assert!((freq - p).abs() <= 0.05, "p={} freq={}", p, freq);
    }
}

// =============================================================================
// EVENT LEGALITY
// =============================================================================

proptest! {
    #[test]
    fn stale_events_always_rejected(state_tick in 1u32..100_000, behind in 1u32..1_000, gold in any::<u32>()) {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        state.gold = gold;
        state.advance_to(state_tick);
        let event_tick = state_tick.saturating_sub(behind);

        for event in every_event(event_tick) {
            prop_assert_eq!(
                validate(&event, &state, &config),
                Err(EventRejection::StaleTick { event_tick, state_tick })
            );
        }
    }

    #[test]
    fn wall_needs_gold(kind in 0usize..3, x in -50i32..50, y in -50i32..50, short in 1u32..50) {
        let config = SimConfig::default();
        let wall_type = WALL_TYPES[kind];
        let cost = config.definitions.wall(wall_type).map(|d| d.cost).unwrap_or_default();

        let mut state = GameState::new(1);
        state.gold = cost.saturating_sub(short);
        prop_assert_eq!(
            validate(&wall(0, wall_type, x, y), &state, &config),
            Err(EventRejection::NotEnoughGold { required: cost, available: state.gold })
        );
    }

    #[test]
    fn wall_must_fit_arena(kind in 0usize..3, x in -40i32..0, y in 2i32..=13) {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        state.gold = 10_000;
        let wall_type = WALL_TYPES[kind];

        prop_assert_eq!(validate(&wall(0, wall_type, x, y), &state, &config), Err(EventRejection::OutOfBounds));
        let far_x = 40 - x;
        prop_assert_eq!(validate(&wall(0, wall_type, far_x, y), &state, &config), Err(EventRejection::OutOfBounds));
        prop_assert_eq!(validate(&wall(0, wall_type, 20, -y), &state, &config), Err(EventRejection::OutOfBounds));
    }

    #[test]
    fn walls_never_overlap(kind in 0usize..3, other in 0usize..3, x in 2i32..=38, y in 2i32..=13) {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        state.gold = 10_000;
        let mut pool = |_: u32, _: &GameState, _: &mut DeterministicRng| -> Vec<String> { Vec::new() };

        let first = fortress_sim::game::apply_event(&wall(0, WALL_TYPES[kind], x, y), &mut state, &config, &mut pool);
        prop_assert!(first.is_ok());

        prop_assert_eq!(
            validate(&wall(0, WALL_TYPES[other], x, y), &state, &config),
            Err(EventRejection::WallOverlap { wall_id: 1 })
        );
    }
}
