//! Event Validation
//!
//! Pure legality checks. Nothing here mutates state; every failure is an
//! [`EventRejection`] value.

use crate::core::fixed::Fixed;
use crate::game::config::SimConfig;
use crate::game::events::{EventRejection, HeroCommandType, SimEvent};
use crate::game::state::{GameState, PendingIntent, TargetingMode};

/// Axis-aligned wall footprint in raw Q16.16 units, widened to avoid wraparound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Footprint {
    /// Left edge.
    pub min_x: i64,
    /// Bottom edge.
    pub min_y: i64,
    /// Right edge.
    pub max_x: i64,
    /// Top edge.
    pub max_y: i64,
}

impl Footprint {
    /// Footprint of a `width` x `height` rectangle centered at `(x, y)`.
    pub fn centered(x: Fixed, y: Fixed, width: Fixed, height: Fixed) -> Self {
        let half_w = width as i64 / 2;
        let half_h = height as i64 / 2;
        Self {
            min_x: x as i64 - half_w,
            min_y: y as i64 - half_h,
            max_x: x as i64 + (width as i64 - half_w),
            max_y: y as i64 + (height as i64 - half_h),
        }
    }

    /// Inside `[0, width] x [0, height]`, edges included.
    pub fn within(&self, width: Fixed, height: Fixed) -> bool {
        self.min_x >= 0
            && self.min_y >= 0
            && self.max_x <= width as i64
            && self.max_y <= height as i64
    }

    /// Interiors intersect. Shared edges do not count.
    pub fn overlaps(&self, other: &Footprint) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// Check whether `event` may be applied to `state`.
///
/// Events at or after the current tick are eligible; earlier ticks are
/// always stale.
///
/// `REROLL_RELICS` is the one event with a condition checked later:
/// whether the caller's option generator yields anything. `apply_event`
/// runs that check on a scratch RNG before touching state and rejects with
/// [`EventRejection::NoRelicOptions`], which `step` reports like any other
/// rejection.
pub fn validate(event: &SimEvent, state: &GameState, config: &SimConfig) -> Result<(), EventRejection> {
    if event.tick() < state.tick() {
        return Err(EventRejection::StaleTick {
            event_tick: event.tick(),
            state_tick: state.tick(),
        });
    }
    if state.is_ended() {
        return Err(EventRejection::RunEnded);
    }

    match event {
        SimEvent::ChooseRelic { tick, wave, option_index } => {
            let choice = state.pending_choice().ok_or(EventRejection::NotInChoice)?;
            if *wave != choice.wave {
                return Err(EventRejection::WaveMismatch { expected: choice.wave, got: *wave });
            }
            if *option_index as usize >= choice.options.len() {
                return Err(EventRejection::InvalidOptionIndex(*option_index));
            }
            if state.pending_choice_tick().is_some_and(|opened| *tick < opened) {
                return Err(EventRejection::ChoiceNotYetOpen);
            }
            Ok(())
        }

        SimEvent::RerollRelics { .. } => {
            if !state.in_choice() {
                return Err(EventRejection::NotInChoice);
            }
            require_gold(state, config.reroll_cost)
        }

        SimEvent::ActivateSnap { .. } => {
            let matrix = state.matrix_state.filter(|m| m.assembled)
                .ok_or(EventRejection::MatrixNotAssembled)?;
            if matrix.cooldown > 0 {
                return Err(EventRejection::SnapOnCooldown);
            }
            if !state.has_live_enemies() {
                return Err(EventRejection::NoEnemies);
            }
            if state.pending_intents().contains(&PendingIntent::Snap) {
                return Err(EventRejection::AlreadyQueued);
            }
            Ok(())
        }

        SimEvent::HeroCommand { command_type, hero_id, target_x, target_y, target_enemy_id, .. } => {
            match command_type {
                HeroCommandType::Move => {
                    let hero_id = hero_id.as_deref().ok_or(EventRejection::MissingTarget)?;
                    require_hero(state, hero_id)?;
                    if target_x.is_none() || target_y.is_none() {
                        return Err(EventRejection::MissingTarget);
                    }
                    Ok(())
                }
                HeroCommandType::Focus => {
                    let enemy_id = target_enemy_id.ok_or(EventRejection::MissingTarget)?;
                    if !state.enemies.get(&enemy_id).is_some_and(|e| e.is_alive()) {
                        return Err(EventRejection::TargetNotFound(enemy_id));
                    }
                    if let Some(hero_id) = hero_id {
                        require_hero(state, hero_id)?;
                    }
                    Ok(())
                }
                HeroCommandType::Retreat => Ok(()),
            }
        }

        SimEvent::HeroControl { hero_id, .. } => require_hero(state, hero_id),

        SimEvent::ActivateSkill { skill_id, .. } => {
            if !state.active_skills.contains(skill_id) {
                return Err(EventRejection::SkillNotActive(skill_id.clone()));
            }
            if state.skill_cooldowns.get(skill_id).copied().unwrap_or(0) > 0 {
                return Err(EventRejection::SkillOnCooldown(skill_id.clone()));
            }
            let queued = state.pending_intents().iter().any(|intent| {
                matches!(intent, PendingIntent::Skill { skill_id: s } if s == skill_id)
            });
            if queued {
                return Err(EventRejection::AlreadyQueued);
            }
            Ok(())
        }

        SimEvent::PlaceWall { wall_type, x, y, .. } => {
            let def = config
                .definitions
                .wall(wall_type)
                .ok_or_else(|| EventRejection::UnknownWallType(wall_type.clone()))?;
            require_gold(state, def.cost)?;

            let footprint = Footprint::centered(*x, *y, def.width, def.height);
            if !footprint.within(config.arena_width, config.arena_height) {
                return Err(EventRejection::OutOfBounds);
            }
            for wall in state.walls.values() {
                let other = Footprint::centered(wall.position.x, wall.position.y, wall.width, wall.height);
                if footprint.overlaps(&other) {
                    return Err(EventRejection::WallOverlap { wall_id: wall.id });
                }
            }
            Ok(())
        }

        SimEvent::RemoveWall { wall_id, .. } => {
            if state.walls.contains_key(wall_id) {
                Ok(())
            } else {
                Err(EventRejection::WallNotFound(*wall_id))
            }
        }

        SimEvent::SetTurretTargeting { slot_index, mode, .. } => {
            if !state.turrets.contains_key(slot_index) {
                return Err(EventRejection::TurretNotFound(*slot_index));
            }
            mode.parse::<TargetingMode>()
                .map(|_| ())
                .map_err(|_| EventRejection::InvalidTargetingMode(mode.clone()))
        }

        SimEvent::ActivateOvercharge { slot_index, .. } => {
            let turret = state
                .turrets
                .get(slot_index)
                .ok_or(EventRejection::TurretNotFound(*slot_index))?;
            if turret.overcharge_cooldown != 0 {
                return Err(EventRejection::OverchargeOnCooldown);
            }
            if turret.is_overcharged() {
                return Err(EventRejection::OverchargeActive);
            }
            Ok(())
        }

        SimEvent::SpawnMilitia { militia_type, count, .. } => {
            if config.definitions.militia_type(militia_type).is_none() {
                return Err(EventRejection::UnknownMilitiaType(militia_type.clone()));
            }
            if let Some(n) = count {
                if *n == 0 || *n > config.max_squad_size {
                    return Err(EventRejection::InvalidSquadSize(*n));
                }
            }
            if state.militia.len() >= config.militia_cap {
                return Err(EventRejection::MilitiaCapReached);
            }
            if state.militia_spawn_cooldowns.get(militia_type).copied().unwrap_or(0) > 0 {
                return Err(EventRejection::MilitiaOnCooldown(militia_type.clone()));
            }
            Ok(())
        }
    }
}

fn require_gold(state: &GameState, required: u32) -> Result<(), EventRejection> {
    if state.gold < required {
        Err(EventRejection::NotEnoughGold { required, available: state.gold })
    } else {
        Ok(())
    }
}

fn require_hero(state: &GameState, hero_id: &str) -> Result<(), EventRejection> {
    if state.heroes.contains_key(hero_id) {
        Ok(())
    } else {
        Err(EventRejection::HeroNotFound(hero_id.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{from_int, FIXED_HALF};
    use crate::core::vec2::FixedVec2;
    use crate::game::state::{MatrixState, TurretState, HeroState};

    fn fp(n: i32) -> Fixed {
        from_int(n)
    }

    #[test]
    fn test_footprint_geometry() {
        let a = Footprint::centered(fp(6), fp(2), fp(1), fp(3));
        assert_eq!(a.min_x, (fp(5) + FIXED_HALF) as i64);
        assert_eq!(a.max_y, (fp(3) + FIXED_HALF) as i64);
        assert!(a.within(fp(40), fp(15)));

        // Touching edges is fine
        let b = Footprint::centered(fp(7), fp(2), fp(1), fp(3));
        assert!(!a.overlaps(&b));

        let c = Footprint::centered(fp(6) + FIXED_HALF, fp(2), fp(1), fp(3));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&a));

        // Extreme coordinates do not wrap into the arena
        let d = Footprint::centered(i32::MIN, i32::MAX, fp(1), fp(3));
        assert!(!d.within(fp(40), fp(15)));
    }

    #[test]
    fn test_stale_event_rejected() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        state.advance_to(20);

        let event = SimEvent::RerollRelics { tick: 19 };
        assert!(matches!(
            validate(&event, &state, &config),
            Err(EventRejection::StaleTick { event_tick: 19, state_tick: 20 })
        ));
    }

    #[test]
    fn test_future_event_allowed() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        state.turrets.insert(0, TurretState::new(0, "arrow"));

        let event = SimEvent::ActivateOvercharge { tick: 500, slot_index: 0 };
        assert_eq!(validate(&event, &state, &config), Ok(()));
    }

    #[test]
    fn test_ended_run_rejects() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        state.end();
        let event = SimEvent::HeroCommand {
            tick: 0,
            command_type: HeroCommandType::Retreat,
            hero_id: None,
            target_x: None,
            target_y: None,
            target_enemy_id: None,
        };
        assert_eq!(validate(&event, &state, &config), Err(EventRejection::RunEnded));
    }

    #[test]
    fn test_choose_relic_checks() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);

        let choose = |wave, option_index| SimEvent::ChooseRelic { tick: 150, wave, option_index };
        assert_eq!(validate(&choose(5, 0), &state, &config), Err(EventRejection::NotInChoice));

        state.advance_to(100);
        state.open_choice(5, vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(validate(&choose(5, 1), &state, &config), Ok(()));
        assert_eq!(
            validate(&choose(4, 1), &state, &config),
            Err(EventRejection::WaveMismatch { expected: 5, got: 4 })
        );
        assert_eq!(validate(&choose(5, 3), &state, &config), Err(EventRejection::InvalidOptionIndex(3)));
    }

    #[test]
    fn test_snap_requirements() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        let snap = SimEvent::ActivateSnap { tick: 0 };

        assert_eq!(validate(&snap, &state, &config), Err(EventRejection::MatrixNotAssembled));

        state.matrix_state = Some(MatrixState { assembled: false, cooldown: 0 });
        assert_eq!(validate(&snap, &state, &config), Err(EventRejection::MatrixNotAssembled));

        state.matrix_state = Some(MatrixState { assembled: true, cooldown: 5 });
        assert_eq!(validate(&snap, &state, &config), Err(EventRejection::SnapOnCooldown));

        state.matrix_state = Some(MatrixState { assembled: true, cooldown: 0 });
        assert_eq!(validate(&snap, &state, &config), Err(EventRejection::NoEnemies));

        // Dead enemies do not count
        state.spawn_enemy("grunt", FixedVec2::from_ints(30, 5), 0);
        assert_eq!(validate(&snap, &state, &config), Err(EventRejection::NoEnemies));

        state.spawn_enemy("grunt", FixedVec2::from_ints(30, 5), 10);
        assert_eq!(validate(&snap, &state, &config), Ok(()));
    }

    #[test]
    fn test_hero_command_requirements() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        state.heroes.insert("knight".into(), HeroState::new("knight", FixedVec2::from_ints(3, 7), 100));
        let enemy = state.spawn_enemy("grunt", FixedVec2::from_ints(30, 5), 10);

        let command = |command_type, hero: Option<&str>, xy: Option<(i32, i32)>, enemy: Option<u32>| {
            SimEvent::HeroCommand {
                tick: 0,
                command_type,
                hero_id: hero.map(String::from),
                target_x: xy.map(|p| fp(p.0)),
                target_y: xy.map(|p| fp(p.1)),
                target_enemy_id: enemy,
            }
        };

        assert_eq!(validate(&command(HeroCommandType::Move, Some("knight"), Some((5, 5)), None), &state, &config), Ok(()));
        assert_eq!(
            validate(&command(HeroCommandType::Move, Some("lich"), Some((5, 5)), None), &state, &config),
            Err(EventRejection::HeroNotFound("lich".into()))
        );
        assert_eq!(
            validate(&command(HeroCommandType::Move, Some("knight"), None, None), &state, &config),
            Err(EventRejection::MissingTarget)
        );

        assert_eq!(validate(&command(HeroCommandType::Focus, None, None, Some(enemy)), &state, &config), Ok(()));
        assert_eq!(
            validate(&command(HeroCommandType::Focus, None, None, Some(999)), &state, &config),
            Err(EventRejection::TargetNotFound(999))
        );
        let corpse = state.spawn_enemy("grunt", FixedVec2::from_ints(31, 5), 0);
        assert_eq!(
            validate(&command(HeroCommandType::Focus, None, None, Some(corpse)), &state, &config),
            Err(EventRejection::TargetNotFound(corpse))
        );
        assert_eq!(
            validate(&command(HeroCommandType::Focus, Some("lich"), None, Some(enemy)), &state, &config),
            Err(EventRejection::HeroNotFound("lich".into()))
        );

        assert_eq!(validate(&command(HeroCommandType::Retreat, Some("lich"), None, None), &state, &config), Ok(()));
    }

    #[test]
    fn test_skill_requirements() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);
        let skill = SimEvent::ActivateSkill { tick: 0, skill_id: "volley".into() };

        assert_eq!(validate(&skill, &state, &config), Err(EventRejection::SkillNotActive("volley".into())));

        state.active_skills.insert("volley".into());
        assert_eq!(validate(&skill, &state, &config), Ok(()));

        state.skill_cooldowns.insert("volley".into(), 12);
        assert_eq!(validate(&skill, &state, &config), Err(EventRejection::SkillOnCooldown("volley".into())));
    }

    #[test]
    fn test_turret_requirements() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);

        let targeting = |mode: &str| SimEvent::SetTurretTargeting { tick: 0, slot_index: 1, mode: mode.into() };
        assert_eq!(validate(&targeting("weakest"), &state, &config), Err(EventRejection::TurretNotFound(1)));

        state.turrets.insert(1, TurretState::new(1, "cannon"));
        assert_eq!(validate(&targeting("weakest"), &state, &config), Ok(()));
        assert_eq!(
            validate(&targeting("sideways"), &state, &config),
            Err(EventRejection::InvalidTargetingMode("sideways".into()))
        );

        let overcharge = SimEvent::ActivateOvercharge { tick: 0, slot_index: 1 };
        state.turrets.get_mut(&1).unwrap().overcharge_cooldown = 1;
        assert_eq!(validate(&overcharge, &state, &config), Err(EventRejection::OverchargeOnCooldown));

        let turret = state.turrets.get_mut(&1).unwrap();
        turret.overcharge_cooldown = 0;
        turret.overcharge_active_ticks = 10;
        assert_eq!(validate(&overcharge, &state, &config), Err(EventRejection::OverchargeActive));
    }

    #[test]
    fn test_militia_requirements() {
        let config = SimConfig::default();
        let mut state = GameState::new(1);

        let spawn = |kind: &str, count| SimEvent::SpawnMilitia {
            tick: 0,
            militia_type: kind.into(),
            x: fp(5),
            y: fp(5),
            count,
        };

        assert_eq!(validate(&spawn("footman", None), &state, &config), Ok(()));
        assert_eq!(validate(&spawn("footman", Some(config.max_squad_size)), &state, &config), Ok(()));
        assert_eq!(
            validate(&spawn("ogre", None), &state, &config),
            Err(EventRejection::UnknownMilitiaType("ogre".into()))
        );
        assert_eq!(validate(&spawn("footman", Some(0)), &state, &config), Err(EventRejection::InvalidSquadSize(0)));
        assert_eq!(
            validate(&spawn("footman", Some(config.max_squad_size + 1)), &state, &config),
            Err(EventRejection::InvalidSquadSize(config.max_squad_size + 1))
        );

        state.militia_spawn_cooldowns.insert("footman".into(), 30);
        assert_eq!(
            validate(&spawn("footman", None), &state, &config),
            Err(EventRejection::MilitiaOnCooldown("footman".into()))
        );
        assert_eq!(validate(&spawn("archer", None), &state, &config), Ok(()));
    }
}
