//! Event Application
//!
//! Mutates state for events that pass [`validate`]. Validation always runs
//! first, so a rejected event never touches the state.

use tracing::debug;

use crate::core::fixed::{Fixed, fixed_add, fixed_mul, from_int};
use crate::core::vec2::FixedVec2;
use crate::game::config::SimConfig;
use crate::game::events::{Applied, EventRejection, HeroCommandType, SimEvent};
use crate::game::relic::RelicOptionGenerator;
use crate::game::state::{GameState, HeroActivity, MilitiaState, PendingIntent, TargetingMode, WallState};
use crate::game::validate::validate;

/// Validate then apply `event`.
///
/// `generator` supplies replacement options for `REROLL_RELICS`; other
/// events ignore it.
pub fn apply_event(
    event: &SimEvent,
    state: &mut GameState,
    config: &SimConfig,
    generator: &mut dyn RelicOptionGenerator,
) -> Result<Applied, EventRejection> {
    if let Err(rejection) = validate(event, state, config) {
        debug!(
            tick = state.tick(),
            event = event.kind(),
            code = rejection.code(),
            "Event rejected: {}", rejection
        );
        return Err(rejection);
    }

    let applied = match event {
        SimEvent::ChooseRelic { wave, option_index, .. } => {
            let Some(choice) = state.take_choice() else {
                return Err(EventRejection::NotInChoice);
            };
            let relic_id = choice.options[*option_index as usize].clone();
            state.acquire_relic(&relic_id, *wave, &config.definitions);
            Applied::RelicChosen { relic_id }
        }

        SimEvent::RerollRelics { .. } => reroll(state, config, generator)?,

        SimEvent::ActivateSnap { .. } => {
            state.queue_intent(PendingIntent::Snap);
            Applied::IntentQueued
        }

        SimEvent::HeroCommand { command_type, hero_id, target_x, target_y, target_enemy_id, .. } => {
            match command_type {
                HeroCommandType::Move => {
                    // Validation guarantees both the hero and the coordinates
                    if let (Some(hero), Some(x), Some(y)) = (
                        hero_id.as_ref().and_then(|id| state.heroes.get_mut(id)),
                        target_x,
                        target_y,
                    ) {
                        let target = FixedVec2::new(*x, *y)
                            .clamp_to_field(config.arena_width, config.arena_height);
                        hero.command_target = Some(target);
                        hero.is_commanded = true;
                        hero.state = HeroActivity::Moving;
                    }
                }
                HeroCommandType::Focus => {
                    let heroes = state.heroes.iter_mut()
                        .filter(|(id, _)| hero_id.as_ref().map_or(true, |wanted| *id == wanted));
                    for (_, hero) in heroes {
                        hero.focus_target_id = *target_enemy_id;
                    }
                }
                HeroCommandType::Retreat => {
                    let single = hero_id.as_ref().filter(|id| state.heroes.contains_key(*id));
                    let rally = config.rally_point;
                    for (id, hero) in state.heroes.iter_mut() {
                        if single.map_or(true, |wanted| id == wanted) {
                            hero.state = HeroActivity::Retreating;
                            hero.command_target = Some(rally);
                            hero.is_commanded = true;
                            hero.focus_target_id = None;
                            hero.target_id = None;
                        }
                    }
                }
            }
            Applied::Accepted
        }

        SimEvent::HeroControl { hero_id, enabled, .. } => {
            let has_enemies = state.has_live_enemies();
            if let Some(hero) = state.heroes.get_mut(hero_id) {
                if *enabled {
                    hero.manual_control = true;
                    if hero.command_target.is_none() {
                        hero.command_target = Some(hero.position);
                    }
                } else {
                    hero.manual_control = false;
                    hero.is_commanded = false;
                    hero.command_target = None;
                    hero.focus_target_id = None;
                    hero.target_id = None;
                    hero.state = if has_enemies { HeroActivity::Combat } else { HeroActivity::Idle };
                }
            }
            Applied::Accepted
        }

        SimEvent::ActivateSkill { skill_id, .. } => {
            state.queue_intent(PendingIntent::Skill { skill_id: skill_id.clone() });
            Applied::IntentQueued
        }

        SimEvent::PlaceWall { wall_type, x, y, .. } => {
            let Some(def) = config.definitions.wall(wall_type) else {
                return Err(EventRejection::UnknownWallType(wall_type.clone()));
            };
            state.gold -= def.cost;
            let wall_id = state.allocate_wall_id();
            state.walls.insert(wall_id, WallState {
                id: wall_id,
                wall_type: wall_type.clone(),
                position: FixedVec2::new(*x, *y),
                width: def.width,
                height: def.height,
                hp: def.max_hp,
                max_hp: def.max_hp,
            });
            Applied::WallPlaced { wall_id }
        }

        SimEvent::RemoveWall { wall_id, .. } => {
            state.walls.remove(wall_id);
            Applied::WallRemoved { wall_id: *wall_id }
        }

        SimEvent::SetTurretTargeting { slot_index, mode, .. } => {
            let mode: TargetingMode = mode
                .parse()
                .map_err(|_| EventRejection::InvalidTargetingMode(mode.clone()))?;
            if let Some(turret) = state.turrets.get_mut(slot_index) {
                turret.targeting = mode;
            }
            Applied::Accepted
        }

        SimEvent::ActivateOvercharge { slot_index, .. } => {
            if let Some(turret) = state.turrets.get_mut(slot_index) {
                turret.overcharge_active_ticks = config.overcharge_duration;
                turret.overcharge_cooldown = config.overcharge_cooldown;
            }
            Applied::Accepted
        }

        SimEvent::SpawnMilitia { militia_type, x, y, count, .. } => {
            spawn_militia(state, config, militia_type, *x, *y, count.unwrap_or(1))?
        }
    };

    Ok(applied)
}

/// Validate then apply, reporting only success.
pub fn apply(
    event: &SimEvent,
    state: &mut GameState,
    config: &SimConfig,
    generator: &mut dyn RelicOptionGenerator,
) -> bool {
    apply_event(event, state, config, generator).is_ok()
}

/// Draw new options on a scratch copy of the run RNG; commit only on success.
fn reroll(
    state: &mut GameState,
    config: &SimConfig,
    generator: &mut dyn RelicOptionGenerator,
) -> Result<Applied, EventRejection> {
    let wave = state.pending_choice().map(|c| c.wave).ok_or(EventRejection::NotInChoice)?;

    let mut rng = state.rng.clone();
    let options = generator.generate(wave, state, &mut rng);
    if options.is_empty() {
        debug!(tick = state.tick(), wave, "Reroll produced no options");
        return Err(EventRejection::NoRelicOptions);
    }

    state.rng = rng;
    state.gold -= config.reroll_cost;
    state.replace_choice_options(options.clone());
    Ok(Applied::RelicsRerolled { options })
}

/// Spawn up to `requested` units in a column centered on `(x, y)`.
///
/// Squads are clipped to the remaining militia cap.
fn spawn_militia(
    state: &mut GameState,
    config: &SimConfig,
    militia_type: &str,
    x: Fixed,
    y: Fixed,
    requested: u32,
) -> Result<Applied, EventRejection> {
    let Some(def) = config.definitions.militia_type(militia_type) else {
        return Err(EventRejection::UnknownMilitiaType(militia_type.to_string()));
    };

    let room = config.militia_cap.saturating_sub(state.militia.len());
    let count = (requested as usize).min(room);
    let center = FixedVec2::new(x, y);
    let first_offset = -((count as i32 - 1) / 2);

    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let offset = fixed_mul(from_int(first_offset + i as i32), config.squad_spacing);
        let position = FixedVec2::new(center.x, fixed_add(center.y, offset))
            .clamp_to_field(config.arena_width, config.arena_height);

        let id = state.allocate_militia_id();
        state.militia.insert(id, MilitiaState {
            id,
            militia_type: militia_type.to_string(),
            position,
            hp: def.max_hp,
            remaining_ticks: def.lifetime_ticks,
        });
        ids.push(id);
    }

    state
        .militia_spawn_cooldowns
        .insert(militia_type.to_string(), def.spawn_cooldown_ticks);

    Ok(Applied::MilitiaSpawned { ids })
}

// =============================================================================
// TESTS
// =============================================================================
