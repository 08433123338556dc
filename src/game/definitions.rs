//! Static Definitions
//!
//! Read-only catalogue of wall, turret, hero, militia and relic types.
//! The event engine looks entries up here; it never owns or mutates them.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, FIXED_ONE, from_int};

/// Milli-units to fixed-point (1000 = 1.0). Const-friendly alternative to `from_float`.
const fn milli(m: i32) -> Fixed {
    ((m as i64 * FIXED_ONE as i64) / 1000) as Fixed
}

// =============================================================================
// WALLS
// =============================================================================

/// Wall type definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallDefinition {
    /// Gold cost to place.
    pub cost: u32,
    /// Footprint width (fixed-point, x axis).
    pub width: Fixed,
    /// Footprint height (fixed-point, y axis).
    pub height: Fixed,
    /// Hit points of a freshly placed wall.
    pub max_hp: u32,
}

// =============================================================================
// TURRETS
// =============================================================================

/// Turret type definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurretDefinition {
    /// Attack range (fixed-point).
    pub range: Fixed,
    /// Damage per shot.
    pub damage: u32,
}

// =============================================================================
// HEROES
// =============================================================================

/// Hero type definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroDefinition {
    /// Starting hit points.
    pub max_hp: u32,
    /// Skills this hero brings into the run.
    pub skills: Vec<String>,
}

// =============================================================================
// MILITIA
// =============================================================================

/// Militia type definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilitiaDefinition {
    /// Hit points per unit.
    pub max_hp: u32,
    /// Ticks a unit lives before disbanding.
    pub lifetime_ticks: u32,
    /// Ticks before the same type can be spawned again.
    pub spawn_cooldown_ticks: u32,
}

// =============================================================================
// RELICS
// =============================================================================

/// Additive modifier contributions of one relic.
///
/// All values are fixed-point fractions added on top of the neutral 1.0
/// multiplier (`FIXED_ONE / 10` = +10%).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelicBonus {
    /// Damage multiplier bonus.
    pub damage: Fixed,
    /// Fortress max HP multiplier bonus.
    pub max_hp: Fixed,
    /// Gold income multiplier bonus.
    pub gold: Fixed,
    /// Skill cooldown reduction (fraction of base cooldown).
    pub cooldown_reduction: Fixed,
}

/// Relic definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelicDefinition {
    /// Contribution to the derived modifiers.
    pub bonus: RelicBonus,
}

// =============================================================================
// CATALOGUE
// =============================================================================

/// The full definition lookup.
///
/// BTreeMaps keep iteration (and so relic pool order) deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definitions {
    /// Wall types by id.
    pub walls: BTreeMap<String, WallDefinition>,
    /// Turret types by id.
    pub turrets: BTreeMap<String, TurretDefinition>,
    /// Hero types by id.
    pub heroes: BTreeMap<String, HeroDefinition>,
    /// Militia types by id.
    pub militia: BTreeMap<String, MilitiaDefinition>,
    /// Relics by id.
    pub relics: BTreeMap<String, RelicDefinition>,
    /// Base cooldown per skill id (ticks). Missing skills use the config default.
    pub skill_cooldowns: BTreeMap<String, u32>,
}

impl Default for Definitions {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Definitions {
    /// Empty catalogue.
    pub fn empty() -> Self {
        Self {
            walls: BTreeMap::new(),
            turrets: BTreeMap::new(),
            heroes: BTreeMap::new(),
            militia: BTreeMap::new(),
            relics: BTreeMap::new(),
            skill_cooldowns: BTreeMap::new(),
        }
    }

    /// Built-in catalogue shipped with the engine.
    pub fn builtin() -> Self {
        let mut defs = Self::empty();

        defs.walls.insert("palisade".into(), WallDefinition {
            cost: 50,
            width: from_int(1),
            height: from_int(3),
            max_hp: 200,
        });
        defs.walls.insert("stone".into(), WallDefinition {
            cost: 120,
            width: milli(1500),
            height: from_int(3),
            max_hp: 600,
        });
        defs.walls.insert("fortified".into(), WallDefinition {
            cost: 250,
            width: from_int(2),
            height: from_int(4),
            max_hp: 1500,
        });

        defs.turrets.insert("arrow".into(), TurretDefinition { range: from_int(12), damage: 8 });
        defs.turrets.insert("cannon".into(), TurretDefinition { range: from_int(9), damage: 30 });
        defs.turrets.insert("frost".into(), TurretDefinition { range: from_int(10), damage: 4 });
        defs.turrets.insert("tesla".into(), TurretDefinition { range: from_int(7), damage: 18 });

        defs.heroes.insert("knight".into(), HeroDefinition {
            max_hp: 400,
            skills: vec!["shield_wall".into()],
        });
        defs.heroes.insert("ranger".into(), HeroDefinition {
            max_hp: 250,
            skills: vec!["volley".into()],
        });
        defs.heroes.insert("mage".into(), HeroDefinition {
            max_hp: 200,
            skills: vec!["fireball".into(), "blink".into()],
        });

        defs.militia.insert("footman".into(), MilitiaDefinition {
            max_hp: 60,
            lifetime_ticks: 1800,
            spawn_cooldown_ticks: 300,
        });
        defs.militia.insert("archer".into(), MilitiaDefinition {
            max_hp: 35,
            lifetime_ticks: 1800,
            spawn_cooldown_ticks: 360,
        });
        defs.militia.insert("shield_bearer".into(), MilitiaDefinition {
            max_hp: 120,
            lifetime_ticks: 1200,
            spawn_cooldown_ticks: 600,
        });

        let relic = |damage, max_hp, gold, cooldown_reduction| RelicDefinition {
            bonus: RelicBonus { damage, max_hp, gold, cooldown_reduction },
        };
        defs.relics.insert("iron_heart".into(), relic(0, milli(200), 0, 0));
        defs.relics.insert("war_banner".into(), relic(milli(150), 0, 0, 0));
        defs.relics.insert("golden_idol".into(), relic(0, 0, milli(250), 0));
        defs.relics.insert("hourglass".into(), relic(0, 0, 0, milli(100)));
        defs.relics.insert("titan_core".into(), relic(milli(100), milli(100), 0, 0));
        defs.relics.insert("merchant_seal".into(), relic(0, 0, milli(150), milli(50)));
        defs.relics.insert("blood_chalice".into(), relic(milli(250), milli(-100), 0, 0));

        defs.skill_cooldowns.insert("shield_wall".into(), 900);
        defs.skill_cooldowns.insert("volley".into(), 600);
        defs.skill_cooldowns.insert("fireball".into(), 480);
        defs.skill_cooldowns.insert("blink".into(), 300);

        defs
    }

    /// Look up a wall type.
    pub fn wall(&self, id: &str) -> Option<&WallDefinition> {
        self.walls.get(id)
    }

    /// Look up a turret type.
    pub fn turret(&self, id: &str) -> Option<&TurretDefinition> {
        self.turrets.get(id)
    }

    /// Look up a hero type.
    pub fn hero(&self, id: &str) -> Option<&HeroDefinition> {
        self.heroes.get(id)
    }

    /// Look up a militia type.
    pub fn militia_type(&self, id: &str) -> Option<&MilitiaDefinition> {
        self.militia.get(id)
    }

    /// Look up a relic.
    pub fn relic(&self, id: &str) -> Option<&RelicDefinition> {
        self.relics.get(id)
    }

    /// All relic ids in catalogue order.
    pub fn relic_ids(&self) -> Vec<String> {
        self.relics.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milli_conversion() {
        assert_eq!(milli(1000), FIXED_ONE);
        assert_eq!(milli(500), FIXED_ONE / 2);
        assert_eq!(milli(-100), -(FIXED_ONE / 10));
    }

    #[test]
    fn test_builtin_catalogue() {
        let defs = Definitions::builtin();

        let palisade = defs.wall("palisade").unwrap();
        assert_eq!(palisade.cost, 50);
        assert_eq!(palisade.width, from_int(1));

        assert!(defs.militia_type("footman").is_some());
        assert!(defs.militia_type("archer").is_some());
        assert!(defs.militia_type("shield_bearer").is_some());
        assert!(defs.wall("moat").is_none());

        // Every hero skill has a cooldown entry
        for hero in defs.heroes.values() {
            for skill in &hero.skills {
                assert!(defs.skill_cooldowns.contains_key(skill), "missing cooldown for {skill}");
            }
        }
    }

    #[test]
    fn test_relic_ids_sorted() {
        let ids = Definitions::builtin().relic_ids();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
