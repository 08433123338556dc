//! Game Logic Module
//!
//! All run simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `config`: Engine tunables and the signed run snapshot
//! - `definitions`: Static wall/turret/hero/militia/relic catalogue
//! - `state`: Run state, entities, invariants
//! - `relic`: Relics, derived modifiers, relic choice, option generation
//! - `events`: Player event wire format and rejection reasons
//! - `validate`: Pure legality checks
//! - `apply`: State transitions for legal events
//! - `tick`: Authoritative simulation step

pub mod config;
pub mod definitions;
pub mod state;
pub mod relic;
pub mod events;
pub mod validate;
pub mod apply;
pub mod tick;

// Re-export key types
pub use config::{ConfigSnapshot, SimConfig, TurretLoadout, REROLL_COST};
pub use definitions::Definitions;
pub use state::{GameState, HeroActivity, PendingIntent, RunLimits, TargetingMode};
pub use relic::{ActiveRelic, PendingChoice, RelicModifiers, RelicOptionGenerator, SeededRelicPool};
pub use events::{Applied, EventRejection, HeroCommandType, SimEvent};
pub use validate::validate;
pub use apply::{apply, apply_event};
pub use tick::{step, open_relic_choice, TickResult};
