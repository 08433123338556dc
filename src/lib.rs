//! # Fortress Sim Server
//!
//! Deterministic simulation core for Fortress Sim runs, plus the audit
//! protocol that lets the server trust client-reported results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FORTRESS SIM SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Deterministic primitives                │
//! │  ├── fixed.rs      - Q16.16 fixed-point arithmetic           │
//! │  ├── vec2.rs       - 2D vector with fixed-point              │
//! │  ├── rng.rs        - Deterministic xorshift32 PRNG           │
//! │  └── hash.rs       - State hashing for verification          │
//! │                                                              │
//! │  game/             - Run logic (deterministic)               │
//! │  ├── definitions.rs- Static content catalogue                │
//! │  ├── config.rs     - Engine tunables, run snapshot           │
//! │  ├── state.rs      - Run state and entities                  │
//! │  ├── relic.rs      - Relics, modifiers, relic choice         │
//! │  ├── events.rs     - Player events and rejections            │
//! │  ├── validate.rs   - Event legality                          │
//! │  ├── apply.rs      - Event effects                           │
//! │  └── tick.rs       - Authoritative simulation step           │
//! │                                                              │
//! │  audit/            - Run verification (non-deterministic)    │
//! │  ├── token.rs      - Signed run tokens                       │
//! │  ├── fingerprint.rs- Canonical state fingerprints            │
//! │  ├── replay.rs     - Event logs and server replay            │
//! │  └── service.rs    - Async audit worker                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No floating-point arithmetic in run logic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from the seeded xorshift32 word in the state
//!
//! Given identical seed, snapshot and events, the simulation produces
//! **identical fingerprints** on any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod audit;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::vec2::FixedVec2;
pub use core::rng::DeterministicRng;
pub use game::state::GameState;
pub use game::events::{SimEvent, EventRejection};
pub use game::config::{ConfigSnapshot, SimConfig};
pub use audit::{AuditVerdict, RunSession, RunTokenClaims};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;

/// Simulation version stamped into run tokens. Bump on any change that
/// alters fingerprints.
pub const SIMULATION_VERSION: u32 = 1;
