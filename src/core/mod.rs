//! Core deterministic primitives.
//!
//! All types in this module are designed for perfect cross-platform determinism.
//! The client build and the audit replayer both sit on top of them.

pub mod fixed;
pub mod vec2;
pub mod rng;
pub mod hash;

// Re-export core types
pub use fixed::{Fixed, FixedError, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use vec2::FixedVec2;
pub use rng::DeterministicRng;
pub use hash::{StateHash, StateHasher};
