//! Run Audit Module
//!
//! Binds a run to its seed and configuration, and checks client-computed
//! state against a server replay at a few unpredictable ticks.
//!
//! ## Flow
//!
//! ```text
//! run start    mint_run_token ──► signed token (seed, snapshot, audit ticks)
//! client       RunSession ──────► event log + fingerprints at audit ticks
//! server       AuditService ────► verify token ► replay_checkpoints ► audit_checkpoints
//! rewards      verdict(run_id) ─► Verified / Mismatch / Unreachable / Incomplete / Stale
//! ```

pub mod token;
pub mod fingerprint;
pub mod replay;
pub mod service;

pub use token::{
    mint_run_token, sign_run_token, verify_run_token, verify_for_mode, select_audit_ticks, run_horizon,
    RunMode, RunTokenBuilder, RunTokenClaims, RunTokenConfig, TokenError,
};
pub use fingerprint::{audit_checkpoints, fingerprint_hex, state_fingerprint, AuditVerdict};
pub use replay::{replay_checkpoints, replay_run, EventLog, ReplayError, ReplayOutcome, RunSession};
pub use service::{AuditError, AuditJob, AuditService};
