//! Run Recording & Replay
//!
//! [`RunSession`] drives a run tick by tick the way a client does, logging
//! every event with the tick it was stepped at and capturing fingerprints at
//! the audit ticks. [`replay_run`] rebuilds the same run from the token
//! claims and the log, so the server can compare fingerprints without
//! trusting the client. [`replay_checkpoints`] stops at the last audit tick
//! instead of the end of the run.
//!
//! A run that ends before an audit tick holds its final state from then on,
//! so those ticks are fingerprinted with the final state.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::audit::fingerprint::state_fingerprint;
use crate::audit::token::RunTokenClaims;
use crate::core::hash::{hash_to_hex, StateHash};
use crate::game::config::SimConfig;
use crate::game::events::SimEvent;
use crate::game::relic::SeededRelicPool;
use crate::game::state::{GameState, RunLimits, SetupError};
use crate::game::tick::{step, TickResult};

// =============================================================================
// EVENT LOG
// =============================================================================

/// An event together with the tick it was stepped at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Tick whose step processed the event.
    pub at: u32,
    /// The event as submitted.
    pub event: SimEvent,
}

/// Ordered record of every event submitted during a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<LoggedEvent>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event stepped at its own tick.
    pub fn push(&mut self, event: SimEvent) {
        let at = event.tick();
        self.push_at(at, event);
    }

    /// Record an event stepped at `at`.
    pub fn push_at(&mut self, at: u32, event: SimEvent) {
        self.entries.push(LoggedEvent { at, event });
    }

    /// All entries in submission order.
    pub fn entries(&self) -> &[LoggedEvent] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Events grouped by step tick, submission order kept within a tick.
    pub fn by_tick(&self) -> BTreeMap<u32, Vec<SimEvent>> {
        let mut grouped: BTreeMap<u32, Vec<SimEvent>> = BTreeMap::new();
        for entry in &self.entries {
            grouped.entry(entry.at).or_default().push(entry.event.clone());
        }
        grouped
    }

    /// One JSON object per line.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse the output of [`EventLog::to_json_lines`]. Blank lines are skipped.
    pub fn from_json_lines(text: &str) -> Result<Self, serde_json::Error> {
        let entries = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<LoggedEvent>, _>>()?;
        Ok(Self { entries })
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Why a run could not be replayed.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The snapshot does not describe a valid starting state.
    #[error("invalid run setup: {0}")]
    Setup(#[from] SetupError),

    /// The claims carry no tick bound.
    #[error("run has no tick bound")]
    Unbounded,
}

// =============================================================================
// SESSION
// =============================================================================

/// A run in progress.
pub struct RunSession {
    state: GameState,
    config: SimConfig,
    generator: SeededRelicPool,
    audit_ticks: BTreeSet<u32>,
    queued: Vec<SimEvent>,
    log: EventLog,
    checkpoints: BTreeMap<u32, StateHash>,
}

impl RunSession {
    /// Start a run from verified token claims.
    pub fn start(claims: &RunTokenClaims, config: SimConfig) -> Result<Self, ReplayError> {
        if claims.max_ticks == 0 {
            return Err(ReplayError::Unbounded);
        }

        let state = GameState::new_run(claims.seed, &claims.config, &config)?
            .with_limits(RunLimits { max_ticks: claims.max_ticks, max_waves: claims.max_waves });
        let generator = SeededRelicPool::from_config(&config);

        let mut session = Self {
            state,
            config,
            generator,
            audit_ticks: claims.audit_ticks.iter().copied().collect(),
            queued: Vec::new(),
            log: EventLog::new(),
            checkpoints: BTreeMap::new(),
        };
        session.capture_checkpoint();
        Ok(session)
    }

    /// Current state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable state, for the out-of-core resolution step (combat, AI).
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    /// Queue an event for the next step.
    pub fn submit(&mut self, event: SimEvent) {
        self.queued.push(event);
    }

    /// Step one tick with the queued events.
    pub fn advance(&mut self) -> TickResult {
        let events = std::mem::take(&mut self.queued);
        let at = self.state.tick();
        let result = step(&mut self.state, &events, &self.config, &mut self.generator);

        for event in events {
            self.log.push_at(at, event);
        }
        self.capture_checkpoint();
        result
    }

    /// Step until the run ends.
    pub fn run_to_end(&mut self) {
        while !self.state.is_ended() {
            self.advance();
        }
    }

    /// Has the run ended?
    pub fn is_ended(&self) -> bool {
        self.state.is_ended()
    }

    /// Log of submitted events.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Fingerprints captured at audit ticks so far.
    pub fn checkpoints(&self) -> &BTreeMap<u32, StateHash> {
        &self.checkpoints
    }

    /// Has every audit tick been fingerprinted?
    pub fn checkpoints_complete(&self) -> bool {
        self.checkpoints.len() == self.audit_ticks.len()
    }

    /// Captured fingerprints in wire form.
    pub fn report(&self) -> BTreeMap<u32, String> {
        self.checkpoints
            .iter()
            .map(|(tick, hash)| (*tick, hash_to_hex(hash)))
            .collect()
    }

    /// Consume the session, returning the final state and the log.
    pub fn finish(self) -> (GameState, EventLog) {
        (self.state, self.log)
    }

    fn capture_checkpoint(&mut self) {
        let tick = self.state.tick();
        let upto = if self.state.is_ended() { u32::MAX } else { tick };
        let due: Vec<u32> = self
            .audit_ticks
            .range(tick..=upto)
            .filter(|t| !self.checkpoints.contains_key(t))
            .copied()
            .collect();
        if due.is_empty() {
            return;
        }

        let hash = state_fingerprint(&self.state);
        for t in due {
            self.checkpoints.insert(t, hash);
        }
    }
}

// =============================================================================
// REPLAY
// =============================================================================

/// Result of replaying a run.
#[derive(Debug)]
pub struct ReplayOutcome {
    /// Fingerprints at every audit tick.
    pub checkpoints: BTreeMap<u32, StateHash>,
    /// State where the replay stopped.
    pub final_state: GameState,
    /// Fingerprint of `final_state`.
    pub final_fingerprint: StateHash,
    /// Events that were rejected during replay.
    pub rejected_events: usize,
}

/// Replay a run from its claims and event log, to the end of the run.
///
/// Events logged at or past the tick bound never run.
pub fn replay_run(
    claims: &RunTokenClaims,
    log: &EventLog,
    config: &SimConfig,
) -> Result<ReplayOutcome, ReplayError> {
    replay(claims, log, config, true)
}

/// Replay a run only as far as its last audit tick.
///
/// Enough to audit the checkpoints; `final_state` is the state at the last
/// audit tick (or the end of the run, if that comes first).
pub fn replay_checkpoints(
    claims: &RunTokenClaims,
    log: &EventLog,
    config: &SimConfig,
) -> Result<ReplayOutcome, ReplayError> {
    replay(claims, log, config, false)
}

fn replay(
    claims: &RunTokenClaims,
    log: &EventLog,
    config: &SimConfig,
    to_end: bool,
) -> Result<ReplayOutcome, ReplayError> {
    let mut session = RunSession::start(claims, config.clone())?;
    let mut grouped = log.by_tick();
    let mut rejected_events = 0;

    while !session.is_ended() && (to_end || !session.checkpoints_complete()) {
        let tick = session.state().tick();
        for event in grouped.remove(&tick).unwrap_or_default() {
            session.submit(event);
        }
        rejected_events += session.advance().rejected_count();
    }

    let unreplayed: usize = grouped.values().map(Vec::len).sum();
    debug!(
        run = %claims.sub,
        final_tick = session.state().tick(),
        to_end,
        rejected_events,
        unreplayed,
        "Replay complete"
    );

    let checkpoints = session.checkpoints().clone();
    let (final_state, _) = session.finish();
    let final_fingerprint = state_fingerprint(&final_state);

    Ok(ReplayOutcome {
        checkpoints,
        final_state,
        final_fingerprint,
        rejected_events,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::fingerprint::{audit_checkpoints, AuditVerdict};
    use crate::audit::token::{RunTokenBuilder, RunTokenConfig};
    use crate::core::fixed::from_int;
    use crate::game::config::ConfigSnapshot;
    use uuid::Uuid;

    fn claims(audit_ticks: Vec<u32>) -> RunTokenClaims {
        let snapshot = ConfigSnapshot {
            starting_gold: 200,
            wave_interval_ticks: 20,
            ..ConfigSnapshot::default()
        };
        RunTokenBuilder::new(Uuid::nil(), "u1", 42)
            .config(snapshot)
            .limits(10, 100)
            .audit_ticks(audit_ticks)
            .build(&RunTokenConfig::with_secret("s"))
    }

    fn play(claims: &RunTokenClaims) -> RunSession {
        let mut session = RunSession::start(claims, SimConfig::default()).unwrap();
        while !session.is_ended() {
            match session.state().tick() {
                10 => session.submit(SimEvent::PlaceWall {
                    tick: 10,
                    wall_type: "palisade".into(),
                    x: from_int(6),
                    y: from_int(2),
                }),
                25 => session.submit(SimEvent::SpawnMilitia {
                    tick: 25,
                    militia_type: "archer".into(),
                    x: from_int(8),
                    y: from_int(7),
                    count: Some(2),
                }),
                _ => {}
            }
            session.advance();
        }
        session
    }

    #[test]
    fn test_log_json_lines() {
        let mut log = EventLog::new();
        log.push(SimEvent::RerollRelics { tick: 4 });
        log.push_at(9, SimEvent::ActivateSnap { tick: 7 });

        let text = log.to_json_lines().unwrap();
        assert_eq!(text.lines().count(), 2);
        let parsed = EventLog::from_json_lines(&format!("{text}\n\n")).unwrap();
        assert_eq!(parsed, log);
        assert_eq!(parsed.entries()[1].at, 9);

        assert!(EventLog::from_json_lines("{not json}").is_err());
    }

    #[test]
    fn test_by_tick_keeps_order() {
        let mut log = EventLog::new();
        log.push(SimEvent::RemoveWall { tick: 5, wall_id: 2 });
        log.push(SimEvent::RerollRelics { tick: 3 });
        log.push(SimEvent::RemoveWall { tick: 5, wall_id: 1 });

        let grouped = log.by_tick();
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![3, 5]);
        assert_eq!(
            grouped[&5],
            vec![
                SimEvent::RemoveWall { tick: 5, wall_id: 2 },
                SimEvent::RemoveWall { tick: 5, wall_id: 1 },
            ]
        );
    }

    #[test]
    fn test_session_captures_audit_ticks() {
        let claims = claims(vec![0, 15, 60, 100]);
        let session = play(&claims);

        assert_eq!(session.state().tick(), 100);
        assert_eq!(session.checkpoints().keys().copied().collect::<Vec<_>>(), vec![0, 15, 60, 100]);
        assert_eq!(session.log().len(), 2);
        assert_eq!(session.state().walls.len(), 1);
    }

    #[test]
    fn test_replay_matches_session() {
        let claims = claims(vec![5, 15, 60, 99]);
        let session = play(&claims);
        let report = session.report();
        let (client_final, log) = session.finish();

        let outcome = replay_run(&claims, &log, &SimConfig::default()).unwrap();
        assert_eq!(outcome.final_fingerprint, client_final.fingerprint());
        assert_eq!(outcome.rejected_events, 0);
        assert_eq!(audit_checkpoints(&claims.audit_ticks, &outcome.checkpoints, &report), AuditVerdict::Verified);
    }

    #[test]
    fn test_tampered_log_detected() {
        let claims = claims(vec![5, 15, 60]);
        let session = play(&claims);
        let report = session.report();
        let (_, log) = session.finish();

        // Drop the wall placement from the log
        let mut tampered = EventLog::new();
        for entry in log.entries().iter().filter(|e| e.at != 10) {
            tampered.push_at(entry.at, entry.event.clone());
        }

        let outcome = replay_run(&claims, &tampered, &SimConfig::default()).unwrap();
        assert_eq!(
            audit_checkpoints(&claims.audit_ticks, &outcome.checkpoints, &report),
            AuditVerdict::Mismatch { ticks: vec![15, 60] }
        );
    }

    #[test]
    fn test_checkpoint_replay_stops_at_last_audit_tick() {
        let claims = claims(vec![5, 15, 60]);
        let session = play(&claims);
        let report = session.report();
        let (_, log) = session.finish();

        let outcome = replay_checkpoints(&claims, &log, &SimConfig::default()).unwrap();
        assert_eq!(outcome.final_state.tick(), 60);
        assert!(!outcome.final_state.is_ended());
        assert_eq!(audit_checkpoints(&claims.audit_ticks, &outcome.checkpoints, &report), AuditVerdict::Verified);

        // Without audit ticks past the start there is nothing to step
        let early = self::claims(vec![0]);
        let outcome = replay_checkpoints(&early, &log, &SimConfig::default()).unwrap();
        assert_eq!(outcome.final_state.tick(), 0);
    }

    #[test]
    fn test_ticks_past_run_end_hold_final_state() {
        let claims = claims(vec![50, 400, 9_000]);
        let session = play(&claims);
        assert!(session.checkpoints_complete());
        let report = session.report();
        let (client_final, log) = session.finish();
        assert_eq!(client_final.tick(), 100);
        assert_eq!(session_hash(&report, 400), client_final.fingerprint());
        assert_eq!(session_hash(&report, 9_000), client_final.fingerprint());

        let outcome = replay_checkpoints(&claims, &log, &SimConfig::default()).unwrap();
        assert_eq!(outcome.final_state.tick(), 100);
        assert_eq!(audit_checkpoints(&claims.audit_ticks, &outcome.checkpoints, &report), AuditVerdict::Verified);

        let mut garbage = report.clone();
        garbage.insert(400, hash_to_hex(&[0u8; 32]));
        assert_eq!(
            audit_checkpoints(&claims.audit_ticks, &outcome.checkpoints, &garbage),
            AuditVerdict::Mismatch { ticks: vec![400] }
        );
    }

    fn session_hash(report: &BTreeMap<u32, String>, tick: u32) -> StateHash {
        crate::core::hash::hash_from_hex(&report[&tick]).unwrap()
    }

    #[test]
    fn test_unbounded_claims_rejected() {
        let mut claims = claims(vec![]);
        claims.max_ticks = 0;
        assert!(matches!(
            replay_run(&claims, &EventLog::new(), &SimConfig::default()),
            Err(ReplayError::Unbounded)
        ));
    }

    #[test]
    fn test_bad_snapshot_rejected() {
        let mut claims = claims(vec![]);
        claims.config.heroes = vec!["nobody".into()];
        assert!(matches!(
            replay_run(&claims, &EventLog::new(), &SimConfig::default()),
            Err(ReplayError::Setup(SetupError::UnknownHero(_)))
        ));
    }
}
