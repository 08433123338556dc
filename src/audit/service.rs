//! Audit Service
//!
//! Asynchronous verification of finished runs. Submissions go onto a
//! channel and return immediately; a single worker task verifies the token,
//! replays the run on a blocking thread and stores the verdict. Reward
//! finalisation polls [`AuditService::verdict`].
//!
//! Each replay owns its own `GameState`; nothing is shared between jobs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audit::fingerprint::{audit_checkpoints, AuditVerdict};
use crate::audit::replay::{replay_checkpoints, EventLog};
use crate::audit::token::{now_secs, verify_run_token, RunTokenConfig, TokenError};
use crate::game::config::SimConfig;

/// A finished run awaiting audit.
#[derive(Debug, Clone)]
pub struct AuditJob {
    /// Run id the client claims (must equal the token subject).
    pub run_id: String,
    /// The run token issued at start.
    pub token: String,
    /// Every event the client stepped.
    pub log: EventLog,
    /// Client fingerprints by tick (lowercase hex).
    pub reported: BTreeMap<u32, String>,
}

/// Audit service errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Worker has stopped.
    #[error("audit service closed")]
    Closed,
}

/// Handle to the audit worker.
#[derive(Clone)]
pub struct AuditService {
    tx: mpsc::Sender<AuditJob>,
    verdicts: Arc<RwLock<BTreeMap<String, AuditVerdict>>>,
}

impl AuditService {
    /// Spawn the worker. It stops once every handle is dropped.
    pub fn spawn(token_config: RunTokenConfig, sim_config: SimConfig, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditJob>(capacity.max(1));
        let verdicts = Arc::new(RwLock::new(BTreeMap::new()));

        let store = Arc::clone(&verdicts);
        let sim_config = Arc::new(sim_config);
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let run_id = job.run_id.clone();
                let verdict = audit_job(job, &token_config, Arc::clone(&sim_config), now_secs()).await;
                store.write().await.insert(run_id, verdict);
            }
            info!("Audit worker stopped");
        });

        (Self { tx, verdicts }, worker)
    }

    /// Queue a run for audit.
    pub async fn submit(&self, job: AuditJob) -> Result<(), AuditError> {
        self.tx.send(job).await.map_err(|_| AuditError::Closed)
    }

    /// Verdict for a run, if its audit has finished.
    pub async fn verdict(&self, run_id: &str) -> Option<AuditVerdict> {
        self.verdicts.read().await.get(run_id).cloned()
    }

    /// Wait up to `timeout` for a verdict.
    pub async fn wait_for(&self, run_id: &str, timeout: Duration) -> Option<AuditVerdict> {
        let poll = async {
            loop {
                if let Some(verdict) = self.verdict(run_id).await {
                    return verdict;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.ok()
    }

    /// Number of finished audits.
    pub async fn verdict_count(&self) -> usize {
        self.verdicts.read().await.len()
    }
}

/// Audit one run at time `now`.
///
/// An expired token yields [`AuditVerdict::Stale`]; any other token or
/// setup problem yields [`AuditVerdict::Rejected`].
pub async fn audit_job(
    job: AuditJob,
    token_config: &RunTokenConfig,
    sim_config: Arc<SimConfig>,
    now: i64,
) -> AuditVerdict {
    let claims = match verify_run_token(&job.token, token_config, now) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            warn!(run = %job.run_id, "Audit on expired token");
            return AuditVerdict::Stale;
        }
        Err(e) => return rejected(&job.run_id, e.to_string()),
    };
    if claims.sub != job.run_id {
        return rejected(&job.run_id, "run id does not match token".into());
    }

    let AuditJob { run_id, log, reported, .. } = job;
    let claimed = claims.audit_ticks.clone();
    let replay = tokio::task::spawn_blocking(move || replay_checkpoints(&claims, &log, &sim_config)).await;

    let outcome = match replay {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => return rejected(&run_id, e.to_string()),
        Err(e) => return rejected(&run_id, format!("replay task failed: {e}")),
    };

    let verdict = audit_checkpoints(&claimed, &outcome.checkpoints, &reported);
    match &verdict {
        AuditVerdict::Verified => {
            info!(run = %run_id, checkpoints = outcome.checkpoints.len(), "Run verified");
        }
        other => {
            warn!(run = %run_id, verdict = ?other, "Run failed audit");
        }
    }
    verdict
}

fn rejected(run_id: &str, reason: String) -> AuditVerdict {
    warn!(run = %run_id, %reason, "Audit rejected");
    AuditVerdict::Rejected { reason }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::replay::RunSession;
    use crate::audit::token::{sign_run_token, RunTokenBuilder, RunTokenClaims};
    use crate::core::fixed::from_int;
    use crate::game::config::ConfigSnapshot;
    use crate::game::events::SimEvent;
    use uuid::Uuid;

    const SECRET: &str = "audit-secret-key-256-bits-long!";

    fn token_config() -> RunTokenConfig {
        RunTokenConfig::with_secret(SECRET)
    }

    fn claims(iat: i64) -> RunTokenClaims {
        let snapshot = ConfigSnapshot {
            starting_gold: 120,
            wave_interval_ticks: 30,
            ..ConfigSnapshot::default()
        };
        RunTokenBuilder::new(Uuid::new_v4(), "player", 1234)
            .config(snapshot)
            .limits(5, 90)
            .audit_ticks(vec![20, 45, 90])
            .issued_at(iat)
            .build(&token_config())
    }

    fn played_job(claims: &RunTokenClaims) -> AuditJob {
        let mut session = RunSession::start(claims, SimConfig::default()).unwrap();
        while !session.is_ended() {
            if session.state().tick() == 12 {
                session.submit(SimEvent::PlaceWall {
                    tick: 12,
                    wall_type: "stone".into(),
                    x: from_int(10),
                    y: from_int(5),
                });
            }
            session.advance();
        }
        let reported = session.report();
        let (_, log) = session.finish();
        AuditJob {
            run_id: claims.sub.clone(),
            token: sign_run_token(claims, &token_config()).unwrap(),
            log,
            reported,
        }
    }

    #[tokio::test]
    async fn test_audit_job_verified() {
        let claims = claims(now_secs());
        let job = played_job(&claims);
        let verdict = audit_job(job, &token_config(), Arc::new(SimConfig::default()), now_secs()).await;
        assert_eq!(verdict, AuditVerdict::Verified);
    }

    #[tokio::test]
    async fn test_audit_job_stale() {
        let claims = claims(1_000);
        let job = played_job(&claims);
        let verdict = audit_job(job, &token_config(), Arc::new(SimConfig::default()), claims.exp + 1).await;
        assert_eq!(verdict, AuditVerdict::Stale);
    }

    #[tokio::test]
    async fn test_audit_job_tampered_report() {
        let claims = claims(now_secs());
        let mut job = played_job(&claims);
        job.reported.insert(45, "00".repeat(32));
        let verdict = audit_job(job, &token_config(), Arc::new(SimConfig::default()), now_secs()).await;
        assert_eq!(verdict, AuditVerdict::Mismatch { ticks: vec![45] });
    }

    #[tokio::test]
    async fn test_audit_job_checks_ticks_past_run_end() {
        // Five waves every 30 ticks end the run at 180; 500 holds the final state
        let snapshot = ConfigSnapshot { wave_interval_ticks: 30, ..ConfigSnapshot::default() };
        let claims = RunTokenBuilder::new(Uuid::new_v4(), "player", 77)
            .config(snapshot)
            .limits(5, 1_000)
            .audit_ticks(vec![60, 500])
            .issued_at(now_secs())
            .build(&token_config());
        assert_eq!(claims.horizon(), 180);

        let mut job = played_job(&claims);
        assert_eq!(job.reported.len(), 2);
        let verdict = audit_job(job.clone(), &token_config(), Arc::new(SimConfig::default()), now_secs()).await;
        assert_eq!(verdict, AuditVerdict::Verified);

        job.reported.insert(500, "00".repeat(32));
        let verdict = audit_job(job, &token_config(), Arc::new(SimConfig::default()), now_secs()).await;
        assert_eq!(verdict, AuditVerdict::Mismatch { ticks: vec![500] });
    }

    #[tokio::test]
    async fn test_audit_job_rejects_foreign_run_id() {
        let claims = claims(now_secs());
        let mut job = played_job(&claims);
        job.run_id = "someone-elses-run".into();
        let verdict = audit_job(job, &token_config(), Arc::new(SimConfig::default()), now_secs()).await;
        assert!(matches!(verdict, AuditVerdict::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let (service, worker) = AuditService::spawn(token_config(), SimConfig::default(), 8);

        let good = claims(now_secs());
        let good_job = played_job(&good);

        let bad = claims(now_secs());
        let mut bad_job = played_job(&bad);
        bad_job.token = sign_run_token(&bad, &RunTokenConfig::with_secret("forged-secret-key-256-bits-long")).unwrap();

        service.submit(good_job).await.unwrap();
        service.submit(bad_job).await.unwrap();

        let timeout = Duration::from_secs(10);
        assert_eq!(service.wait_for(&good.sub, timeout).await, Some(AuditVerdict::Verified));
        assert!(matches!(
            service.wait_for(&bad.sub, timeout).await,
            Some(AuditVerdict::Rejected { .. })
        ));
        assert_eq!(service.verdict_count().await, 2);
        assert_eq!(service.verdict("unknown").await, None);

        drop(service);
        worker.await.unwrap();
    }
}
