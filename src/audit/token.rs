//! Run Tokens
//!
//! Signed, time-boxed payloads that pin a run to its seed, simulation
//! version, configuration snapshot and audit ticks. HS256 JWTs signed with a
//! run-token secret that is separate from any login secret.
//!
//! Verification accepts the current secret and, during rotation, the
//! previous one.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub use crate::game::config::ConfigSnapshot;
use crate::core::rng::derive_run_seed;
use crate::{SIMULATION_VERSION, TICK_RATE};

/// Value of the `kind` claim on run tokens.
pub const RUN_TOKEN_KIND: &str = "run";

/// Default token lifetime (2 hours).
pub const DEFAULT_TTL_SECS: i64 = 2 * 60 * 60;

/// Default number of audit ticks per run.
pub const DEFAULT_AUDIT_TICKS: usize = 4;

/// Default run bound: 30 minutes of simulation.
pub const DEFAULT_MAX_TICKS: u32 = 30 * 60 * TICK_RATE;

/// Default wave bound.
pub const DEFAULT_MAX_WAVES: u32 = 50;

// =============================================================================
// CONFIG
// =============================================================================

/// Run token configuration.
#[derive(Clone, Debug)]
pub struct RunTokenConfig {
    /// Current HS256 secret. Signs and verifies.
    pub secret: Option<String>,
    /// Previous secret. Verifies only, for rotation.
    pub previous_secret: Option<String>,
    /// Token lifetime in seconds.
    pub ttl_secs: i64,
    /// Audit ticks drawn per run.
    pub audit_tick_count: usize,
    /// Issuer claim to stamp and require, if any.
    pub issuer: Option<String>,
    /// Tick bound written into new tokens.
    pub max_ticks: u32,
    /// Wave bound written into new tokens.
    pub max_waves: u32,
}

impl Default for RunTokenConfig {
    fn default() -> Self {
        Self {
            secret: None,
            previous_secret: None,
            ttl_secs: DEFAULT_TTL_SECS,
            audit_tick_count: DEFAULT_AUDIT_TICKS,
            issuer: None,
            max_ticks: DEFAULT_MAX_TICKS,
            max_waves: DEFAULT_MAX_WAVES,
        }
    }
}

impl RunTokenConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            secret: std::env::var("RUN_TOKEN_SECRET").ok().filter(|s| !s.is_empty()),
            previous_secret: std::env::var("RUN_TOKEN_SECRET_PREVIOUS").ok().filter(|s| !s.is_empty()),
            ttl_secs: env_parse("RUN_TOKEN_TTL_SECS").unwrap_or(defaults.ttl_secs),
            audit_tick_count: env_parse("RUN_TOKEN_AUDIT_TICKS").unwrap_or(defaults.audit_tick_count),
            issuer: std::env::var("RUN_TOKEN_ISSUER").ok(),
            max_ticks: env_parse("RUN_TOKEN_MAX_TICKS").unwrap_or(defaults.max_ticks),
            max_waves: env_parse("RUN_TOKEN_MAX_WAVES").unwrap_or(defaults.max_waves),
        }
    }

    /// Config with a single secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Check if run tokens can be signed and verified.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// =============================================================================
// CLAIMS
// =============================================================================

/// Kind of run the token authorises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Regular wave run.
    Standard,
    /// Boss rush event.
    BossRush,
}

/// Run token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTokenClaims {
    /// Run id.
    pub sub: String,
    /// Owning user id.
    pub uid: String,
    /// Always [`RUN_TOKEN_KIND`].
    pub kind: String,
    /// RNG seed.
    pub seed: u32,
    /// Simulation version the run must be replayed with.
    pub sim_version: u32,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
    /// Wave bound.
    pub max_waves: u32,
    /// Tick bound.
    pub max_ticks: u32,
    /// Ticks per second.
    pub tick_rate: u32,
    /// Sorted ticks at which fingerprints are compared.
    pub audit_ticks: Vec<u32>,
    /// Outcome-relevant configuration.
    pub config: ConfigSnapshot,
    /// Run mode tag.
    pub mode: RunMode,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl RunTokenClaims {
    /// Has the token expired at `now`?
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.exp
    }

    /// Last tick this run can reach.
    pub fn horizon(&self) -> u32 {
        run_horizon(self.max_ticks, self.max_waves, self.config.wave_interval_ticks)
    }
}

/// Last tick a run can reach: the tick bound, or the tick at which the wave
/// bound ends the run, whichever comes first.
///
/// Wave `max_waves + 1` would start at `wave_interval * (max_waves + 1)`; the
/// run ends on that tick instead.
pub fn run_horizon(max_ticks: u32, max_waves: u32, wave_interval_ticks: u32) -> u32 {
    if max_waves == 0 || wave_interval_ticks == 0 {
        return max_ticks;
    }
    let by_waves = wave_interval_ticks.saturating_mul(max_waves.saturating_add(1));
    if max_ticks == 0 {
        by_waves
    } else {
        max_ticks.min(by_waves)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Run token errors. All of them mean "reject the token".
#[derive(Debug, Error)]
pub enum TokenError {
    /// No run token secret configured.
    #[error("run tokens not configured")]
    NotConfigured,
    /// Token is not a well-formed JWT.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature matches neither secret.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Token was minted for a different simulation version.
    #[error("simulation version mismatch: expected {expected}, got {got}")]
    VersionMismatch {
        /// Version of this build.
        expected: u32,
        /// Version in the token.
        got: u32,
    },
    /// Token is for a different run mode.
    #[error("run mode mismatch: expected {expected:?}, got {got:?}")]
    ModeMismatch {
        /// Mode required by the caller.
        expected: RunMode,
        /// Mode in the token.
        got: RunMode,
    },
    /// Token is not a run token.
    #[error("wrong token kind: {0}")]
    WrongTokenKind(String),
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Signing failed.
    #[error("encode error: {0}")]
    Encode(String),
    /// Payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

// =============================================================================
// SIGN / VERIFY
// =============================================================================

/// Current Unix time in seconds.
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Sign claims with the current secret.
pub fn sign_run_token(claims: &RunTokenClaims, config: &RunTokenConfig) -> Result<String, TokenError> {
    let secret = config.secret.as_ref().ok_or(TokenError::NotConfigured)?;
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| TokenError::Encode(e.to_string()))
}

/// Verify a run token at time `now` (Unix seconds).
///
/// Tries the current secret, then the previous one. Rejects expired tokens,
/// non-run tokens and tokens from another simulation version.
pub fn verify_run_token(token: &str, config: &RunTokenConfig, now: i64) -> Result<RunTokenClaims, TokenError> {
    let secret = config.secret.as_ref().ok_or(TokenError::NotConfigured)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims = std::collections::HashSet::new();
    // Expiry is checked below against the caller's clock
    validation.validate_exp = false;
    validation.validate_aud = false;
    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    let decoded = match decode_with(token, secret, &validation) {
        Err(TokenError::InvalidSignature) => match config.previous_secret.as_ref() {
            Some(previous) => decode_with(token, previous, &validation),
            None => Err(TokenError::InvalidSignature),
        },
        other => other,
    };
    let claims = decoded.map_err(|e| {
        warn!(error = %e, "Run token rejected");
        e
    })?;

    if claims.kind != RUN_TOKEN_KIND {
        return Err(TokenError::WrongTokenKind(claims.kind));
    }
    if claims.is_expired(now) {
        return Err(TokenError::Expired);
    }
    if claims.sim_version != SIMULATION_VERSION {
        return Err(TokenError::VersionMismatch {
            expected: SIMULATION_VERSION,
            got: claims.sim_version,
        });
    }

    Ok(claims)
}

/// Verify a run token and require a specific run mode.
pub fn verify_for_mode(
    token: &str,
    config: &RunTokenConfig,
    now: i64,
    expected: RunMode,
) -> Result<RunTokenClaims, TokenError> {
    let claims = verify_run_token(token, config, now)?;
    if claims.mode != expected {
        return Err(TokenError::ModeMismatch { expected, got: claims.mode });
    }
    Ok(claims)
}

fn decode_with(token: &str, secret: &str, validation: &Validation) -> Result<RunTokenClaims, TokenError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    decode::<RunTokenClaims>(token, &key, validation)
        .map(|data| data.claims)
        .map_err(map_jwt_error)
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => TokenError::InvalidFormat,
        _ => TokenError::Decode(err.to_string()),
    }
}

// =============================================================================
// MINTING
// =============================================================================

/// Draw `count` distinct audit ticks from `1..=horizon`, sorted ascending.
///
/// The server's RNG, not the run RNG: the client must not be able to
/// predict which ticks will be checked. Pass [`run_horizon`] so every tick
/// drawn is one the run can reach.
pub fn select_audit_ticks<R: Rng + ?Sized>(rng: &mut R, horizon: u32, count: usize) -> Vec<u32> {
    let amount = count.min(horizon as usize);
    let mut ticks: Vec<u32> = rand::seq::index::sample(rng, horizon as usize, amount)
        .into_iter()
        .map(|i| i as u32 + 1)
        .collect();
    ticks.sort_unstable();
    ticks
}

/// Builder for run token claims.
#[derive(Debug, Clone)]
pub struct RunTokenBuilder {
    run_id: Uuid,
    user_id: String,
    seed: u32,
    config: ConfigSnapshot,
    mode: RunMode,
    max_waves: u32,
    max_ticks: u32,
    audit_ticks: Vec<u32>,
    issued_at: i64,
}

impl RunTokenBuilder {
    /// Start building claims for a run.
    pub fn new(run_id: Uuid, user_id: impl Into<String>, seed: u32) -> Self {
        Self {
            run_id,
            user_id: user_id.into(),
            seed,
            config: ConfigSnapshot::default(),
            mode: RunMode::Standard,
            max_waves: DEFAULT_MAX_WAVES,
            max_ticks: DEFAULT_MAX_TICKS,
            audit_ticks: Vec::new(),
            issued_at: 0,
        }
    }

    /// Set the configuration snapshot.
    pub fn config(mut self, config: ConfigSnapshot) -> Self {
        self.config = config;
        self
    }

    /// Set the run mode.
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the run bounds.
    pub fn limits(mut self, max_waves: u32, max_ticks: u32) -> Self {
        self.max_waves = max_waves;
        self.max_ticks = max_ticks;
        self
    }

    /// Set the audit ticks (sorted and deduplicated).
    pub fn audit_ticks(mut self, mut ticks: Vec<u32>) -> Self {
        ticks.sort_unstable();
        ticks.dedup();
        self.audit_ticks = ticks;
        self
    }

    /// Set the issue time.
    pub fn issued_at(mut self, iat: i64) -> Self {
        self.issued_at = iat;
        self
    }

    /// Finish the claims using `config` for lifetime and issuer.
    pub fn build(self, config: &RunTokenConfig) -> RunTokenClaims {
        RunTokenClaims {
            sub: self.run_id.to_string(),
            uid: self.user_id,
            kind: RUN_TOKEN_KIND.to_string(),
            seed: self.seed,
            sim_version: SIMULATION_VERSION,
            iat: self.issued_at,
            exp: self.issued_at.saturating_add(config.ttl_secs),
            max_waves: self.max_waves,
            max_ticks: self.max_ticks,
            tick_rate: TICK_RATE,
            audit_ticks: self.audit_ticks,
            config: self.config,
            mode: self.mode,
            iss: config.issuer.clone(),
        }
    }
}

/// Mint a fresh run: new run id, server-derived seed, unpredictable audit
/// ticks, signed token.
pub fn mint_run_token<R: Rng + ?Sized>(
    rng: &mut R,
    user_id: &str,
    snapshot: ConfigSnapshot,
    mode: RunMode,
    config: &RunTokenConfig,
    now: i64,
) -> Result<(RunTokenClaims, String), TokenError> {
    if !config.is_configured() {
        return Err(TokenError::NotConfigured);
    }

    let run_id = Uuid::new_v4();
    let mut entropy = [0u8; 32];
    rng.fill(&mut entropy);
    let seed = derive_run_seed(run_id.as_bytes(), &entropy);
    let horizon = run_horizon(config.max_ticks, config.max_waves, snapshot.wave_interval_ticks);
    let audit_ticks = select_audit_ticks(rng, horizon, config.audit_tick_count);

    let claims = RunTokenBuilder::new(run_id, user_id, seed)
        .config(snapshot)
        .mode(mode)
        .limits(config.max_waves, config.max_ticks)
        .audit_ticks(audit_ticks)
        .issued_at(now)
        .build(config);
    let token = sign_run_token(&claims, config)?;
    Ok((claims, token))
}

// =============================================================================
// TESTS
// =============================================================================
