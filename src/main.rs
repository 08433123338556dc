//! Fortress Sim Server
//!
//! Mints a run token, plays a scripted run the way a client would, then
//! audits it through the audit service and checks replay determinism.

use std::time::Duration;
use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fortress_sim::{
    TICK_RATE, SIMULATION_VERSION, VERSION,
    audit::{
        mint_run_token, replay_run, token::now_secs, AuditJob, AuditService, RunMode,
        RunSession, RunTokenConfig,
    },
    core::{fixed::from_int, hash::hash_to_hex},
    game::{ConfigSnapshot, GameState, HeroCommandType, SimConfig, SimEvent},
};

/// Secret used when `RUN_TOKEN_SECRET` is unset. Demo only.
const DEMO_SECRET: &str = "fortress-sim-demo-secret-do-not-deploy";

/// Demo run length (5 minutes of simulation).
const DEMO_MAX_TICKS: u32 = 5 * 60 * TICK_RATE;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Fortress Sim Server v{}", VERSION);
    info!("Tick Rate: {} Hz, Simulation Version: {}", TICK_RATE, SIMULATION_VERSION);

    let mut token_config = RunTokenConfig::from_env();
    if !token_config.is_configured() {
        warn!("RUN_TOKEN_SECRET not set, using demo secret");
        token_config.secret = Some(DEMO_SECRET.to_string());
    }
    if std::env::var("RUN_TOKEN_MAX_TICKS").is_err() {
        token_config.max_ticks = DEMO_MAX_TICKS;
    }

    demo_run(token_config).await
}

/// Play, audit and replay one run.
async fn demo_run(token_config: RunTokenConfig) -> Result<()> {
    info!("=== Minting Run ===");

    let snapshot = ConfigSnapshot {
        starting_gold: 200,
        heroes: vec!["knight".into(), "mage".into()],
        ..ConfigSnapshot::default()
    };
    let (claims, token) = mint_run_token(
        &mut rand::thread_rng(),
        "demo-user",
        snapshot,
        RunMode::Standard,
        &token_config,
        now_secs(),
    )?;

    info!("Run ID: {}", claims.sub);
    info!("Seed: {}", claims.seed);
    info!("Audit ticks: {:?}", claims.audit_ticks);

    info!("=== Playing ===");
    let sim_config = SimConfig::default();
    let mut session = RunSession::start(&claims, sim_config.clone())?;
    let mut rejected = 0;

    while !session.is_ended() {
        for event in scripted_events(session.state()) {
            session.submit(event);
        }
        let result = session.advance();
        rejected += result.rejected_count();

        if let Some(wave) = result.wave_started {
            let state = session.state();
            info!(
                "Tick {}: wave {} ({} enemies, {} gold, {} relics)",
                state.tick(),
                wave,
                state.enemies.len(),
                state.gold,
                state.relics().len()
            );
        }
    }

    let client_hash = session.state().fingerprint();
    let reported = session.report();
    let (final_state, log) = session.finish();

    info!("=== Run Finished ===");
    info!("Final tick: {}, wave: {}", final_state.tick(), final_state.wave);
    info!("Events: {} ({} rejected)", log.len(), rejected);
    info!("Client Final Hash: {}", hash_to_hex(&client_hash));

    info!("=== Auditing ===");
    let (service, worker) = AuditService::spawn(token_config, sim_config.clone(), 16);
    service
        .submit(AuditJob {
            run_id: claims.sub.clone(),
            token,
            log: log.clone(),
            reported,
        })
        .await?;

    let verdict = service
        .wait_for(&claims.sub, Duration::from_secs(30))
        .await
        .context("audit timed out")?;
    info!("Verdict: {:?}", verdict);

    info!("=== Verifying Determinism ===");
    let replay = replay_run(&claims, &log, &sim_config)?;
    info!("Replay Final Hash: {}", hash_to_hex(&replay.final_fingerprint));

    drop(service);
    worker.await?;

    if replay.final_fingerprint != client_hash || !verdict.is_trusted() {
        bail!("DETERMINISM FAILURE: replay diverged from the client");
    }
    info!("DETERMINISM VERIFIED: Hashes match!");
    Ok(())
}

/// A simple client strategy: fortify early, raise militia, pick the first
/// relic offered and use skills as they come off cooldown.
fn scripted_events(state: &GameState) -> Vec<SimEvent> {
    let tick = state.tick();
    let mut events = Vec::new();

    match tick {
        10 => events.push(SimEvent::PlaceWall {
            tick,
            wall_type: "palisade".into(),
            x: from_int(6),
            y: from_int(2),
        }),
        30 => events.push(SimEvent::SpawnMilitia {
            tick,
            militia_type: "footman".into(),
            x: from_int(8),
            y: from_int(7),
            count: Some(3),
        }),
        60 => events.push(SimEvent::HeroCommand {
            tick,
            command_type: HeroCommandType::Move,
            hero_id: Some("knight".into()),
            target_x: Some(from_int(12)),
            target_y: Some(from_int(7)),
            target_enemy_id: None,
        }),
        _ => {}
    }

    if let Some(choice) = state.pending_choice() {
        events.push(SimEvent::ChooseRelic { tick, wave: choice.wave, option_index: 0 });
    }

    if tick > 0 && tick % 600 == 0 {
        for (skill, cooldown) in &state.skill_cooldowns {
            if *cooldown == 0 {
                events.push(SimEvent::ActivateSkill { tick, skill_id: skill.clone() });
            }
        }
    }

    events
}
