use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use am_agent::{AutomationLoop, SimulatedMixer};
use am_audio::AudioPipeline;
use am_core::MixConfig;
use am_core::features::MixState;
use anyhow::{Context, Result};
use clap::Parser;

pub mod cli;
pub mod train;

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = cli::Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    // 3. Charger la config, puis les overrides CLI
    let mut config = resolve_config(&cli.config)?;
    cli.apply_overrides(&mut config)?;

    // 4. Arrêt propre sur Ctrl-C
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || flag.store(true, Ordering::Release))
        .context("Impossible d'installer le gestionnaire Ctrl-C")?;

    match cli.command.clone().unwrap_or(cli::Command::Run) {
        cli::Command::Run => run_session(&config, &stop),
        cli::Command::Train { samples } => train::run_training(&config, &samples),
        cli::Command::Analyze { seconds } => analyze(&config, seconds, &stop),
    }
}

/// Capture → traitement → décisions, jusqu'à Ctrl-C. Persiste l'apprentissage à la sortie.
fn run_session(config: &MixConfig, stop: &AtomicBool) -> Result<()> {
    let (mut pipeline, reader) =
        AudioPipeline::start_default(config).context("Capture audio indisponible")?;
    log::info!("Pipeline audio démarré à {} Hz", pipeline.sample_rate());

    let mixer = SimulatedMixer::new(MixState {
        deck_a_playing: true,
        crossfader_position: 0.0,
        ..MixState::default()
    });
    let mut automation = AutomationLoop::from_config(config, reader, mixer.clone(), mixer)?;
    automation.run(stop);

    if let Some(features) = automation.last_features() {
        log::info!(
            "Qualité du mix en fin de session : {:.2}",
            pipeline.estimate_mix_quality(&features)
        );
    }
    pipeline.stop();

    let agent = automation.into_agent();
    let stats = agent.statistics();
    log::info!(
        "Stratégie {} : {} expériences, ε = {:.3}, {} états, récompense moyenne {:+.3} (tendance {:+.3})",
        stats.strategy,
        stats.experience_count,
        stats.exploration_rate,
        stats.q_table_size,
        stats.avg_reward,
        stats.reward_trend
    );

    let dir = Path::new(&config.policy.model_dir);
    if let Err(e) = agent.persist(dir) {
        log::error!("Sauvegarde de l'apprentissage impossible : {e}");
    }
    Ok(())
}

/// Capture `seconds` of audio and print the buffer analysis.
fn analyze(config: &MixConfig, seconds: f32, stop: &AtomicBool) -> Result<()> {
    let (mut pipeline, _reader) =
        AudioPipeline::start_default(config).context("Capture audio indisponible")?;

    // Small margin so the span is full when analysed.
    let wait = Duration::from_secs_f32(seconds.max(0.0) + 0.2);
    let started = Instant::now();
    while started.elapsed() < wait && !stop.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(50));
    }

    let report = pipeline.analyze_recent(seconds);
    pipeline.stop();
    let a = report?;
    println!("Durée analysée   : {:.2} s ({} trames)", a.duration, a.frames);
    println!("RMS moyen        : {:.4} (σ {:.4})", a.avg_rms, a.rms_std);
    println!("Plage dynamique  : {:.4}", a.dynamic_range);
    println!("Tempo estimé     : {:.1} BPM ({} temps)", a.tempo, a.beat_count);
    println!("Centroïde moyen  : {:.0} Hz", a.avg_centroid);
    println!("Rolloff moyen    : {:.0} Hz", a.avg_rolloff);
    Ok(())
}

/// Load the TOML config, or defaults if the file does not exist.
fn resolve_config(path: &Path) -> Result<MixConfig> {
    if path.exists() {
        am_core::config::load_config(path)
    } else {
        log::warn!(
            "Config introuvable : {}. Utilisation des défauts.",
            path.display()
        );
        Ok(MixConfig::default())
    }
}
