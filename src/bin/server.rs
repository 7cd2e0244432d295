//! OpenAI-compatible TTS server binary.
//!
//! Startup order: config, model + voice assets, phonemizer, engine,
//! orchestrator, preloader, allocator loop, then the HTTP listener. Any
//! startup failure exits non-zero; a clean shutdown exits zero.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vocalis::allocator::DynamicCpuAllocator;
use vocalis::cache::AudioCache;
use vocalis::config::AppConfig;
use vocalis::download;
use vocalis::engine::AcousticEngine;
use vocalis::perf::PerformanceMonitor;
use vocalis::phoneme::EspeakPhonemizer;
use vocalis::preloader::Preloader;
use vocalis::server::{build_router, AppContext};
use vocalis::synth::Synthesizer;
use vocalis::voice::VoiceManager;

#[derive(Parser, Debug)]
#[command(name = "vocalis-server", version, about = "ONNX text-to-speech server")]
struct Args {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Local ONNX model path (skips the Hub download).
    #[arg(long)]
    model: Option<PathBuf>,

    /// HuggingFace repository to fetch model + voices from.
    #[arg(long)]
    repo: Option<String>,

    /// Bind address override.
    #[arg(long, env = "API_HOST")]
    host: Option<String>,

    /// Port override.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Voices directory override.
    #[arg(long)]
    voices_dir: Option<PathBuf>,

    /// Opt into cache warming at startup.
    #[arg(long)]
    warm: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("startup failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.voices_dir {
        config.voice.voices_dir = dir;
    }
    if args.warm {
        config.preloader.warm_on_startup = true;
    }

    // ── Assets ───────────────────────────────────────────────────────────────
    let (model_path, aliases, model_id) = match (&args.model, &args.repo) {
        (Some(path), _) => {
            if !path.exists() {
                bail!("model file not found: {}", path.display());
            }
            (path.clone(), Default::default(), "local".to_string())
        }
        (None, Some(repo)) => {
            let assets = download::fetch_assets(repo)?;
            let installed = download::install_voices(&assets, &config.voice.voices_dir)?;
            info!(installed, "voices installed from repo");
            if let Some(default_voice) = assets.default_voice.clone() {
                config.voice.default_voice = default_voice;
            }
            (assets.model_path.clone(), assets.aliases, repo.clone())
        }
        (None, None) => bail!("either --model or --repo is required"),
    };

    // ── Core components ──────────────────────────────────────────────────────
    let allocator = Arc::new(DynamicCpuAllocator::with_defaults(config.allocator.clone()));
    let engine = AcousticEngine::load(&model_path, allocator.recommended_threads())
        .context("failed to load acoustic model")?;
    let phonemizer = EspeakPhonemizer::new().context("failed to initialize espeak-ng")?;

    let voices = Arc::new(
        VoiceManager::new(
            &config.voice.voices_dir,
            aliases,
            config.voice.maintain_combined_file,
        )
        .context("failed to load voices")?,
    );
    if voices.is_empty() {
        bail!("no voices available in {}", config.voice.voices_dir.display());
    }
    if config.voice.maintain_combined_file {
        voices.combine().context("failed to build combined voice archive")?;
    }

    let synth = Arc::new(
        Synthesizer::new(
            Arc::new(engine),
            voices,
            Arc::new(phonemizer),
            Arc::new(AudioCache::new(config.cache.max_entries, config.cache.ttl_seconds)),
            Arc::new(PerformanceMonitor::new()),
            Some(allocator.clone()),
            config.performance.clone(),
            config.audio.clone(),
            config.cache.enabled,
        )
        .with_phonetic_capacity(config.cache.phonetic_max_entries),
    );

    let phonetic_sidecar = config.cache.cache_dir.join("phonetic_cache.json");
    match synth.load_phonetic_cache(&phonetic_sidecar) {
        Ok(loaded) => info!(loaded, "phonetic cache restored"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, "phonetic cache load failed"),
    }

    let preloader = Arc::new(Preloader::new(config.preloader.clone(), synth.clone()));
    preloader.start();

    // Allocator sampling loop.
    {
        let allocator = allocator.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(5));
            loop {
                tick.tick().await;
                allocator.observe();
            }
        });
    }

    // ── Listener ─────────────────────────────────────────────────────────────
    let ctx = Arc::new(AppContext {
        synth: synth.clone(),
        preloader: preloader.clone(),
        allocator: Some(allocator),
        model_id,
        config: config.clone(),
    });
    let router = build_router(ctx);

    let listener = bind_with_retry(&config).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    preloader.stop();
    if let Err(e) = synth.save_phonetic_cache(&phonetic_sidecar) {
        warn!(error = %e, "phonetic cache save failed");
    }
    info!("shutdown complete");
    Ok(())
}

/// Try the configured port, then the following ones, up to the attempt cap.
async fn bind_with_retry(config: &AppConfig) -> Result<tokio::net::TcpListener> {
    let host = &config.server.host;
    for offset in 0..config.server.max_port_attempts.max(1) {
        let port = config.server.port.saturating_add(offset);
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid bind address {host}:{port}"))?;
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if offset > 0 {
                    warn!(port, "configured port busy, bound fallback");
                }
                return Ok(listener);
            }
            Err(e) => {
                warn!(port, error = %e, "bind failed");
            }
        }
    }
    bail!(
        "no free port in {}..{}",
        config.server.port,
        config.server.port.saturating_add(config.server.max_port_attempts)
    )
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
