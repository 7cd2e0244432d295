//! Application configuration.
//!
//! A single immutable [`AppConfig`] value is built once at startup (defaults,
//! then an optional JSON file, then environment overrides) and shared by
//! reference. Hot reload is modeled as an atomic swap of an
//! `Arc<AppConfig>` by the owner; components never re-read files themselves.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::audio::AudioFormat;

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub voice: VoiceConfig,
    pub cache: CacheConfig,
    pub performance: PerformanceConfig,
    pub preloader: PreloaderConfig,
    pub allocator: AllocatorConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Preferred port; see `max_port_attempts`.
    pub port: u16,
    /// Consecutive ports tried when `port` is taken before giving up.
    pub max_port_attempts: u16,
    /// Worker thread count hint for the runtime (0 = runtime default).
    pub workers: usize,
    /// Deployment environment name; gates debug surfaces.
    pub environment: String,
    /// Allowed CORS origins; `*` means any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8354,
            max_port_attempts: 10,
            workers: 0,
            environment: "production".into(),
            cors_origins: vec!["*".into()],
        }
    }
}

/// Audio output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Container format used when a request omits `response_format`.
    pub default_format: AudioFormat,
    /// Phonemizer language/voice identifier.
    pub default_language: String,
    /// Character budget per synthesis chunk; sentences pack together up to
    /// this length, longer ones split at clause boundaries.
    pub chunk_max_chars: usize,
    /// Byte size of each emitted chunk on the streaming endpoint.
    pub stream_chunk_bytes: usize,
    /// Per-request wall-clock budget in seconds.
    pub timeout_seconds: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            default_format: AudioFormat::Mp3,
            default_language: "en-us".into(),
            chunk_max_chars: 360,
            stream_chunk_bytes: 4096,
            timeout_seconds: 30,
        }
    }
}

/// Voice asset settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Directory holding `{name}.bin` style matrices.
    pub voices_dir: PathBuf,
    /// Voice used when a request omits `voice`.
    pub default_voice: String,
    /// Whether `combine()` maintains the compatibility archive on disk.
    pub maintain_combined_file: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voices_dir: PathBuf::from("voices"),
            default_voice: "af_heart".into(),
            maintain_combined_file: true,
        }
    }
}

/// Audio + phonetic cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum entries in the audio LRU.
    pub max_entries: usize,
    /// Absolute TTL in seconds; 0 disables expiry.
    pub ttl_seconds: u64,
    /// Directory for persisted sidecars (phonetic cache).
    pub cache_dir: PathBuf,
    /// Maximum entries in the phonetic lookup cache.
    pub phonetic_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 200,
            ttl_seconds: 0,
            cache_dir: PathBuf::from("cache"),
            phonetic_max_entries: 5_000,
        }
    }
}

/// Synthesis retry and budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Attempts before giving up with `EmptyAudio`.
    pub max_retry_attempts: u32,
    /// Pause between retry attempts, in seconds.
    pub retry_delay_seconds: f64,
    /// Hard cap on accepted input length, in characters.
    pub max_text_length: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { max_retry_attempts: 3, retry_delay_seconds: 0.1, max_text_length: 10_000 }
    }
}

/// Cache-warming settings (see `preloader` module for the phrase buckets).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloaderConfig {
    /// Warming requires explicit opt-in.
    pub warm_on_startup: bool,
    /// Voices the warmer focuses on.
    pub primary_voices: Vec<String>,
    /// Seconds of request silence before warming may run.
    pub idle_threshold_seconds: f64,
    /// Tasks popped per warming cycle.
    pub warming_batch_size: usize,
    pub max_concurrent_warming: usize,
    /// Warmed entries older than this are considered stale.
    pub cache_ttl_hours: u64,
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self {
            warm_on_startup: false,
            primary_voices: vec!["af_heart".into(), "am_puck".into()],
            idle_threshold_seconds: 5.0,
            warming_batch_size: 5,
            max_concurrent_warming: 2,
            cache_ttl_hours: 24,
        }
    }
}

/// Dynamic CPU allocator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub enabled: bool,
    /// Sustained utilization below this fraction may raise thread counts.
    pub min_threshold: f64,
    /// Sustained utilization above this fraction may lower thread counts.
    pub max_threshold: f64,
    /// Seconds between allocation changes.
    pub allocation_cooldown: f64,
    /// Upper bound on recommended threads; 0 = detected core count.
    pub max_cores: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_threshold: 0.25,
            max_threshold: 0.80,
            allocation_cooldown: 30.0,
            max_cores: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then `path` (if given), then env vars.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| anyhow::anyhow!("cannot read config {}: {e}", p.display()))?;
                serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("cannot parse config {}: {e}", p.display()))?
            }
            None => AppConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply recognized environment variables on top of the current values.
    ///
    /// `OMP_NUM_THREADS` seeds the allocator ceiling the way the inference
    /// runtime would read it; the allocator may still adjust at runtime.
    pub fn apply_env(&mut self) {
        if let Some(port) = env_parse::<u16>("PORT") {
            self.server.port = port;
        }
        if let Ok(host) = std::env::var("API_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Some(workers) = env_parse::<usize>("WORKERS") {
            self.server.workers = workers;
        }
        if let Ok(env) = std::env::var("ENVIRONMENT") {
            if !env.is_empty() {
                self.server.environment = env;
            }
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            if !origins.is_empty() {
                self.server.cors_origins =
                    origins.split(',').map(|s| s.trim().to_string()).collect();
            }
        }
        if let Some(threads) = env_parse::<usize>("OMP_NUM_THREADS") {
            if threads > 0 {
                self.allocator.max_cores = threads;
            }
        }
    }

    /// True when debug-only surfaces should be exposed.
    pub fn is_development(&self) -> bool {
        matches!(self.server.environment.as_str(), "development" | "dev" | "local")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = AppConfig::default();
        assert_eq!(c.performance.max_retry_attempts, 3);
        assert_eq!(c.performance.max_text_length, 10_000);
        assert!(!c.preloader.warm_on_startup);
        assert_eq!(c.preloader.primary_voices.len(), 2);
        assert!((c.allocator.min_threshold - 0.25).abs() < 1e-9);
        assert!((c.allocator.max_threshold - 0.80).abs() < 1e-9);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: AppConfig =
            serde_json::from_str(r#"{"server": {"port": 9000}}"#).expect("parse");
        assert_eq!(c.server.port, 9000);
        assert_eq!(c.server.host, "0.0.0.0");
        assert_eq!(c.cache.max_entries, 200);
    }

    #[test]
    fn development_detection() {
        let mut c = AppConfig::default();
        assert!(!c.is_development());
        c.server.environment = "dev".into();
        assert!(c.is_development());
    }
}
