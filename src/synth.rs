//! Synthesis orchestration.
//!
//! Turns a validated request into encoded audio: cache probe, normalization
//! with a ladder of progressively more aggressive text variants on
//! empty-audio retries, inference per sentence chunk, container encoding,
//! cache insert, and a performance sample per request.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::allocator::DynamicCpuAllocator;
use crate::audio::{self, AudioFormat};
use crate::cache::{cache_key, AudioCache};
use crate::config::{AudioConfig, PerformanceConfig};
use crate::engine::{chunk_text, style_row_index, AcousticModel};
use crate::error::{Result, TtsError};
use crate::perf::{PerfSample, PerformanceMonitor};
use crate::phoneme::Phonemizer;
use crate::text::phonetic_cache::{PhoneticCache, PhoneticKey};
use crate::text::{normalize, NormalizationOptions};
use crate::tokenize::phonemes_to_ids;
use crate::voice::{archive::NpyArray, VoiceManager};

/// A validated synthesis request.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    /// Canonical voice name (already alias-resolved).
    pub voice: String,
    pub format: AudioFormat,
    pub speed: f32,
}

/// Result of one synthesis, cached or fresh.
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub bytes: Arc<Vec<u8>>,
    pub format: AudioFormat,
    pub cache_hit: bool,
    pub audio_duration: f64,
    pub generation_time: f64,
}

/// The text-variant ladder, most preserving first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextVariant {
    Conservative,
    Minimal,
    Standard,
    Aggressive,
}

impl TextVariant {
    const LADDER: &'static [TextVariant] = &[
        TextVariant::Conservative,
        TextVariant::Minimal,
        TextVariant::Standard,
        TextVariant::Aggressive,
    ];

    fn name(self) -> &'static str {
        match self {
            TextVariant::Conservative => "conservative",
            TextVariant::Minimal => "minimal",
            TextVariant::Standard => "standard",
            TextVariant::Aggressive => "aggressive",
        }
    }

    fn options(self) -> NormalizationOptions {
        match self {
            TextVariant::Conservative => NormalizationOptions::conservative(),
            TextVariant::Minimal => NormalizationOptions::minimal(),
            TextVariant::Standard => NormalizationOptions::standard(),
            TextVariant::Aggressive => NormalizationOptions::aggressive(),
        }
    }
}

/// Orchestrator over the model, voices, cache, and monitor.
pub struct Synthesizer {
    model: Arc<dyn AcousticModel>,
    voices: Arc<VoiceManager>,
    phonemizer: Arc<dyn Phonemizer>,
    cache: Arc<AudioCache>,
    monitor: Arc<PerformanceMonitor>,
    allocator: Option<Arc<DynamicCpuAllocator>>,
    perf_config: PerformanceConfig,
    audio_config: AudioConfig,
    cache_enabled: bool,
    /// Phonemization lookups keyed `(chunk, notation, accent)`.
    phonetic_cache: Mutex<PhoneticCache>,
}

impl Synthesizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<dyn AcousticModel>,
        voices: Arc<VoiceManager>,
        phonemizer: Arc<dyn Phonemizer>,
        cache: Arc<AudioCache>,
        monitor: Arc<PerformanceMonitor>,
        allocator: Option<Arc<DynamicCpuAllocator>>,
        perf_config: PerformanceConfig,
        audio_config: AudioConfig,
        cache_enabled: bool,
    ) -> Self {
        Self {
            model,
            voices,
            phonemizer,
            cache,
            monitor,
            allocator,
            perf_config,
            audio_config,
            cache_enabled,
            phonetic_cache: Mutex::new(PhoneticCache::new(5_000)),
        }
    }

    /// Resize the phonetic lookup cache (configured capacity).
    pub fn with_phonetic_capacity(self, capacity: usize) -> Self {
        Self { phonetic_cache: Mutex::new(PhoneticCache::new(capacity)), ..self }
    }

    /// Load the persisted phonetic sidecar, if one exists.
    pub fn load_phonetic_cache(&self, path: &Path) -> std::io::Result<usize> {
        self.phonetic_cache.lock().expect("phonetic cache lock poisoned").load(path)
    }

    /// Persist the phonetic sidecar.
    pub fn save_phonetic_cache(&self, path: &Path) -> std::io::Result<()> {
        self.phonetic_cache.lock().expect("phonetic cache lock poisoned").save(path)
    }

    pub fn voices(&self) -> &Arc<VoiceManager> {
        &self.voices
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.cache
    }

    /// Synthesize with the request's named voice.
    pub fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome> {
        let style = self.voices.get(&request.voice)?;
        self.synthesize_with_style(request, &request.voice, style.as_ref())
    }

    /// Synthesize with a blended style built from `(voice, weight)` pairs.
    pub fn synthesize_blend(
        &self,
        request: &SynthesisRequest,
        parts: &[(String, f32)],
    ) -> Result<SynthesisOutcome> {
        let blended = self.voices.blend(parts)?;
        // The blend participates in caching under a synthetic voice name so
        // repeated blends hit.
        let blend_name = blend_cache_name(parts);
        self.synthesize_with_style(request, &blend_name, &blended)
    }

    fn synthesize_with_style(
        &self,
        request: &SynthesisRequest,
        cache_voice: &str,
        style: &NpyArray,
    ) -> Result<SynthesisOutcome> {
        let started = Instant::now();
        let key = cache_key(&request.text, cache_voice, request.speed, request.format);

        if self.cache_enabled {
            if let Some(bytes) = self.cache.get(&key) {
                info!(voice = cache_voice, "cache hit");
                self.monitor.record(PerfSample::new(
                    0.0,
                    started.elapsed().as_secs_f64() * 1_000.0,
                    0.0,
                    true,
                    cache_voice,
                    request.text.len(),
                    request.format,
                    request.speed,
                ));
                return Ok(SynthesisOutcome {
                    bytes,
                    format: request.format,
                    cache_hit: true,
                    audio_duration: 0.0,
                    generation_time: 0.0,
                });
            }
        }

        if let Some(allocator) = &self.allocator {
            self.model.thread_hint(allocator.recommended_threads());
        }

        let timeout = Duration::from_secs(self.audio_config.timeout_seconds.max(1));
        let max_retries = self.perf_config.max_retry_attempts.max(1);
        let retry_delay = Duration::from_secs_f64(self.perf_config.retry_delay_seconds.max(0.0));

        let mut samples = Vec::new();
        let mut saw_non_finite = false;
        let mut last_variant = TextVariant::Conservative;

        for attempt in 0..max_retries {
            if started.elapsed() > timeout {
                return Err(TtsError::Timeout(started.elapsed().as_secs_f64()));
            }

            let variant =
                TextVariant::LADDER[(attempt as usize).min(TextVariant::LADDER.len() - 1)];
            last_variant = variant;
            let normalized = self.variant_text(&request.text, variant);

            match self.generate_samples(&normalized, style, request.speed) {
                Ok(generated) if !generated.is_empty() => {
                    if generated.iter().all(|s| s.is_finite()) {
                        samples = generated;
                        if attempt > 0 {
                            info!(attempt, variant = variant.name(), "retry variant succeeded");
                        }
                        break;
                    }
                    warn!(attempt, variant = variant.name(), "non-finite samples; retrying");
                    saw_non_finite = true;
                }
                Ok(_) => {
                    warn!(attempt, variant = variant.name(), "empty audio; retrying");
                }
                Err(e) => {
                    warn!(attempt, variant = variant.name(), error = %e, "synthesis attempt failed");
                }
            }

            if attempt + 1 < max_retries {
                std::thread::sleep(retry_delay);
            }
        }

        if samples.is_empty() {
            if saw_non_finite {
                return Err(TtsError::InvalidAudio);
            }
            return Err(TtsError::EmptyAudio {
                attempts: max_retries,
                voice: cache_voice.to_string(),
                text_len: request.text.len(),
                last_variant: last_variant.name().to_string(),
            });
        }

        let generation_time = started.elapsed().as_secs_f64();
        let sample_rate = self.model.sample_rate();
        let audio_duration = samples.len() as f64 / sample_rate as f64;
        let rtf = if audio_duration > 0.0 { generation_time / audio_duration } else { 0.0 };

        let bytes = audio::encode(&samples, sample_rate, request.format)?;
        let bytes = Arc::new(bytes);

        if self.cache_enabled {
            self.cache.put(
                key,
                bytes.as_ref().clone(),
                cache_voice,
                request.speed,
                request.format,
            );
        }

        self.monitor.record(PerfSample::new(
            rtf,
            generation_time * 1_000.0,
            audio_duration,
            false,
            cache_voice,
            request.text.len(),
            request.format,
            request.speed,
        ));
        info!(voice = cache_voice, duration_s = audio_duration, rtf, "synthesis complete");

        Ok(SynthesisOutcome {
            bytes,
            format: request.format,
            cache_hit: false,
            audio_duration,
            generation_time,
        })
    }

    fn variant_text(&self, text: &str, variant: TextVariant) -> String {
        match variant {
            // V2 deliberately bypasses the pipeline: trimmed input plus a
            // terminal period, as close to the raw text as the model allows.
            TextVariant::Minimal => {
                let trimmed = text.trim();
                if trimmed.ends_with(['.', '!', '?']) {
                    trimmed.to_string()
                } else {
                    format!("{trimmed}.")
                }
            }
            other => normalize(text, &other.options()).text,
        }
    }

    /// Chunked phonemize + inference over one text variant.
    fn generate_samples(&self, text: &str, style: &NpyArray, speed: f32) -> Result<Vec<f32>> {
        let chunks = chunk_text(text, self.audio_config.chunk_max_chars);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut samples = Vec::new();
        for chunk in &chunks {
            let language = &self.audio_config.default_language;
            let key = PhoneticKey::new(chunk, "ipa", language);
            let cached = self
                .phonetic_cache
                .lock()
                .expect("phonetic cache lock poisoned")
                .get(&key);
            let ipa = match cached {
                Some(hit) => hit,
                None => {
                    let fresh = self.phonemizer.phonemize(chunk, language)?;
                    self.phonetic_cache
                        .lock()
                        .expect("phonetic cache lock poisoned")
                        .put(key, fresh.clone());
                    fresh
                }
            };
            if ipa.trim().is_empty() {
                continue;
            }
            let ids = phonemes_to_ids(&ipa);
            let content_tokens = ids.len().saturating_sub(2).max(1);
            let row = style.row(style_row_index(content_tokens, style.nrows()));
            samples.extend(self.model.infer(&ids, row, speed)?);
        }
        Ok(samples)
    }
}

/// Synthetic cache-voice name for a blend, stable across weight ordering.
fn blend_cache_name(parts: &[(String, f32)]) -> String {
    let mut sorted: Vec<&(String, f32)> = parts.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let joined = sorted
        .iter()
        .map(|(name, weight)| format!("{name}:{weight:.3}"))
        .collect::<Vec<_>>()
        .join("+");
    format!("blend[{joined}]")
}

/// Split encoded bytes into fixed-size chunks for the streaming endpoint.
pub fn stream_chunks(bytes: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(chunk_size.max(1)).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioConfig, PerformanceConfig};
    use crate::phoneme::StaticPhonemizer;
    use crate::voice::{VoiceManager, STYLE_DIM};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Deterministic fake model: N samples per token id.
    struct FakeModel {
        samples_per_token: usize,
        /// Attempts that return empty before succeeding.
        fail_first: AtomicU32,
        emit_nan: bool,
        calls: AtomicU32,
    }

    impl FakeModel {
        fn ok() -> Self {
            Self {
                samples_per_token: 200,
                fail_first: AtomicU32::new(0),
                emit_nan: false,
                calls: AtomicU32::new(0),
            }
        }

        fn failing(times: u32) -> Self {
            Self { fail_first: AtomicU32::new(times), ..Self::ok() }
        }

        fn nan() -> Self {
            Self { emit_nan: true, ..Self::ok() }
        }
    }

    impl AcousticModel for FakeModel {
        fn infer(&self, token_ids: &[i64], _style: &[f32], _speed: f32) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Ok(Vec::new());
            }
            if self.emit_nan {
                return Ok(vec![f32::NAN; 100]);
            }
            let mut out = Vec::new();
            for (i, _) in token_ids.iter().enumerate() {
                for j in 0..self.samples_per_token {
                    out.push(((i + j) as f32 * 0.01).sin() * 0.3);
                }
            }
            Ok(out)
        }
    }

    fn voices_with_one(dir: &Path) -> Arc<VoiceManager> {
        let mut bytes = Vec::new();
        for i in 0..4 * STYLE_DIM {
            bytes.extend_from_slice(&(i as f32 * 0.001).to_le_bytes());
        }
        std::fs::write(dir.join("af_heart.bin"), &bytes).expect("voice");
        std::fs::write(dir.join("am_puck.bin"), &bytes).expect("voice");
        Arc::new(VoiceManager::new(dir, HashMap::new(), false).expect("manager"))
    }

    fn synthesizer(model: Arc<dyn AcousticModel>, dir: &Path) -> Synthesizer {
        let mut perf = PerformanceConfig::default();
        perf.retry_delay_seconds = 0.0;
        Synthesizer::new(
            model,
            voices_with_one(dir),
            Arc::new(StaticPhonemizer),
            Arc::new(AudioCache::new(16, 0)),
            Arc::new(PerformanceMonitor::new()),
            None,
            perf,
            AudioConfig::default(),
            true,
        )
    }

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.into(),
            voice: "af_heart".into(),
            format: AudioFormat::Wav,
            speed: 1.0,
        }
    }

    #[test]
    fn synthesis_produces_audio_and_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let synth = synthesizer(Arc::new(FakeModel::ok()), dir.path());

        let first = synth.synthesize(&request("Hello there world")).expect("synthesize");
        assert!(!first.cache_hit);
        assert!(first.audio_duration > 0.0);

        let second = synth.synthesize(&request("Hello there world")).expect("synthesize");
        assert!(second.cache_hit);
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn deterministic_without_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model: Arc<dyn AcousticModel> = Arc::new(FakeModel::ok());
        let mut perf = PerformanceConfig::default();
        perf.retry_delay_seconds = 0.0;
        let make = || {
            Synthesizer::new(
                model.clone(),
                voices_with_one(dir.path()),
                Arc::new(StaticPhonemizer),
                Arc::new(AudioCache::new(16, 0)),
                Arc::new(PerformanceMonitor::new()),
                None,
                perf.clone(),
                AudioConfig::default(),
                false,
            )
        };
        let a = make().synthesize(&request("Same input text")).expect("a");
        let b = make().synthesize(&request("Same input text")).expect("b");
        assert_eq!(a.bytes, b.bytes);
        assert!(!b.cache_hit);
    }

    #[test]
    fn retries_through_variant_ladder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = Arc::new(FakeModel::failing(1));
        let synth = synthesizer(model.clone(), dir.path());

        let outcome = synth.synthesize(&request("Needs one retry")).expect("synthesize");
        assert!(!outcome.cache_hit);
        assert!(model.calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn empty_audio_after_exhausted_retries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let synth = synthesizer(Arc::new(FakeModel::failing(100)), dir.path());

        match synth.synthesize(&request("Never works")) {
            Err(TtsError::EmptyAudio { attempts, last_variant, .. }) => {
                assert_eq!(attempts, 3);
                // Final attempt reached the deeper ladder rungs.
                assert_ne!(last_variant, "conservative");
            }
            other => panic!("expected EmptyAudio, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_audio_reports_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let synth = synthesizer(Arc::new(FakeModel::nan()), dir.path());
        match synth.synthesize(&request("NaN generator")) {
            Err(TtsError::InvalidAudio) => {}
            other => panic!("expected InvalidAudio, got {other:?}"),
        }
    }

    #[test]
    fn perf_samples_recorded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let synth = synthesizer(Arc::new(FakeModel::ok()), dir.path());
        synth.synthesize(&request("First pass")).expect("synthesize");
        synth.synthesize(&request("First pass")).expect("cache hit");

        let summary = synth.monitor().summary();
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.total_cache_hits, 1);
    }

    #[test]
    fn blend_synthesis_caches_under_blend_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let synth = synthesizer(Arc::new(FakeModel::ok()), dir.path());
        let parts = vec![("af_heart".to_string(), 0.6), ("am_puck".to_string(), 0.4)];

        let first = synth.synthesize_blend(&request("Blend me"), &parts).expect("blend");
        assert!(!first.cache_hit);
        // Same parts in the other order hit the same entry.
        let reversed = vec![("am_puck".to_string(), 0.4), ("af_heart".to_string(), 0.6)];
        let second = synth.synthesize_blend(&request("Blend me"), &reversed).expect("blend");
        assert!(second.cache_hit);
    }

    #[test]
    fn unknown_voice_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let synth = synthesizer(Arc::new(FakeModel::ok()), dir.path());
        let mut req = request("text");
        req.voice = "xx_unknown".into();
        assert!(matches!(synth.synthesize(&req), Err(TtsError::VoiceNotFound { .. })));
    }

    #[test]
    fn stream_chunks_cover_everything() {
        let bytes: Vec<u8> = (0..100u8).collect();
        let chunks = stream_chunks(&bytes, 32);
        assert_eq!(chunks.len(), 4);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 100);
        assert_eq!(chunks.last().unwrap().len(), 4);
    }
}
