//! # vocalis
//!
//! ONNX-based neural text-to-speech serving core with an OpenAI-compatible
//! HTTP surface.
//!
//! ## Pipeline
//! 1. **Validation** — request fields checked, voice aliases resolved.
//! 2. **Cache probe** — 128-bit content digest over `(text, voice, speed,
//!    format)`; hits skip synthesis entirely.
//! 3. **Normalization** — the multi-stage [`text`] pipeline (currency,
//!    dates, tickers, interjections, symbols, …) prepares the text for the
//!    phonemizer without breaking word alignment.
//! 4. **Phonemization** — external G2P behind the [`phoneme::Phonemizer`]
//!    trait (espeak-ng built in behind the `espeak` feature).
//! 5. **Inference** — the [`engine`] runs the acoustic model per sentence
//!    chunk; empty output retries with progressively looser text variants.
//! 6. **Encoding** — [`audio`] writes the requested container; the result
//!    lands in the [`cache`] and a [`perf`] sample is recorded.
//!
//! Side components: the [`voice`] manager owns style matrices and the
//! combined compatibility archive, the [`preloader`] warms the cache with
//! frequent phrases during idle periods, and the [`allocator`] nudges
//! inference thread counts to match CPU headroom.
//!
//! ## Quick start (library)
//!
//! ```no_run
//! use std::sync::Arc;
//! use vocalis::prelude::*;
//! use vocalis::engine::AcousticEngine;
//! use vocalis::phoneme::StaticPhonemizer;
//!
//! let config = AppConfig::default();
//! let voices = Arc::new(VoiceManager::new(
//!     &config.voice.voices_dir,
//!     Default::default(),
//!     config.voice.maintain_combined_file,
//! ).unwrap());
//! let model = Arc::new(AcousticEngine::load("model.onnx".as_ref(), 2).unwrap());
//! let synth = Synthesizer::new(
//!     model,
//!     voices,
//!     Arc::new(StaticPhonemizer),
//!     Arc::new(AudioCache::new(config.cache.max_entries, config.cache.ttl_seconds)),
//!     Arc::new(PerformanceMonitor::new()),
//!     None,
//!     config.performance.clone(),
//!     config.audio.clone(),
//!     config.cache.enabled,
//! );
//! let request = SynthesisRequest {
//!     text: "Hello from the speech server!".into(),
//!     voice: "af_heart".into(),
//!     format: AudioFormat::Mp3,
//!     speed: 1.0,
//! };
//! let audio = synth.synthesize(&request).unwrap();
//! std::fs::write("hello.mp3", audio.bytes.as_ref()).unwrap();
//! ```

pub mod allocator;
pub mod audio;
pub mod cache;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod perf;
pub mod phoneme;
pub mod preloader;
pub mod synth;
pub mod text;
pub mod tokenize;
pub mod voice;

#[cfg(feature = "server")]
pub mod server;

/// The types most integrations need.
pub mod prelude {
    pub use crate::audio::AudioFormat;
    pub use crate::cache::AudioCache;
    pub use crate::config::AppConfig;
    pub use crate::error::{Result, TtsError};
    pub use crate::perf::PerformanceMonitor;
    pub use crate::synth::{SynthesisRequest, Synthesizer};
    pub use crate::text::{normalize, NormalizationOptions};
    pub use crate::voice::VoiceManager;
}
