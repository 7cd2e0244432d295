//! Error taxonomy for the synthesis pipeline.
//!
//! Each variant maps to a distinct user-visible failure class; the HTTP
//! layer turns them into `{error, detail}` JSON bodies via [`TtsError::kind`]
//! and [`TtsError::http_status`].

use std::path::PathBuf;

/// Top-level error type for the TTS serving core.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// Malformed request (bad field value, out-of-range speed, empty input).
    #[error("{message}")]
    Validation {
        message: String,
        /// Non-fatal notes accumulated during validation.
        warnings: Vec<String>,
    },

    /// Requested voice did not resolve, even through the alias table.
    #[error("voice '{voice}' not available")]
    VoiceNotFound {
        voice: String,
        /// Nearest-match suggestions, best first.
        suggestions: Vec<String>,
    },

    /// Acoustic model asset missing or failed to initialize.
    #[error("TTS model not loaded: {0}")]
    ModelNotLoaded(String),

    /// The model produced zero samples after every retry variant.
    #[error("generated audio is empty after {attempts} attempts (voice '{voice}', {text_len} chars, last variant: {last_variant:?})")]
    EmptyAudio {
        attempts: u32,
        voice: String,
        text_len: usize,
        last_variant: String,
    },

    /// Generated samples contain NaN or Inf.
    #[error("generated audio contains non-finite samples")]
    InvalidAudio,

    /// Container encoder failed or the format has no encoder in this build.
    #[error("audio encoding failed: {0}")]
    Encoding(String),

    /// A voice file failed the shape contract.
    #[error("voice file {path} has invalid shape: {reason}")]
    InvalidShape { path: PathBuf, reason: String },

    /// Phonemization backend failure.
    #[error("phonemizer error: {0}")]
    Phonemizer(String),

    /// Synthesis exceeded its wall-clock budget.
    #[error("synthesis timed out after {0:.1}s")]
    Timeout(f64),

    /// I/O failure (voice files, cache sidecars, archives).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    /// Stable machine-readable identifier for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            TtsError::Validation { .. } => "validation_error",
            TtsError::VoiceNotFound { .. } => "voice_not_found",
            TtsError::ModelNotLoaded(_) => "model_not_loaded",
            TtsError::EmptyAudio { .. } => "empty_audio",
            TtsError::InvalidAudio => "invalid_audio",
            TtsError::Encoding(_) => "encoding_error",
            TtsError::InvalidShape { .. } => "invalid_shape",
            TtsError::Phonemizer(_) => "phonemizer_error",
            TtsError::Timeout(_) => "timeout",
            TtsError::Io(_) => "io_error",
        }
    }

    /// HTTP status code the error surfaces as.
    pub fn http_status(&self) -> u16 {
        match self {
            TtsError::Validation { .. } | TtsError::VoiceNotFound { .. } => 400,
            TtsError::ModelNotLoaded(_) => 503,
            _ => 500,
        }
    }

    /// Shorthand constructor for validation failures without warnings.
    pub fn validation(message: impl Into<String>) -> Self {
        TtsError::Validation { message: message.into(), warnings: Vec::new() }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TtsError>;
