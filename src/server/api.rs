//! HTTP request/response types and validation.
//!
//! The wire shapes follow the OpenAI audio API, with the lenient coercions
//! real clients need: `speed` arrives as string, int, or float; `model` is
//! accepted and ignored; unknown fields produce warnings, not rejections.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::audio::AudioFormat;
use crate::config::AppConfig;
use crate::error::{Result, TtsError};
use crate::synth::SynthesisRequest;
use crate::voice::VoiceManager;

/// Hard cap on accepted input, in characters.
pub const MAX_INPUT_CHARS: usize = 10_000;

/// Speed range accepted at all.
pub const SPEED_RANGE: (f32, f32) = (0.25, 4.0);
/// Speed range outside of which a quality warning is attached.
pub const SPEED_COMFORT_RANGE: (f32, f32) = (0.5, 2.0);

/// POST body for `/v1/audio/speech` and `/v1/audio/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechBody {
    pub input: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub response_format: Option<Value>,
    #[serde(default)]
    pub speed: Option<Value>,
    /// Accepted for OpenAI compatibility; the configured model is used.
    #[serde(default)]
    pub model: Option<String>,
}

/// POST body for `/v1/audio/blend`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlendBody {
    pub input: String,
    pub voices: BlendVoices,
    #[serde(default)]
    pub blend_method: Option<String>,
    #[serde(default)]
    pub response_format: Option<Value>,
    #[serde(default)]
    pub speed: Option<Value>,
}

/// Either `[{voice, weight}, …]` or `{name: weight, …}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BlendVoices {
    List(Vec<BlendEntry>),
    Map(HashMap<String, f32>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlendEntry {
    pub voice: String,
    pub weight: f32,
}

impl BlendVoices {
    pub fn into_pairs(self) -> Vec<(String, f32)> {
        match self {
            BlendVoices::List(entries) => {
                entries.into_iter().map(|e| (e.voice, e.weight)).collect()
            }
            BlendVoices::Map(map) => {
                let mut pairs: Vec<(String, f32)> = map.into_iter().collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                pairs
            }
        }
    }
}

/// `{error, detail}` body every failure serializes to.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ErrorBody {
    pub fn from_error(err: &TtsError) -> Self {
        let suggestions = match err {
            TtsError::VoiceNotFound { suggestions, .. } => suggestions.clone(),
            _ => Vec::new(),
        };
        Self { error: err.kind(), detail: err.to_string(), suggestions }
    }
}

/// `/v1/voices` entry (OpenWebUI-compatible shape).
#[derive(Debug, Serialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub gender: &'static str,
    pub language: &'static str,
    pub region: &'static str,
    pub flag: &'static str,
}

impl VoiceInfo {
    /// Derive display metadata from the voice-name prefix convention
    /// (`af_` = American female, `bm_` = British male, …).
    pub fn from_name(name: &str) -> Self {
        let (gender, language, region, flag) = match name.get(..3) {
            Some("af_") => ("female", "en-US", "United States", "🇺🇸"),
            Some("am_") => ("male", "en-US", "United States", "🇺🇸"),
            Some("bf_") => ("female", "en-GB", "United Kingdom", "🇬🇧"),
            Some("bm_") => ("male", "en-GB", "United Kingdom", "🇬🇧"),
            _ => ("neutral", "en-US", "United States", "🇺🇸"),
        };
        let display = name.split_once('_').map(|(_, rest)| rest).unwrap_or(name);
        let mut chars = display.chars();
        let display = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => display.to_string(),
        };
        Self { id: name.to_string(), name: display, gender, language, region, flag }
    }
}

/// `/v1/models` entry.
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: String,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

/// `/v1/health` body.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model_loaded: bool,
    pub voices_available: usize,
    pub version: &'static str,
}

/// Outcome of request validation: the synthesis request plus soft warnings.
#[derive(Debug)]
pub struct ValidatedRequest {
    pub request: SynthesisRequest,
    pub warnings: Vec<String>,
}

/// Validate a speech body against the configured defaults and voice set.
pub fn validate_speech(
    body: &SpeechBody,
    voices: &VoiceManager,
    config: &AppConfig,
) -> Result<ValidatedRequest> {
    let mut warnings = Vec::new();

    let input = body.input.trim();
    if input.is_empty() {
        return Err(TtsError::validation("field 'input' cannot be empty"));
    }
    if input.chars().count() > MAX_INPUT_CHARS {
        return Err(TtsError::validation(format!(
            "input text too long (maximum {MAX_INPUT_CHARS} characters)"
        )));
    }
    if input.chars().count() < 3 {
        warnings.push("very short input may not produce good audio".into());
    }

    let requested_voice = body.voice.as_deref().unwrap_or(&config.voice.default_voice);
    let voice = voices.resolve(requested_voice)?;
    if voice != requested_voice {
        warnings.push(format!("voice '{requested_voice}' resolved to '{voice}'"));
    }

    let format = parse_format(body.response_format.as_ref(), config, &mut warnings)?;
    let speed = parse_speed(body.speed.as_ref(), &mut warnings)?;

    if let Some(model) = &body.model {
        warnings.push(format!("model '{model}' ignored (using configured model)"));
    }

    Ok(ValidatedRequest {
        request: SynthesisRequest { text: input.to_string(), voice, format, speed },
        warnings,
    })
}

/// Validate a blend body; returns pairs alongside the base request.
pub fn validate_blend(
    body: &BlendBody,
    voices: &VoiceManager,
    config: &AppConfig,
) -> Result<(ValidatedRequest, Vec<(String, f32)>)> {
    if let Some(method) = &body.blend_method {
        if method != "weighted_average" {
            return Err(TtsError::validation(format!(
                "blend_method '{method}' is not supported (only 'weighted_average')"
            )));
        }
    }

    let pairs = body.voices.clone().into_pairs();
    if pairs.is_empty() {
        return Err(TtsError::validation("field 'voices' cannot be empty"));
    }
    for (name, weight) in &pairs {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(TtsError::validation(format!(
                "weight for voice '{name}' must be a non-negative number"
            )));
        }
    }

    let speech = SpeechBody {
        input: body.input.clone(),
        voice: pairs.first().map(|(name, _)| name.clone()),
        response_format: body.response_format.clone(),
        speed: body.speed.clone(),
        model: None,
    };
    let validated = validate_speech(&speech, voices, config)?;
    Ok((validated, pairs))
}

fn parse_format(
    raw: Option<&Value>,
    config: &AppConfig,
    warnings: &mut Vec<String>,
) -> Result<AudioFormat> {
    let Some(value) = raw else {
        return Ok(config.audio.default_format);
    };
    let as_text = match value {
        Value::String(s) => s.clone(),
        Value::Null => return Ok(config.audio.default_format),
        other => other.to_string(),
    };
    if as_text.trim().is_empty() {
        return Ok(config.audio.default_format);
    }
    match as_text.parse::<AudioFormat>() {
        Ok(format) => Ok(format),
        Err(_) => {
            warn!(format = %as_text, "unknown response format, using default");
            warnings.push(format!(
                "unknown response format '{as_text}', using '{}'",
                config.audio.default_format
            ));
            Ok(config.audio.default_format)
        }
    }
}

fn parse_speed(raw: Option<&Value>, warnings: &mut Vec<String>) -> Result<f32> {
    let Some(value) = raw else {
        return Ok(1.0);
    };
    let speed = match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        Value::Null => Some(1.0),
        _ => None,
    }
    .ok_or_else(|| TtsError::validation("field 'speed' must be a number"))?;

    if !speed.is_finite() || speed < SPEED_RANGE.0 || speed > SPEED_RANGE.1 {
        return Err(TtsError::validation(format!(
            "field 'speed' must be between {} and {}",
            SPEED_RANGE.0, SPEED_RANGE.1
        )));
    }
    if speed < SPEED_COMFORT_RANGE.0 || speed > SPEED_COMFORT_RANGE.1 {
        warnings.push(format!("speed {speed} may affect audio quality"));
    }
    Ok(speed)
}
