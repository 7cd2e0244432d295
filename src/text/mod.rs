//! Text normalization pipeline.
//!
//! Raw request text passes through a fixed sequence of stages before it
//! reaches the phonemizer. Stages can be toggled off but never reordered;
//! each stage is individually guarded so a failure skips the stage instead
//! of failing the request. When `preserve_word_count` is set the driver
//! checks the ±⌊w/10⌋ alignment tolerance afterwards and falls back to the
//! conservative stage set if the full pass drifted too far.

pub mod contractions;
pub mod currency;
pub mod datetime;
pub mod interjections;
pub mod names;
pub mod numbers;
pub mod phonetic_cache;
pub mod preprocess;
pub mod pronunciation;
pub mod prosody;
pub mod symbols;
pub mod tickers;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use symbols::PunctuationMode;

use preprocess::{word_count, word_count_tolerance};

/// Preset stage bundles, loosest to richest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMode {
    /// Whitespace and terminal punctuation only.
    Basic,
    /// Phonemizer safety plus pronunciation fixes, word-count preserving.
    Standard,
    /// The full stage set.
    #[default]
    Enhanced,
    /// Full stage set plus aggressive preprocessing.
    Premium,
}

/// Per-request pipeline options. Constructed once, read by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationOptions {
    pub mode: NormalizationMode,
    pub preserve_word_count: bool,
    pub preserve_original_on_error: bool,

    /// Expand apostrophe contractions during preprocessing.
    pub expand_contractions: bool,
    pub use_pronunciation_rules: bool,
    /// Legacy context-sensitive expansion; shipped off.
    pub use_legacy_contractions: bool,
    pub use_interjection_fixes: bool,
    pub use_ticker_processing: bool,
    pub use_name_pronunciation: bool,
    pub use_currency_processing: bool,
    pub use_datetime_processing: bool,
    /// When set, the eSpeak-style symbol pass replaces the default one.
    pub use_espeak_symbols: bool,
    pub use_symbol_processing: bool,
    pub punctuation_mode: PunctuationMode,
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        Self {
            mode: NormalizationMode::Enhanced,
            preserve_word_count: false,
            preserve_original_on_error: true,
            expand_contractions: false,
            use_pronunciation_rules: true,
            use_legacy_contractions: false,
            use_interjection_fixes: true,
            use_ticker_processing: true,
            use_name_pronunciation: true,
            use_currency_processing: true,
            use_datetime_processing: true,
            use_espeak_symbols: true,
            use_symbol_processing: true,
            punctuation_mode: PunctuationMode::Some,
        }
    }
}

impl NormalizationOptions {
    /// V1: conservative, word-count preserving. Only stages that keep the
    /// token count stable stay on; contraction expansion in particular
    /// changes word counts and is deferred to the looser variants.
    pub fn conservative() -> Self {
        Self {
            mode: NormalizationMode::Standard,
            preserve_word_count: true,
            use_pronunciation_rules: false,
            use_ticker_processing: false,
            use_currency_processing: false,
            use_datetime_processing: false,
            use_symbol_processing: false,
            use_espeak_symbols: false,
            ..Self::default()
        }
    }

    /// V2: trim plus terminal punctuation, nothing else.
    pub fn minimal() -> Self {
        Self {
            mode: NormalizationMode::Basic,
            use_pronunciation_rules: false,
            use_interjection_fixes: false,
            use_ticker_processing: false,
            use_name_pronunciation: false,
            use_currency_processing: false,
            use_datetime_processing: false,
            use_symbol_processing: false,
            use_espeak_symbols: false,
            ..Self::default()
        }
    }

    /// V3: the full stage set, word-count free.
    pub fn standard() -> Self {
        Self::default()
    }

    /// V4: full stage set plus aggressive preprocessing.
    pub fn aggressive() -> Self {
        Self { mode: NormalizationMode::Premium, ..Self::default() }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct NormalizationResult {
    pub text: String,
    pub original_text: String,
    pub stages_completed: Vec<&'static str>,
    pub changes: Vec<String>,
    pub issues: Vec<String>,
    /// 1.0 = clean pass; reduced by repairs and guard violations.
    pub confidence_score: f64,
}

/// The pipeline stages, in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Preprocess,
    PronunciationRules,
    LegacyContractions,
    Interjections,
    Tickers,
    Names,
    Currency,
    DateTime,
    Symbols,
    Homographs,
    Normalize,
    ProsodyGuard,
}

impl Stage {
    const ORDER: &'static [Stage] = &[
        Stage::Preprocess,
        Stage::PronunciationRules,
        Stage::LegacyContractions,
        Stage::Interjections,
        Stage::Tickers,
        Stage::Names,
        Stage::Currency,
        Stage::DateTime,
        Stage::Symbols,
        Stage::Homographs,
        Stage::Normalize,
        Stage::ProsodyGuard,
    ];

    fn name(self) -> &'static str {
        match self {
            Stage::Preprocess => "phonemizer_preprocessing",
            Stage::PronunciationRules => "pronunciation_rules",
            Stage::LegacyContractions => "legacy_contractions",
            Stage::Interjections => "interjection_fixes",
            Stage::Tickers => "ticker_symbols",
            Stage::Names => "name_pronunciation",
            Stage::Currency => "currency_processing",
            Stage::DateTime => "datetime_processing",
            Stage::Symbols => "symbol_processing",
            Stage::Homographs => "homograph_resolution",
            Stage::Normalize => "text_normalization",
            Stage::ProsodyGuard => "prosody_guard",
        }
    }

    fn enabled(self, opts: &NormalizationOptions) -> bool {
        if opts.mode == NormalizationMode::Basic {
            return matches!(self, Stage::Normalize | Stage::ProsodyGuard);
        }
        match self {
            Stage::Preprocess | Stage::Normalize | Stage::ProsodyGuard => true,
            Stage::PronunciationRules => opts.use_pronunciation_rules,
            Stage::LegacyContractions => opts.use_legacy_contractions,
            Stage::Interjections => opts.use_interjection_fixes,
            Stage::Tickers => opts.use_ticker_processing,
            Stage::Names => opts.use_name_pronunciation,
            Stage::Currency => opts.use_currency_processing,
            Stage::DateTime => opts.use_datetime_processing,
            Stage::Symbols => opts.use_symbol_processing || opts.use_espeak_symbols,
            // Resolved by an external component; the driver only records it.
            Stage::Homographs => false,
        }
    }

    fn apply(
        self,
        text: &str,
        opts: &NormalizationOptions,
        result: &mut NormalizationResult,
    ) -> Result<String, String> {
        match self {
            Stage::Preprocess => {
                let aggressive = opts.mode == NormalizationMode::Premium;
                let pre = preprocess::preprocess(text, aggressive, opts.preserve_word_count);
                result.changes.extend(pre.changes_made);
                result.issues.extend(pre.warnings);
                result.confidence_score = result.confidence_score.min(pre.confidence_score);
                let mut out = pre.processed_text;
                if opts.expand_contractions {
                    out = preprocess::expand_contractions(&out);
                }
                Ok(out)
            }
            Stage::PronunciationRules => Ok(pronunciation::apply_pronunciation_rules(text)),
            Stage::LegacyContractions => Ok(contractions::expand_legacy_contractions(text)),
            Stage::Interjections => Ok(interjections::fix_interjections(text)),
            Stage::Tickers => {
                let ticker = tickers::process_tickers(text);
                if !ticker.tickers_found.is_empty() {
                    result
                        .changes
                        .push(format!("tickers spelled out: {}", ticker.tickers_found.join(", ")));
                }
                Ok(ticker.processed_text)
            }
            Stage::Names => Ok(names::fix_pronunciations(text)),
            Stage::Currency => Ok(currency::process_currency(text)),
            Stage::DateTime => Ok(datetime::process_dates_and_times(text)),
            Stage::Symbols => {
                let sym = if opts.use_espeak_symbols {
                    symbols::process_symbols_espeak(text, opts.punctuation_mode)
                } else {
                    symbols::process_symbols_basic(text)
                };
                result.changes.extend(sym.changes_made);
                Ok(sym.processed_text)
            }
            Stage::Homographs => Ok(text.to_string()),
            Stage::Normalize => Ok(prosody::normalize_text(text)),
            Stage::ProsodyGuard => Ok(prosody::apply_prosody_guard(text)),
        }
    }
}

/// Run the normalization pipeline over `text`.
pub fn normalize(text: &str, opts: &NormalizationOptions) -> NormalizationResult {
    let mut result = NormalizationResult {
        text: String::new(),
        original_text: text.to_string(),
        confidence_score: 1.0,
        ..Default::default()
    };

    let input_words = word_count(text);
    let mut current = run_stages(text, opts, &mut result);

    if opts.preserve_word_count {
        let drift = word_count(&current).abs_diff(input_words);
        let tolerance = word_count_tolerance(input_words);
        if drift > tolerance {
            warn!(
                drift,
                tolerance, "word count guard tripped; falling back to conservative stages"
            );
            result
                .issues
                .push(format!("word count drift {drift} exceeded tolerance {tolerance}"));
            result.confidence_score -= 0.3;

            let mut fallback_opts = opts.clone();
            fallback_opts.use_pronunciation_rules = false;
            fallback_opts.use_ticker_processing = false;
            fallback_opts.use_currency_processing = false;
            fallback_opts.use_datetime_processing = false;
            fallback_opts.use_symbol_processing = false;
            fallback_opts.use_espeak_symbols = false;
            fallback_opts.use_legacy_contractions = false;
            fallback_opts.expand_contractions = false;
            result.stages_completed.clear();
            current = run_stages(text, &fallback_opts, &mut result);
        }
    }

    // Catastrophic outcome: every stage together erased the text.
    if current.trim().is_empty() && !text.trim().is_empty() {
        result.issues.push("normalization produced empty text".into());
        result.confidence_score = 0.0;
        if opts.preserve_original_on_error {
            result.text = text.to_string();
            return result;
        }
    }

    result.confidence_score = result.confidence_score.max(0.0);
    result.text = current;
    result
}

fn run_stages(
    text: &str,
    opts: &NormalizationOptions,
    result: &mut NormalizationResult,
) -> String {
    let mut current = text.to_string();
    for &stage in Stage::ORDER {
        if !stage.enabled(opts) {
            continue;
        }
        match stage.apply(&current, opts, result) {
            Ok(next) => {
                if next != current {
                    result.changes.push(format!("{} applied", stage.name()));
                }
                result.stages_completed.push(stage.name());
                current = next;
            }
            Err(reason) => {
                debug!(stage = stage.name(), %reason, "stage failed; skipping");
                result.issues.push(format!("{} failed: {reason}", stage.name()));
            }
        }
    }
    current
}
