//! Phonemizer-safety preprocessing.
//!
//! The first normalization stage. Conservative by default: it fixes the
//! things that make the phonemizer mis-align (control characters, runaway
//! punctuation, pathological tokens) while keeping the tokenized word count
//! inside the tolerance the aligner needs. The aggressive variant trades
//! word-count parity for maximum cleanup and is only reached through the
//! retry ladder.

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;
use unicode_normalization::UnicodeNormalization;

use super::numbers::digit_words;

/// Tokens longer than this get split; the phonemizer chokes on them.
const MAX_TOKEN_LEN: usize = 25;
/// Split width for oversized tokens.
const SPLIT_WIDTH: usize = 15;

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_TERMINAL_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?]){4,}").unwrap());
static RE_CLAUSE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([,;:]){3,}").unwrap());
static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());
static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[\w.+-]+@[\w-]+\.[a-z]{2,}\b").unwrap());
static RE_HTML: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_IP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})\b").unwrap());
static RE_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?<!\d-)\b(\d{3})-(\d{3})-(\d{4})\b(?!-\d)").unwrap());
static RE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s'.!?,]").unwrap());

static RE_CONTRACTION_CANT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bcan't\b").unwrap());
static RE_CONTRACTION_WONT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwon't\b").unwrap());
static RE_CONTRACTION_NT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\w+)n't\b").unwrap());
static RE_CONTRACTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\w+)'re\b").unwrap());
static RE_CONTRACTION_VE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\w+)'ve\b").unwrap());
static RE_CONTRACTION_LL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\w+)'ll\b").unwrap());
static RE_CONTRACTION_M: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\w+)'m\b").unwrap());

/// Outcome of the preprocessing stage.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    pub processed_text: String,
    pub changes_made: Vec<String>,
    pub warnings: Vec<String>,
    /// 1.0 = clean input; drops as repairs accumulate.
    pub confidence_score: f64,
}

/// Count whitespace-delimited words, the same tokenization the aligner sees.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Allowed word-count drift for `w` input words: ±⌊w/10⌋.
pub fn word_count_tolerance(input_words: usize) -> usize {
    input_words / 10
}

/// Run the preprocessing stage.
///
/// With `preserve_word_count`, the conservative path is used and the result
/// is checked against the ±⌊w/10⌋ tolerance; a violation downgrades the
/// confidence score and is reported as a warning (the pipeline driver
/// decides whether to fall back).
pub fn preprocess(text: &str, aggressive: bool, preserve_word_count: bool) -> PreprocessResult {
    let mut changes = Vec::new();
    let mut warnings = Vec::new();
    let mut confidence: f64 = 1.0;
    let input_words = word_count(text);

    // Unicode NFKC folds full-width forms, ligatures, and compatibility
    // characters the phonemizer has no pronunciations for.
    let mut out: String = text.nfkc().collect();
    if out != text {
        changes.push("nfkc_normalization".into());
    }

    // Strip C0/C1 controls except newline and tab.
    let stripped: String = out
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .collect();
    if stripped.len() != out.len() {
        changes.push("control_chars_removed".into());
        confidence -= 0.05;
    }
    out = stripped;

    if aggressive {
        let before = out.clone();
        out = RE_HTML.replace_all(&out, " ").into_owned();
        out = RE_URL.replace_all(&out, " ").into_owned();
        out = RE_EMAIL.replace_all(&out, " ").into_owned();
        out = RE_IP
            .replace_all(&out, |caps: &Captures| {
                (1..=4).map(|i| digit_words(&caps[i])).collect::<Vec<_>>().join(" dot ")
            })
            .into_owned();
        out = RE_PHONE
            .replace_all(&out, |caps: &Captures| {
                (1..=3).map(|i| digit_words(&caps[i])).collect::<Vec<_>>().join(" ")
            })
            .into_owned();
        out = RE_PUNCT.replace_all(&out, " ").into_owned();
        if out != before {
            changes.push("aggressive_cleanup".into());
        }
    }

    // Cap punctuation runs: "!!!!" reads as screaming to the aligner.
    let before = out.clone();
    out = RE_TERMINAL_RUN.replace_all(&out, "$1$1$1").into_owned();
    out = RE_CLAUSE_RUN.replace_all(&out, "$1").into_owned();
    if out != before {
        changes.push("punctuation_runs_capped".into());
    }

    // Split pathological tokens at fixed width so each piece tokenizes.
    let mut split_any = false;
    let rebuilt: Vec<String> = out
        .split_whitespace()
        .map(|token| {
            if token.chars().count() > MAX_TOKEN_LEN {
                split_any = true;
                split_long_token(token)
            } else {
                token.to_string()
            }
        })
        .collect();
    if split_any {
        changes.push("long_tokens_split".into());
        warnings.push("oversized token split for phonemizer compatibility".into());
        confidence -= 0.1;
    }
    out = rebuilt.join(" ");

    out = RE_SPACES.replace_all(out.trim(), " ").into_owned();

    if preserve_word_count {
        let output_words = word_count(&out);
        let tolerance = word_count_tolerance(input_words);
        let drift = output_words.abs_diff(input_words);
        if drift > tolerance {
            warnings.push(format!(
                "word count drifted {input_words} -> {output_words} (tolerance {tolerance})"
            ));
            confidence -= 0.3;
        }
    }

    PreprocessResult {
        processed_text: out,
        changes_made: changes,
        warnings,
        confidence_score: confidence.max(0.0),
    }
}

/// Expand the common apostrophe contractions. Word count is *not* preserved;
/// only call this when the pipeline options ask for expansion.
pub fn expand_contractions(text: &str) -> String {
    let text = RE_CONTRACTION_CANT.replace_all(text, "cannot").into_owned();
    let text = RE_CONTRACTION_WONT.replace_all(&text, "will not").into_owned();
    let text = RE_CONTRACTION_NT.replace_all(&text, "$1 not").into_owned();
    let text = RE_CONTRACTION_RE.replace_all(&text, "$1 are").into_owned();
    let text = RE_CONTRACTION_VE.replace_all(&text, "$1 have").into_owned();
    let text = RE_CONTRACTION_LL.replace_all(&text, "$1 will").into_owned();
    RE_CONTRACTION_M.replace_all(&text, "$1 am").into_owned()
}

fn split_long_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    chars
        .chunks(SPLIT_WIDTH)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_chars() {
        let r = preprocess("hello\u{0007} world\u{008f}!", false, true);
        assert_eq!(r.processed_text, "hello world!");
        assert!(r.changes_made.iter().any(|c| c == "control_chars_removed"));
    }

    #[test]
    fn keeps_newline_and_tab_semantics() {
        // Newline/tab survive control stripping, then collapse as whitespace.
        let r = preprocess("one\ttwo\nthree", false, true);
        assert_eq!(r.processed_text, "one two three");
    }

    #[test]
    fn caps_punctuation_runs() {
        let r = preprocess("Stop!!!!!", false, true);
        assert_eq!(r.processed_text, "Stop!!!");
    }

    #[test]
    fn splits_long_tokens() {
        let long = "a".repeat(40);
        let r = preprocess(&long, false, false);
        assert!(r.processed_text.contains(' '));
        assert!(r.processed_text.split_whitespace().all(|t| t.len() <= SPLIT_WIDTH));
        assert!(r.confidence_score < 1.0);
    }

    #[test]
    fn conservative_preserves_word_count() {
        let input = "The quick brown fox jumps over the lazy dog near the river bank today";
        let r = preprocess(input, false, true);
        let before = word_count(input);
        let after = word_count(&r.processed_text);
        assert!(before.abs_diff(after) <= word_count_tolerance(before));
        assert!(r.warnings.is_empty(), "warnings: {:?}", r.warnings);
    }

    #[test]
    fn aggressive_removes_urls_and_reads_digits() {
        let r = preprocess("see https://example.com or ping 10.0.0.1 now", true, false);
        assert!(!r.processed_text.contains("https"));
        assert!(r.processed_text.contains("one zero dot zero dot zero dot one"));
    }

    #[test]
    fn contraction_expansion() {
        assert_eq!(expand_contractions("I can't, you won't"), "I cannot, you will not");
        assert_eq!(expand_contractions("they're here"), "they are here");
        assert_eq!(expand_contractions("I'm done"), "I am done");
    }

    #[test]
    fn nfkc_folds_fullwidth() {
        let r = preprocess("ｈｅｌｌｏ", false, false);
        assert_eq!(r.processed_text, "hello");
    }
}
