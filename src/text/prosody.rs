//! Final text tidy and prosody guard.
//!
//! The generic normalizer collapses whitespace, fixes spacing around
//! punctuation, and guarantees terminal punctuation. The prosody guard
//! removes directional glyphs outright: a downstream symbol pass that
//! spelled them out would read "right up arrow" into the audio, so they
//! must never survive to the phonemizer.

use fancy_regex::Regex;
use once_cell::sync::Lazy;

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([.,!?;:])").unwrap());
static RE_MISSING_GAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?])([A-Za-z])").unwrap());

/// Glyphs the acoustic stack must never see.
const ARROW_GLYPHS: &[char] = &['↗', '↘', '↑', '↓', '→', '←'];

/// Dashes read as a short pause.
const PAUSE_DASHES: &[char] = &['—', '–'];

/// Collapse whitespace, fix punctuation spacing, ensure a terminal mark.
pub fn normalize_text(text: &str) -> String {
    let mut out = RE_SPACES.replace_all(text.trim(), " ").into_owned();
    out = RE_SPACE_BEFORE_PUNCT.replace_all(&out, "$1").into_owned();
    out = RE_MISSING_GAP.replace_all(&out, "$1 $2").into_owned();

    let out = out.trim();
    if out.is_empty() {
        return String::new();
    }
    match out.chars().last() {
        Some(c) if ".!?,;:".contains(c) => out.to_string(),
        _ => format!("{out}."),
    }
}

/// Strip arrow glyphs, double-bang ligatures, and turn long dashes into
/// comma pauses.
pub fn apply_prosody_guard(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if ARROW_GLYPHS.contains(&c) {
            continue;
        }
        if PAUSE_DASHES.contains(&c) {
            out.push_str(", ");
            continue;
        }
        if c == '‼' {
            out.push('!');
            continue;
        }
        out.push(c);
    }
    RE_SPACES.replace_all(out.trim(), " ").into_owned()
}
