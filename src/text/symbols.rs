//! Symbol handling.
//!
//! Two passes share this module: the default symbol processor (common
//! symbol-to-word mappings) and the eSpeak-style pass with punctuation
//! modes. The pipeline runs exactly one of them. URLs, email addresses,
//! file paths, and inline code spans are located first and shielded from
//! symbol spelling; `?` and `.` are never vocalized (they shape intonation
//! and pauses), and `*` always reads "asterisk" when standalone.

use fancy_regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// eSpeak-style punctuation handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunctuationMode {
    /// Strip all punctuation.
    None,
    /// Pronounce only `!`; `?` and `.` pass through silently.
    #[default]
    Some,
    /// Pronounce all mapped symbols except `.` and `?`.
    All,
}

/// Outcome of a symbol pass.
#[derive(Debug, Clone, Default)]
pub struct SymbolResult {
    pub processed_text: String,
    pub changes_made: Vec<String>,
    pub symbols_processed: usize,
}

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());
static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[a-z]{2,}\b").unwrap());
static RE_FILEPATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[A-Za-z]:\\[^\s"<>|]+|(?<![\w.])(?:/[\w.-]+){2,}"#).unwrap()
});
static RE_CODE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[^`]*```|`[^`]+`").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static RE_STANDALONE_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|(?<=\s))\*(?:$|(?=\s)|(?=[.,;:!?]))").unwrap());
static RE_LOOSE_APOSTROPHE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?<!\w)['\u{2018}\u{2019}]|['\u{2018}\u{2019}](?!\w)").unwrap());

/// Symbols with spoken names, used by the default pass and by `All` mode.
const SYMBOL_WORDS: &[(char, &str)] = &[
    ('&', "and"),
    ('@', "at"),
    ('#', "hash"),
    ('%', "percent"),
    ('+', "plus"),
    ('=', "equals"),
    ('~', "tilde"),
    ('^', "caret"),
    ('|', "pipe"),
    ('_', "underscore"),
];

/// Clause punctuation spoken in `All` mode only.
const CLAUSE_WORDS: &[(char, &str)] = &[(',', "comma"), (';', "semicolon"), (':', "colon"), ('!', "exclamation mark")];

/// Quote characters stripped everywhere (apostrophes inside words survive).
const QUOTE_CHARS: &[char] = &['"', '\u{201c}', '\u{201d}', '«', '»'];

/// Shield protected spans behind placeholders; returns the masked text and
/// the spans to restore, already stripped of speakable symbols.
fn mask_protected(text: &str) -> (String, Vec<(String, String)>) {
    let mut out = text.to_string();
    let mut spans = Vec::new();
    for (i, re) in [&*RE_CODE_SPAN, &*RE_URL, &*RE_EMAIL, &*RE_FILEPATH].iter().enumerate() {
        loop {
            let found = match re.find(&out) {
                Ok(Some(m)) => (m.start(), m.end(), m.as_str().to_string()),
                _ => break,
            };
            let (start, mut end, mut span) = found;
            // A URL match swallows trailing sentence punctuation; give it back.
            while span
                .chars()
                .last()
                .is_some_and(|c| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'))
            {
                span.pop();
                end -= 1;
            }
            if span.is_empty() {
                break;
            }
            // Placeholder stays clear of every symbol the passes rewrite.
            let placeholder = format!("\u{2403}SPAN{}X{}\u{2403}", i, spans.len());
            let spoken = span
                .chars()
                .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
                .collect::<String>();
            let spoken = RE_SPACES.replace_all(spoken.trim(), " ").into_owned();
            out.replace_range(start..end, &placeholder);
            spans.push((placeholder, spoken));
        }
    }
    (out, spans)
}

fn restore_protected(mut text: String, spans: &[(String, String)]) -> String {
    for (placeholder, spoken) in spans {
        text = text.replace(placeholder, spoken);
    }
    text
}

/// Default symbol pass: spell the common symbols, shield protected spans.
pub fn process_symbols_basic(text: &str) -> SymbolResult {
    let (masked, spans) = mask_protected(text);
    let mut changes = Vec::new();
    let mut count = 0;

    let mut out = String::with_capacity(masked.len());
    for c in masked.chars() {
        if let Some((_, word)) = SYMBOL_WORDS.iter().find(|(s, _)| *s == c) {
            out.push(' ');
            out.push_str(word);
            out.push(' ');
            count += 1;
        } else {
            out.push(c);
        }
    }
    if count > 0 {
        changes.push("symbols_spelled".into());
    }

    let out = finish(out, spans, &mut changes, &mut count);
    SymbolResult { processed_text: out, changes_made: changes, symbols_processed: count }
}

/// eSpeak-style pass with a punctuation mode.
pub fn process_symbols_espeak(text: &str, mode: PunctuationMode) -> SymbolResult {
    let (masked, spans) = mask_protected(text);
    let mut changes = Vec::new();
    let mut count = 0;

    let mut out = masked;

    match mode {
        PunctuationMode::None => {
            let before = out.clone();
            out = out
                .chars()
                .map(|c| {
                    if matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '(' | ')' | '[' | ']' | '{' | '}') {
                        ' '
                    } else {
                        c
                    }
                })
                .collect();
            if out != before {
                changes.push("punctuation_stripped".into());
            }
        }
        PunctuationMode::Some => {
            // Only `!` is vocalized; `?` shapes intonation and `.` a pause.
            if out.contains('!') {
                out = out.replace('!', " exclamation mark ");
                changes.push("pronounced_exclamation".into());
                count += 1;
            }
        }
        PunctuationMode::All => {
            for (symbol, word) in CLAUSE_WORDS {
                if out.contains(*symbol) {
                    out = out.replace(*symbol, &format!(" {word} "));
                    changes.push(format!("pronounced_{word}"));
                    count += 1;
                }
            }
            for (symbol, word) in SYMBOL_WORDS {
                if out.contains(*symbol) {
                    out = out.replace(*symbol, &format!(" {word} "));
                    count += 1;
                }
            }
        }
    }

    let out = finish(out, spans, &mut changes, &mut count);
    SymbolResult { processed_text: out, changes_made: changes, symbols_processed: count }
}

/// Shared tail: asterisk fix, quote cleanup, restore spans, tidy whitespace.
fn finish(
    mut out: String,
    spans: Vec<(String, String)>,
    changes: &mut Vec<String>,
    count: &mut usize,
) -> String {
    if RE_STANDALONE_STAR.is_match(&out).unwrap_or(false) {
        out = RE_STANDALONE_STAR.replace_all(&out, "asterisk").into_owned();
        changes.push("asterisk_spelled".into());
        *count += 1;
    }

    let before = out.clone();
    out.retain(|c| !QUOTE_CHARS.contains(&c));
    out = RE_LOOSE_APOSTROPHE.replace_all(&out, "").into_owned();
    if out != before {
        changes.push("quotes_stripped".into());
    }

    out = restore_protected(out, &spans);
    // Re-attach spacing: collapse runs and pull punctuation back onto words.
    out = RE_SPACES.replace_all(&out, " ").into_owned();
    for p in [" .", " ,", " !", " ?", " ;", " :"] {
        out = out.replace(p, &p[1..]);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asterisk_and_url() {
        let r = process_symbols_espeak(
            "Use the * symbol and visit https://example.com?",
            PunctuationMode::Some,
        );
        assert!(r.processed_text.contains("asterisk"), "got: {}", r.processed_text);
        assert!(!r.processed_text.contains("://"), "url kept raw: {}", r.processed_text);
        assert!(!r.processed_text.contains("slash"), "url was spelled: {}", r.processed_text);
        assert!(!r.processed_text.contains("dot com"), "url was spelled: {}", r.processed_text);
        assert!(r.processed_text.ends_with('?'), "got: {}", r.processed_text);
    }

    #[test]
    fn question_mark_never_vocalized() {
        for mode in [PunctuationMode::None, PunctuationMode::Some, PunctuationMode::All] {
            let r = process_symbols_espeak("Really? Yes.", mode);
            assert!(!r.processed_text.contains("question"), "mode {mode:?}: {}", r.processed_text);
        }
    }

    #[test]
    fn some_mode_pronounces_exclamation() {
        let r = process_symbols_espeak("Wait!", PunctuationMode::Some);
        assert!(r.processed_text.contains("exclamation mark"));
    }

    #[test]
    fn none_mode_strips() {
        let r = process_symbols_espeak("Well, really? Stop.", PunctuationMode::None);
        assert!(!r.processed_text.contains(','));
        assert!(!r.processed_text.contains('?'));
        assert!(!r.processed_text.contains('.'));
    }

    #[test]
    fn all_mode_keeps_period_silent() {
        let r = process_symbols_espeak("One, two. Done!", PunctuationMode::All);
        assert!(r.processed_text.contains("comma"));
        assert!(r.processed_text.contains("exclamation mark"));
        assert!(!r.processed_text.contains("period"));
    }

    #[test]
    fn quotes_stripped_contractions_kept() {
        let r = process_symbols_espeak(r#"She said "don't worry""#, PunctuationMode::Some);
        assert!(r.processed_text.contains("don't"), "got: {}", r.processed_text);
        assert!(!r.processed_text.contains('"'));
    }

    #[test]
    fn email_not_spelled() {
        let r = process_symbols_espeak("mail me at test@example.com", PunctuationMode::All);
        assert!(!r.processed_text.contains(" at example"), "got: {}", r.processed_text);
        assert!(r.processed_text.contains("test example com"), "got: {}", r.processed_text);
    }

    #[test]
    fn code_span_shielded() {
        let r = process_symbols_basic("run `a + b` twice");
        assert!(!r.processed_text.contains("plus"), "got: {}", r.processed_text);
    }

    #[test]
    fn basic_pass_spells_ampersand() {
        let r = process_symbols_basic("salt & pepper");
        assert!(r.processed_text.contains("salt and pepper"));
    }
}
