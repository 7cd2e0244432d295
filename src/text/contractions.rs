//! Legacy contraction expansion with context-sensitive disambiguation.
//!
//! Off by default; the pronunciation-rule stage covers the common cases.
//! This richer table additionally disambiguates `'d` (had vs. would) and
//! `'s` (has vs. is) from the word that follows: a perfective participle or
//! a temporal adverb flips the reading to had/has.

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;

/// Fixed-reading contractions, applied before the context-sensitive pass.
const FIXED: &[(&str, &str)] = &[
    ("can't", "cannot"),
    ("won't", "will not"),
    ("shan't", "shall not"),
    ("ain't", "is not"),
    ("let's", "let us"),
    ("y'all", "you all"),
    ("o'clock", "oclock"),
    ("ma'am", "maam"),
    ("gonna", "going to"),
    ("wanna", "want to"),
    ("gotta", "got to"),
];

/// Words after `'d`/`'s` that force the perfective reading.
const PERFECTIVE_CUES: &str =
    "been|done|seen|gone|come|taken|given|written|spoken|already|just|never|ever|once|twice|not";

static COMPILED_FIXED: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    FIXED
        .iter()
        .map(|(c, e)| {
            let pattern = format!(r"(?i)\b{}\b", fancy_regex::escape(c));
            (Regex::new(&pattern).expect("fixed contraction pattern"), *e)
        })
        .collect()
});

static RE_NT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)n't\b").unwrap());
static RE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)'re\b").unwrap());
static RE_VE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)'ve\b").unwrap());
static RE_LL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)'ll\b").unwrap());
static RE_M: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(i)'m\b").unwrap());

static RE_D_HAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b([a-z]+)'d\b(?=\s+(?:{PERFECTIVE_CUES})\b)")).unwrap()
});
static RE_D_WOULD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)'d\b").unwrap());

static RE_S_HAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b([a-z]+)'s\b(?=\s+(?:{PERFECTIVE_CUES})\b)")).unwrap()
});
static RE_S_IS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)'s\b").unwrap());

/// Pronouns whose `'s` is a contraction rather than a possessive. Other
/// words keep their apostrophe ("the dog's bowl").
const S_CONTRACTION_HEADS: &[&str] =
    &["it", "that", "what", "who", "he", "she", "there", "here", "where", "how"];

/// Expand contractions with the legacy table.
pub fn expand_legacy_contractions(text: &str) -> String {
    let mut out = text.to_string();

    for (re, expanded) in COMPILED_FIXED.iter() {
        out = out_replace_cased(&out, re, |_| (*expanded).to_string());
    }

    // Context-sensitive passes run before their unconditional fallbacks so
    // "she'd been" reads "she had been" while "she'd go" reads "she would go".
    out = out_replace_cased(&out, &RE_D_HAD, |caps| format!("{} had", &caps[1]));
    out = out_replace_cased(&out, &RE_D_WOULD, |caps| format!("{} would", &caps[1]));
    out = out_replace_cased(&out, &RE_S_HAS, |caps| {
        if is_s_contraction_head(&caps[1]) {
            format!("{} has", &caps[1])
        } else {
            caps[0].to_string()
        }
    });
    out = out_replace_cased(&out, &RE_S_IS, |caps| {
        if is_s_contraction_head(&caps[1]) {
            format!("{} is", &caps[1])
        } else {
            caps[0].to_string()
        }
    });

    out = out_replace_cased(&out, &RE_NT, |caps| format!("{} not", &caps[1]));
    out = out_replace_cased(&out, &RE_RE, |caps| format!("{} are", &caps[1]));
    out = out_replace_cased(&out, &RE_VE, |caps| format!("{} have", &caps[1]));
    out = out_replace_cased(&out, &RE_LL, |caps| format!("{} will", &caps[1]));
    out = out_replace_cased(&out, &RE_M, |caps| format!("{} am", &caps[1]));

    out
}

fn is_s_contraction_head(word: &str) -> bool {
    let lower = word.to_lowercase();
    S_CONTRACTION_HEADS.contains(&lower.as_str())
}

/// replace_all with ALL-CAPS / Title-Case preservation of the match.
fn out_replace_cased<F>(text: &str, re: &Regex, build: F) -> String
where
    F: Fn(&Captures) -> String,
{
    re.replace_all(text, |caps: &Captures| {
        let replacement = build(caps);
        let original = &caps[0];
        let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
            replacement.to_uppercase()
        } else if original.chars().next().is_some_and(|c| c.is_uppercase()) {
            let mut chars = replacement.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        } else {
            replacement
        }
    })
    .into_owned()
}
