//! Contraction pronunciation rules.
//!
//! Maps contractions to their spoken spellings so the acoustic model never
//! sees an apostrophe form it mispronounces ("wasn't" read as "wAHz-int").
//! Runs before any stage that strips apostrophes.

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;

/// Contraction → spoken form. Order is irrelevant; each rule matches on
/// word boundaries case-insensitively.
const RULES: &[(&str, &str)] = &[
    ("wasn't", "was not"),
    ("weren't", "were not"),
    ("isn't", "is not"),
    ("aren't", "are not"),
    ("don't", "do not"),
    ("doesn't", "does not"),
    ("didn't", "did not"),
    ("won't", "will not"),
    ("can't", "cannot"),
    ("couldn't", "could not"),
    ("shouldn't", "should not"),
    ("wouldn't", "would not"),
    ("haven't", "have not"),
    ("hasn't", "has not"),
    ("hadn't", "had not"),
    ("I'm", "I am"),
    ("I'll", "I will"),
    ("I'd", "I would"),
    ("I've", "I have"),
    ("you'll", "you will"),
    ("you're", "you are"),
    ("you've", "you have"),
    ("we're", "we are"),
    ("we'll", "we will"),
    ("we've", "we have"),
    ("they're", "they are"),
    ("they'll", "they will"),
    ("they've", "they have"),
    ("that's", "that is"),
    ("what's", "what is"),
    ("it's", "it is"),
    ("he's", "he is"),
    ("she's", "she is"),
    ("there's", "there is"),
    ("let's", "let us"),
];

static COMPILED: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|(contraction, spoken)| {
            let pattern = format!(r"(?i)\b{}\b", fancy_regex::escape(contraction));
            (Regex::new(&pattern).expect("contraction pattern"), *spoken)
        })
        .collect()
});

/// Apply the spoken-spelling rules, preserving the case shape of each match:
/// ALL-CAPS stays upper, Title-Case stays title, anything else stays lower.
pub fn apply_pronunciation_rules(text: &str) -> String {
    let mut out = text.to_string();
    for (re, spoken) in COMPILED.iter() {
        out = re
            .replace_all(&out, |caps: &Captures| match_case(&caps[0], spoken))
            .into_owned();
    }
    out
}

fn match_case(original: &str, spoken: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if !letters.is_empty() && letters.iter().all(|c| c.is_uppercase()) {
        return spoken.to_uppercase();
    }
    if original.chars().next().is_some_and(|c| c.is_uppercase()) {
        let mut chars = spoken.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
    }
    spoken.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_wasnt() {
        assert_eq!(apply_pronunciation_rules("I wasn't ready."), "I was not ready.");
    }

    #[test]
    fn preserves_title_case() {
        assert_eq!(apply_pronunciation_rules("Don't do that"), "Do not do that");
    }

    #[test]
    fn preserves_all_caps() {
        assert_eq!(apply_pronunciation_rules("DON'T SHOUT"), "DO NOT SHOUT");
    }

    #[test]
    fn first_person_forms() {
        assert_eq!(apply_pronunciation_rules("I'm sure I'll go"), "I am sure I will go");
        // "I'd" takes the unconditional "would" reading here; the legacy
        // contraction stage owns the had/would disambiguation.
        assert_eq!(apply_pronunciation_rules("I'd rather stay"), "I would rather stay");
    }

    #[test]
    fn untouched_without_contractions() {
        let text = "Nothing to change here.";
        assert_eq!(apply_pronunciation_rules(text), text);
    }

    #[test]
    fn idempotent() {
        let once = apply_pronunciation_rules("She wasn't there and they're gone");
        let twice = apply_pronunciation_rules(&once);
        assert_eq!(once, twice);
    }
}
