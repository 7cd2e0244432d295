//! Interjection pronunciation fixes.
//!
//! Short hesitation and nasal sounds get lengthened spellings so the model
//! hums them instead of spelling them ("hmm" read as aitch-em-em).
//! Compound interjections ("mm-hmm", "uh-huh") are protected with
//! placeholders while the individual rewrites run, then restored.

use fancy_regex::Regex;
use once_cell::sync::Lazy;

/// Compounds that must survive the individual rewrites untouched.
const COMPOUNDS: &[&str] = &["mm-hmm", "Mm-hmm", "MM-HMM", "uh-huh", "Uh-huh", "UH-UH", "uh-uh", "Uh-uh", "UH-HUH"];

/// Individual rewrites: lengthened spellings for hesitation and nasal sounds.
/// Lowercase and sentence-case variants are listed separately; matching is
/// case-exact so capitalization survives.
const REWRITES: &[(&str, &str)] = &[
    ("hmm", "hmmm"),
    ("Hmm", "Hmmm"),
    ("hm", "hmmm"),
    ("Hm", "Hmmm"),
    ("mmm", "mmmm"),
    ("Mmm", "Mmmm"),
    ("mm", "mmmm"),
    ("Mm", "Mmmm"),
    ("mhm", "mm-hmm"),
    ("Mhm", "Mm-hmm"),
    ("uh", "uhh"),
    ("Uh", "Uhh"),
    ("um", "umm"),
    ("Um", "Umm"),
    ("er", "err"),
    ("Er", "Err"),
    ("ah", "ahh"),
    ("Ah", "Ahh"),
    ("oh", "ohh"),
    ("Oh", "Ohh"),
    ("haha", "ha ha"),
    ("Haha", "Ha ha"),
    ("hehe", "he he"),
    ("Hehe", "He he"),
];

static COMPILED: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    REWRITES
        .iter()
        .map(|(from, to)| {
            // Hyphen guards keep pieces of protected compounds intact even
            // if a placeholder pass missed them.
            let pattern = format!(r"(?<!-)\b{}\b(?!-)", fancy_regex::escape(from));
            (Regex::new(&pattern).expect("interjection pattern"), *to)
        })
        .collect()
});

static COMPOUND_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    COMPOUNDS
        .iter()
        .map(|c| {
            let pattern = format!(r"\b{}\b", fancy_regex::escape(c));
            (Regex::new(&pattern).expect("compound pattern"), *c)
        })
        .collect()
});

/// Apply interjection fixes.
pub fn fix_interjections(text: &str) -> String {
    // Step 1: swap compounds for placeholders (case-exact).
    let mut out = text.to_string();
    let mut protected: Vec<(String, &'static str)> = Vec::new();
    for (i, (re, original)) in COMPOUND_PATTERNS.iter().enumerate() {
        if re.is_match(&out).unwrap_or(false) {
            let placeholder = format!("\u{2402}CMP{i}\u{2402}");
            out = re.replace_all(&out, placeholder.as_str()).into_owned();
            protected.push((placeholder, original));
        }
    }

    // Step 2: individual rewrites.
    for (re, to) in COMPILED.iter() {
        out = re.replace_all(&out, *to).into_owned();
    }

    // Step 3: restore compounds.
    for (placeholder, original) in protected {
        out = out.replace(&placeholder, original);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengthens_hmm() {
        assert_eq!(fix_interjections("Hmm, what?"), "Hmmm, what?");
        assert_eq!(fix_interjections("hmm..."), "hmmm...");
    }

    #[test]
    fn expands_short_nasals() {
        assert_eq!(fix_interjections("mm yes"), "mmmm yes");
        assert_eq!(fix_interjections("uh I think"), "uhh I think");
    }

    #[test]
    fn protects_compounds() {
        assert_eq!(fix_interjections("mm-hmm, exactly"), "mm-hmm, exactly");
        assert_eq!(fix_interjections("Uh-huh. Sure."), "Uh-huh. Sure.");
        assert_eq!(fix_interjections("uh-uh, no way"), "uh-uh, no way");
    }

    #[test]
    fn compound_and_single_coexist() {
        assert_eq!(fix_interjections("Mm-hmm, hmm, let me think"), "Mm-hmm, hmmm, let me think");
    }

    #[test]
    fn sentence_initial_capitalization_preserved() {
        assert_eq!(fix_interjections("Oh! Um, hello."), "Ohh! Umm, hello.");
    }

    #[test]
    fn laughter_separated() {
        assert_eq!(fix_interjections("haha very funny"), "ha ha very funny");
    }

    #[test]
    fn mhm_becomes_compound() {
        assert_eq!(fix_interjections("mhm sure"), "mm-hmm sure");
    }

    #[test]
    fn idempotent_on_fixed_text() {
        let once = fix_interjections("Hmm, uh, mm-hmm.");
        assert_eq!(fix_interjections(&once), once);
    }
}
