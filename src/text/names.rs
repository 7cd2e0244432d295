//! Proper-name and word pronunciation fixes.
//!
//! Two flat lookup tables (names, general words) plus a small
//! context-sensitive table for heteronyms like "resume" and "lead".

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;

/// Proper names with known mispronunciations.
const NAME_FIXES: &[(&str, &str)] = &[
    ("Elon", "EE-lawn"),
    ("Bezos", "BAY-zohss"),
    ("Musk", "MUHSK"),
    ("Zuckerberg", "ZUHK-er-berg"),
    ("Pichai", "pih-CHIGH"),
    ("Nadella", "nah-DELL-ah"),
    ("Wojcicki", "woh-JIT-skee"),
    ("Nevada", "neh-VAD-ah"),
    ("Oregon", "OR-eh-gun"),
    ("Illinois", "ill-ih-NOY"),
    ("Arkansas", "AR-kan-saw"),
    ("Qatar", "KAH-tar"),
    ("Dubai", "doo-BYE"),
    ("Nike", "NYE-kee"),
    ("Adidas", "ah-DEE-dahs"),
    ("Porsche", "POR-shuh"),
    ("Hyundai", "HUN-day"),
    ("Xiaomi", "SHAO-mee"),
    ("Sean", "SHAWN"),
    ("Siobhan", "shih-VAWN"),
    ("Niamh", "NEEV"),
    ("Aoife", "EE-fah"),
];

/// General vocabulary the model habitually mangles.
const WORD_FIXES: &[(&str, &str)] = &[
    ("acquisition", "ak-wih-ZISH-un"),
    ("epitome", "ih-PIT-oh-mee"),
    ("hyperbole", "hy-PUR-boh-lee"),
    ("cache", "KASH"),
    ("niche", "NEESH"),
    ("suite", "SWEET"),
    ("segue", "SEG-way"),
    ("paradigm", "PAIR-ah-dime"),
    ("often", "OF-en"),
    ("nuclear", "NOO-klee-er"),
    ("library", "LYE-brer-ee"),
    ("February", "FEB-roo-er-ee"),
    ("comfortable", "KUMF-ter-bul"),
    ("vegetable", "VEJ-tah-bul"),
    ("GUI", "GOO-ee"),
    ("SQL", "SEE-kwel"),
];

/// (pattern with the heteronym as capture 1, replacement for the word).
const CONTEXT_FIXES: &[(&str, &str)] = &[
    (r"(?i)\b(?:my|your|his|her|their)\s+(resume)\b", "REZ-oo-may"),
    (r"(?i)\b(resume)\s+(?:work|working|operations|activities)\b", "rih-ZOOM"),
    (r"(?i)\b(live)\s+(?:stream|broadcast|show|event)\b", "LYVE"),
    (r"(?i)\b(lead)\s+(?:singer|guitarist|developer|engineer)\b", "LEED"),
    (r"(?i)\b(lead)\s+(?:pipe|paint|poisoning|metal)\b", "LED"),
];

static NAME_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| compile(NAME_FIXES));
static WORD_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| compile(WORD_FIXES));
static CONTEXT_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    CONTEXT_FIXES
        .iter()
        .map(|(pattern, fix)| (Regex::new(pattern).expect("context pattern"), *fix))
        .collect()
});

fn compile(table: &'static [(&'static str, &'static str)]) -> Vec<(Regex, &'static str)> {
    table
        .iter()
        .map(|(word, fix)| {
            let pattern = format!(r"(?i)\b{}\b", fancy_regex::escape(word));
            (Regex::new(&pattern).expect("name pattern"), *fix)
        })
        .collect()
}

/// Apply name, word, and context-sensitive pronunciation fixes.
pub fn fix_pronunciations(text: &str) -> String {
    let mut out = text.to_string();

    // Context-sensitive pass first: the heteronym replacement must see the
    // original neighboring words before the flat tables rewrite anything.
    for (re, fix) in CONTEXT_PATTERNS.iter() {
        out = re
            .replace_all(&out, |caps: &Captures| {
                let whole = caps[0].to_string();
                let word = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                whole.replacen(word, fix, 1)
            })
            .into_owned();
    }

    for (re, fix) in NAME_PATTERNS.iter().chain(WORD_PATTERNS.iter()) {
        out = re.replace_all(&out, *fix).into_owned();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_fixes() {
        assert_eq!(fix_pronunciations("Elon spoke"), "EE-lawn spoke");
        assert_eq!(fix_pronunciations("made in Qatar"), "made in KAH-tar");
    }

    #[test]
    fn word_fixes() {
        let out = fix_pronunciations("the acquisition closed");
        assert!(out.contains("ak-wih-ZISH-un"));
    }

    #[test]
    fn resume_document_context() {
        let out = fix_pronunciations("I need to update my resume today");
        assert!(out.contains("REZ-oo-may"), "got: {out}");
    }

    #[test]
    fn resume_activity_context() {
        let out = fix_pronunciations("We will resume work tomorrow");
        assert!(out.contains("rih-ZOOM"), "got: {out}");
    }

    #[test]
    fn lead_contexts() {
        assert!(fix_pronunciations("the lead singer").contains("LEED"));
        assert!(fix_pronunciations("a lead pipe").contains("LED"));
    }

    #[test]
    fn plain_words_untouched() {
        let text = "nothing remarkable here";
        assert_eq!(fix_pronunciations(text), text);
    }
}
