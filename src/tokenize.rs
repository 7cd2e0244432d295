//! Phoneme tokenizer.
//!
//! Maps each character of an IPA phoneme string to its integer id in the
//! fixed vocabulary the acoustic model was trained with, wrapping the
//! sequence in start/end pad tokens (id 0). Unknown characters are dropped
//! silently; the model has no embedding for them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const PAD: char = '$';

/// Punctuation characters with dedicated embeddings.
const PUNCTUATION: &str = ";:,.!?¡¿—…\u{201C}«»\u{201D}\" ";

/// ASCII letters A–Z a–z.
const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// IPA characters. The combining syllabic mark (U+0329) and curly quotes
/// are individual vocabulary entries. Ordering matters: ids are positional.
const IPA_LETTERS: &str =
    "ɑɐɒæɓʙβɔɕçɗɖðʤəɘɚɛɜɝɞɟʄɡɠɢʛɦɧħɥʜɨɪʝɭɬɫɮʟɱɯɰŋɳɲɴøɵɸθœɶʘɹɺɾɻʀʁɽʂʃʈʧʉʊʋⱱʌɣɤʍχʎʏʑʐʒʔʡʕʢǀǁǂǃˈˌːˑʼʴʰʱʲʷˠˤ˞↓↑→↗↘\u{2019}\u{0329}\u{2018}ᵻ";

static VOCAB: Lazy<HashMap<char, i64>> = Lazy::new(|| {
    std::iter::once(PAD)
        .chain(PUNCTUATION.chars())
        .chain(LETTERS.chars())
        .chain(IPA_LETTERS.chars())
        .enumerate()
        .map(|(i, c)| (c, i as i64))
        .collect()
});

/// Splits an IPA string into word tokens and individual punctuation marks.
static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+|[^\w\s]").unwrap());

/// Vocabulary id for one character, `None` for out-of-vocabulary.
pub fn phoneme_id(c: char) -> Option<i64> {
    VOCAB.get(&c).copied()
}

/// Normalize token spacing: words and punctuation separated by single
/// spaces, the shape the model saw during training.
pub fn space_tokens(ipa: &str) -> String {
    RE_TOKEN.find_iter(ipa).map(|m| m.as_str()).collect::<Vec<_>>().join(" ")
}

/// Full pipeline: IPA string → pad-wrapped id sequence.
pub fn phonemes_to_ids(ipa: &str) -> Vec<i64> {
    let spaced = space_tokens(ipa);
    let mut ids = Vec::with_capacity(spaced.len() + 2);
    ids.push(0); // start pad
    ids.extend(spaced.chars().filter_map(phoneme_id));
    ids.push(0); // end pad
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_is_zero() {
        assert_eq!(phoneme_id('$'), Some(0));
    }

    #[test]
    fn ascii_and_punctuation_covered() {
        for c in LETTERS.chars().chain(";:,.!?".chars()) {
            assert!(phoneme_id(c).is_some(), "missing {c}");
        }
    }

    #[test]
    fn ids_unique() {
        let mut seen = std::collections::HashSet::new();
        for &id in VOCAB.values() {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }

    #[test]
    fn unknown_chars_dropped() {
        assert_eq!(phoneme_id('中'), None);
        let ids = phonemes_to_ids("a中b");
        assert_eq!(ids.first(), Some(&0));
        assert_eq!(ids.last(), Some(&0));
    }

    #[test]
    fn sequence_is_pad_wrapped() {
        let ids = phonemes_to_ids("hɛloʊ wɜːld!");
        assert_eq!(ids[0], 0);
        assert_eq!(*ids.last().unwrap(), 0);
        assert!(ids.len() > 2);
    }

    #[test]
    fn token_spacing() {
        let out = space_tokens("hɛloʊ, wɜːld!");
        assert!(out.contains("hɛloʊ"));
        assert!(out.contains(','));
        assert!(out.contains('!'));
    }
}
