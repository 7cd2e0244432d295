//! ONNX acoustic engine.
//!
//! Wraps one ONNX Runtime session over the acoustic model. The model's
//! contract: `(input_ids [1, seq], style [1, 256], speed [1])` in, raw
//! waveform out. Everything above this layer (normalization, phonemization,
//! retries, caching) lives in the orchestrator.

use std::{
    collections::HashMap,
    path::Path,
    sync::Mutex,
};

use ort::{
    session::{Session, SessionInputValue, SessionInputs},
    value::Tensor,
};
use tracing::{debug, info};

use crate::error::{Result, TtsError};
use crate::voice::STYLE_DIM;

/// Audio sample rate produced by the model.
pub const SAMPLE_RATE: u32 = 24_000;

/// Maximum token context including the two pad tokens.
pub const MAX_CONTEXT: usize = 512;

/// The opaque acoustic-model contract the orchestrator depends on:
/// token ids + one style row + speed in, raw samples out.
pub trait AcousticModel: Send + Sync {
    fn infer(&self, token_ids: &[i64], style_row: &[f32], speed: f32) -> Result<Vec<f32>>;

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    /// Advisory thread-count hint from the allocator. Models without a
    /// per-invocation knob ignore it.
    fn thread_hint(&self, _threads: usize) {}
}

/// One loaded acoustic model.
pub struct AcousticEngine {
    session: Mutex<Session>,
    intra_threads: usize,
}

impl AcousticModel for AcousticEngine {
    fn infer(&self, token_ids: &[i64], style_row: &[f32], speed: f32) -> Result<Vec<f32>> {
        AcousticEngine::infer(self, token_ids, style_row, speed)
    }

    fn thread_hint(&self, threads: usize) {
        // The ORT session pins its pool at build time; note the gap between
        // the advisory value and the configured one.
        if threads != self.intra_threads {
            debug!(configured = self.intra_threads, advised = threads, "thread hint differs");
        }
    }
}

impl AcousticEngine {
    /// Load the model with the given intra-op thread count.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self> {
        let threads = intra_threads.max(1);
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(threads))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| {
                TtsError::ModelNotLoaded(format!(
                    "cannot load ONNX model {}: {e}",
                    model_path.display()
                ))
            })?;

        info!(path = %model_path.display(), threads, "acoustic model loaded");
        Ok(Self { session: Mutex::new(session), intra_threads: threads })
    }

    /// Intra-op thread count the session was built with.
    pub fn intra_threads(&self) -> usize {
        self.intra_threads
    }

    /// Run one inference: pad-wrapped token ids + one style row → samples.
    pub fn infer(&self, token_ids: &[i64], style_row: &[f32], speed: f32) -> Result<Vec<f32>> {
        if token_ids.len() > MAX_CONTEXT {
            return Err(TtsError::validation(format!(
                "token sequence too long: {} (max {MAX_CONTEXT})",
                token_ids.len()
            )));
        }
        if style_row.len() != STYLE_DIM {
            return Err(TtsError::validation(format!(
                "style row must be {STYLE_DIM} wide, got {}",
                style_row.len()
            )));
        }
        if token_ids.is_empty() {
            return Ok(Vec::new());
        }

        let seq_len = token_ids.len();
        let input_ids = Tensor::from_array(([1usize, seq_len], token_ids.to_vec()))
            .map_err(|e| TtsError::ModelNotLoaded(format!("input_ids tensor: {e}")))?;
        let style = Tensor::from_array(([1usize, STYLE_DIM], style_row.to_vec()))
            .map_err(|e| TtsError::ModelNotLoaded(format!("style tensor: {e}")))?;
        let speed_tensor = Tensor::from_array(([1usize], vec![speed]))
            .map_err(|e| TtsError::ModelNotLoaded(format!("speed tensor: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("input_ids".to_string(), input_ids.into());
        feed.insert("style".to_string(), style.into());
        feed.insert("speed".to_string(), speed_tensor.into());

        let mut session = self.session.lock().expect("ORT session mutex poisoned");
        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| TtsError::ModelNotLoaded(format!("ONNX inference failed: {e}")))?;

        let (_shape, samples) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| TtsError::ModelNotLoaded(format!("output tensor: {e}")))?;

        debug!(seq_len, samples = samples.len(), "inference complete");
        Ok(samples.to_vec())
    }
}

/// Pick the style row for a chunk: index by content token count, clamped
/// to the matrix bounds.
pub fn style_row_index(content_tokens: usize, nrows: usize) -> usize {
    content_tokens.min(nrows.saturating_sub(1))
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunking
//
// The model degrades past a few hundred tokens, so long texts synthesize in
// pieces. The packer keeps whole sentences together (terminal punctuation
// included — it drives the final intonation) and fills each chunk up to a
// character budget, so a run of short sentences costs one inference instead
// of one each. A sentence over budget splits at clause marks first and only
// falls back to word wrapping when a single clause is itself too long.
// ─────────────────────────────────────────────────────────────────────────────

/// Smallest usable chunk budget; anything lower produces word confetti.
const MIN_CHUNK_BUDGET: usize = 16;

/// A fragment with no clause-final mark gets a comma so the model closes
/// its prosodic contour instead of trailing off.
fn seal(fragment: &str) -> String {
    let fragment = fragment.trim();
    match fragment.chars().last() {
        None => String::new(),
        Some(c) if ".!?,;:".contains(c) => fragment.to_string(),
        _ => format!("{fragment},"),
    }
}

/// Sentence segmentation keeping the terminal mark (and runs like "?!")
/// attached to the sentence that owns it.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            while let Some(&next) = chars.peek() {
                if matches!(next, '.' | '!' | '?') {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Clause segmentation keeping the clause mark attached.
fn split_clauses(sentence: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    for c in sentence.chars() {
        current.push(c);
        if matches!(c, ',' | ';' | ':') {
            let clause = current.trim();
            if !clause.is_empty() {
                clauses.push(clause.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        clauses.push(tail.to_string());
    }
    clauses
}

/// Last-resort split: word runs of at most `budget` characters.
fn wrap_words(clause: &str, budget: usize) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut len = 0usize;
    for word in clause.split_whitespace() {
        let word_len = word.chars().count();
        if len > 0 && len + 1 + word_len > budget {
            runs.push(std::mem::take(&mut current));
            len = 0;
        }
        if len > 0 {
            current.push(' ');
            len += 1;
        }
        current.push_str(word);
        len += word_len;
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Break one sentence into units that each fit the budget: the sentence
/// itself when short enough, else its clauses, else word runs.
fn units_within(sentence: &str, budget: usize) -> Vec<String> {
    if sentence.chars().count() <= budget {
        return vec![sentence.to_string()];
    }
    let mut units = Vec::new();
    for clause in split_clauses(sentence) {
        if clause.chars().count() <= budget {
            units.push(clause);
        } else {
            units.extend(wrap_words(&clause, budget));
        }
    }
    units
}

/// Pack normalized text into synthesis chunks of at most `max_chars`
/// characters (counted as characters, not bytes).
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let budget = max_chars.max(MIN_CHUNK_BUDGET);
    let mut chunks: Vec<String> = Vec::new();
    let mut open = String::new();
    let mut open_len = 0usize;

    for sentence in split_sentences(text) {
        for unit in units_within(&sentence, budget) {
            let unit_len = unit.chars().count();
            if open_len > 0 && open_len + 1 + unit_len > budget {
                chunks.push(seal(&open));
                open.clear();
                open_len = 0;
            }
            if open_len > 0 {
                open.push(' ');
                open_len += 1;
            }
            open.push_str(&unit);
            open_len += unit_len;
        }
    }
    if !open.trim().is_empty() {
        chunks.push(seal(&open));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_punctuation_survives() {
        assert_eq!(chunk_text("Hello world.", 360), vec!["Hello world."]);
        assert_eq!(chunk_text("Ready?", 360), vec!["Ready?"]);
        assert_eq!(chunk_text("Wait?!", 360), vec!["Wait?!"]);
    }

    #[test]
    fn short_sentences_pack_into_one_chunk() {
        assert_eq!(chunk_text("One. Two! Three?", 360), vec!["One. Two! Three?"]);
    }

    #[test]
    fn packing_respects_the_budget() {
        let chunks = chunk_text("First sentence here. Second sentence here. Third one.", 25);
        assert!(chunks.len() >= 2, "got: {chunks:?}");
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 25, "over budget: {chunk:?}");
        }
    }

    #[test]
    fn oversized_sentence_splits_at_clause_marks() {
        let chunks = chunk_text(
            "When the market opened, prices moved quickly, and traders followed.",
            30,
        );
        assert!(chunks.len() > 1, "got: {chunks:?}");
        assert!(chunks[0].ends_with(','), "clause mark lost: {chunks:?}");
    }

    #[test]
    fn word_wrap_is_the_last_resort() {
        let wall = "word ".repeat(60);
        let chunks = chunk_text(wall.trim(), 40);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 41, "over budget: {chunk:?}");
            assert!(chunk.ends_with(','), "unsealed fragment: {chunk:?}");
        }
    }

    #[test]
    fn unterminated_tail_is_sealed() {
        assert_eq!(chunk_text("no punctuation at all", 360), vec!["no punctuation at all,"]);
    }

    #[test]
    fn empty_and_whitespace_input() {
        assert!(chunk_text("", 360).is_empty());
        assert!(chunk_text("   \n  ", 360).is_empty());
    }

    #[test]
    fn character_budget_not_byte_budget() {
        // Multibyte characters count once each.
        let text = "héllo wörld. ünïcode tëxt hère.";
        let chunks = chunk_text(text, 20);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "over budget: {chunk:?}");
        }
    }

    #[test]
    fn seal_behavior() {
        assert_eq!(seal("hello"), "hello,");
        assert_eq!(seal("hello."), "hello.");
        assert_eq!(seal("hello;"), "hello;");
        assert_eq!(seal(""), "");
    }

    #[test]
    fn style_row_clamps() {
        assert_eq!(style_row_index(3, 510), 3);
        assert_eq!(style_row_index(600, 510), 509);
        assert_eq!(style_row_index(0, 510), 0);
    }
}
