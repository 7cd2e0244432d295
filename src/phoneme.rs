//! Grapheme-to-phoneme seam.
//!
//! The orchestrator only depends on the [`Phonemizer`] trait; the built-in
//! backend drives the espeak-ng C library directly (no subprocess) behind
//! the `espeak` feature. The phonemizer is sensitive to word-count parity
//! with its input, which is why the normalization pipeline guards it.

use crate::error::Result;

/// Converts normalized text into a phoneme sequence for one language.
pub trait Phonemizer: Send + Sync {
    /// Phonemize `text` for `language` (e.g. `"en-us"`). Returns IPA.
    fn phonemize(&self, text: &str, language: &str) -> Result<String>;
}

#[cfg(feature = "espeak")]
pub use espeak::EspeakPhonemizer;

#[cfg(feature = "espeak")]
mod espeak {
    use std::{
        ffi::{CStr, CString},
        os::raw::{c_char, c_int, c_void},
        sync::Mutex,
    };

    use once_cell::sync::OnceCell;

    use crate::error::{Result, TtsError};

    // Linking is handled by build.rs (pkg-config, or ESPEAK_LIB_DIR).
    extern "C" {
        fn espeak_ng_InitializePath(path: *const c_char);
        fn espeak_ng_Initialize(context: *mut c_void) -> c_int;
        fn espeak_ng_SetVoiceByName(name: *const c_char) -> c_int;
        /// `textptr` advances past the translated clause, or becomes NULL
        /// when the text is consumed. The returned buffer is overwritten by
        /// the next call; copy before continuing.
        fn espeak_TextToPhonemes(
            textptr: *mut *const c_void,
            textmode: c_int,
            phonememode: c_int,
        ) -> *const c_char;
    }

    /// `textmode`: input is UTF-8.
    const CHARS_UTF8: c_int = 1;
    /// `phonememode`: IPA output.
    const PHONEMES_IPA: c_int = 0x02;

    /// espeak-ng keeps global state; every call goes through this lock.
    static LOCK: Mutex<()> = Mutex::new(());
    /// One-time init result; the error string is replayed to later callers.
    static INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();
    /// Voice currently selected inside the library.
    static ACTIVE_VOICE: Mutex<String> = Mutex::new(String::new());

    /// espeak-ng-backed [`super::Phonemizer`].
    pub struct EspeakPhonemizer;

    impl EspeakPhonemizer {
        /// Initialize the library eagerly so startup fails fast when the
        /// data files are missing.
        pub fn new() -> Result<Self> {
            let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
            INIT.get_or_init(init_library)
                .as_ref()
                .map_err(|e| TtsError::Phonemizer(e.clone()))?;
            Ok(Self)
        }
    }

    fn init_library() -> std::result::Result<(), String> {
        unsafe {
            espeak_ng_InitializePath(std::ptr::null());
            let status = espeak_ng_Initialize(std::ptr::null_mut());
            if status != 0 {
                return Err(format!("espeak_ng_Initialize failed (status {status:#010x})"));
            }
        }
        Ok(())
    }

    fn select_voice(language: &str) -> Result<()> {
        let mut active = ACTIVE_VOICE.lock().unwrap_or_else(|p| p.into_inner());
        if *active == language {
            return Ok(());
        }
        let voice = CString::new(language)
            .map_err(|_| TtsError::Phonemizer("language contains a null byte".into()))?;
        let rc = unsafe { espeak_ng_SetVoiceByName(voice.as_ptr()) };
        if rc != 0 {
            return Err(TtsError::Phonemizer(format!(
                "espeak_ng_SetVoiceByName({language:?}) failed (rc {rc})"
            )));
        }
        *active = language.to_string();
        Ok(())
    }

    impl super::Phonemizer for EspeakPhonemizer {
        fn phonemize(&self, text: &str, language: &str) -> Result<String> {
            let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
            INIT.get_or_init(init_library)
                .as_ref()
                .map_err(|e| TtsError::Phonemizer(e.clone()))?;
            select_voice(language)?;

            let text_c = CString::new(text)
                .map_err(|_| TtsError::Phonemizer("text contains a null byte".into()))?;

            let mut cursor: *const c_void = text_c.as_ptr() as *const c_void;
            let mut parts: Vec<String> = Vec::new();

            unsafe {
                while !cursor.is_null() {
                    let phonemes = espeak_TextToPhonemes(&mut cursor, CHARS_UTF8, PHONEMES_IPA);
                    if phonemes.is_null() {
                        // Empty clause (leading whitespace); keep going.
                        continue;
                    }
                    let chunk = CStr::from_ptr(phonemes)
                        .to_str()
                        .map_err(|_| {
                            TtsError::Phonemizer("espeak-ng returned non-UTF-8 phonemes".into())
                        })?
                        .trim()
                        .to_owned();
                    if !chunk.is_empty() {
                        parts.push(chunk);
                    }
                }
            }

            Ok(parts.join(" "))
        }
    }

}

/// Fixed-output phonemizer for tests and offline tooling.
#[derive(Debug, Clone, Default)]
pub struct StaticPhonemizer;

impl Phonemizer for StaticPhonemizer {
    fn phonemize(&self, text: &str, _language: &str) -> Result<String> {
        // One pseudo-phoneme per word keeps count parity observable.
        Ok(text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_phonemizer_preserves_word_count() {
        let p = StaticPhonemizer;
        let out = p.phonemize("Three little words", "en-us").expect("phonemize");
        assert_eq!(out.split_whitespace().count(), 3);
    }
}
