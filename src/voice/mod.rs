//! Voice asset management.
//!
//! Discovers, validates, and indexes the packed style matrices under the
//! voices directory. Individual-file loading is the primary strategy; the
//! combined NPZ archive is produced only as a compatibility shim for
//! acoustic-model loaders that demand a single container.

pub mod archive;
pub mod blend;

use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};
use tracing::{debug, info, warn};

use crate::error::{Result, TtsError};
use archive::NpyArray;

/// Style vector width the acoustic model consumes.
pub const STYLE_DIM: usize = 256;
/// Row count a single-vector file is tiled to.
const TILE_ROWS: usize = 510;

static VOICE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").unwrap());

/// A validated, immutable voice asset.
#[derive(Debug, Clone)]
pub struct VoiceAsset {
    pub name: String,
    pub style: Arc<NpyArray>,
}

/// Owner of all loaded voices.
pub struct VoiceManager {
    voices_dir: PathBuf,
    aliases: HashMap<String, String>,
    maintain_combined: bool,
    voices: RwLock<HashMap<String, Arc<NpyArray>>>,
}

impl VoiceManager {
    /// Scan `voices_dir` and load every `.bin` style matrix.
    ///
    /// Loading is fatal only when files exist and none of them parse; an
    /// empty directory yields an empty manager (voices can be added later).
    pub fn new(
        voices_dir: impl Into<PathBuf>,
        aliases: HashMap<String, String>,
        maintain_combined: bool,
    ) -> Result<Self> {
        let voices_dir = voices_dir.into();
        std::fs::create_dir_all(&voices_dir)?;

        let manager = Self {
            voices_dir,
            aliases: aliases
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            maintain_combined,
            voices: RwLock::new(HashMap::new()),
        };
        manager.reload()?;
        Ok(manager)
    }

    /// Re-scan the voices directory.
    pub fn reload(&self) -> Result<()> {
        let mut loaded = HashMap::new();
        let mut failures = 0usize;

        for entry in std::fs::read_dir(&self.voices_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !VOICE_NAME.is_match(name) {
                debug!(name, "skipping voice with invalid name");
                continue;
            }
            match load_style_matrix(&path) {
                Ok(matrix) => {
                    loaded.insert(name.to_string(), Arc::new(matrix));
                }
                Err(e) => {
                    warn!(name, error = %e, "failed to load voice");
                    failures += 1;
                }
            }
        }

        if loaded.is_empty() && failures > 0 {
            return Err(TtsError::ModelNotLoaded(format!(
                "no voices could be loaded from {} ({failures} failed)",
                self.voices_dir.display()
            )));
        }

        info!(count = loaded.len(), dir = %self.voices_dir.display(), "voices loaded");
        *self.voices.write().expect("voice table lock poisoned") = loaded;
        Ok(())
    }

    /// Sorted voice names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.voices.read().expect("voice table lock poisoned").keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.voices.read().expect("voice table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.voices.read().expect("voice table lock poisoned").contains_key(name)
    }

    /// Resolve an alias or partial name to the canonical voice name.
    ///
    /// Resolution order: exact, alias table, case-insensitive, substring
    /// match. Failure carries nearest-match suggestions.
    pub fn resolve(&self, requested: &str) -> Result<String> {
        let table = self.voices.read().expect("voice table lock poisoned");
        if table.contains_key(requested) {
            return Ok(requested.to_string());
        }

        let lower = requested.to_lowercase();
        if let Some(target) = self.aliases.get(&lower) {
            if table.contains_key(target) {
                return Ok(target.clone());
            }
        }

        if let Some(name) = table.keys().find(|n| n.to_lowercase() == lower) {
            return Ok(name.clone());
        }

        // Partial match is accepted with a warning ("heart" → "af_heart").
        let mut partial: Vec<&String> =
            table.keys().filter(|n| n.to_lowercase().contains(&lower)).collect();
        partial.sort();
        if let Some(first) = partial.first() {
            warn!(requested, resolved = %first, "voice resolved by partial match");
            return Ok((*first).to_string());
        }

        let prefix: String = lower.chars().take(2).collect();
        let mut suggestions: Vec<String> = table
            .keys()
            .filter(|n| {
                let nl = n.to_lowercase();
                nl.starts_with(&prefix) || lower.contains(&nl)
            })
            .cloned()
            .collect();
        suggestions.sort();
        suggestions.truncate(5);

        Err(TtsError::VoiceNotFound { voice: requested.to_string(), suggestions })
    }

    /// Shared handle to a voice's style matrix.
    pub fn get(&self, name: &str) -> Result<Arc<NpyArray>> {
        self.voices
            .read()
            .expect("voice table lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| TtsError::VoiceNotFound { voice: name.to_string(), suggestions: vec![] })
    }

    /// Blend `(name, weight)` pairs into a fresh style matrix.
    pub fn blend(&self, parts: &[(String, f32)]) -> Result<NpyArray> {
        let mut resolved = Vec::with_capacity(parts.len());
        for (name, weight) in parts {
            let canonical = self.resolve(name)?;
            resolved.push((self.get(&canonical)?, *weight));
        }
        let refs: Vec<(&NpyArray, f32)> = resolved.iter().map(|(m, w)| (m.as_ref(), *w)).collect();
        blend::blend_styles(&refs)
    }

    /// Validate and persist a custom voice, then recombine.
    pub fn add_custom(&self, name: &str, matrix: NpyArray) -> Result<PathBuf> {
        if !VOICE_NAME.is_match(name) {
            return Err(TtsError::validation(format!(
                "voice name '{name}' must match [A-Za-z0-9_-]{{1,50}}"
            )));
        }
        if matrix.shape.len() != 2 || matrix.ncols() != STYLE_DIM || matrix.nrows() == 0 {
            return Err(TtsError::validation(format!(
                "custom voice must have shape (N, {STYLE_DIM}), got {:?}",
                matrix.shape
            )));
        }

        let path = self.voices_dir.join(format!("{name}.bin"));
        let mut bytes = Vec::with_capacity(matrix.data.len() * 4);
        for v in &matrix.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        std::fs::write(&path, bytes)?;

        self.voices
            .write()
            .expect("voice table lock poisoned")
            .insert(name.to_string(), Arc::new(matrix));

        if self.maintain_combined {
            self.combine()?;
        }
        info!(name, path = %path.display(), "custom voice added");
        Ok(path)
    }

    /// Remove a custom voice file. Idempotent; reports whether a file went away.
    pub fn delete_custom(&self, name: &str) -> Result<bool> {
        let path = self.voices_dir.join(format!("{name}.bin"));
        let existed = path.exists();
        if existed {
            std::fs::remove_file(&path)?;
        }
        self.voices.write().expect("voice table lock poisoned").remove(name);
        if existed && self.maintain_combined {
            self.combine()?;
        }
        Ok(existed)
    }

    /// Ensure the combined archive exists and is newer than every `.bin`.
    ///
    /// Returns the archive path. The archive's voice set always equals the
    /// individual-file set.
    pub fn combine(&self) -> Result<PathBuf> {
        let combined = self.voices_dir.join("combined_voices.npz");
        let index_path = self.voices_dir.join("voice_index.json");

        if combined.exists() && !self.combined_is_stale(&combined)? {
            return Ok(combined);
        }

        let table = self.voices.read().expect("voice table lock poisoned");
        let mut names: Vec<&String> = table.keys().collect();
        names.sort();

        let arrays: Vec<(String, &NpyArray)> =
            names.iter().map(|n| ((*n).clone(), table[*n].as_ref())).collect();
        archive::save_npz(&combined, &arrays)
            .map_err(|e| TtsError::Encoding(format!("combined archive write failed: {e}")))?;

        let index: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        std::fs::write(&index_path, serde_json::to_string_pretty(&index).unwrap_or_default())?;

        info!(voices = names.len(), path = %combined.display(), "combined voice archive written");
        Ok(combined)
    }

    fn combined_is_stale(&self, combined: &Path) -> Result<bool> {
        let combined_mtime = std::fs::metadata(combined)?.modified()?;
        for entry in std::fs::read_dir(&self.voices_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("bin")
                && std::fs::metadata(&path)?.modified()? > combined_mtime
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn voices_dir(&self) -> &Path {
        &self.voices_dir
    }
}

/// Read a raw little-endian f32 file and normalize its shape to `(N, 256)`.
fn load_style_matrix(path: &Path) -> Result<NpyArray> {
    let bytes = std::fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(TtsError::InvalidShape {
            path: path.to_path_buf(),
            reason: format!("{} bytes is not a whole number of f32 values", bytes.len()),
        });
    }

    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let len = floats.len();

    let rows = if len == TILE_ROWS * STYLE_DIM {
        TILE_ROWS
    } else if len == 512 * STYLE_DIM {
        512
    } else if len == STYLE_DIM {
        // Single vector: tile it out. Quality may suffer; say so.
        warn!(path = %path.display(), "single style vector tiled to {TILE_ROWS} rows");
        let mut tiled = Vec::with_capacity(TILE_ROWS * STYLE_DIM);
        for _ in 0..TILE_ROWS {
            tiled.extend_from_slice(&floats);
        }
        return Ok(NpyArray { shape: vec![TILE_ROWS, STYLE_DIM], data: tiled });
    } else if len % STYLE_DIM == 0 && len >= STYLE_DIM {
        len / STYLE_DIM
    } else {
        return Err(TtsError::InvalidShape {
            path: path.to_path_buf(),
            reason: format!("{len} floats is not a multiple of {STYLE_DIM}"),
        });
    };

    Ok(NpyArray { shape: vec![rows, STYLE_DIM], data: floats })
}
