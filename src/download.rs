//! HuggingFace Hub asset download.
//!
//! Fetches `config.json`, the ONNX acoustic model, and the per-voice style
//! files from a model repository, validating the voice-file byte contract
//! before handing paths to the loaders. Files are cached by hf-hub
//! (`~/.cache/huggingface/hub` by default).

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use hf_hub::api::sync::Api;
use serde::Deserialize;
use tracing::{info, warn};

/// Bytes per style vector: 256 little-endian f32 values.
const STYLE_VECTOR_BYTES: u64 = 256 * 4;

/// Deserialized `config.json` from a model repository.
#[derive(Debug, Deserialize)]
pub struct RepoConfig {
    /// Filename of the ONNX model inside the repo.
    pub model_file: String,

    /// Repo-relative paths of the voice style files.
    #[serde(default)]
    pub voices: Vec<String>,

    /// Friendly-name → voice-name aliases.
    #[serde(default)]
    pub voice_aliases: HashMap<String, String>,

    /// Voice used when requests omit one.
    #[serde(default)]
    pub default_voice: Option<String>,
}

/// Everything startup needs from the repository.
#[derive(Debug)]
pub struct ModelAssets {
    pub model_path: PathBuf,
    /// `(voice_name, local_path)` pairs for every valid voice file.
    pub voice_paths: Vec<(String, PathBuf)>,
    pub aliases: HashMap<String, String>,
    pub default_voice: Option<String>,
}

fn fetch(api: &Api, repo_id: &str, filename: &str) -> Result<PathBuf> {
    api.model(repo_id.to_string())
        .get(filename)
        .with_context(|| format!("failed to download '{filename}' from '{repo_id}'"))
}

/// Validate the raw voice-file contract: non-empty, whole style vectors.
pub fn validate_voice_file(path: &Path) -> Result<()> {
    let len = std::fs::metadata(path)
        .with_context(|| format!("cannot stat voice file {}", path.display()))?
        .len();
    if len == 0 {
        bail!("voice file {} is empty", path.display());
    }
    if len % STYLE_VECTOR_BYTES != 0 {
        bail!(
            "voice file {} has {len} bytes, not a multiple of {STYLE_VECTOR_BYTES}",
            path.display()
        );
    }
    Ok(())
}

/// Download every asset named by the repo's `config.json`.
///
/// Voice failures are tolerated as long as at least one voice survives;
/// a missing model is fatal.
pub fn fetch_assets(repo_id: &str) -> Result<ModelAssets> {
    info!(repo_id, "fetching model assets");
    let api = Api::new().context("failed to initialize HuggingFace Hub client")?;

    let config_path = fetch(&api, repo_id, "config.json")?;
    let config_bytes = std::fs::read(&config_path)
        .with_context(|| format!("cannot read config: {}", config_path.display()))?;
    let config: RepoConfig =
        serde_json::from_slice(&config_bytes).context("failed to parse config.json")?;

    let model_path = fetch(&api, repo_id, &config.model_file)?;

    let mut voice_paths = Vec::new();
    for voice_file in &config.voices {
        let name = Path::new(voice_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(voice_file)
            .to_string();
        match fetch(&api, repo_id, voice_file).and_then(|path| {
            validate_voice_file(&path)?;
            Ok(path)
        }) {
            Ok(path) => voice_paths.push((name, path)),
            Err(e) => warn!(voice = %name, error = %e, "skipping voice"),
        }
    }

    if voice_paths.is_empty() && !config.voices.is_empty() {
        bail!("no usable voices in '{repo_id}' ({} listed, all failed)", config.voices.len());
    }

    info!(model = %model_path.display(), voices = voice_paths.len(), "assets ready");
    Ok(ModelAssets {
        model_path,
        voice_paths,
        aliases: config.voice_aliases,
        default_voice: config.default_voice,
    })
}

/// Copy downloaded voice files into the serving voices directory so the
/// voice manager owns a stable layout (`{voices_dir}/{name}.bin`).
pub fn install_voices(assets: &ModelAssets, voices_dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(voices_dir)?;
    let mut installed = 0;
    for (name, source) in &assets.voice_paths {
        let target = voices_dir.join(format!("{name}.bin"));
        if target.exists() {
            continue;
        }
        std::fs::copy(source, &target)
            .with_context(|| format!("cannot install voice '{name}'"))?;
        installed += 1;
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_file_validation() {
        let dir = tempfile::tempdir().expect("tempdir");

        let good = dir.path().join("good.bin");
        std::fs::write(&good, vec![0u8; 1024]).expect("write");
        assert!(validate_voice_file(&good).is_ok());

        let odd = dir.path().join("odd.bin");
        std::fs::write(&odd, vec![0u8; 1000]).expect("write");
        assert!(validate_voice_file(&odd).is_err());

        let empty = dir.path().join("empty.bin");
        std::fs::write(&empty, Vec::<u8>::new()).expect("write");
        assert!(validate_voice_file(&empty).is_err());
    }

    #[test]
    fn repo_config_parses_with_defaults() {
        let config: RepoConfig =
            serde_json::from_str(r#"{"model_file": "model.onnx"}"#).expect("parse");
        assert_eq!(config.model_file, "model.onnx");
        assert!(config.voices.is_empty());
        assert!(config.default_voice.is_none());
    }
}
