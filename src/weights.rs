//! Model weight persistence.
//!
//! Uses burn's native record format (NamedMpk, full precision) so a
//! trained model can be reloaded bit-exactly for inference.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

use crate::error::{ModelError, Result};

/// Extension burn's recorder appends to every weight file.
const EXTENSION: &str = "mpk";

fn record_path(path: &Path) -> PathBuf {
    path.with_extension(EXTENSION)
}

fn weights_error(path: &Path, message: impl ToString) -> ModelError {
    ModelError::Weights {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Save model weights; returns the path actually written (`.mpk` appended).
pub fn save<B: Backend, M: Module<B> + Clone>(model: &M, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| weights_error(path, e))?;

    let written = record_path(path);
    tracing::debug!(path = %written.display(), "saved model weights");
    Ok(written)
}

/// Load weights into `model`, which must have the same architecture.
///
/// A missing file is an error: inference must never silently run on
/// freshly initialized weights.
pub fn load<B: Backend, M: Module<B>>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M> {
    let path = path.as_ref();
    let full_path = record_path(path);
    if !full_path.exists() {
        return Err(weights_error(&full_path, "file not found"));
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let loaded = model
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| weights_error(&full_path, e))?;

    tracing::debug!(path = %full_path.display(), "loaded model weights");
    Ok(loaded)
}
