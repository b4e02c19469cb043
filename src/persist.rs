//! Atomic JSON persistence helpers.
//!
//! Every durable document in the engine (map definitions, feature class
//! contents, TMS configs) goes through [`write_json_atomic`]: the bytes are
//! written to a sibling temp file and renamed into place, so a crash
//! mid-save never leaves a partially written document behind.

use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::Path;

/// Serializes `value` to pretty JSON and atomically replaces `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Atomically replaces `path` with `bytes` via a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    log::debug!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Reads and deserializes a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
