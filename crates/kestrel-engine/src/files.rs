//! File helpers.

use std::path::Path;

use crate::error::{EngineError, Result};

/// Reads a whole UTF-8 file.
pub fn read_text(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| EngineError::Asset {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Extension of `path` without the dot, if any.
///
/// `"sprite.vert.wgsl"` gives `"wgsl"`; dotfiles such as `".hidden"` have none.
pub fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}
