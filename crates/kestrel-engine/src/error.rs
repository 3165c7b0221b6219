use std::path::PathBuf;

use crate::device::ShaderStage;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by engine operations.
///
/// Every fallible creation call reports failure through one of these variants
/// instead of handing out a resource; partially built resources are destroyed
/// before the error is returned.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The handle does not name a live resource of the expected kind.
    #[error("invalid {kind} handle {raw}")]
    InvalidHandle {
        /// Resource kind, e.g. `"entity"`.
        kind: &'static str,
        /// Raw handle value.
        raw: u32,
    },

    /// Growing a table or buffer failed.
    #[error("out of memory while growing {0}")]
    OutOfMemory(&'static str),

    /// The graphics backend refused to create an object.
    #[error("GPU failed to create {0}")]
    GpuObjectCreation(&'static str),

    /// A file could not be read or decoded.
    #[error("failed to load {path}: {reason}")]
    Asset {
        /// Path of the offending file.
        path: PathBuf,
        /// Reader or decoder message.
        reason: String,
    },

    /// A shader stage did not compile.
    #[error("{stage} stage failed to compile: {log}")]
    ShaderCompile {
        /// Stage that failed.
        stage: ShaderStage,
        /// Compiler output.
        log: String,
    },

    /// Vertex and fragment stages did not link into a program.
    #[error("shader program failed to link: {0}")]
    ShaderLink(String),

    /// The operation names an extension point that is not implemented.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// An argument is outside its accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
