use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported scene file '{}'", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("scene '{scene}' has no root node")]
    NoRootNode { scene: String },

    #[error("invalid skeleton: {message}")]
    InvalidSkeleton { message: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[cfg(feature = "json")]
    #[error("failed to parse scene JSON: {message}")]
    JsonParse { message: String },

    #[cfg(feature = "json")]
    #[error("unsupported scene format version {value}")]
    JsonSceneVersion { value: u32 },

    #[cfg(feature = "json")]
    #[error("duplicate node id {id}")]
    JsonDuplicateNode { id: u64 },

    #[cfg(feature = "json")]
    #[error("unknown node id {id} referenced by {context}")]
    JsonUnknownNode { context: String, id: u64 },

    #[cfg(feature = "json")]
    #[error("node '{node}' is parented to itself or one of its descendants")]
    JsonNodeCycle { node: String },

    #[cfg(feature = "json")]
    #[error("unknown material '{material}' referenced by node '{node}'")]
    JsonUnknownMaterial { node: String, material: String },

    #[cfg(feature = "json")]
    #[error("unsupported {field} '{value}' for {context}")]
    JsonUnsupportedMode {
        context: String,
        field: String,
        value: String,
    },

    #[cfg(feature = "json")]
    #[error("invalid mesh data for node '{node}': {message}")]
    JsonInvalidMesh { node: String, message: String },

    #[cfg(feature = "binary")]
    #[error("failed to parse cooked mesh: {message}")]
    BinaryParse { message: String },

    #[cfg(feature = "binary")]
    #[error("unsupported cooked mesh version {found} (expected {expected})")]
    BinaryVersion { found: u32, expected: u32 },
}
