//! Error taxonomy for the IBL builders.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::backend::{ResourceState, TextureHandle};

/// Errors reported by a [`crate::backend::RenderBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to allocate {label}: {reason}")]
    Allocation { label: String, reason: String },

    #[error("unknown {0}")]
    UnknownHandle(TextureHandle),

    #[error("{handle} slice {slice} face {face} mip {mip} is {actual:?}, expected {expected:?}")]
    InvalidState {
        handle: TextureHandle,
        slice: u32,
        face: u32,
        mip: u32,
        expected: ResourceState,
        actual: ResourceState,
    },

    #[error("invalid draw or transition target: {0}")]
    InvalidTarget(String),

    #[error("device error: {0}")]
    Device(String),
}

/// A source panorama could not be turned into an [`crate::loader::EquirectImage`].
#[derive(Debug, Error)]
pub enum SourceLoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("{} contains no pixels", .path.display())]
    Empty { path: PathBuf },
}

impl SourceLoadError {
    pub fn path(&self) -> &Path {
        match self {
            SourceLoadError::Io { path, .. }
            | SourceLoadError::Decode { path, .. }
            | SourceLoadError::Empty { path } => path,
        }
    }
}

/// Top-level error of the IBL pipeline.
#[derive(Debug, Error)]
pub enum IblError {
    /// Recoverable: the job is dropped and the scheduler moves on.
    #[error(transparent)]
    SourceLoad(#[from] SourceLoadError),

    /// Fatal: the backend could not allocate a texture.
    #[error("failed to create {label}: {source}")]
    ResourceCreation {
        label: String,
        #[source]
        source: BackendError,
    },

    /// Fatal: a draw, transition or idle wait was rejected.
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("invalid IBL configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid scene footprint: {0}")]
    InvalidFootprint(String),

    #[error("grid cell ({col}, {row}) is outside the local grid")]
    InvalidGridCell { col: u32, row: u32 },

    #[error("IBL pipeline was aborted and can no longer build")]
    Aborted,
}

impl IblError {
    /// Whether this error tears down the whole pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IblError::ResourceCreation { .. } | IblError::Backend(_) | IblError::Aborted
        )
    }
}

pub type Result<T, E = IblError> = std::result::Result<T, E>;
