//! Failure taxonomy for an image build.
//!
//! Library functions return `anyhow::Result`; the failure points wrap the
//! underlying cause in an [`ImageError`] so the binary can pick an exit code
//! by downcasting.

use std::path::PathBuf;

use thiserror::Error;

use crate::process::CommandError;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("unknown model '{name}'; valid models are: {}", .valid.join(", "))]
    UnknownModel {
        name: String,
        valid: Vec<&'static str>,
    },

    #[error("failed to download {url}")]
    Fetch {
        url: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to build {what}")]
    Build {
        what: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to format {}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: CommandError,
    },

    #[error("failed to copy files into {}: {reason}", .path.display())]
    Copy {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<CommandError>,
    },

    #[error("failed to archive into {}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: CommandError,
    },

    #[error("failed to lay out {}: {reason}", .path.display())]
    Layout {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<CommandError>,
    },
}

impl ImageError {
    /// Process exit code reported for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownModel { .. } => 1,
            Self::Fetch { .. } => 3,
            Self::Build { .. } => 4,
            Self::Format { .. } | Self::Copy { .. } => 5,
            Self::Archive { .. } => 6,
            Self::Layout { .. } => 7,
        }
    }
}

/// Exit code for an arbitrary failure chain.
///
/// Looks for an [`ImageError`] anywhere in the chain, so context added on the
/// way up does not hide the category.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ImageError>())
        .map(ImageError::exit_code)
        .unwrap_or(1)
}
