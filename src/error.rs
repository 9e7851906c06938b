use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::frontmatter::FrontMatterError;

/// Failure while building one document, or the abort of a strict run.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },

    #[error("translation failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("model returned an empty translation")]
    EmptyResponse,

    #[error("strict mode: aborting after failure in {}: {source}", .path.display())]
    StrictAbort {
        path: PathBuf,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn front_matter(path: &Path, source: FrontMatterError) -> Self {
        Self::FrontMatter {
            path: path.to_path_buf(),
            source,
        }
    }
}
