pub mod builtins;
pub mod job;
pub mod path_resolver;
pub mod pipeline;

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}: command not found")]
    CommandNotFound(String),
    #[error("{0}: permission denied")]
    PermissionDenied(String),
    #[error("{0}: not allowed in a pipeline")]
    NotAllowedInPipeline(String),
    #[error("{target}: {source}")]
    Redirect { target: String, source: io::Error },
    #[error("failed to spawn {prog}: {source}")]
    Spawn { prog: String, source: io::Error },
    #[error("{0}")]
    Io(#[from] io::Error),
}
