//! Error types for the registry generator.
//!
//! Only failures that end a run live here. Per-file problems and contract
//! violations are recovered locally by the aggregator and never surface as a
//! [`CodegenError`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse error category, attached to log lines as a structured field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Config,
    Discovery,
    Render,
    Io,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Config => "config_error",
            ErrorCategory::Discovery => "discovery_error",
            ErrorCategory::Render => "render_error",
            ErrorCategory::Io => "io_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to walk source tree at {root:?}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to render registry template: {0}")]
    Template(String),

    #[error("rendered artifact does not parse as Rust: {0}")]
    RenderedInvalid(String),

    #[error("refusing to render an empty registry")]
    EmptyRegistry,

    #[error("failed to write artifact {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CodegenError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CodegenError::Config(_) | CodegenError::Pattern { .. } => ErrorCategory::Config,
            CodegenError::Walk { .. } => ErrorCategory::Discovery,
            CodegenError::Template(_)
            | CodegenError::RenderedInvalid(_)
            | CodegenError::EmptyRegistry => ErrorCategory::Render,
            CodegenError::Write { .. } | CodegenError::Read { .. } => ErrorCategory::Io,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CodegenError::Write {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = CodegenError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_errors_are_io_category() {
        let err = CodegenError::write(
            "src/generated/codec.g.rs",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.category(), ErrorCategory::Io);
        assert!(err.to_string().contains("codec.g.rs"));
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(CodegenError::EmptyRegistry.category().as_str(), "render_error");
        assert_eq!(
            CodegenError::Config("missing".to_string()).category(),
            ErrorCategory::Config
        );
    }
}
