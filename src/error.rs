use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the engine's public entry points.
///
/// Per-file and per-identifier problems are recovered where they happen and never show up
/// here; only conditions that abort a whole operation do.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Could not find a valid 'tsconfig.json' (searched upward from {})", searched_from.display())]
    ConfigNotFound { searched_from: PathBuf },

    #[error("invalid tsconfig {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("expansion cancelled")]
    Cancelled,

    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compiler service transport: {0}")]
    Transport(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Configuration errors abort startup; everything else is scoped to one request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigNotFound { .. } | EngineError::ConfigParse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_not_found_message_names_directory() {
        let err = EngineError::ConfigNotFound {
            searched_from: PathBuf::from("/work/app/src"),
        };
        let message = err.to_string();
        assert!(message.starts_with("Could not find a valid 'tsconfig.json'"));
        assert!(message.contains("/work/app/src"));
        assert!(err.is_fatal());
    }

    #[test]
    fn cancellation_is_not_fatal() {
        assert!(!EngineError::Cancelled.is_fatal());
        assert!(!EngineError::Transport("closed".to_string()).is_fatal());
    }
}
