use std::path::PathBuf;

/// Errors that can occur when loading configuration or spec files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No `.config/pgconverge.styx` found in any parent directory
    #[error("no .config/pgconverge.styx found in current directory or any parent")]
    NotFound,

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parse error in the Styx file
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// The file parsed but describes something invalid
    #[error("invalid {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: pgconverge::Error,
    },
}
