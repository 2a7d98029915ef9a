use thiserror::Error;

/// The crate-wide error taxonomy. Each variant carries what a caller needs to
/// react to it rather than just a rendered message.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("collection '{collection}' is not indexed")]
    NotIndexed { collection: String },

    #[error("vector store error on collection '{collection}': {message}")]
    Store { collection: String, message: String },

    #[error("rate limit exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("secret detected in {file}, file skipped")]
    SecretDetected { file: String },
}

pub type Result<T> = std::result::Result<T, IndexError>;
