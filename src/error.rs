use thiserror::Error;

/// Crate-wide error type. Each variant maps to a fatal/non-fatal policy
/// documented alongside the call site that produces it.
#[derive(Debug, Error)]
pub enum RpmError {
    #[error("failed to fetch configuration: {0}")]
    ConfigFetch(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("dial error: {0}")]
    Dial(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("saturation timeout elapsed with no data")]
    SaturationTimeout,

    #[error("could not complete collection")]
    CollectionTimeout,

    #[error("could not open profile file: {0}")]
    ProfileOpen(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, RpmError>;
