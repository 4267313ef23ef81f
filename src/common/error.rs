use thiserror::Error;

/// Everything that can go wrong while building or processing a job.
///
/// Configuration errors are fatal and never retried. Data errors are fatal
/// for one job; the message is left on the queue and redelivered by the
/// broker. Transient I/O errors are not retried in-process either, the
/// queue's redelivery is the retry mechanism.
#[derive(Debug, Error)]
pub enum JobError {
    // Configuration
    #[error("unsupported scheme '{0}', must be one of s3/http/https")]
    UnsupportedScheme(String),
    #[error("invalid source '{url}': {reason}")]
    InvalidSource { url: String, reason: String },
    #[error("unknown COG profile '{0}'")]
    UnknownProfile(String),

    // Data
    #[error("failed to parse job message: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("malformed notification envelope: {0}")]
    Envelope(String),
    #[error("option '{key}' must be a string, number or boolean")]
    InvalidOption { key: String },
    #[error("cog translation failed: {0}")]
    Translate(String),

    // Transient I/O
    #[error("download failed: {0}")]
    Download(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("queue error: {0}")]
    Queue(#[from] lapin::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
