use thiserror::Error;

#[derive(Debug, Error)]
pub enum FanOutError {
    /// The batch never completed; no per-task results exist.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no available methods")]
    NoAvailableMethods,

    #[error("no remote endpoint URL is configured")]
    NotConfigured,

    /// An error the endpoint reported for a single invocation.
    #[error("{operation} failed remotely: {message}")]
    Remote { operation: String, message: String },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
