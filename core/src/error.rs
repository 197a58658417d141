use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed {provider} payload: {detail}")]
    Malformed { provider: String, detail: String },

    #[error("Unknown provider tag '{0}'")]
    UnknownProvider(String),

    #[error("Identity '{0}' not found")]
    IdentityNotFound(String),

    #[error("Transaction '{0}' not found")]
    TransactionNotFound(String),

    #[error("Queue item '{0}' not found")]
    QueueItemNotFound(String),

    #[error("Queue item '{0}' is already resolved")]
    QueueItemAlreadyResolved(String),

    #[error("Aggregate invariant violated for identity '{identity_id}': {detail}")]
    AggregateInvariant { identity_id: String, detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
