use thiserror::Error;

/// Result type returned by the L1 client.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure; usually transient.
    #[error("network: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("parse: {0}")]
    Parse(String),

    /// The node returned a JSON-RPC error object.
    #[error("server returned error {0}: {1}")]
    Server(i32, String),

    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Whether a send failure actually means the node already holds the
    /// transaction, which counts as a successful broadcast.
    pub fn is_already_known(&self) -> bool {
        matches!(
            self,
            ClientError::Server(_, msg)
                if msg.contains("already known") || msg.contains("known transaction")
        )
    }
}
