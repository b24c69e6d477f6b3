#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out")]
    Timeout,
    #[error("store call cancelled")]
    Cancelled,
    #[error("corrupt store value: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Connectivity faults are worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
