use actors::PoolError;
use queue_core::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("invalid job: {0}")]
    Validation(#[from] ValidationError),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_their_message() {
        let err = ManagerError::from(ValidationError::MissingInput);
        assert_eq!(
            err.to_string(),
            "invalid job: payload must contain either 'article_id' or 'text'"
        );
    }
}
