//! Error classification for retry decisions.

use std::io;

/// Transient conditions that are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientKind {
    Timeout,
    ConnectionReset,
    /// The remote side asked us to slow down (HTTP 429 or a local limiter).
    TooManyRequests,
    /// Any other network failure.
    Network,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransientKind::Timeout => write!(f, "timeout"),
            TransientKind::ConnectionReset => write!(f, "connection reset"),
            TransientKind::TooManyRequests => write!(f, "too many requests"),
            TransientKind::Network => write!(f, "network"),
        }
    }
}

/// Implemented by error types that can be fed to [`crate::Retry`].
///
/// An error is retryable when it maps to a [`TransientKind`] or when it
/// declares itself retryable by overriding [`Classify::is_retryable`].
pub trait Classify {
    fn transient_kind(&self) -> Option<TransientKind> {
        None
    }

    fn is_retryable(&self) -> bool {
        self.transient_kind().is_some()
    }
}

impl Classify for io::Error {
    fn transient_kind(&self) -> Option<TransientKind> {
        match self.kind() {
            io::ErrorKind::TimedOut => Some(TransientKind::Timeout),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                Some(TransientKind::ConnectionReset)
            }
            io::ErrorKind::ConnectionRefused | io::ErrorKind::BrokenPipe => {
                Some(TransientKind::Network)
            }
            _ => None,
        }
    }
}

/// Status codes that signal a transient remote condition.
pub fn classify_status(status: u16) -> Option<TransientKind> {
    match status {
        429 => Some(TransientKind::TooManyRequests),
        408 | 504 => Some(TransientKind::Timeout),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified_by_kind() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "peer hung up");
        assert_eq!(reset.transient_kind(), Some(TransientKind::ConnectionReset));
        assert!(reset.is_retryable());

        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(timeout.transient_kind(), Some(TransientKind::Timeout));

        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert!(!missing.is_retryable());
    }

    #[test]
    fn too_many_requests_is_transient() {
        assert_eq!(classify_status(429), Some(TransientKind::TooManyRequests));
        assert_eq!(classify_status(404), None);
        assert_eq!(classify_status(500), None);
    }
}
