use std::any::Any;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("Insufficient capacity: {required} healthy node(s) required, {available} available")]
    InsufficientCapacity { required: usize, available: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Health sweep failed: {0}")]
    Monitor(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_capacity_message() {
        let err = ClusterError::InsufficientCapacity {
            required: 3,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient capacity: 3 healthy node(s) required, 1 available"
        );
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            ClusterError::Timeout(250).to_string(),
            "Operation timed out after 250ms"
        );
    }

    #[test]
    fn test_panic_message_variants() {
        let from_str: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(from_str.as_ref()), "boom");

        let from_string: Box<dyn Any + Send> = Box::new("kaboom".to_string());
        assert_eq!(panic_message(from_string.as_ref()), "kaboom");

        let other: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
