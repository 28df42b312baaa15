//! Errors produced by the lock state machine and its stores

use keyward_common::KeywardError;

/// Failure of a lock store operation
///
/// `unlock` never reports stale or foreign tokens as errors; only store-level
/// failures surface from it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// One or more requested keys are held by another holder
    #[error("locked")]
    AlreadyLocked,

    /// A watched key changed between read and commit; nothing was written
    #[error("transaction aborted: a watched key was modified concurrently")]
    Conflict,

    /// The shared store could not be reached or answered with an error
    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<redis::RedisError> for LockError {
    fn from(value: redis::RedisError) -> Self {
        LockError::StoreUnavailable(value.to_string())
    }
}

impl From<LockError> for KeywardError {
    fn from(value: LockError) -> Self {
        match value {
            LockError::AlreadyLocked => KeywardError::Conflict(value.to_string()),
            LockError::Conflict => KeywardError::Conflict(value.to_string()),
            LockError::StoreUnavailable(message) => KeywardError::StoreUnavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_locked_message() {
        assert_eq!(LockError::AlreadyLocked.to_string(), "locked");
    }

    #[test]
    fn test_into_keyward_error() {
        let err: KeywardError = LockError::Conflict.into();
        assert_eq!(err.status(), 409);

        let err: KeywardError = LockError::StoreUnavailable("refused".to_string()).into();
        assert_eq!(err.status(), 503);
        assert_eq!(err.to_string(), "store unavailable: refused");
    }
}
