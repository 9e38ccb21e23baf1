//! Error types for secret storage.
//!
//! Backends report [`BackendError`], a thin wrapper over a native status code.
//! [`SecretStore`](crate::SecretStore) translates those into [`SecretError`],
//! the taxonomy callers match on. Translation depends on the operation: an
//! authentication status is only an authentication error on reads.

use lockbox_core::error::PolicyError;
use thiserror::Error;

use crate::status;

/// Errors returned by [`SecretStore`](crate::SecretStore) operations.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Authentication canceled by user")]
    AuthenticationCanceled,

    #[error("Access control creation failed: {0}")]
    AccessControlCreationFailed(String),

    #[error("Unsupported policy: {0}")]
    UnsupportedPolicy(String),

    #[error("Backend rejected request (status {code}): {message}")]
    BackendRejected { code: i32, message: String },

    #[error("Invalid text encoding: {0}")]
    InvalidEncoding(String),
}

impl SecretError {
    /// Native status code carried by the error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::NotFound(_) => Some(status::ITEM_NOT_FOUND),
            Self::AuthenticationFailed => Some(status::AUTH_FAILED),
            Self::AuthenticationCanceled => Some(status::USER_CANCELED),
            Self::BackendRejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this is a sharing-group mismatch passed through from the backend.
    pub fn is_group_mismatch(&self) -> bool {
        matches!(self, Self::BackendRejected { code, .. } if *code == status::GROUP_MISMATCH)
    }

    /// Translate a backend failure for the given operation.
    pub(crate) fn from_backend(op: Operation, subject: &str, err: BackendError) -> Self {
        match err {
            BackendError::Unsupported(msg) => Self::UnsupportedPolicy(msg),
            BackendError::AccessControl(msg) => Self::AccessControlCreationFailed(msg),
            BackendError::Status { code, message } => match (code, op.is_read()) {
                (status::ITEM_NOT_FOUND, _) if op != Operation::Write => {
                    Self::NotFound(subject.to_string())
                }
                (status::AUTH_FAILED, true) => Self::AuthenticationFailed,
                (status::USER_CANCELED, true) => Self::AuthenticationCanceled,
                _ => Self::BackendRejected { code, message },
            },
        }
    }
}

impl From<PolicyError> for SecretError {
    fn from(e: PolicyError) -> Self {
        Self::InvalidArgument(format!("malformed policy: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for SecretError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::InvalidEncoding(e.to_string())
    }
}

/// Convenience result alias for secret operations.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Which store operation a backend result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Write,
    Read,
    Erase,
    EraseAll,
    List,
}

impl Operation {
    /// Reads and enumeration are the only operations that challenge the user.
    fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::List)
    }
}

/// Failure reported by a [`Backend`](crate::backend::Backend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// A native status code with context.
    #[error("native status {code}: {message}")]
    Status { code: i32, message: String },

    /// The protection object for the requested policy could not be built.
    #[error("access control creation failed: {0}")]
    AccessControl(String),

    /// The backend cannot honor the requested protection.
    #[error("unsupported policy: {0}")]
    Unsupported(String),
}

impl BackendError {
    pub fn status(code: i32, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::status(status::ITEM_NOT_FOUND, format!("no entry for key '{key}'"))
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::status(status::AUTH_FAILED, message)
    }

    pub fn canceled() -> Self {
        Self::status(status::USER_CANCELED, "authentication canceled")
    }

    pub fn group_mismatch(message: impl Into<String>) -> Self {
        Self::status(status::GROUP_MISMATCH, message)
    }

    pub fn io(context: &str, e: std::io::Error) -> Self {
        Self::status(status::IO, format!("{context}: {e}"))
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::status(status::DECODE, message)
    }

    /// Native code, if this is a status error.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(status::ITEM_NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_on_read_and_erase() {
        for op in [Operation::Read, Operation::Erase, Operation::List] {
            let err = SecretError::from_backend(op, "k", BackendError::not_found("k"));
            assert!(err.is_not_found(), "{op:?}");
        }
    }

    #[test]
    fn test_not_found_on_write_is_passthrough() {
        let err = SecretError::from_backend(Operation::Write, "k", BackendError::not_found("k"));
        assert!(matches!(
            err,
            SecretError::BackendRejected { code: status::ITEM_NOT_FOUND, .. }
        ));
    }

    #[test]
    fn test_auth_statuses_only_map_on_reads() {
        let read = SecretError::from_backend(Operation::Read, "k", BackendError::auth_failed("x"));
        assert!(matches!(read, SecretError::AuthenticationFailed));

        let list = SecretError::from_backend(Operation::List, "ns", BackendError::canceled());
        assert!(matches!(list, SecretError::AuthenticationCanceled));

        let write =
            SecretError::from_backend(Operation::Write, "k", BackendError::auth_failed("x"));
        assert_eq!(write.code(), Some(status::AUTH_FAILED));
        assert!(matches!(write, SecretError::BackendRejected { .. }));
    }

    #[test]
    fn test_group_mismatch_passthrough() {
        let err = SecretError::from_backend(
            Operation::Read,
            "k",
            BackendError::group_mismatch("group b"),
        );
        assert!(err.is_group_mismatch());
        assert_eq!(err.code(), Some(-34018));
    }

    #[test]
    fn test_policy_kinds() {
        let err = SecretError::from_backend(
            Operation::Write,
            "k",
            BackendError::Unsupported("biometrics".into()),
        );
        assert!(matches!(err, SecretError::UnsupportedPolicy(_)));

        let err = SecretError::from_backend(
            Operation::Write,
            "k",
            BackendError::AccessControl("flags".into()),
        );
        assert!(matches!(err, SecretError::AccessControlCreationFailed(_)));
    }

    #[test]
    fn test_policy_error_is_invalid_argument() {
        let err: SecretError = PolicyError::EmptySharingGroup.into();
        assert!(matches!(err, SecretError::InvalidArgument(_)));
    }
}
