//! Error types: the internal `BridgeError` and the `FfiResult` codes returned
//! by every `awesome_utils_*` export that returns `i32`.

use crate::session::SessionState;

/// Errors produced by the session core and the transport seam.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("session not found: {0}")]
    UnknownSession(String),
    #[error("session {id} is {state:?}, cannot {op}")]
    WrongState {
        id: String,
        state: SessionState,
        op: &'static str,
    },
    #[error("session id already registered: {0}")]
    DuplicateSession(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    #[error("bridge is not initialized")]
    NotInitialized,
    #[error("transport rejected {0}")]
    Transport(String),
    #[error("managed library error: {0}")]
    Library(String),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error codes for the C ABI surface.
///
/// Host glue should check for `Ok` (0); everything else means the call had no effect.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResult {
    /// Success.
    Ok = 0,
    /// The session id does not resolve to a live session.
    UnknownSession = 1,
    /// A required argument was null or not valid UTF-8.
    InvalidArgument = 2,
    /// The session exists but is in the wrong state for the operation.
    WrongState = 3,
    /// The operation is intentionally not implemented.
    Unsupported = 4,
    /// `awesome_utils_initialize` has not been called, or `finalize` already ran.
    NotInitialized = 5,
    /// The managed transport refused the request.
    Transport = 6,
    /// An internal error occurred (logged via tracing).
    Internal = 7,
}

impl From<&BridgeError> for FfiResult {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::UnknownSession(_) => FfiResult::UnknownSession,
            BridgeError::WrongState { .. } => FfiResult::WrongState,
            BridgeError::InvalidArgument(_) | BridgeError::Config(_) => FfiResult::InvalidArgument,
            BridgeError::Unsupported(_) => FfiResult::Unsupported,
            BridgeError::NotInitialized => FfiResult::NotInitialized,
            BridgeError::Transport(_) => FfiResult::Transport,
            BridgeError::DuplicateSession(_) | BridgeError::Library(_) => FfiResult::Internal,
        }
    }
}

impl<T> From<Result<T>> for FfiResult {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => FfiResult::Ok,
            Err(ref e) => FfiResult::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(FfiResult::Ok as i32, 0);
        assert_eq!(FfiResult::UnknownSession as i32, 1);
        assert_eq!(FfiResult::Internal as i32, 7);
    }

    #[test]
    fn test_bridge_error_mapping() {
        let err = BridgeError::WrongState {
            id: "abc".into(),
            state: SessionState::Created,
            op: "send",
        };
        assert_eq!(FfiResult::from(&err), FfiResult::WrongState);
        assert_eq!(err.to_string(), "session abc is Created, cannot send");

        let ok: Result<()> = Ok(());
        assert_eq!(FfiResult::from(ok), FfiResult::Ok);

        let unsupported: Result<()> = Err(BridgeError::Unsupported("text frames"));
        assert_eq!(FfiResult::from(unsupported), FfiResult::Unsupported);
    }
}
