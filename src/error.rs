use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the workflow controller.
///
/// None of these are fatal: after any of them the wizard stays at its
/// current step and the user can retry.
#[derive(Debug, Error)]
pub enum WizardError {
    /// A guard failed before anything was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A submission for this workflow is already outstanding.
    #[error("A submission is already in flight")]
    InFlight,

    /// The request failed or the progress channel dropped.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with an error.
    #[error("Server error: {0}")]
    Server(String),

    /// The progress channel sent something we could not understand.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<BackendError> for WizardError {
    fn from(err: BackendError) -> Self {
        if err.is_transport() {
            WizardError::Transport(err.to_string())
        } else {
            WizardError::Server(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_maps_to_server() {
        let err: WizardError = BackendError::Server {
            status: 409,
            message: "name taken".into(),
        }
        .into();
        assert!(matches!(err, WizardError::Server(_)));
        assert!(err.to_string().contains("name taken"));
    }

    #[test]
    fn io_error_maps_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: WizardError = BackendError::from(io).into();
        assert!(matches!(err, WizardError::Transport(_)));
    }

    #[test]
    fn validation_is_local() {
        let err = WizardError::Validation("cell size".into());
        assert_eq!(err.to_string(), "Validation error: cell size");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WizardError>();
    }
}
