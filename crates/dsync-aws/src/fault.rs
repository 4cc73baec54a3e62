//! SDK error classification
//!
//! Every SDK failure is reduced to a [`Fault`] once and then mapped onto the
//! closed error enum of its service domain.

use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use dsync_core::error::{IdentityError, StorageError, TransferError};
use std::error::Error;

/// What went wrong, stripped of SDK types
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fault {
    /// The service answered with an error
    Service {
        code: Option<String>,
        message: String,
        status: u16,
    },
    /// No service response (connection, timeout, credentials...)
    Transport(String),
}

impl Fault {
    pub(crate) fn from_sdk<E>(err: &SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + Error + Send + Sync + 'static,
    {
        match err {
            SdkError::ServiceError(service) => Self::Service {
                code: service.err().code().map(str::to_string),
                message: service.err().message().unwrap_or_default().to_string(),
                status: service.raw().status().as_u16(),
            },
            other => Self::Transport(DisplayErrorContext(other).to_string()),
        }
    }

    /// Code, falling back to the HTTP status
    fn code(code: Option<&String>, status: u16) -> String {
        code.cloned().unwrap_or_else(|| status.to_string())
    }
}

pub(crate) fn identity_error(fault: Fault) -> IdentityError {
    match fault {
        Fault::Service {
            code,
            message,
            status,
        } => IdentityError::from_code(&Fault::code(code.as_ref(), status), message),
        Fault::Transport(detail) => IdentityError::Transport(detail),
    }
}

/// HEAD responses carry no body, so a missing code falls back to the status
pub(crate) fn storage_error(fault: Fault) -> StorageError {
    match fault {
        Fault::Service {
            code: Some(code),
            message,
            ..
        } => StorageError::from_code(&code, message),
        Fault::Service {
            code: None,
            message,
            status,
        } => StorageError::from_status(status, message),
        Fault::Transport(detail) => StorageError::Transport(detail),
    }
}

pub(crate) fn transfer_error(fault: Fault) -> TransferError {
    match fault {
        Fault::Service {
            code,
            message,
            status,
        } => TransferError::from_code(&Fault::code(code.as_ref(), status), message),
        Fault::Transport(detail) => TransferError::Transport(detail),
    }
}
