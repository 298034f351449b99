// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for protocol calls.
//!
//! Every protocol operation returns [`Result`]. Errors are plain values: the
//! adapter never retries internally, and a caller receiving
//! [`Error::NotValidated`] is expected to validate again.

/// Errors returned by display, layer and device operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// The display id is unknown, or the display cannot service the call.
    #[error("bad display")]
    BadDisplay,
    /// The layer id is unknown or belongs to another display.
    #[error("bad layer")]
    BadLayer,
    /// The config id is unknown, or no config is active.
    #[error("bad config")]
    BadConfig,
    /// A parameter is outside the accepted set.
    #[error("bad parameter")]
    BadParameter,
    /// The display is not in the validated state the call requires.
    #[error("display not validated")]
    NotValidated,
    /// The backend rejected the request or an id space was exhausted.
    #[error("no resources")]
    NoResources,
    /// The request is well-formed but not supported by this adapter.
    #[error("unsupported")]
    Unsupported,
}

/// Shorthand for results of protocol calls.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by a [`BackendCompositor`](crate::backend::BackendCompositor).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend refused the frame.
    #[error("backend rejected the frame: {0}")]
    Rejected(String),
    /// The backend device is gone.
    #[error("backend device lost")]
    DeviceLost,
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        log::warn!("backend call failed: {err}");
        Self::NoResources
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendError, Error};

    #[test]
    fn backend_errors_surface_as_no_resources() {
        let err: Error = BackendError::Rejected("too many layers".into()).into();
        assert_eq!(err, Error::NoResources);
        assert_eq!(Error::from(BackendError::DeviceLost), Error::NoResources);
    }

    #[test]
    fn messages_are_lowercase_phrases() {
        assert_eq!(Error::NotValidated.to_string(), "display not validated");
        assert_eq!(
            BackendError::Rejected("x".into()).to_string(),
            "backend rejected the frame: x"
        );
    }
}
