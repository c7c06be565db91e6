// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Ready-made retry predicates for [`RetryOptions::should_retry`][super::RetryOptions::should_retry].
//!
//! Transient failures (refused or reset connections, timeouts, `5xx` responses) are
//! worth retrying; anything else is treated as permanent.
//!
//! ```rust
//! use airbag::retry::{RetryOptions, predicates};
//!
//! let network = RetryOptions::<std::io::Error>::default().should_retry(predicates::network_error);
//! let timeouts = RetryOptions::<std::io::Error>::default().should_retry(predicates::timeout_only);
//! ```

use std::io;

use http::StatusCode;
use recoverable::{Recovery, RecoveryKind};

/// Returns `true` for I/O errors caused by an unreachable or misbehaving peer.
#[must_use]
pub fn network_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

/// Returns `true` for `5xx` status codes.
#[must_use]
pub fn server_error(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Returns `true` only for timeouts.
#[must_use]
pub fn timeout_only(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::TimedOut
}

/// Returns `true` when the error's [`Recovery`] classification is [`RecoveryKind::Retry`].
#[must_use]
pub fn recoverable<E: Recovery>(error: &E) -> bool {
    error.recovery().kind() == RecoveryKind::Retry
}

/// Transport-level view of an operation error, consumed by [`standard`].
///
/// Implement it for the error type of an HTTP client wrapper to get the standard
/// "network failure or server error" classification for free.
///
/// ```rust
/// use airbag::retry::predicates::{self, TransportFailure};
/// use http::StatusCode;
///
/// #[derive(Debug)]
/// enum RagError {
///     Io(std::io::Error),
///     Status(StatusCode),
/// }
///
/// impl TransportFailure for RagError {
///     fn io_error(&self) -> Option<&std::io::Error> {
///         match self {
///             Self::Io(e) => Some(e),
///             Self::Status(_) => None,
///         }
///     }
///
///     fn status(&self) -> Option<StatusCode> {
///         match self {
///             Self::Io(_) => None,
///             Self::Status(s) => Some(*s),
///         }
///     }
/// }
///
/// assert!(predicates::standard(&RagError::Status(StatusCode::BAD_GATEWAY)));
/// assert!(!predicates::standard(&RagError::Status(StatusCode::BAD_REQUEST)));
/// ```
pub trait TransportFailure {
    /// The underlying I/O error, if the failure happened at the transport level.
    fn io_error(&self) -> Option<&io::Error>;

    /// The response status, if the dependency answered.
    fn status(&self) -> Option<StatusCode> {
        None
    }
}

impl TransportFailure for io::Error {
    fn io_error(&self) -> Option<&io::Error> {
        Some(self)
    }
}

/// Network errors and server errors: the union of [`network_error`] and [`server_error`].
#[must_use]
pub fn standard<E: TransportFailure>(error: &E) -> bool {
    error.io_error().is_some_and(network_error) || error.status().is_some_and(server_error)
}
