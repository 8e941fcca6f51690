//! This module contains the primary error type for the library's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.

pub mod fetch;
pub mod layout;
pub mod resolution;

use thiserror::Error;

/// The interface result type for the library.
///
/// # Usage
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems should return the more-specific
/// child error types as appropriate.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by the
/// clients of the library) should be members of this enum.
///
/// Values that cannot be decoded are not errors. The decoder reports them by
/// leaving the decoded value of the variable empty.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// Errors that come from resolving named types through the import and
    /// inheritance graphs.
    #[error(transparent)]
    Resolution(#[from] resolution::Error),

    /// Errors from computing the sizes and positions of storage variables.
    #[error(transparent)]
    Layout(#[from] layout::Error),

    /// Errors from retrieving slot values from the state provider.
    #[error(transparent)]
    Fetch(#[from] fetch::Error),
}

impl Error {
    /// Checks if the error is structural, meaning the layout of the contract
    /// cannot be trusted at all.
    ///
    /// Errors that are not structural only affect the values read into an
    /// otherwise valid layout.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Resolution(_) | Self::Layout(_))
    }
}
