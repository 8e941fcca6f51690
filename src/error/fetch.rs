//! This module contains errors pertaining to the retrieval of storage slot
//! values from a remote state provider.

use thiserror::Error;

/// Errors that abort the fetching of slot values.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Failed to get {slot_count} storage values for contract {contract} from {endpoint}: {cause}")]
    TransportFailure {
        contract:   String,
        slot_count: usize,
        endpoint:   String,
        cause:      Cause,
    },
}

/// The underlying reason a batch of slot values could not be retrieved.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Cause {
    #[error("request failed: {_0}")]
    Request(String),

    #[error("provider error {code}: {message}")]
    Provider { code: i64, message: String },

    #[error("provider returned an unexpected body: {_0}")]
    MalformedBody(String),

    #[error("requested {requested} storage slot values but got {received}")]
    ShortBatch { requested: usize, received: usize },

    #[error("response for unknown request id {_0:?}")]
    UnknownId(Option<u64>),

    #[error("response {id} has no result")]
    MissingResult { id: u64 },

    #[error("response {id} has malformed slot value {value:?}")]
    MalformedValue { id: u64, value: String },
}

/// The result type for methods that may have fetch errors.
pub type Result<T> = std::result::Result<T, Error>;
