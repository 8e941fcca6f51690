//! This module contains errors pertaining to the computation of a storage
//! layout from the class model.

use thiserror::Error;

use crate::layout::SectionId;

/// Errors that stop the layout of a contract from being computed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Failed to find contract with name \"{name}\"{}", in_file(.path))]
    ContractNotFound { name: String, path: Option<String> },

    #[error("Unsupported elementary type \"{type_string}\"")]
    UnsupportedType { type_string: String },

    #[error("Could not size fixed sized array with dimension \"{dimension}\" in \"{class_name}\"")]
    DimensionUnresolvable { dimension: String, class_name: String },

    #[error("Malformed type \"{type_string}\": {reason}")]
    MalformedType { type_string: String, reason: String },

    #[error("No storage section with id {id:?} exists in the layout")]
    UnknownSection { id: SectionId },
}

/// Renders the optional filename that a contract was searched for in.
fn in_file(path: &Option<String>) -> String {
    path.as_ref()
        .map(|p| format!(" in filename \"{p}\""))
        .unwrap_or_default()
}

/// The result type for methods that may have layout errors.
pub type Result<T> = std::result::Result<T, Error>;
