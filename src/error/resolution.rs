//! This module contains errors pertaining to the resolution of named types
//! against the class model.

use thiserror::Error;

/// Errors that occur when a type named in one class cannot be linked to the
/// class that declares it.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Failed to find user defined type \"{type_name}\" referenced from \"{class_name}\"")]
    UnresolvedType { type_name: String, class_name: String },

    #[error("Failed to find inherited contract \"{parent_name}\" of \"{class_path}\"")]
    UnresolvedParent { parent_name: String, class_path: String },
}

/// The result type for methods that may have resolution errors.
pub type Result<T> = std::result::Result<T, Error>;
