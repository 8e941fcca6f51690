//! This module contains the state tracking functionality for the extractor.

use std::fmt::Debug;

use crate::layout::{Config, StorageLayout};

/// A marker trait that says that the type implementing it is an extractor
/// state.
///
/// Extractor states can be transitioned between as part of the
/// [`crate::extractor::Extractor`] state machine, and are intended to enforce
/// that correct state transitions take place.
pub trait State
where
    Self: Debug + Sized,
{
}

/// The initial state for the extractor, which only has the class universe and
/// the configuration for the layout it will build.
#[derive(Debug)]
pub struct HasUniverse {
    /// The configuration that the layout is built and expanded with.
    pub config: Config,
}
impl State for HasUniverse {}

/// The extractor has computed the static storage layout of a contract.
#[derive(Debug)]
pub struct LayoutBuilt {
    /// The layout, with no slot values read.
    pub layout: StorageLayout,
}
impl State for LayoutBuilt {}

/// The extractor has read the slot values of the contract and expanded every
/// dynamic section whose length they revealed.
#[derive(Debug)]
pub struct ValuesFetched {
    /// The layout, with raw slot values.
    pub layout: StorageLayout,
}
impl State for ValuesFetched {}

/// The extractor has decoded the raw slot values, and is now ready to provide
/// the final storage layout.
#[derive(Debug)]
pub struct Decoded {
    /// The layout, with decoded slot values.
    pub layout: StorageLayout,
}
impl State for Decoded {}
