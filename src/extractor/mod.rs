//! This module contains the definition of the extractor itself.

pub mod state;

use tracing::info;

use crate::{
    decode,
    error,
    extractor::state::State,
    layout,
    layout::{expand_dynamic, StorageLayout},
    model::ClassUniverse,
    slots::{SlotValueClient, Transport},
};

/// Creates a new extractor over the classes in `universe`, using the default
/// layout configuration.
#[must_use]
pub fn new(universe: &ClassUniverse) -> Extractor<'_, state::HasUniverse> {
    Extractor {
        universe,
        state: state::HasUniverse {
            config: layout::Config::default(),
        },
    }
}

/// The core of the storage layout process, the `Extractor` is responsible for
/// taking a class universe and producing the storage layout of one contract in
/// it, optionally populated with the values currently in its storage.
///
/// # Enforcing Valid State Transitions
///
/// The extractor enforces that only correct state transitions can occur through
/// use of structs that implement the exact state required by it at any given
/// point. Values cannot be read before there is a layout to read them into,
/// and cannot be decoded before they have been read.
///
/// There is the [`Self::state`] function that provides access to the state data
/// of whichever state the extractor is currently in.
#[derive(Debug)]
pub struct Extractor<'u, S: State> {
    /// The classes that the contract and all of its types are drawn from.
    universe: &'u ClassUniverse,

    /// The internal state of the extractor.
    state: S,
}

/// The operations available in all states.
impl<'u, S: State> Extractor<'u, S> {
    /// Gets a reference to the class universe being used.
    #[must_use]
    pub fn universe(&self) -> &'u ClassUniverse {
        self.universe
    }

    /// Gets an immutable reference to the current state of the extractor.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Moves the extractor into `new_state`.
    fn with_state<NS: State>(self, new_state: NS) -> Extractor<'u, NS> {
        Extractor {
            universe: self.universe,
            state:    new_state,
        }
    }
}

/// Operations available on a newly-created extractor.
impl<'u> Extractor<'u, state::HasUniverse> {
    /// Sets the configuration used to build and expand the layout.
    #[must_use]
    pub fn with_config(mut self, config: layout::Config) -> Self {
        self.state.config = config;
        self
    }

    /// Executes the whole process from beginning to end for the contract
    /// called `contract_name`, performing all the intermediate steps
    /// automatically and returning the storage layout with decoded values.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if any step in the process fails.
    pub async fn extract<T: Transport>(
        self,
        contract_name: &str,
        path_hint: Option<&str>,
        client: &mut SlotValueClient<T>,
    ) -> error::Result<StorageLayout> {
        let extractor = self.build_layout(contract_name, path_hint)?;
        let extractor = extractor.fetch_values(client).await?;
        let extractor = extractor.decode();

        Ok(extractor.into_layout())
    }

    /// Computes the static storage layout of the contract called
    /// `contract_name`, disambiguated by `path_hint` if more than one contract
    /// has that name.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the contract cannot be found, or if any type in its
    /// storage cannot be resolved or sized.
    pub fn build_layout(
        self,
        contract_name: &str,
        path_hint: Option<&str>,
    ) -> error::Result<Extractor<'u, state::LayoutBuilt>> {
        let layout =
            layout::build_layout_with_config(contract_name, self.universe, path_hint, &self.state.config)?;
        info!(
            contract = contract_name,
            sections = layout.sections().len(),
            "built storage layout"
        );

        Ok(self.with_state(state::LayoutBuilt { layout }))
    }
}

/// Operations available on an extractor that has built a static layout.
impl<'u> Extractor<'u, state::LayoutBuilt> {
    /// Gets the static storage layout.
    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.state.layout
    }

    /// Consumes the extractor, returning the static storage layout.
    #[must_use]
    pub fn into_layout(self) -> StorageLayout {
        self.state.layout
    }

    /// Reads the storage of the contract through `client`, expanding every
    /// dynamic array and long `string` or `bytes` value whose length is read.
    ///
    /// The root section records the address of the contract that was read.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if any slot values could not be read. No partially read
    /// layout is returned.
    pub async fn fetch_values<T: Transport>(
        self,
        client: &mut SlotValueClient<T>,
    ) -> error::Result<Extractor<'u, state::ValuesFetched>> {
        let mut layout = self.state.layout;
        let root_id = layout.root_id();
        layout.section_mut(root_id)?.address = Some(client.contract().to_string());

        expand_dynamic(&mut layout, root_id, client).await?;
        info!(
            contract = client.contract(),
            sections = layout.sections().len(),
            cached = client.cache().len(),
            "read storage slot values"
        );

        Ok(Extractor {
            universe: self.universe,
            state:    state::ValuesFetched { layout },
        })
    }
}

/// Operations available on an extractor that has read slot values.
impl<'u> Extractor<'u, state::ValuesFetched> {
    /// Gets the storage layout with its raw slot values.
    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.state.layout
    }

    /// Decodes the raw slot value of every variable that has one to show.
    #[must_use]
    pub fn decode(self) -> Extractor<'u, state::Decoded> {
        let mut layout = self.state.layout;
        decode::decode_all(&mut layout);

        Extractor {
            universe: self.universe,
            state:    state::Decoded { layout },
        }
    }
}

/// Operations available on an extractor that has decoded its values.
impl<'u> Extractor<'u, state::Decoded> {
    /// Gets the final storage layout for the contract.
    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.state.layout
    }

    /// Consumes the extractor, returning the final storage layout.
    #[must_use]
    pub fn into_layout(self) -> StorageLayout {
        self.state.layout
    }
}
