//! This module contains the slot value client, which reads the raw contents
//! of storage slots from a remote state provider.
//!
//! Reads are batched into a single JSON-RPC request per call, and memoised so
//! that a slot is only ever requested once per client.

pub mod cache;
pub mod rpc;

use std::fmt::{Display, Formatter};

use derivative::Derivative;
use itertools::Itertools;
use tracing::{debug, trace, warn};

pub use cache::SlotValueCache;
pub use rpc::{HttpTransport, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Transport};

use crate::{
    error::fetch::{Cause, Error, Result},
    layout::StorageSection,
    utility::U256Wrapper,
};

/// The block as of which storage is read.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum BlockTag {
    #[default]
    Latest,
    Number(u64),
}

impl Display for BlockTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Number(number) => write!(f, "{number:#x}"),
        }
    }
}

/// The configuration for reading slot values.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    /// The block as of which storage is read.
    ///
    /// Defaults to [`BlockTag::Latest`].
    pub block: BlockTag,
}

impl Config {
    /// Sets the `block` config parameter to `value`.
    #[must_use]
    pub fn with_block(mut self, value: BlockTag) -> Self {
        self.block = value;
        self
    }
}


/// Reads storage slot values of one contract, at one block, from one
/// endpoint.
///
/// The client owns the cache for that read session, so creating a new client
/// is the way to read a different block.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct SlotValueClient<T: Transport> {
    endpoint: String,
    contract: String,
    config:   Config,
    cache:    SlotValueCache,

    /// The sequence number of the next request.
    next_id: u64,

    #[derivative(Debug = "ignore")]
    transport: T,
}

impl<T: Transport> SlotValueClient<T> {
    /// Constructs a new client that reads the storage of `contract` from
    /// `endpoint` over `transport`, using the default configuration.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, contract: impl Into<String>, transport: T) -> Self {
        Self {
            endpoint: endpoint.into(),
            contract: contract.into(),
            config: Config::default(),
            cache: SlotValueCache::new(),
            next_id: 1,
            transport,
        }
    }

    /// Sets the configuration of the client.
    ///
    /// Anything cached so far is discarded, as it may belong to another block.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        if config.block != self.config.block {
            self.cache.clear();
        }
        self.config = config;
        self
    }

    /// Gets the configuration of the client.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gets the address of the contract whose storage is read.
    #[must_use]
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Gets the endpoint of the state provider.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Gets the values read so far.
    #[must_use]
    pub fn cache(&self) -> &SlotValueCache {
        &self.cache
    }

    /// Gets the transport that requests are sent over.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reads the values of the slots at `keys`, returned in the same order.
    ///
    /// Keys that have been read before are served from the cache, and the rest
    /// are requested in a single batch.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the batch could not be sent, or if any response in it
    /// is missing, failed or malformed. Nothing is cached in that case.
    pub async fn fetch(&mut self, keys: &[U256Wrapper]) -> Result<Vec<U256Wrapper>> {
        let misses = self.cache.misses(keys);
        if misses.is_empty() {
            trace!(count = keys.len(), "all slot values served from cache");
        } else {
            let values = self.request(&misses).await?;
            self.cache.extend(misses.into_iter().zip(values));
        }

        keys.iter()
            .map(|key| self.cache.get(key))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                let received = keys.iter().filter(|key| self.cache.contains(key)).count();
                self.failure(keys.len(), Cause::ShortBatch {
                    requested: keys.len(),
                    received,
                })
            })
    }

    /// Reads the value of the single slot at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the value could not be read.
    pub async fn fetch_one(&mut self, key: U256Wrapper) -> Result<U256Wrapper> {
        let values = self.fetch(&[key]).await?;
        values.into_iter().next().ok_or_else(|| {
            self.failure(1, Cause::ShortBatch {
                requested: 1,
                received:  0,
            })
        })
    }

    /// Requests the values of `slots`, which must not contain duplicates, in
    /// one batch.
    async fn request(&mut self, slots: &[U256Wrapper]) -> Result<Vec<U256Wrapper>> {
        let requests: Vec<_> = slots
            .iter()
            .map(|slot| {
                let id = self.next_id;
                self.next_id += 1;
                JsonRpcRequest::get_storage_at(id, &self.contract, *slot, self.config.block)
            })
            .collect();

        debug!(
            contract = %self.contract,
            endpoint = %self.endpoint,
            count = requests.len(),
            block = %self.config.block,
            "requesting storage slot values"
        );
        let mut responses = self
            .transport
            .send_batch(&self.endpoint, &requests)
            .await
            .map_err(|cause| self.failure(slots.len(), cause))?;

        if responses.len() != requests.len() {
            let cause = Cause::ShortBatch {
                requested: requests.len(),
                received:  responses.len(),
            };
            return Err(self.failure(slots.len(), cause));
        }

        // Providers are free to answer a batch in any order
        responses.sort_by_key(|response| response.id);
        requests
            .iter()
            .zip(responses)
            .map(|(request, response)| parse_response(request.id, response))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|cause| self.failure(slots.len(), cause))
    }

    /// Wraps `cause` with the context of this client.
    fn failure(&self, slot_count: usize, cause: Cause) -> Error {
        warn!(
            contract = %self.contract,
            endpoint = %self.endpoint,
            slot_count,
            %cause,
            "failed to read storage slot values"
        );
        Error::TransportFailure {
            contract: self.contract.clone(),
            slot_count,
            endpoint: self.endpoint.clone(),
            cause,
        }
    }
}

/// Extracts the slot value from the `response` to the request with `id`.
fn parse_response(id: u64, response: JsonRpcResponse) -> std::result::Result<U256Wrapper, Cause> {
    if response.id != Some(id) {
        return Err(Cause::UnknownId(response.id));
    }
    if let Some(error) = response.error {
        return Err(Cause::Provider {
            code:    error.code,
            message: error.message,
        });
    }

    let result = response.result.ok_or(Cause::MissingResult { id })?;
    result
        .as_str()
        .and_then(U256Wrapper::from_hex)
        .ok_or_else(|| Cause::MalformedValue {
            id,
            value: result.to_string(),
        })
}

/// Reads the raw values of every variable in `section` that should have its
/// value fetched and does not have one yet.
///
/// # Errors
///
/// Returns [`Err`] if the values could not be read, in which case no variable
/// is changed.
pub async fn add_slot_values<T: Transport>(
    section: &mut StorageSection,
    client: &mut SlotValueClient<T>,
) -> Result<()> {
    let slots: Vec<u64> = section
        .variables
        .iter()
        .filter(|v| v.should_fetch_value && v.raw_slot_value.is_none())
        .flat_map(|v| v.from_slot..=v.to_slot)
        .unique()
        .collect();
    if slots.is_empty() {
        return Ok(());
    }

    let keys: Vec<_> = slots.iter().map(|slot| section.slot_key(*slot)).collect();
    let values = client.fetch(&keys).await?;

    for (slot, value) in slots.into_iter().zip(values) {
        for variable in &mut section.variables {
            if variable.from_slot == slot {
                if variable.should_fetch_value {
                    variable.raw_slot_value = Some(value);
                }
            } else if variable.from_slot > slot {
                // Variables are ordered by slot, so none further on can match
                break;
            }
        }
    }

    Ok(())
}
