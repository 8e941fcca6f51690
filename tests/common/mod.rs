//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use storage_layout_builder::{
    error::fetch::Cause,
    model::{ClassEntry, ClassUniverse},
    slots::{JsonRpcRequest, JsonRpcResponse, SlotValueClient, Transport},
    utility::U256Wrapper,
};

/// The address used for the contract whose storage is read in tests.
#[allow(unused)] // It is actually
pub const CONTRACT_ADDRESS: &str = "0x00000000000000000000000000000000000000c0";

/// Reads the class model stored as JSON in the file at the provided `path`.
#[allow(unused)] // It is actually
pub fn new_universe_from_file(path: impl Into<String>) -> anyhow::Result<ClassUniverse> {
    let path = path.into();
    let mut file = File::open(path).map_err(|_| anyhow!("File not available"))?;
    let mut contents = vec![];
    file.read_to_end(&mut contents)
        .map_err(|_| anyhow!("File could not be read"))?;

    let classes: Vec<ClassEntry> = serde_json::from_slice(contents.as_slice())
        .map_err(|e| anyhow!("Could not parse class model: {e}"))?;

    Ok(ClassUniverse::new(classes))
}

/// Constructs a new client over `transport` for the test contract.
#[allow(unused)] // It is actually
pub fn new_client(transport: MemoryTransport) -> SlotValueClient<MemoryTransport> {
    SlotValueClient::new("http://localhost:8545", CONTRACT_ADDRESS, transport)
}

/// Constructs the word for the small number `value`.
#[allow(unused)] // It is actually
pub fn word(value: u64) -> U256Wrapper {
    U256Wrapper::from(value)
}

/// Constructs a word holding `text` in the short form used for `string` and
/// `bytes` values of up to 31 bytes.
#[allow(unused)] // It is actually
pub fn short_string(text: &str) -> U256Wrapper {
    let mut word = [0u8; 32];
    word[..text.len()].copy_from_slice(text.as_bytes());
    word[31] = u8::try_from(text.len() * 2).unwrap_or_default();
    U256Wrapper::from_be_bytes(word)
}

/// An in-memory state provider for one contract that answers batches in
/// reverse order, and keeps count of the batches and slots it has served.
#[allow(unused)] // It is actually
#[derive(Debug, Default)]
pub struct MemoryTransport {
    storage:  HashMap<U256Wrapper, U256Wrapper>,
    batches:  AtomicUsize,
    requests: AtomicUsize,
}

impl MemoryTransport {
    /// Constructs an empty provider, where every slot reads as zero.
    #[allow(unused)] // It is actually
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` at the slot `key`.
    #[allow(unused)] // It is actually
    pub fn with_slot(mut self, key: U256Wrapper, value: U256Wrapper) -> Self {
        self.storage.insert(key, value);
        self
    }

    /// Gets the number of batches served.
    #[allow(unused)] // It is actually
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Gets the number of individual slot requests served.
    #[allow(unused)] // It is actually
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_batch(
        &self,
        _endpoint: &str,
        requests: &[JsonRpcRequest],
    ) -> Result<Vec<JsonRpcResponse>, Cause> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.requests.fetch_add(requests.len(), Ordering::SeqCst);

        requests
            .iter()
            .rev()
            .map(|request| {
                let slot = request.params[1]
                    .as_str()
                    .and_then(U256Wrapper::from_hex)
                    .ok_or_else(|| Cause::MalformedBody(request.params.to_string()))?;
                let value = self.storage.get(&slot).copied().unwrap_or_default();
                Ok(JsonRpcResponse::success(request.id, json!(value.to_hex())))
            })
            .collect()
    }
}
