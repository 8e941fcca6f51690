//! This module contains the JSON-RPC wire types used to read storage slots,
//! and the transport seam over which batches of them are sent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use crate::{
    constant::{GET_STORAGE_AT_METHOD, JSON_RPC_VERSION},
    error::fetch::Cause,
    slots::BlockTag,
    utility::U256Wrapper,
};

/// A single JSON-RPC request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method:  String,
    pub params:  serde_json::Value,
    pub id:      u64,
}

impl JsonRpcRequest {
    /// Constructs a request, with sequence number `id`, for the value of `slot`
    /// in the storage of `contract` as of `block`.
    #[must_use]
    pub fn get_storage_at(id: u64, contract: &str, slot: U256Wrapper, block: BlockTag) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            method: GET_STORAGE_AT_METHOD.to_string(),
            params: json!([contract, slot.to_hex_quantity(), block.to_string()]),
            id,
        }
    }
}

/// A single JSON-RPC response.
///
/// Exactly one of `result` and `error` is expected to be set.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    /// The sequence number of the request being answered. Providers send
    /// `null` when the request itself could not be parsed.
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default)]
    pub result: Option<serde_json::Value>,

    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Constructs a successful response to the request with `id`.
    #[must_use]
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id:     Some(id),
            result: Some(result),
            error:  None,
        }
    }

    /// Constructs a failed response to the request with `id`.
    #[must_use]
    pub fn failure(id: Option<u64>, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// The error object of a failed JSON-RPC response.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code:    i64,
    pub message: String,
}

/// A means of sending a batch of JSON-RPC requests to a state provider.
///
/// Implementations return the responses in whatever order the provider sent
/// them, and need not check them beyond decoding.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `requests` to `endpoint` as a single batch.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the batch could not be sent, or if the provider
    /// rejected the batch as a whole.
    async fn send_batch(
        &self,
        endpoint: &str,
        requests: &[JsonRpcRequest],
    ) -> Result<Vec<JsonRpcResponse>, Cause>;
}

/// A transport that posts batches to an HTTP endpoint.
///
/// Timeouts and retries are those of the underlying [`reqwest::Client`].
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Constructs a new transport with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a new transport that sends through `client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// The body of a reply to a batch, which is a lone error object when the
/// provider rejects the batch as a whole.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchBody {
    Batch(Vec<JsonRpcResponse>),
    Single(JsonRpcResponse),
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_batch(
        &self,
        endpoint: &str,
        requests: &[JsonRpcRequest],
    ) -> Result<Vec<JsonRpcResponse>, Cause> {
        trace!(endpoint, count = requests.len(), "posting batch");
        let response = self
            .client
            .post(endpoint)
            .json(requests)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Cause::Request(e.to_string()))?;

        let body: BatchBody = response
            .json()
            .await
            .map_err(|e| Cause::MalformedBody(e.to_string()))?;

        match body {
            BatchBody::Batch(responses) => Ok(responses),
            BatchBody::Single(JsonRpcResponse {
                error: Some(error), ..
            }) => Err(Cause::Provider {
                code:    error.code,
                message: error.message,
            }),
            BatchBody::Single(_) => Err(Cause::MalformedBody(
                "expected an array of responses".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        slots::{
            rpc::{JsonRpcRequest, JsonRpcResponse},
            BlockTag,
        },
        utility::U256Wrapper,
    };

    #[test]
    fn encodes_storage_requests() -> anyhow::Result<()> {
        let request = JsonRpcRequest::get_storage_at(
            7,
            "0x00000000000000000000000000000000000000aa",
            U256Wrapper::from(26u64),
            BlockTag::Number(1_000),
        );

        assert_eq!(
            serde_json::to_value(&request)?,
            json!({
                "jsonrpc": "2.0",
                "method": "eth_getStorageAt",
                "params": ["0x00000000000000000000000000000000000000aa", "0x1a", "0x3e8"],
                "id": 7
            })
        );

        Ok(())
    }

    #[test]
    fn decodes_results_and_errors() -> anyhow::Result<()> {
        let body = r#"[
            { "jsonrpc": "2.0", "id": 2, "error": { "code": -32000, "message": "header not found" } },
            { "jsonrpc": "2.0", "id": 1, "result": "0x01" }
        ]"#;
        let responses: Vec<JsonRpcResponse> = serde_json::from_str(body)?;

        assert_eq!(responses[0], JsonRpcResponse::failure(Some(2), -32000, "header not found"));
        assert_eq!(responses[1], JsonRpcResponse::success(1, json!("0x01")));

        Ok(())
    }
}
