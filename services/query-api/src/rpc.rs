//! Read-only JSON-RPC access to an EVM node.

use std::sync::atomic::{AtomicU64, Ordering};

use num_bigint::BigUint;
use reqwest::Url;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::abi::{self, strip_hex_prefix, Parameter};
use crate::error::{QueryError, QueryResult};

static JSON_RPC_ID: AtomicU64 = AtomicU64::new(1);

fn next_json_rpc_id() -> u64 {
    JSON_RPC_ID.fetch_add(1, Ordering::Relaxed)
}

/// Block context for a read. Defaults to the latest state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BlockTag {
    #[default]
    Latest,
    Earliest,
    Pending,
    Safe,
    Finalized,
    Number(u64),
}

impl BlockTag {
    pub fn parse(raw: &str) -> QueryResult<Self> {
        let invalid = || QueryError::MalformedRequest(format!("invalid block: {}", raw));
        match raw {
            "latest" => Ok(BlockTag::Latest),
            "earliest" => Ok(BlockTag::Earliest),
            "pending" => Ok(BlockTag::Pending),
            "safe" => Ok(BlockTag::Safe),
            "finalized" => Ok(BlockTag::Finalized),
            _ => match strip_hex_prefix(raw) {
                Some(digits) => u64::from_str_radix(digits, 16).map_err(|_| invalid()),
                None => raw.parse::<u64>().map_err(|_| invalid()),
            }
            .map(BlockTag::Number),
        }
    }

    fn to_param(&self) -> String {
        match self {
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Earliest => "earliest".to_string(),
            BlockTag::Pending => "pending".to_string(),
            BlockTag::Safe => "safe".to_string(),
            BlockTag::Finalized => "finalized".to_string(),
            BlockTag::Number(n) => format!("0x{:x}", n),
        }
    }
}

/// A client bound to one node endpoint, opened per inbound request.
#[derive(Clone, Debug)]
pub struct RpcConnection {
    client: reqwest::Client,
    endpoint: Url,
}

impl RpcConnection {
    pub fn connect(endpoint: &str) -> QueryResult<Self> {
        let connection_error = |message: String| QueryError::Connection {
            endpoint: endpoint.to_string(),
            message,
        };
        let url = Url::parse(endpoint).map_err(|err| connection_error(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(connection_error(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| connection_error(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: url,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub async fn code_at(&self, address: &[u8; 20], block: &BlockTag) -> QueryResult<Vec<u8>> {
        let result = self
            .request(
                "eth_getCode",
                json!([to_hex_prefixed(address), block.to_param()]),
            )
            .await?;
        data_from_result(&result)
    }

    pub async fn storage_at(
        &self,
        address: &[u8; 20],
        slot: &[u8; 32],
        block: &BlockTag,
    ) -> QueryResult<Vec<u8>> {
        let result = self
            .request(
                "eth_getStorageAt",
                json!([
                    to_hex_prefixed(address),
                    to_hex_prefixed(slot),
                    block.to_param()
                ]),
            )
            .await?;
        data_from_result(&result)
    }

    pub async fn call(
        &self,
        address: &[u8; 20],
        data: &[u8],
        block: &BlockTag,
    ) -> QueryResult<Vec<u8>> {
        let result = self
            .request(
                "eth_call",
                json!([
                    {
                        "to": to_hex_prefixed(address),
                        "data": to_hex_prefixed(data),
                    },
                    block.to_param()
                ]),
            )
            .await?;
        data_from_result(&result)
    }

    /// Encode `method_name(params...)` and run it as a view call.
    pub async fn view_call(
        &self,
        address: &[u8; 20],
        method_name: &str,
        params: &[Parameter],
        block: &BlockTag,
    ) -> QueryResult<Vec<u8>> {
        let data = abi::encode_call(method_name, params)?;
        debug!(
            method = method_name,
            data = %to_hex_prefixed(&data),
            "prepared view call"
        );
        self.call(address, &data, block).await
    }

    pub async fn balance_at(&self, address: &[u8; 20], block: &BlockTag) -> QueryResult<BigUint> {
        let result = self
            .request(
                "eth_getBalance",
                json!([to_hex_prefixed(address), block.to_param()]),
            )
            .await?;
        quantity_from_result(&result)
    }

    async fn request(&self, method: &'static str, params: Value) -> QueryResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": next_json_rpc_id(),
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| QueryError::Connection {
                endpoint: self.endpoint.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        let value: Value = response
            .json()
            .await
            .map_err(|err| QueryError::InvalidRpcResponse {
                operation: method,
                message: format!("http {}: {}", status, err),
            })?;

        if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32_000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            warn!(method, code, %message, "node rejected request");
            return Err(QueryError::Rpc {
                operation: method,
                code,
                message,
            });
        }

        value
            .get("result")
            .cloned()
            .ok_or(QueryError::RpcResultTypeMismatch { expected: "result" })
    }
}

fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn data_from_result(value: &Value) -> QueryResult<Vec<u8>> {
    let raw = value.as_str().ok_or(QueryError::RpcResultTypeMismatch {
        expected: "hex string",
    })?;
    let digits = strip_hex_prefix(raw).ok_or_else(|| QueryError::HexDecodeFailed {
        value: raw.to_string(),
    })?;
    hex::decode(digits).map_err(|_| QueryError::HexDecodeFailed {
        value: raw.to_string(),
    })
}

fn quantity_from_result(value: &Value) -> QueryResult<BigUint> {
    let raw = value.as_str().ok_or(QueryError::RpcResultTypeMismatch {
        expected: "hex quantity",
    })?;
    let invalid = || QueryError::HexDecodeFailed {
        value: raw.to_string(),
    };
    let digits = strip_hex_prefix(raw).ok_or_else(invalid)?;
    if digits.is_empty() {
        return Ok(BigUint::default());
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(invalid)
}
