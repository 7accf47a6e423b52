//! Operation dispatch: picks the operation named by `query`, runs it against
//! the node and shapes the JSON response.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::chains::ChainRegistry;
use crate::error::{ApiError, QueryError, QueryResult};
use crate::params::{
    BalanceParams, CallViewParams, ContractParams, NodeTarget, QueryPairs, QueryParams,
    StorageParams,
};
use crate::rpc::RpcConnection;

pub const VERSION: &str = concat!("EVM Query API v", env!("CARGO_PKG_VERSION"));

/// Shared, read-only state handed to every request.
#[derive(Clone, Debug)]
pub struct ApiState {
    registry: Arc<ChainRegistry>,
    allow_custom_rpc: bool,
}

impl ApiState {
    pub fn new(registry: ChainRegistry, allow_custom_rpc: bool) -> Self {
        Self {
            registry: Arc::new(registry),
            allow_custom_rpc,
        }
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    /// Open a connection to the explicit `json-rpc` endpoint if one was
    /// given, otherwise to the registered endpoint for the chain.
    fn connect(&self, target: &NodeTarget) -> QueryResult<RpcConnection> {
        let endpoint = match &target.json_rpc {
            Some(_) if !self.allow_custom_rpc => return Err(QueryError::CustomRpcDisabled),
            Some(endpoint) => endpoint.as_str(),
            None => self.registry.resolve(&target.chain_id)?.rpc_endpoint.as_str(),
        };
        debug!(chain_id = %target.chain_id, endpoint, "opening node connection");
        RpcConnection::connect(endpoint)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Version,
    ExtCodeSize,
    ContractCode,
    DataAtMemory,
    CallView,
    GetBalance,
}

impl Operation {
    pub fn from_discriminator(value: &str) -> Option<Self> {
        match value {
            "version" => Some(Operation::Version),
            "evm-contract-ext-code-size" | "ext-code-size" => Some(Operation::ExtCodeSize),
            "evm-contract-code" | "contract-code" => Some(Operation::ContractCode),
            "evm-contract-data-at-memory" | "data-at-memory" => Some(Operation::DataAtMemory),
            "evm-contract-call-view" | "call-view" => Some(Operation::CallView),
            "get-contract-balance" | "get-balance" => Some(Operation::GetBalance),
            _ => None,
        }
    }

    /// Name of the handler, reported as the `origin` of its errors.
    pub fn origin(&self) -> &'static str {
        match self {
            Operation::Version => concat!(module_path!(), "::version"),
            Operation::ExtCodeSize => concat!(module_path!(), "::ext_code_size"),
            Operation::ContractCode => concat!(module_path!(), "::contract_code"),
            Operation::DataAtMemory => concat!(module_path!(), "::data_at_memory"),
            Operation::CallView => concat!(module_path!(), "::call_view"),
            Operation::GetBalance => concat!(module_path!(), "::balance"),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ExtCodeSizeResponse {
    pub chain_id: String,
    pub contract_address: String,
    pub contract_size: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ContractCodeResponse {
    pub chain_id: String,
    pub contract_address: String,
    pub contract_size: String,
    pub contract_code: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DataAtMemoryResponse {
    pub chain_id: String,
    pub contract_address: String,
    pub bytes: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct CallViewResponse {
    pub chain_id: String,
    pub contract_address: String,
    pub method_name: String,
    pub response: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct BalanceResponse {
    pub chain_id: String,
    pub address: String,
    pub balance: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum QueryResponse {
    Version(VersionResponse),
    ExtCodeSize(ExtCodeSizeResponse),
    ContractCode(ContractCodeResponse),
    DataAtMemory(DataAtMemoryResponse),
    CallView(CallViewResponse),
    Balance(BalanceResponse),
}

pub async fn dispatch(state: &ApiState, query: &QueryPairs) -> Result<QueryResponse, ApiError> {
    let discriminator = query.get("query").unwrap_or_default();
    let Some(operation) = Operation::from_discriminator(discriminator) else {
        return Err(
            QueryError::MalformedRequest("Invalid query parameter".to_string())
                .raised_in(concat!(module_path!(), "::dispatch")),
        );
    };

    let result = match operation {
        Operation::Version => Ok(QueryResponse::Version(version())),
        Operation::ExtCodeSize => ext_code_size(state, query)
            .await
            .map(QueryResponse::ExtCodeSize),
        Operation::ContractCode => contract_code(state, query)
            .await
            .map(QueryResponse::ContractCode),
        Operation::DataAtMemory => data_at_memory(state, query)
            .await
            .map(QueryResponse::DataAtMemory),
        Operation::CallView => call_view(state, query).await.map(QueryResponse::CallView),
        Operation::GetBalance => balance(state, query).await.map(QueryResponse::Balance),
    };

    result.map_err(|err| err.raised_in(operation.origin()))
}

fn version() -> VersionResponse {
    VersionResponse {
        version: VERSION.to_string(),
    }
}

async fn ext_code_size(state: &ApiState, query: &QueryPairs) -> QueryResult<ExtCodeSizeResponse> {
    let params = ContractParams::from_query(query)?;
    let connection = state.connect(&params.target)?;
    let code = connection
        .code_at(&params.address.bytes, &params.target.block)
        .await?;

    Ok(ExtCodeSizeResponse {
        chain_id: params.target.chain_id,
        contract_address: params.address.raw,
        contract_size: code.len().to_string(),
    })
}

async fn contract_code(state: &ApiState, query: &QueryPairs) -> QueryResult<ContractCodeResponse> {
    let params = ContractParams::from_query(query)?;
    let connection = state.connect(&params.target)?;
    let code = connection
        .code_at(&params.address.bytes, &params.target.block)
        .await?;

    Ok(ContractCodeResponse {
        chain_id: params.target.chain_id,
        contract_address: params.address.raw,
        contract_size: code.len().to_string(),
        contract_code: hex::encode(code),
    })
}

async fn data_at_memory(
    state: &ApiState,
    query: &QueryPairs,
) -> QueryResult<DataAtMemoryResponse> {
    let params = StorageParams::from_query(query)?;
    let connection = state.connect(&params.target)?;
    let data = connection
        .storage_at(&params.address.bytes, &params.slot, &params.target.block)
        .await?;

    Ok(DataAtMemoryResponse {
        chain_id: params.target.chain_id,
        contract_address: params.address.raw,
        bytes: hex::encode(data),
    })
}

async fn call_view(state: &ApiState, query: &QueryPairs) -> QueryResult<CallViewResponse> {
    let params = CallViewParams::from_query(query)?;
    debug!(
        method = %params.method_name,
        inputs = ?params.inputs,
        "call-view parameters"
    );
    let connection = state.connect(&params.target)?;
    let result = connection
        .view_call(
            &params.address.bytes,
            &params.method_name,
            &params.inputs,
            &params.target.block,
        )
        .await?;

    Ok(CallViewResponse {
        chain_id: params.target.chain_id,
        contract_address: params.address.raw,
        method_name: params.method_name,
        response: hex::encode(result),
    })
}

async fn balance(state: &ApiState, query: &QueryPairs) -> QueryResult<BalanceResponse> {
    let params = BalanceParams::from_query(query)?;
    let connection = state.connect(&params.target)?;
    let balance = connection
        .balance_at(&params.address.bytes, &params.target.block)
        .await?;

    Ok(BalanceResponse {
        chain_id: params.target.chain_id,
        address: params.address.raw,
        balance: balance.to_string(),
    })
}
