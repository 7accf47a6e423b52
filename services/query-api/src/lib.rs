//! Read-only HTTP gateway for EVM contract queries.
//!
//! A `query` discriminator on a GET request selects one of six operations:
//! the service version, contract code size, contract code, a raw storage
//! slot, a dynamically encoded view call, or an account balance. Node access
//! goes through JSON-RPC to an endpoint taken from the chain registry or
//! supplied with the request. Binary results are returned as unprefixed hex.

pub mod abi;
pub mod chains;
pub mod config;
pub mod error;
pub mod handler;
pub mod params;
pub mod rpc;
pub mod server;

pub use abi::{decode_parameter, decode_tuple, encode_call, AbiValue, ParamType, Parameter};
pub use chains::{ChainInfo, ChainRegistry};
pub use config::ServerConfig;
pub use error::{ApiError, QueryError, QueryResult};
pub use handler::{dispatch, ApiState, Operation, QueryResponse};
pub use rpc::{BlockTag, RpcConnection};
