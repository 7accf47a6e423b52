//! Query-string parameters for each operation.
//!
//! Every operation declares its fields up front as a [`Field`] schema.
//! [`extract`] checks the schema against the request and reports every
//! missing required field at once; the typed parameter structs then parse
//! the values they need.

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigUint;

use crate::abi::{strip_hex_prefix, Parameter, WORD};
use crate::error::{QueryError, QueryResult};
use crate::rpc::BlockTag;

pub const METHOD_INPUTS: &str = "method-inputs";

/// Decoded query string, in request order. Repeated keys keep their first
/// value on lookup.
#[derive(Clone, Debug, Default)]
pub struct QueryPairs {
    pairs: Vec<(String, String)>,
}

impl QueryPairs {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryPairs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }
}

/// Present, non-empty values for the fields of one schema.
#[derive(Debug)]
pub struct Fields<'q> {
    query: &'q QueryPairs,
    values: BTreeMap<&'static str, &'q str>,
}

impl<'q> Fields<'q> {
    pub fn query(&self) -> &'q QueryPairs {
        self.query
    }

    pub fn required(&self, name: &'static str) -> QueryResult<&'q str> {
        self.optional(name)
            .ok_or_else(|| QueryError::MissingFields(vec![name.to_string()]))
    }

    pub fn optional(&self, name: &'static str) -> Option<&'q str> {
        self.values.get(name).copied()
    }
}

pub fn extract<'q>(query: &'q QueryPairs, schema: &[Field]) -> QueryResult<Fields<'q>> {
    let mut values = BTreeMap::new();
    let mut missing = Vec::new();
    for field in schema {
        match query.get(field.name).filter(|v| !v.is_empty()) {
            Some(value) => {
                values.insert(field.name, value);
            }
            None if field.required => missing.push(field.name.to_string()),
            None => {}
        }
    }
    if !missing.is_empty() {
        return Err(QueryError::MissingFields(missing));
    }
    Ok(Fields { query, values })
}

pub trait QueryParams: Sized {
    const SCHEMA: &'static [Field];

    fn from_fields(fields: &Fields<'_>) -> QueryResult<Self>;

    fn from_query(query: &QueryPairs) -> QueryResult<Self> {
        let fields = extract(query, Self::SCHEMA)?;
        Self::from_fields(&fields)
    }
}

/// Where a request should be sent: a registered chain, or an explicit
/// endpoint, at a given block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTarget {
    pub chain_id: String,
    pub json_rpc: Option<String>,
    pub block: BlockTag,
}

impl NodeTarget {
    fn from_fields(fields: &Fields<'_>) -> QueryResult<Self> {
        Ok(Self {
            chain_id: fields.required("chain-id")?.to_string(),
            json_rpc: fields.optional("json-rpc").map(str::to_string),
            block: fields
                .optional("block")
                .map(BlockTag::parse)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// An account address as given on the wire plus its decoded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountAddress {
    pub raw: String,
    pub bytes: [u8; 20],
}

impl AccountAddress {
    pub fn parse(field: &str, raw: &str) -> QueryResult<Self> {
        let digits = strip_hex_prefix(raw).unwrap_or(raw);
        let not_hex = || QueryError::MalformedRequest(format!("{} is not hex", field));
        if digits.len() != 40 {
            return Err(not_hex());
        }
        let decoded = hex::decode(digits).map_err(|_| not_hex())?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&decoded);
        Ok(Self {
            raw: raw.to_string(),
            bytes,
        })
    }
}

/// Parameters shared by `evm-contract-ext-code-size` and `evm-contract-code`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractParams {
    pub target: NodeTarget,
    pub address: AccountAddress,
}

impl QueryParams for ContractParams {
    const SCHEMA: &'static [Field] = &[
        Field::required("chain-id"),
        Field::optional("json-rpc"),
        Field::required("contract-address"),
        Field::optional("block"),
    ];

    fn from_fields(fields: &Fields<'_>) -> QueryResult<Self> {
        Ok(Self {
            target: NodeTarget::from_fields(fields)?,
            address: AccountAddress::parse(
                "contract address",
                fields.required("contract-address")?,
            )?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageParams {
    pub target: NodeTarget,
    pub address: AccountAddress,
    pub slot: [u8; WORD],
}

impl QueryParams for StorageParams {
    const SCHEMA: &'static [Field] = &[
        Field::required("chain-id"),
        Field::optional("json-rpc"),
        Field::required("contract-address"),
        Field::required("storage-at"),
        Field::optional("block"),
    ];

    fn from_fields(fields: &Fields<'_>) -> QueryResult<Self> {
        Ok(Self {
            target: NodeTarget::from_fields(fields)?,
            address: AccountAddress::parse(
                "contract address",
                fields.required("contract-address")?,
            )?,
            slot: parse_slot(fields.required("storage-at")?)?,
        })
    }
}

/// Storage slot as a decimal or `0x` hex integer, widened to 32 bytes.
pub fn parse_slot(raw: &str) -> QueryResult<[u8; WORD]> {
    let invalid = || QueryError::MalformedRequest(format!("could not parse slot: {}", raw));
    let (digits, radix) = match strip_hex_prefix(raw) {
        Some(hex_digits) => (hex_digits, 16),
        None => (raw, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }
    let value = BigUint::parse_bytes(digits.as_bytes(), radix).ok_or_else(invalid)?;
    let bytes = value.to_bytes_be();
    if bytes.len() > WORD {
        return Err(invalid());
    }
    let mut slot = [0u8; WORD];
    slot[WORD - bytes.len()..].copy_from_slice(&bytes);
    Ok(slot)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallViewParams {
    pub target: NodeTarget,
    pub address: AccountAddress,
    pub method_name: String,
    pub inputs: Vec<Parameter>,
}

impl QueryParams for CallViewParams {
    const SCHEMA: &'static [Field] = &[
        Field::required("chain-id"),
        Field::optional("json-rpc"),
        Field::required("contract-address"),
        Field::required("method-name"),
        Field::optional("block"),
    ];

    fn from_fields(fields: &Fields<'_>) -> QueryResult<Self> {
        Ok(Self {
            target: NodeTarget::from_fields(fields)?,
            address: AccountAddress::parse(
                "contract address",
                fields.required("contract-address")?,
            )?,
            method_name: fields.required("method-name")?.to_string(),
            inputs: method_inputs(fields.query()),
        })
    }
}

/// Collect `method-inputs[i][type]` / `method-inputs[i][value]` pairs.
///
/// Indices are scanned from 0 up to the number of distinct keys that start
/// with `method-inputs`. An index is kept when it has a non-empty type and a
/// value key; gaps are skipped.
pub fn method_inputs(query: &QueryPairs) -> Vec<Parameter> {
    let count = query
        .keys()
        .filter(|key| key.starts_with(METHOD_INPUTS))
        .collect::<BTreeSet<_>>()
        .len();

    (0..count)
        .filter_map(|index| {
            let type_name = query
                .get(&format!("{}[{}][type]", METHOD_INPUTS, index))
                .filter(|t| !t.is_empty())?;
            let value = query.get(&format!("{}[{}][value]", METHOD_INPUTS, index))?;
            Some(Parameter::new(type_name, value))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceParams {
    pub target: NodeTarget,
    pub address: AccountAddress,
}

impl QueryParams for BalanceParams {
    const SCHEMA: &'static [Field] = &[
        Field::required("chain-id"),
        Field::optional("json-rpc"),
        Field::required("address"),
        Field::optional("block"),
    ];

    fn from_fields(fields: &Fields<'_>) -> QueryResult<Self> {
        Ok(Self {
            target: NodeTarget::from_fields(fields)?,
            address: AccountAddress::parse("address", fields.required("address")?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73";

    #[test]
    fn every_missing_field_is_reported() {
        let query: QueryPairs = [("query", "evm-contract-data-at-memory"), ("chain-id", "")]
            .into_iter()
            .collect();
        assert_eq!(
            StorageParams::from_query(&query).unwrap_err(),
            QueryError::MissingFields(vec![
                "chain-id".into(),
                "contract-address".into(),
                "storage-at".into(),
            ])
        );
    }

    #[test]
    fn optional_fields_default() {
        let query: QueryPairs = [("chain-id", "1"), ("contract-address", CONTRACT)]
            .into_iter()
            .collect();
        let params = ContractParams::from_query(&query).unwrap();
        assert_eq!(params.target.chain_id, "1");
        assert_eq!(params.target.json_rpc, None);
        assert_eq!(params.target.block, BlockTag::Latest);
        assert_eq!(params.address.raw, CONTRACT);
        assert_eq!(hex::encode(params.address.bytes), CONTRACT[2..].to_lowercase());
    }

    #[test]
    fn block_and_endpoint_are_parsed() {
        let query: QueryPairs = [
            ("chain-id", "56"),
            ("address", CONTRACT),
            ("json-rpc", "https://binance.llamarpc.com"),
            ("block", "0x1234"),
        ]
        .into_iter()
        .collect();
        let params = BalanceParams::from_query(&query).unwrap();
        assert_eq!(
            params.target.json_rpc.as_deref(),
            Some("https://binance.llamarpc.com")
        );
        assert_eq!(params.target.block, BlockTag::Number(0x1234));
    }

    #[test]
    fn addresses_must_be_hex() {
        assert!(AccountAddress::parse("address", &CONTRACT[2..]).is_ok());
        for raw in ["0x1234", "0xzz143Ce32Fe78f1f7019d7d551a6402fC5350c73", "hello"] {
            assert_eq!(
                AccountAddress::parse("contract address", raw).unwrap_err(),
                QueryError::MalformedRequest("contract address is not hex".into())
            );
        }
    }

    #[test]
    fn slots() {
        let zero = parse_slot("0").unwrap();
        assert_eq!(zero, [0u8; 32]);

        let five = parse_slot("5").unwrap();
        assert_eq!(five[31], 5);
        assert_eq!(parse_slot("0x05").unwrap(), five);

        let max = format!("0x{}", "f".repeat(64));
        assert_eq!(parse_slot(&max).unwrap(), [0xff; 32]);
        assert!(parse_slot(&format!("0x1{}", "0".repeat(64))).is_err());
        assert!(parse_slot("-1").is_err());
        assert!(parse_slot("0x").is_err());
    }

    #[test]
    fn method_inputs_in_index_order() {
        let query: QueryPairs = [
            ("method-inputs[1][type]", "uint256"),
            ("method-inputs[1][value]", "100"),
            ("method-inputs[0][type]", "address"),
            ("method-inputs[0][value]", CONTRACT),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            method_inputs(&query),
            vec![
                Parameter::new("address", CONTRACT),
                Parameter::new("uint256", "100"),
            ]
        );
    }

    #[test]
    fn incomplete_method_inputs_are_skipped() {
        let query: QueryPairs = [
            ("method-inputs[0][type]", "string"),
            ("method-inputs[0][value]", ""),
            ("method-inputs[1][type]", "bool"),
            ("method-inputs[2][value]", "orphan"),
            ("method-inputs[3][type]", "bool"),
            ("method-inputs[3][value]", "true"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            method_inputs(&query),
            vec![Parameter::new("string", ""), Parameter::new("bool", "true")]
        );
    }

    #[test]
    fn call_view_requires_method_name() {
        let query: QueryPairs = [("chain-id", "1"), ("contract-address", CONTRACT)]
            .into_iter()
            .collect();
        assert_eq!(
            CallViewParams::from_query(&query).unwrap_err(),
            QueryError::MissingFields(vec!["method-name".into()])
        );
    }
}
