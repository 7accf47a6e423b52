//! Loosely typed contract ABI encoding.
//!
//! Parameters arrive as `(type, value)` string pairs with no contract schema.
//! They are decoded into [`AbiValue`]s, then packed with the standard tuple
//! rules behind a 4-byte selector derived from the method signature.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tracing::debug;

use crate::error::{QueryError, QueryResult};

pub const WORD: usize = 32;
const ADDRESS_LEN: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    Uint256,
    Address,
    Bytes,
    Bool,
    String,
}

impl ParamType {
    pub fn parse(name: &str) -> QueryResult<Self> {
        match name {
            "uint256" => Ok(ParamType::Uint256),
            "address" => Ok(ParamType::Address),
            "bytes" => Ok(ParamType::Bytes),
            "bool" => Ok(ParamType::Bool),
            "string" => Ok(ParamType::String),
            other => Err(QueryError::UnsupportedType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Uint256 => "uint256",
            ParamType::Address => "address",
            ParamType::Bytes => "bytes",
            ParamType::Bool => "bool",
            ParamType::String => "string",
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ParamType::Bytes | ParamType::String)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiValue {
    Uint(BigUint),
    Address([u8; ADDRESS_LEN]),
    Bytes(Vec<u8>),
    Bool(bool),
    String(String),
}

impl AbiValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            AbiValue::Uint(_) => ParamType::Uint256,
            AbiValue::Address(_) => ParamType::Address,
            AbiValue::Bytes(_) => ParamType::Bytes,
            AbiValue::Bool(_) => ParamType::Bool,
            AbiValue::String(_) => ParamType::String,
        }
    }
}

/// A method argument as supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
        }
    }
}

/// Turn a raw string into a typed value for the named ABI type.
///
/// `bool` is permissive: only the exact string `"true"` is true and nothing
/// is rejected. `address` only checks that the digits are hex.
pub fn decode_parameter(type_name: &str, raw: &str) -> QueryResult<AbiValue> {
    match ParamType::parse(type_name)? {
        ParamType::Uint256 => parse_uint(raw).map(AbiValue::Uint),
        ParamType::Address => parse_address(raw).map(AbiValue::Address),
        ParamType::Bytes => parse_bytes(raw).map(AbiValue::Bytes),
        ParamType::Bool => Ok(AbiValue::Bool(raw == "true")),
        ParamType::String => Ok(AbiValue::String(raw.to_string())),
    }
}

fn parse_uint(raw: &str) -> QueryResult<BigUint> {
    let invalid = || QueryError::InvalidParameter {
        kind: "uint256",
        value: raw.to_string(),
    };
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    BigUint::parse_bytes(raw.as_bytes(), 10).ok_or_else(invalid)
}

fn parse_address(raw: &str) -> QueryResult<[u8; ADDRESS_LEN]> {
    let digits = strip_hex_prefix(raw).unwrap_or(raw);
    let bytes = if digits.len() % 2 == 1 {
        hex::decode(format!("0{}", digits))
    } else {
        hex::decode(digits)
    }
    .map_err(|_| QueryError::InvalidParameter {
        kind: "address",
        value: raw.to_string(),
    })?;

    let take = bytes.len().min(ADDRESS_LEN);
    let mut out = [0u8; ADDRESS_LEN];
    out[ADDRESS_LEN - take..].copy_from_slice(&bytes[bytes.len() - take..]);
    Ok(out)
}

fn parse_bytes(raw: &str) -> QueryResult<Vec<u8>> {
    let invalid = || QueryError::InvalidParameter {
        kind: "bytes",
        value: raw.to_string(),
    };
    let digits = raw.strip_prefix("0x").ok_or_else(invalid)?;
    hex::decode(digits).map_err(|_| invalid())
}

pub(crate) fn strip_hex_prefix(value: &str) -> Option<&str> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
}

pub fn keccak256(input: &[u8]) -> [u8; 32] {
    Keccak256::digest(input).into()
}

/// Canonical `name(type1,type2,...)` signature in parameter order.
pub fn method_signature(method_name: &str, params: &[Parameter]) -> String {
    let types: Vec<&str> = params.iter().map(|p| p.type_name.as_str()).collect();
    format!("{}({})", method_name, types.join(","))
}

pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Build `selector ‖ encoded arguments` for a view call.
pub fn encode_call(method_name: &str, params: &[Parameter]) -> QueryResult<Vec<u8>> {
    let signature = method_signature(method_name, params);
    let selector = function_selector(&signature);

    let values = params
        .iter()
        .map(|p| decode_parameter(&p.type_name, &p.value))
        .collect::<QueryResult<Vec<_>>>()?;

    let packed = if values.is_empty() {
        Vec::new()
    } else {
        debug!(%signature, ?values, "packing call parameters");
        encode_tuple(&values)?
    };

    let mut data = Vec::with_capacity(4 + packed.len());
    data.extend_from_slice(&selector);
    data.extend_from_slice(&packed);
    Ok(data)
}

/// Standard ABI tuple encoding: static values inline, dynamic values as an
/// offset in the head pointing at a length-prefixed tail segment.
pub fn encode_tuple(values: &[AbiValue]) -> QueryResult<Vec<u8>> {
    let head_len = values.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for value in values {
        match value {
            AbiValue::Uint(v) => head.extend_from_slice(&encode_uint(v)?),
            AbiValue::Address(addr) => head.extend_from_slice(&pad_left(addr, WORD)),
            AbiValue::Bool(flag) => head.extend_from_slice(&pad_left(&[*flag as u8], WORD)),
            AbiValue::Bytes(data) => {
                head.extend_from_slice(&encode_usize(head_len + tail.len()));
                tail.extend_from_slice(&encode_dynamic(data));
            }
            AbiValue::String(text) => {
                head.extend_from_slice(&encode_usize(head_len + tail.len()));
                tail.extend_from_slice(&encode_dynamic(text.as_bytes()));
            }
        }
    }

    head.extend_from_slice(&tail);
    Ok(head)
}

/// Inverse of [`encode_tuple`] for a known list of types.
pub fn decode_tuple(types: &[ParamType], data: &[u8]) -> QueryResult<Vec<AbiValue>> {
    if data.len() < types.len() * WORD {
        return Err(QueryError::Encoding(format!(
            "need {} head bytes, got {}",
            types.len() * WORD,
            data.len()
        )));
    }

    let mut values = Vec::with_capacity(types.len());
    for (index, ty) in types.iter().enumerate() {
        let word = read_word(data, index * WORD)?;
        let value = match ty {
            ParamType::Uint256 => AbiValue::Uint(BigUint::from_bytes_be(word)),
            ParamType::Address => {
                if word[..WORD - ADDRESS_LEN].iter().any(|b| *b != 0) {
                    return Err(QueryError::Encoding("address has dirty high bytes".into()));
                }
                let mut addr = [0u8; ADDRESS_LEN];
                addr.copy_from_slice(&word[WORD - ADDRESS_LEN..]);
                AbiValue::Address(addr)
            }
            ParamType::Bool => match word_to_usize(word)? {
                0 => AbiValue::Bool(false),
                1 => AbiValue::Bool(true),
                other => {
                    return Err(QueryError::Encoding(format!("invalid bool word {}", other)))
                }
            },
            ParamType::Bytes => AbiValue::Bytes(read_dynamic(data, word)?.to_vec()),
            ParamType::String => {
                let raw = read_dynamic(data, word)?.to_vec();
                let text = String::from_utf8(raw)
                    .map_err(|err| QueryError::Encoding(format!("invalid utf-8 string: {}", err)))?;
                AbiValue::String(text)
            }
        };
        values.push(value);
    }
    Ok(values)
}

fn read_word(data: &[u8], offset: usize) -> QueryResult<&[u8]> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| QueryError::Encoding(format!("word at offset {} out of range", offset)))
}

fn read_dynamic<'a>(data: &'a [u8], offset_word: &[u8]) -> QueryResult<&'a [u8]> {
    let offset = word_to_usize(offset_word)?;
    let len = word_to_usize(read_word(data, offset)?)?;
    let start = offset + WORD;
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| QueryError::Encoding(format!("dynamic segment of {} bytes truncated", len)))
}

fn word_to_usize(word: &[u8]) -> QueryResult<usize> {
    BigUint::from_bytes_be(word)
        .to_usize()
        .ok_or_else(|| QueryError::Encoding("length or offset out of range".into()))
}

fn pad_left(value: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len.saturating_sub(value.len())];
    out.extend_from_slice(value);
    out
}

fn encode_uint(value: &BigUint) -> QueryResult<Vec<u8>> {
    let bytes = value.to_bytes_be();
    if bytes.len() > WORD {
        return Err(QueryError::Encoding(format!(
            "value {} overflows uint256",
            value
        )));
    }
    Ok(pad_left(&bytes, WORD))
}

fn encode_usize(value: usize) -> Vec<u8> {
    pad_left(&(value as u64).to_be_bytes(), WORD)
}

fn encode_dynamic(data: &[u8]) -> Vec<u8> {
    let padded_len = data.len().div_ceil(WORD) * WORD;
    let mut out = encode_usize(data.len());
    out.extend_from_slice(data);
    out.resize(WORD + padded_len, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLDER: &str = "0x8965349fb649a33a30cbfda057d8ec2c48abe2a2";

    #[test]
    fn known_selectors() {
        assert_eq!(
            hex::encode(function_selector("transfer(address,uint256)")),
            "a9059cbb"
        );
        assert_eq!(
            hex::encode(function_selector("balanceOf(address)")),
            "70a08231"
        );
        assert_eq!(hex::encode(function_selector("totalSupply()")), "18160ddd");
    }

    #[test]
    fn selector_ignores_values() {
        let a = encode_call(
            "transfer",
            &[Parameter::new("address", HOLDER), Parameter::new("uint256", "100")],
        )
        .unwrap();
        let b = encode_call(
            "transfer",
            &[
                Parameter::new("address", "0x0000000000000000000000000000000000000001"),
                Parameter::new("uint256", "7"),
            ],
        )
        .unwrap();
        assert_eq!(&a[..4], &b[..4]);
        assert_eq!(hex::encode(&a[..4]), "a9059cbb");
        assert_eq!(a.len(), 4 + 2 * WORD);
    }

    #[test]
    fn transfer_call_layout() {
        let data = encode_call(
            "transfer",
            &[Parameter::new("address", HOLDER), Parameter::new("uint256", "100")],
        )
        .unwrap();
        let expected = format!(
            "a9059cbb{}{}{}{}",
            "0".repeat(24),
            &HOLDER[2..],
            "0".repeat(62),
            "64"
        );
        assert_eq!(hex::encode(data), expected);
    }

    #[test]
    fn zero_parameters_is_selector_only() {
        let data = encode_call("totalSupply", &[]).unwrap();
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn string_is_length_prefixed_tail() {
        let packed = encode_tuple(&[AbiValue::String("hello".into())]).unwrap();
        let expected = format!(
            "{}20{}05{}{}",
            "0".repeat(62),
            "0".repeat(62),
            "68656c6c6f",
            "0".repeat(54)
        );
        assert_eq!(hex::encode(packed), expected);
    }

    #[test]
    fn dynamic_offsets_follow_head() {
        let packed = encode_tuple(&[
            AbiValue::Bytes(vec![0xab; 33]),
            AbiValue::Bool(true),
            AbiValue::String("x".into()),
        ])
        .unwrap();
        // head is 3 words, first tail segment is 1 length word + 2 data words
        assert_eq!(word_to_usize(&packed[0..32]).unwrap(), 96);
        assert_eq!(word_to_usize(&packed[64..96]).unwrap(), 96 + 96);
        assert_eq!(packed.len(), 96 + 96 + 64);
    }

    #[test]
    fn bool_is_permissive() {
        assert_eq!(decode_parameter("bool", "true").unwrap(), AbiValue::Bool(true));
        for raw in ["True", "1", "yes", ""] {
            assert_eq!(decode_parameter("bool", raw).unwrap(), AbiValue::Bool(false));
        }
    }

    #[test]
    fn bytes_require_prefix_and_hex() {
        assert_eq!(
            decode_parameter("bytes", "0xdeadbeef").unwrap(),
            AbiValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert!(matches!(
            decode_parameter("bytes", "deadbeef"),
            Err(QueryError::InvalidParameter { kind: "bytes", .. })
        ));
        assert!(matches!(
            decode_parameter("bytes", "0xzz"),
            Err(QueryError::InvalidParameter { kind: "bytes", .. })
        ));
    }

    #[test]
    fn uint_must_be_decimal() {
        assert_eq!(
            decode_parameter("uint256", "1000").unwrap(),
            AbiValue::Uint(BigUint::from(1000u32))
        );
        for raw in ["", "-1", "0x10", "1_000", "12a"] {
            assert!(decode_parameter("uint256", raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn uint_overflow_fails_encoding() {
        let too_big = (BigUint::from(1u8) << 256usize).to_string();
        let err = encode_call("f", &[Parameter::new("uint256", too_big)]).unwrap_err();
        assert!(matches!(err, QueryError::Encoding(_)));
    }

    #[test]
    fn address_is_lenient_about_length() {
        let short = decode_parameter("address", "0x1").unwrap();
        let mut expected = [0u8; 20];
        expected[19] = 1;
        assert_eq!(short, AbiValue::Address(expected));

        let no_prefix = decode_parameter("address", &HOLDER[2..]).unwrap();
        assert_eq!(no_prefix, decode_parameter("address", HOLDER).unwrap());

        assert!(decode_parameter("address", "0xnothex").is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(
            decode_parameter("int8", "1"),
            Err(QueryError::UnsupportedType("int8".into()))
        );
        assert!(encode_call("f", &[Parameter::new("bytes32", "0x00")]).is_err());
    }

    #[test]
    fn values_survive_round_trip() {
        let params = [
            Parameter::new("uint256", "115792089237316195423570985008687907853269984665640564039457584007913129639935"),
            Parameter::new("address", HOLDER),
            Parameter::new("bytes", "0x0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f2021"),
            Parameter::new("bool", "true"),
            Parameter::new("string", "héllo, world"),
        ];
        let values: Vec<AbiValue> = params
            .iter()
            .map(|p| decode_parameter(&p.type_name, &p.value).unwrap())
            .collect();
        let types: Vec<ParamType> = values.iter().map(AbiValue::param_type).collect();

        let packed = encode_tuple(&values).unwrap();
        assert_eq!(decode_tuple(&types, &packed).unwrap(), values);

        let call = encode_call("f", &params).unwrap();
        assert_eq!(decode_tuple(&types, &call[4..]).unwrap(), values);
    }

    #[test]
    fn truncated_tuple_is_rejected() {
        let packed = encode_tuple(&[AbiValue::String("hello".into())]).unwrap();
        assert!(decode_tuple(&[ParamType::String], &packed[..70]).is_err());
        assert!(decode_tuple(&[ParamType::Uint256, ParamType::Bool], &packed[..32]).is_err());
    }

    fn oversized_word() -> Vec<u8> {
        let mut word = vec![0u8; 24];
        word.extend_from_slice(&[0xff; 8]);
        word
    }

    #[test]
    fn huge_offset_is_rejected() {
        let err = decode_tuple(&[ParamType::Bytes], &oversized_word()).unwrap_err();
        assert!(matches!(err, QueryError::Encoding(_)), "{err}");
    }

    #[test]
    fn huge_length_is_rejected() {
        let mut data = encode_usize(WORD);
        data.extend_from_slice(&oversized_word());
        let err = decode_tuple(&[ParamType::String], &data).unwrap_err();
        assert!(matches!(err, QueryError::Encoding(_)), "{err}");
    }

    #[test]
    fn dirty_address_word_is_rejected() {
        let mut word = vec![0u8; WORD];
        word[0] = 1;
        word[WORD - 1] = 0xaa;
        let err = decode_tuple(&[ParamType::Address], &word).unwrap_err();
        assert_eq!(err, QueryError::Encoding("address has dirty high bytes".into()));
    }

    #[test]
    fn bool_word_must_be_zero_or_one() {
        let err = decode_tuple(&[ParamType::Bool], &encode_usize(2)).unwrap_err();
        assert_eq!(err, QueryError::Encoding("invalid bool word 2".into()));
    }

    #[test]
    fn signature_preserves_order() {
        let params = [Parameter::new("address", HOLDER), Parameter::new("bool", "true")];
        assert_eq!(method_signature("approve", &params), "approve(address,bool)");
        assert_eq!(method_signature("name", &[]), "name()");
    }
}
