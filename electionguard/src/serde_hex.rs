use num_bigint::BigUint;
use std::borrow::Cow;
use std::convert::TryInto;

pub use hex_buffer_serde::Hex;

// a single-purpose type for use in `#[serde(with)]`
pub enum BigUintHex {}

impl Hex<BigUint> for BigUintHex {
    type Error = String;

    fn create_bytes(value: &BigUint) -> Cow<[u8]> {
        value.to_bytes_be().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<BigUint, String> {
        Ok(BigUint::from_bytes_be(bytes))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum Bytes32Hex {}

impl Hex<[u8; 32]> for Bytes32Hex {
    type Error = String;

    fn create_bytes(value: &[u8; 32]) -> Cow<[u8]> {
        value[..].into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<[u8; 32], String> {
        bytes
            .try_into()
            .map_err(|_| format!("expected 32 bytes, found {}", bytes.len()))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum BytesHex {}

impl Hex<Vec<u8>> for BytesHex {
    type Error = String;

    fn create_bytes(value: &Vec<u8>) -> Cow<[u8]> {
        value[..].into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Vec<u8>, String> {
        Ok(bytes.to_vec())
    }
}
