// rust/sharding-core/src/attribute.rs

//! Sharding attribute lookup and decoding.
//!
//! Three well-known keys carry shardings:
//!
//! - [`SHARDING_ATTR`] holds one encoded descriptor on an individual operation.
//! - [`INPUT_SHARDING_ATTR`] holds an array with one encoded descriptor per
//!   operand of a launch.
//! - [`OUTPUT_SHARDING_ATTR`] holds either one encoded descriptor covering all
//!   results (a tuple when there are several) or an array with one encoded
//!   descriptor per result.
//!
//! Looking up an attribute never fails; decoding it is a separate, fallible
//! step so callers can apply their own default when the key is absent.

use std::collections::BTreeMap;

use crate::error::{Result, ShardingError};
use crate::sharding::{DecodeError, ShardingDescriptor};

/// Sharding of a single operation.
pub const SHARDING_ATTR: &str = "_XlaSharding";
/// Per-operand shardings of a launch.
pub const INPUT_SHARDING_ATTR: &str = "input_sharding_configuration";
/// Result shardings of a launch.
pub const OUTPUT_SHARDING_ATTR: &str = "output_sharding_configuration";

/// Attribute value attached to an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Bytes(Vec<u8>),
    String(String),
    Int(i64),
    Array(Vec<Attribute>),
}

impl Attribute {
    /// Attribute holding an encoded sharding.
    pub fn sharding(sharding: &ShardingDescriptor) -> Self {
        Self::Bytes(sharding.encode())
    }

    /// Array attribute with one encoded sharding per element.
    pub fn sharding_list<'a>(shardings: impl IntoIterator<Item = &'a ShardingDescriptor>) -> Self {
        Self::Array(shardings.into_iter().map(Self::sharding).collect())
    }

    /// Raw bytes of a bytes or string attribute.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Array(_) => "array",
        }
    }
}

/// Named attribute dictionary.
pub type Attributes = BTreeMap<String, Attribute>;

/// Anything that carries an attribute dictionary.
pub trait HasAttributes {
    fn attribute(&self, name: &str) -> Option<&Attribute>;
}

/// Returns the raw encoded sharding of an operation, if it has one.
///
/// The bytes are returned unchanged; use [`ShardingDescriptor::decode`] or
/// [`decode_sharding`] to interpret them.
pub fn parse_sharding_attribute(op: &dyn HasAttributes) -> Option<&[u8]> {
    op.attribute(SHARDING_ATTR).and_then(Attribute::as_bytes)
}

/// Decodes one encoded sharding, attaching operation and attribute context to
/// any failure.
///
/// # Errors
///
/// Returns `MalformedSharding` or `UnsupportedShardingKind`.
pub fn decode_sharding(op_name: &str, attribute: &str, raw: &[u8]) -> Result<ShardingDescriptor> {
    ShardingDescriptor::decode(raw).map_err(|e| decode_error(op_name, attribute, e))
}

fn decode_error(op_name: &str, attribute: &str, error: DecodeError) -> ShardingError {
    match error {
        DecodeError::Malformed(reason) => ShardingError::malformed(op_name, attribute, reason),
        DecodeError::Unsupported(kind) => ShardingError::unsupported(op_name, attribute, kind),
        negative @ DecodeError::NegativeCore(_) => {
            ShardingError::malformed(op_name, attribute, negative.to_string())
        }
    }
}

/// Decodes a single-blob attribute; a negative device id is reported as
/// `InvalidCoreId` against `num_cores`.
pub(crate) fn decode_attribute(
    num_cores: usize,
    op_name: &str,
    attribute: &str,
    value: &Attribute,
) -> Result<ShardingDescriptor> {
    let raw = value.as_bytes().ok_or_else(|| {
        ShardingError::malformed(
            op_name,
            attribute,
            format!("expected an encoded sharding, found {} attribute", value.type_name()),
        )
    })?;
    ShardingDescriptor::decode(raw).map_err(|e| match e {
        DecodeError::NegativeCore(core) => ShardingError::invalid_core(op_name, core, num_cores),
        other => decode_error(op_name, attribute, other),
    })
}

/// Decodes an array attribute with one encoded sharding per element.
pub(crate) fn decode_attribute_list(
    num_cores: usize,
    op_name: &str,
    attribute: &str,
    value: &Attribute,
) -> Result<Vec<ShardingDescriptor>> {
    match value {
        Attribute::Array(elements) => elements
            .iter()
            .map(|element| decode_attribute(num_cores, op_name, attribute, element))
            .collect(),
        other => Err(ShardingError::malformed(
            op_name,
            attribute,
            format!("expected an array of encoded shardings, found {} attribute", other.type_name()),
        )),
    }
}
