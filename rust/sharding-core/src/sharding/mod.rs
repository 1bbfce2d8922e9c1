// rust/sharding-core/src/sharding/mod.rs

//! Sharding descriptor model.
//!
//! A [`ShardingDescriptor`] says how one value (or, for [`ShardingDescriptor::Tuple`],
//! each of several results) is laid out across the logical cores of a launch.
//! Descriptors arrive encoded as [`proto::OpSharding`] blobs and are converted
//! with `TryFrom`, which enforces the structural schema. Range checks against a
//! concrete core count happen later, in the partitioner and output validator,
//! because the same blob is valid or not depending on `num_cores`.

mod tile;

pub use tile::{ShapeMismatch, TileGrid, TileSlice};

use prost::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proto::{self, op_sharding};

/// Failure to turn an encoded sharding into a [`ShardingDescriptor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{0}")]
    Malformed(String),

    #[error("unsupported sharding kind {0}")]
    Unsupported(String),

    #[error("negative core id {0}")]
    NegativeCore(i64),
}

/// How a value is distributed across logical cores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShardingDescriptor {
    /// Identical copy on every core.
    Replicated,

    /// Entire value on a single core.
    Maximal { core: usize },

    /// Value split into a grid of tiles.
    ///
    /// `tile_dims[d]` is the number of tiles along dimension `d`; `device_order`
    /// lists the owning core of each tile in row-major grid order.
    Tiled {
        tile_dims: Vec<usize>,
        device_order: Vec<usize>,
    },

    /// One descriptor per result of a multi-result computation.
    Tuple { elements: Vec<ShardingDescriptor> },
}

impl ShardingDescriptor {
    /// Creates a tiled descriptor.
    pub fn tiled(tile_dims: Vec<usize>, device_order: Vec<usize>) -> Self {
        Self::Tiled {
            tile_dims,
            device_order,
        }
    }

    /// Creates a tuple descriptor.
    pub fn tuple(elements: Vec<ShardingDescriptor>) -> Self {
        Self::Tuple { elements }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Replicated => "replicated",
            Self::Maximal { .. } => "maximal",
            Self::Tiled { .. } => "tiled",
            Self::Tuple { .. } => "tuple",
        }
    }

    /// Returns the tile grid of a tiled descriptor.
    pub fn tile_grid(&self) -> Option<TileGrid<'_>> {
        match self {
            Self::Tiled {
                tile_dims,
                device_order,
            } => Some(TileGrid::new(tile_dims, device_order)),
            _ => None,
        }
    }

    /// Flattens tuples into per-result descriptors, in result-position order.
    pub fn leaves(&self) -> Vec<&ShardingDescriptor> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    /// Decodes a serialized `OpSharding` blob.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if the bytes are not a valid message or
    /// violate the descriptor schema, [`DecodeError::NegativeCore`] for a
    /// negative device id, and [`DecodeError::Unsupported`] for a sharding type
    /// this pass does not handle.
    pub fn decode(raw: &[u8]) -> std::result::Result<Self, DecodeError> {
        let message = proto::OpSharding::decode(raw)
            .map_err(|e| DecodeError::Malformed(format!("invalid OpSharding encoding: {}", e)))?;
        Self::try_from(message)
    }

    /// Serializes this descriptor as an `OpSharding` blob.
    pub fn encode(&self) -> Vec<u8> {
        proto::OpSharding::from(self).encode_to_vec()
    }
}

fn collect_leaves<'a>(sharding: &'a ShardingDescriptor, out: &mut Vec<&'a ShardingDescriptor>) {
    match sharding {
        ShardingDescriptor::Tuple { elements } => {
            for element in elements {
                collect_leaves(element, out);
            }
        }
        leaf => out.push(leaf),
    }
}

fn tile_dimensions(values: &[i64]) -> std::result::Result<Vec<usize>, DecodeError> {
    values
        .iter()
        .map(|&v| {
            usize::try_from(v)
                .map_err(|_| DecodeError::Malformed(format!("negative tile dimension: {}", v)))
        })
        .collect()
}

fn core_ids(values: &[i64]) -> std::result::Result<Vec<usize>, DecodeError> {
    values
        .iter()
        .map(|&v| usize::try_from(v).map_err(|_| DecodeError::NegativeCore(v)))
        .collect()
}

impl TryFrom<proto::OpSharding> for ShardingDescriptor {
    type Error = DecodeError;

    fn try_from(message: proto::OpSharding) -> std::result::Result<Self, DecodeError> {
        let kind = op_sharding::Type::try_from(message.r#type)
            .map_err(|_| DecodeError::Unsupported(format!("type {}", message.r#type)))?;

        match kind {
            op_sharding::Type::Replicated => Ok(Self::Replicated),
            op_sharding::Type::Maximal => {
                let devices = core_ids(&message.tile_assignment_devices)?;
                match devices.as_slice() {
                    [core] => Ok(Self::Maximal { core: *core }),
                    other => Err(DecodeError::Malformed(format!(
                        "maximal sharding must name exactly one device, found {}",
                        other.len()
                    ))),
                }
            }
            op_sharding::Type::Other => {
                if message.replicate_on_last_tile_dim {
                    return Err(DecodeError::Unsupported(
                        "partial replication on last tile dimension".to_string(),
                    ));
                }
                let tile_dims = tile_dimensions(&message.tile_assignment_dimensions)?;
                let device_order = core_ids(&message.tile_assignment_devices)?;
                if tile_dims.is_empty() {
                    return Err(DecodeError::Malformed(
                        "tiled sharding without tile dimensions".to_string(),
                    ));
                }
                if tile_dims.contains(&0) {
                    return Err(DecodeError::Malformed(format!(
                        "tile dimensions must be positive, got {:?}",
                        tile_dims
                    )));
                }
                let grid_size = tile_dims
                    .iter()
                    .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                    .ok_or_else(|| DecodeError::Malformed("tile grid size overflows".to_string()))?;
                if grid_size != device_order.len() {
                    return Err(DecodeError::Malformed(format!(
                        "tile grid {:?} has {} tiles but {} devices are assigned",
                        tile_dims,
                        grid_size,
                        device_order.len()
                    )));
                }
                Ok(Self::Tiled {
                    tile_dims,
                    device_order,
                })
            }
            op_sharding::Type::Tuple => {
                let elements = message
                    .tuple_shardings
                    .into_iter()
                    .map(Self::try_from)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Self::Tuple { elements })
            }
            op_sharding::Type::Manual => Err(DecodeError::Unsupported(kind.as_str_name().to_string())),
        }
    }
}

impl From<&ShardingDescriptor> for proto::OpSharding {
    fn from(sharding: &ShardingDescriptor) -> Self {
        let mut message = proto::OpSharding::default();
        match sharding {
            ShardingDescriptor::Replicated => {
                message.r#type = op_sharding::Type::Replicated as i32;
            }
            ShardingDescriptor::Maximal { core } => {
                message.r#type = op_sharding::Type::Maximal as i32;
                message.tile_assignment_dimensions = vec![1];
                message.tile_assignment_devices = vec![*core as i64];
            }
            ShardingDescriptor::Tiled {
                tile_dims,
                device_order,
            } => {
                message.r#type = op_sharding::Type::Other as i32;
                message.tile_assignment_dimensions = tile_dims.iter().map(|&d| d as i64).collect();
                message.tile_assignment_devices = device_order.iter().map(|&d| d as i64).collect();
            }
            ShardingDescriptor::Tuple { elements } => {
                message.r#type = op_sharding::Type::Tuple as i32;
                message.tuple_shardings = elements.iter().map(proto::OpSharding::from).collect();
            }
        }
        message
    }
}
