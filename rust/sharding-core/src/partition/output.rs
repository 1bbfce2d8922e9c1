// rust/sharding-core/src/partition/output.rs

use std::collections::HashSet;

use crate::attribute::{decode_attribute, decode_attribute_list, Attribute, OUTPUT_SHARDING_ATTR};
use crate::error::{Result, ShardingError};
use crate::graph::{Computation, TensorType};
use crate::sharding::{ShapeMismatch, ShardingDescriptor, TileGrid};

/// Extracts the per-result output sharding of a launch and checks it against
/// the core count.
///
/// Without an output sharding attribute every result is replicated.
///
/// # Errors
///
/// See [`validate_output_sharding`].
pub fn parse_and_validate_output_sharding(
    num_cores: usize,
    computation: &Computation,
) -> Result<Vec<ShardingDescriptor>> {
    validate_output_sharding(
        num_cores,
        &computation.name,
        computation.result_types.len(),
        computation.attributes.get(OUTPUT_SHARDING_ATTR),
    )
}

/// Decodes and validates an output sharding attribute.
///
/// The attribute is either a single encoded descriptor (a tuple when there is
/// more than one result) or an array with one encoded descriptor per result.
///
/// # Errors
///
/// Fails with `ResultCountMismatch`, `InvalidCoreId`, `TileGridSizeMismatch`,
/// `MalformedSharding` or `UnsupportedShardingKind`.
pub fn validate_output_sharding(
    num_cores: usize,
    op_name: &str,
    result_count: usize,
    output_sharding: Option<&Attribute>,
) -> Result<Vec<ShardingDescriptor>> {
    let Some(attribute) = output_sharding else {
        tracing::debug!(
            "'{}' has no {}; replicating {} results",
            op_name,
            OUTPUT_SHARDING_ATTR,
            result_count
        );
        return Ok(vec![ShardingDescriptor::Replicated; result_count]);
    };

    let shardings = match attribute {
        Attribute::Array(_) => decode_attribute_list(num_cores, op_name, OUTPUT_SHARDING_ATTR, attribute)?,
        _ => match decode_attribute(num_cores, op_name, OUTPUT_SHARDING_ATTR, attribute)? {
            ShardingDescriptor::Tuple { elements } => elements,
            single if result_count == 1 => vec![single],
            _ => return Err(ShardingError::result_count(op_name, result_count, 1)),
        },
    };

    if shardings.len() != result_count {
        return Err(ShardingError::result_count(op_name, result_count, shardings.len()));
    }

    for sharding in &shardings {
        validate_output_leaf(num_cores, op_name, sharding)?;
    }
    Ok(shardings)
}

/// Checks one result's sharding against the core count.
pub(crate) fn validate_output_leaf(
    num_cores: usize,
    op_name: &str,
    sharding: &ShardingDescriptor,
) -> Result<()> {
    match sharding {
        ShardingDescriptor::Replicated => Ok(()),
        ShardingDescriptor::Maximal { core } => {
            if *core >= num_cores {
                return Err(ShardingError::invalid_core(op_name, *core as i64, num_cores));
            }
            Ok(())
        }
        ShardingDescriptor::Tiled {
            tile_dims,
            device_order,
        } => {
            let grid = TileGrid::new(tile_dims, device_order);
            if !grid.is_consistent() {
                return Err(ShardingError::malformed(
                    op_name,
                    OUTPUT_SHARDING_ATTR,
                    format!(
                        "tile grid {:?} does not match {} devices",
                        tile_dims,
                        device_order.len()
                    ),
                ));
            }
            if let Some(&core) = device_order.iter().find(|&&core| core >= num_cores) {
                return Err(ShardingError::invalid_core(op_name, core as i64, num_cores));
            }
            let distinct: HashSet<usize> = device_order.iter().copied().collect();
            if grid.size() != num_cores || distinct.len() != num_cores {
                return Err(ShardingError::grid_size(op_name, grid.size(), num_cores));
            }
            Ok(())
        }
        ShardingDescriptor::Tuple { .. } => Err(ShardingError::unsupported(
            op_name,
            OUTPUT_SHARDING_ATTR,
            "nested tuple sharding",
        )),
    }
}

/// Whether `core_id` produces a value for a result with this sharding.
pub(crate) fn core_produces(core_id: usize, sharding: &ShardingDescriptor) -> bool {
    match sharding {
        ShardingDescriptor::Replicated => true,
        ShardingDescriptor::Maximal { core } => *core == core_id,
        ShardingDescriptor::Tiled { device_order, .. } => device_order.contains(&core_id),
        ShardingDescriptor::Tuple { .. } => false,
    }
}

/// Result types of the sub-computation running on `core_id`.
///
/// Replicated results keep their global type, maximal results appear only on
/// their owning core and tiled results shrink to one tile. Tuples are
/// flattened in result order.
///
/// # Errors
///
/// Fails with `ResultCountMismatch` if the sharding does not cover every
/// result, `InvalidCoreId` if `core_id` is outside `[0, num_cores)` or owns no
/// tile of a tiled result, and `IndivisibleShape` if a tiled dimension does
/// not split evenly.
pub fn output_types_for_logical_device(
    num_cores: usize,
    core_id: usize,
    op_name: &str,
    output_sharding: &[ShardingDescriptor],
    result_types: &[TensorType],
) -> Result<Vec<TensorType>> {
    if core_id >= num_cores {
        return Err(ShardingError::invalid_core(op_name, core_id as i64, num_cores));
    }
    let leaves: Vec<&ShardingDescriptor> = output_sharding.iter().flat_map(|s| s.leaves()).collect();
    if leaves.len() != result_types.len() {
        return Err(ShardingError::result_count(op_name, result_types.len(), leaves.len()));
    }

    let mut types = Vec::with_capacity(result_types.len());
    for (result_index, (sharding, ty)) in leaves.into_iter().zip(result_types).enumerate() {
        match sharding {
            ShardingDescriptor::Replicated => types.push(ty.clone()),
            ShardingDescriptor::Maximal { core } => {
                if *core == core_id {
                    types.push(ty.clone());
                }
            }
            ShardingDescriptor::Tiled {
                tile_dims,
                device_order,
            } => {
                let grid = TileGrid::new(tile_dims, device_order);
                if grid.position_of(core_id).is_none() {
                    return Err(ShardingError::invalid_core(op_name, core_id as i64, num_cores));
                }
                let shape = grid.tile_shape(&ty.shape).map_err(|mismatch| match mismatch {
                    ShapeMismatch::Rank { grid, shape } => ShardingError::malformed(
                        op_name,
                        OUTPUT_SHARDING_ATTR,
                        format!(
                            "result {}: tile grid of rank {} applied to {}-d result {}",
                            result_index, grid, shape, ty
                        ),
                    ),
                    ShapeMismatch::Indivisible { dim, size, tiles } => ShardingError::IndivisibleShape {
                        op: op_name.to_string(),
                        result_index,
                        dim,
                        size,
                        tiles,
                    },
                })?;
                types.push(ty.with_shape(shape));
            }
            ShardingDescriptor::Tuple { .. } => {
                return Err(ShardingError::unsupported(
                    op_name,
                    OUTPUT_SHARDING_ATTR,
                    "nested tuple sharding",
                ));
            }
        }
    }

    Ok(types)
}
