// rust/sharding-core/src/partition/remap.rs

use super::output::{core_produces, validate_output_leaf};
use crate::attribute::OUTPUT_SHARDING_ATTR;
use crate::error::{Result, ShardingError};
use crate::graph::{Computation, GraphBuilder, Location, OpKind, TensorType, ValueId};
use crate::sharding::{ShardingDescriptor, TileGrid};

/// Core whose copy stands in for a replicated result.
///
/// Replicated results are defined to be equal on every core; the lowest core
/// id is used so the choice is stable across runs.
pub const REPLICATED_SOURCE_CORE: usize = 0;

/// How one logical result is rebuilt.
enum Source<'a> {
    Direct(ValueId),
    Tiles {
        grid: TileGrid<'a>,
        tiles: Vec<ValueId>,
        tile_type: TensorType,
    },
}

/// Rebuilds the launch's logical results from the per-core results and
/// rewires their consumers.
///
/// `per_core_results[c]` is the ordered result list of core `c`, whose types
/// follow [`output_types_for_logical_device`](super::output_types_for_logical_device).
/// Tiled results are concatenated back into their global shape, innermost
/// split dimension first. Everything is checked before the first operation is
/// inserted.
///
/// # Errors
///
/// Fails with `ResultCountMismatch` if a core produced the wrong number of
/// values, the sharding checks of the output validator, and `Graph` if a
/// per-core value has an unexpected type or the graph rejects an edit.
pub fn remap_outputs_from_logical_devices(
    graph: &mut dyn GraphBuilder,
    location: &Location,
    output_sharding: &[ShardingDescriptor],
    computation: &Computation,
    per_core_results: &[Vec<ValueId>],
) -> Result<Vec<ValueId>> {
    let op_name = computation.name.as_str();
    let num_cores = per_core_results.len();

    let leaves: Vec<&ShardingDescriptor> = output_sharding.iter().flat_map(|s| s.leaves()).collect();
    if leaves.len() != computation.results.len() || leaves.len() != computation.result_types.len() {
        return Err(ShardingError::result_count(
            op_name,
            computation.results.len(),
            leaves.len(),
        ));
    }
    for &sharding in &leaves {
        validate_output_leaf(num_cores, op_name, sharding)?;
    }
    for (core_id, results) in per_core_results.iter().enumerate() {
        let expected = leaves.iter().filter(|&&s| core_produces(core_id, s)).count();
        if results.len() != expected {
            return Err(ShardingError::result_count(
                format!("{} (core {})", op_name, core_id),
                expected,
                results.len(),
            ));
        }
    }

    // Walk results in order, advancing a cursor into each core's result list.
    let mut cursor = vec![0usize; num_cores];
    let mut take = |core: usize| {
        let value = per_core_results[core][cursor[core]];
        cursor[core] += 1;
        value
    };

    let mut sources = Vec::with_capacity(leaves.len());
    for (result_index, (&sharding, global)) in leaves.iter().zip(&computation.result_types).enumerate() {
        let source = match sharding {
            ShardingDescriptor::Replicated => {
                if num_cores == 0 {
                    return Err(ShardingError::invalid_core(
                        op_name,
                        REPLICATED_SOURCE_CORE as i64,
                        num_cores,
                    ));
                }
                let values: Vec<ValueId> = (0..num_cores).map(&mut take).collect();
                let value = values[REPLICATED_SOURCE_CORE];
                check_value_type(graph, value, global, op_name, REPLICATED_SOURCE_CORE, result_index)?;
                Source::Direct(value)
            }
            ShardingDescriptor::Maximal { core } => {
                let value = take(*core);
                check_value_type(graph, value, global, op_name, *core, result_index)?;
                Source::Direct(value)
            }
            ShardingDescriptor::Tiled {
                tile_dims,
                device_order,
            } => {
                let grid = TileGrid::new(tile_dims, device_order);
                let tiles: Vec<ValueId> = device_order.iter().map(|&core| take(core)).collect();
                let tile_type = expected_tile_type(&grid, global, op_name, result_index)?;
                for (&tile, &core) in tiles.iter().zip(device_order) {
                    check_value_type(graph, tile, &tile_type, op_name, core, result_index)?;
                }
                Source::Tiles {
                    grid,
                    tiles,
                    tile_type,
                }
            }
            ShardingDescriptor::Tuple { .. } => {
                return Err(ShardingError::unsupported(
                    op_name,
                    OUTPUT_SHARDING_ATTR,
                    "nested tuple sharding",
                ));
            }
        };
        sources.push(source);
    }

    let mut outputs = Vec::with_capacity(sources.len());
    for (result_index, source) in sources.into_iter().enumerate() {
        let value = match source {
            Source::Direct(value) => value,
            Source::Tiles {
                grid,
                tiles,
                tile_type,
            } => concat_tiles(graph, location, &grid, tiles, tile_type)?,
        };

        let original = computation.results[result_index];
        let rewired = graph.replace_all_uses(original, value)?;
        tracing::debug!(
            "'{}' result {} rebuilt as {} ({} uses rewired)",
            op_name,
            result_index,
            value,
            rewired
        );
        outputs.push(value);
    }

    Ok(outputs)
}

fn expected_tile_type(
    grid: &TileGrid<'_>,
    global: &TensorType,
    op_name: &str,
    result_index: usize,
) -> Result<TensorType> {
    let shape = grid.tile_shape(&global.shape).map_err(|mismatch| {
        ShardingError::graph(format!(
            "'{}' result {} of type {} cannot be tiled by {:?}: {:?}",
            op_name,
            result_index,
            global,
            grid.dims(),
            mismatch
        ))
    })?;
    Ok(global.with_shape(shape))
}

fn check_value_type(
    graph: &dyn GraphBuilder,
    value: ValueId,
    expected: &TensorType,
    op_name: &str,
    core: usize,
    result_index: usize,
) -> Result<()> {
    match graph.value_type(value) {
        Some(ty) if ty == expected => Ok(()),
        Some(ty) => Err(ShardingError::graph(format!(
            "'{}' core {} produced {} for result {}, expected {}",
            op_name, core, ty, result_index, expected
        ))),
        None => Err(ShardingError::graph(format!("unknown value {}", value))),
    }
}

/// Concatenates row-major tiles back into one value, undoing the nested
/// splits of the input partitioner.
fn concat_tiles(
    graph: &mut dyn GraphBuilder,
    location: &Location,
    grid: &TileGrid<'_>,
    mut tiles: Vec<ValueId>,
    tile_type: TensorType,
) -> Result<ValueId> {
    let mut shape = tile_type.shape.clone();

    for (dim, count) in grid.split_dims().into_iter().rev() {
        shape[dim] *= count;
        let joined = tile_type.with_shape(shape.clone());

        let mut next = Vec::with_capacity(tiles.len() / count);
        for group in tiles.chunks(count) {
            let op = graph.append_operation(
                location,
                OpKind::Concat { dim },
                group.to_vec(),
                vec![joined.clone()],
            )?;
            next.extend_from_slice(graph.results(op));
        }
        tiles = next;

        tracing::debug!("Concatenated {} tiles along dim {} into {}", count, dim, joined);
    }

    match tiles.as_slice() {
        [value] => Ok(*value),
        other => Err(ShardingError::graph(format!(
            "tile concatenation left {} values",
            other.len()
        ))),
    }
}
