// rust/sharding-core/src/partition/input.rs

use crate::attribute::{decode_attribute_list, Attribute, INPUT_SHARDING_ATTR};
use crate::error::{Result, ShardingError};
use crate::graph::{Computation, GraphBuilder, Location, OpKind, TensorType, ValueId};
use crate::sharding::{ShapeMismatch, ShardingDescriptor, TileGrid, TileSlice};

/// Where a single operand is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandPlacement {
    /// Same value on every core.
    AllCores,
    /// Whole value on one core.
    Core(usize),
    /// One split of the value per tile.
    Tiled {
        /// Operand type the slices were computed from.
        operand_type: TensorType,
        tile_dims: Vec<usize>,
        slices: Vec<TileSlice>,
    },
}

/// One entry of a core's operand list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreInput {
    /// Position of the operand in the launch's operand list.
    pub operand_index: usize,
    /// Value the core consumes: the operand itself or one of its splits.
    pub value: ValueId,
    /// Tile of the operand this value holds, for tiled operands.
    pub tile: Option<TileSlice>,
}

/// Ordered operand lists of every logical core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalDeviceInputs {
    per_core: Vec<Vec<CoreInput>>,
}

impl LogicalDeviceInputs {
    pub fn num_cores(&self) -> usize {
        self.per_core.len()
    }

    /// Operand list of one core; empty for an unknown core.
    pub fn core(&self, core_id: usize) -> &[CoreInput] {
        self.per_core.get(core_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Values consumed by one core, in order.
    pub fn values(&self, core_id: usize) -> Vec<ValueId> {
        self.core(core_id).iter().map(|input| input.value).collect()
    }

    pub fn into_inner(self) -> Vec<Vec<CoreInput>> {
        self.per_core
    }
}

/// Validated placement of every operand, computed without touching the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPlan {
    op_name: String,
    num_cores: usize,
    placements: Vec<OperandPlacement>,
}

impl InputPlan {
    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    pub fn placements(&self) -> &[OperandPlacement] {
        &self.placements
    }

    /// Builds the per-core operand lists, inserting split operations for tiled
    /// operands.
    ///
    /// # Errors
    ///
    /// Returns an error if the operand count differs from the plan, a tiled
    /// operand's graph type differs from the planned type, or the graph
    /// rejects an inserted operation. Type checks run before any split is
    /// inserted.
    pub fn materialize(
        &self,
        graph: &mut dyn GraphBuilder,
        location: &Location,
        operands: &[ValueId],
    ) -> Result<LogicalDeviceInputs> {
        if operands.len() != self.placements.len() {
            return Err(ShardingError::operand_count(
                self.op_name.as_str(),
                operands.len(),
                self.placements.len(),
            ));
        }

        for (operand_index, (&value, placement)) in operands.iter().zip(&self.placements).enumerate() {
            if let OperandPlacement::Tiled { operand_type, .. } = placement {
                match graph.value_type(value) {
                    Some(ty) if ty == operand_type => {}
                    Some(ty) => {
                        return Err(ShardingError::graph(format!(
                            "'{}' operand {} is {} in the graph but was planned as {}",
                            self.op_name, operand_index, ty, operand_type
                        )));
                    }
                    None => {
                        return Err(ShardingError::graph(format!(
                            "'{}' operand {} refers to unknown value {}",
                            self.op_name, operand_index, value
                        )));
                    }
                }
            }
        }

        let mut per_core: Vec<Vec<CoreInput>> = vec![Vec::new(); self.num_cores];

        for (operand_index, (&value, placement)) in operands.iter().zip(&self.placements).enumerate() {
            match placement {
                OperandPlacement::AllCores => {
                    for inputs in per_core.iter_mut() {
                        inputs.push(CoreInput {
                            operand_index,
                            value,
                            tile: None,
                        });
                    }
                }
                OperandPlacement::Core(core) => {
                    per_core[*core].push(CoreInput {
                        operand_index,
                        value,
                        tile: None,
                    });
                }
                OperandPlacement::Tiled {
                    operand_type,
                    tile_dims,
                    slices,
                } => {
                    let devices: Vec<usize> = slices.iter().map(|s| s.core).collect();
                    let grid = TileGrid::new(tile_dims, &devices);
                    let tiles = split_into_tiles(graph, location, value, operand_type, &grid)?;

                    for (tile_value, slice) in tiles.into_iter().zip(slices) {
                        per_core[slice.core].push(CoreInput {
                            operand_index,
                            value: tile_value,
                            tile: Some(slice.clone()),
                        });
                    }
                }
            }
        }

        Ok(LogicalDeviceInputs { per_core })
    }
}

/// Splits `value` into the tiles of `grid`, returned in row-major tile order.
///
/// One split operation is inserted per piece and per split dimension, outer
/// dimensions first. `ty` must be the checked type of `value`.
fn split_into_tiles(
    graph: &mut dyn GraphBuilder,
    location: &Location,
    value: ValueId,
    ty: &TensorType,
    grid: &TileGrid<'_>,
) -> Result<Vec<ValueId>> {
    let mut shape = ty.shape.clone();
    let mut tiles = vec![value];

    for (dim, num_splits) in grid.split_dims() {
        shape[dim] /= num_splits;
        let piece = ty.with_shape(shape.clone());

        let mut next = Vec::with_capacity(tiles.len() * num_splits);
        for tile in tiles {
            let op = graph.append_operation(
                location,
                OpKind::Split { dim, num_splits },
                vec![tile],
                vec![piece.clone(); num_splits],
            )?;
            next.extend_from_slice(graph.results(op));
        }
        tiles = next;

        tracing::debug!(
            "Split {} along dim {} into {} pieces of {}",
            value,
            dim,
            num_splits,
            piece
        );
    }

    Ok(tiles)
}

/// Validates the input sharding of a launch and decides where each operand goes.
///
/// Without an input sharding attribute every operand is placed on core 0 and
/// the other cores receive nothing.
///
/// # Errors
///
/// Fails with `OperandCountMismatch`, `InvalidCoreId`, `TileGridOverflow`,
/// `MalformedSharding` or `UnsupportedShardingKind`.
pub fn plan_inputs(
    num_cores: usize,
    op_name: &str,
    operand_types: &[TensorType],
    input_sharding: Option<&Attribute>,
) -> Result<InputPlan> {
    if num_cores == 0 {
        return Err(ShardingError::config("num_cores must be greater than 0"));
    }

    let Some(attribute) = input_sharding else {
        tracing::debug!(
            "'{}' has no {}; placing {} operands on core 0",
            op_name,
            INPUT_SHARDING_ATTR,
            operand_types.len()
        );
        return Ok(InputPlan {
            op_name: op_name.to_string(),
            num_cores,
            placements: vec![OperandPlacement::Core(0); operand_types.len()],
        });
    };

    let shardings = decode_attribute_list(num_cores, op_name, INPUT_SHARDING_ATTR, attribute)?;
    if shardings.len() != operand_types.len() {
        return Err(ShardingError::operand_count(
            op_name,
            operand_types.len(),
            shardings.len(),
        ));
    }

    let placements = shardings
        .iter()
        .zip(operand_types)
        .enumerate()
        .map(|(index, (sharding, ty))| place_operand(num_cores, op_name, index, sharding, ty))
        .collect::<Result<Vec<_>>>()?;

    Ok(InputPlan {
        op_name: op_name.to_string(),
        num_cores,
        placements,
    })
}

fn place_operand(
    num_cores: usize,
    op_name: &str,
    operand_index: usize,
    sharding: &ShardingDescriptor,
    ty: &TensorType,
) -> Result<OperandPlacement> {
    let placement = match sharding {
        ShardingDescriptor::Replicated => OperandPlacement::AllCores,
        ShardingDescriptor::Maximal { core } => {
            if *core >= num_cores {
                return Err(ShardingError::invalid_core(op_name, *core as i64, num_cores));
            }
            OperandPlacement::Core(*core)
        }
        ShardingDescriptor::Tiled {
            tile_dims,
            device_order,
        } => {
            let grid = TileGrid::new(tile_dims, device_order);
            if !grid.is_consistent() {
                return Err(ShardingError::malformed(
                    op_name,
                    INPUT_SHARDING_ATTR,
                    format!(
                        "operand {}: tile grid {:?} does not match {} devices",
                        operand_index,
                        tile_dims,
                        device_order.len()
                    ),
                ));
            }
            if grid.size() > num_cores {
                return Err(ShardingError::tile_overflow(
                    op_name,
                    format!(
                        "operand {}: {} tiles exceed {} cores",
                        operand_index,
                        grid.size(),
                        num_cores
                    ),
                ));
            }
            if let Some(&core) = device_order.iter().find(|&&core| core >= num_cores) {
                return Err(ShardingError::invalid_core(op_name, core as i64, num_cores));
            }
            let slices = grid.slices(&ty.shape).map_err(|mismatch| match mismatch {
                ShapeMismatch::Rank { grid, shape } => ShardingError::malformed(
                    op_name,
                    INPUT_SHARDING_ATTR,
                    format!(
                        "operand {}: tile grid of rank {} applied to {}-d operand {}",
                        operand_index, grid, shape, ty
                    ),
                ),
                ShapeMismatch::Indivisible { dim, size, tiles } => ShardingError::tile_overflow(
                    op_name,
                    format!(
                        "operand {}: dimension {} of size {} is not divisible into {} tiles",
                        operand_index, dim, size, tiles
                    ),
                ),
            })?;
            OperandPlacement::Tiled {
                operand_type: ty.clone(),
                tile_dims: tile_dims.clone(),
                slices,
            }
        }
        ShardingDescriptor::Tuple { .. } => {
            return Err(ShardingError::unsupported(
                op_name,
                INPUT_SHARDING_ATTR,
                format!("tuple sharding on operand {}", operand_index),
            ));
        }
    };

    tracing::debug!(
        "'{}' operand {} ({}) placed as {}",
        op_name,
        operand_index,
        ty,
        sharding.kind()
    );
    Ok(placement)
}

/// Builds the operand list of every logical core for a launch.
///
/// Every operand is validated before the first split operation is inserted,
/// so a failure leaves the graph untouched.
///
/// # Errors
///
/// See [`plan_inputs`]; graph failures are also propagated.
pub fn extract_inputs_for_logical_devices(
    num_cores: usize,
    computation: &Computation,
    graph: &mut dyn GraphBuilder,
) -> Result<LogicalDeviceInputs> {
    let plan = plan_inputs(
        num_cores,
        &computation.name,
        &computation.operand_types,
        computation.attributes.get(INPUT_SHARDING_ATTR),
    )?;
    plan.materialize(graph, &computation.location, &computation.operands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attributes;
    use crate::graph::{ElementType, InMemoryGraph};

    fn f32_tensor(shape: Vec<usize>) -> TensorType {
        TensorType::new(ElementType::F32, shape)
    }

    fn launch_with(
        graph: &mut InMemoryGraph,
        shapes: Vec<Vec<usize>>,
        shardings: Option<Vec<ShardingDescriptor>>,
    ) -> Computation {
        let operands: Vec<ValueId> = shapes
            .into_iter()
            .map(|shape| graph.add_argument(f32_tensor(shape)))
            .collect();
        let mut attributes = Attributes::new();
        if let Some(shardings) = shardings {
            attributes.insert(
                INPUT_SHARDING_ATTR.to_string(),
                Attribute::sharding_list(&shardings),
            );
        }
        graph
            .add_launch("launch", operands, vec![f32_tensor(vec![1])], attributes)
            .unwrap()
    }

    #[test]
    fn test_default_places_everything_on_core_zero() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(&mut graph, vec![vec![4], vec![2, 2]], None);

        let inputs = extract_inputs_for_logical_devices(4, &launch, &mut graph).unwrap();

        assert_eq!(inputs.num_cores(), 4);
        assert_eq!(inputs.values(0), launch.operands);
        for core in 1..4 {
            assert!(inputs.core(core).is_empty());
        }
    }

    #[test]
    fn test_replicated_shares_value_reference() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![4], vec![4]],
            Some(vec![ShardingDescriptor::Replicated, ShardingDescriptor::Replicated]),
        );
        let ops_before = graph.num_operations();

        let inputs = extract_inputs_for_logical_devices(3, &launch, &mut graph).unwrap();

        for core in 0..3 {
            assert_eq!(inputs.values(core), launch.operands);
        }
        assert_eq!(graph.num_operations(), ops_before);
    }

    #[test]
    fn test_maximal_routes_to_single_core() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![4], vec![4], vec![4]],
            Some(vec![
                ShardingDescriptor::Maximal { core: 1 },
                ShardingDescriptor::Replicated,
                ShardingDescriptor::Maximal { core: 1 },
            ]),
        );

        let inputs = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap();

        assert_eq!(inputs.values(0), vec![launch.operands[1]]);
        assert_eq!(inputs.values(1), launch.operands);
        let order: Vec<usize> = inputs.core(1).iter().map(|i| i.operand_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_maximal_out_of_range_leaves_graph_untouched() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![8], vec![4]],
            Some(vec![
                ShardingDescriptor::tiled(vec![2], vec![0, 1]),
                ShardingDescriptor::Maximal { core: 2 },
            ]),
        );
        let ops_before = graph.num_operations();

        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();

        assert!(matches!(err, ShardingError::InvalidCoreId { core_id: 2, num_cores: 2, .. }));
        assert_eq!(graph.num_operations(), ops_before);
    }

    #[test]
    fn test_tiled_rank_one_slices() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![8]],
            Some(vec![ShardingDescriptor::tiled(vec![2], vec![0, 1])]),
        );

        let inputs = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap();

        let core0 = &inputs.core(0)[0];
        let core1 = &inputs.core(1)[0];
        assert_eq!(core0.tile.as_ref().unwrap().ranges, vec![0..4]);
        assert_eq!(core1.tile.as_ref().unwrap().ranges, vec![4..8]);
        assert_eq!(graph.value_type(core0.value), Some(&f32_tensor(vec![4])));

        let split = graph.producer(core0.value).unwrap();
        assert_eq!(split.kind, OpKind::Split { dim: 0, num_splits: 2 });
        assert_eq!(split.operands, vec![launch.operands[0]]);
        assert_eq!(split.results, vec![core0.value, core1.value]);
    }

    #[test]
    fn test_tiled_operand_type_differs_from_graph() {
        let mut graph = InMemoryGraph::new();
        let mut launch = launch_with(
            &mut graph,
            vec![vec![8]],
            Some(vec![ShardingDescriptor::tiled(vec![2], vec![0, 1])]),
        );
        // Planned as f32[8] but the graph holds a scalar.
        launch.operands[0] = graph.add_argument(f32_tensor(vec![]));
        let before = graph.num_operations();

        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();
        assert!(matches!(err, ShardingError::Graph { .. }));
        assert_eq!(graph.num_operations(), before);

        // Same rank, different extent.
        launch.operands[0] = graph.add_argument(f32_tensor(vec![6]));
        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();
        assert!(matches!(err, ShardingError::Graph { .. }));
        assert_eq!(graph.num_operations(), before);
    }

    #[test]
    fn test_tiled_two_dims_follow_device_order() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![4, 6]],
            Some(vec![ShardingDescriptor::tiled(vec![2, 2], vec![3, 2, 1, 0])]),
        );
        let ops_before = graph.num_operations();

        let inputs = extract_inputs_for_logical_devices(4, &launch, &mut graph).unwrap();

        // One split along dim 0, then one per half along dim 1.
        assert_eq!(graph.num_operations(), ops_before + 3);
        let tile = inputs.core(3)[0].tile.clone().unwrap();
        assert_eq!(tile.tile_index, 0);
        assert_eq!(tile.ranges, vec![0..2, 0..3]);
        let tile = inputs.core(0)[0].tile.clone().unwrap();
        assert_eq!(tile.tile_index, 3);
        assert_eq!(tile.ranges, vec![2..4, 3..6]);
        for core in 0..4 {
            assert_eq!(
                graph.value_type(inputs.core(core)[0].value),
                Some(&f32_tensor(vec![2, 3]))
            );
        }
    }

    #[test]
    fn test_tiled_grid_smaller_than_core_count() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![8]],
            Some(vec![ShardingDescriptor::tiled(vec![2], vec![2, 3])]),
        );

        let inputs = extract_inputs_for_logical_devices(4, &launch, &mut graph).unwrap();

        assert!(inputs.core(0).is_empty());
        assert!(inputs.core(1).is_empty());
        assert_eq!(inputs.core(2).len(), 1);
        assert_eq!(inputs.core(3).len(), 1);
    }

    #[test]
    fn test_tiled_indivisible_is_overflow() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![7]],
            Some(vec![ShardingDescriptor::tiled(vec![2], vec![0, 1])]),
        );

        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();
        assert!(matches!(err, ShardingError::TileGridOverflow { .. }));
    }

    #[test]
    fn test_tiled_grid_larger_than_core_count() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![8]],
            Some(vec![ShardingDescriptor::tiled(vec![4], vec![0, 1, 0, 1])]),
        );

        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();
        assert!(matches!(err, ShardingError::TileGridOverflow { .. }));
    }

    #[test]
    fn test_tiled_rank_mismatch_is_malformed() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![8, 2]],
            Some(vec![ShardingDescriptor::tiled(vec![2], vec![0, 1])]),
        );

        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();
        assert!(matches!(err, ShardingError::MalformedSharding { .. }));
    }

    #[test]
    fn test_tiled_device_out_of_range() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![8]],
            Some(vec![ShardingDescriptor::tiled(vec![2], vec![0, 5])]),
        );

        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();
        assert!(matches!(err, ShardingError::InvalidCoreId { core_id: 5, .. }));
    }

    #[test]
    fn test_tuple_operand_sharding_unsupported() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![8]],
            Some(vec![ShardingDescriptor::tuple(vec![ShardingDescriptor::Replicated])]),
        );

        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();
        assert!(matches!(err, ShardingError::UnsupportedShardingKind { .. }));
    }

    #[test]
    fn test_operand_count_mismatch() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(
            &mut graph,
            vec![vec![8], vec![8]],
            Some(vec![ShardingDescriptor::Replicated]),
        );

        let err = extract_inputs_for_logical_devices(2, &launch, &mut graph).unwrap_err();
        assert!(matches!(
            err,
            ShardingError::OperandCountMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_materialize_operand_count_names_op() {
        let mut graph = InMemoryGraph::new();
        let launch = launch_with(&mut graph, vec![vec![8]], None);
        let plan = plan_inputs(2, &launch.name, &launch.operand_types, None).unwrap();

        let extra = graph.add_argument(f32_tensor(vec![8]));
        let err = plan
            .materialize(
                &mut graph,
                &Location::new("model.py:42"),
                &[launch.operands[0], extra],
            )
            .unwrap_err();
        match err {
            ShardingError::OperandCountMismatch { op, expected, actual } => {
                assert_eq!(op, "launch");
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_cores_rejected() {
        let result = plan_inputs(0, "launch", &[], None);
        assert!(matches!(result, Err(ShardingError::Config { .. })));
    }
}
