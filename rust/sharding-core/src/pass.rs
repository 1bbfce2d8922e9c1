// rust/sharding-core/src/pass.rs

//! End-to-end partitioning of one launch.
//!
//! [`ShardingPass`] ties the partition steps together: it validates both
//! sharding attributes and derives every core's signature up front, then
//! splits the operands, launches one sub-computation per core through an
//! [`ExecutionSubstrate`] and rebuilds the logical results.
//!
//! # Example
//!
//! ```
//! use sharding_core::attribute::{Attribute, Attributes, INPUT_SHARDING_ATTR};
//! use sharding_core::graph::{ElementType, InMemoryGraph, TensorType};
//! use sharding_core::{GraphSubstrate, ShardingDescriptor, ShardingPass};
//!
//! let mut graph = InMemoryGraph::new();
//! let x = graph.add_argument(TensorType::new(ElementType::F32, vec![8, 4]));
//!
//! let mut attributes = Attributes::new();
//! attributes.insert(
//!     INPUT_SHARDING_ATTR.to_string(),
//!     Attribute::sharding_list([&ShardingDescriptor::tiled(vec![2, 1], vec![0, 1])]),
//! );
//! let launch = graph
//!     .add_launch("encoder", vec![x], vec![TensorType::new(ElementType::F32, vec![4])], attributes)
//!     .unwrap();
//!
//! let pass = ShardingPass::new(2).unwrap();
//! let outcome = pass.run(&mut graph, &mut GraphSubstrate, &launch).unwrap();
//! assert_eq!(outcome.outputs.len(), 1);
//! ```

use crate::attribute::{INPUT_SHARDING_ATTR, OUTPUT_SHARDING_ATTR};
use crate::config::ShardingConfig;
use crate::error::{Result, ShardingError};
use crate::graph::{Computation, GraphBuilder, Location, OpKind, TensorType, ValueId};
use crate::partition::{
    output_types_for_logical_device, plan_inputs, remap_outputs_from_logical_devices,
    validate_output_sharding, InputPlan, LogicalDeviceAssignment,
};
use crate::sharding::ShardingDescriptor;

/// Builds the sub-computation that runs on one logical core.
pub trait ExecutionSubstrate {
    /// Emits the computation for `core_id` and returns its results.
    ///
    /// The returned values must match `result_types` in count and type.
    fn launch(
        &mut self,
        graph: &mut dyn GraphBuilder,
        location: &Location,
        core_id: usize,
        operands: &[ValueId],
        result_types: &[TensorType],
    ) -> Result<Vec<ValueId>>;
}

/// Substrate that appends one `execute` operation per core to the graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphSubstrate;

impl ExecutionSubstrate for GraphSubstrate {
    fn launch(
        &mut self,
        graph: &mut dyn GraphBuilder,
        location: &Location,
        core_id: usize,
        operands: &[ValueId],
        result_types: &[TensorType],
    ) -> Result<Vec<ValueId>> {
        let op = graph.append_operation(
            location,
            OpKind::Execute { core_id },
            operands.to_vec(),
            result_types.to_vec(),
        )?;
        Ok(graph.results(op).to_vec())
    }
}

/// Validated partitioning decision for one launch. Building it touches no graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardingPlan {
    input: InputPlan,
    output_sharding: Vec<ShardingDescriptor>,
    result_types: Vec<Vec<TensorType>>,
}

impl ShardingPlan {
    pub fn num_cores(&self) -> usize {
        self.input.num_cores()
    }

    pub fn input(&self) -> &InputPlan {
        &self.input
    }

    /// Per-result output sharding, one entry per logical result.
    pub fn output_sharding(&self) -> &[ShardingDescriptor] {
        &self.output_sharding
    }

    /// Result signature of `core_id`'s sub-computation.
    pub fn result_types(&self, core_id: usize) -> &[TensorType] {
        self.result_types
            .get(core_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// What [`ShardingPass::run`] built.
#[derive(Debug, Clone)]
pub struct PartitionOutcome {
    pub assignment: LogicalDeviceAssignment,
    /// Results of each core's sub-computation, indexed by core id.
    pub per_core_results: Vec<Vec<ValueId>>,
    /// Replacement for each logical result of the launch.
    pub outputs: Vec<ValueId>,
}

/// Partitions launches across a fixed number of logical cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardingPass {
    num_cores: usize,
}

impl ShardingPass {
    /// # Errors
    ///
    /// Returns a configuration error if `num_cores` is zero.
    pub fn new(num_cores: usize) -> Result<Self> {
        if num_cores == 0 {
            return Err(ShardingError::config("num_cores must be greater than 0"));
        }
        Ok(Self { num_cores })
    }

    pub fn from_config(config: &ShardingConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.partition.num_cores_per_replica)
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    /// Validates the launch's sharding attributes and derives every core's
    /// result signature.
    ///
    /// # Errors
    ///
    /// Any error of the input partitioner, the output validator or the
    /// output type deriver.
    pub fn plan(&self, computation: &Computation) -> Result<ShardingPlan> {
        let input = plan_inputs(
            self.num_cores,
            &computation.name,
            &computation.operand_types,
            computation.attributes.get(INPUT_SHARDING_ATTR),
        )?;
        let output_sharding = validate_output_sharding(
            self.num_cores,
            &computation.name,
            computation.result_types.len(),
            computation.attributes.get(OUTPUT_SHARDING_ATTR),
        )?;
        let result_types = (0..self.num_cores)
            .map(|core_id| {
                output_types_for_logical_device(
                    self.num_cores,
                    core_id,
                    &computation.name,
                    &output_sharding,
                    &computation.result_types,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ShardingPlan {
            input,
            output_sharding,
            result_types,
        })
    }

    /// Partitions `computation` and rewires its consumers to the rebuilt results.
    ///
    /// Planning happens first, so a sharding error leaves the graph untouched.
    ///
    /// # Errors
    ///
    /// See [`ShardingPass::plan`]; substrate and graph failures are also
    /// propagated.
    pub fn run(
        &self,
        graph: &mut dyn GraphBuilder,
        substrate: &mut dyn ExecutionSubstrate,
        computation: &Computation,
    ) -> Result<PartitionOutcome> {
        let plan = self.plan(computation)?;
        let location = &computation.location;

        let inputs = plan
            .input
            .materialize(graph, location, &computation.operands)?;

        let mut per_core_results = Vec::with_capacity(self.num_cores);
        for core_id in 0..self.num_cores {
            let operands = inputs.values(core_id);
            let results =
                substrate.launch(graph, location, core_id, &operands, plan.result_types(core_id))?;
            tracing::debug!(
                "{}: core {} takes {} operands and yields {} results",
                location,
                core_id,
                operands.len(),
                results.len()
            );
            per_core_results.push(results);
        }

        let outputs = remap_outputs_from_logical_devices(
            graph,
            location,
            &plan.output_sharding,
            computation,
            &per_core_results,
        )?;

        tracing::info!(
            "partitioned '{}' across {} cores ({} operands, {} results)",
            computation.name,
            self.num_cores,
            computation.operands.len(),
            outputs.len()
        );

        Ok(PartitionOutcome {
            assignment: LogicalDeviceAssignment::new(inputs, plan.result_types),
            per_core_results,
            outputs,
        })
    }
}
