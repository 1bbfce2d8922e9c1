// rust/sharding-core/src/partition/mod.rs

//! Partitioning of a launch across logical cores.
//!
//! This module provides the four steps of the pass:
//!
//! - **Input partitioning** ([`extract_inputs_for_logical_devices`]): builds the
//!   ordered operand list of each core, inserting splits for tiled operands.
//! - **Output validation** ([`parse_and_validate_output_sharding`]): decodes the
//!   per-result sharding and checks it against the core count.
//! - **Output types** ([`output_types_for_logical_device`]): result signature of
//!   one core's sub-computation.
//! - **Output remapping** ([`remap_outputs_from_logical_devices`]): rebuilds the
//!   logical results from per-core results and rewires their consumers.

mod input;
mod output;
mod remap;

pub use input::{
    extract_inputs_for_logical_devices, plan_inputs, CoreInput, InputPlan, LogicalDeviceInputs,
    OperandPlacement,
};
pub use output::{
    output_types_for_logical_device, parse_and_validate_output_sharding, validate_output_sharding,
};
pub use remap::{remap_outputs_from_logical_devices, REPLICATED_SOURCE_CORE};

use crate::graph::TensorType;

/// Operands and result signature of one core's sub-computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreAssignment {
    pub core_id: usize,
    pub inputs: Vec<CoreInput>,
    pub result_types: Vec<TensorType>,
}

/// Everything needed to build the per-core sub-computations of one launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalDeviceAssignment {
    pub cores: Vec<CoreAssignment>,
}

impl LogicalDeviceAssignment {
    /// Pairs per-core operand lists with per-core result types.
    ///
    /// Both lists are indexed by core id and must have the same length.
    pub fn new(inputs: LogicalDeviceInputs, result_types: Vec<Vec<TensorType>>) -> Self {
        let cores = inputs
            .into_inner()
            .into_iter()
            .zip(result_types)
            .enumerate()
            .map(|(core_id, (inputs, result_types))| CoreAssignment {
                core_id,
                inputs,
                result_types,
            })
            .collect();
        Self { cores }
    }

    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    pub fn core(&self, core_id: usize) -> Option<&CoreAssignment> {
        self.cores.get(core_id)
    }
}
