// rust/sharding-core/src/lib.rs

//! Sharding partition pass - Core Library
//!
//! This crate splits one accelerator launch across several logical cores. It
//! decodes the sharding attributes attached to the launch, assigns each operand
//! (or a tile of it) to the cores that need it, derives the result signature of
//! every per-core sub-computation, and stitches the per-core results back into
//! the logical results the rest of the graph consumes.

pub mod attribute;
pub mod config;
pub mod error;
pub mod graph;
pub mod proto;
pub mod sharding;

// Re-export commonly used types for convenience
pub use config::{ReportFormat, ShardingConfig};
pub use error::{Result, ShardingError};
pub use sharding::{DecodeError, ShardingDescriptor, TileGrid, TileSlice};

pub mod partition;
pub use partition::{
    extract_inputs_for_logical_devices, output_types_for_logical_device,
    parse_and_validate_output_sharding, remap_outputs_from_logical_devices, CoreAssignment,
    LogicalDeviceAssignment, LogicalDeviceInputs,
};

pub mod pass;
pub use pass::{ExecutionSubstrate, GraphSubstrate, PartitionOutcome, ShardingPass, ShardingPlan};
