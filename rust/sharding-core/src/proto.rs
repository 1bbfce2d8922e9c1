// rust/sharding-core/src/proto.rs

//! Wire messages for encoded sharding attributes.
//!
//! These mirror the subset of XLA's `OpSharding` message that the pass reads.
//! Field tags match `xla_data.proto`, so blobs produced by other XLA tooling
//! decode unchanged; fields not listed here (such as `tile_shape`) are skipped
//! by the decoder.

/// Serialized sharding of a single value or a tuple of values.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpSharding {
    #[prost(enumeration = "op_sharding::Type", tag = "1")]
    pub r#type: i32,
    /// Number of tiles along each tensor dimension.
    #[prost(int64, repeated, tag = "3")]
    pub tile_assignment_dimensions: ::prost::alloc::vec::Vec<i64>,
    /// Device owning each tile, row-major over `tile_assignment_dimensions`.
    #[prost(int64, repeated, tag = "4")]
    pub tile_assignment_devices: ::prost::alloc::vec::Vec<i64>,
    #[prost(message, repeated, tag = "5")]
    pub tuple_shardings: ::prost::alloc::vec::Vec<OpSharding>,
    #[prost(bool, tag = "6")]
    pub replicate_on_last_tile_dim: bool,
}

/// Nested types of `OpSharding`.
pub mod op_sharding {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Replicated = 0,
        Maximal = 1,
        Tuple = 2,
        Other = 3,
        Manual = 4,
    }

    impl Type {
        pub fn as_str_name(&self) -> &'static str {
            match self {
                Type::Replicated => "REPLICATED",
                Type::Maximal => "MAXIMAL",
                Type::Tuple => "TUPLE",
                Type::Other => "OTHER",
                Type::Manual => "MANUAL",
            }
        }
    }
}
