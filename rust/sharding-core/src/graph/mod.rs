// rust/sharding-core/src/graph/mod.rs

//! Graph abstraction the pass rewrites.
//!
//! The pass never sees a concrete IR. It reads value types, appends split,
//! concat and execute operations, and rewires uses, all through the
//! [`GraphBuilder`] trait. [`InMemoryGraph`] is the in-process implementation
//! used by tests and the `shard-plan` tool.
//!
//! # Example
//!
//! ```
//! use sharding_core::graph::{ElementType, GraphBuilder, InMemoryGraph, Location, OpKind, TensorType};
//!
//! let mut graph = InMemoryGraph::new();
//! let x = graph.add_argument(TensorType::new(ElementType::F32, vec![8]));
//! let op = graph
//!     .append_operation(
//!         &Location::new("example"),
//!         OpKind::Split { dim: 0, num_splits: 2 },
//!         vec![x],
//!         vec![TensorType::new(ElementType::F32, vec![4]); 2],
//!     )
//!     .unwrap();
//! assert_eq!(graph.results(op).len(), 2);
//! ```

mod memory;

pub use memory::{InMemoryGraph, OperationData};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, Attributes, HasAttributes};
use crate::error::Result;

/// Handle to an SSA value in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub usize);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Handle to an operation in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub usize);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Source location attached to inserted operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Location(String);

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc(\"{}\")", self.0)
    }
}

impl From<&str> for Location {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Bool,
    I8,
    I32,
    I64,
    U8,
    F16,
    Bf16,
    F32,
    F64,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Bool => "i1",
            ElementType::I8 => "i8",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U8 => "ui8",
            ElementType::F16 => "f16",
            ElementType::Bf16 => "bf16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A statically shaped tensor type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    pub element: ElementType,
    pub shape: Vec<usize>,
}

impl TensorType {
    pub fn new(element: ElementType, shape: Vec<usize>) -> Self {
        Self { element, shape }
    }

    /// Same element type with a different shape.
    pub fn with_shape(&self, shape: Vec<usize>) -> Self {
        Self {
            element: self.element,
            shape,
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tensor<")?;
        for dim in &self.shape {
            write!(f, "{}x", dim)?;
        }
        write!(f, "{}>", self.element)
    }
}

/// Kind of an operation appended by the pass or by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Splits the operand into `num_splits` equal slices along `dim`.
    Split { dim: usize, num_splits: usize },
    /// Concatenates all operands along `dim`.
    Concat { dim: usize },
    /// One core's branch of a concurrent launch.
    Execute { core_id: usize },
    /// Anything else, identified by name.
    Custom(String),
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Split { dim, num_splits } => write!(f, "split(dim={}, num_splits={})", dim, num_splits),
            OpKind::Concat { dim } => write!(f, "concat(dim={})", dim),
            OpKind::Execute { core_id } => write!(f, "execute(core={})", core_id),
            OpKind::Custom(name) => f.write_str(name),
        }
    }
}

/// Narrow editing interface over the surrounding IR.
pub trait GraphBuilder {
    /// Type of a value, or `None` if the value is unknown to the graph.
    fn value_type(&self, value: ValueId) -> Option<&TensorType>;

    /// Appends an operation and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand does not exist in the graph.
    fn append_operation(
        &mut self,
        location: &Location,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: Vec<TensorType>,
    ) -> Result<OperationId>;

    /// Result values of an operation, in order.
    fn results(&self, op: OperationId) -> &[ValueId];

    /// Redirects every use of `old` to `new` and returns the number of
    /// operands rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if either value does not exist in the graph.
    fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> Result<usize>;
}

/// A launch computation to be partitioned across cores.
#[derive(Debug, Clone)]
pub struct Computation {
    pub name: String,
    pub location: Location,
    pub operands: Vec<ValueId>,
    pub operand_types: Vec<TensorType>,
    pub results: Vec<ValueId>,
    pub result_types: Vec<TensorType>,
    pub attributes: Attributes,
}

impl HasAttributes for Computation {
    fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}
