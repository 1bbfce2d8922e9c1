// rust/sharding-core/src/graph/memory.rs

use std::fmt;

use super::{Computation, GraphBuilder, Location, OpKind, OperationId, TensorType, ValueId};
use crate::attribute::{Attribute, Attributes, HasAttributes};
use crate::error::{Result, ShardingError};

#[derive(Debug, Clone)]
struct ValueData {
    ty: TensorType,
    producer: Option<OperationId>,
}

/// An operation stored in an [`InMemoryGraph`].
#[derive(Debug, Clone)]
pub struct OperationData {
    pub id: OperationId,
    pub kind: OpKind,
    pub location: Location,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub attributes: Attributes,
}

impl HasAttributes for OperationData {
    fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

/// Append-only graph of typed values and operations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraph {
    values: Vec<ValueData>,
    operations: Vec<OperationData>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block argument with no producing operation.
    pub fn add_argument(&mut self, ty: TensorType) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(ValueData { ty, producer: None });
        id
    }

    /// Appends a launch operation and returns the computation describing it.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand is not part of this graph.
    pub fn add_launch(
        &mut self,
        name: impl Into<String>,
        operands: Vec<ValueId>,
        result_types: Vec<TensorType>,
        attributes: Attributes,
    ) -> Result<Computation> {
        let name = name.into();
        let location = Location::new(name.clone());
        let operand_types = operands
            .iter()
            .map(|&v| self.checked_type(v).cloned())
            .collect::<Result<Vec<_>>>()?;

        let op = self.append_operation(
            &location,
            OpKind::Custom("launch".to_string()),
            operands.clone(),
            result_types.clone(),
        )?;
        self.operations[op.0].attributes = attributes.clone();

        Ok(Computation {
            name,
            location,
            operands,
            operand_types,
            results: self.results(op).to_vec(),
            result_types,
            attributes,
        })
    }

    pub fn operation(&self, op: OperationId) -> Option<&OperationData> {
        self.operations.get(op.0)
    }

    /// Number of operations in the graph.
    pub fn num_operations(&self) -> usize {
        self.operations.len()
    }

    /// Operation that produced `value`, or `None` for arguments.
    pub fn producer(&self, value: ValueId) -> Option<&OperationData> {
        self.values
            .get(value.0)
            .and_then(|v| v.producer)
            .and_then(|op| self.operations.get(op.0))
    }

    /// Every `(operation, operand index)` that reads `value`.
    pub fn uses(&self, value: ValueId) -> Vec<(OperationId, usize)> {
        self.operations
            .iter()
            .flat_map(|op| {
                op.operands
                    .iter()
                    .enumerate()
                    .filter(move |(_, &operand)| operand == value)
                    .map(move |(index, _)| (op.id, index))
            })
            .collect()
    }

    fn checked_type(&self, value: ValueId) -> Result<&TensorType> {
        self.values
            .get(value.0)
            .map(|v| &v.ty)
            .ok_or_else(|| ShardingError::graph(format!("unknown value {}", value)))
    }
}

impl GraphBuilder for InMemoryGraph {
    fn value_type(&self, value: ValueId) -> Option<&TensorType> {
        self.values.get(value.0).map(|v| &v.ty)
    }

    fn append_operation(
        &mut self,
        location: &Location,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: Vec<TensorType>,
    ) -> Result<OperationId> {
        for &operand in &operands {
            self.checked_type(operand)?;
        }

        let id = OperationId(self.operations.len());
        let results = result_types
            .into_iter()
            .map(|ty| {
                let value = ValueId(self.values.len());
                self.values.push(ValueData {
                    ty,
                    producer: Some(id),
                });
                value
            })
            .collect();

        self.operations.push(OperationData {
            id,
            kind,
            location: location.clone(),
            operands,
            results,
            attributes: Attributes::new(),
        });
        Ok(id)
    }

    fn results(&self, op: OperationId) -> &[ValueId] {
        self.operations
            .get(op.0)
            .map(|data| data.results.as_slice())
            .unwrap_or(&[])
    }

    fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> Result<usize> {
        self.checked_type(old)?;
        self.checked_type(new)?;

        let mut replaced = 0;
        for op in &mut self.operations {
            for operand in op.operands.iter_mut().filter(|operand| **operand == old) {
                *operand = new;
                replaced += 1;
            }
        }
        Ok(replaced)
    }
}

impl fmt::Display for InMemoryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.operations {
            if !op.results.is_empty() {
                let results: Vec<String> = op.results.iter().map(ToString::to_string).collect();
                write!(f, "{} = ", results.join(", "))?;
            }
            let operands: Vec<String> = op.operands.iter().map(ToString::to_string).collect();
            write!(f, "{}({})", op.kind, operands.join(", "))?;
            if !op.results.is_empty() {
                let types: Vec<String> = op
                    .results
                    .iter()
                    .map(|&v| self.values[v.0].ty.to_string())
                    .collect();
                write!(f, " : {}", types.join(", "))?;
            }
            writeln!(f, " {}", op.location)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ElementType;

    fn f32_tensor(shape: Vec<usize>) -> TensorType {
        TensorType::new(ElementType::F32, shape)
    }

    #[test]
    fn test_append_operation_creates_results() {
        let mut graph = InMemoryGraph::new();
        let x = graph.add_argument(f32_tensor(vec![4]));
        let op = graph
            .append_operation(
                &Location::new("test"),
                OpKind::Custom("neg".to_string()),
                vec![x],
                vec![f32_tensor(vec![4])],
            )
            .unwrap();

        let results = graph.results(op).to_vec();
        assert_eq!(results.len(), 1);
        assert_eq!(graph.value_type(results[0]), Some(&f32_tensor(vec![4])));
        assert_eq!(graph.producer(results[0]).unwrap().id, op);
        assert!(graph.producer(x).is_none());
    }

    #[test]
    fn test_append_operation_unknown_operand() {
        let mut graph = InMemoryGraph::new();
        let result = graph.append_operation(
            &Location::new("test"),
            OpKind::Custom("neg".to_string()),
            vec![ValueId(7)],
            vec![],
        );
        assert!(matches!(result, Err(ShardingError::Graph { .. })));
        assert_eq!(graph.num_operations(), 0);
    }

    #[test]
    fn test_replace_all_uses() {
        let mut graph = InMemoryGraph::new();
        let a = graph.add_argument(f32_tensor(vec![2]));
        let b = graph.add_argument(f32_tensor(vec![2]));
        let loc = Location::new("test");
        let add = graph
            .append_operation(&loc, OpKind::Custom("add".to_string()), vec![a, a], vec![f32_tensor(vec![2])])
            .unwrap();

        let replaced = graph.replace_all_uses(a, b).unwrap();

        assert_eq!(replaced, 2);
        assert_eq!(graph.operation(add).unwrap().operands, vec![b, b]);
        assert!(graph.uses(a).is_empty());
        assert_eq!(graph.uses(b), vec![(add, 0), (add, 1)]);
    }

    #[test]
    fn test_add_launch() {
        let mut graph = InMemoryGraph::new();
        let x = graph.add_argument(f32_tensor(vec![8, 2]));
        let launch = graph
            .add_launch("encoder", vec![x], vec![f32_tensor(vec![8])], Attributes::new())
            .unwrap();

        assert_eq!(launch.operand_types, vec![f32_tensor(vec![8, 2])]);
        assert_eq!(launch.results.len(), 1);
        assert_eq!(graph.uses(x).len(), 1);
    }

    #[test]
    fn test_display() {
        let mut graph = InMemoryGraph::new();
        let x = graph.add_argument(f32_tensor(vec![8]));
        graph
            .append_operation(
                &Location::new("split"),
                OpKind::Split { dim: 0, num_splits: 2 },
                vec![x],
                vec![f32_tensor(vec![4]); 2],
            )
            .unwrap();

        let text = graph.to_string();
        assert!(text.contains("split(dim=0, num_splits=2)(%0)"));
        assert!(text.contains("tensor<4xf32>"));
    }
}
