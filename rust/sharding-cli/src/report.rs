// rust/sharding-cli/src/report.rs

use std::fmt::Write as _;

use serde::Serialize;

use sharding_core::graph::{Computation, InMemoryGraph};
use sharding_core::{PartitionOutcome, ReportFormat, Result, ShardingDescriptor, ShardingError};

/// Serializable summary of one partitioned launch.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
    pub name: String,
    pub num_cores: usize,
    pub cores: Vec<CoreReport>,
    pub outputs: Vec<OutputReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoreReport {
    pub core_id: usize,
    pub result_types: Vec<String>,
    pub results: Vec<String>,
    pub operands: Vec<OperandReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperandReport {
    pub operand_index: usize,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_index: Option<usize>,
    /// Half-open `[start, end]` element range per dimension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<[usize; 2]>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    pub result_index: usize,
    pub kind: String,
    pub value: String,
}

impl PartitionReport {
    pub fn new(
        computation: &Computation,
        output_sharding: &[ShardingDescriptor],
        outcome: &PartitionOutcome,
    ) -> Self {
        let leaves: Vec<&ShardingDescriptor> =
            output_sharding.iter().flat_map(|s| s.leaves()).collect();

        let cores = outcome
            .assignment
            .cores
            .iter()
            .map(|core| CoreReport {
                core_id: core.core_id,
                result_types: core.result_types.iter().map(ToString::to_string).collect(),
                results: outcome
                    .per_core_results
                    .get(core.core_id)
                    .map(|values| values.iter().map(ToString::to_string).collect())
                    .unwrap_or_default(),
                operands: core
                    .inputs
                    .iter()
                    .map(|input| OperandReport {
                        operand_index: input.operand_index,
                        value: input.value.to_string(),
                        tile_index: input.tile.as_ref().map(|t| t.tile_index),
                        ranges: input
                            .tile
                            .as_ref()
                            .map(|t| t.ranges.iter().map(|r| [r.start, r.end]).collect()),
                    })
                    .collect(),
            })
            .collect();

        let outputs = outcome
            .outputs
            .iter()
            .enumerate()
            .map(|(result_index, value)| OutputReport {
                result_index,
                kind: leaves
                    .get(result_index)
                    .map(|s| s.kind().to_string())
                    .unwrap_or_default(),
                value: value.to_string(),
            })
            .collect();

        Self {
            name: computation.name.clone(),
            num_cores: outcome.assignment.num_cores(),
            cores,
            outputs,
        }
    }

    /// Renders the report; the text form is followed by the rewritten graph.
    pub fn render(&self, format: ReportFormat, graph: &InMemoryGraph) -> Result<String> {
        match format {
            ReportFormat::Toml => toml::to_string(self)
                .map_err(|e| ShardingError::config_with_source("failed to serialize report", e)),
            ReportFormat::Text => Ok(self.to_text(graph)),
        }
    }

    fn to_text(&self, graph: &InMemoryGraph) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "launch '{}' across {} cores", self.name, self.num_cores);
        for core in &self.cores {
            let operands: Vec<String> = core
                .operands
                .iter()
                .map(|op| match op.tile_index {
                    Some(tile) => format!("#{} {} (tile {})", op.operand_index, op.value, tile),
                    None => format!("#{} {}", op.operand_index, op.value),
                })
                .collect();
            let _ = writeln!(
                out,
                "  core {}: operands [{}] -> [{}]",
                core.core_id,
                operands.join(", "),
                core.result_types.join(", ")
            );
        }
        for output in &self.outputs {
            let _ = writeln!(
                out,
                "  result {} ({}) -> {}",
                output.result_index, output.kind, output.value
            );
        }
        let _ = writeln!(out);
        let _ = write!(out, "{}", graph);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharding_core::attribute::{Attribute, Attributes, INPUT_SHARDING_ATTR};
    use sharding_core::graph::{ElementType, TensorType};
    use sharding_core::{GraphSubstrate, ShardingPass};

    fn partition() -> (InMemoryGraph, PartitionReport) {
        let mut graph = InMemoryGraph::new();
        let x = graph.add_argument(TensorType::new(ElementType::F32, vec![8]));
        let mut attributes = Attributes::new();
        attributes.insert(
            INPUT_SHARDING_ATTR.to_string(),
            Attribute::sharding_list([&ShardingDescriptor::tiled(vec![2], vec![0, 1])]),
        );
        let launch = graph
            .add_launch("f", vec![x], vec![TensorType::new(ElementType::F32, vec![3])], attributes)
            .unwrap();

        let pass = ShardingPass::new(2).unwrap();
        let plan = pass.plan(&launch).unwrap();
        let outcome = pass.run(&mut graph, &mut GraphSubstrate, &launch).unwrap();
        let report = PartitionReport::new(&launch, plan.output_sharding(), &outcome);
        (graph, report)
    }

    #[test]
    fn test_report_contents() {
        let (_, report) = partition();

        assert_eq!(report.num_cores, 2);
        assert_eq!(report.cores[1].operands[0].tile_index, Some(1));
        assert_eq!(report.cores[1].operands[0].ranges, Some(vec![[4, 8]]));
        assert_eq!(report.cores[0].result_types, vec!["tensor<3xf32>".to_string()]);
        assert_eq!(report.outputs[0].kind, "replicated");
    }

    #[test]
    fn test_render_text() {
        let (graph, report) = partition();
        let text = report.render(ReportFormat::Text, &graph).unwrap();

        assert!(text.starts_with("launch 'f' across 2 cores"));
        assert!(text.contains("core 1: operands [#0 "));
        assert!(text.contains("result 0 (replicated)"));
        assert!(text.contains("execute"));
    }

    #[test]
    fn test_render_toml() {
        let (graph, report) = partition();
        let text = report.render(ReportFormat::Toml, &graph).unwrap();

        let value: toml::Value = toml::from_str(&text).unwrap();
        assert_eq!(value["name"].as_str(), Some("f"));
        assert_eq!(value["num_cores"].as_integer(), Some(2));
        assert_eq!(value["cores"].as_array().map(Vec::len), Some(2));
    }
}
