// rust/sharding-cli/src/description.rs

//! TOML description of a single launch.
//!
//! ```toml
//! name = "encoder"
//! num_cores = 2
//!
//! [[operands]]
//! shape = [8, 4]
//! sharding = { type = "tiled", tile_dims = [2, 1], device_order = [0, 1] }
//!
//! [[results]]
//! shape = [8, 4]
//! sharding = { type = "maximal", core = 1 }
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use sharding_core::attribute::{Attribute, Attributes, INPUT_SHARDING_ATTR, OUTPUT_SHARDING_ATTR};
use sharding_core::graph::{Computation, ElementType, GraphBuilder, InMemoryGraph, Location, OpKind, TensorType};
use sharding_core::{Result, ShardingDescriptor, ShardingError};

/// One operand or result of the launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSpec {
    pub shape: Vec<usize>,
    #[serde(default = "default_element")]
    pub element: ElementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharding: Option<ShardingDescriptor>,
}

fn default_element() -> ElementType {
    ElementType::F32
}

impl ValueSpec {
    pub fn tensor_type(&self) -> TensorType {
        TensorType::new(self.element, self.shape.clone())
    }
}

/// A launch to partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescription {
    pub name: String,
    /// Core count for this launch, overriding the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cores: Option<usize>,
    /// Sharding of all results as one descriptor, usually a tuple. Mutually
    /// exclusive with per-result shardings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_sharding: Option<ShardingDescriptor>,
    #[serde(default)]
    pub operands: Vec<ValueSpec>,
    #[serde(default)]
    pub results: Vec<ValueSpec>,
}

impl FromStr for LaunchDescription {
    type Err = ShardingError;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ShardingError::config_with_source("failed to parse launch description", e))
    }
}

impl LaunchDescription {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShardingError::config_with_source(
                format!("failed to read launch description {}", path.display()),
                e,
            )
        })?;
        content.parse()
    }

    /// Encodes the declared shardings into launch attributes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when only some operands, or only some
    /// results, declare a sharding, or when `output_sharding` is combined with
    /// per-result shardings.
    pub fn attributes(&self) -> Result<Attributes> {
        let mut attributes = Attributes::new();

        if let Some(list) = all_or_none(&self.operands, "operands")? {
            attributes.insert(INPUT_SHARDING_ATTR.to_string(), Attribute::sharding_list(list));
        }

        let per_result = all_or_none(&self.results, "results")?;
        match (&self.output_sharding, per_result) {
            (Some(_), Some(_)) => {
                return Err(ShardingError::config(
                    "output_sharding cannot be combined with per-result shardings",
                ));
            }
            (Some(sharding), None) => {
                attributes.insert(OUTPUT_SHARDING_ATTR.to_string(), Attribute::sharding(sharding));
            }
            (None, Some(list)) => {
                attributes.insert(OUTPUT_SHARDING_ATTR.to_string(), Attribute::sharding_list(list));
            }
            (None, None) => {}
        }

        Ok(attributes)
    }

    /// Adds the launch to `graph` with one argument per operand and one
    /// `return` consumer per result.
    pub fn build(&self, graph: &mut InMemoryGraph) -> Result<Computation> {
        let attributes = self.attributes()?;
        let operands = self
            .operands
            .iter()
            .map(|spec| graph.add_argument(spec.tensor_type()))
            .collect();
        let result_types = self.results.iter().map(ValueSpec::tensor_type).collect();

        let launch = graph.add_launch(self.name.clone(), operands, result_types, attributes)?;

        if !launch.results.is_empty() {
            graph.append_operation(
                &Location::new(format!("{}.return", self.name)),
                OpKind::Custom("return".to_string()),
                launch.results.clone(),
                Vec::new(),
            )?;
        }
        Ok(launch)
    }
}

fn all_or_none<'a>(
    specs: &'a [ValueSpec],
    what: &str,
) -> Result<Option<Vec<&'a ShardingDescriptor>>> {
    let declared: Vec<&ShardingDescriptor> = specs.iter().filter_map(|s| s.sharding.as_ref()).collect();
    if declared.is_empty() {
        Ok(None)
    } else if declared.len() == specs.len() {
        Ok(Some(declared))
    } else {
        Err(ShardingError::config(format!(
            "{} of {} {} declare a sharding; declare it for all or none",
            declared.len(),
            specs.len(),
            what
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODER: &str = r#"
        name = "encoder"
        num_cores = 2

        [[operands]]
        shape = [8, 4]
        sharding = { type = "tiled", tile_dims = [2, 1], device_order = [0, 1] }

        [[operands]]
        shape = [4]
        element = "i32"
        sharding = { type = "replicated" }

        [[results]]
        shape = [8, 4]
        sharding = { type = "maximal", core = 1 }
    "#;

    #[test]
    fn test_parse() {
        let description: LaunchDescription = ENCODER.parse().unwrap();

        assert_eq!(description.name, "encoder");
        assert_eq!(description.num_cores, Some(2));
        assert_eq!(description.operands.len(), 2);
        assert_eq!(description.operands[0].element, ElementType::F32);
        assert_eq!(description.operands[1].element, ElementType::I32);
        assert_eq!(
            description.operands[0].sharding,
            Some(ShardingDescriptor::tiled(vec![2, 1], vec![0, 1]))
        );
        assert_eq!(
            description.results[0].sharding,
            Some(ShardingDescriptor::Maximal { core: 1 })
        );
    }

    #[test]
    fn test_parse_tuple_output_sharding() {
        let description: LaunchDescription = r#"
            name = "pair"
            output_sharding = { type = "tuple", elements = [{ type = "replicated" }, { type = "maximal", core = 0 }] }

            [[results]]
            shape = [2]

            [[results]]
            shape = [3]
        "#
        .parse()
        .unwrap();

        assert_eq!(
            description.output_sharding,
            Some(ShardingDescriptor::tuple(vec![
                ShardingDescriptor::Replicated,
                ShardingDescriptor::Maximal { core: 0 },
            ]))
        );
        let attributes = description.attributes().unwrap();
        assert!(attributes.get(OUTPUT_SHARDING_ATTR).unwrap().as_bytes().is_some());
        assert!(attributes.get(INPUT_SHARDING_ATTR).is_none());
    }

    #[test]
    fn test_parse_invalid() {
        let result: Result<LaunchDescription> = "operands = 3".parse();
        assert!(matches!(result, Err(ShardingError::Config { .. })));
    }

    #[test]
    fn test_attributes_partial_operand_sharding() {
        let description: LaunchDescription = r#"
            name = "f"

            [[operands]]
            shape = [4]
            sharding = { type = "replicated" }

            [[operands]]
            shape = [4]
        "#
        .parse()
        .unwrap();

        assert!(matches!(description.attributes(), Err(ShardingError::Config { .. })));
    }

    #[test]
    fn test_attributes_conflicting_output_sharding() {
        let description: LaunchDescription = r#"
            name = "f"
            output_sharding = { type = "replicated" }

            [[results]]
            shape = [4]
            sharding = { type = "replicated" }
        "#
        .parse()
        .unwrap();

        assert!(description.attributes().is_err());
    }

    #[test]
    fn test_build() {
        let description: LaunchDescription = ENCODER.parse().unwrap();
        let mut graph = InMemoryGraph::new();

        let launch = description.build(&mut graph).unwrap();

        assert_eq!(launch.operands.len(), 2);
        assert_eq!(
            launch.operand_types[1],
            TensorType::new(ElementType::I32, vec![4])
        );
        assert_eq!(launch.result_types, vec![TensorType::new(ElementType::F32, vec![8, 4])]);
        assert!(launch.attributes.contains_key(INPUT_SHARDING_ATTR));
        assert!(launch.attributes.contains_key(OUTPUT_SHARDING_ATTR));
        // launch + return
        assert_eq!(graph.num_operations(), 2);
        assert_eq!(graph.uses(launch.results[0]).len(), 1);
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", ENCODER).unwrap();

        let description = LaunchDescription::from_file(file.path()).unwrap();
        assert_eq!(description.name, "encoder");

        assert!(LaunchDescription::from_file("/nonexistent/launch.toml").is_err());
    }
}
