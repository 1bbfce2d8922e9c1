// rust/sharding-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardingError {

    #[error("Malformed sharding on '{op}' (attribute '{attribute}'): {reason}")]
    MalformedSharding {
        op: String,
        attribute: String,
        reason: String,
    },

    #[error("Unsupported sharding kind '{kind}' on '{op}' (attribute '{attribute}')")]
    UnsupportedShardingKind {
        op: String,
        attribute: String,
        kind: String,
    },

    #[error("'{op}' has {actual} input shardings but {expected} operands")]
    OperandCountMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },

    #[error("'{op}' has {actual} output shardings but {expected} results")]
    ResultCountMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },

    #[error("Core id {core_id} on '{op}' out of range (num cores: {num_cores})")]
    InvalidCoreId {
        op: String,
        core_id: i64,
        num_cores: usize,
    },

    #[error("Tile grid overflow on '{op}': {reason}")]
    TileGridOverflow {
        op: String,
        reason: String,
    },

    #[error("Tiled output sharding on '{op}' covers {grid_size} tiles, expected exactly one per core ({num_cores} cores)")]
    TileGridSizeMismatch {
        op: String,
        grid_size: usize,
        num_cores: usize,
    },

    #[error("Result {result_index} of '{op}': dimension {dim} of size {size} is not divisible into {tiles} tiles")]
    IndivisibleShape {
        op: String,
        result_index: usize,
        dim: usize,
        size: usize,
        tiles: usize,
    },

    #[error("Graph error: {message}")]
    Graph {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, ShardingError>;

// Convenience constructors
impl ShardingError {

    pub fn malformed(
        op: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedSharding {
            op: op.into(),
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(
        op: impl Into<String>,
        attribute: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self::UnsupportedShardingKind {
            op: op.into(),
            attribute: attribute.into(),
            kind: kind.into(),
        }
    }

    pub fn operand_count(op: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::OperandCountMismatch { op: op.into(), expected, actual }
    }

    pub fn result_count(op: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ResultCountMismatch { op: op.into(), expected, actual }
    }

    pub fn invalid_core(op: impl Into<String>, core_id: i64, num_cores: usize) -> Self {
        Self::InvalidCoreId {
            op: op.into(),
            core_id,
            num_cores,
        }
    }

    pub fn tile_overflow(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TileGridOverflow {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn grid_size(op: impl Into<String>, grid_size: usize, num_cores: usize) -> Self {
        Self::TileGridSizeMismatch { op: op.into(), grid_size, num_cores }
    }

    pub fn graph(message: impl Into<String>) -> Self {
        Self::Graph {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
