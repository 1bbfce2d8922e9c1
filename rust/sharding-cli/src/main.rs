//! Sharding partition planner
//!
//! Reads a TOML launch description, partitions it across logical cores and
//! prints the per-core assignment together with the rewritten graph.
//!
//! # Usage
//!
//! ```bash
//! # Partition with the core count declared in the description
//! shard-plan encoder.toml
//!
//! # Override the core count and emit TOML
//! shard-plan encoder.toml --num-cores 4 --format toml
//!
//! # Start from a configuration file
//! shard-plan encoder.toml --config sharding.toml
//! ```

mod description;
mod report;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use description::LaunchDescription;
use report::PartitionReport;
use sharding_core::graph::InMemoryGraph;
use sharding_core::{GraphSubstrate, ReportFormat, ShardingConfig, ShardingPass};

/// Sharding partition planner
#[derive(Parser, Debug)]
#[command(name = "shard-plan")]
#[command(about = "Partitions a sharded launch across logical cores")]
struct Args {
    /// Launch description (TOML)
    description: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of logical cores, overriding the description and configuration
    #[arg(short, long)]
    num_cores: Option<usize>,

    /// Report format (text, toml)
    #[arg(short, long)]
    format: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

/// Resolves the effective configuration: file or defaults, then environment,
/// then command-line flags.
fn load_config(args: &Args) -> sharding_core::Result<ShardingConfig> {
    let mut config = match &args.config {
        Some(path) => ShardingConfig::from_file(path)?,
        None => ShardingConfig::default(),
    }
    .with_env_overrides();

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &args.format {
        config.report.format = match format.to_lowercase().as_str() {
            "text" => ReportFormat::Text,
            "toml" => ReportFormat::Toml,
            other => {
                return Err(sharding_core::ShardingError::config(format!(
                    "unknown report format '{}' (expected text or toml)",
                    other
                )));
            }
        };
    }

    config.validate()?;
    Ok(config)
}

/// Partitions the described launch and renders the report.
fn plan(args: &Args, config: &ShardingConfig) -> sharding_core::Result<String> {
    let description = LaunchDescription::from_file(&args.description)?;

    let mut config = config.clone();
    if let Some(n) = args.num_cores.or(description.num_cores) {
        config.partition.num_cores_per_replica = n;
    }
    let pass = ShardingPass::from_config(&config)?;

    let mut graph = InMemoryGraph::new();
    let launch = description.build(&mut graph)?;
    let sharding_plan = pass.plan(&launch)?;
    let outcome = pass.run(&mut graph, &mut GraphSubstrate, &launch)?;

    PartitionReport::new(&launch, sharding_plan.output_sharding(), &outcome)
        .render(config.report.format, &graph)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&config.logging.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Planning {}", args.description.display());
    tracing::info!("  Cores per replica: {}", config.partition.num_cores_per_replica);
    tracing::info!("  Report format: {:?}", config.report.format);

    let report = plan(&args, &config)?;
    print!("{}", report);
    Ok(())
}
