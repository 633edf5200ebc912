//! Command-line driver.
//!
//! Chooses a topology, runs the distributed algorithm, and prints the
//! resulting tree as text or JSON.

use anyhow::Context;
use clap::Parser;

use minspan::config::{OutputFormat, Overrides, RunConfig, TopologyKind};
use minspan::runtime::RunReport;
use minspan::{runtime, topology};

#[derive(Parser, Debug)]
#[command(
    name = "minspan",
    about = "Distributed minimum spanning tree over asynchronous message-passing nodes"
)]
struct Cli {
    /// Graph layout to generate
    #[arg(long, value_enum)]
    topology: Option<TopologyKind>,

    /// Number of nodes
    #[arg(long)]
    nodes: Option<u32>,

    /// Seed for randomized edge weights (grid layout)
    #[arg(long)]
    seed: Option<u64>,

    /// Trace every send, receive, and postponement
    #[arg(long)]
    verbose: bool,

    /// Output format for the finished tree
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = RunConfig::resolve(Overrides {
        topology: cli.topology,
        nodes: cli.nodes,
        seed: cli.seed,
        verbose: cli.verbose,
        format: cli.format,
    })?;

    init_tracing(config.verbose);

    let topology = match config.topology {
        TopologyKind::Linear => topology::linear(config.nodes),
        TopologyKind::Complete => topology::complete(config.nodes),
        TopologyKind::Grid => topology::grid(config.nodes, config.seed),
    }
    .context("building topology")?;
    topology.validate().context("invalid topology")?;

    let report = runtime::run(&topology)
        .await
        .context("distributed run failed")?;

    render(&report, config.format)?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "minspan=trace"
    } else {
        "minspan=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn render(report: &RunReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            for edge in report.tree.edges() {
                println!("{} - {}  weight {}", edge.a, edge.b, edge.weight);
            }
            println!("total weight: {}", report.tree.total_weight());
        }
        OutputFormat::Json => {
            let rendered =
                serde_json::to_string_pretty(&report.tree).context("serializing tree")?;
            println!("{rendered}");
        }
    }
    Ok(())
}
