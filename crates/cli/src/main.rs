mod config;
mod render;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use callgraph_core::analysis::{AnalysisMonitor, CallGraphAnalysis, group_call_graph_by};
use callgraph_core::callstack::{
    CallStackStateProvider, GroupDescriptor, Grouping, SampledStacks, load_events, load_samples,
};
use callgraph_core::diff::{DiffMetric, diff_call_graphs};
use callgraph_core::model::{CallGraph, SymbolProvider};
use callgraph_core::views::{self, RankedSort};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

/// Aggregate call/return events into call graphs and inspect them.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    /// TOML file with analysis settings and address symbols
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the calling-context trees of each group
    Tree {
        /// JSON array of call events
        events: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Grouping level the trees are rolled up to
        #[arg(long, value_enum, default_value_t = GroupBy::Thread)]
        group_by: GroupBy,

        /// JSON array of sampled stack traces, folded into the calls they hit
        #[arg(long)]
        samples: Option<PathBuf>,
    },
    /// Print one row per function, across all trees
    Ranked {
        events: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,

        #[arg(long, value_enum, default_value_t = SortBy::Self_)]
        sort: SortBy,

        #[arg(long)]
        ascending: bool,
    },
    /// Print a left-heavy flame graph layout of all trees
    Flame {
        events: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Drop boxes lighter than this
        #[arg(long, default_value_t = 1)]
        min_weight: i64,
    },
    /// Compare the trees of a second trace against a baseline trace
    Diff {
        base: PathBuf,
        other: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,

        #[arg(long, value_enum, default_value_t = Metric::Duration)]
        metric: Metric,
    },
}

#[derive(clap::Args)]
struct AnalysisArgs {
    /// Only aggregate calls from this time on
    #[arg(long)]
    start: Option<i64>,

    /// Only aggregate calls up to this time
    #[arg(long)]
    end: Option<i64>,

    /// Deepest stack level to aggregate
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupBy {
    All,
    Process,
    Thread,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortBy {
    #[value(name = "self")]
    Self_,
    Total,
    Name,
    Count,
}

impl From<SortBy> for RankedSort {
    fn from(sort: SortBy) -> Self {
        match sort {
            SortBy::Self_ => RankedSort::SelfTime,
            SortBy::Total => RankedSort::TotalTime,
            SortBy::Name => RankedSort::Name,
            SortBy::Count => RankedSort::Count,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    Duration,
    SelfTime,
}

impl From<Metric> for DiffMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Duration => DiffMetric::Duration,
            Metric::SelfTime => DiffMetric::SelfTime,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout only carries the requested output.
    let level = cli.verbose.tracing_level_filter();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,callgraph_core={level},callgraph={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    let provider = config.symbol_provider()?;
    let symbols: [&dyn SymbolProvider; 1] = [&provider];

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match &cli.command {
        Commands::Tree {
            events,
            analysis,
            group_by,
            samples,
        } => {
            let mut analysis_run = Analysis::load(events, &config, analysis)?;
            if let Some(path) = samples {
                analysis_run = analysis_run.with_samples(path)?;
            }
            let graph = analysis_run.graph()?;
            let grouping = analysis_run.grouping(*group_by)?;
            let grouped = group_call_graph_by(grouping, &graph);
            let elements = views::element_snapshots(&grouped, &symbols);
            match cli.format {
                Format::Json => write_json(&mut out, &elements)?,
                Format::Text => render::write_elements(&mut out, &elements, config.time_unit)?,
            }
        }
        Commands::Ranked {
            events,
            analysis,
            sort,
            ascending,
        } => {
            let graph = Analysis::load(events, &config, analysis)?.graph()?;
            let entries = views::ranked_entries(&graph.merged_roots(), (*sort).into(), *ascending);
            match cli.format {
                Format::Json => write_json(&mut out, &entries)?,
                Format::Text => {
                    let rows: Vec<_> = entries.iter().map(|e| (e.symbol.resolve(&symbols), e)).collect();
                    render::write_ranked(&mut out, &rows, config.time_unit)?;
                }
            }
        }
        Commands::Flame {
            events,
            analysis,
            min_weight,
        } => {
            let graph = Analysis::load(events, &config, analysis)?.graph()?;
            let boxes = views::flame_layout(&graph.merged_roots(), *min_weight);
            match cli.format {
                Format::Json => write_json(&mut out, &boxes)?,
                Format::Text => {
                    let rows: Vec<_> = boxes.iter().map(|b| (b.symbol.resolve(&symbols), b)).collect();
                    render::write_flame(&mut out, &rows)?;
                }
            }
        }
        Commands::Diff {
            base,
            other,
            analysis,
            metric,
        } => {
            let baseline = Analysis::load(base, &config, analysis)?.graph()?;
            let compared = Analysis::load(other, &config, analysis)?.graph()?;
            let diffs = diff_call_graphs(&baseline, &compared, (*metric).into());
            let snapshots: Vec<DiffOutput> = diffs
                .iter()
                .map(|d| DiffOutput {
                    element: d.element.name.to_string(),
                    baseline: d.baseline.name.to_string(),
                    trees: d.trees.iter().map(|t| views::diff_snapshot(t, &symbols)).collect(),
                })
                .collect();
            match cli.format {
                Format::Json => write_json(&mut out, &snapshots)?,
                Format::Text => {
                    for diff in &snapshots {
                        let header = if diff.baseline == diff.element {
                            diff.element.clone()
                        } else {
                            format!("{} -> {}", diff.baseline, diff.element)
                        };
                        render::write_diff(&mut out, &header, &diff.trees, config.time_unit)?;
                    }
                }
            }
        }
    }
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct DiffOutput {
    element: String,
    baseline: String,
    trees: Vec<callgraph_protocol::DiffSnapshot>,
}

/// A call graph analysis over one events file, with the command-line
/// overrides applied on top of the configuration file.
struct Analysis {
    analysis: CallGraphAnalysis,
    window: Option<(i64, i64)>,
}

impl Analysis {
    fn load(path: &Path, config: &CliConfig, args: &AnalysisArgs) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let events = load_events(BufReader::new(file)).with_context(|| format!("reading {}", path.display()))?;
        info!(events = events.len(), path = %path.display(), "events loaded");

        let state_system = CallStackStateProvider::build(&events)?;
        let series = CallStackStateProvider::series(state_system)?;
        let mut analysis_config = config.analysis.clone();
        if args.max_depth.is_some() {
            analysis_config.max_depth = args.max_depth;
        }
        let window = match (args.start, args.end) {
            (None, None) => None,
            (start, end) => Some((start.unwrap_or(i64::MIN), end.unwrap_or(i64::MAX))),
        };
        Ok(Self {
            analysis: CallGraphAnalysis::new(vec![series]).with_config(analysis_config),
            window,
        })
    }

    fn with_samples(mut self, path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let samples = load_samples(BufReader::new(file)).with_context(|| format!("reading {}", path.display()))?;
        info!(samples = samples.len(), path = %path.display(), "samples loaded");
        self.analysis = self.analysis.with_sampling_source(Arc::new(SampledStacks::new(&samples)));
        Ok(self)
    }

    fn graph(&self) -> Result<Arc<CallGraph>> {
        if let Some((start, end)) = self.window {
            return Ok(Arc::new(self.analysis.call_graph_for_range(start, end)?));
        }
        if !self.analysis.execute(&AnalysisMonitor::new()).is_complete() {
            warn!("analysis did not complete, output is partial");
        }
        Ok(self.analysis.call_graph())
    }

    fn grouping(&self, group_by: GroupBy) -> Result<Grouping> {
        let Some(root) = self.analysis.group_descriptors().into_iter().next() else {
            return Ok(Grouping::All);
        };
        let descriptor: Option<&GroupDescriptor> = match group_by {
            GroupBy::All => return Ok(Grouping::All),
            GroupBy::Process => root.find("processes"),
            GroupBy::Thread => Some(root.leaf()),
        };
        descriptor
            .map(Grouping::from)
            .ok_or_else(|| anyhow!("no process level in this trace"))
    }
}

fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
