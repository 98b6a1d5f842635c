use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use depscope::compare::{Comparator, NpmInstaller, DEFAULT_INSTALL_TIMEOUT};
use depscope::config::AppConfig;
use depscope::export::{self, ExportData};
use depscope::graph::{DependencyGraph, Traversal, TraversalMode};
use depscope::source::{FixtureRepository, MetadataSource, NpmRegistry, NuGetRegistry, RegistryKind};
use depscope::ui::TreeNode;

#[derive(Parser)]
#[command(name = "depscope")]
#[command(author = "Zachary Woods <143150513+zach-fau@users.noreply.github.com>")]
#[command(version)]
#[command(about = "Transitive dependency graph builder with cycle detection and load-order analysis", long_about = None)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the dependency graph described by a config file
    Analyze {
        /// Path to the YAML configuration
        #[arg(short, long, default_value = "depscope.yaml")]
        config: PathBuf,

        /// Use the work-queue traversal instead of the recursive one
        #[arg(long)]
        iterative: bool,

        /// Override the configured depth bound
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Some(Commands::Analyze {
            config,
            iterative,
            max_depth,
        }) => analyze(&config, iterative, max_depth),
        Some(Commands::Version) => {
            println!("depscope v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            println!("depscope - transitive dependency graph builder");
            println!("Run 'depscope analyze --config <file>' to analyze a package");
            println!("Run 'depscope --help' for more information");
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn analyze(config_path: &Path, iterative: bool, max_depth: Option<usize>) -> Result<()> {
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if iterative {
        config.traversal = TraversalMode::Iterative;
    }
    if let Some(depth) = max_depth {
        config.max_depth = depth;
    }

    info!(
        package = %config.package,
        version = %config.version,
        max_depth = config.max_depth,
        traversal = %config.traversal,
        filter = %config.filter,
        test_mode = config.test_mode,
        registry = %config.registry,
        output_file = %config.output_file.display(),
        "Effective configuration"
    );

    let source = select_source(&config)?;

    let mut graph = DependencyGraph::new();
    let mut traversal = Traversal::new(&mut graph, &source, config.max_depth)
        .with_root_version(config.version.as_str())
        .with_filter(config.filter.as_str());
    if let Some(deadline) = config.deadline() {
        traversal = traversal.with_deadline(deadline);
    }
    let effective_depth = traversal.max_depth();
    let visited = traversal.run(config.traversal, &config.package);
    info!(visited = visited.len(), edges = graph.edge_count(), "Traversal finished");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "Dependency graph for {}@{}:", config.package, config.version)?;
    graph.write_summary(&mut out)?;
    writeln!(out)?;

    if graph.has_cycles() {
        writeln!(out, "Cycles: yes")?;
        for cycle in graph.cycle_groups() {
            writeln!(out, "  {}", cycle.cycle_path())?;
        }
    } else {
        writeln!(out, "Cycles: no")?;
    }
    writeln!(out)?;

    let load_order = graph.load_order();
    match &load_order {
        Ok(order) => writeln!(out, "Load order: {}", order.join(", "))?,
        Err(e) => writeln!(out, "Load order unavailable: {e}")?,
    }

    if config.ascii_tree {
        writeln!(out)?;
        write!(out, "{}", TreeNode::from_graph(&graph, &config.package).render())?;
    }

    fs::write(&config.output_file, graph.to_dot())
        .with_context(|| format!("writing {}", config.output_file.display()))?;
    writeln!(out)?;
    writeln!(out, "Graph written to {}", config.output_file.display())?;

    let comparison = if config.compare_npm {
        match &load_order {
            Ok(order) => Comparator::new(NpmInstaller::new(DEFAULT_INSTALL_TIMEOUT)).compare(
                &config.package,
                &config.version,
                order,
            ),
            Err(_) => {
                warn!("Skipping npm comparison: no load order");
                None
            }
        }
    } else {
        None
    };

    if let Some(export_config) = &config.export {
        let data = ExportData::new(config.package.as_str(), config.version.as_str(), &graph)
            .with_traversal(config.traversal, effective_depth)
            .with_comparison(comparison.clone());
        let mut file = fs::File::create(&export_config.path)
            .with_context(|| format!("creating {}", export_config.path.display()))?;
        export::export(export_config.format, &data, &mut file)
            .with_context(|| format!("writing {}", export_config.path.display()))?;
        writeln!(
            out,
            "{} report written to {}",
            export_config.format,
            export_config.path.display()
        )?;
    }

    if config.compare_npm {
        writeln!(out)?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out, "COMPARISON WITH NPM")?;
        writeln!(out, "{}", "=".repeat(60))?;
        match &comparison {
            Some(cmp) => cmp.write_summary(&mut out)?,
            None => writeln!(out, "Comparison unavailable")?,
        }
    }

    Ok(())
}

fn select_source(config: &AppConfig) -> Result<Box<dyn MetadataSource>> {
    if let Some(path) = config.fixture_path() {
        let repo = FixtureRepository::from_file(path)
            .with_context(|| format!("loading fixture {}", path.display()))?;
        info!(path = %path.display(), packages = repo.len(), "Using fixture repository");
        return Ok(Box::new(repo));
    }

    let url = config.registry_url();
    let source: Box<dyn MetadataSource> = match config.registry {
        RegistryKind::Npm => Box::new(
            NpmRegistry::new(url, config.fetch_timeout()).context("building registry client")?,
        ),
        RegistryKind::Nuget => Box::new(
            NuGetRegistry::new(url, config.fetch_timeout()).context("building registry client")?,
        ),
    };
    info!(registry = %config.registry, %url, "Using live registry");
    Ok(source)
}
