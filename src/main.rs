use anyhow::{Context, Result};
use clap::Parser;
use livescope::cli::{self, ProjectArgs, WatchArgs};
use livescope::config::Config;
use livescope::expand::ExpandOptions;
use livescope::monitor::MonitorEvent;
use livescope::routes::RouteListing;
use livescope::scan::ScanOptions;
use livescope::watch::WatchConfig;
use livescope::{Project, rpc};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing(&args.log_level);

    match args.command {
        cli::Command::Routes { project, all } => {
            let project = open(&project)?;
            let extraction = project.extract_routes();
            let dominant = livescope::analysis::analyze(&extraction.graph);
            let routes = dominant.map(|node| RouteListing::flatten(&extraction.graph, &node.id));
            let output = if all {
                json!({
                    "root": dominant,
                    "nodes": extraction.graph,
                    "routes": routes,
                    "warnings": extraction.warnings,
                })
            } else {
                json!({
                    "root": dominant,
                    "routes": routes,
                    "warnings": extraction.warnings,
                })
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        cli::Command::Expand {
            project,
            file,
            function,
            max_depth,
        } => {
            let project = open(&project)?;
            let mut options = ExpandOptions::default();
            if let Some(max_depth) = max_depth {
                options.max_depth = max_depth;
            }
            let result = project.expand_function(&file, &function, options)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        cli::Command::Watch { project, watch } => {
            let config = watch_config(&project, &watch);
            let project = open(&project)?;
            let monitor = project.monitor(config.debounce);
            let events = monitor.subscribe();
            let _watcher = project.watch(config)?;
            for event in events {
                if let MonitorEvent::AnalysisCompleted { .. } = event {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
            Ok(())
        }
        cli::Command::Serve { project, watch } => {
            let config = watch_config(&project, &watch);
            rpc::serve(open(&project)?, config)
        }
        cli::Command::Request {
            project,
            method,
            params,
            params_file,
            id,
        } => {
            let params_raw = match params_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?,
                None => params,
            };
            let response = rpc::call(open(&project)?, &method, &params_raw, &id)?;
            println!("{response}");
            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(args: &ProjectArgs) -> Result<Project> {
    Project::open_with(&args.root, args.bridge, ScanOptions::new(args.no_ignore))
        .with_context(|| format!("open project at {}", args.root.display()))
}

fn watch_config(project: &ProjectArgs, watch: &WatchArgs) -> WatchConfig {
    let debounce_ms = watch.debounce_ms.unwrap_or(Config::get().debounce_ms);
    WatchConfig::new(watch.watch, debounce_ms, project.no_ignore)
}
