use anyhow::{bail, Result};
use clap::Parser;
use muestreo::cli::{Cli, Command, OutputFormat};
use muestreo::config::InstrumentConfig;
use muestreo::instrumentor::EligibilityRules;
use muestreo::summary::CacheSummary;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_summary(cache: &Path, format: OutputFormat, function: Option<&str>) -> Result<()> {
    let mut summary = CacheSummary::from_file(cache)?;
    if let Some(name) = function {
        summary = summary.only(name);
        if summary.is_empty() {
            bail!("No samples recorded for {}", name);
        }
    }

    match format {
        OutputFormat::Text => summary.print_table()?,
        OutputFormat::Json => println!("{}", summary.to_json()?),
    }
    Ok(())
}

fn run_check(path: &Path, workspace_root: Option<PathBuf>, config: Option<&Path>) -> Result<()> {
    let config = match (config, workspace_root) {
        (Some(file), root) => {
            let mut config = InstrumentConfig::from_file(file)?;
            if let Some(root) = root {
                config.workspace_root = root;
            }
            config
        }
        // Only the skip rules matter here, so the cache location stays unset
        (None, Some(root)) => InstrumentConfig::new(PathBuf::new(), root),
        (None, None) => bail!("Must specify --workspace-root or --config"),
    };

    let rules = EligibilityRules::from_config(&config);
    tracing::debug!("Checking {} against {}", path.display(), rules.workspace_root().display());

    match rules.classify(Some(path)) {
        None => println!("instrument: {}", path.display()),
        Some(reason) => println!("skip: {} ({})", path.display(), reason),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match args.command {
        Command::Summary {
            cache,
            format,
            function,
        } => run_summary(&cache, format, function.as_deref()),
        Command::Check {
            path,
            workspace_root,
            config,
        } => run_check(&path, workspace_root, config.as_deref()),
    }
}
