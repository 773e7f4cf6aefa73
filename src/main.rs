//! Sumi-Sweep main entry point
//!
//! This is the command-line interface for the Sumi-Sweep ID sweeper.

use clap::Parser;
use std::path::PathBuf;
use sumi_sweep::config::{load_config_with_hash, Config, OutputMode};
use sumi_sweep::crawler::{preview, run_sweep};
use sumi_sweep::output::{
    analyze_file, print_report, print_summary, resolve_tags, save_matches, AdultFilter,
    AnalysisFilter,
};
use sumi_sweep::storage::{last_indexed_id, record_output};
use tracing_subscriber::EnvFilter;

/// Sumi-Sweep: a polite sequential-ID page sweeper
///
/// Sumi-Sweep walks a numeric ID range on a remote site, classifies every
/// page, persists entries as they are found, and optionally downloads one
/// asset per entry under a storage budget. It stops at the end of the ID
/// space and backs off when the site starts serving blank pages.
#[derive(Parser, Debug)]
#[command(name = "sumi-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A polite sequential-ID page sweeper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Append to existing output and skip indexed IDs (overrides the config)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Truncate existing output and sweep the whole range
    #[arg(long, conflicts_with_all = ["resume", "continue_from_last"])]
    fresh: bool,

    /// Start right after the highest ID already in the output
    #[arg(long)]
    continue_from_last: bool,

    /// Validate config and show what would be swept without sweeping
    #[arg(long, conflicts_with = "analyze")]
    dry_run: bool,

    /// Analyze a metadata output and exit (defaults to the configured metadata path)
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "")]
    analyze: Option<PathBuf>,

    /// Tag that must be present (repeatable; a number selects a tag by popularity rank)
    #[arg(long = "require-tag", value_name = "TAG", requires = "analyze")]
    require_tags: Vec<String>,

    /// Tag of which at least one must be present (repeatable)
    #[arg(long = "any-tag", value_name = "TAG", requires = "analyze")]
    any_tags: Vec<String>,

    /// Only count completed entries
    #[arg(long, requires = "analyze")]
    completed_only: bool,

    /// Minimum like count
    #[arg(long, default_value_t = 0, requires = "analyze")]
    min_likes: u64,

    /// Minimum chapter count
    #[arg(long, default_value_t = 0, requires = "analyze")]
    min_chapters: u64,

    /// Adult entries: yes (only), no (exclude) or all
    #[arg(long, default_value = "all", requires = "analyze")]
    adult: AdultFilter,

    /// Number of popular tags to list
    #[arg(long, default_value_t = 50, requires = "analyze")]
    top_tags: usize,

    /// Save matching entries as "title, id" lines
    #[arg(long, value_name = "FILE", requires = "analyze")]
    save_results: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(path) = &cli.analyze {
        return handle_analyze(&cli, &config, path);
    }

    apply_overrides(&cli, &mut config)?;

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else {
        handle_sweep(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_sweep=info,warn"),
            1 => EnvFilter::new("sumi_sweep=debug,info"),
            2 => EnvFilter::new("sumi_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies the resume flags to the loaded configuration
fn apply_overrides(cli: &Cli, config: &mut Config) -> Result<(), Box<dyn std::error::Error>> {
    if cli.resume {
        config.session.resume = true;
    }
    if cli.fresh {
        config.session.resume = false;
    }

    if cli.continue_from_last {
        let Some((path, format)) = record_output(config) else {
            return Err("--continue-from-last needs a mode that writes records".into());
        };
        if config.session.mode == OutputMode::Rescrape {
            return Err("--continue-from-last cannot be used with rescrape mode".into());
        }

        match last_indexed_id(path, format)? {
            Some(last) => {
                let next = last.saturating_add(1).max(config.session.start_id);
                tracing::info!(
                    "Continuing from ID {} (last indexed: {})",
                    next,
                    last
                );
                config.session.start_id = next;
            }
            None => tracing::info!(
                "No indexed IDs in {}, starting from {}",
                path.display(),
                config.session.start_id
            ),
        }
        config.session.resume = true;
    }

    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be swept
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Sumi-Sweep Dry Run ===\n");

    println!("Session:");
    println!("  Mode: {:?}", config.session.mode);
    println!(
        "  ID range: {}..={} (width {})",
        config.session.start_id, config.session.end_id, config.session.id_width
    );
    println!("  Resume: {}", config.session.resume);
    println!("  Ignore forbidden: {}", config.session.ignore_forbidden);
    println!("  Record removed entries: {}", config.session.record_removed);

    println!("\nNetwork:");
    println!("  Base URL: {}", config.network.base_url);
    println!("  Concurrency: {}", config.network.concurrency);
    println!(
        "  Delay: {:.2}s - {:.2}s",
        config.network.min_delay, config.network.max_delay
    );
    println!("  User agents: {}", config.network.user_agents.len());
    println!("  Ban cooldown: {:.0}s", config.network.ban_cooldown);

    println!("\nOutput:");
    match record_output(config) {
        Some((path, format)) => println!("  Records: {} ({})", path.display(), format.as_str()),
        None => println!("  Records: none"),
    }
    println!("  Forbidden list: {}", config.output.forbidden_path.display());

    if config.downloads_assets() {
        println!("\nAssets:");
        println!("  Directory: {}", config.assets.directory.display());
        println!("  Storage limit: {:.2} GiB", config.assets.max_storage_gb);
        println!("  Adult assets: {}", config.assets.download_adult);
    }

    let plan = preview(config)?;
    println!("\nPlan:");
    println!("  Already indexed: {}", plan.already_indexed);
    println!("  Forbidden IDs: {}", plan.forbidden);
    match (plan.first, plan.last) {
        (Some(first), Some(last)) => println!(
            "  Candidates: {} (IDs {} to {})",
            plan.candidates, first, last
        ),
        _ => println!("  Candidates: 0"),
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would sweep {} IDs", plan.candidates);

    Ok(())
}

/// Handles the --analyze mode: reports on an existing metadata output
fn handle_analyze(
    cli: &Cli,
    config: &Config,
    path: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = if path.as_os_str().is_empty() {
        config.output.metadata_path.as_path()
    } else {
        path
    };
    println!("Metadata: {}\n", path.display());

    // First pass for tag ranks, so numeric tag arguments can be resolved
    let popular = analyze_file(path, &AnalysisFilter::default())?.tag_counts;

    let mut completed_labels = vec!["completed".to_string()];
    if !config.markers.completed_label.is_empty() {
        completed_labels.push(config.markers.completed_label.clone());
    }

    let filter = AnalysisFilter {
        required_tags: resolve_tags(&cli.require_tags, &popular),
        optional_tags: resolve_tags(&cli.any_tags, &popular),
        completed_only: cli.completed_only,
        completed_labels,
        min_likes: cli.min_likes,
        min_chapters: cli.min_chapters,
        adult: cli.adult,
    };
    tracing::debug!("Analysis filter: {:?}", filter);

    let report = analyze_file(path, &filter)?;
    print_report(&report, cli.top_tags);

    if let Some(out) = &cli.save_results {
        if report.matched.is_empty() {
            println!("\nNo matching entries, nothing saved.");
        } else {
            save_matches(out, &report.matched)?;
            println!("\n✓ Saved {} entries to: {}", report.matched.len(), out.display());
        }
    }

    Ok(())
}

/// Handles the main sweep operation
async fn handle_sweep(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.session.resume {
        tracing::info!("Resuming: already indexed IDs will be skipped");
    } else {
        tracing::info!("Starting fresh: existing output will be truncated");
    }

    let summary = match run_sweep(config).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Sweep failed: {}", e);
            return Err(e.into());
        }
    };

    print_summary(&summary);

    if summary.termination.is_fatal() {
        return Err(summary.termination.to_string().into());
    }
    Ok(())
}
