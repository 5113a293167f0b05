//! Sitebalance CLI Tool
//!
//! Command line interface for planning and running cross-site rebalancing cycles

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sitebalance_core::config::loader::{get_config_path, load_config_from_path};
use sitebalance_core::Config;
use sitebalance_engine::{CycleOutcome, FleetSnapshot, MemoryStore, RebalanceService};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitebalance-cli")]
#[command(about = "A CLI tool for planning and running cross-site rebalancing cycles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
    },
    /// Plan transfers for a fleet snapshot without recording them
    Plan {
        /// Path to configuration file (defaults apply when absent)
        #[arg(short, long)]
        config: Option<String>,
        /// Path to fleet snapshot JSON
        #[arg(short, long)]
        fleet: String,
        /// Print the cycle outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one rebalancing cycle against a fleet snapshot
    Run {
        /// Path to configuration file (defaults apply when absent)
        #[arg(short, long)]
        config: Option<String>,
        /// Path to fleet snapshot JSON
        #[arg(short, long)]
        fleet: String,
        /// Write the updated fleet snapshot here
        #[arg(short, long)]
        output: Option<String>,
        /// Print the cycle outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run scheduled rebalancing cycles until interrupted
    Serve {
        /// Path to configuration file (defaults apply when absent)
        #[arg(short, long)]
        config: Option<String>,
        /// Path to fleet snapshot JSON
        #[arg(short, long)]
        fleet: String,
        /// Write the fleet snapshot here on shutdown
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 完全依赖RUST_LOG环境变量
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match load_config_from_path(&config).and_then(|cfg| cfg.validate().map(|_| cfg)) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!(
                        "  - thresholds: low {:.2}, high {:.2}, critical {:.2}, optimal [{:.2}, {:.2}]",
                        cfg.thresholds.low_load_threshold,
                        cfg.thresholds.high_load_threshold,
                        cfg.thresholds.critical_load_threshold,
                        cfg.thresholds.optimal_low(),
                        cfg.thresholds.optimal_high()
                    );
                    println!(
                        "  - up to {} transfers per source, {:.0}% of excess each",
                        cfg.planner.max_transfers_per_source,
                        cfg.planner.max_excess_fraction_per_transfer * 100.0
                    );
                    println!(
                        "  - cycle deadline {:.1}s, schedule every {}s",
                        cfg.collector.cycle_deadline_seconds, cfg.schedule.interval_seconds
                    );
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output } => {
            println!("Generating configuration file: {}", output);
            std::fs::write(&output, EXAMPLE_CONFIG)?;
            println!("✅ Configuration file generated successfully");
        }
        Commands::Plan { config, fleet, json } => {
            let (service, _) = build_service(config.as_deref(), &fleet)?;
            let outcome = service.plan_only().await?;
            print_outcome(&outcome, json)?;
        }
        Commands::Run {
            config,
            fleet,
            output,
            json,
        } => {
            let (service, store) = build_service(config.as_deref(), &fleet)?;
            let outcome = service.run_cycle().await?;
            service.flush_history().await;
            print_outcome(&outcome, json)?;

            if let Some(path) = output {
                write_snapshot(&store, &path)?;
            }
        }
        Commands::Serve {
            config,
            fleet,
            output,
        } => {
            let (service, store) = build_service(config.as_deref(), &fleet)?;
            let service = Arc::new(service);

            service.start().await?;
            println!("🔄 Rebalancing scheduler running, press Ctrl+C to stop");

            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");

            service.stop().await;
            service.flush_history().await;

            if let Some(metrics) = service.last_metrics() {
                println!(
                    "Last cycle: {} sites, {} transfers, efficiency {:.3}",
                    metrics.total_sites, metrics.total_transfers, metrics.efficiency_score
                );
            }
            if let Some(path) = output {
                write_snapshot(&store, &path)?;
            }
        }
    }

    Ok(())
}

/// 加载配置：显式路径必须存在，否则尝试默认路径，都没有时使用默认配置
fn load_cli_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => load_config_from_path(path)
            .with_context(|| format!("failed to load configuration from {}", path)),
        None => {
            let default_path = get_config_path();
            if Path::new(&default_path).exists() {
                info!("Using configuration file {}", default_path);
                load_config_from_path(&default_path)
                    .with_context(|| format!("failed to load configuration from {}", default_path))
            } else {
                info!("No configuration file found, using defaults");
                Ok(Config::default())
            }
        }
    }
}

fn build_service(config: Option<&str>, fleet: &str) -> Result<(RebalanceService, MemoryStore)> {
    let config = load_cli_config(config)?;
    let snapshot = FleetSnapshot::load_from_path(fleet)
        .with_context(|| format!("failed to load fleet snapshot from {}", fleet))?;
    info!(
        "Loaded fleet snapshot: {} sites, {} assignments",
        snapshot.sites.len(),
        snapshot.assignments.len()
    );

    // 保留趋势窗口外再多一天的历史，供趋势比较查找
    let store = MemoryStore::from_snapshot(snapshot)
        .with_history_retention(config.collector.trend_window_days.saturating_add(1));
    let service = RebalanceService::new(config, Arc::new(store.clone()))?;
    Ok((service, store))
}

fn write_snapshot(store: &MemoryStore, path: &str) -> Result<()> {
    std::fs::write(path, store.snapshot().to_json_pretty()?)
        .with_context(|| format!("failed to write fleet snapshot to {}", path))?;
    println!("💾 Fleet snapshot written to {}", path);
    Ok(())
}

fn print_outcome(outcome: &CycleOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    let metrics = &outcome.metrics;
    let title = if outcome.dry_run {
        "📋 Rebalancing Plan (dry run)"
    } else {
        "📊 Rebalancing Cycle"
    };
    println!("{}", title);
    println!("==================");
    println!("Total Sites: {}", metrics.total_sites);
    println!(
        "Buckets: critical {}, overloaded {}, optimal {}, underloaded {}",
        outcome.buckets.critical,
        outcome.buckets.overloaded,
        outcome.buckets.optimal,
        outcome.buckets.underloaded
    );
    println!("Average Load: {:.2}%", metrics.avg_load_percentage);
    println!("Load Variance: {:.2}", metrics.load_variance);
    println!("Efficiency Score: {:.3}", metrics.efficiency_score);
    println!("Processing Time: {:.3}s", metrics.processing_time_seconds);
    println!();

    if outcome.decisions.is_empty() {
        println!("✅ No transfers needed");
    } else {
        println!("🔀 Transfers ({})", outcome.decisions.len());
        for d in &outcome.decisions {
            println!(
                "  {} -> {}: {:.2} units, {} priority, {}, ~{} min, cost {:.2}, benefit {:.2}",
                d.source_site_id,
                d.target_site_id,
                d.volume_to_transfer,
                d.priority_level,
                d.transfer_method,
                d.estimated_duration_minutes,
                d.cost_impact,
                d.expected_benefit
            );
        }
    }

    if outcome.has_issues() {
        println!();
        println!("⚠️  Issues ({})", outcome.issues.len());
        for issue in &outcome.issues {
            println!("  {}", issue);
        }
    }

    Ok(())
}

const EXAMPLE_CONFIG: &str = r#"# Sitebalance Configuration File
# All values below are the defaults; remove any key to keep its default.

[thresholds]
# Fractions of site capacity
high_load_threshold = 0.85
low_load_threshold = 0.40
critical_load_threshold = 0.95
optimal_range = [0.60, 0.80]

[planner]
max_transfers_per_source = 2
max_excess_fraction_per_transfer = 0.30
transfer_unit_cost = 12.5
benefit_factor = 0.01
workload_type = "general"

[collector]
cycle_deadline_seconds = 2.0
collector_concurrency = 16
performance_window_days = 7
trend_window_days = 7
trend_delta_threshold = 10.0
history_buffer_size = 1024

[recorder]
decision_write_retries = 1
retry_backoff_ms = 50

[schedule]
interval_seconds = 300
run_on_start = true
"#;
