//! CLI commands and handlers
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::scheduler::{Scheduler, SweepReport};
use crate::application::services::PriceTrackingService;
use crate::domain::product::{FetchStatus, ProductKey};
use crate::shared::config::MonitorConfig;
use crate::shared::errors::AppError;
use crate::shared::types::{AlertId, UserId};
use crate::shared::utils::{format_price, truncate_text};

#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(version, about = "Retail price monitor with drop alerts")]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./Config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the periodic scheduler until Ctrl-C
    Run {
        /// Seconds between sweeps (overrides PRICE_CHECK_INTERVAL)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Parallel fetches per sweep (overrides WORKER_POOL_SIZE)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run exactly one sweep and print the report
    Sweep,

    /// Register a user
    Register { user_id: String },

    /// Track a product URL for a user at a target price
    Track {
        url: String,
        user_id: String,
        target_price: f64,
    },

    /// Cancel one of a user's alerts
    Untrack { user_id: String, alert_id: String },

    /// List a user's active alerts
    Alerts { user_id: String },

    /// Show recent observations for a product (`walmart:123`)
    History {
        product_key: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show store and scheduler statistics
    Stats,
}

impl Commands {
    /// Fold command-line overrides into the loaded config
    pub fn apply_overrides(&self, config: &mut MonitorConfig) {
        if let Commands::Run { interval, workers } = self {
            if let Some(interval) = interval {
                config.price_check_interval_secs = *interval;
            }
            if let Some(workers) = workers {
                config.worker_pool_size = *workers;
            }
        }
    }
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, config: MonitorConfig) -> Result<(), AppError> {
        let service = PriceTrackingService::from_config(&config).await?;

        match command {
            Commands::Run { .. } => Self::execute_run_command(service).await,
            Commands::Sweep => Self::execute_sweep_command(service).await,
            Commands::Register { user_id } => {
                let user = service.register_user(&UserId::new(user_id)).await?;
                println!("✅ Registered {} at {}", user.id, user.registered_at.format("%Y-%m-%d %H:%M UTC"));
                Ok(())
            }
            Commands::Track { url, user_id, target_price } => {
                let tracked = service
                    .track_product(&url, &UserId::new(user_id), target_price)
                    .await?;
                println!("✅ Tracking {} ({})", tracked.product.name, tracked.product.key);
                println!("   Target price: {}", format_price(tracked.alert.target_price));
                println!("   Alert id:     {}", tracked.alert.id);
                Ok(())
            }
            Commands::Untrack { user_id, alert_id } => {
                let alert_id: AlertId = alert_id
                    .parse()
                    .map_err(|e| AppError::ValidationError(format!("Invalid alert id: {}", e)))?;
                let alert = service.cancel_alert(&UserId::new(user_id), alert_id).await?;
                println!("🗑️  Alert {} on {} cancelled", alert.id, alert.product);
                Ok(())
            }
            Commands::Alerts { user_id } => Self::execute_alerts_command(service, UserId::new(user_id)).await,
            Commands::History { product_key, limit } => {
                let key: ProductKey = product_key.parse()?;
                Self::execute_history_command(service, key, limit).await
            }
            Commands::Stats => {
                let stats = service.stats().await?;
                println!("📊 Users:         {}", stats.store.users);
                println!("   Products:      {}", stats.store.products);
                println!("   Alerts:        {} ({} active)", stats.store.alerts, stats.store.active_alerts);
                println!(
                    "   Observations:  {} ({} failed)",
                    stats.store.observations, stats.store.failed_observations
                );
                println!("   Alerts fired:  {}", stats.store.alerts_fired);
                Ok(())
            }
        }
    }

    async fn execute_run_command(service: PriceTrackingService) -> Result<(), AppError> {
        let scheduler = Arc::clone(service.scheduler());
        shutdown_on_ctrl_c(Arc::clone(&scheduler));
        scheduler.run().await;

        let stats = service.stats().await?;
        info!(
            sweeps = stats.scheduler.sweeps_completed,
            checks = stats.scheduler.total_checks,
            alerts = stats.scheduler.total_alerts_fired,
            "scheduler summary"
        );
        Ok(())
    }

    async fn execute_sweep_command(service: PriceTrackingService) -> Result<(), AppError> {
        shutdown_on_ctrl_c(Arc::clone(service.scheduler()));
        match service.run_sweep().await {
            Ok(report) => {
                print_report(&report);
                Ok(())
            }
            Err(AppError::SweepInProgress) => {
                println!("⏳ Another sweep is already running against this database, try again later");
                Err(AppError::SweepInProgress)
            }
            Err(e) => Err(e),
        }
    }

    async fn execute_alerts_command(service: PriceTrackingService, user_id: UserId) -> Result<(), AppError> {
        let alerts = service.get_active_alerts(&user_id).await?;
        if alerts.is_empty() {
            println!("No active alerts for {}", user_id);
            return Ok(());
        }

        println!("🔔 {} active alert(s) for {}:", alerts.len(), user_id);
        for alert in alerts {
            let product = service.get_product(&alert.product).await?;
            let current = product
                .last_price
                .map(format_price)
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "   {} | {:<40} | target {} | current {} | {:?}",
                alert.id,
                truncate_text(&product.name, 40),
                format_price(alert.target_price),
                current,
                alert.state
            );
        }
        Ok(())
    }

    async fn execute_history_command(
        service: PriceTrackingService,
        key: ProductKey,
        limit: usize,
    ) -> Result<(), AppError> {
        let product = service.get_product(&key).await?;
        let history = service.price_history(&key, limit).await?;
        println!("📈 {} ({})", product.name, key);
        for observation in history {
            let line = match (&observation.fetch_status, observation.price) {
                (FetchStatus::Success, Some(price)) => format!(
                    "{} {}",
                    format_price(price),
                    if observation.available { "in stock" } else { "unavailable" }
                ),
                (FetchStatus::Failed { error }, _) => format!("failed: {}", error),
                (FetchStatus::Success, None) => "no price".to_string(),
            };
            println!("   {}  {}", observation.observed_at.format("%Y-%m-%d %H:%M"), line);
        }
        Ok(())
    }
}

/// Cancel the scheduler's sweeps when Ctrl-C arrives
fn shutdown_on_ctrl_c(scheduler: Arc<Scheduler>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => warn!(error = %e, "could not listen for Ctrl-C, shutting down"),
        }
        scheduler.shutdown();
    });
}

fn print_report(report: &SweepReport) {
    println!("🔄 Sweep finished in {:.1}s", report.duration.as_secs_f64());
    println!("   Products checked:  {}", report.products_checked);
    println!("   Failed fetches:    {}", report.failed_fetches);
    println!("   Store errors:      {}", report.store_errors);
    println!("   Alerts fired:      {}", report.alerts_fired);
    println!("   Delivery failures: {}", report.delivery_failures);
}
