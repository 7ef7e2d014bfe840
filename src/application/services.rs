//! Application services and use cases

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::fetch_coordinator::{FetchCoordinator, FetchPolicy};
use super::scheduler::{Scheduler, SchedulerStats, SweepReport, SweepTrigger};
use crate::domain::alert::{Alert, AlertEvaluator, EvaluationPolicy, User};
use crate::domain::product::{PriceObservation, Product, ProductKey};
use crate::domain::retailer::RetailerRegistry;
use crate::infrastructure::notifier::{notifier_from_config, Notifier};
use crate::infrastructure::retailers::{PageClient, RetailerFetcherFactory};
use crate::infrastructure::storage::{PriceStore, SqlitePriceStore, StoreStats};
use crate::shared::config::MonitorConfig;
use crate::shared::errors::AppError;
use crate::shared::types::{AlertId, Price, UserId};

/// Highest target price accepted by `track_product`
pub const MAX_TARGET_PRICE: Price = 10_000.0;

/// Result of a track request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedProduct {
    pub product: Product,
    pub alert: Alert,
}

/// Store and scheduler figures together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStats {
    pub store: StoreStats,
    pub scheduler: SchedulerStats,
}

/// Surface offered to the command layer
pub struct PriceTrackingService {
    store: Arc<dyn PriceStore>,
    scheduler: Arc<Scheduler>,
}

impl PriceTrackingService {
    pub fn new(store: Arc<dyn PriceStore>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Wire the store, fetchers, notifier and scheduler described by `config`
    pub async fn from_config(config: &MonitorConfig) -> Result<Self, AppError> {
        let store: Arc<dyn PriceStore> = Arc::new(SqlitePriceStore::open(&config.database_path)?);

        let client = PageClient::new(config.request_timeout())?;
        let fetchers = RetailerFetcherFactory::new(client).create_all();
        let coordinator = Arc::new(FetchCoordinator::new(fetchers, FetchPolicy::from(config)));
        let evaluator = AlertEvaluator::new(EvaluationPolicy::from(config));
        let notifier: Arc<dyn Notifier> = notifier_from_config(config)?;

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            coordinator,
            evaluator,
            notifier,
            config,
        ));

        info!(
            database = %config.database_path.display(),
            rearm_policy = %config.rearm_policy,
            price_drop_gate = config.require_price_drop,
            "price tracking service ready"
        );
        Ok(Self::new(store, scheduler))
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn register_user(&self, user_id: &UserId) -> Result<User, AppError> {
        validate_user_id(user_id)?;
        let user = self.store.register_user(user_id, Utc::now()).await?;
        info!(user = %user_id, "user registered");
        Ok(user)
    }

    /// Resolve the URL, create the product on first sight, and create or
    /// re-arm this user's alert on it
    pub async fn track_product(&self, url: &str, user_id: &UserId, target_price: Price) -> Result<TrackedProduct, AppError> {
        validate_target_price(target_price)?;
        self.store.get_user(user_id).await?;
        let resolved = RetailerRegistry::resolve(url)?;

        let now = Utc::now();
        let product = self.store.upsert_product(&resolved, now).await?;
        let alert = self.store.upsert_alert(user_id, &product.key, target_price, now).await?;

        info!(
            user = %user_id,
            product = %product.key,
            target = target_price,
            alert = %alert.id,
            "tracking product"
        );
        Ok(TrackedProduct { product, alert })
    }

    /// Background sweep; `AlreadyRunning` if any process sharing the store is mid-sweep
    pub async fn trigger_sweep_now(&self) -> Result<SweepTrigger, AppError> {
        self.scheduler.trigger_sweep_now().await
    }

    /// One sweep in the caller's task
    pub async fn run_sweep(&self) -> Result<SweepReport, AppError> {
        self.scheduler.run_sweep().await
    }

    /// Newest alert first
    pub async fn get_active_alerts(&self, user_id: &UserId) -> Result<Vec<Alert>, AppError> {
        Ok(self.store.active_alerts_for_user(user_id).await?)
    }

    pub async fn cancel_alert(&self, user_id: &UserId, alert_id: AlertId) -> Result<Alert, AppError> {
        let alert = self.store.deactivate_alert(user_id, alert_id).await?;
        info!(user = %user_id, alert = %alert_id, "alert cancelled");
        Ok(alert)
    }

    pub async fn get_product(&self, key: &ProductKey) -> Result<Product, AppError> {
        Ok(self.store.get_product(key).await?)
    }

    pub async fn price_history(&self, key: &ProductKey, limit: usize) -> Result<Vec<PriceObservation>, AppError> {
        Ok(self.store.price_history(key, limit).await?)
    }

    pub async fn stats(&self) -> Result<ServiceStats, AppError> {
        Ok(ServiceStats {
            store: self.store.stats().await?,
            scheduler: self.scheduler.stats().await,
        })
    }
}

fn validate_user_id(user_id: &UserId) -> Result<(), AppError> {
    if user_id.as_str().trim().is_empty() {
        return Err(AppError::ValidationError("User id must not be empty".into()));
    }
    Ok(())
}

/// Target must be a positive amount no greater than `MAX_TARGET_PRICE`
pub fn validate_target_price(target_price: Price) -> Result<(), AppError> {
    if !target_price.is_finite() || target_price <= 0.0 {
        return Err(AppError::ValidationError("Target price must be greater than 0".into()));
    }
    if target_price > MAX_TARGET_PRICE {
        return Err(AppError::ValidationError(format!(
            "Target price must be at most {}",
            MAX_TARGET_PRICE
        )));
    }
    Ok(())
}
