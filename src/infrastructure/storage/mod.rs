//! Persistence for users, products, price observations and alerts

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryPriceStore;
pub use sqlite_store::SqlitePriceStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::domain::alert::{Alert, AlertEvaluator, FiredAlert, RearmPolicy, User};
use crate::domain::product::{Observation, PriceObservation, Product, ProductKey};
use crate::domain::retailer::ResolvedProduct;
use crate::shared::errors::StoreError;
use crate::shared::types::{AlertId, Price, UserId};

/// Row counts across the store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub users: usize,
    pub products: usize,
    pub alerts: usize,
    pub active_alerts: usize,
    pub observations: usize,
    pub failed_observations: usize,
    pub alerts_fired: u64,
}

/// Owner of all persisted state.
///
/// Every mutation goes through these operations; callers never edit
/// products or alerts in place.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Register a new user. Registering twice is a constraint violation.
    async fn register_user(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<User, StoreError>;

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// Create the product on first track; return the existing row otherwise
    async fn upsert_product(&self, resolved: &ResolvedProduct, at: DateTime<Utc>) -> Result<Product, StoreError>;

    async fn get_product(&self, key: &ProductKey) -> Result<Product, StoreError>;

    /// One alert per (user, product): tracking again replaces the target and re-arms
    async fn upsert_alert(
        &self,
        user_id: &UserId,
        product: &ProductKey,
        target_price: Price,
        at: DateTime<Utc>,
    ) -> Result<Alert, StoreError>;

    /// Soft-delete an alert owned by `user_id`
    async fn deactivate_alert(&self, user_id: &UserId, alert_id: AlertId) -> Result<Alert, StoreError>;

    async fn active_alerts_for_user(&self, user_id: &UserId) -> Result<Vec<Alert>, StoreError>;

    async fn alerts_for_product(&self, key: &ProductKey) -> Result<Vec<Alert>, StoreError>;

    /// Distinct products with at least one active alert
    async fn tracked_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Append an observation without evaluating alerts
    async fn record_observation(&self, observation: &Observation) -> Result<(), StoreError>;

    /// Move an armed alert to fired at the observed `price`. Returns false if
    /// it was not armed.
    async fn mark_fired(
        &self,
        alert_id: AlertId,
        price: Price,
        fired_at: DateTime<Utc>,
        rearm_policy: RearmPolicy,
    ) -> Result<bool, StoreError>;

    /// Record the observation, evaluate the product's alerts and apply the
    /// resulting transitions as one atomic unit. Returns the alerts that fired.
    async fn commit_observation(
        &self,
        observation: &Observation,
        evaluator: &AlertEvaluator,
    ) -> Result<Vec<FiredAlert>, StoreError>;

    /// Newest first
    async fn price_history(&self, key: &ProductKey, limit: usize) -> Result<Vec<PriceObservation>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Claim the single sweep lease for `owner` until `now + ttl`. Returns
    /// false while a different owner holds an unexpired lease; the current
    /// holder may renew.
    async fn acquire_sweep_lease(&self, owner: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Drop the lease if `owner` still holds it
    async fn release_sweep_lease(&self, owner: &str) -> Result<(), StoreError>;
}

/// When a lease taken at `now` for `ttl` runs out
pub(crate) fn lease_expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
