//! Test doubles shared by the application tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::fetch_coordinator::{FetchCoordinator, FetchPolicy};
use crate::domain::alert::{Alert, AlertEvaluator, FiredAlert, RearmPolicy, User};
use crate::domain::product::{Listing, Observation, PriceObservation, Product, ProductKey};
use crate::domain::retailer::{ResolvedProduct, Retailer, RetailerFetcher};
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::storage::{MemoryPriceStore, PriceStore, StoreStats};
use crate::shared::errors::{DeliveryError, FetchError, StoreError};
use crate::shared::types::{AlertId, Price, UserId};

/// Fetcher that replays a queue of results per product reference.
/// An exhausted queue answers `NotFound`.
pub struct ScriptedFetcher {
    retailer: Retailer,
    script: Mutex<HashMap<String, VecDeque<Result<Listing, FetchError>>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    delay: Duration,
}

impl ScriptedFetcher {
    pub fn new(retailer: Retailer) -> Self {
        Self {
            retailer,
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, product_ref: &str, result: Result<Listing, FetchError>) {
        self.script
            .lock()
            .unwrap()
            .entry(product_ref.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn push_price(&self, product_ref: &str, price: f64, available: bool) {
        self.push(
            product_ref,
            Ok(Listing {
                price,
                available,
                name: None,
            }),
        );
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl RetailerFetcher for ScriptedFetcher {
    fn retailer(&self) -> Retailer {
        self.retailer
    }

    async fn fetch(&self, key: &ProductKey, _url: &str) -> Result<Listing, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((key.product_ref.clone(), Instant::now()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .get_mut(&key.product_ref)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(FetchError::NotFound))
    }
}

pub fn coordinator_with(fetcher: Arc<ScriptedFetcher>, policy: FetchPolicy) -> FetchCoordinator {
    let mut fetchers: HashMap<Retailer, Arc<dyn RetailerFetcher>> = HashMap::new();
    fetchers.insert(fetcher.retailer, fetcher);
    FetchCoordinator::new(fetchers, policy)
}

/// Policy with no throttle and short backoff
pub fn fast_policy() -> FetchPolicy {
    FetchPolicy {
        timeout: Duration::from_secs(30),
        max_retries: 3,
        backoff_base: Duration::from_millis(10),
        backoff_cap: Duration::from_secs(1),
        min_interval: Duration::ZERO,
    }
}

pub fn product(retailer: Retailer, product_ref: &str) -> Product {
    Product::new(
        ProductKey::new(retailer, product_ref),
        format!("https://{}/item/{}", retailer.domain(), product_ref),
        format!("Item {}", product_ref),
        Utc::now(),
    )
}

/// Notifier that keeps every message it is given
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user_id: &UserId, message: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push((user_id.clone(), message.to_string()));
        Ok(())
    }
}

/// Notifier whose channel is always down
#[derive(Default)]
pub struct FailingNotifier {
    attempts: Mutex<usize>,
}

impl FailingNotifier {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _user_id: &UserId, _message: &str) -> Result<(), DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        Err(DeliveryError("channel unavailable".into()))
    }
}

/// Store that refuses to commit observations for chosen products and
/// delegates everything else to an in-memory store
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryPriceStore,
    broken: Mutex<HashSet<ProductKey>>,
}

impl FlakyStore {
    pub fn fail_commits_for(&self, key: &ProductKey) {
        self.broken.lock().unwrap().insert(key.clone());
    }
}

#[async_trait]
impl PriceStore for FlakyStore {
    async fn register_user(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<User, StoreError> {
        self.inner.register_user(user_id, at).await
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        self.inner.get_user(user_id).await
    }

    async fn upsert_product(&self, resolved: &ResolvedProduct, at: DateTime<Utc>) -> Result<Product, StoreError> {
        self.inner.upsert_product(resolved, at).await
    }

    async fn get_product(&self, key: &ProductKey) -> Result<Product, StoreError> {
        self.inner.get_product(key).await
    }

    async fn upsert_alert(
        &self,
        user_id: &UserId,
        product: &ProductKey,
        target_price: Price,
        at: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        self.inner.upsert_alert(user_id, product, target_price, at).await
    }

    async fn deactivate_alert(&self, user_id: &UserId, alert_id: AlertId) -> Result<Alert, StoreError> {
        self.inner.deactivate_alert(user_id, alert_id).await
    }

    async fn active_alerts_for_user(&self, user_id: &UserId) -> Result<Vec<Alert>, StoreError> {
        self.inner.active_alerts_for_user(user_id).await
    }

    async fn alerts_for_product(&self, key: &ProductKey) -> Result<Vec<Alert>, StoreError> {
        self.inner.alerts_for_product(key).await
    }

    async fn tracked_products(&self) -> Result<Vec<Product>, StoreError> {
        self.inner.tracked_products().await
    }

    async fn record_observation(&self, observation: &Observation) -> Result<(), StoreError> {
        self.inner.record_observation(observation).await
    }

    async fn mark_fired(
        &self,
        alert_id: AlertId,
        price: Price,
        fired_at: DateTime<Utc>,
        rearm_policy: RearmPolicy,
    ) -> Result<bool, StoreError> {
        self.inner.mark_fired(alert_id, price, fired_at, rearm_policy).await
    }

    async fn commit_observation(
        &self,
        observation: &Observation,
        evaluator: &AlertEvaluator,
    ) -> Result<Vec<FiredAlert>, StoreError> {
        if self.broken.lock().unwrap().contains(&observation.record.product) {
            return Err(StoreError::Unavailable("disk I/O error".into()));
        }
        self.inner.commit_observation(observation, evaluator).await
    }

    async fn price_history(&self, key: &ProductKey, limit: usize) -> Result<Vec<PriceObservation>, StoreError> {
        self.inner.price_history(key, limit).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.stats().await
    }

    async fn acquire_sweep_lease(&self, owner: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.acquire_sweep_lease(owner, ttl, now).await
    }

    async fn release_sweep_lease(&self, owner: &str) -> Result<(), StoreError> {
        self.inner.release_sweep_lease(owner).await
    }
}
