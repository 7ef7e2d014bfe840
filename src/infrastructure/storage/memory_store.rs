//! In-memory price store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{lease_expiry, PriceStore, StoreStats};
use crate::domain::alert::{Alert, AlertEvaluator, AlertTransition, FiredAlert, RearmPolicy, User};
use crate::domain::product::{Observation, PriceObservation, Product, ProductKey};
use crate::domain::retailer::ResolvedProduct;
use crate::shared::errors::StoreError;
use crate::shared::types::{AlertId, Price, UserId};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    products: HashMap<ProductKey, Product>,
    observations: HashMap<ProductKey, Vec<PriceObservation>>,
    alerts: HashMap<AlertId, Alert>,
    alerts_fired: u64,
    sweep_lease: Option<(String, DateTime<Utc>)>,
}

impl Tables {
    fn product_mut(&mut self, key: &ProductKey) -> Result<&mut Product, StoreError> {
        self.products
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("product {}", key)))
    }

    /// Append and fold into the product. Returns the previous successful price.
    fn append_observation(&mut self, observation: &Observation) -> Result<Option<Price>, StoreError> {
        let record = &observation.record;
        let product = self.product_mut(&record.product)?;
        let previous_price = product.last_price;
        product.apply_observation(record, observation.fetched_name.as_deref());

        self.observations
            .entry(record.product.clone())
            .or_default()
            .push(record.clone());
        Ok(previous_price)
    }

    fn apply_transition(&mut self, transition: &AlertTransition, rearm_policy: RearmPolicy) -> Result<bool, StoreError> {
        let alert_id = transition.alert_id();
        let alert = self
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))?;
        let applied = alert.apply(transition, rearm_policy);
        if applied && matches!(transition, AlertTransition::Fire { .. }) {
            self.alerts_fired += 1;
        }
        Ok(applied)
    }
}

/// Volatile `PriceStore` for tests and dry runs. All state sits behind one
/// lock, so each operation is a single transaction, but nothing is shared
/// with other processes.
#[derive(Default)]
pub struct MemoryPriceStore {
    tables: RwLock<Tables>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn register_user(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(user_id) {
            return Err(StoreError::ConstraintViolation(format!("user {} already registered", user_id)));
        }
        let user = User {
            id: user_id.clone(),
            registered_at: at,
        };
        tables.users.insert(user_id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    async fn upsert_product(&self, resolved: &ResolvedProduct, at: DateTime<Utc>) -> Result<Product, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.products.get(&resolved.key) {
            return Ok(existing.clone());
        }
        let product = Product::new(
            resolved.key.clone(),
            resolved.url.clone(),
            resolved.display_name.clone(),
            at,
        );
        tables.products.insert(product.key.clone(), product.clone());
        Ok(product)
    }

    async fn get_product(&self, key: &ProductKey) -> Result<Product, StoreError> {
        let tables = self.tables.read().await;
        tables
            .products
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("product {}", key)))
    }

    async fn upsert_alert(
        &self,
        user_id: &UserId,
        product: &ProductKey,
        target_price: Price,
        at: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(user_id) {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        if !tables.products.contains_key(product) {
            return Err(StoreError::NotFound(format!("product {}", product)));
        }

        let existing = tables
            .alerts
            .values()
            .find(|a| &a.user_id == user_id && &a.product == product)
            .map(|a| a.id);
        let alert = match existing.and_then(|id| tables.alerts.get_mut(&id)) {
            Some(alert) => {
                alert.retarget(target_price);
                alert.clone()
            }
            None => {
                let alert = Alert::new(user_id.clone(), product.clone(), target_price, at);
                tables.alerts.insert(alert.id, alert.clone());
                alert
            }
        };

        Ok(alert)
    }

    async fn deactivate_alert(&self, user_id: &UserId, alert_id: AlertId) -> Result<Alert, StoreError> {
        let mut tables = self.tables.write().await;
        let alert = tables
            .alerts
            .get_mut(&alert_id)
            .filter(|a| &a.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {} for user {}", alert_id, user_id)))?;
        alert.active = false;
        let alert = alert.clone();
        Ok(alert)
    }

    async fn active_alerts_for_user(&self, user_id: &UserId) -> Result<Vec<Alert>, StoreError> {
        let tables = self.tables.read().await;
        let mut alerts: Vec<Alert> = tables
            .alerts
            .values()
            .filter(|a| &a.user_id == user_id && a.active)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn alerts_for_product(&self, key: &ProductKey) -> Result<Vec<Alert>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.alerts.values().filter(|a| &a.product == key).cloned().collect())
    }

    async fn tracked_products(&self) -> Result<Vec<Product>, StoreError> {
        let tables = self.tables.read().await;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| tables.alerts.values().any(|a| a.active && a.product == p.key))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(products)
    }

    async fn record_observation(&self, observation: &Observation) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.append_observation(observation)?;
        Ok(())
    }

    async fn mark_fired(
        &self,
        alert_id: AlertId,
        price: Price,
        fired_at: DateTime<Utc>,
        rearm_policy: RearmPolicy,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let transition = AlertTransition::Fire {
            alert_id,
            price,
            fired_at,
        };
        tables.apply_transition(&transition, rearm_policy)
    }

    async fn commit_observation(
        &self,
        observation: &Observation,
        evaluator: &AlertEvaluator,
    ) -> Result<Vec<FiredAlert>, StoreError> {
        let mut tables = self.tables.write().await;
        let record = &observation.record;
        let previous_price = tables.append_observation(observation)?;

        let mut fired = Vec::new();
        if record.is_success() {
            let alerts: Vec<Alert> = tables
                .alerts
                .values()
                .filter(|a| a.active && a.product == record.product)
                .cloned()
                .collect();

            let rearm_policy = evaluator.policy().rearm_policy;
            for transition in evaluator.evaluate(previous_price, record, &alerts) {
                if !tables.apply_transition(&transition, rearm_policy)? {
                    continue;
                }
                if let AlertTransition::Fire { alert_id, .. } = transition {
                    let alert = tables.alerts[&alert_id].clone();
                    let product = tables.products[&record.product].clone();
                    fired.push(FiredAlert {
                        alert,
                        product,
                        observation: record.clone(),
                    });
                }
            }
        }

        Ok(fired)
    }

    async fn price_history(&self, key: &ProductKey, limit: usize) -> Result<Vec<PriceObservation>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.products.contains_key(key) {
            return Err(StoreError::NotFound(format!("product {}", key)));
        }
        Ok(tables
            .observations
            .get(key)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let tables = self.tables.read().await;
        let observations: usize = tables.observations.values().map(Vec::len).sum();
        let failed_observations = tables
            .observations
            .values()
            .flatten()
            .filter(|o| !o.is_success())
            .count();
        Ok(StoreStats {
            users: tables.users.len(),
            products: tables.products.len(),
            alerts: tables.alerts.len(),
            active_alerts: tables.alerts.values().filter(|a| a.active).count(),
            observations,
            failed_observations,
            alerts_fired: tables.alerts_fired,
        })
    }

    async fn acquire_sweep_lease(&self, owner: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some((holder, expires_at)) = &tables.sweep_lease {
            if holder != owner && *expires_at > now {
                return Ok(false);
            }
        }
        tables.sweep_lease = Some((owner.to_string(), lease_expiry(now, ttl)));
        Ok(true)
    }

    async fn release_sweep_lease(&self, owner: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.sweep_lease.as_ref().is_some_and(|(holder, _)| holder == owner) {
            tables.sweep_lease = None;
        }
        Ok(())
    }
}
