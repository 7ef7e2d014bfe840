//! Reliability wrapper around the retailer fetchers: per-attempt timeout,
//! retry with capped exponential backoff, and per-retailer request spacing.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, warn};

use crate::domain::product::{Listing, Observation, PriceObservation, Product};
use crate::domain::retailer::{Retailer, RetailerFetcher};
use crate::shared::config::MonitorConfig;
use crate::shared::errors::FetchError;

/// Retry and throttle settings
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Minimum spacing between two requests to the same retailer
    pub min_interval: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for FetchPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            max_retries: config.max_retries,
            backoff_base: config.backoff_base(),
            backoff_cap: config.backoff_cap(),
            min_interval: config.scraping_delay(),
        }
    }
}

impl FetchPolicy {
    /// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.backoff_cap)
    }
}

pub struct FetchCoordinator {
    fetchers: HashMap<Retailer, Arc<dyn RetailerFetcher>>,
    policy: FetchPolicy,
    /// Earliest instant the next request to each retailer may start
    next_slot: Mutex<HashMap<Retailer, Instant>>,
}

impl FetchCoordinator {
    pub fn new(fetchers: HashMap<Retailer, Arc<dyn RetailerFetcher>>, policy: FetchPolicy) -> Self {
        Self {
            fetchers,
            policy,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetch the product and turn the outcome into an observation.
    /// Terminal errors come back as a failed observation, never dropped.
    pub async fn observe(&self, product: &Product) -> Observation {
        match self.fetch(product).await {
            Ok(listing) => Observation {
                record: PriceObservation::success(product.key.clone(), listing.price, listing.available, Utc::now()),
                fetched_name: listing.name,
            },
            Err(e) => {
                warn!(product = %product.key, error = %e, "fetch failed");
                Observation {
                    record: PriceObservation::failed(product.key.clone(), &e, Utc::now()),
                    fetched_name: None,
                }
            }
        }
    }

    /// Up to `max_retries + 1` attempts. Only retryable errors are retried.
    pub async fn fetch(&self, product: &Product) -> Result<Listing, FetchError> {
        let retailer = product.key.retailer;
        let fetcher = self
            .fetchers
            .get(&retailer)
            .ok_or_else(|| FetchError::NetworkError(format!("no fetcher registered for {}", retailer)))?;

        let mut attempt = 0;
        loop {
            self.wait_for_slot(retailer).await;

            let result = match timeout(self.policy.timeout, fetcher.fetch(&product.key, &product.url)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout),
            };

            match result {
                Ok(listing) => {
                    debug!(product = %product.key, attempt, "fetch succeeded");
                    return Ok(listing);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        product = %product.key,
                        attempt,
                        error = %e,
                        "retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reserve the next request slot for `retailer` and wait for it
    async fn wait_for_slot(&self, retailer: Retailer) {
        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(&retailer).copied().filter(|t| *t > now).unwrap_or(now);
            slots.insert(retailer, slot + self.policy.min_interval);
            slot
        };

        if slot > Instant::now() {
            debug!(retailer = %retailer, "throttled for {:?}", slot - Instant::now());
            sleep_until(slot).await;
        }
    }
}
