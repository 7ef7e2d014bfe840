//! Periodic sweep driver

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::fetch_coordinator::FetchCoordinator;
use crate::domain::alert::AlertEvaluator;
use crate::domain::product::Product;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::storage::PriceStore;
use crate::shared::config::MonitorConfig;
use crate::shared::errors::AppError;

/// Answer to a manual sweep request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepTrigger {
    Accepted,
    AlreadyRunning,
}

/// Outcome of one sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub products_checked: usize,
    pub failed_fetches: usize,
    pub store_errors: usize,
    pub alerts_fired: usize,
    pub delivery_failures: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub sweeps_completed: u64,
    pub last_sweep_started_at: Option<DateTime<Utc>>,
    pub last_sweep_finished_at: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub total_alerts_fired: u64,
}

#[derive(Debug, Default)]
struct ProductOutcome {
    fetch_failed: bool,
    store_error: bool,
    alerts_fired: usize,
    delivery_failures: usize,
}

/// Holds the "sweep in progress" flag; clears it on drop, including when the
/// sweep future is cancelled.
struct SweepGuard {
    flag: Arc<AtomicBool>,
}

impl SweepGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: Arc::clone(flag) })
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    store: Arc<dyn PriceStore>,
    coordinator: Arc<FetchCoordinator>,
    evaluator: AlertEvaluator,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    pool_size: usize,
    /// Lease holder name, unique per scheduler instance
    owner: String,
    lease_ttl: Duration,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    stats: RwLock<SchedulerStats>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn PriceStore>,
        coordinator: Arc<FetchCoordinator>,
        evaluator: AlertEvaluator,
        notifier: Arc<dyn Notifier>,
        config: &MonitorConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            coordinator,
            evaluator,
            notifier,
            interval: config.price_check_interval(),
            pool_size: config.worker_pool_size.max(1),
            owner: format!("pid{}-{}", std::process::id(), Uuid::new_v4()),
            lease_ttl: config.sweep_lease(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            stats: RwLock::new(SchedulerStats::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> SchedulerStats {
        let mut stats = self.stats.read().await.clone();
        stats.running = self.is_running();
        stats
    }

    /// Stop `run` and cancel every sweep in flight, triggered ones included.
    /// Sweeps requested afterwards are cancelled before they fetch anything.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Run one sweep now, in the caller's task
    pub async fn run_sweep(&self) -> Result<SweepReport, AppError> {
        let guard = self.begin_sweep().await?;
        self.sweep_until_shutdown(guard).await
    }

    /// Start a sweep in the background unless one is already in progress
    /// here or in another process sharing the store
    pub async fn trigger_sweep_now(self: &Arc<Self>) -> Result<SweepTrigger, AppError> {
        let guard = match self.begin_sweep().await {
            Ok(guard) => guard,
            Err(AppError::SweepInProgress) => {
                info!("manual sweep rejected, a sweep is already running");
                return Ok(SweepTrigger::AlreadyRunning);
            }
            Err(e) => return Err(e),
        };

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = scheduler.sweep_until_shutdown(guard).await {
                debug!(error = %e, "manual sweep ended early");
            }
        });
        info!("manual sweep started");
        Ok(SweepTrigger::Accepted)
    }

    /// Tick every `interval` until `shutdown` is called. A shutdown during a
    /// sweep abandons the in-flight fetches.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.interval, workers = self.pool_size, owner = %self.owner, "scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => break,
                _ = ticker.tick() => {
                    match self.begin_sweep().await {
                        Ok(guard) => {
                            if let Err(AppError::SweepCancelled) = self.sweep_until_shutdown(guard).await {
                                break;
                            }
                        }
                        Err(AppError::SweepInProgress) => warn!("another sweep is still running, skipping tick"),
                        Err(e) => error!(error = %e, "could not start sweep"),
                    }
                }
            }
        }

        info!("scheduler stopped");
    }

    /// Claim the in-process flag, then the store-wide lease
    async fn begin_sweep(&self) -> Result<SweepGuard, AppError> {
        let guard = SweepGuard::acquire(&self.running).ok_or(AppError::SweepInProgress)?;
        if !self
            .store
            .acquire_sweep_lease(&self.owner, self.lease_ttl, Utc::now())
            .await?
        {
            return Err(AppError::SweepInProgress);
        }
        Ok(guard)
    }

    async fn sweep_until_shutdown(&self, guard: SweepGuard) -> Result<SweepReport, AppError> {
        let mut shutdown = self.shutdown.subscribe();
        let result = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => {
                warn!("shutdown during sweep, discarding in-flight fetches");
                Err(AppError::SweepCancelled)
            }
            report = self.sweep(guard) => Ok(report),
        };

        if let Err(e) = self.store.release_sweep_lease(&self.owner).await {
            warn!(error = %e, "could not release sweep lease, it will expire");
        }
        result
    }

    async fn renew_lease(&self) {
        match self
            .store
            .acquire_sweep_lease(&self.owner, self.lease_ttl, Utc::now())
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(owner = %self.owner, "sweep lease taken over by another process"),
            Err(e) => warn!(error = %e, "could not renew sweep lease"),
        }
    }

    async fn sweep(&self, _guard: SweepGuard) -> SweepReport {
        let started = Instant::now();
        let started_at = Utc::now();
        self.stats.write().await.last_sweep_started_at = Some(started_at);

        let products = match self.store.tracked_products().await {
            Ok(products) => products,
            Err(e) => {
                error!(error = %e, "could not list tracked products");
                Vec::new()
            }
        };
        info!(products = products.len(), "sweep started");

        let outcomes: Vec<ProductOutcome> = stream::iter(products)
            .map(|product| self.process_product(product))
            .buffer_unordered(self.pool_size)
            .collect()
            .await;

        let report = SweepReport {
            started_at,
            finished_at: Utc::now(),
            products_checked: outcomes.len(),
            failed_fetches: outcomes.iter().filter(|o| o.fetch_failed).count(),
            store_errors: outcomes.iter().filter(|o| o.store_error).count(),
            alerts_fired: outcomes.iter().map(|o| o.alerts_fired).sum(),
            delivery_failures: outcomes.iter().map(|o| o.delivery_failures).sum(),
            duration: started.elapsed(),
        };

        {
            let mut stats = self.stats.write().await;
            stats.sweeps_completed += 1;
            stats.last_sweep_finished_at = Some(report.finished_at);
            stats.total_checks += report.products_checked as u64;
            stats.total_alerts_fired += report.alerts_fired as u64;
        }

        info!(
            checked = report.products_checked,
            failed = report.failed_fetches,
            store_errors = report.store_errors,
            alerts = report.alerts_fired,
            delivery_failures = report.delivery_failures,
            "sweep finished in {:?}",
            report.duration
        );
        report
    }

    /// Fetch, commit, notify. Errors stay inside this product.
    async fn process_product(&self, product: Product) -> ProductOutcome {
        let observation = self.coordinator.observe(&product).await;
        let mut outcome = ProductOutcome {
            fetch_failed: !observation.record.is_success(),
            ..ProductOutcome::default()
        };

        let fired = match self.store.commit_observation(&observation, &self.evaluator).await {
            Ok(fired) => fired,
            Err(e) => {
                error!(product = %product.key, error = %e, "failed to store observation, skipping product");
                outcome.store_error = true;
                Vec::new()
            }
        };

        for fired_alert in fired {
            outcome.alerts_fired += 1;
            let notification = fired_alert.notification();
            info!(
                product = %product.key,
                user = %notification.user_id,
                price = notification.price,
                target = notification.target_price,
                "alert fired"
            );
            if let Err(e) = self.notifier.send(&notification.user_id, &notification.to_string()).await {
                error!(user = %notification.user_id, error = %e, "alert delivery failed");
                outcome.delivery_failures += 1;
            }
        }

        self.renew_lease().await;
        debug!(product = %product.key, fired = outcome.alerts_fired, "product processed");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{
        coordinator_with, fast_policy, FailingNotifier, FlakyStore, RecordingNotifier, ScriptedFetcher,
    };
    use crate::domain::alert::AlertState;
    use crate::domain::product::ProductKey;
    use crate::domain::retailer::{Retailer, RetailerRegistry};
    use crate::infrastructure::storage::MemoryPriceStore;
    use crate::shared::errors::FetchError;
    use crate::shared::types::UserId;

    struct Harness {
        store: Arc<MemoryPriceStore>,
        fetcher: Arc<ScriptedFetcher>,
        scheduler: Arc<Scheduler>,
    }

    fn scheduler_over(store: Arc<dyn PriceStore>, fetcher: Arc<ScriptedFetcher>, notifier: Arc<dyn Notifier>) -> Arc<Scheduler> {
        let config = MonitorConfig {
            price_check_interval_secs: 100,
            ..MonitorConfig::default()
        };
        let coordinator = Arc::new(coordinator_with(fetcher, fast_policy()));
        Arc::new(Scheduler::new(store, coordinator, AlertEvaluator::default(), notifier, &config))
    }

    async fn harness(fetcher: ScriptedFetcher, notifier: Arc<dyn Notifier>) -> Harness {
        let store = Arc::new(MemoryPriceStore::new());
        let fetcher = Arc::new(fetcher);
        let scheduler = scheduler_over(store.clone(), Arc::clone(&fetcher), notifier);
        Harness { store, fetcher, scheduler }
    }

    async fn track(store: &dyn PriceStore, user: &str, product_ref: &str, target: f64) -> ProductKey {
        let user = UserId::new(user);
        let _ = store.register_user(&user, Utc::now()).await;
        let url = format!("https://www.walmart.com/ip/Thing/{}", product_ref);
        let resolved = RetailerRegistry::resolve(&url).unwrap();
        store.upsert_product(&resolved, Utc::now()).await.unwrap();
        store.upsert_alert(&user, &resolved.key, target, Utc::now()).await.unwrap();
        resolved.key
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_scenario_notifies_once_per_crossing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let h = harness(ScriptedFetcher::new(Retailer::Walmart), notifier.clone()).await;
        track(h.store.as_ref(), "u1", "100", 50.0).await;

        let expected_sent = [(55.0, 0), (48.0, 1), (48.0, 1), (60.0, 1), (45.0, 2)];
        for (price, sent) in expected_sent {
            h.fetcher.push_price("100", price, true);
            h.scheduler.run_sweep().await.unwrap();
            assert_eq!(notifier.sent().len(), sent, "after observing {}", price);
        }

        let (user, message) = &notifier.sent()[1];
        assert_eq!(user, &UserId::new("u1"));
        assert!(message.contains("Current price: $45.00"));

        let stats = h.scheduler.stats().await;
        assert_eq!(stats.sweeps_completed, 5);
        assert_eq!(stats.total_alerts_fired, 2);
        assert!(!stats.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_product_does_not_abort_sweep() {
        let notifier = Arc::new(RecordingNotifier::default());
        let h = harness(ScriptedFetcher::new(Retailer::Walmart), notifier.clone()).await;
        let broken = track(h.store.as_ref(), "u1", "1", 50.0).await;
        track(h.store.as_ref(), "u2", "2", 50.0).await;
        h.fetcher.push("1", Err(FetchError::NotFound));
        h.fetcher.push_price("2", 40.0, true);

        let report = h.scheduler.run_sweep().await.unwrap();
        assert_eq!(report.products_checked, 2);
        assert_eq!(report.failed_fetches, 1);
        assert_eq!(report.alerts_fired, 1);
        assert_eq!(notifier.sent()[0].0, UserId::new("u2"));

        let history = h.store.price_history(&broken, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_success());
        let alerts = h.store.alerts_for_product(&broken).await.unwrap();
        assert_eq!(alerts[0].state, AlertState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_error_on_one_product_does_not_abort_sweep() {
        let store = Arc::new(FlakyStore::default());
        let fetcher = Arc::new(ScriptedFetcher::new(Retailer::Walmart));
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_over(store.clone(), Arc::clone(&fetcher), notifier.clone());

        let broken = track(store.as_ref(), "u1", "1", 50.0).await;
        let healthy = track(store.as_ref(), "u2", "2", 50.0).await;
        store.fail_commits_for(&broken);
        fetcher.push_price("1", 40.0, true);
        fetcher.push_price("2", 40.0, true);

        let report = scheduler.run_sweep().await.unwrap();
        assert_eq!(report.products_checked, 2);
        assert_eq!(report.store_errors, 1);
        assert_eq!(report.failed_fetches, 0);
        assert_eq!(report.alerts_fired, 1);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, UserId::new("u2"));

        assert!(store.price_history(&broken, 10).await.unwrap().is_empty());
        assert_eq!(store.alerts_for_product(&broken).await.unwrap()[0].state, AlertState::Armed);
        assert_eq!(store.alerts_for_product(&healthy).await.unwrap()[0].state, AlertState::Fired);
        assert_eq!(store.stats().await.unwrap().alerts_fired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_does_not_overlap() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fetcher = ScriptedFetcher::new(Retailer::Walmart).with_delay(Duration::from_secs(10));
        let h = harness(fetcher, notifier).await;
        track(h.store.as_ref(), "u1", "1", 50.0).await;
        h.fetcher.push_price("1", 60.0, true);

        assert_eq!(h.scheduler.trigger_sweep_now().await.unwrap(), SweepTrigger::Accepted);
        assert_eq!(h.scheduler.trigger_sweep_now().await.unwrap(), SweepTrigger::AlreadyRunning);
        assert!(matches!(h.scheduler.run_sweep().await, Err(AppError::SweepInProgress)));
        assert!(h.scheduler.stats().await.running);

        tokio::time::sleep(Duration::from_secs(20)).await;
        let stats = h.scheduler.stats().await;
        assert_eq!(stats.sweeps_completed, 1);
        assert!(!stats.running);
        assert_eq!(h.fetcher.call_count(), 1);
        assert_eq!(h.scheduler.trigger_sweep_now().await.unwrap(), SweepTrigger::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_held_elsewhere_blocks_every_entry_point() {
        let notifier = Arc::new(RecordingNotifier::default());
        let h = harness(ScriptedFetcher::new(Retailer::Walmart), notifier.clone()).await;
        track(h.store.as_ref(), "u1", "1", 50.0).await;
        h.fetcher.push_price("1", 40.0, true);

        // Another process sharing the database is mid-sweep
        assert!(h
            .store
            .acquire_sweep_lease("other-process", Duration::from_secs(600), Utc::now())
            .await
            .unwrap());

        assert!(matches!(h.scheduler.run_sweep().await, Err(AppError::SweepInProgress)));
        assert_eq!(h.scheduler.trigger_sweep_now().await.unwrap(), SweepTrigger::AlreadyRunning);

        let handle = tokio::spawn(Arc::clone(&h.scheduler).run());
        tokio::time::sleep(Duration::from_secs(150)).await;
        h.scheduler.shutdown();
        handle.await.unwrap();

        assert_eq!(h.fetcher.call_count(), 0);
        assert!(notifier.sent().is_empty());
        assert!(!h.scheduler.is_running());
        assert_eq!(h.scheduler.stats().await.sweeps_completed, 0);

        h.store.release_sweep_lease("other-process").await.unwrap();
        let fresh = scheduler_over(h.store.clone(), Arc::clone(&h.fetcher), notifier.clone());
        assert_eq!(fresh.run_sweep().await.unwrap().alerts_fired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_keeps_alert_fired() {
        let notifier = Arc::new(FailingNotifier::default());
        let h = harness(ScriptedFetcher::new(Retailer::Walmart), notifier.clone()).await;
        let key = track(h.store.as_ref(), "u1", "1", 50.0).await;
        h.fetcher.push_price("1", 45.0, true);
        h.fetcher.push_price("1", 45.0, true);

        let report = h.scheduler.run_sweep().await.unwrap();
        assert_eq!(report.alerts_fired, 1);
        assert_eq!(report.delivery_failures, 1);
        let alerts = h.store.alerts_for_product(&key).await.unwrap();
        assert_eq!(alerts[0].state, AlertState::Fired);

        h.scheduler.run_sweep().await.unwrap();
        assert_eq!(notifier.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let notifier = Arc::new(RecordingNotifier::default());
        let h = harness(ScriptedFetcher::new(Retailer::Walmart), notifier).await;
        track(h.store.as_ref(), "u1", "1", 50.0).await;
        for _ in 0..5 {
            h.fetcher.push_price("1", 60.0, true);
        }

        let handle = tokio::spawn(Arc::clone(&h.scheduler).run());

        // Ticks at 0s, 100s and 200s
        tokio::time::sleep(Duration::from_secs(250)).await;
        h.scheduler.shutdown();
        handle.await.unwrap();

        assert_eq!(h.scheduler.stats().await.sweeps_completed, 3);
        assert_eq!(h.fetcher.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_sweep_discards_results() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fetcher = ScriptedFetcher::new(Retailer::Walmart).with_delay(Duration::from_secs(10));
        let h = harness(fetcher, notifier.clone()).await;
        let key = track(h.store.as_ref(), "u1", "1", 50.0).await;
        h.fetcher.push_price("1", 40.0, true);

        let handle = tokio::spawn(Arc::clone(&h.scheduler).run());
        tokio::time::sleep(Duration::from_secs(5)).await;
        h.scheduler.shutdown();
        handle.await.unwrap();

        assert!(h.store.price_history(&key, 10).await.unwrap().is_empty());
        assert!(notifier.sent().is_empty());
        assert!(!h.scheduler.is_running());

        // The lease went back with the cancelled sweep
        assert!(h
            .store
            .acquire_sweep_lease("other-process", Duration::from_secs(60), Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_triggered_sweep() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fetcher = ScriptedFetcher::new(Retailer::Walmart).with_delay(Duration::from_secs(10));
        let h = harness(fetcher, notifier.clone()).await;
        let key = track(h.store.as_ref(), "u1", "1", 50.0).await;
        h.fetcher.push_price("1", 40.0, true);

        assert_eq!(h.scheduler.trigger_sweep_now().await.unwrap(), SweepTrigger::Accepted);
        tokio::time::sleep(Duration::from_secs(5)).await;
        h.scheduler.shutdown();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert!(h.store.price_history(&key, 10).await.unwrap().is_empty());
        assert!(notifier.sent().is_empty());
        assert!(!h.scheduler.is_running());
        assert_eq!(h.scheduler.stats().await.sweeps_completed, 0);

        // Nothing new starts after shutdown
        assert!(matches!(h.scheduler.run_sweep().await, Err(AppError::SweepCancelled)));
        assert_eq!(h.fetcher.call_count(), 1);
    }
}
