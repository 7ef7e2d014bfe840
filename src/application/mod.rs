//! Application layer - use cases and services

pub mod commands;
pub mod fetch_coordinator;
pub mod scheduler;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use commands::{Cli, CommandExecutor, Commands};
pub use fetch_coordinator::{FetchCoordinator, FetchPolicy};
pub use scheduler::{Scheduler, SchedulerStats, SweepReport, SweepTrigger};
pub use services::{PriceTrackingService, TrackedProduct};
