//! Alert domain - subscriptions, their fire/re-arm state machine and notifications

mod alert_evaluator;
mod notification;

pub use alert_evaluator::{AlertEvaluator, AlertTransition, EvaluationPolicy};
pub use notification::{AlertNotification, FiredAlert};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::product::ProductKey;
use crate::shared::types::{AlertId, Price, UserId};

/// Registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub registered_at: DateTime<Utc>,
}

/// Alert state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Armed,
    Fired,
}

/// What happens to an alert once it has fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    /// Stay active and re-arm once the price recovers above target
    RearmOnRecovery,
    /// Deactivate permanently after the first notification
    DeactivateAfterFire,
}

impl fmt::Display for RearmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RearmPolicy::RearmOnRecovery => f.write_str("rearm_on_recovery"),
            RearmPolicy::DeactivateAfterFire => f.write_str("deactivate_after_fire"),
        }
    }
}

impl FromStr for RearmPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rearm_on_recovery" | "rearm" => Ok(RearmPolicy::RearmOnRecovery),
            "deactivate_after_fire" | "once" => Ok(RearmPolicy::DeactivateAfterFire),
            other => Err(format!("unknown rearm policy '{}'", other)),
        }
    }
}

/// A user's price alert on one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub user_id: UserId,
    pub product: ProductKey,
    pub target_price: Price,
    pub created_at: DateTime<Utc>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub state: AlertState,
}

impl Alert {
    pub fn new(user_id: UserId, product: ProductKey, target_price: Price, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AlertId::generate(),
            user_id,
            product,
            target_price,
            created_at,
            last_fired_at: None,
            active: true,
            state: AlertState::Armed,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state == AlertState::Armed
    }

    /// Apply an evaluator transition. Returns false if it no longer applies
    /// to the alert's current state.
    pub fn apply(&mut self, transition: &AlertTransition, rearm_policy: RearmPolicy) -> bool {
        match transition {
            AlertTransition::Fire { fired_at, .. } => {
                if !self.active || self.state != AlertState::Armed {
                    return false;
                }
                self.state = AlertState::Fired;
                self.last_fired_at = Some(*fired_at);
                if rearm_policy == RearmPolicy::DeactivateAfterFire {
                    self.active = false;
                }
                true
            }
            AlertTransition::Rearm { .. } => {
                if !self.active || self.state != AlertState::Fired {
                    return false;
                }
                self.state = AlertState::Armed;
                true
            }
        }
    }

    /// Replace the target of a re-tracked alert; it starts over as armed and active
    pub fn retarget(&mut self, target_price: Price) {
        self.target_price = target_price;
        self.state = AlertState::Armed;
        self.active = true;
    }
}
