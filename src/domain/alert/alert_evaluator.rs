//! Alert evaluation - decides which alerts fire or re-arm on a new observation

use chrono::{DateTime, Utc};

use super::{Alert, AlertState, RearmPolicy};
use crate::domain::product::PriceObservation;
use crate::shared::config::MonitorConfig;
use crate::shared::types::{AlertId, Price};
use crate::shared::utils::calculate_fractional_change;

/// Evaluation policy knobs
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPolicy {
    pub rearm_policy: RearmPolicy,
    /// When set, a crossing fires only if the price also dropped by at least
    /// `price_change_threshold` since the previous successful observation
    pub require_price_drop: bool,
    pub price_change_threshold: f64,
}

impl Default for EvaluationPolicy {
    fn default() -> Self {
        Self {
            rearm_policy: RearmPolicy::RearmOnRecovery,
            require_price_drop: false,
            price_change_threshold: 0.05,
        }
    }
}

impl From<&MonitorConfig> for EvaluationPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            rearm_policy: config.rearm_policy,
            require_price_drop: config.require_price_drop,
            price_change_threshold: config.price_change_threshold,
        }
    }
}

/// State change decided for one alert
#[derive(Debug, Clone, PartialEq)]
pub enum AlertTransition {
    Fire {
        alert_id: AlertId,
        price: Price,
        fired_at: DateTime<Utc>,
    },
    Rearm {
        alert_id: AlertId,
    },
}

impl AlertTransition {
    pub fn alert_id(&self) -> AlertId {
        match self {
            AlertTransition::Fire { alert_id, .. } | AlertTransition::Rearm { alert_id } => *alert_id,
        }
    }
}

/// Evaluates observations against alerts.
///
/// Pure: it only decides transitions. The store applies them inside the same
/// critical section that records the observation.
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    policy: EvaluationPolicy,
}

impl AlertEvaluator {
    pub fn new(policy: EvaluationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EvaluationPolicy {
        &self.policy
    }

    /// Evaluate every alert on the observed product independently.
    ///
    /// `previous_price` is the last successful price before this observation.
    pub fn evaluate(
        &self,
        previous_price: Option<Price>,
        observation: &PriceObservation,
        alerts: &[Alert],
    ) -> Vec<AlertTransition> {
        alerts
            .iter()
            .filter_map(|alert| self.evaluate_alert(previous_price, observation, alert))
            .collect()
    }

    pub fn evaluate_alert(
        &self,
        previous_price: Option<Price>,
        observation: &PriceObservation,
        alert: &Alert,
    ) -> Option<AlertTransition> {
        if !alert.active || alert.product != observation.product {
            return None;
        }
        // A failed fetch carries no price; absence of data is not a change
        if !observation.is_success() {
            return None;
        }
        let price = observation.price?;

        match alert.state {
            AlertState::Fired if price > alert.target_price => {
                Some(AlertTransition::Rearm { alert_id: alert.id })
            }
            AlertState::Armed
                if price <= alert.target_price
                    && observation.available
                    && self.drop_gate_passes(previous_price, price) =>
            {
                Some(AlertTransition::Fire {
                    alert_id: alert.id,
                    price,
                    fired_at: observation.observed_at,
                })
            }
            _ => None,
        }
    }

    fn drop_gate_passes(&self, previous_price: Option<Price>, price: Price) -> bool {
        if !self.policy.require_price_drop {
            return true;
        }
        match previous_price {
            None => true,
            Some(previous) => {
                -calculate_fractional_change(previous, price) >= self.policy.price_change_threshold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::ProductKey;
    use crate::domain::retailer::Retailer;
    use crate::shared::errors::FetchError;
    use crate::shared::types::UserId;

    fn key() -> ProductKey {
        ProductKey::new(Retailer::Target, "555")
    }

    fn alert(target: Price) -> Alert {
        Alert::new(UserId::new("u1"), key(), target, Utc::now())
    }

    fn observed(price: Price, available: bool) -> PriceObservation {
        PriceObservation::success(key(), price, available, Utc::now())
    }

    /// Feed prices through evaluate + apply and count fires and re-arms
    fn run(evaluator: &AlertEvaluator, alert: &mut Alert, prices: &[Price]) -> (usize, usize) {
        let (mut fires, mut rearms) = (0, 0);
        let mut previous = None;
        for &p in prices {
            for t in evaluator.evaluate(previous, &observed(p, true), std::slice::from_ref(alert)) {
                if alert.apply(&t, evaluator.policy().rearm_policy) {
                    match t {
                        AlertTransition::Fire { .. } => fires += 1,
                        AlertTransition::Rearm { .. } => rearms += 1,
                    }
                }
            }
            previous = Some(p);
        }
        (fires, rearms)
    }

    #[test]
    fn test_documented_scenario() {
        let evaluator = AlertEvaluator::default();
        let mut a = alert(50.0);

        assert!(evaluator.evaluate_alert(None, &observed(55.0, true), &a).is_none());

        let fire = evaluator.evaluate_alert(Some(55.0), &observed(48.0, true), &a).unwrap();
        assert!(matches!(fire, AlertTransition::Fire { price, .. } if price == 48.0));
        assert!(a.apply(&fire, RearmPolicy::RearmOnRecovery));

        // Still below target: no duplicate
        assert!(evaluator.evaluate_alert(Some(48.0), &observed(48.0, true), &a).is_none());

        let rearm = evaluator.evaluate_alert(Some(48.0), &observed(60.0, true), &a).unwrap();
        assert!(matches!(rearm, AlertTransition::Rearm { .. }));
        assert!(a.apply(&rearm, RearmPolicy::RearmOnRecovery));

        let again = evaluator.evaluate_alert(Some(60.0), &observed(45.0, true), &a).unwrap();
        assert!(matches!(again, AlertTransition::Fire { .. }));
    }

    #[test]
    fn test_one_fire_per_crossing() {
        let evaluator = AlertEvaluator::default();
        let mut a = alert(50.0);
        let prices = [70.0, 60.0, 50.0, 45.0, 40.0, 55.0, 65.0, 49.0, 30.0, 80.0];
        let (fires, rearms) = run(&evaluator, &mut a, &prices);
        assert_eq!(fires, 2);
        assert_eq!(rearms, 2);
    }

    #[test]
    fn test_tie_counts_as_qualifying() {
        let evaluator = AlertEvaluator::default();
        let a = alert(50.0);
        assert!(evaluator.evaluate_alert(None, &observed(50.0, true), &a).is_some());
    }

    #[test]
    fn test_unavailable_product_does_not_fire() {
        let evaluator = AlertEvaluator::default();
        let a = alert(50.0);
        assert!(evaluator.evaluate_alert(None, &observed(40.0, false), &a).is_none());
    }

    #[test]
    fn test_failed_observation_is_ignored() {
        let evaluator = AlertEvaluator::default();
        let a = alert(50.0);
        let failed = PriceObservation::failed(key(), &FetchError::Timeout, Utc::now());
        assert!(evaluator.evaluate_alert(Some(40.0), &failed, &a).is_none());
        assert!(a.is_armed());
    }

    #[test]
    fn test_evaluation_is_idempotent_once_fired() {
        let evaluator = AlertEvaluator::default();
        let mut a = alert(50.0);
        let obs = observed(40.0, true);
        let first = evaluator.evaluate(None, &obs, std::slice::from_ref(&a));
        assert_eq!(first.len(), 1);
        assert!(a.apply(&first[0], RearmPolicy::RearmOnRecovery));
        assert!(evaluator.evaluate(None, &obs, std::slice::from_ref(&a)).is_empty());
    }

    #[test]
    fn test_alerts_on_same_product_are_independent() {
        let evaluator = AlertEvaluator::default();
        let mut fired = alert(50.0);
        fired.state = AlertState::Fired;
        let armed = alert(45.0);
        let low = alert(30.0);

        let transitions = evaluator.evaluate(Some(60.0), &observed(40.0, true), &[fired, armed.clone(), low]);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].alert_id(), armed.id);
    }

    #[test]
    fn test_inactive_and_foreign_alerts_are_skipped() {
        let evaluator = AlertEvaluator::default();
        let mut inactive = alert(50.0);
        inactive.active = false;
        let mut foreign = alert(50.0);
        foreign.product = ProductKey::new(Retailer::Walmart, "555");
        assert!(evaluator.evaluate(None, &observed(10.0, true), &[inactive, foreign]).is_empty());
    }

    #[test]
    fn test_price_drop_gate() {
        let evaluator = AlertEvaluator::new(EvaluationPolicy {
            require_price_drop: true,
            price_change_threshold: 0.05,
            ..EvaluationPolicy::default()
        });
        let a = alert(50.0);

        // 51 -> 49 is under 4%: crosses target but the gate holds it back
        assert!(evaluator.evaluate_alert(Some(51.0), &observed(49.0, true), &a).is_none());
        // 55 -> 48 is ~12.7%
        assert!(evaluator.evaluate_alert(Some(55.0), &observed(48.0, true), &a).is_some());
        // No prior price: gate passes
        assert!(evaluator.evaluate_alert(None, &observed(48.0, true), &a).is_some());
    }
}
