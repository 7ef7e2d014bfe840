//! Notification payloads for fired alerts

use std::fmt;

use super::Alert;
use crate::domain::product::{PriceObservation, Product};
use crate::shared::types::{Price, UserId};
use crate::shared::utils::format_price;

/// An alert that transitioned to fired, with the state it fired against
#[derive(Debug, Clone, PartialEq)]
pub struct FiredAlert {
    pub alert: Alert,
    pub product: Product,
    pub observation: PriceObservation,
}

impl FiredAlert {
    pub fn notification(&self) -> AlertNotification {
        AlertNotification {
            user_id: self.alert.user_id.clone(),
            product_name: self.product.name.clone(),
            retailer: self.product.key.retailer.display_name().to_string(),
            url: self.product.url.clone(),
            price: self.observation.price.unwrap_or(self.alert.target_price),
            target_price: self.alert.target_price,
        }
    }
}

/// Message handed to the notifier sink
#[derive(Debug, Clone, PartialEq)]
pub struct AlertNotification {
    pub user_id: UserId,
    pub product_name: String,
    pub retailer: String,
    pub url: String,
    pub price: Price,
    pub target_price: Price,
}

impl AlertNotification {
    pub fn savings(&self) -> Price {
        self.target_price - self.price
    }

    pub fn savings_percentage(&self) -> f64 {
        if self.target_price > 0.0 {
            self.savings() / self.target_price * 100.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for AlertNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} PRICE ALERT: {} is at or below your target!", self.retailer.to_uppercase(), self.product_name)?;
        writeln!(f, "Current price: {}", format_price(self.price))?;
        writeln!(f, "Your target: {}", format_price(self.target_price))?;
        writeln!(
            f,
            "You save: {} ({:.1}%)",
            format_price(self.savings()),
            self.savings_percentage()
        )?;
        write!(f, "View on {}: {}", self.retailer, self.url)
    }
}
