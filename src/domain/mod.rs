//! Domain layer - core business logic and entities

pub mod alert;
pub mod product;
pub mod retailer;
