//! Fulfillment tunables.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::CartId;
use domain::cart::CART_WINDOW_HOURS;

/// Settings shared by the checkout manager and the order pipeline.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// How long an open cart may sit untouched before the sweep abandons it.
    pub idle_threshold: Duration,
    /// Bound on every payment-gateway query and notification send.
    pub upstream_timeout: Duration,
    /// Rolling window, from creation, in which submissions update a cart.
    pub cart_window: Duration,
    /// Base URL recovery links are built on.
    pub recovery_base_url: String,
    /// Carts processed in parallel by one sweep.
    pub sweep_concurrency: usize,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(60 * 60),
            upstream_timeout: Duration::from_millis(5_000),
            cart_window: Duration::from_secs(CART_WINDOW_HOURS as u64 * 60 * 60),
            recovery_base_url: "http://localhost:3000".to_string(),
            sweep_concurrency: 8,
        }
    }
}

impl FulfillmentConfig {
    /// Link that restores `cart_id` in the storefront.
    pub fn recovery_link(&self, cart_id: CartId) -> String {
        format!(
            "{}/checkout/recover/{}",
            self.recovery_base_url.trim_end_matches('/'),
            cart_id
        )
    }

    /// Oldest creation time of a cart that still absorbs submissions at `now`.
    pub(crate) fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.cart_window).unwrap_or(chrono::Duration::MAX);
        domain::cart::window_start(now, window)
    }
}
