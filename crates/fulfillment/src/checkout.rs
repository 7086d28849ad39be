//! Checkout lifecycle manager.
//!
//! Records cart submissions and sweeps idle carts into the abandoned state,
//! sending one recovery notification per cart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::CartId;
use domain::{Cart, CartSnapshot, DomainError, Email, LineItem, SessionRef, ShippingSnapshot, VoucherCode};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use store::{CartStore, CartUpsert};

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::services::{Notification, Notifier, send_best_effort};

/// A cart submission from the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutSubmission {
    pub email: Email,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub shipping: Option<ShippingSnapshot>,
    #[serde(default)]
    pub session_ref: Option<SessionRef>,
    #[serde(default)]
    pub voucher_code: Option<VoucherCode>,
}

impl CheckoutSubmission {
    fn into_snapshot(self) -> std::result::Result<CartSnapshot, DomainError> {
        Ok(CartSnapshot::new(self.email, self.items, self.shipping, self.session_ref)?.with_voucher(self.voucher_code))
    }
}

/// Totals from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Carts this run moved to ABANDONED.
    pub abandoned: usize,
    /// Recovery notifications delivered.
    pub notified: usize,
    /// Recovery notifications that failed or timed out.
    pub notification_failures: usize,
    /// Carts skipped because another writer changed them first.
    pub skipped: usize,
    /// Carts whose transition failed in the store.
    pub errors: usize,
}

enum SweepOutcome {
    Abandoned { notified: bool },
    Skipped,
    Failed,
}

/// Owns the OPEN → ABANDONED part of the cart lifecycle.
pub struct CheckoutManager<S: ?Sized, N: ?Sized> {
    store: Arc<S>,
    notifier: Arc<N>,
    config: FulfillmentConfig,
}

impl<S: ?Sized, N: ?Sized> Clone for CheckoutManager<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            config: self.config.clone(),
        }
    }
}

impl<S, N> CheckoutManager<S, N>
where
    S: CartStore + ?Sized,
    N: Notifier + ?Sized,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, config: FulfillmentConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &FulfillmentConfig {
        &self.config
    }

    /// Records a submission against the email's open cart.
    ///
    /// An open cart created within the cart window absorbs the submission;
    /// otherwise a new cart is opened. Repeating the same submission leaves
    /// one open cart holding the latest content.
    #[tracing::instrument(skip(self, submission), fields(email = %submission.email))]
    pub async fn record_checkout(&self, submission: CheckoutSubmission) -> Result<CartUpsert> {
        let snapshot = submission.into_snapshot()?;
        let now = Utc::now();
        let window_start = self.config.window_start(now);

        let upsert = self.store.upsert_open_cart(snapshot, window_start, now).await?;

        let outcome = if upsert.created { "created" } else { "updated" };
        metrics::counter!("checkout_recorded_total", "outcome" => outcome).increment(1);
        tracing::info!(cart_id = %upsert.cart_id, outcome, "checkout recorded");
        Ok(upsert)
    }

    /// Returns a cart by id.
    pub async fn get_cart(&self, id: CartId) -> Result<Cart> {
        self.store.get_cart(id).await?.ok_or_else(|| FulfillmentError::NotFound {
            entity: "cart",
            id: id.to_string(),
        })
    }

    /// Abandons every open cart idle past `idle_threshold` (the configured
    /// threshold when `None`) and sends each one recovery notification.
    ///
    /// A cart is notified only by the run that claimed its transition, so
    /// concurrent or repeated sweeps never notify twice. A store failure on
    /// one cart is counted and the sweep carries on.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_abandoned(&self, idle_threshold: Option<Duration>) -> Result<SweepReport> {
        let start = Instant::now();
        let threshold = idle_threshold.unwrap_or(self.config.idle_threshold);
        let idle_before = chrono::Duration::from_std(threshold)
            .ok()
            .and_then(|threshold| Utc::now().checked_sub_signed(threshold))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let carts = self.store.find_idle_open_carts(idle_before).await?;
        let candidates = carts.len();

        let outcomes: Vec<SweepOutcome> = futures_util::stream::iter(carts)
            .map(|cart| self.abandon_one(cart))
            .buffer_unordered(self.config.sweep_concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport::default();
        for outcome in outcomes {
            match outcome {
                SweepOutcome::Abandoned { notified } => {
                    report.abandoned += 1;
                    if notified {
                        report.notified += 1;
                    } else {
                        report.notification_failures += 1;
                    }
                }
                SweepOutcome::Skipped => report.skipped += 1,
                SweepOutcome::Failed => report.errors += 1,
            }
        }

        metrics::counter!("carts_abandoned_total").increment(report.abandoned as u64);
        metrics::histogram!("sweep_duration_seconds").record(start.elapsed().as_secs_f64());
        tracing::info!(
            candidates,
            abandoned = report.abandoned,
            notification_failures = report.notification_failures,
            errors = report.errors,
            "abandoned-cart sweep finished"
        );
        Ok(report)
    }

    async fn abandon_one(&self, cart: Cart) -> SweepOutcome {
        match self.store.mark_abandoned(cart.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(cart_id = %cart.id, "cart changed before sweep claimed it");
                return SweepOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(cart_id = %cart.id, error = %e, "failed to abandon cart");
                return SweepOutcome::Failed;
            }
        }

        let notification = Notification::CartRecovery {
            cart_id: cart.id,
            recovery_link: self.config.recovery_link(cart.id),
            subtotal: cart.subtotal(),
            items: cart.items,
        };
        let notified = send_best_effort(
            self.notifier.as_ref(),
            &cart.email,
            notification,
            self.config.upstream_timeout,
        )
        .await;

        tracing::info!(cart_id = %cart.id, notified, "cart abandoned");
        SweepOutcome::Abandoned { notified }
    }
}
