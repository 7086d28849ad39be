//! Storefront voucher queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::voucher::{apply, validate};
use domain::{LineItem, ReasonCode, Verdict, Voucher, VoucherApplication, VoucherCode};
use serde::Serialize;
use store::VoucherStore;

use crate::error::Result;

/// Verdict for a code, plus the effect on a cart when one was supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoucherCheck {
    #[serde(flatten)]
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<VoucherApplication>,
    /// Why a valid voucher does not apply to the supplied cart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_reason: Option<ReasonCode>,
}

/// Looks up vouchers and runs the validation engine over them.
pub struct VoucherService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for VoucherService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: VoucherStore + ?Sized> VoucherService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validates `code` at `now`. A blank code is reported as not found.
    ///
    /// With `items`, a valid voucher is also applied to them so the caller
    /// can preview the discount. Nothing is written.
    #[tracing::instrument(skip(self, items), fields(with_cart = items.is_some()))]
    pub async fn validate(&self, code: &str, items: Option<&[LineItem]>, now: DateTime<Utc>) -> Result<VoucherCheck> {
        let voucher = match VoucherCode::parse(code) {
            Ok(code) => self.store.find_voucher(&code).await?,
            Err(_) => None,
        };
        let verdict = validate(voucher.as_ref(), now);

        let mut check = VoucherCheck {
            verdict,
            application: None,
            application_reason: None,
        };
        if let (Some(voucher), Some(items)) = (voucher.as_ref(), items)
            && check.verdict.valid
        {
            match apply(voucher, items) {
                Ok(application) => check.application = Some(application),
                Err(rejection) => check.application_reason = Some(rejection.reason_code()),
            }
        }

        tracing::debug!(reason_code = %check.verdict.reason_code, "voucher checked");
        Ok(check)
    }

    /// Creates or replaces a voucher definition. The stored `used_count`
    /// never decreases.
    pub async fn save(&self, voucher: Voucher) -> Result<()> {
        self.store.save_voucher(voucher).await?;
        Ok(())
    }
}
