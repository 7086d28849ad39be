//! Live availability and volume tiers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use domain::{ProductRef, VolumeTier};
use inventory::AvailabilityMap;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    /// Comma-separated external product references.
    pub refs: Option<String>,
}

impl AvailabilityQuery {
    fn product_refs(&self) -> Option<Vec<ProductRef>> {
        self.refs.as_deref().map(|refs| {
            refs.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(ProductRef::from)
                .collect()
        })
    }
}

/// GET /inventory — price, live stock and tier per product.
pub async fn availability(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<AvailabilityMap>, ApiError> {
    let Query(query) = query?;
    let refs = query.product_refs();
    let availability = state.inventory.get_availability(refs.as_deref()).await?;
    Ok(Json(availability))
}

/// GET /inventory/volume-tiers — active bulk discount steps.
pub async fn volume_tiers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<VolumeTier>>, ApiError> {
    Ok(Json(state.inventory.get_volume_tiers().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_are_split_and_trimmed() {
        let query = AvailabilityQuery {
            refs: Some(" SKU-1 ,,SKU-2".to_string()),
        };
        assert_eq!(
            query.product_refs(),
            Some(vec![ProductRef::from("SKU-1"), ProductRef::from("SKU-2")])
        );
        assert_eq!(AvailabilityQuery { refs: None }.product_refs(), None);
    }
}
