use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::order::Order;
use crate::state::AppState;
use crate::storage::order_not_found;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

/// Ingests an order as `pending`. Re-sending a known id returns the stored order
/// unchanged.
async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let id = payload.id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("id cannot be empty".to_string()));
    }

    let coords = GeoPoint::new(payload.lat, payload.lon);
    if !coords.is_valid() {
        return Err(AppError::InvalidCoordinates(format!(
            "{},{} is not a valid position",
            payload.lat, payload.lon
        )));
    }

    let order = Order::pending(id, coords);
    if state.storage.save_order(&order).await? {
        info!(order_id = %order.id, lat = coords.lat, lon = coords.lon, "order ingested");
        return Ok((StatusCode::CREATED, Json(order)));
    }

    debug!(order_id = %order.id, "duplicate order ignored");
    let existing = state
        .storage
        .get_order(id)
        .await?
        .ok_or_else(|| order_not_found(id))?;
    Ok((StatusCode::OK, Json(existing)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .storage
        .get_order(&id)
        .await?
        .ok_or_else(|| order_not_found(&id))?;

    Ok(Json(order))
}
