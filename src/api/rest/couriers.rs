use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{patch, post};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierId, CourierStatus};
use crate::state::AppState;
use crate::storage::courier_not_found;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id/status", patch(update_courier_status))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CourierStatus,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let phone = payload
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|phone| !phone.is_empty());

    let courier = state.storage.create_courier(name, phone).await?;
    info!(courier_id = courier.id, name = %courier.name, "courier registered");
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Courier>>, AppError> {
    Ok(Json(state.storage.list_couriers().await?))
}

async fn update_courier_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CourierId>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Courier>, AppError> {
    state.storage.set_courier_status(id, payload.status).await?;

    let courier = state
        .storage
        .get_courier(id)
        .await?
        .ok_or_else(|| courier_not_found(id))?;
    Ok(Json(courier))
}
