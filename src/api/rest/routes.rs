use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, patch, post};
use serde::Deserialize;

use crate::engine::{couriers, editor};
use crate::error::AppError;
use crate::models::courier::CourierId;
use crate::models::order::{OrderId, OrderStatus};
use crate::models::route::{Route, RouteId, RouteStatus};
use crate::state::AppState;
use crate::storage::route_not_found;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes", get(list_routes))
        .route("/routes/:id", get(get_route))
        .route("/routes/:id/assign", post(assign_courier))
        .route("/routes/:id/unassign", post(unassign_courier))
        .route("/routes/:id/stops", post(attach_stop).put(reorder_stops))
        .route("/routes/:id/stops/:order_id", delete(detach_stop))
        .route("/routes/:id/status", patch(update_route_status))
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub courier_id: CourierId,
}

#[derive(Deserialize)]
pub struct AttachRequest {
    pub order_id: OrderId,
    pub position: Option<usize>,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub order_ids: Vec<OrderId>,
}

#[derive(Deserialize)]
pub struct DetachQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: RouteStatus,
}

async fn list_routes(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Route>>, AppError> {
    Ok(Json(state.storage.list_routes().await?))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RouteId>,
) -> Result<Json<Route>, AppError> {
    let route = state
        .storage
        .get_route(id)
        .await?
        .ok_or_else(|| route_not_found(id))?;

    Ok(Json(route))
}

async fn assign_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RouteId>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(couriers::assign(&state, id, payload.courier_id).await?))
}

async fn unassign_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RouteId>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(couriers::unassign(&state, id).await?))
}

async fn attach_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RouteId>,
    Json(payload): Json<AttachRequest>,
) -> Result<Json<Route>, AppError> {
    let route = editor::attach_order(&state, id, &payload.order_id, payload.position).await?;
    Ok(Json(route))
}

async fn reorder_stops(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RouteId>,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(editor::reorder_stops(&state, id, &payload.order_ids).await?))
}

/// `?status=` picks what the released order becomes; `pending` when omitted.
async fn detach_stop(
    State(state): State<Arc<AppState>>,
    Path((id, order_id)): Path<(RouteId, OrderId)>,
    Query(query): Query<DetachQuery>,
) -> Result<Json<Route>, AppError> {
    let status = query.status.unwrap_or(OrderStatus::Pending);
    Ok(Json(editor::detach_order(&state, id, &order_id, status).await?))
}

async fn update_route_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RouteId>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(editor::set_status(&state, id, payload.status).await?))
}
