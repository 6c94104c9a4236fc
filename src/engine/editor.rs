//! Manual route edits. Each operation holds the route's lock, writes through one atomic
//! storage call and then publishes a route event.

use tracing::info;

use crate::engine::navigation::navigation_link;
use crate::engine::sequencer::reorder;
use crate::error::AppError;
use crate::models::assignment::{RouteEvent, RouteEventKind};
use crate::models::courier::CourierStatus;
use crate::models::order::{OrderId, OrderStatus};
use crate::models::route::{Route, RouteId, RouteStatus, RouteStop};
use crate::state::AppState;
use crate::storage::{order_not_found, route_not_found};

pub(crate) async fn load_open_route(state: &AppState, route_id: RouteId) -> Result<Route, AppError> {
    let route = state
        .storage
        .get_route(route_id)
        .await?
        .ok_or_else(|| route_not_found(route_id))?;

    if !route.is_open() {
        return Err(AppError::Conflict(format!("route {route_id} is completed")));
    }
    Ok(route)
}

/// Removes `order_id` from the route and sets the order to `status`, which must be
/// `pending` or `unassigned`.
pub async fn detach_order(
    state: &AppState,
    route_id: RouteId,
    order_id: &str,
    status: OrderStatus,
) -> Result<Route, AppError> {
    if !status.is_detached() {
        return Err(AppError::BadRequest(format!(
            "a detached order must become pending or unassigned, not {status}"
        )));
    }

    let _route_guard = state.route_locks.lock(&route_id).await;
    let mut route = load_open_route(state, route_id).await?;

    if route.remove_stop(order_id).is_none() {
        return Err(AppError::NotFound(format!(
            "order {order_id} is not on route {route_id}"
        )));
    }
    route.navigation_link = navigation_link(state.origin(), &route.stops);

    state
        .storage
        .release_order(&route, order_id, status)
        .await?;

    info!(route_id, order_id = %order_id, status = %status, "order detached from route");
    state.publish(RouteEvent::new(route_id, RouteEventKind::StopsChanged).with_order(order_id));
    Ok(route)
}

/// Adds a detached order to the route, at a 1-based `position` when given, otherwise
/// re-sequencing all stops by nearest neighbor.
pub async fn attach_order(
    state: &AppState,
    route_id: RouteId,
    order_id: &str,
    position: Option<usize>,
) -> Result<Route, AppError> {
    let _route_guard = state.route_locks.lock(&route_id).await;
    let mut route = load_open_route(state, route_id).await?;

    let order = state
        .storage
        .get_order(order_id)
        .await?
        .ok_or_else(|| order_not_found(order_id))?;
    if !order.status.is_detached() {
        return Err(AppError::Conflict(format!(
            "order {order_id} is {}, detach it first",
            order.status
        )));
    }
    if !order.coords.is_valid() {
        return Err(AppError::InvalidCoordinates(format!(
            "order {order_id} has coordinates {},{}",
            order.coords.lat, order.coords.lon
        )));
    }

    let stop = RouteStop::from_order(&order);
    match position {
        Some(position) if position == 0 || position > route.stops.len() + 1 => {
            return Err(AppError::BadRequest(format!(
                "position {position} is outside 1..={}",
                route.stops.len() + 1
            )));
        }
        Some(position) => route.insert_stop(position, stop),
        None => {
            route.push_stop(stop);
            let ordered = reorder(&route.stops, state.origin());
            route.set_stops(ordered);
        }
    }
    route.navigation_link = navigation_link(state.origin(), &route.stops);

    state.storage.persist_route(&route).await?;

    info!(route_id, order_id = %order_id, position = ?position, "order attached to route");
    state.publish(RouteEvent::new(route_id, RouteEventKind::StopsChanged).with_order(order_id));
    Ok(route)
}

/// Puts the stops in the order given by `order_ids`, which must list every current stop
/// exactly once.
pub async fn reorder_stops(
    state: &AppState,
    route_id: RouteId,
    order_ids: &[OrderId],
) -> Result<Route, AppError> {
    let _route_guard = state.route_locks.lock(&route_id).await;
    let mut route = load_open_route(state, route_id).await?;

    if order_ids.len() != route.stops.len() {
        return Err(AppError::BadRequest(format!(
            "route {route_id} has {} stops, got {} order ids",
            route.stops.len(),
            order_ids.len()
        )));
    }

    let mut remaining = route.stops.clone();
    let mut ordered = Vec::with_capacity(remaining.len());
    for order_id in order_ids {
        let index = remaining
            .iter()
            .position(|stop| &stop.order_id == order_id)
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "order {order_id} is not a stop of route {route_id} or is listed twice"
                ))
            })?;
        ordered.push(remaining.swap_remove(index));
    }

    route.set_stops(ordered);
    route.navigation_link = navigation_link(state.origin(), &route.stops);
    state.storage.persist_route(&route).await?;

    info!(route_id, stops = route.stops.len(), "route stops reordered");
    state.publish(RouteEvent::new(route_id, RouteEventKind::StopsChanged));
    Ok(route)
}

/// Moves an open route to `status`. Completing delivers its orders and frees its courier.
pub async fn set_status(
    state: &AppState,
    route_id: RouteId,
    status: RouteStatus,
) -> Result<Route, AppError> {
    if status == RouteStatus::Completed {
        return complete(state, route_id).await;
    }

    let mut route = {
        let _route_guard = state.route_locks.lock(&route_id).await;
        let route = load_open_route(state, route_id).await?;
        state.storage.set_route_status(route_id, status).await?;
        route
    };
    route.status = status;

    info!(route_id, status = %status, "route status changed");
    state.publish(RouteEvent::new(route_id, RouteEventKind::StatusChanged));
    Ok(route)
}

async fn complete(state: &AppState, route_id: RouteId) -> Result<Route, AppError> {
    let _binding = state.binding_lock.lock().await;

    let mut route = {
        let _route_guard = state.route_locks.lock(&route_id).await;
        let route = load_open_route(state, route_id).await?;
        state.storage.complete_route(route_id).await?;
        route
    };
    route.status = RouteStatus::Completed;

    if let Some(courier_id) = route.courier_id {
        state
            .storage
            .set_courier_status(courier_id, CourierStatus::Available)
            .await?;
    }

    info!(route_id, stops = route.stops.len(), courier_id = ?route.courier_id, "route completed");
    let mut event = RouteEvent::new(route_id, RouteEventKind::StatusChanged);
    if let Some(courier_id) = route.courier_id {
        event = event.with_courier(courier_id);
    }
    state.publish(event);
    Ok(route)
}
