use tracing::{error, info};

use crate::engine::editor::load_open_route;
use crate::error::AppError;
use crate::models::assignment::{RouteEvent, RouteEventKind};
use crate::models::courier::{CourierId, CourierStatus};
use crate::models::route::{Route, RouteId, RouteStatus};
use crate::state::AppState;
use crate::storage::{courier_not_found, route_not_found};

/// Binds `courier_id` to `route_id`, clearing it from every other open route first.
///
/// Holds the binding lock for the whole operation and one route lock at a time. If the
/// final bind or a courier status write fails, every binding touched on the way is put
/// back.
pub async fn assign(
    state: &AppState,
    route_id: RouteId,
    courier_id: CourierId,
) -> Result<Route, AppError> {
    let _binding = state.binding_lock.lock().await;

    let courier = state
        .storage
        .get_courier(courier_id)
        .await?
        .ok_or_else(|| courier_not_found(courier_id))?;
    load_open_route(state, route_id).await?;

    let mut cleared = Vec::new();
    for route in state.storage.fetch_open_routes().await? {
        if route.id == route_id || route.courier_id != Some(courier_id) {
            continue;
        }

        let _route_guard = state.route_locks.lock(&route.id).await;
        if let Err(err) = state.storage.unbind_courier(route.id).await {
            restore_bindings(state, &cleared, courier_id).await;
            return Err(err);
        }
        cleared.push(route.id);
    }

    let bound: Result<Option<CourierId>, AppError> = async {
        let _route_guard = state.route_locks.lock(&route_id).await;
        let previous = load_open_route(state, route_id).await?.courier_id;
        state.storage.bind_courier(route_id, courier_id).await?;
        Ok(previous)
    }
    .await;

    let previous = match bound {
        Ok(previous) => previous,
        Err(err) => {
            restore_bindings(state, &cleared, courier_id).await;
            return Err(err);
        }
    };

    let replaced = previous.filter(|&replaced| replaced != courier_id);
    let statuses: Result<(), AppError> = async {
        if let Some(replaced) = replaced {
            state
                .storage
                .set_courier_status(replaced, CourierStatus::Available)
                .await?;
        }
        state
            .storage
            .set_courier_status(courier_id, CourierStatus::Delivering)
            .await
    }
    .await;

    if let Err(err) = statuses {
        restore_target(state, route_id, previous, replaced).await;
        restore_bindings(state, &cleared, courier_id).await;
        return Err(err);
    }

    state
        .metrics
        .courier_bindings_total
        .with_label_values(&["assign"])
        .inc();
    info!(
        route_id,
        courier_id,
        courier = %courier.name,
        cleared_routes = cleared.len(),
        "courier assigned"
    );

    for cleared_id in &cleared {
        state.publish(
            RouteEvent::new(*cleared_id, RouteEventKind::CourierUnassigned)
                .with_courier(courier_id),
        );
    }
    state.publish(
        RouteEvent::new(route_id, RouteEventKind::CourierAssigned).with_courier(courier_id),
    );

    state
        .storage
        .get_route(route_id)
        .await?
        .ok_or_else(|| route_not_found(route_id))
}

/// Clears the route's courier, if any, and puts the route back to `created`.
pub async fn unassign(state: &AppState, route_id: RouteId) -> Result<Route, AppError> {
    let _binding = state.binding_lock.lock().await;

    let freed = {
        let _route_guard = state.route_locks.lock(&route_id).await;
        let route = load_open_route(state, route_id).await?;
        if route.courier_id.is_some() {
            state.storage.unbind_courier(route_id).await?;
        }
        state
            .storage
            .set_route_status(route_id, RouteStatus::Created)
            .await?;
        route.courier_id
    };

    if let Some(courier_id) = freed {
        state
            .storage
            .set_courier_status(courier_id, CourierStatus::Available)
            .await?;
    }

    state
        .metrics
        .courier_bindings_total
        .with_label_values(&["unassign"])
        .inc();
    info!(route_id, courier_id = ?freed, "courier unassigned");

    let mut event = RouteEvent::new(route_id, RouteEventKind::CourierUnassigned);
    if let Some(courier_id) = freed {
        event = event.with_courier(courier_id);
    }
    state.publish(event);

    state
        .storage
        .get_route(route_id)
        .await?
        .ok_or_else(|| route_not_found(route_id))
}

/// Puts `route_id` back to the courier it had before the failed assign.
async fn restore_target(
    state: &AppState,
    route_id: RouteId,
    previous: Option<CourierId>,
    replaced: Option<CourierId>,
) {
    let _route_guard = state.route_locks.lock(&route_id).await;
    let restored = match previous {
        Some(previous) => state.storage.bind_courier(route_id, previous).await,
        None => state.storage.unbind_courier(route_id).await,
    };
    if let Err(err) = restored {
        error!(route_id, courier_id = ?previous, error = %err, "failed to restore route binding");
    }

    let Some(replaced) = replaced else {
        return;
    };
    if let Err(err) = state
        .storage
        .set_courier_status(replaced, CourierStatus::Delivering)
        .await
    {
        error!(courier_id = replaced, error = %err, "failed to restore courier status");
    }
}

async fn restore_bindings(state: &AppState, cleared: &[RouteId], courier_id: CourierId) {
    for route_id in cleared {
        let _route_guard = state.route_locks.lock(route_id).await;
        if let Err(err) = state.storage.bind_courier(*route_id, courier_id).await {
            error!(route_id, courier_id, error = %err, "failed to restore courier binding");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{assign, unassign};
    use crate::engine::corridor::CorridorParams;
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::courier::{CourierId, CourierStatus};
    use crate::models::order::Order;
    use crate::models::route::{RouteId, RouteStatus};
    use crate::state::AppState;
    use crate::storage::InMemoryStorage;
    use crate::storage::hooked::HookedStorage;

    fn state() -> AppState {
        AppState::new(
            Arc::new(InMemoryStorage::new()),
            GeoPoint::new(0.0, 0.0),
            CorridorParams::default(),
            64,
        )
    }

    fn hooked_state() -> (Arc<HookedStorage>, AppState) {
        let storage = Arc::new(HookedStorage::default());
        let state = AppState::new(
            storage.clone(),
            GeoPoint::new(0.0, 0.0),
            CorridorParams::default(),
            64,
        );
        (storage, state)
    }

    async fn route(state: &AppState, order_id: &str) -> RouteId {
        let order = Order::pending(order_id, GeoPoint::new(0.0, 0.01));
        state.storage.save_order(&order).await.unwrap();
        state.storage.create_route(&order, "").await.unwrap()
    }

    async fn courier(state: &AppState, name: &str) -> CourierId {
        state.storage.create_courier(name, None).await.unwrap().id
    }

    async fn courier_status(state: &AppState, id: CourierId) -> CourierStatus {
        state.storage.get_courier(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn courier_moves_to_latest_route() {
        let state = state();
        let a = route(&state, "a").await;
        let b = route(&state, "b").await;
        let rider = courier(&state, "rider").await;

        assign(&state, a, rider).await.unwrap();
        let bound = assign(&state, b, rider).await.unwrap();

        assert_eq!(bound.courier_id, Some(rider));
        let first = state.storage.get_route(a).await.unwrap().unwrap();
        assert_eq!(first.courier_id, None);
        assert_eq!(courier_status(&state, rider).await, CourierStatus::Delivering);
    }

    #[tokio::test]
    async fn replaced_courier_becomes_available() {
        let state = state();
        let a = route(&state, "a").await;
        let first = courier(&state, "first").await;
        let second = courier(&state, "second").await;

        assign(&state, a, first).await.unwrap();
        assign(&state, a, second).await.unwrap();

        assert_eq!(courier_status(&state, first).await, CourierStatus::Available);
        assert_eq!(courier_status(&state, second).await, CourierStatus::Delivering);
    }

    #[tokio::test]
    async fn unassign_without_courier_resets_status() {
        let state = state();
        let a = route(&state, "a").await;
        state
            .storage
            .set_route_status(a, RouteStatus::InProgress)
            .await
            .unwrap();

        let route = unassign(&state, a).await.unwrap();

        assert_eq!(route.status, RouteStatus::Created);
        assert_eq!(route.courier_id, None);
    }

    #[tokio::test]
    async fn unassign_frees_courier() {
        let state = state();
        let a = route(&state, "a").await;
        let rider = courier(&state, "rider").await;
        assign(&state, a, rider).await.unwrap();

        let route = unassign(&state, a).await.unwrap();

        assert_eq!(route.courier_id, None);
        assert_eq!(courier_status(&state, rider).await, CourierStatus::Available);
    }

    #[tokio::test]
    async fn unknown_route_or_courier_is_not_found() {
        let state = state();
        let a = route(&state, "a").await;
        let rider = courier(&state, "rider").await;

        assert!(matches!(
            assign(&state, a, 999).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            assign(&state, 999, rider).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(unassign(&state, 999).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn completed_route_cannot_take_a_courier() {
        let state = state();
        let a = route(&state, "a").await;
        let rider = courier(&state, "rider").await;
        state.storage.complete_route(a).await.unwrap();

        assert!(matches!(
            assign(&state, a, rider).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(courier_status(&state, rider).await, CourierStatus::Available);
    }

    #[tokio::test]
    async fn failed_status_write_keeps_previous_courier() {
        let (storage, state) = hooked_state();
        let a = route(&state, "a").await;
        let first = courier(&state, "first").await;
        let second = courier(&state, "second").await;
        assign(&state, a, first).await.unwrap();

        storage.fail_courier_status(CourierStatus::Delivering);
        assert!(matches!(
            assign(&state, a, second).await,
            Err(AppError::Storage(_))
        ));

        let kept = state.storage.get_route(a).await.unwrap().unwrap();
        assert_eq!(kept.courier_id, Some(first));
        assert_eq!(courier_status(&state, second).await, CourierStatus::Available);
    }

    #[tokio::test]
    async fn failed_status_write_restores_cleared_route() {
        let (storage, state) = hooked_state();
        let a = route(&state, "a").await;
        let b = route(&state, "b").await;
        let rider = courier(&state, "rider").await;
        assign(&state, a, rider).await.unwrap();

        storage.fail_courier_status(CourierStatus::Delivering);
        assert!(assign(&state, b, rider).await.is_err());

        let first = state.storage.get_route(a).await.unwrap().unwrap();
        let second = state.storage.get_route(b).await.unwrap().unwrap();
        assert_eq!(first.courier_id, Some(rider));
        assert_eq!(second.courier_id, None);
        assert_eq!(courier_status(&state, rider).await, CourierStatus::Delivering);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assigns_leave_one_binding() {
        let state = Arc::new(state());
        let rider = courier(&state, "rider").await;
        let mut route_ids = Vec::new();
        for index in 0..8 {
            route_ids.push(route(&state, &format!("order-{index}")).await);
        }

        let handles: Vec<_> = route_ids
            .iter()
            .map(|&route_id| {
                let state = state.clone();
                tokio::spawn(async move { assign(&state, route_id, rider).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let bound = state
            .storage
            .fetch_open_routes()
            .await
            .unwrap()
            .into_iter()
            .filter(|route| route.courier_id == Some(rider))
            .count();
        assert_eq!(bound, 1);
    }
}
