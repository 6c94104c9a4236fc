use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::engine::navigation::navigation_link;
use crate::engine::sequencer::reorder;
use crate::error::AppError;
use crate::models::assignment::{RouteEvent, RouteEventKind, RouteFit};
use crate::models::order::Order;
use crate::models::route::{Route, RouteId, RouteStop};
use crate::state::AppState;
use crate::storage::order_not_found;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub pending: usize,
    pub merged: usize,
    pub created: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Merged,
    Created,
}

impl Dispatch {
    fn label(&self) -> &'static str {
        match self {
            Dispatch::Merged => "merged",
            Dispatch::Created => "created",
        }
    }
}

/// Runs one dispatch cycle every `period` until the runtime shuts down. A failed cycle is
/// logged and the next tick tries again.
pub async fn run_dispatch_loop(state: Arc<AppState>, period: Duration) {
    info!(interval_ms = period.as_millis() as u64, "dispatch processor started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let start = Instant::now();
        let outcome = match run_cycle(&state).await {
            Ok(report) => {
                if report.pending > 0 {
                    info!(
                        pending = report.pending,
                        merged = report.merged,
                        created = report.created,
                        skipped = report.skipped,
                        "dispatch cycle finished"
                    );
                }
                "success"
            }
            Err(err) => {
                error!(error = %err, "dispatch cycle failed");
                "error"
            }
        };

        state
            .metrics
            .dispatch_cycle_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
        state
            .metrics
            .dispatch_cycles_total
            .with_label_values(&[outcome])
            .inc();
    }
}

/// Routes every pending order, oldest arrival first.
///
/// Open routes are loaded once into an id-ordered arena; routes opened during the cycle
/// join the arena immediately so later orders can merge into them.
pub async fn run_cycle(state: &AppState) -> Result<CycleReport, AppError> {
    let pending = state.storage.fetch_pending_orders().await?;
    state.metrics.pending_orders.set(pending.len() as i64);

    let mut report = CycleReport {
        pending: pending.len(),
        ..CycleReport::default()
    };
    if pending.is_empty() {
        return Ok(report);
    }

    let mut arena: BTreeMap<RouteId, Route> = state
        .storage
        .fetch_open_routes()
        .await?
        .into_iter()
        .map(|route| (route.id, route))
        .collect();

    debug!(
        pending = pending.len(),
        open_routes = arena.len(),
        "dispatch cycle started"
    );

    for order in &pending {
        match dispatch_order(state, &mut arena, order).await {
            Ok(Dispatch::Merged) => report.merged += 1,
            Ok(Dispatch::Created) => report.created += 1,
            Err(AppError::InvalidCoordinates(reason) | AppError::Conflict(reason)) => {
                warn!(order_id = %order.id, reason = %reason, "order skipped; left for a later cycle");
                state
                    .metrics
                    .orders_dispatched_total
                    .with_label_values(&["skipped"])
                    .inc();
                report.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}

async fn dispatch_order(
    state: &AppState,
    arena: &mut BTreeMap<RouteId, Route>,
    order: &Order,
) -> Result<Dispatch, AppError> {
    if !order.coords.is_valid() {
        return Err(AppError::InvalidCoordinates(format!(
            "order {} has coordinates {},{}",
            order.id, order.coords.lat, order.coords.lon
        )));
    }

    let merged = match state.engine.find_best_route(order, arena.values()) {
        Some(fit) => merge_into_route(state, arena, order, fit).await?,
        None => false,
    };

    let decision = if merged {
        Dispatch::Merged
    } else {
        open_route(state, arena, order).await?;
        Dispatch::Created
    };

    state
        .metrics
        .orders_dispatched_total
        .with_label_values(&[decision.label()])
        .inc();
    Ok(decision)
}

/// Appends `order` to the chosen route and re-sequences it. Returns `false` when the
/// route was completed or emptied after the snapshot was taken.
async fn merge_into_route(
    state: &AppState,
    arena: &mut BTreeMap<RouteId, Route>,
    order: &Order,
    fit: RouteFit,
) -> Result<bool, AppError> {
    let _route_guard = state.route_locks.lock(&fit.route_id).await;

    let Some(mut route) = state
        .storage
        .get_route(fit.route_id)
        .await?
        .filter(|route| route.is_open() && !route.stops.is_empty())
    else {
        warn!(route_id = fit.route_id, order_id = %order.id, "route closed since snapshot");
        arena.remove(&fit.route_id);
        return Ok(false);
    };

    let current = state
        .storage
        .get_order(&order.id)
        .await?
        .ok_or_else(|| order_not_found(&order.id))?;
    if route.contains(&order.id) || !current.status.is_detached() {
        arena.insert(route.id, route);
        return Err(AppError::Conflict(format!(
            "order {} is {} since snapshot",
            order.id, current.status
        )));
    }

    let origin = *state.origin();
    route.push_stop(RouteStop::from_order(order));
    let ordered = reorder(&route.stops, &origin);
    route.set_stops(ordered);
    route.navigation_link = navigation_link(&origin, &route.stops);

    state.storage.persist_route(&route).await?;

    info!(
        order_id = %order.id,
        route_id = route.id,
        cost = fit.cost,
        added_distance_km = fit.added_distance_km,
        direction_penalty = fit.direction_penalty,
        stops = route.stops.len(),
        "order merged into route"
    );
    state.publish(
        RouteEvent::new(route.id, RouteEventKind::OrderMerged)
            .with_order(order.id.clone())
            .with_fit(fit),
    );

    arena.insert(route.id, route);
    Ok(true)
}

async fn open_route(
    state: &AppState,
    arena: &mut BTreeMap<RouteId, Route>,
    order: &Order,
) -> Result<(), AppError> {
    let link = navigation_link(state.origin(), std::slice::from_ref(&order.coords));
    let route_id = state.storage.create_route(order, &link).await?;

    info!(order_id = %order.id, route_id, "new route opened");
    state.publish(
        RouteEvent::new(route_id, RouteEventKind::RouteCreated).with_order(order.id.clone()),
    );

    arena.insert(route_id, Route::seeded(route_id, order, link));
    Ok(())
}
