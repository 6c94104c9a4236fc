use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};

use crate::engine::assignment::AssignmentEngine;
use crate::engine::corridor::CorridorParams;
use crate::engine::locks::KeyedLocks;
use crate::geo::GeoPoint;
use crate::models::assignment::RouteEvent;
use crate::models::route::RouteId;
use crate::observability::metrics::Metrics;
use crate::storage::Storage;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub engine: AssignmentEngine,
    /// Held by every mutation of one route's stops, status or courier.
    pub route_locks: KeyedLocks<RouteId>,
    /// Serializes courier bind/unbind. Always taken before any route lock.
    pub binding_lock: Mutex<()>,
    pub route_events_tx: broadcast::Sender<RouteEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        origin: GeoPoint,
        params: CorridorParams,
        event_buffer_size: usize,
    ) -> Self {
        let (route_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            storage,
            engine: AssignmentEngine::new(origin, params),
            route_locks: KeyedLocks::new(),
            binding_lock: Mutex::new(()),
            route_events_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn origin(&self) -> &GeoPoint {
        &self.engine.origin
    }

    pub fn publish(&self, event: RouteEvent) {
        let _ = self.route_events_tx.send(event);
    }
}
