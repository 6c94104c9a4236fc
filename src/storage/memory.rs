use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierId, CourierStatus};
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::models::route::{Route, RouteId, RouteStatus};
use crate::storage::{
    Storage, courier_not_found, duplicate_stop, order_not_found, route_not_found,
};

struct StoredOrder {
    arrival: u64,
    order: Order,
}

/// Process-local storage. Multi-entry writes validate everything first and then apply
/// under a single write lock, so readers never observe a half-applied change.
pub struct InMemoryStorage {
    orders: DashMap<OrderId, StoredOrder>,
    routes: DashMap<RouteId, Route>,
    couriers: DashMap<CourierId, Courier>,
    next_arrival: AtomicU64,
    next_route_id: AtomicI64,
    next_courier_id: AtomicI64,
    writes: Mutex<()>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self {
            orders: DashMap::new(),
            routes: DashMap::new(),
            couriers: DashMap::new(),
            next_arrival: AtomicU64::new(0),
            next_route_id: AtomicI64::new(1),
            next_courier_id: AtomicI64::new(1),
            writes: Mutex::new(()),
        }
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_guard(&self) -> Result<MutexGuard<'_, ()>, AppError> {
        self.writes
            .lock()
            .map_err(|err| AppError::Internal(format!("storage write lock poisoned: {err}")))
    }

    /// Another open route that already holds `order_id`, if any.
    fn holding_route(&self, order_id: &str, except: RouteId) -> Option<RouteId> {
        self.routes
            .iter()
            .find(|entry| {
                let route = entry.value();
                route.id != except && route.is_open() && route.contains(order_id)
            })
            .map(|entry| *entry.key())
    }

    fn validate_route_write(&self, route: &Route) -> Result<(), AppError> {
        if !self.routes.contains_key(&route.id) {
            return Err(route_not_found(route.id));
        }

        let mut seen = HashSet::with_capacity(route.stops.len());
        for stop in &route.stops {
            if !seen.insert(stop.order_id.as_str()) {
                return Err(duplicate_stop(route.id, &stop.order_id));
            }
            if !self.orders.contains_key(&stop.order_id) {
                return Err(order_not_found(&stop.order_id));
            }
            if let Some(other) = self.holding_route(&stop.order_id, route.id) {
                return Err(AppError::Conflict(format!(
                    "order {} is already on route {other}",
                    stop.order_id
                )));
            }
        }

        Ok(())
    }

    fn apply_route_write(&self, route: &Route) {
        if let Some(mut stored) = self.routes.get_mut(&route.id) {
            stored.navigation_link = route.navigation_link.clone();
            stored.set_stops(route.stops.clone());
        }

        for stop in &route.stops {
            self.set_order_status_unchecked(&stop.order_id, OrderStatus::Routed);
        }
    }

    fn set_order_status_unchecked(&self, order_id: &str, status: OrderStatus) {
        if let Some(mut stored) = self.orders.get_mut(order_id) {
            stored.order.status = status;
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save_order(&self, order: &Order) -> Result<bool, AppError> {
        let _guard = self.write_guard()?;
        if self.orders.contains_key(&order.id) {
            return Ok(false);
        }

        let arrival = self.next_arrival.fetch_add(1, Ordering::SeqCst);
        self.orders.insert(
            order.id.clone(),
            StoredOrder {
                arrival,
                order: order.clone(),
            },
        );
        Ok(true)
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(id).map(|stored| stored.order.clone()))
    }

    async fn fetch_pending_orders(&self) -> Result<Vec<Order>, AppError> {
        let mut pending: Vec<(u64, Order)> = self
            .orders
            .iter()
            .filter(|entry| entry.order.status == OrderStatus::Pending)
            .map(|entry| (entry.arrival, entry.order.clone()))
            .collect();
        pending.sort_by_key(|(arrival, _)| *arrival);

        Ok(pending.into_iter().map(|(_, order)| order).collect())
    }

    async fn fetch_open_routes(&self) -> Result<Vec<Route>, AppError> {
        let mut routes: Vec<Route> = self
            .routes
            .iter()
            .filter(|entry| entry.is_open())
            .map(|entry| entry.value().clone())
            .collect();
        routes.sort_by_key(|route| route.id);
        Ok(routes)
    }

    async fn list_routes(&self) -> Result<Vec<Route>, AppError> {
        let mut routes: Vec<Route> = self
            .routes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        routes.sort_by_key(|route| route.id);
        Ok(routes)
    }

    async fn get_route(&self, id: RouteId) -> Result<Option<Route>, AppError> {
        Ok(self.routes.get(&id).map(|route| route.value().clone()))
    }

    async fn create_route(
        &self,
        first_order: &Order,
        navigation_link: &str,
    ) -> Result<RouteId, AppError> {
        let _guard = self.write_guard()?;
        let stored_status = self
            .orders
            .get(&first_order.id)
            .map(|stored| stored.order.status)
            .ok_or_else(|| order_not_found(&first_order.id))?;
        if !stored_status.is_detached() {
            return Err(AppError::Conflict(format!(
                "order {} is {stored_status}, cannot seed a route",
                first_order.id
            )));
        }

        let id = self.next_route_id.fetch_add(1, Ordering::SeqCst);
        let route = Route::seeded(id, first_order, navigation_link.to_string());
        self.routes.insert(id, route);
        self.set_order_status_unchecked(&first_order.id, OrderStatus::Routed);

        Ok(id)
    }

    async fn persist_route(&self, route: &Route) -> Result<(), AppError> {
        let _guard = self.write_guard()?;
        self.validate_route_write(route)?;
        self.apply_route_write(route);
        Ok(())
    }

    async fn release_order(
        &self,
        route: &Route,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), AppError> {
        let _guard = self.write_guard()?;
        self.validate_route_write(route)?;
        if !self.orders.contains_key(order_id) {
            return Err(order_not_found(order_id));
        }

        self.apply_route_write(route);
        self.set_order_status_unchecked(order_id, status);
        Ok(())
    }

    async fn set_route_status(&self, id: RouteId, status: RouteStatus) -> Result<(), AppError> {
        let _guard = self.write_guard()?;
        let mut route = self.routes.get_mut(&id).ok_or_else(|| route_not_found(id))?;
        route.status = status;
        Ok(())
    }

    async fn complete_route(&self, id: RouteId) -> Result<(), AppError> {
        let _guard = self.write_guard()?;
        let order_ids = {
            let mut route = self.routes.get_mut(&id).ok_or_else(|| route_not_found(id))?;
            route.status = RouteStatus::Completed;
            route.order_ids()
        };

        for order_id in &order_ids {
            self.set_order_status_unchecked(order_id, OrderStatus::Delivered);
        }
        Ok(())
    }

    async fn bind_courier(&self, route_id: RouteId, courier_id: CourierId) -> Result<(), AppError> {
        let _guard = self.write_guard()?;
        if !self.couriers.contains_key(&courier_id) {
            return Err(courier_not_found(courier_id));
        }

        let mut route = self
            .routes
            .get_mut(&route_id)
            .ok_or_else(|| route_not_found(route_id))?;
        route.courier_id = Some(courier_id);
        Ok(())
    }

    async fn unbind_courier(&self, route_id: RouteId) -> Result<(), AppError> {
        let _guard = self.write_guard()?;
        let mut route = self
            .routes
            .get_mut(&route_id)
            .ok_or_else(|| route_not_found(route_id))?;
        route.courier_id = None;
        Ok(())
    }

    async fn create_courier(&self, name: &str, phone: Option<&str>) -> Result<Courier, AppError> {
        let courier = Courier {
            id: self.next_courier_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            phone: phone.map(str::to_string),
            status: CourierStatus::Available,
            updated_at: Utc::now(),
        };

        self.couriers.insert(courier.id, courier.clone());
        Ok(courier)
    }

    async fn list_couriers(&self) -> Result<Vec<Courier>, AppError> {
        let mut couriers: Vec<Courier> = self
            .couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        couriers.sort_by_key(|courier| courier.id);
        Ok(couriers)
    }

    async fn get_courier(&self, id: CourierId) -> Result<Option<Courier>, AppError> {
        Ok(self.couriers.get(&id).map(|courier| courier.value().clone()))
    }

    async fn set_courier_status(
        &self,
        id: CourierId,
        status: CourierStatus,
    ) -> Result<(), AppError> {
        let mut courier = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| courier_not_found(id))?;
        courier.status = status;
        courier.updated_at = Utc::now();
        Ok(())
    }
}
