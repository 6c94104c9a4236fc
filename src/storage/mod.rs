//! Persistence contract for orders, routes and couriers.
//!
//! Every method that touches more than one row is atomic: it either applies completely or
//! leaves previously stored state as it was.

#[cfg(test)]
pub(crate) mod hooked;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierId, CourierStatus};
use crate::models::order::{Order, OrderStatus};
use crate::models::route::{Route, RouteId, RouteStatus};

pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Inserts a new order. Returns `false` when the id is already known, leaving the
    /// stored order untouched.
    async fn save_order(&self, order: &Order) -> Result<bool, AppError>;

    async fn get_order(&self, id: &str) -> Result<Option<Order>, AppError>;

    /// Pending orders in arrival order.
    async fn fetch_pending_orders(&self) -> Result<Vec<Order>, AppError>;

    /// Routes whose status is not `completed`, by ascending id.
    async fn fetch_open_routes(&self) -> Result<Vec<Route>, AppError>;

    async fn list_routes(&self) -> Result<Vec<Route>, AppError>;

    async fn get_route(&self, id: RouteId) -> Result<Option<Route>, AppError>;

    /// Opens a `created` route whose only stop is `first_order`, and marks the order routed.
    async fn create_route(
        &self,
        first_order: &Order,
        navigation_link: &str,
    ) -> Result<RouteId, AppError>;

    /// Replaces the stored stop list and navigation link of `route.id`, numbering stops
    /// `1..=N` in the given order, and marks every contained order routed.
    async fn persist_route(&self, route: &Route) -> Result<(), AppError>;

    /// `persist_route` for a route that no longer contains `order_id`, plus setting the
    /// released order's status, in one step.
    async fn release_order(
        &self,
        route: &Route,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), AppError>;

    async fn set_route_status(&self, id: RouteId, status: RouteStatus) -> Result<(), AppError>;

    /// Marks the route completed and each of its orders delivered.
    async fn complete_route(&self, id: RouteId) -> Result<(), AppError>;

    async fn bind_courier(&self, route_id: RouteId, courier_id: CourierId) -> Result<(), AppError>;

    async fn unbind_courier(&self, route_id: RouteId) -> Result<(), AppError>;

    async fn create_courier(&self, name: &str, phone: Option<&str>) -> Result<Courier, AppError>;

    async fn list_couriers(&self) -> Result<Vec<Courier>, AppError>;

    async fn get_courier(&self, id: CourierId) -> Result<Option<Courier>, AppError>;

    async fn set_courier_status(
        &self,
        id: CourierId,
        status: CourierStatus,
    ) -> Result<(), AppError>;
}

pub(crate) fn route_not_found(id: RouteId) -> AppError {
    AppError::NotFound(format!("route {id} not found"))
}

pub(crate) fn order_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("order {id} not found"))
}

pub(crate) fn duplicate_stop(route_id: RouteId, order_id: &str) -> AppError {
    AppError::Conflict(format!("order {order_id} appears twice on route {route_id}"))
}

pub(crate) fn courier_not_found(id: CourierId) -> AppError {
    AppError::NotFound(format!("courier {id} not found"))
}
