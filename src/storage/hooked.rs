//! Test storage that wraps [`InMemoryStorage`] and lets a test change state at chosen
//! points of a dispatch cycle or a courier assignment.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierId, CourierStatus};
use crate::models::order::{Order, OrderStatus};
use crate::models::route::{Route, RouteId, RouteStatus};
use crate::storage::{InMemoryStorage, Storage};

/// A write applied once, right after `fetch_open_routes` has taken its snapshot.
pub(crate) enum Interleave {
    PersistRoute(Route),
    ReleaseOrder {
        route: Route,
        order_id: String,
        status: OrderStatus,
    },
    CompleteRoute(RouteId),
}

#[derive(Default)]
pub(crate) struct HookedStorage {
    inner: InMemoryStorage,
    after_snapshot: Mutex<Option<Interleave>>,
    failing_courier_status: Mutex<Option<CourierStatus>>,
}

impl HookedStorage {
    pub(crate) fn after_snapshot(&self, write: Interleave) {
        *self.after_snapshot.lock().unwrap() = Some(write);
    }

    /// Every later `set_courier_status` to `status` fails with a storage error.
    pub(crate) fn fail_courier_status(&self, status: CourierStatus) {
        *self.failing_courier_status.lock().unwrap() = Some(status);
    }

    async fn apply(&self, write: Interleave) -> Result<(), AppError> {
        match write {
            Interleave::PersistRoute(route) => self.inner.persist_route(&route).await,
            Interleave::ReleaseOrder {
                route,
                order_id,
                status,
            } => self.inner.release_order(&route, &order_id, status).await,
            Interleave::CompleteRoute(id) => self.inner.complete_route(id).await,
        }
    }
}

#[async_trait]
impl Storage for HookedStorage {
    async fn save_order(&self, order: &Order) -> Result<bool, AppError> {
        self.inner.save_order(order).await
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, AppError> {
        self.inner.get_order(id).await
    }

    async fn fetch_pending_orders(&self) -> Result<Vec<Order>, AppError> {
        self.inner.fetch_pending_orders().await
    }

    async fn fetch_open_routes(&self) -> Result<Vec<Route>, AppError> {
        let snapshot = self.inner.fetch_open_routes().await?;
        let write = self.after_snapshot.lock().unwrap().take();
        if let Some(write) = write {
            self.apply(write).await?;
        }
        Ok(snapshot)
    }

    async fn list_routes(&self) -> Result<Vec<Route>, AppError> {
        self.inner.list_routes().await
    }

    async fn get_route(&self, id: RouteId) -> Result<Option<Route>, AppError> {
        self.inner.get_route(id).await
    }

    async fn create_route(
        &self,
        first_order: &Order,
        navigation_link: &str,
    ) -> Result<RouteId, AppError> {
        self.inner.create_route(first_order, navigation_link).await
    }

    async fn persist_route(&self, route: &Route) -> Result<(), AppError> {
        self.inner.persist_route(route).await
    }

    async fn release_order(
        &self,
        route: &Route,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), AppError> {
        self.inner.release_order(route, order_id, status).await
    }

    async fn set_route_status(&self, id: RouteId, status: RouteStatus) -> Result<(), AppError> {
        self.inner.set_route_status(id, status).await
    }

    async fn complete_route(&self, id: RouteId) -> Result<(), AppError> {
        self.inner.complete_route(id).await
    }

    async fn bind_courier(&self, route_id: RouteId, courier_id: CourierId) -> Result<(), AppError> {
        self.inner.bind_courier(route_id, courier_id).await
    }

    async fn unbind_courier(&self, route_id: RouteId) -> Result<(), AppError> {
        self.inner.unbind_courier(route_id).await
    }

    async fn create_courier(&self, name: &str, phone: Option<&str>) -> Result<Courier, AppError> {
        self.inner.create_courier(name, phone).await
    }

    async fn list_couriers(&self) -> Result<Vec<Courier>, AppError> {
        self.inner.list_couriers().await
    }

    async fn get_courier(&self, id: CourierId) -> Result<Option<Courier>, AppError> {
        self.inner.get_courier(id).await
    }

    async fn set_courier_status(
        &self,
        id: CourierId,
        status: CourierStatus,
    ) -> Result<(), AppError> {
        let failing = *self.failing_courier_status.lock().unwrap();
        if failing == Some(status) {
            return Err(AppError::Storage(format!(
                "courier {id} status write to {status} failed"
            )));
        }
        self.inner.set_courier_status(id, status).await
    }
}
