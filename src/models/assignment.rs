use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::CourierId;
use crate::models::order::OrderId;
use crate::models::route::RouteId;

/// Cost of merging one order into one route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouteFit {
    pub route_id: RouteId,
    pub added_distance_km: f64,
    pub direction_penalty: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteEventKind {
    RouteCreated,
    OrderMerged,
    StopsChanged,
    CourierAssigned,
    CourierUnassigned,
    StatusChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEvent {
    pub id: Uuid,
    pub route_id: RouteId,
    pub kind: RouteEventKind,
    pub order_id: Option<OrderId>,
    pub courier_id: Option<CourierId>,
    pub fit: Option<RouteFit>,
    pub at: DateTime<Utc>,
}

impl RouteEvent {
    pub fn new(route_id: RouteId, kind: RouteEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            route_id,
            kind,
            order_id: None,
            courier_id: None,
            fit: None,
            at: Utc::now(),
        }
    }

    pub fn with_order(mut self, order_id: impl Into<OrderId>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_courier(mut self, courier_id: CourierId) -> Self {
        self.courier_id = Some(courier_id);
        self
    }

    pub fn with_fit(mut self, fit: RouteFit) -> Self {
        self.fit = Some(fit);
        self
    }
}
