use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, Located};

pub type OrderId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Routed,
    Unassigned,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Routed => "routed",
            OrderStatus::Unassigned => "unassigned",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// Statuses an order may hold while it is not on any route.
    pub fn is_detached(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Unassigned)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(OrderStatus::Pending),
            "routed" => Ok(OrderStatus::Routed),
            "unassigned" => Ok(OrderStatus::Unassigned),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub coords: GeoPoint,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn pending(id: impl Into<OrderId>, coords: GeoPoint) -> Self {
        Self {
            id: id.into(),
            coords,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

impl Located for Order {
    fn point(&self) -> GeoPoint {
        self.coords
    }
}
