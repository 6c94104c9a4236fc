use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, Located};
use crate::models::courier::CourierId;
use crate::models::order::{Order, OrderId};

pub type RouteId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Created,
    InProgress,
    Completed,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Created => "created",
            RouteStatus::InProgress => "in_progress",
            RouteStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "created" => Ok(RouteStatus::Created),
            "in_progress" => Ok(RouteStatus::InProgress),
            "completed" => Ok(RouteStatus::Completed),
            other => Err(format!("unknown route status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteStop {
    pub order_id: OrderId,
    pub sequence: u32,
    pub coords: GeoPoint,
}

impl RouteStop {
    /// A stop for `order` with a placeholder sequence; the owning route renumbers it.
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            sequence: 0,
            coords: order.coords,
        }
    }
}

impl Located for RouteStop {
    fn point(&self) -> GeoPoint {
        self.coords
    }
}

/// A delivery trip from the origin. `stops` is always numbered `1..=N` in visiting order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub status: RouteStatus,
    pub navigation_link: String,
    pub courier_id: Option<CourierId>,
    pub stops: Vec<RouteStop>,
    pub created_at: DateTime<Utc>,
}

impl Route {
    pub fn seeded(id: RouteId, first_order: &Order, navigation_link: String) -> Self {
        let mut route = Self {
            id,
            status: RouteStatus::Created,
            navigation_link,
            courier_id: None,
            stops: vec![RouteStop::from_order(first_order)],
            created_at: Utc::now(),
        };
        route.renumber();
        route
    }

    pub fn is_open(&self) -> bool {
        self.status != RouteStatus::Completed
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.stops.iter().any(|stop| stop.order_id == order_id)
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        self.stops.iter().map(|stop| stop.order_id.clone()).collect()
    }

    /// Replaces the stop list with `ordered`, numbering it in the given order.
    pub fn set_stops(&mut self, ordered: Vec<RouteStop>) {
        self.stops = ordered;
        self.renumber();
    }

    pub fn push_stop(&mut self, stop: RouteStop) {
        self.stops.push(stop);
        self.renumber();
    }

    /// Inserts at a 1-based `position`; positions past the end append.
    pub fn insert_stop(&mut self, position: usize, stop: RouteStop) {
        let index = position.saturating_sub(1).min(self.stops.len());
        self.stops.insert(index, stop);
        self.renumber();
    }

    pub fn remove_stop(&mut self, order_id: &str) -> Option<RouteStop> {
        let index = self.stops.iter().position(|stop| stop.order_id == order_id)?;
        let removed = self.stops.remove(index);
        self.renumber();
        Some(removed)
    }

    pub fn renumber(&mut self) {
        for (index, stop) in self.stops.iter_mut().enumerate() {
            stop.sequence = index as u32 + 1;
        }
    }

    pub fn is_densely_sequenced(&self) -> bool {
        self.stops
            .iter()
            .enumerate()
            .all(|(index, stop)| stop.sequence == index as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::{Route, RouteStop};
    use crate::geo::GeoPoint;
    use crate::models::order::Order;

    fn order(id: &str, lat: f64, lon: f64) -> Order {
        Order::pending(id, GeoPoint::new(lat, lon))
    }

    fn sequences(route: &Route) -> Vec<u32> {
        route.stops.iter().map(|stop| stop.sequence).collect()
    }

    #[test]
    fn seeded_route_has_single_first_stop() {
        let route = Route::seeded(7, &order("a", 0.0, 0.01), String::new());
        assert_eq!(route.stops.len(), 1);
        assert_eq!(route.stops[0].sequence, 1);
        assert!(route.is_open());
    }

    #[test]
    fn sequence_stays_dense_through_mixed_edits() {
        let mut route = Route::seeded(1, &order("a", 0.0, 0.01), String::new());
        route.push_stop(RouteStop::from_order(&order("b", 0.0, 0.02)));
        route.push_stop(RouteStop::from_order(&order("c", 0.0, 0.03)));
        route.insert_stop(1, RouteStop::from_order(&order("d", 0.0, 0.005)));
        assert_eq!(sequences(&route), vec![1, 2, 3, 4]);

        assert!(route.remove_stop("b").is_some());
        assert_eq!(sequences(&route), vec![1, 2, 3]);
        assert_eq!(route.order_ids(), vec!["d", "a", "c"]);

        let mut reversed = route.stops.clone();
        reversed.reverse();
        route.set_stops(reversed);
        assert_eq!(route.order_ids(), vec!["c", "a", "d"]);
        assert!(route.is_densely_sequenced());

        route.insert_stop(99, RouteStop::from_order(&order("e", 0.0, 0.04)));
        assert_eq!(route.order_ids().last().map(String::as_str), Some("e"));
        assert_eq!(sequences(&route), vec![1, 2, 3, 4]);
    }

    #[test]
    fn removing_unknown_stop_leaves_route_untouched() {
        let mut route = Route::seeded(1, &order("a", 0.0, 0.01), String::new());
        assert!(route.remove_stop("missing").is_none());
        assert_eq!(route.order_ids(), vec!["a"]);
    }
}
