use crate::engine::corridor::{CorridorParams, direction_penalty, is_candidate_for_route};
use crate::engine::sequencer::{reorder, total_distance};
use crate::geo::GeoPoint;
use crate::models::assignment::RouteFit;
use crate::models::order::Order;
use crate::models::route::{Route, RouteStop};

/// Greedy best-fit selection of an open route for a single incoming order.
///
/// Each call looks at one order in isolation; earlier decisions are never revisited, so
/// the final clustering depends on the order in which callers feed it orders.
#[derive(Debug, Clone)]
pub struct AssignmentEngine {
    pub origin: GeoPoint,
    pub params: CorridorParams,
}

impl AssignmentEngine {
    pub fn new(origin: GeoPoint, params: CorridorParams) -> Self {
        Self { origin, params }
    }

    /// Cost of adding `order` to `route`, or `None` when the route is not a corridor
    /// candidate for it.
    pub fn evaluate(&self, order: &Order, route: &Route) -> Option<RouteFit> {
        if !is_candidate_for_route(&self.origin, &route.stops, &order.coords, &self.params) {
            return None;
        }

        let before = total_distance(&reorder(&route.stops, &self.origin), &self.origin);

        let mut extended = route.stops.clone();
        extended.push(RouteStop::from_order(order));
        let after = total_distance(&reorder(&extended, &self.origin), &self.origin);

        let added_distance_km = after - before;
        let penalty = direction_penalty(
            &route.stops,
            &order.coords,
            &self.origin,
            self.params.direction_penalty_weight,
        );

        Some(RouteFit {
            route_id: route.id,
            added_distance_km,
            direction_penalty: penalty,
            cost: added_distance_km + penalty,
        })
    }

    /// Cheapest candidate among `routes`, if its cost clears the ceiling. Equal costs keep
    /// the route seen first.
    pub fn find_best_route<'a, I>(&self, order: &Order, routes: I) -> Option<RouteFit>
    where
        I: IntoIterator<Item = &'a Route>,
    {
        let best = routes
            .into_iter()
            .filter_map(|route| self.evaluate(order, route))
            .fold(None, |best: Option<RouteFit>, fit| match best {
                Some(current) if current.cost <= fit.cost => Some(current),
                _ => Some(fit),
            })?;

        (best.cost < self.params.cost_ceiling()).then_some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::AssignmentEngine;
    use crate::engine::corridor::CorridorParams;
    use crate::geo::GeoPoint;
    use crate::models::order::Order;
    use crate::models::route::{Route, RouteStop};

    fn engine() -> AssignmentEngine {
        AssignmentEngine::new(GeoPoint::new(0.0, 0.0), CorridorParams::default())
    }

    fn order(id: &str, lat: f64, lon: f64) -> Order {
        Order::pending(id, GeoPoint::new(lat, lon))
    }

    fn route(id: i64, orders: &[Order]) -> Route {
        let mut route = Route::seeded(id, &orders[0], String::new());
        for order in &orders[1..] {
            route.push_stop(RouteStop::from_order(order));
        }
        route
    }

    #[test]
    fn no_routes_means_new_route() {
        let routes: Vec<Route> = Vec::new();
        assert!(engine().find_best_route(&order("a", 0.0, 0.01), &routes).is_none());
    }

    #[test]
    fn collinear_farther_order_merges_with_zero_penalty() {
        let existing = route(1, &[order("p1", 0.0, 0.01)]);
        let fit = engine()
            .find_best_route(&order("p2", 0.0, 0.05), [&existing])
            .expect("p2 should merge");

        assert_eq!(fit.route_id, 1);
        assert!(fit.direction_penalty.abs() < 1e-9);
        // origin -> p1 -> p2 grows by the p1 -> p2 leg (~4.45 km)
        assert!((fit.added_distance_km - 4.448).abs() < 0.01);
    }

    #[test]
    fn picks_cheapest_of_several_candidates() {
        let east = route(1, &[order("e", 0.0, 0.04)]);
        let north_east = route(2, &[order("ne", 0.028, 0.028)]);

        let fit = engine()
            .find_best_route(&order("new", 0.001, 0.02), [&north_east, &east])
            .expect("should merge");
        assert_eq!(fit.route_id, 1);
    }

    #[test]
    fn candidate_above_cost_ceiling_is_refused() {
        let existing = route(1, &[order("p1", 0.0, 0.01)]);
        let far = order("far", 0.0, 0.2);

        let fit = engine().evaluate(&far, &existing).expect("corridor candidate");
        assert!(fit.cost >= CorridorParams::default().cost_ceiling());
        assert!(engine().find_best_route(&far, [&existing]).is_none());
    }

    #[test]
    fn off_corridor_order_is_not_evaluated() {
        let existing = route(1, &[order("p1", 0.0, 0.01), order("p2", 0.0, 0.05)]);
        assert!(engine().evaluate(&order("p3", 0.03, 0.01), &existing).is_none());
    }

    #[test]
    fn equal_cost_keeps_first_route() {
        let first = route(1, &[order("a", 0.0, 0.04)]);
        let second = route(2, &[order("b", 0.0, 0.04)]);

        let fit = engine()
            .find_best_route(&order("new", 0.0, 0.02), [&first, &second])
            .expect("should merge");
        assert_eq!(fit.route_id, 1);
    }
}
