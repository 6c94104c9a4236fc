//! "On the way" tests between the origin and a route's farthest stop.

use crate::geo::{GeoPoint, Located, haversine_km, offset, projection_onto};

/// Tunables for the corridor test and the merge cost threshold.
///
/// The defaults are the values the dispatcher has been running with; none of them has
/// a derivation behind it, so deployments are expected to tune them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorridorParams {
    /// Lateral width of the corridor. Carried through configuration; acceptance is decided
    /// by the detour bound.
    pub corridor_width_km: f64,
    pub max_detour_km: f64,
    /// How far past the anchor a point may sit and still count as before it.
    pub beyond_anchor_tolerance_km: f64,
    /// Added to `max_detour_km` to form the merge cost ceiling.
    pub cost_slack_km: f64,
    pub direction_penalty_weight: f64,
}

impl Default for CorridorParams {
    fn default() -> Self {
        Self {
            corridor_width_km: 0.8,
            max_detour_km: 1.5,
            beyond_anchor_tolerance_km: 0.1,
            cost_slack_km: 5.0,
            direction_penalty_weight: 5.0,
        }
    }
}

impl CorridorParams {
    pub fn cost_ceiling(&self) -> f64 {
        self.max_detour_km + self.cost_slack_km
    }
}

pub fn is_on_the_way(
    origin: &GeoPoint,
    anchor: &GeoPoint,
    point: &GeoPoint,
    params: &CorridorParams,
) -> bool {
    if projection_onto(origin, anchor, point) <= 0.0 {
        return false;
    }

    let origin_to_point = haversine_km(origin, point);
    let origin_to_anchor = haversine_km(origin, anchor);
    let anchor_to_point = haversine_km(anchor, point);

    if origin_to_point > origin_to_anchor + params.beyond_anchor_tolerance_km {
        return false;
    }

    origin_to_point + anchor_to_point <= origin_to_anchor + params.max_detour_km
}

/// Farthest-from-origin stop. Ties keep the earliest stop.
pub fn anchor_of<'a, T: Located>(origin: &GeoPoint, stops: &'a [T]) -> Option<&'a T> {
    let mut best: Option<(&'a T, f64)> = None;
    for stop in stops {
        let distance = haversine_km(origin, &stop.point());
        if best.is_none_or(|(_, best_distance)| distance > best_distance) {
            best = Some((stop, distance));
        }
    }
    best.map(|(stop, _)| stop)
}

/// A route accepts `new_point` either as infill before its anchor, or as a new, farther
/// anchor that every existing stop lies on the way to.
pub fn is_candidate_for_route<T: Located>(
    origin: &GeoPoint,
    stops: &[T],
    new_point: &GeoPoint,
    params: &CorridorParams,
) -> bool {
    let Some(anchor) = anchor_of(origin, stops).map(Located::point) else {
        return false;
    };

    if is_on_the_way(origin, &anchor, new_point, params) {
        return true;
    }

    haversine_km(origin, new_point) > haversine_km(origin, &anchor)
        && stops
            .iter()
            .all(|stop| is_on_the_way(origin, new_point, &stop.point(), params))
}

/// `(1 - cos θ) * weight`, θ being the angle between the route's mean bearing and the new
/// point's bearing from the origin. Zero for an empty route or a point on the origin.
pub fn direction_penalty<T: Located>(
    stops: &[T],
    new_point: &GeoPoint,
    origin: &GeoPoint,
    weight: f64,
) -> f64 {
    if stops.is_empty() {
        return 0.0;
    }

    let (sum_x, sum_y) = stops.iter().fold((0.0, 0.0), |(x, y), stop| {
        let (dx, dy) = offset(origin, &stop.point());
        (x + dx, y + dy)
    });
    let (new_x, new_y) = offset(origin, new_point);

    let norm_route = sum_x.hypot(sum_y);
    let norm_new = new_x.hypot(new_y);
    if norm_route == 0.0 || norm_new == 0.0 {
        return 0.0;
    }

    let cosine =
        (sum_x / norm_route) * (new_x / norm_new) + (sum_y / norm_route) * (new_y / norm_new);
    ((1.0 - cosine) * weight).max(0.0)
}
