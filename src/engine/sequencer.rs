use crate::geo::{GeoPoint, Located, haversine_km};

/// Greedy nearest-neighbour walk from `origin`.
///
/// No lookahead, so the tour is not guaranteed minimal. When two remaining stops are
/// equally close the one that comes first in `stops` wins, which keeps the result
/// stable for a given input order.
pub fn reorder<T: Located + Clone>(stops: &[T], origin: &GeoPoint) -> Vec<T> {
    let mut remaining: Vec<&T> = stops.iter().collect();
    let mut ordered = Vec::with_capacity(stops.len());
    let mut current = *origin;

    while !remaining.is_empty() {
        let mut closest = 0;
        let mut closest_distance = f64::INFINITY;
        for (index, stop) in remaining.iter().enumerate() {
            let distance = haversine_km(&current, &stop.point());
            if distance < closest_distance {
                closest = index;
                closest_distance = distance;
            }
        }

        let next = remaining.remove(closest);
        current = next.point();
        ordered.push(next.clone());
    }

    ordered
}

/// Sum of legs origin -> first -> ... -> last.
pub fn total_distance<T: Located>(ordered: &[T], origin: &GeoPoint) -> f64 {
    ordered
        .iter()
        .fold((0.0, *origin), |(total, current), stop| {
            let next = stop.point();
            (total + haversine_km(&current, &next), next)
        })
        .0
}
