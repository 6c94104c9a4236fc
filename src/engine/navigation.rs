use crate::geo::{GeoPoint, Located};

const MAPS_DIRECTIONS_URL: &str = "https://www.google.com/maps/dir/";

/// Multi-stop driving directions link: origin first, then each stop in visiting order.
pub fn navigation_link<T: Located>(origin: &GeoPoint, ordered_stops: &[T]) -> String {
    let points: Vec<String> = std::iter::once(*origin)
        .chain(ordered_stops.iter().map(Located::point))
        .map(|point| format!("{},{}", point.lat, point.lon))
        .collect();

    format!("{MAPS_DIRECTIONS_URL}{}?travelmode=driving", points.join("/"))
}
