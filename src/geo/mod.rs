use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside the WGS84 lat/lon ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat.abs() <= 90.0
            && self.lon.abs() <= 180.0
    }
}

/// Anything that sits at a single point on the map.
pub trait Located {
    fn point(&self) -> GeoPoint;
}

impl Located for GeoPoint {
    fn point(&self) -> GeoPoint {
        *self
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lon = (delta_lon / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lon * sin_lon;
    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).sqrt());

    EARTH_RADIUS_KM * central_angle
}

/// Dot product of origin->anchor and origin->point in raw (lon, lat) degrees.
/// Only the sign is meaningful.
pub fn projection_onto(origin: &GeoPoint, anchor: &GeoPoint, point: &GeoPoint) -> f64 {
    let (anchor_x, anchor_y) = offset(origin, anchor);
    let (point_x, point_y) = offset(origin, point);

    anchor_x * point_x + anchor_y * point_y
}

/// Planar (lon, lat) offset of `to` relative to `from`.
pub fn offset(from: &GeoPoint, to: &GeoPoint) -> (f64, f64) {
    (to.lon - from.lon, to.lat - from.lat)
}

#[cfg(test)]
mod tests {
    use super::{GeoPoint, haversine_km, projection_onto};

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(-3.7838, -38.5008);
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(-3.7533, -38.5144);
        let b = GeoPoint::new(-3.8345, -38.5029);
        assert!((haversine_km(&a, &b) - haversine_km(&b, &a)).abs() < 1e-12);
    }

    #[test]
    fn nine_thousandths_of_a_degree_is_about_one_km() {
        let distance = haversine_km(&GeoPoint::new(0.0, 0.0), &GeoPoint::new(0.0, 0.009));
        assert!((distance - 1.0).abs() < 0.01);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn short_hop_south_in_fortaleza() {
        let p1 = GeoPoint::new(-3.783871, -38.500820);
        let p2 = GeoPoint::new(-3.784871, -38.500820);
        assert!((haversine_km(&p1, &p2) - 0.111).abs() < 0.01);
    }

    #[test]
    fn projection_sign_tracks_half_plane() {
        let origin = GeoPoint::new(0.0, 0.0);
        let anchor = GeoPoint::new(0.0, 1.0);

        assert!(projection_onto(&origin, &anchor, &GeoPoint::new(0.5, 0.5)) > 0.0);
        assert_eq!(projection_onto(&origin, &anchor, &GeoPoint::new(1.0, 0.0)), 0.0);
        assert!(projection_onto(&origin, &anchor, &GeoPoint::new(0.0, -0.2)) < 0.0);
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert!(GeoPoint::new(-3.78, -38.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::INFINITY).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -181.0).is_valid());
    }
}
