use geo::HaversineDistance;
use geo_types::Coord;

use crate::models::GeoPoint;

pub const KM_PER_DEG: f64 = 111.32;
pub const METERS_PER_DEG: f64 = 111_320.0;
pub const METERS_PER_NM: f64 = 1_852.0;

/// Floor on cos(lat) so longitude spacing stays finite near the poles.
pub const MIN_LNG_SCALE: f64 = 0.05;

/// Great-circle distance in meters (mean earth radius 6 371 008.8 m).
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    a.to_point().haversine_distance(&b.to_point())
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    haversine_m(a, b) / 1000.0
}

pub fn path_length_m(path: &[GeoPoint]) -> f64 {
    path.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

pub fn lng_scale(lat: f64) -> f64 {
    lat.to_radians().cos().abs().max(MIN_LNG_SCALE)
}

/// Local equirectangular frame: degrees to meters, with longitude scaled by
/// the cosine of a reference latitude. Good to a few meters over the extent
/// of a single leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    lng_m_per_deg: f64,
}

impl LocalFrame {
    pub fn at(lat: f64) -> Self {
        Self {
            lng_m_per_deg: METERS_PER_DEG * lng_scale(lat),
        }
    }

    pub fn around(points: &[GeoPoint]) -> Self {
        let mean_lat = if points.is_empty() {
            0.0
        } else {
            points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64
        };
        Self::at(mean_lat)
    }

    pub fn project(&self, point: GeoPoint) -> Coord<f64> {
        Coord {
            x: point.lng * self.lng_m_per_deg,
            y: point.lat * METERS_PER_DEG,
        }
    }

    /// Projects a `Coord` already in (lng, lat) order.
    pub fn project_coord(&self, coord: Coord<f64>) -> Coord<f64> {
        Coord {
            x: coord.x * self.lng_m_per_deg,
            y: coord.y * METERS_PER_DEG,
        }
    }

    pub fn unproject(&self, coord: Coord<f64>) -> GeoPoint {
        GeoPoint::new(coord.y / METERS_PER_DEG, coord.x / self.lng_m_per_deg)
    }
}

/// Unit vector (in the local frame) perpendicular to `start -> end`, pointing
/// to the left of the direction of travel.
fn perpendicular_unit(frame: &LocalFrame, start: GeoPoint, end: GeoPoint) -> Coord<f64> {
    let a = frame.project(start);
    let b = frame.project(end);
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt().max(f64::EPSILON);
    Coord {
        x: -dy / len,
        y: dx / len,
    }
}

/// Midpoint of `start -> end` pushed sideways by `ratio` of the segment
/// length, never more than `max_offset_m`.
pub fn offset_midpoint(start: GeoPoint, end: GeoPoint, ratio: f64, max_offset_m: f64) -> GeoPoint {
    let frame = LocalFrame::at((start.lat + end.lat) / 2.0);
    let perp = perpendicular_unit(&frame, start, end);
    let offset = (haversine_m(start, end) * ratio).min(max_offset_m);
    let mid = frame.project(start.interpolate(end, 0.5));
    frame.unproject(Coord {
        x: mid.x + perp.x * offset,
        y: mid.y + perp.y * offset,
    })
}

pub fn meters_to_nm(meters: f64) -> f64 {
    meters / METERS_PER_NM
}

#[cfg(test)]
mod tests {
    use super::*;

    const EARTH_RADIUS_KM: f64 = 6_371.0088;

    #[test]
    fn test_haversine_same_point() {
        let point = GeoPoint::new(43.5, 16.4);
        assert_eq!(haversine_m(point, point), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(43.0, 16.0);
        let b = GeoPoint::new(44.0, 16.0);
        assert!((haversine_km(a, b) - 111.195).abs() < 0.01);
    }

    #[test]
    fn test_path_length_empty_and_single() {
        assert_eq!(path_length_m(&[]), 0.0);
        assert_eq!(path_length_m(&[GeoPoint::new(43.0, 16.0)]), 0.0);
    }

    #[test]
    fn test_local_frame_matches_haversine_over_short_distances() {
        let a = GeoPoint::new(43.50, 16.40);
        let b = GeoPoint::new(43.45, 16.48);
        let frame = LocalFrame::around(&[a, b]);
        let pa = frame.project(a);
        let pb = frame.project(b);
        let planar = ((pa.x - pb.x).powi(2) + (pa.y - pb.y).powi(2)).sqrt();
        let relative = (planar - haversine_m(a, b)).abs() / haversine_m(a, b);
        assert!(relative < 0.005, "relative error {relative}");
    }

    #[test]
    fn test_offset_midpoint_is_capped() {
        let a = GeoPoint::new(43.0, 15.5);
        let b = GeoPoint::new(43.2, 15.7);
        let mid = a.interpolate(b, 0.5);
        let shifted = offset_midpoint(a, b, 0.1, 1_500.0);
        let shift = haversine_m(mid, shifted);
        assert!((shift - 1_500.0).abs() < 15.0, "shift {shift}");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn valid_point() -> impl Strategy<Value = GeoPoint> {
            (-85.0..=85.0, -180.0..=180.0).prop_map(|(lat, lng)| GeoPoint::new(lat, lng))
        }

        fn adriatic_point() -> impl Strategy<Value = GeoPoint> {
            (42.0..=45.0, 13.0..=19.0).prop_map(|(lat, lng)| GeoPoint::new(lat, lng))
        }

        proptest! {
            #[test]
            fn prop_haversine_symmetric(a in valid_point(), b in valid_point()) {
                let ab = haversine_m(a, b);
                let ba = haversine_m(b, a);
                prop_assert!(ab >= 0.0);
                prop_assert!((ab - ba).abs() < 1e-6);
            }

            #[test]
            fn prop_haversine_bounded_by_half_earth_circumference(a in valid_point(), b in valid_point()) {
                let max_distance = std::f64::consts::PI * EARTH_RADIUS_KM;
                prop_assert!(haversine_km(a, b) <= max_distance + 0.1);
            }

            #[test]
            fn prop_haversine_triangle_inequality(a in valid_point(), b in valid_point(), c in valid_point()) {
                prop_assert!(haversine_m(a, c) <= haversine_m(a, b) + haversine_m(b, c) + 0.1);
            }

            #[test]
            fn prop_path_length_additive(
                first in prop::collection::vec(valid_point(), 2..5),
                second in prop::collection::vec(valid_point(), 2..5)
            ) {
                let mut combined = first.clone();
                combined.extend_from_slice(&second);
                let connection = haversine_m(first[first.len() - 1], second[0]);
                let expected = path_length_m(&first) + connection + path_length_m(&second);
                prop_assert!((path_length_m(&combined) - expected).abs() < 1e-3);
            }

            #[test]
            fn prop_offset_midpoint_is_left_of_travel(a in adriatic_point(), b in adriatic_point()) {
                prop_assume!(haversine_m(a, b) > 1_000.0);
                let frame = LocalFrame::around(&[a, b]);
                let pa = frame.project(a);
                let pb = frame.project(b);
                let pm = frame.project(offset_midpoint(a, b, 0.03, 1_500.0));
                let cross = (pb.x - pa.x) * (pm.y - pa.y) - (pb.y - pa.y) * (pm.x - pa.x);
                prop_assert!(cross > 0.0);
            }
        }
    }
}
