use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Route, Waypoint};

use crate::error::RouteError;
use crate::models::{GeoPoint, Leg, LegRequest, LegResult};

/// Encodes every routed leg as a GPX route (`from -> waypoints -> to`) and
/// returns the document as base64. Endpoints are written as the engine
/// routed them, clamped into the operating envelope. Failed legs and legs
/// without usable endpoint coordinates are skipped.
pub fn encode_voyage_as_gpx(requests: &[LegRequest], results: &[LegResult]) -> Result<String, RouteError> {
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("seaway".into()),
        ..Default::default()
    };

    for (request, result) in requests.iter().zip(results) {
        if result.failed {
            continue;
        }
        let Ok(Leg { from, to }) = Leg::from_request(request) else {
            continue;
        };

        let mut route = Route {
            name: Some(format!("Day {}: {} - {}", result.day, result.from, result.to)),
            ..Default::default()
        };
        route.points.push(named_point(from, &result.from));
        route.points.extend(result.waypoints.iter().map(|wp| {
            let mut point = Waypoint::new(Point::new(wp.lng, wp.lat));
            point.comment = wp.note.clone();
            point
        }));
        route.points.push(named_point(to, &result.to));
        gpx.routes.push(route);
    }

    let mut buffer = Vec::new();
    gpx::write(&gpx, &mut buffer)?;
    Ok(BASE64.encode(buffer))
}

fn named_point(at: GeoPoint, name: &str) -> Waypoint {
    let mut point = Waypoint::new(at.to_point());
    if !name.is_empty() {
        point.name = Some(name.to_owned());
    }
    point
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayId, Waypoint as LegWaypoint};

    fn decode(encoded: &str) -> Gpx {
        let bytes = BASE64.decode(encoded).unwrap();
        gpx::read(bytes.as_slice()).unwrap()
    }

    fn result(day: u64, failed: bool, waypoints: Vec<LegWaypoint>) -> LegResult {
        LegResult {
            day: DayId::Number(day),
            from: "Split".into(),
            to: "Milna".into(),
            waypoints,
            failed,
            distance_nm: None,
            estimated_hours: None,
            error: None,
        }
    }

    #[test]
    fn routed_legs_become_gpx_routes() {
        let requests = vec![
            LegRequest::new(DayId::Number(1), (43.5081, 16.4402), (43.3244, 16.4522)).with_labels("Split", "Milna"),
            LegRequest::new(DayId::Number(2), (43.3244, 16.4522), (43.0, 16.1)).with_labels("Milna", "Vis"),
        ];
        let waypoint = LegWaypoint {
            lat: 43.44,
            lng: 16.41,
            note: Some("safe route".into()),
        };
        let results = vec![result(1, false, vec![waypoint]), result(2, true, Vec::new())];

        let doc = decode(&encode_voyage_as_gpx(&requests, &results).unwrap());
        assert_eq!(doc.routes.len(), 1);
        let route = &doc.routes[0];
        assert_eq!(route.name.as_deref(), Some("Day 1: Split - Milna"));
        assert_eq!(route.points.len(), 3);
        assert_eq!(route.points[0].name.as_deref(), Some("Split"));
        assert!((route.points[1].point().y() - 43.44).abs() < 1e-9);
    }

    #[test]
    fn endpoints_are_exported_clamped() {
        let mut missing = LegRequest::new(DayId::Number(2), (43.0, 16.0), (43.1, 16.1));
        missing.from_lat = None;
        let requests = vec![
            LegRequest::new(DayId::Number(1), (89.0, 10.0), (84.0, 12.0)).with_labels("North", "South"),
            missing,
        ];
        let results = vec![result(1, false, Vec::new()), result(2, false, Vec::new())];

        let doc = decode(&encode_voyage_as_gpx(&requests, &results).unwrap());
        assert_eq!(doc.routes.len(), 1);
        let points = &doc.routes[0].points;
        assert_eq!(points.len(), 2);
        assert!((points[0].point().y() - 85.0).abs() < 1e-9);
        assert!((points[1].point().y() - 84.0).abs() < 1e-9);
    }
}
