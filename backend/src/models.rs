use geo_types::{Coord, Point};
use serde::{Deserialize, Serialize};

pub use shared::{
    ApiError, DayId, HullType, LegRequest, LegResult, SafeRouteRequest, SafeRouteResponse,
    VesselProfile, Waypoint,
};

/// Latitude band the engine operates in. Beyond it cos(lat) collapses and
/// the equirectangular grid stops being meaningful.
pub const MAX_OPERATING_LAT: f64 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Clamps into the operating envelope: lat ±85°, lng ±180°.
    pub fn clamped(self) -> Self {
        Self {
            lat: self.lat.clamp(-MAX_OPERATING_LAT, MAX_OPERATING_LAT),
            lng: self.lng.clamp(-180.0, 180.0),
        }
    }

    pub fn rounded(self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        Self {
            lat: (self.lat * factor).round() / factor,
            lng: (self.lng * factor).round() / factor,
        }
    }

    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }

    pub fn to_waypoint(self, note: Option<&str>) -> Waypoint {
        Waypoint {
            lat: self.lat,
            lng: self.lng,
            note: note.map(str::to_owned),
        }
    }
}

impl From<Coord<f64>> for GeoPoint {
    fn from(coord: Coord<f64>) -> Self {
        Self::new(coord.y, coord.x)
    }
}

impl From<&Waypoint> for GeoPoint {
    fn from(waypoint: &Waypoint) -> Self {
        Self::new(waypoint.lat, waypoint.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
    }

    /// Box spanning both points, padded by `margin_km` on every side.
    pub fn from_route(start: GeoPoint, end: GeoPoint, margin_km: f64) -> Self {
        let mean_lat = (start.lat + end.lat) / 2.0;
        let margin_lat = margin_km / crate::geodesy::KM_PER_DEG;
        let margin_lng = margin_lat / crate::geodesy::lng_scale(mean_lat);

        Self {
            min_lat: start.lat.min(end.lat) - margin_lat,
            max_lat: start.lat.max(end.lat) + margin_lat,
            min_lng: start.lng.min(end.lng) - margin_lng,
            max_lng: start.lng.max(end.lng) + margin_lng,
        }
        .clamped()
    }

    pub fn clamped(self) -> Self {
        Self {
            min_lat: self.min_lat.max(-MAX_OPERATING_LAT),
            max_lat: self.max_lat.min(MAX_OPERATING_LAT),
            min_lng: self.min_lng.max(-180.0),
            max_lng: self.max_lng.min(180.0),
        }
    }
}

/// A leg whose coordinates passed validation and were clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub from: GeoPoint,
    pub to: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LegInputError {
    #[error("missing or non-numeric {0} coordinate")]
    MissingCoordinate(&'static str),
    #[error("leg spans {0:.1} degrees of longitude; antimeridian crossings are not supported")]
    Antimeridian(f64),
}

impl Leg {
    pub fn from_request(req: &LegRequest) -> Result<Self, LegInputError> {
        let coordinate = |value: Option<f64>, name: &'static str| {
            value
                .filter(|v| v.is_finite())
                .ok_or(LegInputError::MissingCoordinate(name))
        };

        let from = GeoPoint::new(
            coordinate(req.from_lat, "fromLat")?,
            coordinate(req.from_lng, "fromLng")?,
        )
        .clamped();
        let to = GeoPoint::new(
            coordinate(req.to_lat, "toLat")?,
            coordinate(req.to_lng, "toLng")?,
        )
        .clamped();

        let span = (to.lng - from.lng).abs();
        if span > 180.0 {
            return Err(LegInputError::Antimeridian(span));
        }

        Ok(Self { from, to })
    }
}
