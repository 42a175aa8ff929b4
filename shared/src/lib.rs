use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de::IgnoredAny};

/// Identifier of an itinerary day. Planners send either a day number or a
/// free-form label; both are echoed back untouched. Fractional or negative
/// numbers come back as labels, anything else unusable as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum DayId {
    Number(u64),
    Label(String),
    #[default]
    Missing,
}

impl fmt::Display for DayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayId::Number(n) => write!(f, "{n}"),
            DayId::Label(label) => f.write_str(label),
            DayId::Missing => f.write_str("-"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDay {
    Unsigned(u64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

impl<'de> Deserialize<'de> for DayId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let day = match Option::<RawDay>::deserialize(deserializer)? {
            Some(RawDay::Unsigned(n)) => DayId::Number(n),
            Some(RawDay::Float(v)) if v >= 0.0 && v.fract() == 0.0 && v < u64::MAX as f64 => {
                DayId::Number(v as u64)
            }
            Some(RawDay::Float(v)) if v.is_finite() => DayId::Label(v.to_string()),
            Some(RawDay::Text(label)) => DayId::Label(label),
            Some(RawDay::Float(_) | RawDay::Other(_)) | None => DayId::Missing,
        };
        Ok(day)
    }
}

/// One sailing leg as submitted by the itinerary layer.
///
/// Every field is optional on the wire: a missing, null or mistyped value
/// fails only this leg, never the whole request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegRequest {
    #[serde(default)]
    pub day: DayId,
    #[serde(default, deserialize_with = "lenient_label")]
    pub from: String,
    #[serde(default, deserialize_with = "lenient_label")]
    pub to: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub from_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub from_lng: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub to_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub to_lng: Option<f64>,
}

impl LegRequest {
    pub fn new(day: DayId, from: (f64, f64), to: (f64, f64)) -> Self {
        Self {
            day,
            from_lat: Some(from.0),
            from_lng: Some(from.1),
            to_lat: Some(to.0),
            to_lng: Some(to.1),
            ..Default::default()
        }
    }

    pub fn with_labels(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = from.into();
        self.to = to.into();
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

/// Accepts a JSON number, a numeric string or anything else (mapped to `None`).
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<RawScalar>::deserialize(deserializer)? {
        Some(RawScalar::Number(v)) => Some(v),
        Some(RawScalar::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(RawScalar::Other(_)) | None => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

/// Strings pass through, numbers are spelled out, anything else is `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawScalar>::deserialize(deserializer)? {
        Some(RawScalar::Text(s)) => Some(s),
        Some(RawScalar::Number(v)) => Some(v.to_string()),
        Some(RawScalar::Other(_)) | None => None,
    })
}

fn lenient_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_text(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HullType {
    #[default]
    Sailboat,
    Catamaran,
    Motorboat,
    #[serde(other)]
    Other,
}

impl HullType {
    /// Case-insensitive; a blank label means the default sailboat.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "" | "sailboat" => HullType::Sailboat,
            "catamaran" => HullType::Catamaran,
            "motorboat" => HullType::Motorboat,
            _ => HullType::Other,
        }
    }
}

/// Vessel descriptor. Draft and air draft are carried for future depth and
/// clearance checks; routing geometry does not depend on them yet.
///
/// Numbers may arrive as strings. A missing or non-positive draft falls back
/// to [`default_draft_m`]; non-positive air drafts and speeds are dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VesselProfile {
    pub draft_m: f64,
    #[serde(rename = "type")]
    pub hull: HullType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_draft_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cruise_speed_kn: Option<f64>,
}

impl Default for VesselProfile {
    fn default() -> Self {
        Self {
            draft_m: default_draft_m(),
            hull: HullType::default(),
            air_draft_m: None,
            cruise_speed_kn: None,
        }
    }
}

impl VesselProfile {
    fn from_raw(raw: RawVessel) -> Self {
        let positive = |value: Option<f64>| value.filter(|v| *v > 0.0);
        Self {
            draft_m: positive(raw.draft_m).unwrap_or_else(default_draft_m),
            hull: raw.hull.as_deref().map_or(HullType::Sailboat, HullType::from_label),
            air_draft_m: positive(raw.air_draft_m),
            cruise_speed_kn: positive(raw.cruise_speed_kn),
        }
    }
}

impl<'de> Deserialize<'de> for VesselProfile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawVessel::deserialize(deserializer).map(Self::from_raw)
    }
}

pub fn default_draft_m() -> f64 {
    2.0
}

#[derive(Default, Deserialize)]
struct RawVessel {
    #[serde(default, deserialize_with = "lenient_number")]
    draft_m: Option<f64>,
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    hull: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    air_draft_m: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    cruise_speed_kn: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Routed leg. `waypoints` excludes the leg's own endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegResult {
    pub day: DayId,
    pub from: String,
    pub to: String,
    pub waypoints: Vec<Waypoint>,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_nm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A batch of legs plus the vessel they are sailed with.
///
/// The vessel may be nested under `vessel` or given as the flat
/// `vesselDraft`, `vesselType`, `vesselAirDraft` and `cruiseSpeedKn` fields;
/// nested values win. Non-object entries in `days` become legs without
/// coordinates, so they fail on their own.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeRouteRequest {
    pub days: Vec<LegRequest>,
    pub vessel: VesselProfile,
    pub include_gpx: bool,
}

impl<'de> Deserialize<'de> for SafeRouteRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawSafeRouteRequest::deserialize(deserializer)?;
        let nested = raw.vessel.unwrap_or_default();
        let vessel = VesselProfile::from_raw(RawVessel {
            draft_m: nested.draft_m.or(raw.vessel_draft),
            hull: nested.hull.or(raw.vessel_type),
            air_draft_m: nested.air_draft_m.or(raw.vessel_air_draft),
            cruise_speed_kn: nested.cruise_speed_kn.or(raw.cruise_speed_kn),
        });
        Ok(Self {
            days: raw.days,
            vessel,
            include_gpx: raw.include_gpx,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSafeRouteRequest {
    #[serde(default, deserialize_with = "lenient_legs")]
    days: Vec<LegRequest>,
    #[serde(default, deserialize_with = "lenient_vessel")]
    vessel: Option<RawVessel>,
    #[serde(default, deserialize_with = "lenient_number")]
    vessel_draft: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    vessel_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    vessel_air_draft: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    cruise_speed_kn: Option<f64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    include_gpx: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLegs {
    List(Vec<RawLeg>),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLeg {
    Leg(LegRequest),
    Other(IgnoredAny),
}

fn lenient_legs<'de, D>(deserializer: D) -> Result<Vec<LegRequest>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(RawLegs::List(legs)) = Option::<RawLegs>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(legs
        .into_iter()
        .map(|leg| match leg {
            RawLeg::Leg(leg) => leg,
            RawLeg::Other(_) => LegRequest::default(),
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVesselField {
    Vessel(RawVessel),
    Other(IgnoredAny),
}

fn lenient_vessel<'de, D>(deserializer: D) -> Result<Option<RawVessel>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawVesselField>::deserialize(deserializer)? {
        Some(RawVesselField::Vessel(vessel)) => Some(vessel),
        Some(RawVesselField::Other(_)) | None => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Other(IgnoredAny),
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(
        Option::<RawFlag>::deserialize(deserializer)?,
        Some(RawFlag::Bool(true))
    ))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeRouteResponse {
    pub success: bool,
    pub safe_route: Vec<LegResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpx_base64: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}
