use std::collections::BTreeSet;

use geo::SimplifyIdx;
use geo_types::LineString;

use crate::{
    geodesy::{haversine_m, LocalFrame},
    land::LandMask,
    models::GeoPoint,
};

/// Chain points closer than this to a leg endpoint are dropped as duplicates.
const DUPLICATE_ENDPOINT_M: f64 = 1.0;

/// A leg drawn as `from -> ... -> to`, plus the vertices simplification must
/// keep.
#[derive(Debug, Clone, PartialEq)]
pub struct LegPolyline {
    pub points: Vec<GeoPoint>,
    pinned: BTreeSet<usize>,
    /// The first segment leaves a harbour endpoint (inside the buffered
    /// mask) and is validated as a harbour approach.
    pub harbour_start: bool,
    /// Same for the last segment.
    pub harbour_end: bool,
}

impl LegPolyline {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self {
            points,
            pinned: BTreeSet::new(),
            harbour_start: false,
            harbour_end: false,
        }
    }

    /// `from + chain + to`. For a harbour endpoint the adjoining chain point
    /// is pinned so the approach segment stays short.
    pub fn assemble(
        from: GeoPoint,
        chain: &[GeoPoint],
        to: GeoPoint,
        harbour_start: bool,
        harbour_end: bool,
    ) -> Self {
        let mut chain = chain;
        if !harbour_start {
            if let Some((first, rest)) = chain.split_first() {
                if haversine_m(*first, from) < DUPLICATE_ENDPOINT_M {
                    chain = rest;
                }
            }
        }
        if !harbour_end {
            if let Some((last, rest)) = chain.split_last() {
                if haversine_m(*last, to) < DUPLICATE_ENDPOINT_M {
                    chain = rest;
                }
            }
        }

        let mut points = Vec::with_capacity(chain.len() + 2);
        points.push(from);
        points.extend_from_slice(chain);
        points.push(to);

        let mut pinned = BTreeSet::new();
        let harbour_start = harbour_start && !chain.is_empty();
        let harbour_end = harbour_end && !chain.is_empty();
        if harbour_start {
            pinned.insert(1);
        }
        if harbour_end {
            pinned.insert(points.len() - 2);
        }

        Self {
            points,
            pinned,
            harbour_start,
            harbour_end,
        }
    }

    /// Vertices strictly between the leg endpoints.
    pub fn interior(&self) -> &[GeoPoint] {
        match self.points.len() {
            0..=2 => &[],
            n => &self.points[1..n - 1],
        }
    }

    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Index of the first segment touching the buffered mask. Harbour
    /// approaches are held to [`LandMask::harbour_approach_crosses_land`]
    /// instead.
    pub fn first_unsafe_segment(&self, mask: &LandMask) -> Option<usize> {
        let last = self.segment_count().saturating_sub(1);
        self.points
            .windows(2)
            .enumerate()
            .find(|(i, pair)| {
                if self.harbour_start && *i == 0 {
                    mask.harbour_approach_crosses_land(pair[0], pair[1])
                } else if self.harbour_end && *i == last {
                    mask.harbour_approach_crosses_land(pair[1], pair[0])
                } else {
                    mask.crosses_land(pair[0], pair[1])
                }
            })
            .map(|(i, _)| i)
    }

    /// Same polyline with interior vertices rounded; the leg endpoints are
    /// the caller's and stay exact.
    pub fn with_rounded_interior(&self, decimals: u32) -> Self {
        let last = self.points.len().saturating_sub(1);
        Self {
            points: self
                .points
                .iter()
                .enumerate()
                .map(|(i, p)| if i == 0 || i == last { *p } else { p.rounded(decimals) })
                .collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Simplified {
    pub polyline: LegPolyline,
    /// False when the raw polyline was kept because a shortcut was unsafe.
    pub simplified: bool,
}

/// Ramer–Douglas–Peucker with an all-or-nothing safety check against the
/// land mask.
pub struct PathSimplifier<'a> {
    mask: &'a LandMask,
    tolerance_m: f64,
}

impl<'a> PathSimplifier<'a> {
    pub fn new(mask: &'a LandMask, tolerance_m: f64) -> Self {
        Self { mask, tolerance_m }
    }

    pub fn simplify(&self, raw: &LegPolyline) -> Simplified {
        let n = raw.points.len();
        if n <= 2 {
            return Simplified {
                polyline: raw.clone(),
                simplified: false,
            };
        }

        let frame = LocalFrame::around(&raw.points);
        let mut anchors: Vec<usize> = raw.pinned.iter().copied().filter(|&i| i < n).collect();
        anchors.push(0);
        anchors.push(n - 1);
        anchors.sort_unstable();
        anchors.dedup();

        let mut keep = Vec::with_capacity(n);
        for pair in anchors.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            let run: LineString<f64> = raw.points[lo..=hi]
                .iter()
                .map(|p| frame.project(*p))
                .collect();
            let kept = run.simplify_idx(&self.tolerance_m);
            keep.extend(kept[..kept.len() - 1].iter().map(|i| lo + i));
        }
        keep.push(n - 1);

        let candidate = LegPolyline {
            points: keep.iter().map(|&i| raw.points[i]).collect(),
            pinned: BTreeSet::new(),
            harbour_start: raw.harbour_start,
            harbour_end: raw.harbour_end,
        };

        if let Some(segment) = candidate.first_unsafe_segment(self.mask) {
            tracing::debug!(
                segment,
                raw_points = n,
                "simplified path clips land, keeping raw path"
            );
            return Simplified {
                polyline: raw.clone(),
                simplified: false,
            };
        }

        Simplified {
            polyline: candidate,
            simplified: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LandDataset;
    use serde_json::json;

    /// A peninsula ~160 m wide running north to 43.05.
    fn thin_peninsula() -> LandMask {
        let doc = json!({"type": "Polygon", "coordinates": [
            [[16.000, 42.90], [16.002, 42.90], [16.002, 43.05], [16.000, 43.05], [16.000, 42.90]]
        ]});
        LandMask::new(LandDataset::from_geojson_str(&doc.to_string()).unwrap(), 0.0).unwrap()
    }

    #[test]
    fn unsafe_shortcut_keeps_the_raw_path() {
        let mask = thin_peninsula();
        let raw = LegPolyline::new(vec![
            GeoPoint::new(43.020, 15.995),
            GeoPoint::new(43.051, 15.998),
            GeoPoint::new(43.051, 16.004),
            GeoPoint::new(43.020, 16.007),
        ]);
        assert_eq!(raw.first_unsafe_segment(&mask), None);

        let result = PathSimplifier::new(&mask, 5_000.0).simplify(&raw);
        assert!(!result.simplified);
        assert_eq!(result.polyline, raw);
    }

    #[test]
    fn open_water_wobble_collapses() {
        let mask = LandMask::bundled(0.2).unwrap();
        let from = GeoPoint::new(43.00, 15.50);
        let to = GeoPoint::new(43.20, 15.70);
        let points: Vec<_> = (0..=10)
            .map(|i| {
                let p = from.interpolate(to, i as f64 / 10.0);
                let wobble = if i % 2 == 0 { 0.0003 } else { -0.0003 };
                match i {
                    0 => from,
                    10 => to,
                    _ => GeoPoint::new(p.lat + wobble, p.lng),
                }
            })
            .collect();

        let result = PathSimplifier::new(&mask, 150.0).simplify(&LegPolyline::new(points));
        assert!(result.simplified);
        assert_eq!(result.polyline.points, vec![from, to]);
        assert!(result.polyline.interior().is_empty());
    }

    #[test]
    fn harbour_approach_is_pinned() {
        let mask = LandMask::bundled(0.2).unwrap();
        let from = GeoPoint::new(43.00, 15.50);
        let to = GeoPoint::new(43.20, 15.70);
        let chain: Vec<_> = (1..10).map(|i| from.interpolate(to, i as f64 / 10.0)).collect();

        let raw = LegPolyline::assemble(from, &chain, to, true, false);
        assert!(raw.harbour_start && !raw.harbour_end);

        let result = PathSimplifier::new(&mask, 150.0).simplify(&raw);
        assert!(result.simplified);
        assert_eq!(result.polyline.points, vec![from, chain[0], to]);
    }

    #[test]
    fn assemble_drops_duplicate_endpoints() {
        let from = GeoPoint::new(43.0, 15.5);
        let to = GeoPoint::new(43.1, 15.6);
        let mid = GeoPoint::new(43.05, 15.52);
        let polyline = LegPolyline::assemble(from, &[from, mid, to], to, false, false);
        assert_eq!(polyline.points, vec![from, mid, to]);
        assert_eq!(polyline.interior(), &[mid]);
    }

    #[test]
    fn harbour_approaches_only_need_to_clear_the_raw_coast_nearby() {
        let mask = LandMask::bundled(0.2).unwrap();
        // Split harbour sits inside the buffer; its approach cannot clear it.
        let split = GeoPoint::new(43.5081, 16.4402);
        let offing = GeoPoint::new(43.497, 16.44);
        let further = GeoPoint::new(43.45, 16.395);

        let strict = LegPolyline::new(vec![split, offing, further]);
        assert_eq!(strict.first_unsafe_segment(&mask), Some(0));

        let harbour = LegPolyline::assemble(split, &[offing], further, true, false);
        assert_eq!(harbour.first_unsafe_segment(&mask), None);

        let arriving = LegPolyline::assemble(further, &[offing], split, false, true);
        assert_eq!(arriving.first_unsafe_segment(&mask), None);
    }

    #[test]
    fn long_harbour_approaches_must_leave_the_buffer() {
        // Land south of 43.0; the approach hugs the coast 280 m off it.
        let doc = json!({"type": "Polygon", "coordinates": [
            [[15.5, 42.5], [16.5, 42.5], [16.5, 43.0], [15.5, 43.0], [15.5, 42.5]]
        ]});
        let mask = LandMask::new(LandDataset::from_geojson_str(&doc.to_string()).unwrap(), 0.2).unwrap();
        let harbour = GeoPoint::new(43.001, 16.0);
        let along = GeoPoint::new(43.0025, 16.2);
        let offshore = GeoPoint::new(43.1, 16.3);

        let hugging = LegPolyline::assemble(harbour, &[along], offshore, true, false);
        assert_eq!(hugging.first_unsafe_segment(&mask), Some(0));

        let arriving = LegPolyline::assemble(offshore, &[along], harbour, false, true);
        assert_eq!(arriving.first_unsafe_segment(&mask), Some(1));
    }
}
