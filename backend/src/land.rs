use std::{
    collections::HashMap,
    sync::Arc,
};

use geo::{EuclideanDistance, Intersects};
use geo_types::{Coord, Line, Point};
use once_cell::sync::OnceCell;

use crate::{
    dataset::{LandDataError, LandDataset},
    geodesy::{haversine_m, lng_scale, LocalFrame, METERS_PER_DEG},
    models::GeoPoint,
};

/// Size of the buckets the coastline edges are indexed into.
const INDEX_CELL_DEG: f64 = 0.1;

/// Queries spanning more buckets than this scan every edge instead.
const MAX_QUERY_CELLS: usize = 40_000;

/// How far an approach from a harbour inside the buffer may run before it
/// has to clear the buffered mask.
pub const HARBOUR_EXIT_M: f64 = 1_000.0;

static GLOBAL_MASK: OnceCell<Arc<LandMask>> = OnceCell::new();

type CellKey = (i32, i32);

/// Land areas plus a safety buffer, answering "is this water navigable".
///
/// The buffer is an exact disk buffer evaluated lazily: a point is land when
/// it lies inside a polygon or closer than the margin to any coastline edge.
/// Distances are measured in a local equirectangular frame, which is accurate
/// to well under a meter at buffer scale.
#[derive(Debug)]
pub struct LandMask {
    polygon_count: usize,
    /// Every ring edge in (lng, lat) degrees.
    edges: Vec<Line<f64>>,
    /// Polygon each edge belongs to.
    edge_polygon: Vec<u32>,
    edge_cells: HashMap<CellKey, Vec<u32>>,
    /// Occupied bucket columns of each bucket row, ascending.
    row_columns: HashMap<i32, Vec<i32>>,
    buffer_m: f64,
}

impl LandMask {
    pub fn new(dataset: LandDataset, buffer_km: f64) -> Result<Self, LandDataError> {
        if dataset.is_empty() {
            return Err(LandDataError::Empty);
        }

        let mut edges = Vec::new();
        let mut edge_polygon = Vec::new();
        let mut polygon_count = 0;
        for polygon in dataset.into_polygons() {
            let before = edges.len();
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                edges.extend(ring.lines().filter(|line| line.start != line.end));
            }
            if edges.len() > before {
                edge_polygon.resize(edges.len(), polygon_count as u32);
                polygon_count += 1;
            }
        }

        let mut edge_cells: HashMap<CellKey, Vec<u32>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            let (lo, hi) = cell_range(
                edge.start.x.min(edge.end.x),
                edge.start.y.min(edge.end.y),
                edge.start.x.max(edge.end.x),
                edge.start.y.max(edge.end.y),
            );
            for cx in lo.0..=hi.0 {
                for cy in lo.1..=hi.1 {
                    edge_cells.entry((cx, cy)).or_default().push(idx as u32);
                }
            }
        }

        let mut row_columns: HashMap<i32, Vec<i32>> = HashMap::new();
        for &(cx, cy) in edge_cells.keys() {
            row_columns.entry(cy).or_default().push(cx);
        }
        for columns in row_columns.values_mut() {
            columns.sort_unstable();
        }

        let buffer_m = (buffer_km * 1000.0).max(0.0);
        tracing::debug!(
            polygons = polygon_count,
            edges = edges.len(),
            buckets = edge_cells.len(),
            buffer_m,
            "built land mask"
        );

        Ok(Self {
            polygon_count,
            edges,
            edge_polygon,
            edge_cells,
            row_columns,
            buffer_m,
        })
    }

    pub fn bundled(buffer_km: f64) -> Result<Self, LandDataError> {
        Self::new(LandDataset::bundled()?, buffer_km)
    }

    pub fn buffer_m(&self) -> f64 {
        self.buffer_m
    }

    pub fn polygon_count(&self) -> usize {
        self.polygon_count
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True when `point` is inside the buffered land mask.
    pub fn is_land(&self, point: GeoPoint) -> bool {
        self.is_land_within(point, self.buffer_m)
    }

    /// True when the straight segment touches the buffered land mask,
    /// endpoints included.
    pub fn crosses_land(&self, a: GeoPoint, b: GeoPoint) -> bool {
        self.crosses_land_within(a, b, self.buffer_m)
    }

    /// Approach test for an endpoint that already sits inside the buffer.
    ///
    /// The first [`HARBOUR_EXIT_M`] only has to stay off the raw coastline;
    /// the rest of the approach must clear the buffered mask like any other
    /// segment.
    pub fn harbour_approach_crosses_land(&self, harbour: GeoPoint, target: GeoPoint) -> bool {
        let length = haversine_m(harbour, target);
        if length <= HARBOUR_EXIT_M {
            return self.crosses_land_within(harbour, target, 0.0);
        }
        let exit = harbour.interpolate(target, HARBOUR_EXIT_M / length);
        self.crosses_land_within(harbour, exit, 0.0) || self.crosses_land(exit, target)
    }

    /// Point test with an explicit margin; a zero margin tests the raw
    /// coastline.
    pub fn is_land_within(&self, point: GeoPoint, margin_m: f64) -> bool {
        if self.inside_polygon(point) {
            return true;
        }
        if margin_m <= 0.0 {
            return false;
        }

        let frame = LocalFrame::at(point.lat);
        let projected = Point::from(frame.project(point));
        let (dlat, dlng) = margin_deg(margin_m, point.lat.abs());
        self.candidate_edges(
            point.lng - dlng,
            point.lat - dlat,
            point.lng + dlng,
            point.lat + dlat,
        )
        .into_iter()
        .any(|idx| projected.euclidean_distance(&self.project_edge(&frame, idx)) < margin_m)
    }

    /// Segment test with an explicit margin; a zero margin tests the raw
    /// coastline.
    pub fn crosses_land_within(&self, a: GeoPoint, b: GeoPoint, margin_m: f64) -> bool {
        if self.is_land_within(a, margin_m) || self.is_land_within(b, margin_m) {
            return true;
        }

        let frame = LocalFrame::at((a.lat + b.lat) / 2.0);
        let segment = Line::new(frame.project(a), frame.project(b));
        let (dlat, dlng) = margin_deg(margin_m.max(0.0), a.lat.abs().max(b.lat.abs()));
        let candidates = self.candidate_edges(
            a.lng.min(b.lng) - dlng,
            a.lat.min(b.lat) - dlat,
            a.lng.max(b.lng) + dlng,
            a.lat.max(b.lat) + dlat,
        );

        if margin_m <= 0.0 {
            candidates
                .into_iter()
                .any(|idx| segment.intersects(&self.project_edge(&frame, idx)))
        } else {
            candidates
                .into_iter()
                .any(|idx| segment.euclidean_distance(&self.project_edge(&frame, idx)) < margin_m)
        }
    }

    /// Even-odd containment. Points on an edge count as inside; overlapping
    /// polygons are land when any one of them contains the point.
    fn inside_polygon(&self, point: GeoPoint) -> bool {
        let (x, y) = (point.lng, point.lat);
        let here = cell_of(x, y);
        let on_edge = self
            .bucket(here)
            .iter()
            .any(|&idx| self.edges[idx as usize].intersects(&Coord { x, y }));
        if on_edge {
            return true;
        }

        let (ids, eastward) = self.ray_edges(point);
        let mut parity: HashMap<u32, bool> = HashMap::new();
        for idx in ids {
            let Line { start, end } = self.edges[idx as usize];
            if (start.y > y) == (end.y > y) {
                continue;
            }
            let crossing = start.x + (y - start.y) * (end.x - start.x) / (end.y - start.y);
            if (eastward && crossing > x) || (!eastward && crossing < x) {
                *parity.entry(self.edge_polygon[idx as usize]).or_default() ^= true;
            }
        }
        parity.values().any(|&odd| odd)
    }

    /// Edges a horizontal ray from `point` can meet, cast towards whichever
    /// end of the bucket row holds fewer occupied buckets. The flag is true
    /// for an eastward ray.
    fn ray_edges(&self, point: GeoPoint) -> (Vec<u32>, bool) {
        let (cx, cy) = cell_of(point.lng, point.lat);
        let Some(columns) = self.row_columns.get(&cy) else {
            return (Vec::new(), true);
        };
        let east_start = columns.partition_point(|&c| c < cx);
        let west_end = columns.partition_point(|&c| c <= cx);
        let (cells, eastward) = if columns.len() - east_start <= west_end {
            (&columns[east_start..], true)
        } else {
            (&columns[..west_end], false)
        };

        let mut ids: Vec<u32> = cells
            .iter()
            .flat_map(|&c| self.bucket((c, cy)))
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        (ids, eastward)
    }

    fn bucket(&self, cell: CellKey) -> &[u32] {
        self.edge_cells.get(&cell).map(Vec::as_slice).unwrap_or_default()
    }

    fn project_edge(&self, frame: &LocalFrame, idx: u32) -> Line<f64> {
        let edge = self.edges[idx as usize];
        Line::new(frame.project_coord(edge.start), frame.project_coord(edge.end))
    }

    /// Edge ids whose bucket overlaps the query box, sorted and unique.
    fn candidate_edges(&self, min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Vec<u32> {
        let (lo, hi) = cell_range(min_lng, min_lat, max_lng, max_lat);
        let cells = (hi.0 - lo.0 + 1) as usize * (hi.1 - lo.1 + 1) as usize;
        if cells > MAX_QUERY_CELLS {
            return (0..self.edges.len() as u32).collect();
        }

        let mut ids = Vec::new();
        for cx in lo.0..=hi.0 {
            for cy in lo.1..=hi.1 {
                ids.extend_from_slice(self.bucket((cx, cy)));
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

fn cell_of(lng: f64, lat: f64) -> CellKey {
    let cell = |v: f64| (v / INDEX_CELL_DEG).floor() as i32;
    (cell(lng), cell(lat))
}

fn cell_range(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> (CellKey, CellKey) {
    (cell_of(min_lng, min_lat), cell_of(max_lng, max_lat))
}

/// A metric margin expressed in degrees of (lat, lng) at the given latitude.
fn margin_deg(margin_m: f64, abs_lat: f64) -> (f64, f64) {
    let dlat = margin_m / METERS_PER_DEG;
    (dlat, dlat / lng_scale(abs_lat))
}

/// Process-wide mask, built at most once. Later calls return the first mask
/// regardless of `init`.
pub fn global_mask<F>(init: F) -> Result<Arc<LandMask>, LandDataError>
where
    F: FnOnce() -> Result<LandMask, LandDataError>,
{
    GLOBAL_MASK
        .get_or_try_init(|| init().map(Arc::new))
        .cloned()
}
