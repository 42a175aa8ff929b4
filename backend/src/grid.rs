use std::fmt;

use crate::{
    config::EngineConfig,
    geodesy::{haversine_km, haversine_m, lng_scale, KM_PER_DEG},
    land::LandMask,
    models::{BoundingBox, GeoPoint},
};

/// 8-connected neighbourhood, in the order neighbours are expanded.
pub const NEIGHBOUR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Grid step in kilometers, coarser for longer legs.
pub fn step_km_for(distance_km: f64) -> f64 {
    if distance_km < 30.0 {
        0.4
    } else if distance_km < 80.0 {
        0.8
    } else if distance_km < 200.0 {
        1.6
    } else {
        3.2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub row: i32,
    pub col: i32,
}

impl GridCell {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn offset(self, d_row: i32, d_col: i32) -> Self {
        Self::new(self.row + d_row, self.col + d_col)
    }
}

/// Lattice over the leg's padded bounding box, anchored at its south-west
/// corner. Cells `0..=rows` x `0..=cols` are inside.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchWindow {
    pub bounds: BoundingBox,
    pub step_km: f64,
    pub d_lat: f64,
    pub d_lng: f64,
    rows: i32,
    cols: i32,
}

impl SearchWindow {
    pub fn for_leg(from: GeoPoint, to: GeoPoint, config: &EngineConfig) -> Self {
        let step_km = step_km_for(haversine_km(from, to));
        let mean_lat = (from.lat + to.lat) / 2.0;
        let d_lat = step_km / KM_PER_DEG;
        let d_lng = d_lat / lng_scale(mean_lat);
        let pad_km = (config.window_pad_cells as f64 * step_km).max(config.min_window_pad_km);
        let bounds = BoundingBox::from_route(from, to, pad_km);

        let rows = ((bounds.max_lat - bounds.min_lat) / d_lat).ceil().max(0.0) as i32;
        let cols = ((bounds.max_lng - bounds.min_lng) / d_lng).ceil().max(0.0) as i32;

        Self {
            bounds,
            step_km,
            d_lat,
            d_lng,
            rows,
            cols,
        }
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn contains(&self, cell: GridCell) -> bool {
        (0..=self.rows).contains(&cell.row) && (0..=self.cols).contains(&cell.col)
    }

    pub fn point(&self, cell: GridCell) -> GeoPoint {
        GeoPoint::new(
            self.bounds.min_lat + cell.row as f64 * self.d_lat,
            self.bounds.min_lng + cell.col as f64 * self.d_lng,
        )
    }

    /// Nearest cell, clamped into the window.
    pub fn snap(&self, point: GeoPoint) -> GridCell {
        let row = ((point.lat - self.bounds.min_lat) / self.d_lat).round() as i32;
        let col = ((point.lng - self.bounds.min_lng) / self.d_lng).round() as i32;
        GridCell::new(row.clamp(0, self.rows), col.clamp(0, self.cols))
    }

    pub fn neighbours(&self, cell: GridCell) -> impl Iterator<Item = GridCell> + '_ {
        NEIGHBOUR_OFFSETS
            .iter()
            .map(move |&(dr, dc)| cell.offset(dr, dc))
            .filter(|n| self.contains(*n))
    }

    /// Cells at Chebyshev distance exactly `radius`, inside the window.
    pub fn ring(&self, center: GridCell, radius: i32) -> Vec<GridCell> {
        let mut cells = Vec::with_capacity(8 * radius.max(1) as usize);
        for dr in -radius..=radius {
            for dc in -radius..=radius {
                if dr.abs().max(dc.abs()) != radius {
                    continue;
                }
                let cell = center.offset(dr, dc);
                if self.contains(cell) {
                    cells.push(cell);
                }
            }
        }
        cells
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Goal,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => f.write_str("start"),
            Endpoint::Goal => f.write_str("destination"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("{which} has no reachable navigable water within {rings} grid rings")]
    Unresolved { which: Endpoint, rings: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedEndpoint {
    pub cell: GridCell,
    pub point: GeoPoint,
    /// The original endpoint lies inside the buffered mask.
    pub in_buffer: bool,
    /// The resolved cell differs from the snapped one.
    pub moved: bool,
}

/// Whether a straight approach from a leg endpoint to `target` is acceptable.
///
/// From open water the approach must clear the buffered mask. From inside the
/// buffer (a harbour) it follows [`LandMask::harbour_approach_crosses_land`].
pub fn approach_is_clear(mask: &LandMask, endpoint: GeoPoint, target: GeoPoint, in_buffer: bool) -> bool {
    if in_buffer {
        !mask.harbour_approach_crosses_land(endpoint, target)
    } else {
        !mask.crosses_land(endpoint, target)
    }
}

/// Moves leg endpoints onto navigable grid cells.
pub struct EndpointResolver<'a> {
    mask: &'a LandMask,
    window: &'a SearchWindow,
    max_rings: u32,
}

impl<'a> EndpointResolver<'a> {
    pub fn new(mask: &'a LandMask, window: &'a SearchWindow, max_rings: u32) -> Self {
        Self {
            mask,
            window,
            max_rings,
        }
    }

    pub fn resolve(&self, endpoint: GeoPoint, which: Endpoint) -> Result<ResolvedEndpoint, ResolveError> {
        let in_buffer = self.mask.is_land(endpoint);
        let snapped = self.window.snap(endpoint);
        let resolved = |cell: GridCell| ResolvedEndpoint {
            cell,
            point: self.window.point(cell),
            in_buffer,
            moved: cell != snapped,
        };

        let snapped_point = self.window.point(snapped);
        if !self.mask.is_land(snapped_point)
            && approach_is_clear(self.mask, endpoint, snapped_point, in_buffer)
        {
            return Ok(resolved(snapped));
        }

        for radius in 1..=self.max_rings as i32 {
            let mut candidates: Vec<(f64, GridCell)> = self
                .window
                .ring(snapped, radius)
                .into_iter()
                .filter(|cell| !self.mask.is_land(self.window.point(*cell)))
                .map(|cell| (haversine_m(endpoint, self.window.point(cell)), cell))
                .collect();
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

            let clear = candidates.iter().find(|(_, cell)| {
                approach_is_clear(self.mask, endpoint, self.window.point(*cell), in_buffer)
            });
            if let Some(&(_, cell)) = clear {
                return Ok(resolved(cell));
            }
        }

        Err(ResolveError::Unresolved {
            which,
            rings: self.max_rings,
        })
    }
}
