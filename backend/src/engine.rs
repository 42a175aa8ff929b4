use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use rayon::prelude::*;

use crate::{
    cache::{CachedRoute, LegKey, RouteCache},
    config::EngineConfig,
    geodesy::{haversine_m, meters_to_nm, offset_midpoint, path_length_m},
    land::LandMask,
    models::{GeoPoint, Leg, LegInputError, LegRequest, LegResult, VesselProfile, Waypoint},
    pathfinder::{CancelFlag, GridPathFinder, PathFinder, SearchFailure},
    simplify::{LegPolyline, PathSimplifier},
};

const OPEN_WATER_NOTE: &str = "open water";
const GRID_NOTE: &str = "safe route";
const CHANNEL_NOTE: &str = "charted channel";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LegFailure {
    #[error(transparent)]
    Input(#[from] LegInputError),
    #[error(transparent)]
    Search(#[from] SearchFailure),
    #[error("rounded route touches land on segment {0}")]
    UnsafeOutput(usize),
    #[error("internal routing error: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Degenerate,
    OpenWater,
    Searched(&'static str),
    Cached,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Degenerate => f.write_str("degenerate"),
            Strategy::OpenWater => f.write_str("open-water"),
            Strategy::Searched(name) => f.write_str(name),
            Strategy::Cached => f.write_str("cached"),
        }
    }
}

/// A leg that was routed successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedLeg {
    /// Interior waypoints only, rounded for output.
    pub waypoints: Vec<Waypoint>,
    /// Length of `from -> waypoints -> to` in meters.
    pub length_m: f64,
    pub strategy: Strategy,
}

/// Turns itinerary legs into land-avoiding waypoint lists.
///
/// Each leg is independent: it is validated, tried as a straight open-water
/// crossing, and otherwise searched on a grid (then through the channel graph
/// when one is configured). A failing leg never affects its neighbours.
pub struct SafeRouteEngine {
    mask: Arc<LandMask>,
    config: EngineConfig,
    grid: GridPathFinder,
    fallback: Option<Arc<dyn PathFinder>>,
    cache: Option<Arc<RouteCache>>,
}

impl SafeRouteEngine {
    pub fn new(mask: Arc<LandMask>, config: EngineConfig) -> Self {
        Self {
            grid: GridPathFinder::new(config.clone()),
            mask,
            config,
            fallback: None,
            cache: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn PathFinder>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_cache(mut self, cache: Arc<RouteCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn mask(&self) -> &LandMask {
        &self.mask
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Routes every leg in parallel. The output has one entry per input leg,
    /// in input order.
    pub fn route_legs(
        &self,
        legs: &[LegRequest],
        vessel: &VesselProfile,
        cancel: &CancelFlag,
    ) -> Vec<LegResult> {
        tracing::debug!(
            legs = legs.len(),
            draft_m = vessel.draft_m,
            hull = ?vessel.hull,
            "routing itinerary (draft is recorded, not enforced)"
        );
        legs.par_iter()
            .map(|leg| self.route_leg(leg, vessel, cancel))
            .collect()
    }

    /// Routes one leg. Never panics and never fails the caller: problems are
    /// reported through `failed` and `error`.
    pub fn route_leg(&self, req: &LegRequest, vessel: &VesselProfile, cancel: &CancelFlag) -> LegResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.plan(req, cancel)))
            .unwrap_or_else(|payload| Err(LegFailure::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(routed) => {
                tracing::info!(
                    day = %req.day,
                    from = %req.from,
                    to = %req.to,
                    strategy = %routed.strategy,
                    waypoints = routed.waypoints.len(),
                    "leg routed"
                );
                let distance_nm = round_to(meters_to_nm(routed.length_m), 2);
                let estimated_hours = vessel
                    .cruise_speed_kn
                    .filter(|speed| *speed > 0.0)
                    .map(|speed| round_to(distance_nm / speed, 1));
                LegResult {
                    day: req.day.clone(),
                    from: req.from.clone(),
                    to: req.to.clone(),
                    waypoints: routed.waypoints,
                    failed: false,
                    distance_nm: Some(distance_nm),
                    estimated_hours,
                    error: None,
                }
            }
            Err(failure) => {
                tracing::warn!(
                    day = %req.day,
                    from = %req.from,
                    to = %req.to,
                    error = %failure,
                    "leg failed"
                );
                LegResult {
                    day: req.day.clone(),
                    from: req.from.clone(),
                    to: req.to.clone(),
                    waypoints: Vec::new(),
                    failed: true,
                    distance_nm: None,
                    estimated_hours: None,
                    error: Some(failure.to_string()),
                }
            }
        }
    }

    /// Routes a validated leg without the panic boundary.
    pub fn plan(&self, req: &LegRequest, cancel: &CancelFlag) -> Result<RoutedLeg, LegFailure> {
        let Leg { from, to } = Leg::from_request(req)?;
        if cancel.is_cancelled() {
            return Err(SearchFailure::Cancelled.into());
        }

        let direct_m = haversine_m(from, to);
        if direct_m < self.config.min_leg_m {
            return Ok(RoutedLeg {
                waypoints: Vec::new(),
                length_m: direct_m,
                strategy: Strategy::Degenerate,
            });
        }

        let key = LegKey::new(from, to);
        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&key)) {
            return Ok(RoutedLeg {
                waypoints: hit.waypoints,
                length_m: hit.length_m,
                strategy: Strategy::Cached,
            });
        }

        let harbour_start = self.mask.is_land(from);
        let harbour_end = self.mask.is_land(to);
        let routed = if !harbour_start && !harbour_end && !self.mask.crosses_land(from, to) {
            self.open_water(from, to)
        } else {
            self.search(from, to, harbour_start, harbour_end, cancel)?
        };

        if let Some(cache) = &self.cache {
            cache.insert(
                key,
                CachedRoute {
                    waypoints: routed.waypoints.clone(),
                    length_m: routed.length_m,
                },
            );
        }
        Ok(routed)
    }

    /// Direct crossing, optionally bent by a small sideways midpoint when
    /// that midpoint keeps both halves clear.
    fn open_water(&self, from: GeoPoint, to: GeoPoint) -> RoutedLeg {
        let midpoint = offset_midpoint(
            from,
            to,
            self.config.open_water_offset_ratio,
            self.config.open_water_max_offset_m,
        )
        .rounded(self.config.coordinate_decimals);

        if !self.mask.crosses_land(from, midpoint) && !self.mask.crosses_land(midpoint, to) {
            RoutedLeg {
                waypoints: vec![midpoint.to_waypoint(Some(OPEN_WATER_NOTE))],
                length_m: path_length_m(&[from, midpoint, to]),
                strategy: Strategy::OpenWater,
            }
        } else {
            RoutedLeg {
                waypoints: Vec::new(),
                length_m: haversine_m(from, to),
                strategy: Strategy::OpenWater,
            }
        }
    }

    fn search(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        harbour_start: bool,
        harbour_end: bool,
        cancel: &CancelFlag,
    ) -> Result<RoutedLeg, LegFailure> {
        let finders = std::iter::once(&self.grid as &dyn PathFinder).chain(self.fallback.as_deref());

        let mut first_failure = None;
        for finder in finders {
            let outcome = finder
                .find_path(&self.mask, from, to, cancel)
                .map_err(LegFailure::from)
                .and_then(|raw| {
                    tracing::debug!(
                        strategy = finder.name(),
                        chain = raw.chain.len(),
                        expansions = raw.expansions,
                        "raw path found"
                    );
                    self.finish(from, to, &raw.chain, harbour_start, harbour_end, finder.name())
                });

            match outcome {
                Ok(routed) => return Ok(routed),
                Err(LegFailure::Search(SearchFailure::Cancelled)) => {
                    return Err(SearchFailure::Cancelled.into());
                }
                Err(failure) => {
                    tracing::debug!(strategy = finder.name(), error = %failure, "strategy failed");
                    first_failure.get_or_insert(failure);
                }
            }
        }

        Err(first_failure.unwrap_or(LegFailure::Search(SearchFailure::NotConnected)))
    }

    /// Assembles, simplifies, rounds and re-validates a raw chain.
    fn finish(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        chain: &[GeoPoint],
        harbour_start: bool,
        harbour_end: bool,
        strategy: &'static str,
    ) -> Result<RoutedLeg, LegFailure> {
        let raw = LegPolyline::assemble(from, chain, to, harbour_start, harbour_end);
        let simplified =
            PathSimplifier::new(&self.mask, self.config.simplify_tolerance_m).simplify(&raw);
        let output = simplified
            .polyline
            .with_rounded_interior(self.config.coordinate_decimals);

        if let Some(segment) = output.first_unsafe_segment(&self.mask) {
            return Err(LegFailure::UnsafeOutput(segment));
        }

        let note = if strategy == "grid" { GRID_NOTE } else { CHANNEL_NOTE };
        let waypoints = output
            .interior()
            .iter()
            .enumerate()
            .map(|(i, p)| p.to_waypoint((i == 0).then_some(note)))
            .collect();

        Ok(RoutedLeg {
            waypoints,
            length_m: path_length_m(&output.points),
            strategy: Strategy::Searched(strategy),
        })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "leg routing panicked".to_owned())
}
