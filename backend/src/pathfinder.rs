use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Arc,
    },
};

use crate::{
    config::EngineConfig,
    geodesy::{haversine_km, haversine_m},
    grid::{Endpoint, EndpointResolver, GridCell, ResolveError, SearchWindow},
    land::LandMask,
    models::GeoPoint,
};

/// Queue entries whose cost exceeds the best known cost by more than this
/// are stale.
const STALE_TOLERANCE: f64 = 1e-9;

/// Strategy that finds a land-free chain of points between two leg endpoints
/// (Dependency Inversion: the orchestrator only sees this trait).
///
/// # Contract
/// - The chain runs from a water point near `from` to a water point near
///   `to`; the leg endpoints themselves are not included.
/// - Every segment between consecutive chain points clears the buffered mask.
/// - `cancel` is honoured promptly; a cancelled search returns
///   `SearchFailure::Cancelled`.
pub trait PathFinder: Send + Sync {
    /// Short label used in logs and waypoint notes.
    fn name(&self) -> &'static str;

    fn find_path(
        &self,
        mask: &LandMask,
        from: GeoPoint,
        to: GeoPoint,
        cancel: &CancelFlag,
    ) -> Result<RawRoute, SearchFailure>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRoute {
    pub chain: Vec<GeoPoint>,
    /// Cells or graph nodes expanded to find the chain.
    pub expansions: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchFailure {
    #[error(transparent)]
    Unresolved(#[from] ResolveError),
    #[error("search gave up after {limit} expansions")]
    IterationCap { limit: usize },
    #[error("no navigable path inside the search window ({visited} cells explored)")]
    NoPath { visited: usize },
    #[error("endpoints cannot be connected to the channel network")]
    NotConnected,
    #[error("routing was cancelled")]
    Cancelled,
}

/// Cooperative cancellation shared between a request and its routing work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }

    /// Raises the flag when the returned guard is dropped.
    pub fn guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

pub struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Ties on f are broken by g, then by cell, so the search is reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    f_score: FloatOrd,
    g_score: FloatOrd,
    cell: GridCell,
}

/// A* over the leg's search window.
#[derive(Debug, Clone, Default)]
pub struct GridPathFinder {
    config: EngineConfig,
}

impl GridPathFinder {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// A* from `start` to `goal`. Edges must land on water and clear the
    /// buffered mask. Cost and heuristic are great-circle meters.
    pub fn search(
        &self,
        mask: &LandMask,
        window: &SearchWindow,
        start: GridCell,
        goal: GridCell,
        limit: usize,
        cancel: &CancelFlag,
    ) -> Result<RawRoute, SearchFailure> {
        let goal_point = window.point(goal);
        let heuristic = |cell: GridCell| haversine_m(window.point(cell), goal_point);

        let mut land_cache: HashMap<GridCell, bool> = HashMap::new();
        let mut g_scores: HashMap<GridCell, f64> = HashMap::new();
        let mut came_from: HashMap<GridCell, GridCell> = HashMap::new();
        let mut closed: HashSet<GridCell> = HashSet::new();
        let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();

        g_scores.insert(start, 0.0);
        open_set.push(Reverse(OpenNode {
            f_score: FloatOrd(heuristic(start)),
            g_score: FloatOrd(0.0),
            cell: start,
        }));

        let mut expansions = 0usize;
        while let Some(Reverse(current)) = open_set.pop() {
            let cell = current.cell;
            if closed.contains(&cell) {
                continue;
            }
            let best = g_scores.get(&cell).copied().unwrap_or(f64::INFINITY);
            if current.g_score.0 > best + STALE_TOLERANCE {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(SearchFailure::Cancelled);
            }

            expansions += 1;
            if expansions > limit {
                tracing::debug!(limit, "grid search hit its expansion cap");
                return Err(SearchFailure::IterationCap { limit });
            }

            if cell == goal {
                let chain = reconstruct_path(&came_from, goal)
                    .into_iter()
                    .map(|c| window.point(c))
                    .collect();
                return Ok(RawRoute { chain, expansions });
            }
            closed.insert(cell);

            let here = window.point(cell);
            for neighbour in window.neighbours(cell) {
                if closed.contains(&neighbour) {
                    continue;
                }
                let on_land = *land_cache
                    .entry(neighbour)
                    .or_insert_with(|| mask.is_land(window.point(neighbour)));
                if on_land {
                    continue;
                }
                let there = window.point(neighbour);
                if mask.crosses_land(here, there) {
                    continue;
                }

                let tentative = current.g_score.0 + haversine_m(here, there);
                let known = g_scores.get(&neighbour).copied().unwrap_or(f64::INFINITY);
                if tentative < known - STALE_TOLERANCE {
                    g_scores.insert(neighbour, tentative);
                    came_from.insert(neighbour, cell);
                    open_set.push(Reverse(OpenNode {
                        f_score: FloatOrd(tentative + heuristic(neighbour)),
                        g_score: FloatOrd(tentative),
                        cell: neighbour,
                    }));
                }
            }
        }

        Err(SearchFailure::NoPath {
            visited: expansions,
        })
    }
}

impl PathFinder for GridPathFinder {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn find_path(
        &self,
        mask: &LandMask,
        from: GeoPoint,
        to: GeoPoint,
        cancel: &CancelFlag,
    ) -> Result<RawRoute, SearchFailure> {
        let window = SearchWindow::for_leg(from, to, &self.config);
        let resolver = EndpointResolver::new(mask, &window, self.config.max_snap_rings);
        let start = resolver.resolve(from, Endpoint::Start)?;
        let goal = resolver.resolve(to, Endpoint::Goal)?;
        let limit = self.config.iteration_cap(haversine_km(from, to));

        tracing::debug!(
            step_km = window.step_km,
            rows = window.rows(),
            cols = window.cols(),
            limit,
            start_moved = start.moved,
            goal_moved = goal.moved,
            "grid search"
        );

        self.search(mask, &window, start.cell, goal.cell, limit, cancel)
    }
}

fn reconstruct_path(came_from: &HashMap<GridCell, GridCell>, goal: GridCell) -> Vec<GridCell> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&previous) = came_from.get(&current) {
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}
