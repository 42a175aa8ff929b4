use std::{env, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::dataset::DataSource;

/// Tunables of the routing pipeline. Defaults are the values the engine is
/// calibrated for; every field can be overridden per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Safety buffer around land, in kilometers.
    pub land_buffer_km: f64,
    /// RDP tolerance in meters.
    pub simplify_tolerance_m: f64,
    /// Legs shorter than this are returned without waypoints.
    pub min_leg_m: f64,
    /// How many rings around a snapped endpoint are searched for water.
    pub max_snap_rings: u32,
    pub window_pad_cells: u32,
    pub min_window_pad_km: f64,
    pub iterations_per_km: f64,
    pub min_search_iterations: usize,
    pub max_search_iterations: usize,
    /// Sideways offset of the open-water midpoint, as a share of leg length.
    pub open_water_offset_ratio: f64,
    pub open_water_max_offset_m: f64,
    pub coordinate_decimals: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            land_buffer_km: 0.2,
            simplify_tolerance_m: 150.0,
            min_leg_m: 50.0,
            max_snap_rings: 6,
            window_pad_cells: 20,
            min_window_pad_km: 3.0,
            iterations_per_km: 1_000.0,
            min_search_iterations: 5_000,
            max_search_iterations: 400_000,
            open_water_offset_ratio: 0.03,
            open_water_max_offset_m: 1_500.0,
            coordinate_decimals: 5,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `LAND_BUFFER_KM`, `SIMPLIFY_TOLERANCE_M` and
    /// `MAX_SNAP_RINGS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            land_buffer_km: env_or("LAND_BUFFER_KM", defaults.land_buffer_km),
            simplify_tolerance_m: env_or("SIMPLIFY_TOLERANCE_M", defaults.simplify_tolerance_m),
            max_snap_rings: env_or("MAX_SNAP_RINGS", defaults.max_snap_rings),
            ..defaults
        }
    }

    /// Expansion budget for a leg of the given length.
    pub fn iteration_cap(&self, distance_km: f64) -> usize {
        let scaled = (distance_km * self.iterations_per_km).max(0.0) as usize;
        scaled.clamp(self.min_search_iterations, self.max_search_iterations)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub land_source: DataSource,
    pub channel_graph: Option<DataSource>,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 8080),
            land_source: env_or("LAND_DATA", DataSource::Bundled),
            channel_graph: env::var("CHANNEL_GRAPH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .and_then(|s| s.parse().ok()),
            cache_capacity: env_or("ROUTE_CACHE_SIZE", 512),
            cache_ttl: Duration::from_secs(env_or("ROUTE_CACHE_TTL_SECS", 3_600)),
            engine: EngineConfig::from_env(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
