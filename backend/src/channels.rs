use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{self, Read},
    path::Path,
};

use kdtree::distance::squared_euclidean;
use kdtree::KdTree;
use petgraph::{
    algo::astar,
    graph::{NodeIndex, UnGraph},
};
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{DataSource, SourceError},
    geodesy::{haversine_km, haversine_m, lng_scale},
    grid::approach_is_clear,
    land::LandMask,
    models::GeoPoint,
    pathfinder::{CancelFlag, PathFinder, RawRoute, SearchFailure},
};

/// Charted passages between the bundled islands.
pub const BUNDLED_CHANNELS: &str = include_str!("../data/central_dalmatia_channels.json");

/// Endpoints farther than this from every node are not connected.
const MAX_CONNECT_KM: f64 = 25.0;

/// Nearest nodes tried when looking for a clear approach.
const CONNECT_CANDIDATES: usize = 8;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelGraphFile {
    pub nodes: Vec<ChannelNodeRecord>,
    pub edges: Vec<ChannelEdgeRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelNodeRecord {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelEdgeRecord {
    pub from: u64,
    pub to: u64,
}

impl ChannelGraphFile {
    pub async fn load(source: &DataSource) -> Result<Self, ChannelGraphError> {
        let bytes = source.fetch(BUNDLED_CHANNELS).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelGraphError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to read channel graph: {0}")]
    Io(#[from] io::Error),
    #[error("invalid channel graph: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("channel graph has no navigable nodes")]
    EmptyGraph,
    #[error("edge references unknown node {0}")]
    MissingNode(u64),
}

#[derive(Clone, Debug)]
struct ChannelNode {
    name: String,
    point: GeoPoint,
}

/// Hand-curated network of safe passages, used when the grid search fails.
///
/// Nodes on land and edges touching the buffered mask are dropped at load, so
/// every edge that survives is a valid route segment.
#[derive(Clone)]
pub struct ChannelGraph {
    graph: UnGraph<ChannelNode, f64>,
    spatial_index: KdTree<f64, usize, [f64; 2]>,
    /// cos(lat) applied to longitudes in the spatial index.
    index_scale: f64,
}

impl ChannelGraph {
    pub fn bundled(mask: &LandMask) -> Result<Self, ChannelGraphError> {
        Self::from_reader(BUNDLED_CHANNELS.as_bytes(), mask)
    }

    pub fn from_file(path: impl AsRef<Path>, mask: &LandMask) -> Result<Self, ChannelGraphError> {
        let file = File::open(path)?;
        Self::from_reader(file, mask)
    }

    pub fn from_reader(reader: impl Read, mask: &LandMask) -> Result<Self, ChannelGraphError> {
        let graph_file: ChannelGraphFile = serde_json::from_reader(reader)?;
        Self::from_graph_file(graph_file, mask)
    }

    pub fn from_graph_file(
        graph_file: ChannelGraphFile,
        mask: &LandMask,
    ) -> Result<Self, ChannelGraphError> {
        if graph_file.nodes.is_empty() {
            return Err(ChannelGraphError::EmptyGraph);
        }

        let known_ids: HashSet<u64> = graph_file.nodes.iter().map(|n| n.id).collect();
        let mut graph = UnGraph::new_undirected();
        let mut id_to_index = HashMap::new();

        for node in graph_file.nodes {
            let point = GeoPoint::new(node.lat, node.lng);
            if !point.is_finite() || mask.is_land(point) {
                tracing::warn!(id = node.id, name = %node.name, "dropping channel node on land");
                continue;
            }
            let idx = graph.add_node(ChannelNode {
                name: node.name,
                point,
            });
            id_to_index.insert(node.id, idx);
        }

        let mut dropped_edges = 0usize;
        for edge in graph_file.edges {
            for id in [edge.from, edge.to] {
                if !known_ids.contains(&id) {
                    return Err(ChannelGraphError::MissingNode(id));
                }
            }
            let (Some(&from), Some(&to)) = (id_to_index.get(&edge.from), id_to_index.get(&edge.to))
            else {
                dropped_edges += 1;
                continue;
            };

            let (a, b) = (graph[from].point, graph[to].point);
            if mask.crosses_land(a, b) {
                tracing::warn!(
                    from = %graph[from].name,
                    to = %graph[to].name,
                    "dropping channel edge that touches land"
                );
                dropped_edges += 1;
                continue;
            }
            graph.update_edge(from, to, haversine_m(a, b));
        }

        if graph.node_count() == 0 {
            return Err(ChannelGraphError::EmptyGraph);
        }

        let mean_lat = graph.node_weights().map(|n| n.point.lat).sum::<f64>()
            / graph.node_count() as f64;
        let index_scale = lng_scale(mean_lat);
        let spatial_index = Self::build_spatial_index(&graph, index_scale);

        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dropped_edges,
            "loaded channel graph"
        );

        Ok(Self {
            graph,
            spatial_index,
            index_scale,
        })
    }

    fn build_spatial_index(
        graph: &UnGraph<ChannelNode, f64>,
        index_scale: f64,
    ) -> KdTree<f64, usize, [f64; 2]> {
        let mut tree = KdTree::new(2);
        for idx in graph.node_indices() {
            let point = graph[idx].point;
            let _ = tree.add([point.lng * index_scale, point.lat], idx.index());
        }
        tree
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nearest node reachable from `endpoint` by a clear straight approach.
    fn connect(&self, mask: &LandMask, endpoint: GeoPoint) -> Option<NodeIndex> {
        let in_buffer = mask.is_land(endpoint);
        let query = [endpoint.lng * self.index_scale, endpoint.lat];
        let nearest = self
            .spatial_index
            .nearest(&query, CONNECT_CANDIDATES, &squared_euclidean)
            .ok()?;

        let mut candidates: Vec<(f64, NodeIndex)> = nearest
            .into_iter()
            .map(|(_, &idx)| {
                let node = NodeIndex::new(idx);
                (haversine_km(endpoint, self.graph[node].point), node)
            })
            .filter(|(distance_km, _)| *distance_km <= MAX_CONNECT_KM)
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        candidates
            .into_iter()
            .map(|(_, node)| node)
            .find(|&node| approach_is_clear(mask, endpoint, self.graph[node].point, in_buffer))
    }
}

impl PathFinder for ChannelGraph {
    fn name(&self) -> &'static str {
        "channels"
    }

    fn find_path(
        &self,
        mask: &LandMask,
        from: GeoPoint,
        to: GeoPoint,
        cancel: &CancelFlag,
    ) -> Result<RawRoute, SearchFailure> {
        if cancel.is_cancelled() {
            return Err(SearchFailure::Cancelled);
        }
        let entry = self.connect(mask, from).ok_or(SearchFailure::NotConnected)?;
        let exit = self.connect(mask, to).ok_or(SearchFailure::NotConnected)?;
        let goal = self.graph[exit].point;

        tracing::debug!(
            entry = %self.graph[entry].name,
            exit = %self.graph[exit].name,
            "routing through channel graph"
        );

        let (_cost, nodes) = astar(
            &self.graph,
            entry,
            |node| node == exit,
            |edge| *edge.weight(),
            |node| haversine_m(self.graph[node].point, goal),
        )
        .ok_or(SearchFailure::NotConnected)?;

        Ok(RawRoute {
            expansions: nodes.len(),
            chain: nodes.iter().map(|&n| self.graph[n].point).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LandDataset;
    use serde_json::json;

    fn bundled_mask() -> LandMask {
        LandMask::bundled(0.2).unwrap()
    }

    fn island_mask() -> LandMask {
        let doc = json!({"type": "Polygon", "coordinates": [
            [[16.00, 43.00], [16.05, 43.00], [16.05, 43.03], [16.00, 43.03], [16.00, 43.00]]
        ]});
        LandMask::new(LandDataset::from_geojson_str(&doc.to_string()).unwrap(), 0.2).unwrap()
    }

    fn node(id: u64, lat: f64, lng: f64) -> ChannelNodeRecord {
        ChannelNodeRecord {
            id,
            name: format!("n{id}"),
            lat,
            lng,
        }
    }

    #[test]
    fn bundled_graph_is_fully_navigable() {
        let graph = ChannelGraph::bundled(&bundled_mask()).expect("bundled channels");
        assert_eq!(graph.node_count(), 19);
        assert_eq!(graph.edge_count(), 21);
    }

    #[test]
    fn land_nodes_and_crossing_edges_are_dropped() {
        let file = ChannelGraphFile {
            nodes: vec![
                node(1, 43.015, 15.97),
                node(2, 43.015, 16.08),
                node(3, 43.015, 16.02),
                node(4, 43.06, 16.02),
            ],
            edges: vec![
                ChannelEdgeRecord { from: 1, to: 2 },
                ChannelEdgeRecord { from: 1, to: 3 },
                ChannelEdgeRecord { from: 1, to: 4 },
                ChannelEdgeRecord { from: 4, to: 2 },
            ],
        };
        let graph = ChannelGraph::from_graph_file(file, &island_mask()).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn unknown_node_ids_are_rejected() {
        let file = ChannelGraphFile {
            nodes: vec![node(1, 43.015, 15.97)],
            edges: vec![ChannelEdgeRecord { from: 1, to: 9 }],
        };
        assert!(matches!(
            ChannelGraph::from_graph_file(file, &island_mask()),
            Err(ChannelGraphError::MissingNode(9))
        ));
    }

    #[test]
    fn graph_of_only_land_nodes_is_empty() {
        let file = ChannelGraphFile {
            nodes: vec![node(1, 43.015, 16.02)],
            edges: vec![],
        };
        assert!(matches!(
            ChannelGraph::from_graph_file(file, &island_mask()),
            Err(ChannelGraphError::EmptyGraph)
        ));
    }

    #[test]
    fn routes_split_to_milna_through_the_channels() {
        let mask = bundled_mask();
        let graph = ChannelGraph::bundled(&mask).unwrap();
        let split = GeoPoint::new(43.5081, 16.4402);
        let milna = GeoPoint::new(43.3244, 16.4522);

        let route = graph.find_path(&mask, split, milna, &CancelFlag::new()).unwrap();
        assert_eq!(route.chain.first(), Some(&GeoPoint::new(43.497, 16.44)));
        assert_eq!(route.chain.last(), Some(&GeoPoint::new(43.326, 16.392)));
        for pair in route.chain.windows(2) {
            assert!(!mask.crosses_land(pair[0], pair[1]));
        }
    }

    #[test]
    fn harbour_approaches_hugging_the_coast_are_not_connected() {
        let doc = json!({"type": "Polygon", "coordinates": [
            [[15.5, 42.5], [16.5, 42.5], [16.5, 43.0], [15.5, 43.0], [15.5, 42.5]]
        ]});
        let mask = LandMask::new(LandDataset::from_geojson_str(&doc.to_string()).unwrap(), 0.2).unwrap();
        let file = ChannelGraphFile {
            nodes: vec![node(1, 43.0025, 16.2)],
            edges: vec![],
        };
        let graph = ChannelGraph::from_graph_file(file, &mask).unwrap();
        let goal = GeoPoint::new(43.0025, 16.25);

        let distant_harbour = GeoPoint::new(43.001, 16.0);
        assert!(mask.is_land(distant_harbour));
        assert_eq!(
            graph.find_path(&mask, distant_harbour, goal, &CancelFlag::new()),
            Err(SearchFailure::NotConnected)
        );

        let nearby_harbour = GeoPoint::new(43.001, 16.2);
        let route = graph.find_path(&mask, nearby_harbour, goal, &CancelFlag::new()).unwrap();
        assert_eq!(route.chain, vec![GeoPoint::new(43.0025, 16.2)]);
    }

    #[test]
    fn far_endpoints_are_not_connected() {
        let mask = bundled_mask();
        let graph = ChannelGraph::bundled(&mask).unwrap();
        let err = graph
            .find_path(
                &mask,
                GeoPoint::new(40.0, 12.0),
                GeoPoint::new(43.3244, 16.4522),
                &CancelFlag::new(),
            )
            .unwrap_err();
        assert_eq!(err, SearchFailure::NotConnected);
    }
}
