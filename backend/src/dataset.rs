use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    str::FromStr,
};

use geo::BoundingRect;
use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::models::BoundingBox;

/// Coarse coastline of central Dalmatia: mainland from Trogir to Makarska,
/// Čiovo, Šolta, Brač, Hvar and Vis.
pub const BUNDLED_LAND: &str = include_str!("../data/central_dalmatia_land.geojson");

/// Where a dataset comes from. Parsed from `bundled`, an `http(s)://` URL or a
/// filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Bundled,
    File(PathBuf),
    Url(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to download {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FromStr for DataSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.is_empty() || s.eq_ignore_ascii_case("bundled") {
            DataSource::Bundled
        } else if s.starts_with("http://") || s.starts_with("https://") {
            DataSource::Url(s.to_owned())
        } else {
            DataSource::File(PathBuf::from(s))
        })
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Bundled => f.write_str("bundled"),
            DataSource::File(path) => write!(f, "{}", path.display()),
            DataSource::Url(url) => f.write_str(url),
        }
    }
}

impl DataSource {
    /// Raw bytes of the source; `.zst` files and URLs are decompressed.
    pub async fn fetch(&self, bundled: &'static str) -> Result<Vec<u8>, SourceError> {
        match self {
            DataSource::Bundled => Ok(bundled.as_bytes().to_vec()),
            DataSource::File(path) => read_maybe_compressed(path).map_err(|source| SourceError::Io {
                path: path.display().to_string(),
                source,
            }),
            DataSource::Url(url) => {
                let http_error = |source| SourceError::Http {
                    url: url.clone(),
                    source,
                };
                let response = reqwest::get(url)
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(http_error)?;
                let body = response.bytes().await.map_err(http_error)?;
                if url.ends_with(".zst") {
                    zstd::stream::decode_all(body.as_ref()).map_err(|source| SourceError::Io {
                        path: url.clone(),
                        source,
                    })
                } else {
                    Ok(body.to_vec())
                }
            }
        }
    }
}

fn read_maybe_compressed(path: &Path) -> Result<Vec<u8>, io::Error> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    if path.extension().is_some_and(|ext| ext == "zst") {
        zstd::stream::read::Decoder::new(file)?.read_to_end(&mut bytes)?;
    } else {
        BufReader::new(file).read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

/// Subset of GeoJSON that can carry land areas. Anything else deserializes to
/// `Unsupported` and is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJson {
    FeatureCollection {
        features: Vec<Feature>,
    },
    Feature {
        #[serde(default)]
        geometry: Option<Geometry>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_tag")]
    pub kind: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

fn feature_tag() -> String {
    "Feature".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
    #[serde(other)]
    Unsupported,
}

/// `[lng, lat]` or `[lng, lat, alt]`.
pub type Position = Vec<f64>;

#[derive(Debug, thiserror::Error)]
pub enum LandDataError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("invalid GeoJSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to write dataset: {0}")]
    Io(#[from] io::Error),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("dataset contains no land polygons")]
    Empty,
}

/// Land areas as `geo_types` polygons in (lng, lat) order.
#[derive(Debug, Clone, Default)]
pub struct LandDataset {
    polygons: Vec<Polygon<f64>>,
}

impl LandDataset {
    pub fn new(polygons: Vec<Polygon<f64>>) -> Self {
        Self { polygons }
    }

    pub fn bundled() -> Result<Self, LandDataError> {
        Self::from_geojson_str(BUNDLED_LAND)
    }

    pub async fn load(source: &DataSource) -> Result<Self, LandDataError> {
        let bytes = source.fetch(BUNDLED_LAND).await?;
        let dataset = Self::from_slice(&bytes)?;
        tracing::info!(%source, polygons = dataset.len(), "loaded land dataset");
        Ok(dataset)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LandDataError> {
        let path = path.as_ref();
        let bytes = read_maybe_compressed(path).map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_slice(&bytes)
    }

    pub fn from_geojson_str(text: &str) -> Result<Self, LandDataError> {
        Self::from_slice(text.as_bytes())
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, LandDataError> {
        let document: GeoJson = serde_json::from_slice(bytes)?;
        let mut polygons = Vec::new();
        match document {
            GeoJson::FeatureCollection { features } => {
                for feature in features {
                    if let Some(geometry) = feature.geometry {
                        collect_geometry(geometry, &mut polygons)?;
                    }
                }
            }
            GeoJson::Feature { geometry } => {
                if let Some(geometry) = geometry {
                    collect_geometry(geometry, &mut polygons)?;
                }
            }
            GeoJson::Polygon { coordinates } => {
                collect_geometry(Geometry::Polygon { coordinates }, &mut polygons)?
            }
            GeoJson::MultiPolygon { coordinates } => {
                collect_geometry(Geometry::MultiPolygon { coordinates }, &mut polygons)?
            }
            GeoJson::GeometryCollection { geometries } => {
                collect_geometry(Geometry::GeometryCollection { geometries }, &mut polygons)?
            }
            GeoJson::Unsupported => {}
        }
        Ok(Self { polygons })
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        &self.polygons
    }

    pub fn into_polygons(self) -> Vec<Polygon<f64>> {
        self.polygons
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Keeps polygons whose bounding box touches `bbox`.
    pub fn clip_to(self, bbox: &BoundingBox) -> Self {
        let polygons = self
            .polygons
            .into_iter()
            .filter(|polygon| {
                polygon.bounding_rect().is_some_and(|rect| {
                    bbox.intersects(&BoundingBox {
                        min_lat: rect.min().y,
                        max_lat: rect.max().y,
                        min_lng: rect.min().x,
                        max_lng: rect.max().x,
                    })
                })
            })
            .collect();
        Self { polygons }
    }

    pub fn to_geojson(&self) -> GeoJson {
        let features = self
            .polygons
            .iter()
            .map(|polygon| Feature {
                kind: feature_tag(),
                properties: serde_json::Value::Object(Default::default()),
                geometry: Some(Geometry::Polygon {
                    coordinates: std::iter::once(polygon.exterior())
                        .chain(polygon.interiors())
                        .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
                        .collect(),
                }),
            })
            .collect();
        GeoJson::FeatureCollection { features }
    }

    /// Writes the dataset as Zstandard-compressed GeoJSON.
    pub fn write_compressed(&self, path: impl AsRef<Path>) -> Result<(), LandDataError> {
        let file = File::create(path)?;
        let mut encoder = zstd::stream::write::Encoder::new(file, 3)?;
        serde_json::to_writer(&mut encoder, &self.to_geojson())?;
        encoder.finish()?;
        Ok(())
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), LandDataError> {
        let path = path.as_ref();
        if path.extension().is_some_and(|ext| ext == "zst") {
            return self.write_compressed(path);
        }
        let file = File::create(path)?;
        serde_json::to_writer(io::BufWriter::new(file), &self.to_geojson())?;
        Ok(())
    }
}

fn collect_geometry(
    geometry: Geometry,
    polygons: &mut Vec<Polygon<f64>>,
) -> Result<(), LandDataError> {
    match geometry {
        Geometry::Polygon { coordinates } => {
            if let Some(polygon) = build_polygon(coordinates)? {
                polygons.push(polygon);
            }
        }
        Geometry::MultiPolygon { coordinates } => {
            for rings in coordinates {
                if let Some(polygon) = build_polygon(rings)? {
                    polygons.push(polygon);
                }
            }
        }
        Geometry::GeometryCollection { geometries } => {
            for geometry in geometries {
                collect_geometry(geometry, polygons)?;
            }
        }
        Geometry::Unsupported => {}
    }
    Ok(())
}

fn build_polygon(rings: Vec<Vec<Position>>) -> Result<Option<Polygon<f64>>, LandDataError> {
    let mut rings = rings.into_iter();
    let Some(exterior) = rings.next() else {
        return Ok(None);
    };
    let Some(exterior) = build_ring(exterior)? else {
        tracing::warn!("skipping polygon with a degenerate exterior ring");
        return Ok(None);
    };

    let mut interiors = Vec::new();
    for ring in rings {
        match build_ring(ring)? {
            Some(ring) => interiors.push(ring),
            None => tracing::warn!("skipping degenerate hole ring"),
        }
    }

    Ok(Some(Polygon::new(exterior, interiors)))
}

fn build_ring(positions: Vec<Position>) -> Result<Option<LineString<f64>>, LandDataError> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(positions.len() + 1);
    for position in positions {
        let (x, y) = match position.as_slice() {
            [x, y, ..] => (*x, *y),
            _ => {
                return Err(LandDataError::InvalidGeometry(format!(
                    "position {position:?} has fewer than two values"
                )));
            }
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(LandDataError::InvalidGeometry(format!(
                "non-finite coordinate [{x}, {y}]"
            )));
        }
        let coord = Coord { x, y };
        if coords.last() != Some(&coord) {
            coords.push(coord);
        }
    }

    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.len() < 3 {
        return Ok(None);
    }
    // Polygon::new closes the ring.
    Ok(Some(LineString::new(coords)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundled_dataset_has_the_dalmatian_islands() {
        let dataset = LandDataset::bundled().expect("bundled land");
        assert_eq!(dataset.len(), 6);
    }

    #[test]
    fn parses_multipolygons_and_skips_other_geometries() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "reef"},
                 "geometry": {"type": "Point", "coordinates": [16.0, 43.0]}},
                {"type": "Feature", "properties": null,
                 "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[16.0, 43.0], [16.1, 43.0], [16.1, 43.1], [16.0, 43.0]]],
                    [[[17.0, 43.0, 12.5], [17.1, 43.0, 9.0], [17.1, 43.1, 3.0]]]
                 ]}},
                {"type": "Feature", "geometry": null}
            ]
        });
        let dataset = LandDataset::from_geojson_str(&doc.to_string()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.polygons()[1].exterior().coords().count(), 4);
    }

    #[test]
    fn bare_polygon_documents_are_accepted() {
        let doc = json!({"type": "Polygon", "coordinates": [
            [[16.0, 43.0], [16.1, 43.0], [16.1, 43.1], [16.0, 43.1], [16.0, 43.0]]
        ]});
        let dataset = LandDataset::from_geojson_str(&doc.to_string()).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn degenerate_rings_are_skipped() {
        let doc = json!({"type": "Polygon", "coordinates": [
            [[16.0, 43.0], [16.1, 43.0], [16.0, 43.0]]
        ]});
        let dataset = LandDataset::from_geojson_str(&doc.to_string()).unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn short_positions_are_an_error() {
        let doc = json!({"type": "Polygon", "coordinates": [[[16.0], [16.1, 43.0], [16.0, 43.1]]]});
        let err = LandDataset::from_geojson_str(&doc.to_string()).unwrap_err();
        assert!(matches!(err, LandDataError::InvalidGeometry(_)));
    }

    #[test]
    fn clip_keeps_only_touching_polygons() {
        let dataset = LandDataset::bundled().unwrap();
        let around_vis = BoundingBox {
            min_lat: 43.0,
            max_lat: 43.1,
            min_lng: 16.0,
            max_lng: 16.3,
        };
        // Vis itself plus the mainland, whose bounding box reaches down to 43.0.
        assert_eq!(dataset.clone().clip_to(&around_vis).len(), 2);

        let open_sea = BoundingBox {
            min_lat: 42.0,
            max_lat: 42.5,
            min_lng: 16.0,
            max_lng: 16.3,
        };
        assert!(dataset.clip_to(&open_sea).is_empty());
    }

    #[test]
    fn compressed_dataset_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("land.geojson.zst");
        let dataset = LandDataset::bundled().unwrap();
        dataset.write_to_path(&path).unwrap();

        let restored = LandDataset::from_path(&path).unwrap();
        assert_eq!(restored.len(), dataset.len());
        assert_eq!(restored.polygons()[0], dataset.polygons()[0]);
    }

    #[test]
    fn data_sources_parse_from_strings() {
        assert_eq!("bundled".parse::<DataSource>().unwrap(), DataSource::Bundled);
        assert_eq!(
            "https://example.org/land.geojson".parse::<DataSource>().unwrap(),
            DataSource::Url("https://example.org/land.geojson".into())
        );
        assert_eq!(
            "/srv/land.geojson.zst".parse::<DataSource>().unwrap(),
            DataSource::File(PathBuf::from("/srv/land.geojson.zst"))
        );
    }
}
