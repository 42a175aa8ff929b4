use std::path::PathBuf;

use clap::Parser;
use seaway::{
    dataset::{DataSource, LandDataset},
    models::BoundingBox,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clip a land GeoJSON dataset to a cruising area and write it (Zstandard when the output ends in .zst)"
)]
struct Args {
    /// Land data: `bundled`, a GeoJSON path (optionally `.zst`) or an http(s) URL
    #[arg(long)]
    input: DataSource,

    /// Output path for the clipped dataset
    #[arg(long)]
    output: PathBuf,

    /// Minimum latitude of the cruising area
    #[arg(long)]
    min_lat: Option<f64>,
    #[arg(long)]
    max_lat: Option<f64>,
    #[arg(long)]
    min_lng: Option<f64>,
    #[arg(long)]
    max_lng: Option<f64>,
}

impl Args {
    fn bbox(&self) -> Option<BoundingBox> {
        match (self.min_lat, self.max_lat, self.min_lng, self.max_lng) {
            (Some(min_lat), Some(max_lat), Some(min_lng), Some(max_lng)) => Some(BoundingBox {
                min_lat,
                max_lat,
                min_lng,
                max_lng,
            }),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut dataset = LandDataset::load(&args.input).await?;
    if let Some(bbox) = args.bbox() {
        dataset = dataset.clip_to(&bbox);
        tracing::info!(polygons = dataset.len(), "clipped to {:?}", bbox);
    }
    if dataset.is_empty() {
        tracing::warn!("no land polygons left after clipping");
    }

    dataset.write_to_path(&args.output)?;
    tracing::info!("land dataset written to {:?}", args.output);
    Ok(())
}
