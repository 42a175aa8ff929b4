use std::{fs, path::PathBuf, sync::Arc};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Parser;
use seaway::{
    channels::{ChannelGraph, ChannelGraphFile},
    config::EngineConfig,
    dataset::{DataSource, LandDataset},
    engine::SafeRouteEngine,
    gpx_export::encode_voyage_as_gpx,
    land::LandMask,
    models::{LegRequest, SafeRouteRequest},
    pathfinder::CancelFlag,
};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Route itinerary legs around land and print the result as JSON")]
struct Args {
    /// JSON file with either a list of legs or a `{ "days": [...], "vessel": {...} }` request
    #[arg(long)]
    legs: PathBuf,

    /// Land data: `bundled`, a GeoJSON path (optionally `.zst`) or an http(s) URL
    #[arg(long, default_value = "bundled")]
    land: DataSource,

    /// Channel graph used when the grid search fails (`bundled`, path or URL)
    #[arg(long)]
    channels: Option<DataSource>,

    /// Safety buffer around land in kilometres
    #[arg(long)]
    buffer_km: Option<f64>,

    /// Also write the routed voyage as GPX to this path
    #[arg(long)]
    gpx: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegsInput {
    Legs(Vec<LegRequest>),
    Request(SafeRouteRequest),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "seaway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let request = match serde_json::from_slice(&fs::read(&args.legs)?)? {
        LegsInput::Legs(days) => SafeRouteRequest {
            days,
            ..Default::default()
        },
        LegsInput::Request(request) => request,
    };
    tracing::info!(legs = request.days.len(), "read itinerary from {:?}", args.legs);

    let mut config = EngineConfig::from_env();
    if let Some(buffer_km) = args.buffer_km {
        config.land_buffer_km = buffer_km;
    }

    let dataset = LandDataset::load(&args.land).await?;
    let mask = Arc::new(LandMask::new(dataset, config.land_buffer_km)?);
    let mut engine = SafeRouteEngine::new(mask.clone(), config);
    if let Some(source) = &args.channels {
        let graph = ChannelGraph::from_graph_file(ChannelGraphFile::load(source).await?, &mask)?;
        engine = engine.with_fallback(Arc::new(graph));
    }

    let results = engine.route_legs(&request.days, &request.vessel, &CancelFlag::new());
    let failed = results.iter().filter(|r| r.failed).count();
    tracing::info!(legs = results.len(), failed, "routing finished");

    if let Some(path) = &args.gpx {
        let encoded = encode_voyage_as_gpx(&request.days, &results)?;
        fs::write(path, BASE64.decode(encoded)?)?;
        tracing::info!("GPX written to {:?}", path);
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
