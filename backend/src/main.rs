use std::{net::SocketAddr, sync::Arc};

use seaway::{
    AppState, create_router,
    cache::RouteCache,
    channels::{ChannelGraph, ChannelGraphFile},
    config::ServerConfig,
    dataset::LandDataset,
    engine::SafeRouteEngine,
    error::RouteError,
    land::{self, LandMask},
};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seaway=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let dataset = LandDataset::load(&config.land_source).await?;
    let buffer_km = config.engine.land_buffer_km;
    let mask = land::global_mask(|| LandMask::new(dataset, buffer_km))?;
    tracing::info!(
        source = %config.land_source,
        polygons = mask.polygon_count(),
        edges = mask.edge_count(),
        buffer_km,
        "land mask ready"
    );

    let mut engine = SafeRouteEngine::new(mask.clone(), config.engine.clone());

    if let Some(source) = &config.channel_graph {
        let graph_file = ChannelGraphFile::load(source).await.map_err(RouteError::from)?;
        let graph = ChannelGraph::from_graph_file(graph_file, &mask).map_err(RouteError::from)?;
        tracing::info!(
            %source,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "channel fallback enabled"
        );
        engine = engine.with_fallback(Arc::new(graph));
    }

    match RouteCache::with_capacity(config.cache_capacity, config.cache_ttl) {
        Some(cache) => {
            tracing::info!(
                capacity = config.cache_capacity,
                ttl_secs = config.cache_ttl.as_secs(),
                "route cache enabled"
            );
            engine = engine.with_cache(Arc::new(cache));
        }
        None => tracing::info!("route cache disabled"),
    }

    let state = AppState {
        engine: Arc::new(engine),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = create_router(state).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("starting safe route service on http://{addr}");
    tracing::info!("  POST /api/trips/safe-route");
    tracing::info!("  GET  /api/health");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
