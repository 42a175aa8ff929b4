use thiserror::Error;

use crate::{channels::ChannelGraphError, dataset::LandDataError};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("failed to build GPX document: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error("land data error: {0}")]
    LandData(#[from] LandDataError),
    #[error("channel graph error: {0}")]
    Channels(#[from] ChannelGraphError),
    #[error("routing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
