//! Device position seam.

use async_trait::async_trait;
use presenca_core::Coordinate;
use serde::Serialize;
use thiserror::Error;

/// Error codes a geolocation request can fail with.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationFailure {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    Unavailable,
    #[error("location request timed out")]
    Timeout,
}

/// One-shot position request. Not cancellable once issued.
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, LocationFailure>;
}

/// Reports a fixed, operator-supplied position.
#[derive(Debug, Clone, Copy)]
pub struct FixedGeolocator(pub Coordinate);

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self) -> Result<Coordinate, LocationFailure> {
        Ok(self.0)
    }
}
