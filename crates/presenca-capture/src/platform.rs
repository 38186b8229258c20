//! Seams to the host platform: camera streams and the embedding library.

use async_trait::async_trait;
use presenca_core::{FaceEmbedder, Frame};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Where the embedding model artifacts are served from by default.
pub const DEFAULT_LOCAL_MODELS: &str = "/models";
pub const DEFAULT_REMOTE_MODELS: &str = "https://cdn.jsdelivr.net/npm/@vladmandic/face-api/model";

/// Video constraints for a stream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamConstraints {
    /// Front-facing camera at an ideal resolution.
    Preferred { width: u32, height: u32 },
    /// Whatever the device offers.
    Unconstrained,
}

/// Error codes a camera request can fail with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    NotFound,
    #[error("camera in use by another application")]
    InUse,
    #[error("requested video constraints cannot be satisfied")]
    Overconstrained,
    #[error("camera request failed: {0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("video surface not mounted")]
    NotMounted,
    #[error("playback failed: {0}")]
    Failed(String),
}

/// A live camera stream with one or more media tracks.
#[async_trait]
pub trait MediaStream: Send + Sync {
    /// Start playback on the attached video surface.
    async fn play(&mut self) -> Result<(), PlaybackError>;

    /// Resolves once the stream's metadata (dimensions) is loaded.
    async fn loaded_metadata(&mut self);

    /// Freeze the live picture and return the paused frame.
    async fn pause_frame(&mut self) -> Result<Frame, PlaybackError>;

    /// Resume live playback after a paused capture.
    fn resume(&mut self);

    /// Stop every acquired track. Idempotent.
    fn stop_all_tracks(&mut self);

    /// Number of tracks still running.
    fn live_tracks(&self) -> usize;
}

#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Page is served over HTTPS or from localhost.
    fn is_secure_context(&self) -> bool;

    /// The media-capture API is present.
    fn has_media_devices(&self) -> bool;

    async fn request_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, StreamError>;
}

/// Location of the embedding model artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    Remote(String),
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Local(path) => write!(f, "{}", path.display()),
            ModelSource::Remote(url) => f.write_str(url),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to load models from {origin}: {reason}")]
pub struct ModelError {
    pub origin: String,
    pub reason: String,
}

/// Loads the detector, landmark and recognition networks from one source.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, source: &ModelSource) -> Result<Arc<dyn FaceEmbedder>, ModelError>;
}
