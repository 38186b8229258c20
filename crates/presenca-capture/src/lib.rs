//! presenca-capture — Camera acquisition and face capture.
//!
//! Runs environment preflight, loads the embedding models (local first,
//! remote fallback), opens the camera, and drives a single capture session
//! from `Idle` to a captured descriptor. The camera stream is owned by a
//! [`StreamGuard`] and released on every exit path.

pub mod platform;
pub mod preflight;
pub mod session;
pub mod stream;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use platform::{
    MediaPlatform, MediaStream, ModelError, ModelLoader, ModelSource, PlaybackError,
    StreamConstraints, StreamError,
};
pub use preflight::{run_preflight, CheckStatus, PreflightCheck, PreflightFailure, PreflightReport};
pub use session::{
    CameraLock, CancelHandle, CaptureDevice, CaptureOutcome, CaptureSession, SessionConfig,
    SessionError, SessionFailure, SessionState,
};
pub use stream::StreamGuard;
