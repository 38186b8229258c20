//! Capture session state machine.
//!
//! One tagged [`SessionState`] drives the whole flow:
//!
//! ```text
//! Idle -> Diagnosing -> ModelLoading -> CameraAcquiring -> Ready <-> Capturing -> Succeeded
//!            |               |                |                          |
//!            +---------------+----------------+--------------------------+-> Failed
//! (any non-terminal state) -> Cancelled
//! ```
//!
//! Model loading and the camera request run concurrently while the session is
//! in `ModelLoading`; both results are joined before playback starts.

use crate::platform::{
    MediaPlatform, MediaStream, ModelLoader, ModelSource, PlaybackError, StreamConstraints,
    StreamError, DEFAULT_LOCAL_MODELS, DEFAULT_REMOTE_MODELS,
};
use crate::preflight::{self, PreflightFailure};
use crate::stream::StreamGuard;
use presenca_core::{extract_descriptor, ExtractError, FaceDescriptor, FaceEmbedder};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

const PREFERRED_WIDTH: u32 = 1280;
const PREFERRED_HEIGHT: u32 = 720;
const METADATA_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub preferred_width: u32,
    pub preferred_height: u32,
    /// How long to wait for the metadata signal before forcing playback.
    pub metadata_timeout: Duration,
    pub local_models: ModelSource,
    pub remote_models: ModelSource,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preferred_width: PREFERRED_WIDTH,
            preferred_height: PREFERRED_HEIGHT,
            metadata_timeout: METADATA_TIMEOUT,
            local_models: ModelSource::Local(PathBuf::from(DEFAULT_LOCAL_MODELS)),
            remote_models: ModelSource::Remote(DEFAULT_REMOTE_MODELS.to_string()),
        }
    }
}

impl SessionConfig {
    fn preferred_constraints(&self) -> StreamConstraints {
        StreamConstraints::Preferred {
            width: self.preferred_width,
            height: self.preferred_height,
        }
    }
}

/// Why a session ended in `Failed`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionFailure {
    #[error("preflight: {0}")]
    Preflight(PreflightFailure),
    #[error("models unavailable (local: {local}; remote: {remote})")]
    ModelLoad { local: String, remote: String },
    #[error("camera: {0}")]
    Camera(StreamError),
    #[error("video playback: {0}")]
    Playback(String),
    #[error("face embedding: {0}")]
    Embedding(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Diagnosing,
    ModelLoading,
    CameraAcquiring,
    Ready,
    Capturing,
    Succeeded,
    Failed(SessionFailure),
    Cancelled,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Diagnosing => "diagnosing",
            SessionState::ModelLoading => "model_loading",
            SessionState::CameraAcquiring => "camera_acquiring",
            SessionState::Ready => "ready",
            SessionState::Capturing => "capturing",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed(_) => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed(_) | SessionState::Cancelled
        )
    }

    /// No operation is in flight in these states.
    fn is_resting(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Ready)
    }

    fn allows(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (s, Cancelled) => !s.is_terminal(),
            (Diagnosing | ModelLoading | CameraAcquiring | Capturing, Failed(_)) => true,
            (Idle, Diagnosing)
            | (Diagnosing, ModelLoading)
            | (ModelLoading, CameraAcquiring)
            | (CameraAcquiring, Ready)
            | (Ready, Capturing)
            | (Capturing, Ready)
            | (Capturing, Succeeded) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("camera already in use by another capture session")]
    CameraBusy,
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("capture session failed: {0}")]
    Failed(SessionFailure),
    #[error("capture session cancelled")]
    Cancelled,
}

/// Result of one capture attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// A single face was found; the camera has been released.
    Captured(FaceDescriptor),
    /// No single face in the frame; the session is back in `Ready`.
    NoFace,
}

/// Exclusive access to one camera device. Clone it to share between sessions.
#[derive(Clone)]
pub struct CameraLock {
    permits: Arc<Semaphore>,
}

impl CameraLock {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    fn try_lock(&self) -> Result<OwnedSemaphorePermit, SessionError> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| SessionError::CameraBusy)
    }
}

impl Default for CameraLock {
    fn default() -> Self {
        Self::new()
    }
}

/// State and resources a [`CancelHandle`] can reach from another task.
struct Shared {
    state: SessionState,
    stream: Option<StreamGuard>,
    embedder: Option<Arc<dyn FaceEmbedder>>,
}

impl Shared {
    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if self.state == SessionState::Cancelled {
            return Err(SessionError::Cancelled);
        }
        if !self.state.allows(&next) {
            tracing::error!(
                from = self.state.name(),
                to = next.name(),
                "invalid session transition"
            );
            return Err(SessionError::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        tracing::info!(from = self.state.name(), to = next.name(), "session transition");
        self.state = next;
        Ok(())
    }

    fn release_stream(&mut self) {
        if let Some(mut guard) = self.stream.take() {
            guard.release();
        }
    }

    /// Release the camera and move to a terminal state.
    fn finish(&mut self, terminal: SessionState) {
        self.release_stream();
        self.embedder = None;
        if let Err(e) = self.transition(terminal) {
            tracing::error!(error = %e, "session already terminal");
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Requests cancellation of a session from another task.
///
/// A session resting in `Idle` or `Ready` is cancelled on the spot and its
/// camera released. One in the middle of `start()` or `capture()` stops at
/// its next await point.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
    shared: Arc<Mutex<Shared>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let mut shared = lock(&self.shared);
        self.tx.send_replace(true);
        if shared.state.is_resting() {
            shared.finish(SessionState::Cancelled);
        }
    }
}

/// Run `fut` unless cancellation is requested first.
async fn cancellable<F: Future>(cancel: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    if *cancel.borrow_and_update() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.wait_for(|cancelled| *cancelled) => None,
        out = fut => Some(out),
    }
}

/// Start playback, falling back to the metadata signal when the surface is
/// not ready yet, then forcing playback once the wait times out.
async fn start_playback<S>(stream: &mut S, timeout: Duration) -> Result<(), PlaybackError>
where
    S: MediaStream + ?Sized,
{
    match stream.play().await {
        Ok(()) => {
            tracing::debug!("playback started directly");
            Ok(())
        }
        Err(e) => {
            tracing::debug!(error = %e, "direct play failed; waiting for metadata");
            if tokio::time::timeout(timeout, stream.loaded_metadata()).await.is_err() {
                tracing::warn!(?timeout, "metadata never loaded; forcing playback");
            }
            stream.play().await
        }
    }
}

/// One capture attempt against one camera, from preflight to a descriptor.
///
/// The session holds its [`CameraLock`] permit for its whole lifetime, so a
/// second session on the same device cannot be created until this one drops.
/// Once it leaves `Ready` for a terminal state it cannot be reused; open a
/// new one (see [`CaptureDevice`]) for another attempt.
pub struct CaptureSession {
    platform: Arc<dyn MediaPlatform>,
    loader: Arc<dyn ModelLoader>,
    config: SessionConfig,
    shared: Arc<Mutex<Shared>>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    _permit: OwnedSemaphorePermit,
}

impl CaptureSession {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        loader: Arc<dyn ModelLoader>,
        lock: &CameraLock,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let permit = lock.try_lock()?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Ok(Self {
            platform,
            loader,
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Idle,
                stream: None,
                embedder: None,
            })),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            _permit: permit,
        })
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared).state.clone()
    }

    /// Whether the session currently owns a camera stream.
    pub fn holds_camera(&self) -> bool {
        lock(&self.shared)
            .stream
            .as_ref()
            .is_some_and(StreamGuard::is_held)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel from the owning task. No-op once the session is terminal.
    pub fn cancel(&mut self) {
        let mut shared = lock(&self.shared);
        self.cancel_tx.send_replace(true);
        if !shared.state.is_terminal() {
            shared.finish(SessionState::Cancelled);
        }
    }

    /// Drive the session from `Idle` to `Ready`.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Diagnosing)?;
        let mut cancel = self.cancel_rx.clone();

        let preferred = self.config.preferred_constraints();
        let report = match cancellable(
            &mut cancel,
            preflight::run_preflight(self.platform.as_ref(), preferred),
        )
        .await
        {
            Some(report) => report,
            None => return Err(self.cancelled()),
        };
        if let Some(failure) = report.failure() {
            return Err(self.fail(SessionFailure::Preflight(failure)));
        }

        self.transition(SessionState::ModelLoading)?;
        let startup = async { tokio::join!(self.load_models(), self.acquire_stream()) };
        let (models, stream) = match cancellable(&mut cancel, startup).await {
            Some(joined) => joined,
            None => return Err(self.cancelled()),
        };
        let embedder = match models {
            Ok(embedder) => embedder,
            Err(failure) => {
                drop(stream);
                return Err(self.fail(failure));
            }
        };
        let mut guard = match stream {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(SessionFailure::Camera(e))),
        };

        self.transition(SessionState::CameraAcquiring)?;
        let timeout = self.config.metadata_timeout;
        let played = match guard.stream_mut() {
            Some(stream) => cancellable(&mut cancel, start_playback(&mut **stream, timeout)).await,
            None => Some(Err(PlaybackError::Failed("camera stream released".into()))),
        };
        match played {
            None => Err(self.cancelled()),
            Some(Err(e)) => Err(self.fail(SessionFailure::Playback(e.to_string()))),
            Some(Ok(())) => self.settle_ready(guard, Some(embedder)),
        }
    }

    /// Pause the live frame and try to extract one face descriptor.
    ///
    /// `NoFace` leaves the session in `Ready` for another attempt. A captured
    /// descriptor releases the camera before it is returned.
    pub async fn capture(&mut self) -> Result<CaptureOutcome, SessionError> {
        self.transition(SessionState::Capturing)?;
        let mut cancel = self.cancel_rx.clone();

        let (guard, embedder) = {
            let mut shared = lock(&self.shared);
            (shared.stream.take(), shared.embedder.clone())
        };
        let (Some(mut guard), Some(embedder)) = (guard, embedder) else {
            return Err(self.fail(SessionFailure::Embedding("models not loaded".into())));
        };

        let paused = match guard.stream_mut() {
            Some(stream) => cancellable(&mut cancel, stream.pause_frame()).await,
            None => Some(Err(PlaybackError::Failed("camera stream released".into()))),
        };
        let frame = match paused {
            None => return Err(self.cancelled()),
            Some(Err(e)) => return Err(self.fail(SessionFailure::Playback(e.to_string()))),
            Some(Ok(frame)) => frame,
        };

        let extracted =
            match cancellable(&mut cancel, extract_descriptor(embedder.as_ref(), &frame)).await {
                Some(result) => result,
                None => return Err(self.cancelled()),
            };

        match extracted {
            Ok(descriptor) => {
                guard.release();
                let mut shared = lock(&self.shared);
                shared.embedder = None;
                shared.transition(SessionState::Succeeded)?;
                Ok(CaptureOutcome::Captured(descriptor))
            }
            Err(ExtractError::NoFaceDetected { faces }) => {
                tracing::info!(faces, "no single face in frame; ready to retry");
                if let Some(stream) = guard.stream_mut() {
                    stream.resume();
                }
                self.settle_ready(guard, None)?;
                Ok(CaptureOutcome::NoFace)
            }
            Err(ExtractError::Embedder(e)) => {
                Err(self.fail(SessionFailure::Embedding(e.to_string())))
            }
        }
    }

    /// Load from the local source, falling back once to the remote source.
    async fn load_models(&self) -> Result<Arc<dyn FaceEmbedder>, SessionFailure> {
        let local = match self.loader.load(&self.config.local_models).await {
            Ok(embedder) => {
                tracing::info!(source = %self.config.local_models, "models loaded");
                return Ok(embedder);
            }
            Err(e) => e,
        };
        tracing::warn!(error = %local, "local models unavailable; trying remote");
        match self.loader.load(&self.config.remote_models).await {
            Ok(embedder) => {
                tracing::info!(source = %self.config.remote_models, "models loaded");
                Ok(embedder)
            }
            Err(remote) => Err(SessionFailure::ModelLoad {
                local: local.to_string(),
                remote: remote.to_string(),
            }),
        }
    }

    /// Request the preferred resolution, retrying once unconstrained.
    async fn acquire_stream(&self) -> Result<StreamGuard, StreamError> {
        let preferred = self.config.preferred_constraints();
        match self.platform.request_stream(preferred).await {
            Ok(stream) => Ok(StreamGuard::new(stream)),
            Err(StreamError::Overconstrained) => {
                tracing::warn!(?preferred, "constraints not satisfiable; retrying with defaults");
                self.platform
                    .request_stream(StreamConstraints::Unconstrained)
                    .await
                    .map(StreamGuard::new)
            }
            Err(e) => Err(e),
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        lock(&self.shared).transition(next)
    }

    /// Park the stream and come to rest in `Ready`, unless a cancel arrived
    /// while the last await was completing.
    fn settle_ready(
        &mut self,
        guard: StreamGuard,
        embedder: Option<Arc<dyn FaceEmbedder>>,
    ) -> Result<(), SessionError> {
        let mut shared = lock(&self.shared);
        shared.stream = Some(guard);
        if embedder.is_some() {
            shared.embedder = embedder;
        }
        if *self.cancel_rx.borrow() {
            shared.finish(SessionState::Cancelled);
            return Err(SessionError::Cancelled);
        }
        shared.transition(SessionState::Ready)
    }

    fn fail(&mut self, failure: SessionFailure) -> SessionError {
        tracing::warn!(%failure, "capture session failed");
        lock(&self.shared).finish(SessionState::Failed(failure.clone()));
        SessionError::Failed(failure)
    }

    fn cancelled(&mut self) -> SessionError {
        let mut shared = lock(&self.shared);
        if !shared.state.is_terminal() {
            shared.finish(SessionState::Cancelled);
        }
        SessionError::Cancelled
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        lock(&self.shared).release_stream();
    }
}

/// Everything needed to open capture sessions on one camera.
///
/// Each call to [`CaptureDevice::open_session`] yields a fresh session; the
/// shared [`CameraLock`] keeps at most one alive at a time.
#[derive(Clone)]
pub struct CaptureDevice {
    platform: Arc<dyn MediaPlatform>,
    loader: Arc<dyn ModelLoader>,
    lock: CameraLock,
    config: SessionConfig,
}

impl CaptureDevice {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        loader: Arc<dyn ModelLoader>,
        lock: CameraLock,
        config: SessionConfig,
    ) -> Self {
        Self {
            platform,
            loader,
            lock,
            config,
        }
    }

    pub fn open_session(&self) -> Result<CaptureSession, SessionError> {
        CaptureSession::new(
            Arc::clone(&self.platform),
            Arc::clone(&self.loader),
            &self.lock,
            self.config.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{descriptor, FakeEmbedder, FakeLoader, FakePlatform};
    use presenca_core::EmbedderError;

    struct Rig {
        platform: FakePlatform,
        loader: FakeLoader,
        embedder: FakeEmbedder,
        lock: CameraLock,
    }

    impl Rig {
        fn new() -> Self {
            let embedder = FakeEmbedder::new();
            Self {
                platform: FakePlatform::new(),
                loader: FakeLoader::new(embedder.clone()),
                embedder,
                lock: CameraLock::new(),
            }
        }

        fn session(&self) -> CaptureSession {
            let config = SessionConfig {
                metadata_timeout: Duration::from_millis(20),
                ..SessionConfig::default()
            };
            CaptureSession::new(
                Arc::new(self.platform.clone()),
                Arc::new(self.loader.clone()),
                &self.lock,
                config,
            )
            .unwrap()
        }
    }

    #[tokio::test]
    async fn test_start_reaches_ready() {
        let rig = Rig::new();
        let mut session = rig.session();
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.holds_camera());
        // Preflight trial stream plus the live stream; the trial is already released.
        assert_eq!(rig.platform.acquisitions(), 2);
        assert_eq!(rig.platform.live_tracks(), 1);
    }

    #[tokio::test]
    async fn test_capture_success_releases_camera() {
        let rig = Rig::new();
        rig.embedder.push_face(descriptor(0.3));
        let mut session = rig.session();
        session.start().await.unwrap();

        let outcome = session.capture().await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Captured(descriptor(0.3)));
        assert_eq!(session.state(), SessionState::Succeeded);
        assert!(!session.holds_camera());
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_no_face_returns_to_ready() {
        let rig = Rig::new();
        rig.embedder.push_no_face();
        rig.embedder.push_face(descriptor(0.1));
        let mut session = rig.session();
        session.start().await.unwrap();

        assert_eq!(session.capture().await.unwrap(), CaptureOutcome::NoFace);
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.holds_camera());

        assert!(matches!(
            session.capture().await.unwrap(),
            CaptureOutcome::Captured(_)
        ));
    }

    #[tokio::test]
    async fn test_permission_denied_fails_before_model_loading() {
        let rig = Rig::new();
        rig.platform
            .script()
            .stream_errors
            .push_back(StreamError::PermissionDenied);
        let mut session = rig.session();

        let err = session.start().await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Failed(SessionFailure::Preflight(PreflightFailure::PermissionDenied))
        );
        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert!(rig.loader.loads().is_empty());
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_model_load_falls_back_to_remote() {
        let rig = Rig::new();
        rig.loader.fail_local();
        let mut session = rig.session();
        session.start().await.unwrap();

        let loads = rig.loader.loads();
        assert_eq!(loads.len(), 2);
        assert!(matches!(loads[0], ModelSource::Local(_)));
        assert!(matches!(loads[1], ModelSource::Remote(_)));
    }

    #[tokio::test]
    async fn test_both_model_sources_fail_releases_camera() {
        let rig = Rig::new();
        rig.loader.fail_local();
        rig.loader.fail_remote();
        let mut session = rig.session();

        let err = session.start().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Failed(SessionFailure::ModelLoad { .. })
        ));
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_overconstrained_retries_unconstrained() {
        let rig = Rig::new();
        // Both the preflight trial and the live request hit the retry.
        rig.platform.script().preferred_unsatisfiable = true;
        let mut session = rig.session();
        session.start().await.unwrap();

        let preferred = StreamConstraints::Preferred {
            width: 1280,
            height: 720,
        };
        assert_eq!(
            rig.platform.script().requests,
            vec![
                preferred,
                StreamConstraints::Unconstrained,
                preferred,
                StreamConstraints::Unconstrained,
            ]
        );
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_live_request_in_use_fails_session() {
        let rig = Rig::new();
        {
            // The preflight trial is granted; the live request finds the camera taken.
            let mut script = rig.platform.script();
            script.grants_before_errors = 1;
            script.stream_errors.push_back(StreamError::InUse);
        }
        let mut session = rig.session();

        let err = session.start().await.unwrap_err();
        assert_eq!(err, SessionError::Failed(SessionFailure::Camera(StreamError::InUse)));
        assert_eq!(
            session.state(),
            SessionState::Failed(SessionFailure::Camera(StreamError::InUse))
        );
        assert_eq!(rig.platform.acquisitions(), 1);
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_live_request_not_found_fails_session() {
        let rig = Rig::new();
        {
            let mut script = rig.platform.script();
            script.grants_before_errors = 1;
            script.stream_errors.push_back(StreamError::NotFound);
        }
        let mut session = rig.session();

        let err = session.start().await.unwrap_err();
        assert_eq!(err, SessionError::Failed(SessionFailure::Camera(StreamError::NotFound)));
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_device_opens_fresh_session_after_success() {
        let rig = Rig::new();
        rig.embedder.push_face(descriptor(0.2));
        rig.embedder.push_face(descriptor(0.3));
        let device = CaptureDevice::new(
            Arc::new(rig.platform.clone()),
            Arc::new(rig.loader.clone()),
            rig.lock.clone(),
            SessionConfig::default(),
        );

        let mut first = device.open_session().unwrap();
        first.start().await.unwrap();
        first.capture().await.unwrap();
        assert!(matches!(device.open_session(), Err(SessionError::CameraBusy)));
        drop(first);

        let mut second = device.open_session().unwrap();
        second.start().await.unwrap();
        assert_eq!(
            second.capture().await.unwrap(),
            CaptureOutcome::Captured(descriptor(0.3))
        );
    }

    #[tokio::test]
    async fn test_playback_waits_for_metadata() {
        let rig = Rig::new();
        rig.platform.script().direct_play_fails = true;
        let mut session = rig.session();
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_playback_forced_after_metadata_timeout() {
        let rig = Rig::new();
        {
            let mut script = rig.platform.script();
            script.direct_play_fails = true;
            script.metadata_arrives = false;
        }
        let mut session = rig.session();
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_broken_playback_fails_and_releases() {
        let rig = Rig::new();
        {
            let mut script = rig.platform.script();
            script.direct_play_fails = true;
            script.playback_broken = true;
        }
        let mut session = rig.session();
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, SessionError::Failed(SessionFailure::Playback(_))));
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_embedder_failure_is_fatal() {
        let rig = Rig::new();
        rig.embedder
            .push(Err(EmbedderError::InferenceFailed("webgl context lost".into())));
        let mut session = rig.session();
        session.start().await.unwrap();
        let err = session.capture().await.unwrap_err();
        assert!(matches!(err, SessionError::Failed(SessionFailure::Embedding(_))));
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_cancel_from_ready_releases_camera() {
        let rig = Rig::new();
        let mut session = rig.session();
        session.start().await.unwrap();
        session.cancel();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(rig.platform.live_tracks(), 0);
        // Terminal: further work is refused.
        assert_eq!(session.capture().await.unwrap_err(), SessionError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_handle_in_ready_releases_camera() {
        let rig = Rig::new();
        let mut session = rig.session();
        session.start().await.unwrap();
        let handle = session.cancel_handle();

        tokio::spawn(async move { handle.cancel() }).await.unwrap();

        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(!session.holds_camera());
        assert_eq!(rig.platform.live_tracks(), 0);
        assert_eq!(session.capture().await.unwrap_err(), SessionError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_handle_in_idle_blocks_start() {
        let rig = Rig::new();
        let mut session = rig.session();
        session.cancel_handle().cancel();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.start().await.unwrap_err(), SessionError::Cancelled);
        assert_eq!(rig.platform.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_cancel_handle_after_no_face_releases_camera() {
        let rig = Rig::new();
        rig.embedder.push_no_face();
        let mut session = rig.session();
        session.start().await.unwrap();
        assert_eq!(session.capture().await.unwrap(), CaptureOutcome::NoFace);

        session.cancel_handle().cancel();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_cancel_handle_interrupts_playback_wait() {
        let rig = Rig::new();
        {
            let mut script = rig.platform.script();
            script.direct_play_fails = true;
            script.metadata_arrives = false;
        }
        let config = SessionConfig {
            metadata_timeout: Duration::from_secs(60),
            ..SessionConfig::default()
        };
        let mut session = CaptureSession::new(
            Arc::new(rig.platform.clone()),
            Arc::new(rig.loader.clone()),
            &rig.lock,
            config,
        )
        .unwrap();
        let handle = session.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        assert_eq!(session.start().await.unwrap_err(), SessionError::Cancelled);
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_second_session_on_same_camera_is_refused() {
        let rig = Rig::new();
        let first = rig.session();
        let second = CaptureSession::new(
            Arc::new(rig.platform.clone()),
            Arc::new(rig.loader.clone()),
            &rig.lock,
            SessionConfig::default(),
        );
        assert!(matches!(second, Err(SessionError::CameraBusy)));
        drop(first);
        assert!(CaptureSession::new(
            Arc::new(rig.platform.clone()),
            Arc::new(rig.loader.clone()),
            &rig.lock,
            SessionConfig::default(),
        )
        .is_ok());
    }

    #[tokio::test]
    async fn test_capture_before_start_is_invalid() {
        let rig = Rig::new();
        let mut session = rig.session();
        assert_eq!(
            session.capture().await.unwrap_err(),
            SessionError::InvalidTransition {
                from: "idle",
                to: "capturing"
            }
        );
    }

    #[tokio::test]
    async fn test_drop_releases_camera() {
        let rig = Rig::new();
        {
            let mut session = rig.session();
            session.start().await.unwrap();
            assert_eq!(rig.platform.live_tracks(), 1);
        }
        assert_eq!(rig.platform.live_tracks(), 0);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [
            SessionState::Succeeded,
            SessionState::Cancelled,
            SessionState::Failed(SessionFailure::Playback("x".into())),
        ] {
            assert!(!terminal.allows(&SessionState::Ready));
            assert!(!terminal.allows(&SessionState::Cancelled));
        }
        assert!(!SessionState::Ready.allows(&SessionState::Failed(SessionFailure::Playback(
            "x".into()
        ))));
    }
}
