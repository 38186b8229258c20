//! Scriptable in-memory platform for tests.
//!
//! [`FakePlatform`] hands out [`FakeStream`]s and counts live tracks so tests
//! can assert the camera is released. [`FakeLoader`] produces a
//! [`FakeEmbedder`] that replays queued detection results.

use crate::platform::{
    MediaPlatform, MediaStream, ModelError, ModelLoader, ModelSource, PlaybackError,
    StreamConstraints, StreamError,
};
use async_trait::async_trait;
use presenca_core::{Detection, EmbedderError, FaceDescriptor, FaceEmbedder, Frame, DESCRIPTOR_LEN};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Knobs and recorded calls for a [`FakePlatform`].
#[derive(Debug)]
pub struct PlatformScript {
    pub secure_context: bool,
    pub media_devices: bool,
    /// Errors returned by successive stream requests before they start succeeding.
    pub stream_errors: VecDeque<StreamError>,
    /// Requests granted before `stream_errors` starts being consumed.
    pub grants_before_errors: usize,
    /// Every `Preferred` request is rejected as overconstrained.
    pub preferred_unsatisfiable: bool,
    /// First `play()` on each stream fails as if the surface were not mounted.
    pub direct_play_fails: bool,
    /// Whether the metadata-loaded signal ever fires.
    pub metadata_arrives: bool,
    /// Every play after a failed direct play fails too.
    pub playback_broken: bool,
    pub requests: Vec<StreamConstraints>,
}

impl Default for PlatformScript {
    fn default() -> Self {
        Self {
            secure_context: true,
            media_devices: true,
            stream_errors: VecDeque::new(),
            grants_before_errors: 0,
            preferred_unsatisfiable: false,
            direct_play_fails: false,
            metadata_arrives: true,
            playback_broken: false,
            requests: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    script: Arc<Mutex<PlatformScript>>,
    live_tracks: Arc<AtomicUsize>,
    acquisitions: Arc<AtomicUsize>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, PlatformScript> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Tracks acquired and not yet stopped, across all streams.
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }

    /// Successful stream requests so far.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaPlatform for FakePlatform {
    fn is_secure_context(&self) -> bool {
        self.script().secure_context
    }

    fn has_media_devices(&self) -> bool {
        self.script().media_devices
    }

    async fn request_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, StreamError> {
        let mut script = self.script();
        script.requests.push(constraints);
        if script.preferred_unsatisfiable
            && matches!(constraints, StreamConstraints::Preferred { .. })
        {
            return Err(StreamError::Overconstrained);
        }
        if script.grants_before_errors > 0 {
            script.grants_before_errors -= 1;
        } else if let Some(err) = script.stream_errors.pop_front() {
            return Err(err);
        }
        self.live_tracks.fetch_add(1, Ordering::SeqCst);
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            live_tracks: Arc::clone(&self.live_tracks),
            stopped: false,
            play_attempts: 0,
            direct_play_fails: script.direct_play_fails,
            metadata_arrives: script.metadata_arrives,
            playback_broken: script.playback_broken,
            sequence: 0,
        }))
    }
}

pub struct FakeStream {
    live_tracks: Arc<AtomicUsize>,
    stopped: bool,
    play_attempts: usize,
    direct_play_fails: bool,
    metadata_arrives: bool,
    playback_broken: bool,
    sequence: u32,
}

#[async_trait]
impl MediaStream for FakeStream {
    async fn play(&mut self) -> Result<(), PlaybackError> {
        self.play_attempts += 1;
        if self.stopped {
            return Err(PlaybackError::Failed("tracks stopped".into()));
        }
        if self.direct_play_fails && self.play_attempts == 1 {
            return Err(PlaybackError::NotMounted);
        }
        if self.playback_broken {
            return Err(PlaybackError::Failed("decoder error".into()));
        }
        Ok(())
    }

    async fn loaded_metadata(&mut self) {
        if !self.metadata_arrives {
            std::future::pending::<()>().await;
        }
    }

    async fn pause_frame(&mut self) -> Result<Frame, PlaybackError> {
        if self.stopped {
            return Err(PlaybackError::Failed("tracks stopped".into()));
        }
        self.sequence += 1;
        Ok(Frame {
            data: vec![0; 4 * 4 * 4],
            width: 4,
            height: 4,
            sequence: self.sequence,
        })
    }

    fn resume(&mut self) {}

    fn stop_all_tracks(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live_tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(!self.stopped)
    }
}

/// Queue of detection results the embedder replays, one per frame.
/// An empty queue means "no face".
pub type DetectionQueue = Arc<Mutex<VecDeque<Result<Vec<Detection>, EmbedderError>>>>;

#[derive(Clone, Default)]
pub struct FakeEmbedder {
    queue: DetectionQueue,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_face(&self, descriptor: FaceDescriptor) {
        self.push(Ok(vec![Detection {
            descriptor,
            confidence: 0.97,
        }]));
    }

    pub fn push_no_face(&self) {
        self.push(Ok(Vec::new()));
    }

    pub fn push(&self, result: Result<Vec<Detection>, EmbedderError>) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }
}

#[async_trait]
impl FaceEmbedder for FakeEmbedder {
    async fn detect_faces(&self, _frame: &Frame) -> Result<Vec<Detection>, EmbedderError> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Clone, Default)]
pub struct FakeLoader {
    pub embedder: FakeEmbedder,
    fail_local: Arc<Mutex<bool>>,
    fail_remote: Arc<Mutex<bool>>,
    loads: Arc<Mutex<Vec<ModelSource>>>,
}

impl FakeLoader {
    pub fn new(embedder: FakeEmbedder) -> Self {
        Self {
            embedder,
            ..Default::default()
        }
    }

    pub fn fail_local(&self) {
        *self.fail_local.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn fail_remote(&self) {
        *self.fail_remote.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    /// Every source a load was attempted from, in order.
    pub fn loads(&self) -> Vec<ModelSource> {
        self.loads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(&self, source: &ModelSource) -> Result<Arc<dyn FaceEmbedder>, ModelError> {
        self.loads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(source.clone());
        let failing = match source {
            ModelSource::Local(_) => *self.fail_local.lock().unwrap_or_else(|e| e.into_inner()),
            ModelSource::Remote(_) => *self.fail_remote.lock().unwrap_or_else(|e| e.into_inner()),
        };
        if failing {
            return Err(ModelError {
                origin: source.to_string(),
                reason: "404 not found".into(),
            });
        }
        Ok(Arc::new(self.embedder.clone()))
    }
}

/// A descriptor whose first component is `v` and the rest zero.
pub fn descriptor(v: f32) -> FaceDescriptor {
    let mut values = vec![0.0; DESCRIPTOR_LEN];
    values[0] = v;
    // Values are finite and the length is fixed.
    FaceDescriptor::new(values).unwrap_or_else(|e| panic!("fixture descriptor: {e}"))
}
