//! Face descriptor extraction and matching.
//!
//! Extraction is delegated to an external embedding library behind
//! [`FaceEmbedder`]; this module only enforces the single-face rule and
//! applies the Euclidean acceptance policy.

use crate::descriptor::FaceDescriptor;
use async_trait::async_trait;
use thiserror::Error;

/// Euclidean distance at or below which two descriptors are the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// The embedding library's own recommended threshold. Not used for decisions.
pub const LIBRARY_DEFAULT_THRESHOLD: f32 = 0.6;

/// A still frame paused from the live camera stream (RGBA, row-major).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// One face reported by the embedding library.
#[derive(Debug, Clone)]
pub struct Detection {
    pub descriptor: FaceDescriptor,
    /// Detector score in [0, 1].
    pub confidence: f32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedderError {
    #[error("model not loaded")]
    NotLoaded,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("no single face detected in frame ({faces} found)")]
    NoFaceDetected { faces: usize },
    #[error("embedding library: {0}")]
    Embedder(#[from] EmbedderError),
}

/// External face detection + embedding function.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    /// Detect every face in `frame` and return its descriptor.
    async fn detect_faces(&self, frame: &Frame) -> Result<Vec<Detection>, EmbedderError>;
}

/// Extract exactly one descriptor from `frame`.
///
/// Zero faces, or more than one, is `NoFaceDetected`: the capture is
/// retryable and never fatal.
pub async fn extract_descriptor(
    embedder: &dyn FaceEmbedder,
    frame: &Frame,
) -> Result<FaceDescriptor, ExtractError> {
    let mut faces = embedder.detect_faces(frame).await?;
    if faces.len() != 1 {
        tracing::debug!(
            faces = faces.len(),
            seq = frame.sequence,
            "rejecting frame: need exactly one face"
        );
        return Err(ExtractError::NoFaceDetected { faces: faces.len() });
    }
    let face = faces.remove(0);
    tracing::debug!(confidence = face.confidence, seq = frame.sequence, "face extracted");
    Ok(face.descriptor)
}

/// Result of comparing a live descriptor against a stored reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// `1 - distance_score`. Negative when the distance exceeds 1.
    pub confidence: f32,
    pub distance_score: f32,
}

/// Strategy for comparing a live descriptor against a reference.
pub trait Matcher {
    fn compare(&self, live: &FaceDescriptor, reference: &FaceDescriptor) -> f32;
    fn evaluate(&self, live: &FaceDescriptor, reference: &FaceDescriptor) -> MatchResult;
}

/// Euclidean distance matcher with an inclusive acceptance threshold.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, live: &FaceDescriptor, reference: &FaceDescriptor) -> f32 {
        live.euclidean_distance(reference)
    }

    fn evaluate(&self, live: &FaceDescriptor, reference: &FaceDescriptor) -> MatchResult {
        let distance_score = self.compare(live, reference);
        MatchResult {
            matched: distance_score <= self.threshold,
            confidence: 1.0 - distance_score,
            distance_score,
        }
    }
}
