//! File-backed capture.
//!
//! A descriptor JSON file stands in for both the camera and the embedding
//! models: the "frame" is whatever the file holds when the session captures.
//! The file is either one 128-value array (one face) or an array of such
//! arrays (zero or several faces).

use anyhow::Context;
use async_trait::async_trait;
use presenca_capture::{
    MediaPlatform, MediaStream, ModelError, ModelLoader, ModelSource, PlaybackError,
    StreamConstraints, StreamError,
};
use presenca_core::{Detection, EmbedderError, FaceDescriptor, FaceEmbedder, Frame};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FALLBACK_WIDTH: u32 = 640;
const FALLBACK_HEIGHT: u32 = 480;

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorFile {
    Single(FaceDescriptor),
    Faces(Vec<FaceDescriptor>),
}

impl DescriptorFile {
    fn into_faces(self) -> Vec<FaceDescriptor> {
        match self {
            DescriptorFile::Single(descriptor) => vec![descriptor],
            DescriptorFile::Faces(faces) => faces,
        }
    }
}

async fn read_faces(path: &Path) -> anyhow::Result<Vec<FaceDescriptor>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file: DescriptorFile = serde_json::from_str(&text).with_context(|| {
        format!(
            "{}: expected a 128-value array or an array of them",
            path.display()
        )
    })?;
    Ok(file.into_faces())
}

/// Read a file that must hold exactly one descriptor.
pub async fn read_descriptor(path: &Path) -> anyhow::Result<FaceDescriptor> {
    let mut faces = read_faces(path).await?;
    match faces.len() {
        1 => Ok(faces.remove(0)),
        n => anyhow::bail!("{}: expected one face, found {n}", path.display()),
    }
}

/// A platform with one always-available virtual camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilePlatform;

#[async_trait]
impl MediaPlatform for FilePlatform {
    fn is_secure_context(&self) -> bool {
        true
    }

    fn has_media_devices(&self) -> bool {
        true
    }

    async fn request_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, StreamError> {
        let (width, height) = match constraints {
            StreamConstraints::Preferred { width, height } => (width, height),
            StreamConstraints::Unconstrained => (FALLBACK_WIDTH, FALLBACK_HEIGHT),
        };
        Ok(Box::new(FileStream {
            width,
            height,
            stopped: false,
            sequence: 0,
        }))
    }
}

struct FileStream {
    width: u32,
    height: u32,
    stopped: bool,
    sequence: u32,
}

#[async_trait]
impl MediaStream for FileStream {
    async fn play(&mut self) -> Result<(), PlaybackError> {
        if self.stopped {
            return Err(PlaybackError::Failed("stream stopped".into()));
        }
        Ok(())
    }

    async fn loaded_metadata(&mut self) {}

    async fn pause_frame(&mut self) -> Result<Frame, PlaybackError> {
        if self.stopped {
            return Err(PlaybackError::Failed("stream stopped".into()));
        }
        self.sequence += 1;
        Ok(Frame {
            data: Vec::new(),
            width: self.width,
            height: self.height,
            sequence: self.sequence,
        })
    }

    fn resume(&mut self) {}

    fn stop_all_tracks(&mut self) {
        self.stopped = true;
    }

    fn live_tracks(&self) -> usize {
        usize::from(!self.stopped)
    }
}

/// Reads the descriptor file on every detection.
struct DescriptorFileEmbedder {
    path: PathBuf,
}

#[async_trait]
impl FaceEmbedder for DescriptorFileEmbedder {
    async fn detect_faces(&self, _frame: &Frame) -> Result<Vec<Detection>, EmbedderError> {
        let faces = read_faces(&self.path)
            .await
            .map_err(|e| EmbedderError::InferenceFailed(format!("{e:#}")))?;
        Ok(faces
            .into_iter()
            .map(|descriptor| Detection {
                descriptor,
                confidence: 1.0,
            })
            .collect())
    }
}

/// Accepts a local model directory only if it exists; a remote source needs
/// no artifacts since descriptors come precomputed.
pub struct FileLoader {
    descriptor: PathBuf,
}

impl FileLoader {
    pub fn new(descriptor: impl Into<PathBuf>) -> Self {
        Self {
            descriptor: descriptor.into(),
        }
    }
}

#[async_trait]
impl ModelLoader for FileLoader {
    async fn load(&self, source: &ModelSource) -> Result<Arc<dyn FaceEmbedder>, ModelError> {
        if let ModelSource::Local(dir) = source {
            if !dir.is_dir() {
                return Err(ModelError {
                    origin: source.to_string(),
                    reason: "directory not found".into(),
                });
            }
        }
        tracing::debug!(
            %source,
            descriptor = %self.descriptor.display(),
            "descriptor file embedder ready"
        );
        Ok(Arc::new(DescriptorFileEmbedder {
            path: self.descriptor.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presenca_capture::{CameraLock, CaptureOutcome, CaptureSession, SessionConfig};
    use presenca_core::DESCRIPTOR_LEN;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn one_face() -> String {
        serde_json::to_string(&vec![0.1_f32; DESCRIPTOR_LEN]).unwrap()
    }

    #[tokio::test]
    async fn test_reads_single_and_multi_face_files() {
        let dir = tempfile::tempdir().unwrap();
        let single = write(dir.path(), "one.json", &one_face());
        let pair = write(dir.path(), "two.json", &format!("[{},{}]", one_face(), one_face()));
        let empty = write(dir.path(), "none.json", "[]");

        assert_eq!(read_faces(&single).await.unwrap().len(), 1);
        assert_eq!(read_faces(&pair).await.unwrap().len(), 2);
        assert!(read_faces(&empty).await.unwrap().is_empty());
        assert!(read_descriptor(&pair).await.is_err());
    }

    #[tokio::test]
    async fn test_short_descriptor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let short = write(dir.path(), "short.json", "[0.1, 0.2]");
        assert!(read_descriptor(&short).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_model_dir_falls_back_to_remote() {
        let dir = tempfile::tempdir().unwrap();
        let face = write(dir.path(), "face.json", &one_face());
        let config = SessionConfig {
            local_models: ModelSource::Local(dir.path().join("missing")),
            ..SessionConfig::default()
        };
        let mut session = CaptureSession::new(
            Arc::new(FilePlatform),
            Arc::new(FileLoader::new(&face)),
            &CameraLock::new(),
            config,
        )
        .unwrap();
        session.start().await.unwrap();
        let outcome = session.capture().await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Captured(_)));
        assert!(!session.holds_camera());
    }

    #[tokio::test]
    async fn test_two_faces_is_no_face() {
        let dir = tempfile::tempdir().unwrap();
        let pair = write(dir.path(), "two.json", &format!("[{},{}]", one_face(), one_face()));
        let mut session = CaptureSession::new(
            Arc::new(FilePlatform),
            Arc::new(FileLoader::new(&pair)),
            &CameraLock::new(),
            SessionConfig::default(),
        )
        .unwrap();
        session.start().await.unwrap();
        assert_eq!(session.capture().await.unwrap(), CaptureOutcome::NoFace);
    }
}
