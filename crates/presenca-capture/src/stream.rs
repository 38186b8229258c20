//! Scoped ownership of the camera stream.

use crate::platform::MediaStream;

/// Owns a camera stream and stops all of its tracks when released or dropped.
pub struct StreamGuard {
    stream: Option<Box<dyn MediaStream>>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn MediaStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// The held stream, or `None` once released.
    pub fn stream_mut(&mut self) -> Option<&mut Box<dyn MediaStream>> {
        self.stream.as_mut()
    }

    pub fn is_held(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop every track and give up the stream. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let tracks = stream.live_tracks();
            stream.stop_all_tracks();
            tracing::debug!(tracks, "camera stream released");
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGuard")
            .field("held", &self.is_held())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakePlatform;
    use crate::platform::{MediaPlatform, StreamConstraints};

    #[tokio::test]
    async fn test_drop_stops_tracks() {
        let platform = FakePlatform::new();
        let stream = platform
            .request_stream(StreamConstraints::Unconstrained)
            .await
            .unwrap();
        assert_eq!(platform.live_tracks(), 1);
        {
            let _guard = StreamGuard::new(stream);
        }
        assert_eq!(platform.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let platform = FakePlatform::new();
        let stream = platform
            .request_stream(StreamConstraints::Unconstrained)
            .await
            .unwrap();
        let mut guard = StreamGuard::new(stream);
        guard.release();
        guard.release();
        assert!(!guard.is_held());
        assert!(guard.stream_mut().is_none());
        assert_eq!(platform.live_tracks(), 0);
    }
}
