//! Environment checks run before a capture session touches the camera.

use crate::platform::{MediaPlatform, StreamConstraints, StreamError};
use crate::stream::StreamGuard;
use serde::Serialize;
use thiserror::Error;

const CHECK_SECURE_CONTEXT: &str = "secure_context";
const CHECK_MEDIA_DEVICES: &str = "media_devices";
const CHECK_CAMERA_PERMISSION: &str = "camera_permission";
const CHECK_CAMERA_AVAILABLE: &str = "camera_available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreflightCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
}

/// Why the environment cannot capture. Each reason carries a remediation hint.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum PreflightFailure {
    #[error("page is not served from a secure context")]
    InsecureContext,
    #[error("media capture API is not supported")]
    UnsupportedApi,
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NoDeviceFound,
    #[error("camera in use by another application")]
    DeviceInUse,
    #[error("camera check failed: {0}")]
    Unknown(String),
}

impl PreflightFailure {
    pub fn remediation(&self) -> &'static str {
        match self {
            PreflightFailure::InsecureContext => "Open the app over HTTPS or from localhost.",
            PreflightFailure::UnsupportedApi => {
                "This browser cannot access the camera. Use an up-to-date browser."
            }
            PreflightFailure::PermissionDenied => {
                "Allow camera access from the camera icon in the address bar, then try again."
            }
            PreflightFailure::NoDeviceFound => "Connect a camera and try again.",
            PreflightFailure::DeviceInUse => {
                "Close other applications that are using the camera, then try again."
            }
            PreflightFailure::Unknown(_) => "Reload the page and try again.",
        }
    }
}

impl From<StreamError> for PreflightFailure {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::PermissionDenied => PreflightFailure::PermissionDenied,
            StreamError::NotFound => PreflightFailure::NoDeviceFound,
            StreamError::InUse => PreflightFailure::DeviceInUse,
            other => PreflightFailure::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreflightReport {
    pub checks: Vec<PreflightCheck>,
    failure: Option<PreflightFailure>,
}

impl PreflightReport {
    pub fn ok(&self) -> bool {
        self.failure.is_none()
    }

    /// The first failing reason, if any check failed.
    pub fn failure(&self) -> Option<PreflightFailure> {
        self.failure.clone()
    }
}

struct ReportBuilder {
    checks: Vec<PreflightCheck>,
    failure: Option<PreflightFailure>,
}

impl ReportBuilder {
    fn pass(&mut self, name: &'static str, message: &str) {
        self.push(name, CheckStatus::Pass, message.to_string());
    }

    fn skip(&mut self, name: &'static str) {
        self.push(name, CheckStatus::Skipped, "not tested".to_string());
    }

    fn fail(&mut self, name: &'static str, failure: PreflightFailure) {
        self.push(name, CheckStatus::Fail, failure.to_string());
        self.failure.get_or_insert(failure);
    }

    fn push(&mut self, name: &'static str, status: CheckStatus, message: String) {
        tracing::debug!(check = name, ?status, %message, "preflight check");
        self.checks.push(PreflightCheck {
            name,
            status,
            message,
        });
    }
}

/// Check the secure context, the media API, and test the camera by acquiring
/// and immediately releasing a throwaway stream.
pub async fn run_preflight(
    platform: &dyn MediaPlatform,
    constraints: StreamConstraints,
) -> PreflightReport {
    let mut report = ReportBuilder {
        checks: Vec::with_capacity(4),
        failure: None,
    };

    if platform.is_secure_context() {
        report.pass(CHECK_SECURE_CONTEXT, "secure context");
    } else {
        report.fail(CHECK_SECURE_CONTEXT, PreflightFailure::InsecureContext);
    }

    if platform.has_media_devices() {
        report.pass(CHECK_MEDIA_DEVICES, "media capture API available");
    } else {
        report.fail(CHECK_MEDIA_DEVICES, PreflightFailure::UnsupportedApi);
    }

    if report.failure.is_some() {
        report.skip(CHECK_CAMERA_PERMISSION);
        report.skip(CHECK_CAMERA_AVAILABLE);
    } else {
        let trial = match platform.request_stream(constraints).await {
            Err(StreamError::Overconstrained) => {
                platform.request_stream(StreamConstraints::Unconstrained).await
            }
            other => other,
        };
        match trial {
            Ok(stream) => {
                StreamGuard::new(stream).release();
                report.pass(CHECK_CAMERA_PERMISSION, "camera permission granted");
                report.pass(CHECK_CAMERA_AVAILABLE, "camera available");
            }
            Err(StreamError::PermissionDenied) => {
                report.fail(CHECK_CAMERA_PERMISSION, PreflightFailure::PermissionDenied);
                report.skip(CHECK_CAMERA_AVAILABLE);
            }
            Err(StreamError::NotFound) => {
                report.pass(CHECK_CAMERA_PERMISSION, "camera permission granted");
                report.fail(CHECK_CAMERA_AVAILABLE, PreflightFailure::NoDeviceFound);
            }
            Err(e) => {
                report.skip(CHECK_CAMERA_PERMISSION);
                report.fail(CHECK_CAMERA_AVAILABLE, e.into());
            }
        }
    }

    if let Some(failure) = &report.failure {
        tracing::warn!(%failure, hint = failure.remediation(), "preflight failed");
    } else {
        tracing::info!("preflight passed");
    }

    PreflightReport {
        checks: report.checks,
        failure: report.failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakePlatform;

    const PREFERRED: StreamConstraints = StreamConstraints::Preferred {
        width: 1280,
        height: 720,
    };

    fn status_of(report: &PreflightReport, name: &str) -> CheckStatus {
        report
            .checks
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.status)
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_checks_pass_and_trial_stream_is_released() {
        let platform = FakePlatform::new();
        let report = run_preflight(&platform, PREFERRED).await;
        assert!(report.ok());
        assert_eq!(report.checks.len(), 4);
        assert_eq!(platform.live_tracks(), 0);
        assert_eq!(platform.acquisitions(), 1);
    }

    #[tokio::test]
    async fn test_insecure_context_skips_camera_check() {
        let platform = FakePlatform::new();
        platform.script().secure_context = false;
        let report = run_preflight(&platform, PREFERRED).await;
        assert_eq!(report.failure(), Some(PreflightFailure::InsecureContext));
        assert_eq!(status_of(&report, CHECK_CAMERA_PERMISSION), CheckStatus::Skipped);
        assert_eq!(platform.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_missing_api() {
        let platform = FakePlatform::new();
        platform.script().media_devices = false;
        let report = run_preflight(&platform, PREFERRED).await;
        assert_eq!(report.failure(), Some(PreflightFailure::UnsupportedApi));
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let platform = FakePlatform::new();
        platform.script().stream_errors.push_back(StreamError::PermissionDenied);
        let report = run_preflight(&platform, PREFERRED).await;
        assert_eq!(report.failure(), Some(PreflightFailure::PermissionDenied));
        assert_eq!(status_of(&report, CHECK_CAMERA_PERMISSION), CheckStatus::Fail);
    }

    #[tokio::test]
    async fn test_no_device() {
        let platform = FakePlatform::new();
        platform.script().stream_errors.push_back(StreamError::NotFound);
        let report = run_preflight(&platform, PREFERRED).await;
        assert_eq!(report.failure(), Some(PreflightFailure::NoDeviceFound));
        assert_eq!(status_of(&report, CHECK_CAMERA_AVAILABLE), CheckStatus::Fail);
    }

    #[tokio::test]
    async fn test_overconstrained_trial_retries_unconstrained() {
        let platform = FakePlatform::new();
        platform.script().stream_errors.push_back(StreamError::Overconstrained);
        let report = run_preflight(&platform, PREFERRED).await;
        assert!(report.ok());
        assert_eq!(
            platform.script().requests,
            vec![PREFERRED, StreamConstraints::Unconstrained]
        );
    }

    #[test]
    fn test_every_failure_has_remediation() {
        for failure in [
            PreflightFailure::InsecureContext,
            PreflightFailure::UnsupportedApi,
            PreflightFailure::PermissionDenied,
            PreflightFailure::NoDeviceFound,
            PreflightFailure::DeviceInUse,
            PreflightFailure::Unknown("x".into()),
        ] {
            assert!(!failure.remediation().is_empty());
        }
    }
}
