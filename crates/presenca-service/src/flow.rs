//! Registration and verification flows.
//!
//! Both flows drive a [`CaptureSession`] to a descriptor and then talk to the
//! record store. Every error kind is recovered here and returned as an
//! outcome; nothing propagates to the caller as an `Err`.

use crate::geolocation::{Geolocator, LocationFailure};
use presenca_capture::{
    CaptureDevice, CaptureOutcome, CaptureSession, SessionError, SessionState,
};
use presenca_core::{
    AttendanceEvent, AttendanceValidator, EuclideanMatcher, FaceDescriptor, Matcher, ProfileId,
    RecordStore, StoreError, ValidationError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How an outcome should be presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Info,
    Error,
}

/// Drive `session` to one capture attempt, starting it first if needed.
async fn capture_descriptor(
    session: &mut CaptureSession,
) -> Result<Option<FaceDescriptor>, SessionError> {
    if session.state() == SessionState::Idle {
        session.start().await?;
    }
    match session.capture().await? {
        CaptureOutcome::Captured(descriptor) => Ok(Some(descriptor)),
        CaptureOutcome::NoFace => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Registered,
    /// No single face in the frame; the session is still ready.
    NoFace,
    Capture(SessionError),
    Cancelled,
    Persistence(String),
}

impl RegistrationOutcome {
    pub fn severity(&self) -> Severity {
        match self {
            RegistrationOutcome::Registered => Severity::Success,
            RegistrationOutcome::NoFace | RegistrationOutcome::Cancelled => Severity::Info,
            RegistrationOutcome::Capture(_) | RegistrationOutcome::Persistence(_) => {
                Severity::Error
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            RegistrationOutcome::Registered => "Face registered.".to_string(),
            RegistrationOutcome::NoFace => {
                "No face detected. Center your face in the frame and try again.".to_string()
            }
            RegistrationOutcome::Capture(e) => capture_message(e),
            RegistrationOutcome::Cancelled => "Registration cancelled.".to_string(),
            RegistrationOutcome::Persistence(e) => format!("Could not save your face: {e}"),
        }
    }
}

/// Captures a face and stores it as the profile's reference descriptor.
pub struct RegistrationFlow {
    store: Arc<dyn RecordStore>,
}

impl RegistrationFlow {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Open a fresh session on `device` and register from it. Calling this
    /// again after any outcome is a retry.
    pub async fn run(&self, profile_id: ProfileId, device: &CaptureDevice) -> RegistrationOutcome {
        match device.open_session() {
            Ok(mut session) => self.run_on(profile_id, &mut session).await,
            Err(e) => RegistrationOutcome::Capture(e),
        }
    }

    /// Register from a caller-owned session. After `NoFace` the session is
    /// still `Ready` and can be passed in again; any other outcome spends it.
    pub async fn run_on(
        &self,
        profile_id: ProfileId,
        session: &mut CaptureSession,
    ) -> RegistrationOutcome {
        let descriptor = match capture_descriptor(session).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => return RegistrationOutcome::NoFace,
            Err(SessionError::Cancelled) => return RegistrationOutcome::Cancelled,
            Err(e) => return RegistrationOutcome::Capture(e),
        };

        let outcome = match self
            .store
            .upsert_reference_descriptor(profile_id, &descriptor)
            .await
        {
            Ok(()) => RegistrationOutcome::Registered,
            Err(e) => RegistrationOutcome::Persistence(e.to_string()),
        };
        tracing::info!(profile = %profile_id, outcome = ?outcome, "registration finished");
        outcome
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    CheckedIn { event: AttendanceEvent },
    /// Recorded, but flagged invalid: the device was outside the geofence.
    OutOfRange {
        event: AttendanceEvent,
        radius_meters: f64,
    },
    AlreadyCheckedIn,
    /// The profile has no reference descriptor; run registration first.
    NotRegistered,
    FaceRejected { confidence: f32 },
    NoFace,
    LocationUnavailable(LocationFailure),
    SchoolLocationMissing,
    Capture(SessionError),
    Cancelled,
    Persistence(String),
}

impl VerificationOutcome {
    /// Whether the user may simply try again. A retry needs a session that is
    /// still `Ready` (after `NoFace`) or a new one, which
    /// [`VerificationFlow::run`] opens on every call.
    pub fn is_retryable(&self) -> bool {
        match self {
            VerificationOutcome::FaceRejected { .. }
            | VerificationOutcome::NoFace
            | VerificationOutcome::LocationUnavailable(_)
            | VerificationOutcome::Cancelled
            | VerificationOutcome::Persistence(_) => true,
            VerificationOutcome::Capture(SessionError::Failed(_)) => true,
            VerificationOutcome::CheckedIn { .. }
            | VerificationOutcome::OutOfRange { .. }
            | VerificationOutcome::AlreadyCheckedIn
            | VerificationOutcome::NotRegistered
            | VerificationOutcome::SchoolLocationMissing
            | VerificationOutcome::Capture(_) => false,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            VerificationOutcome::CheckedIn { .. } => Severity::Success,
            VerificationOutcome::OutOfRange { .. } => Severity::Warning,
            VerificationOutcome::AlreadyCheckedIn
            | VerificationOutcome::NoFace
            | VerificationOutcome::Cancelled => Severity::Info,
            VerificationOutcome::NotRegistered
            | VerificationOutcome::FaceRejected { .. }
            | VerificationOutcome::LocationUnavailable(_)
            | VerificationOutcome::SchoolLocationMissing
            | VerificationOutcome::Capture(_)
            | VerificationOutcome::Persistence(_) => Severity::Error,
        }
    }

    pub fn message(&self) -> String {
        match self {
            VerificationOutcome::CheckedIn { .. } => "Attendance recorded.".to_string(),
            VerificationOutcome::OutOfRange { event, radius_meters } => format!(
                "Attendance recorded, but you are {:.0} m from the school (maximum {:.0} m).",
                event.distance_meters.round(),
                radius_meters
            ),
            VerificationOutcome::AlreadyCheckedIn => {
                "You have already checked in today.".to_string()
            }
            VerificationOutcome::NotRegistered => {
                "Your face is not registered yet. Register it before checking in.".to_string()
            }
            VerificationOutcome::FaceRejected { confidence } => format!(
                "Face not recognized (confidence {confidence:.2}). Try again with better lighting."
            ),
            VerificationOutcome::NoFace => "No face detected. Try again.".to_string(),
            VerificationOutcome::LocationUnavailable(reason) => {
                format!("Could not get your location ({reason}). Check location permissions.")
            }
            VerificationOutcome::SchoolLocationMissing => {
                "The school location is not configured. Contact an administrator.".to_string()
            }
            VerificationOutcome::Capture(e) => capture_message(e),
            VerificationOutcome::Cancelled => "Check-in cancelled.".to_string(),
            VerificationOutcome::Persistence(e) => format!("Could not record attendance: {e}"),
        }
    }
}

fn capture_message(e: &SessionError) -> String {
    match e {
        SessionError::Failed(presenca_capture::SessionFailure::Preflight(reason)) => {
            format!("{reason}. {}", reason.remediation())
        }
        other => other.to_string(),
    }
}

/// Matches a live face against the stored reference, locates the device,
/// and records the check-in.
pub struct VerificationFlow {
    store: Arc<dyn RecordStore>,
    geolocator: Arc<dyn Geolocator>,
    matcher: EuclideanMatcher,
    validator: AttendanceValidator,
    geolocation_timeout: Duration,
}

impl VerificationFlow {
    pub fn new(
        store: Arc<dyn RecordStore>,
        geolocator: Arc<dyn Geolocator>,
        matcher: EuclideanMatcher,
        geolocation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            geolocator,
            matcher,
            validator: AttendanceValidator,
            geolocation_timeout,
        }
    }

    /// Open a fresh session on `device` and verify from it. Retryable
    /// outcomes are retried by calling this again.
    pub async fn run(&self, profile_id: ProfileId, device: &CaptureDevice) -> VerificationOutcome {
        match device.open_session() {
            Ok(mut session) => self.run_on(profile_id, &mut session).await,
            Err(e) => {
                let outcome = VerificationOutcome::Capture(e);
                tracing::warn!(profile = %profile_id, outcome = ?outcome, "verification finished");
                outcome
            }
        }
    }

    /// Verify from a caller-owned session. Only `NoFace` leaves it `Ready`
    /// for another attempt; after any other outcome use a new session.
    pub async fn run_on(
        &self,
        profile_id: ProfileId,
        session: &mut CaptureSession,
    ) -> VerificationOutcome {
        let outcome = self.verify(profile_id, session).await;
        match outcome.severity() {
            Severity::Error => {
                tracing::warn!(profile = %profile_id, outcome = ?outcome, "verification finished")
            }
            _ => tracing::info!(profile = %profile_id, outcome = ?outcome, "verification finished"),
        }
        outcome
    }

    async fn verify(
        &self,
        profile_id: ProfileId,
        session: &mut CaptureSession,
    ) -> VerificationOutcome {
        let live = match capture_descriptor(session).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => return VerificationOutcome::NoFace,
            Err(SessionError::Cancelled) => return VerificationOutcome::Cancelled,
            Err(e) => return VerificationOutcome::Capture(e),
        };

        let profile = match self.store.fetch_profile(profile_id).await {
            Ok(profile) => profile,
            Err(e) => return VerificationOutcome::Persistence(e.to_string()),
        };
        let Some(reference) = profile.face_descriptor else {
            return VerificationOutcome::NotRegistered;
        };

        let result = self.matcher.evaluate(&live, &reference);
        tracing::debug!(
            profile = %profile_id,
            distance = result.distance_score,
            threshold = self.matcher.threshold(),
            "face compared"
        );
        if !result.matched {
            return VerificationOutcome::FaceRejected {
                confidence: result.confidence,
            };
        }

        // The position request and the geofence lookup are independent.
        let (position, school) = tokio::join!(
            tokio::time::timeout(self.geolocation_timeout, self.geolocator.current_position()),
            self.store.fetch_school_location()
        );
        let position = match position {
            Ok(Ok(position)) => position,
            Ok(Err(reason)) => return VerificationOutcome::LocationUnavailable(reason),
            Err(_) => return VerificationOutcome::LocationUnavailable(LocationFailure::Timeout),
        };
        let school = match school {
            Ok(school) => school,
            Err(e) => return VerificationOutcome::Persistence(e.to_string()),
        };

        match self
            .validator
            .validate(profile_id, &result, position, school.as_ref(), self.store.as_ref())
            .await
        {
            Ok(validated) if validated.within_geofence() => VerificationOutcome::CheckedIn {
                event: validated.event,
            },
            Ok(validated) => VerificationOutcome::OutOfRange {
                radius_meters: validated.radius_meters,
                event: validated.event,
            },
            Err(ValidationError::AlreadyCheckedInToday) => VerificationOutcome::AlreadyCheckedIn,
            Err(ValidationError::SchoolLocationMissing) => {
                VerificationOutcome::SchoolLocationMissing
            }
            Err(ValidationError::FaceNotMatched) => VerificationOutcome::FaceRejected {
                confidence: result.confidence,
            },
            Err(ValidationError::Persistence(StoreError::NotFound(what))) => {
                VerificationOutcome::Persistence(format!("not found: {what}"))
            }
            Err(ValidationError::Persistence(e)) => VerificationOutcome::Persistence(e.to_string()),
        }
    }
}
