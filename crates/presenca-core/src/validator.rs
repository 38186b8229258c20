//! Turns a matched face and a device position into a persisted check-in.

use crate::geo::Coordinate;
use crate::matcher::MatchResult;
use crate::store::{RecordStore, StoreError};
use crate::types::{AttendanceEvent, NewAttendance, ProfileId, SchoolLocation};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("face was not matched; attendance cannot be validated")]
    FaceNotMatched,
    #[error("school location is not configured")]
    SchoolLocationMissing,
    #[error("attendance already recorded today")]
    AlreadyCheckedInToday,
    #[error("failed to persist attendance: {0}")]
    Persistence(StoreError),
}

/// Distance from a position to the school and whether it lies inside the fence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceCheck {
    pub distance_meters: f64,
    pub is_valid: bool,
}

/// Evaluate `position` against the school geofence. The boundary counts as inside.
pub fn evaluate_geofence(position: &Coordinate, school: &SchoolLocation) -> GeofenceCheck {
    let distance_meters = position.distance_to(&school.center);
    GeofenceCheck {
        distance_meters,
        is_valid: distance_meters <= school.radius_meters,
    }
}

/// A recorded check-in plus the geofence it was judged against.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub event: AttendanceEvent,
    pub radius_meters: f64,
}

impl Validated {
    pub fn within_geofence(&self) -> bool {
        self.event.is_valid
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AttendanceValidator;

impl AttendanceValidator {
    /// Compute validity and record the attendance.
    ///
    /// An out-of-range position is still recorded, flagged `is_valid = false`.
    /// A duplicate for the same day is reported as
    /// [`ValidationError::AlreadyCheckedInToday`] and must not be retried.
    pub async fn validate(
        &self,
        profile_id: ProfileId,
        match_result: &MatchResult,
        position: Coordinate,
        school: Option<&SchoolLocation>,
        store: &dyn RecordStore,
    ) -> Result<Validated, ValidationError> {
        if !match_result.matched {
            return Err(ValidationError::FaceNotMatched);
        }
        let school = school.ok_or(ValidationError::SchoolLocationMissing)?;

        let check = evaluate_geofence(&position, school);
        tracing::info!(
            profile = %profile_id,
            distance_m = check.distance_meters,
            radius_m = school.radius_meters,
            valid = check.is_valid,
            "geofence evaluated"
        );

        let record = NewAttendance {
            profile_id,
            position,
            is_valid: check.is_valid,
            distance_meters: check.distance_meters,
        };

        match store.insert_attendance(&record).await {
            Ok(event) => Ok(Validated {
                event,
                radius_meters: school.radius_meters,
            }),
            Err(StoreError::UniqueViolation) => {
                tracing::info!(profile = %profile_id, "duplicate check-in for today");
                Err(ValidationError::AlreadyCheckedInToday)
            }
            Err(e) => {
                tracing::warn!(profile = %profile_id, error = %e, "attendance insert failed");
                Err(ValidationError::Persistence(e))
            }
        }
    }
}
