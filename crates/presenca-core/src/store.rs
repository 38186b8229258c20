//! The external record store, seen through the queries the attendance core needs.

use crate::descriptor::FaceDescriptor;
use crate::types::{AttendanceEvent, NewAttendance, Profile, ProfileId, SchoolLocation};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (e.g. second check-in today).
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("not found: {0}")]
    NotFound(String),
    /// A reference or check constraint rejected the write.
    #[error("rejected: {0}")]
    Invalid(String),
    #[error("store backend: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_profile(&self, id: ProfileId) -> Result<Profile, StoreError>;

    /// The configured school geofence, if an administrator has set one.
    async fn fetch_school_location(&self) -> Result<Option<SchoolLocation>, StoreError>;

    /// Replace (never merge) the profile's reference descriptor.
    async fn upsert_reference_descriptor(
        &self,
        id: ProfileId,
        descriptor: &FaceDescriptor,
    ) -> Result<(), StoreError>;

    /// Persist one check-in. A second insert for the same profile and day
    /// must fail with [`StoreError::UniqueViolation`].
    async fn insert_attendance(
        &self,
        record: &NewAttendance,
    ) -> Result<AttendanceEvent, StoreError>;

    /// All check-ins for one profile, newest first.
    async fn attendance_history(&self, id: ProfileId) -> Result<Vec<AttendanceEvent>, StoreError>;

    /// Every check-in recorded on `date` (teacher roll).
    async fn attendance_on(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>, StoreError>;

    /// The profile's check-in for `date`, if any.
    async fn attendance_for_day(
        &self,
        id: ProfileId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        Ok(self
            .attendance_history(id)
            .await?
            .into_iter()
            .find(|event| event.attendance_date == date))
    }
}
