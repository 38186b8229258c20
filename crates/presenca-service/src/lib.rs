//! presenca-service — Attendance flows on top of the capture session.
//!
//! [`flow::RegistrationFlow`] stores a reference descriptor for a profile;
//! [`flow::VerificationFlow`] matches a live face, locates the device and
//! records the check-in. Every failure is folded into a user-facing outcome.

pub mod config;
pub mod flow;
pub mod geolocation;
pub mod sqlite_store;

pub use config::Config;
pub use flow::{
    RegistrationFlow, RegistrationOutcome, Severity, VerificationFlow, VerificationOutcome,
};
pub use geolocation::{FixedGeolocator, Geolocator, LocationFailure};
pub use sqlite_store::SqliteStore;
