//! presenca-core — Attendance validation engine.
//!
//! Haversine geofencing, 128-dimensional face descriptor matching, and the
//! validator that turns a matched face plus a device position into an
//! attendance record. Storage and the embedding library are reached through
//! the traits in [`store`] and [`matcher`].

pub mod descriptor;
pub mod geo;
pub mod matcher;
pub mod store;
pub mod types;
pub mod validator;

pub use descriptor::{DescriptorError, FaceDescriptor, DESCRIPTOR_LEN};
pub use geo::{distance_meters, Coordinate, GeoError, EARTH_RADIUS_METERS};
pub use matcher::{
    extract_descriptor, Detection, EmbedderError, EuclideanMatcher, ExtractError, FaceEmbedder,
    Frame, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD,
};
pub use store::{RecordStore, StoreError};
pub use types::{
    AttendanceEvent, Class, ClassError, ClassId, LocationError, NewAttendance, Profile,
    ProfileError, ProfileId, Role, RosterSummary, SchoolLocation,
};
pub use validator::{
    evaluate_geofence, AttendanceValidator, GeofenceCheck, Validated, ValidationError,
};
