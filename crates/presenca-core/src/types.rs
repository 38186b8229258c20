use crate::descriptor::FaceDescriptor;
use crate::geo::Coordinate;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Smallest geofence radius an administrator may configure.
pub const MIN_RADIUS_METERS: f64 = 50.0;
/// Largest geofence radius an administrator may configure.
pub const MAX_RADIUS_METERS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ProfileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub Uuid);

impl ClassId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClassId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ClassId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(ProfileError::UnknownRole(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("name must be 3-100 characters of letters, spaces, apostrophes or hyphens")]
    InvalidName,
    #[error("registration number must be 4-20 ASCII letters or digits")]
    InvalidRegistrationNumber,
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// Identity record. Holds at most one live reference descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub full_name: String,
    pub registration_number: String,
    pub role: Role,
    pub class_id: Option<ClassId>,
    pub face_descriptor: Option<FaceDescriptor>,
}

impl Profile {
    /// Create a profile with validated name and registration number and no descriptor.
    pub fn new(
        full_name: &str,
        registration_number: &str,
        role: Role,
        class_id: Option<ClassId>,
    ) -> Result<Self, ProfileError> {
        let full_name = validate_full_name(full_name)?;
        let registration_number = validate_registration_number(registration_number)?;
        Ok(Self {
            id: ProfileId::new(),
            full_name,
            registration_number,
            role,
            class_id,
            face_descriptor: None,
        })
    }

    pub fn is_registered(&self) -> bool {
        self.face_descriptor.is_some()
    }
}

/// Trim and check a display name.
pub fn validate_full_name(name: &str) -> Result<String, ProfileError> {
    let name = name.trim();
    let len = name.chars().count();
    let allowed = |c: char| c.is_alphabetic() || c == ' ' || c == '\'' || c == '-';
    if !(3..=100).contains(&len) || !name.chars().all(allowed) {
        return Err(ProfileError::InvalidName);
    }
    Ok(name.to_string())
}

/// Trim and check a school registration number.
pub fn validate_registration_number(number: &str) -> Result<String, ProfileError> {
    let number = number.trim();
    if !(4..=20).contains(&number.len()) || !number.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProfileError::InvalidRegistrationNumber);
    }
    Ok(number.to_string())
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("school name must not be empty")]
    EmptyName,
    #[error("radius {0} m outside [{MIN_RADIUS_METERS}, {MAX_RADIUS_METERS}]")]
    RadiusOutOfRange(f64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassError {
    #[error("class name must not be empty")]
    EmptyName,
    #[error("class name must be at most 100 characters")]
    NameTooLong,
}

/// A school class (turma). Students point at one through `class_id`;
/// teachers are linked to any number through assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub description: Option<String>,
}

impl Class {
    /// Blank descriptions are stored as `None`.
    pub fn new(name: &str, description: Option<&str>) -> Result<Self, ClassError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClassError::EmptyName);
        }
        if name.chars().count() > 100 {
            return Err(ClassError::NameTooLong);
        }
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        Ok(Self {
            id: ClassId::new(),
            name: name.to_string(),
            description,
        })
    }
}

/// Dashboard counters for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RosterSummary {
    pub students: usize,
    pub teachers: usize,
    pub classes: usize,
    /// Check-ins recorded on the day, inside or outside the geofence.
    pub present: usize,
    /// Check-ins recorded inside the geofence.
    pub valid: usize,
}

/// The single configured school geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolLocation {
    pub name: String,
    pub center: Coordinate,
    pub radius_meters: f64,
}

impl SchoolLocation {
    pub fn new(name: &str, center: Coordinate, radius_meters: f64) -> Result<Self, LocationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LocationError::EmptyName);
        }
        if !radius_meters.is_finite()
            || !(MIN_RADIUS_METERS..=MAX_RADIUS_METERS).contains(&radius_meters)
        {
            return Err(LocationError::RadiusOutOfRange(radius_meters));
        }
        Ok(Self {
            name: name.to_string(),
            center,
            radius_meters,
        })
    }
}

/// Insert payload for one check-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAttendance {
    pub profile_id: ProfileId,
    pub position: Coordinate,
    pub is_valid: bool,
    pub distance_meters: f64,
}

/// A persisted check-in. At most one per profile per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: Uuid,
    pub profile_id: ProfileId,
    pub position: Coordinate,
    pub is_valid: bool,
    pub distance_meters: f64,
    pub attendance_date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sao_paulo() -> Coordinate {
        Coordinate::new(-23.5505, -46.6333).unwrap()
    }

    #[test]
    fn test_radius_bounds_inclusive() {
        assert!(SchoolLocation::new("Escola", sao_paulo(), 50.0).is_ok());
        assert!(SchoolLocation::new("Escola", sao_paulo(), 1000.0).is_ok());
        assert_eq!(
            SchoolLocation::new("Escola", sao_paulo(), 49.9),
            Err(LocationError::RadiusOutOfRange(49.9))
        );
        assert_eq!(
            SchoolLocation::new("Escola", sao_paulo(), 1000.1),
            Err(LocationError::RadiusOutOfRange(1000.1))
        );
    }

    #[test]
    fn test_location_requires_name() {
        assert_eq!(
            SchoolLocation::new("  ", sao_paulo(), 200.0),
            Err(LocationError::EmptyName)
        );
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(validate_full_name("  Ana Clara  ").unwrap(), "Ana Clara");
        assert!(validate_full_name("João D'Ávila-Souza").is_ok());
        assert_eq!(validate_full_name("Al"), Err(ProfileError::InvalidName));
        assert_eq!(validate_full_name("R2D2 Unit"), Err(ProfileError::InvalidName));
    }

    #[test]
    fn test_registration_number_validation() {
        assert_eq!(validate_registration_number(" 2024A01 ").unwrap(), "2024A01");
        assert!(validate_registration_number("123").is_err());
        assert!(validate_registration_number("2024-01").is_err());
        assert!(validate_registration_number(&"9".repeat(21)).is_err());
    }

    #[test]
    fn test_class_name_required_and_blank_description_dropped() {
        let class = Class::new("  3º Ano B ", Some("   ")).unwrap();
        assert_eq!(class.name, "3º Ano B");
        assert_eq!(class.description, None);
        assert_eq!(Class::new(" ", None), Err(ClassError::EmptyName));
        assert_eq!(Class::new(&"x".repeat(101), None), Err(ClassError::NameTooLong));
        let id = class.id;
        assert_eq!(id.to_string().parse::<ClassId>().unwrap(), id);
    }

    #[test]
    fn test_new_profile_is_unregistered() {
        let p = Profile::new("Maria Silva", "RA1234", Role::Student, None).unwrap();
        assert!(!p.is_registered());
        assert_eq!(p.role.as_str(), "student");
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
    }
}
