//! SQLite-backed [`RecordStore`].
//!
//! One database file holds classes, profiles, teacher assignments, the
//! singleton school geofence and check-ins. The schema enforces the
//! invariants the flows rely on: one attendance per profile per calendar
//! day, and a radius within [`MIN_RADIUS_METERS`]..=[`MAX_RADIUS_METERS`].

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use presenca_core::types::{MAX_RADIUS_METERS, MIN_RADIUS_METERS};
use presenca_core::{
    AttendanceEvent, Class, ClassId, Coordinate, FaceDescriptor, NewAttendance, Profile,
    ProfileId, RecordStore, Role, RosterSummary, SchoolLocation, StoreError,
};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use tokio_rusqlite::Connection;
use uuid::Uuid;

const SCHEMA_VERSION: u32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS classes (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    id                  TEXT PRIMARY KEY,
    full_name           TEXT NOT NULL,
    registration_number TEXT NOT NULL UNIQUE,
    role                TEXT NOT NULL,
    class_id            TEXT REFERENCES classes(id) ON DELETE SET NULL,
    face_descriptor     TEXT,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS teacher_classes (
    teacher_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    class_id   TEXT NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    PRIMARY KEY (teacher_id, class_id)
);

CREATE TABLE IF NOT EXISTS school_location (
    id            INTEGER PRIMARY KEY CHECK (id = 1),
    name          TEXT NOT NULL,
    latitude      REAL NOT NULL,
    longitude     REAL NOT NULL,
    radius_meters REAL NOT NULL CHECK (radius_meters BETWEEN 50 AND 1000),
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendances (
    id              TEXT PRIMARY KEY,
    profile_id      TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    latitude        REAL NOT NULL,
    longitude       REAL NOT NULL,
    is_valid        INTEGER NOT NULL,
    distance_meters REAL NOT NULL,
    attendance_date TEXT NOT NULL,
    recorded_at     TEXT NOT NULL,
    UNIQUE (profile_id, attendance_date)
);

CREATE INDEX IF NOT EXISTS idx_attendances_date ON attendances(attendance_date);
";

const PROFILE_COLUMNS: &str =
    "id, full_name, registration_number, role, class_id, face_descriptor";

const CLASS_COLUMNS: &str = "id, name, description";

const ATTENDANCE_COLUMNS: &str = "id, profile_id, latitude, longitude, is_valid, \
     distance_meters, attendance_date, recorded_at";

/// Profile row as stored; decoded outside the connection thread.
struct ProfileRow {
    id: String,
    full_name: String,
    registration_number: String,
    role: String,
    class_id: Option<String>,
    face_descriptor: Option<String>,
}

impl ProfileRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            full_name: row.get(1)?,
            registration_number: row.get(2)?,
            role: row.get(3)?,
            class_id: row.get(4)?,
            face_descriptor: row.get(5)?,
        })
    }

    fn decode(self) -> Result<Profile, StoreError> {
        let face_descriptor = self
            .face_descriptor
            .map(|json| serde_json::from_str::<FaceDescriptor>(&json))
            .transpose()
            .map_err(|e| corrupt("face_descriptor", e))?;
        Ok(Profile {
            id: ProfileId(parse_uuid(&self.id)?),
            full_name: self.full_name,
            registration_number: self.registration_number,
            role: Role::from_str(&self.role).map_err(|e| corrupt("role", e))?,
            class_id: self
                .class_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(ClassId),
            face_descriptor,
        })
    }
}

struct ClassRow {
    id: String,
    name: String,
    description: Option<String>,
}

impl ClassRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        })
    }

    fn decode(self) -> Result<Class, StoreError> {
        Ok(Class {
            id: ClassId(parse_uuid(&self.id)?),
            name: self.name,
            description: self.description,
        })
    }
}

struct AttendanceRow {
    id: String,
    profile_id: String,
    latitude: f64,
    longitude: f64,
    is_valid: bool,
    distance_meters: f64,
    attendance_date: String,
    recorded_at: String,
}

impl AttendanceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            profile_id: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            is_valid: row.get(4)?,
            distance_meters: row.get(5)?,
            attendance_date: row.get(6)?,
            recorded_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<AttendanceEvent, StoreError> {
        Ok(AttendanceEvent {
            id: parse_uuid(&self.id)?,
            profile_id: ProfileId(parse_uuid(&self.profile_id)?),
            position: Coordinate::new(self.latitude, self.longitude)
                .map_err(|e| corrupt("position", e))?,
            is_valid: self.is_valid,
            distance_meters: self.distance_meters,
            attendance_date: NaiveDate::from_str(&self.attendance_date)
                .map_err(|e| corrupt("attendance_date", e))?,
            recorded_at: DateTime::parse_from_rfc3339(&self.recorded_at)
                .map_err(|e| corrupt("recorded_at", e))?
                .with_timezone(&Utc),
        })
    }
}

fn corrupt(column: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {column}: {e}"))
}

fn parse_uuid(text: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(text).map_err(|e| corrupt("id", e))
}

fn map_err(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, _))
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::UniqueViolation
        }
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, msg))
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK =>
        {
            StoreError::Invalid(msg.unwrap_or_else(|| code.to_string()))
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn decode_all<R, T>(
    rows: Vec<R>,
    decode: fn(R) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    rows.into_iter().map(decode).collect()
}

fn count(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<usize> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(usize::try_from(n).unwrap_or_default())
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(&path).await.map_err(map_err)?;
        let store = Self::bootstrap(conn).await?;
        tracing::info!(path = %path.display(), "record store opened");
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(map_err)?;
        Self::bootstrap(conn).await
    }

    async fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        let version = conn
            .call(|conn| {
                conn.pragma_update(None, "foreign_keys", true)?;
                let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
                if current < SCHEMA_VERSION {
                    let tx = conn.transaction()?;
                    tx.execute_batch(SCHEMA_V1)?;
                    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
                    tx.commit()?;
                }
                Ok(current)
            })
            .await
            .map_err(map_err)?;
        if version > SCHEMA_VERSION {
            return Err(StoreError::Backend(format!(
                "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }
        tracing::debug!(from = version, to = SCHEMA_VERSION, "schema ready");
        Ok(Self { conn })
    }

    /// Insert a new profile. A duplicate registration number is a
    /// [`StoreError::UniqueViolation`]; an unknown class is
    /// [`StoreError::Invalid`].
    pub async fn create_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let descriptor = profile
            .face_descriptor
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let id = profile.id.to_string();
        let full_name = profile.full_name.clone();
        let registration_number = profile.registration_number.clone();
        let role = profile.role.as_str();
        let class_id = profile.class_id.map(|c| c.0.to_string());
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO profiles (id, full_name, registration_number, role, \
                     class_id, face_descriptor, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id,
                        full_name,
                        registration_number,
                        role,
                        class_id,
                        descriptor,
                        now
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_err)?;
        tracing::info!(profile = %profile.id, role = profile.role.as_str(), "profile created");
        Ok(())
    }

    pub async fn find_profile_by_registration(
        &self,
        registration_number: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let number = registration_number.trim().to_string();
        let row = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles WHERE registration_number = ?1"
                );
                Ok(conn
                    .query_row(&sql, params![number], ProfileRow::from_row)
                    .optional()?)
            })
            .await
            .map_err(map_err)?;
        row.map(ProfileRow::decode).transpose()
    }

    /// All profiles, ordered by name.
    pub async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let sql =
                    format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY full_name, id");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], ProfileRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_err)?;
        decode_all(rows, ProfileRow::decode)
    }

    /// Create or replace the school geofence.
    pub async fn set_school_location(&self, location: &SchoolLocation) -> Result<(), StoreError> {
        if !(MIN_RADIUS_METERS..=MAX_RADIUS_METERS).contains(&location.radius_meters) {
            return Err(StoreError::Invalid(format!(
                "radius {} m outside {MIN_RADIUS_METERS}..={MAX_RADIUS_METERS} m",
                location.radius_meters
            )));
        }
        let name = location.name.clone();
        let latitude = location.center.latitude();
        let longitude = location.center.longitude();
        let radius = location.radius_meters;
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO school_location \
                     (id, name, latitude, longitude, radius_meters, updated_at) \
                     VALUES (1, ?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
                     latitude = excluded.latitude, longitude = excluded.longitude, \
                     radius_meters = excluded.radius_meters, updated_at = excluded.updated_at",
                    params![name, latitude, longitude, radius, now],
                )?;
                Ok(())
            })
            .await
            .map_err(map_err)?;
        tracing::info!(
            name = %location.name,
            center = %location.center,
            radius_m = location.radius_meters,
            "school location saved"
        );
        Ok(())
    }

    /// Insert a check-in dated `date` instead of the local calendar day.
    pub async fn insert_attendance_on(
        &self,
        record: &NewAttendance,
        date: NaiveDate,
    ) -> Result<AttendanceEvent, StoreError> {
        let event = AttendanceEvent {
            id: Uuid::new_v4(),
            profile_id: record.profile_id,
            position: record.position,
            is_valid: record.is_valid,
            distance_meters: record.distance_meters,
            attendance_date: date,
            recorded_at: Utc::now(),
        };
        let id = event.id.to_string();
        let profile_id = event.profile_id.to_string();
        let latitude = event.position.latitude();
        let longitude = event.position.longitude();
        let is_valid = event.is_valid;
        let distance = event.distance_meters;
        let day = date.to_string();
        let recorded_at = event.recorded_at.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendances (id, profile_id, latitude, longitude, is_valid, \
                     distance_meters, attendance_date, recorded_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id,
                        profile_id,
                        latitude,
                        longitude,
                        is_valid,
                        distance,
                        day,
                        recorded_at
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_err)?;
        tracing::debug!(
            profile = %event.profile_id,
            date = %date,
            valid = is_valid,
            "attendance inserted"
        );
        Ok(event)
    }

    /// Delete a profile with its check-ins and teacher assignments.
    pub async fn remove_profile(&self, id: ProfileId) -> Result<(), StoreError> {
        let key = id.to_string();
        let removed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM profiles WHERE id = ?1", [key])?))
            .await
            .map_err(map_err)?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!("profile {id}")));
        }
        tracing::info!(profile = %id, "profile removed");
        Ok(())
    }

    /// Insert a class. Class names are unique.
    pub async fn create_class(&self, class: &Class) -> Result<(), StoreError> {
        let id = class.id.to_string();
        let name = class.name.clone();
        let description = class.description.clone();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO classes (id, name, description, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, name, description, now],
                )?;
                Ok(())
            })
            .await
            .map_err(map_err)?;
        tracing::info!(class = %class.id, name = %class.name, "class created");
        Ok(())
    }

    pub async fn fetch_class(&self, id: ClassId) -> Result<Class, StoreError> {
        let key = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?1");
                Ok(conn
                    .query_row(&sql, params![key], ClassRow::from_row)
                    .optional()?)
            })
            .await
            .map_err(map_err)?;
        row.ok_or_else(|| StoreError::NotFound(format!("class {id}")))?
            .decode()
    }

    pub async fn find_class_by_name(&self, name: &str) -> Result<Option<Class>, StoreError> {
        let name = name.trim().to_string();
        let row = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {CLASS_COLUMNS} FROM classes WHERE name = ?1");
                Ok(conn
                    .query_row(&sql, params![name], ClassRow::from_row)
                    .optional()?)
            })
            .await
            .map_err(map_err)?;
        row.map(ClassRow::decode).transpose()
    }

    /// All classes, ordered by name.
    pub async fn list_classes(&self) -> Result<Vec<Class>, StoreError> {
        self.query_classes("SELECT id, name, description FROM classes ORDER BY name, id", None)
            .await
    }

    /// Delete a class. Its students keep their profiles with no class, and
    /// teacher assignments to it are dropped.
    pub async fn remove_class(&self, id: ClassId) -> Result<(), StoreError> {
        let key = id.to_string();
        let removed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM classes WHERE id = ?1", [key])?))
            .await
            .map_err(map_err)?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!("class {id}")));
        }
        tracing::info!(class = %id, "class removed");
        Ok(())
    }

    /// Link a teacher to a class. Assigning twice is a
    /// [`StoreError::UniqueViolation`]; a profile without the teacher role
    /// or an unknown class is [`StoreError::Invalid`].
    pub async fn assign_teacher(
        &self,
        teacher: ProfileId,
        class: ClassId,
    ) -> Result<(), StoreError> {
        let profile = self.fetch_profile(teacher).await?;
        if profile.role != Role::Teacher {
            return Err(StoreError::Invalid(format!(
                "{} is a {}, not a teacher",
                profile.full_name,
                profile.role.as_str()
            )));
        }
        let teacher_key = teacher.to_string();
        let class_key = class.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO teacher_classes (teacher_id, class_id, created_at) \
                     VALUES (?1, ?2, ?3)",
                    params![teacher_key, class_key, now],
                )?;
                Ok(())
            })
            .await
            .map_err(map_err)?;
        tracing::info!(teacher = %teacher, class = %class, "teacher assigned");
        Ok(())
    }

    pub async fn unassign_teacher(
        &self,
        teacher: ProfileId,
        class: ClassId,
    ) -> Result<(), StoreError> {
        let teacher_key = teacher.to_string();
        let class_key = class.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM teacher_classes WHERE teacher_id = ?1 AND class_id = ?2",
                    params![teacher_key, class_key],
                )?)
            })
            .await
            .map_err(map_err)?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!(
                "assignment of {teacher} to class {class}"
            )));
        }
        tracing::info!(teacher = %teacher, class = %class, "teacher unassigned");
        Ok(())
    }

    /// Classes a teacher is assigned to, ordered by name.
    pub async fn teacher_classes(&self, teacher: ProfileId) -> Result<Vec<Class>, StoreError> {
        self.query_classes(
            "SELECT c.id, c.name, c.description FROM classes c \
             JOIN teacher_classes t ON t.class_id = c.id \
             WHERE t.teacher_id = ?1 ORDER BY c.name, c.id",
            Some(teacher.to_string()),
        )
        .await
    }

    /// Head counts and the check-in tally for `date`.
    pub async fn summary(&self, date: NaiveDate) -> Result<RosterSummary, StoreError> {
        let day = date.to_string();
        self.conn
            .call(move |conn| {
                let role = "SELECT COUNT(*) FROM profiles WHERE role = ?1";
                Ok(RosterSummary {
                    students: count(conn, role, [Role::Student.as_str()])?,
                    teachers: count(conn, role, [Role::Teacher.as_str()])?,
                    classes: count(conn, "SELECT COUNT(*) FROM classes", [])?,
                    present: count(
                        conn,
                        "SELECT COUNT(*) FROM attendances WHERE attendance_date = ?1",
                        [&day],
                    )?,
                    valid: count(
                        conn,
                        "SELECT COUNT(*) FROM attendances \
                         WHERE attendance_date = ?1 AND is_valid = 1",
                        [&day],
                    )?,
                })
            })
            .await
            .map_err(map_err)
    }

    async fn query_classes(
        &self,
        sql: &'static str,
        arg: Option<String>,
    ) -> Result<Vec<Class>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let rows = match arg {
                    Some(arg) => stmt.query_map(params![arg], ClassRow::from_row)?,
                    None => stmt.query_map([], ClassRow::from_row)?,
                }
                .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_err)?;
        decode_all(rows, ClassRow::decode)
    }

    async fn query_attendance(
        &self,
        filter: &'static str,
        arg: String,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE {filter} \
                     ORDER BY attendance_date DESC, recorded_at DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![arg], AttendanceRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_err)?;
        decode_all(rows, AttendanceRow::decode)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn fetch_profile(&self, id: ProfileId) -> Result<Profile, StoreError> {
        let key = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1");
                Ok(conn
                    .query_row(&sql, params![key], ProfileRow::from_row)
                    .optional()?)
            })
            .await
            .map_err(map_err)?;
        row.ok_or_else(|| StoreError::NotFound(format!("profile {id}")))?
            .decode()
    }

    async fn fetch_school_location(&self) -> Result<Option<SchoolLocation>, StoreError> {
        let row = self
            .conn
            .call(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT name, latitude, longitude, radius_meters \
                         FROM school_location WHERE id = 1",
                        [],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, f64>(1)?,
                                row.get::<_, f64>(2)?,
                                row.get::<_, f64>(3)?,
                            ))
                        },
                    )
                    .optional()?)
            })
            .await
            .map_err(map_err)?;
        let Some((name, latitude, longitude, radius)) = row else {
            return Ok(None);
        };
        let center = Coordinate::new(latitude, longitude).map_err(|e| corrupt("center", e))?;
        SchoolLocation::new(&name, center, radius)
            .map(Some)
            .map_err(|e| corrupt("school_location", e))
    }

    async fn upsert_reference_descriptor(
        &self,
        id: ProfileId,
        descriptor: &FaceDescriptor,
    ) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(descriptor).map_err(|e| StoreError::Backend(e.to_string()))?;
        let key = id.to_string();
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE profiles SET face_descriptor = ?1, updated_at = ?2 WHERE id = ?3",
                    params![json, now, key],
                )?)
            })
            .await
            .map_err(map_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("profile {id}")));
        }
        tracing::info!(profile = %id, "reference descriptor stored");
        Ok(())
    }

    async fn insert_attendance(
        &self,
        record: &NewAttendance,
    ) -> Result<AttendanceEvent, StoreError> {
        self.insert_attendance_on(record, Local::now().date_naive()).await
    }

    async fn attendance_history(
        &self,
        id: ProfileId,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        self.query_attendance("profile_id = ?1", id.to_string()).await
    }

    async fn attendance_on(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>, StoreError> {
        self.query_attendance("attendance_date = ?1", date.to_string()).await
    }
}
