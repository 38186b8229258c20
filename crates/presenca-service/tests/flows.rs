//! End-to-end registration and check-in against a file-backed store.

use presenca_capture::fake::{descriptor, FakeEmbedder, FakeLoader, FakePlatform};
use presenca_capture::{CameraLock, CaptureDevice, SessionConfig};
use presenca_core::{Coordinate, EuclideanMatcher, Profile, RecordStore, Role, SchoolLocation};
use presenca_service::{
    FixedGeolocator, RegistrationFlow, RegistrationOutcome, Severity, SqliteStore,
    VerificationFlow, VerificationOutcome,
};
use std::sync::Arc;
use std::time::Duration;

struct School {
    _dir: tempfile::TempDir,
    store: Arc<SqliteStore>,
    platform: FakePlatform,
    embedder: FakeEmbedder,
    device: CaptureDevice,
}

impl School {
    async fn open() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presenca.db");
        let store = Arc::new(SqliteStore::open(path).await.unwrap());
        let center = Coordinate::new(-23.5505, -46.6333).unwrap();
        store
            .set_school_location(&SchoolLocation::new("Escola Central", center, 200.0).unwrap())
            .await
            .unwrap();
        let embedder = FakeEmbedder::new();
        let platform = FakePlatform::new();
        let device = CaptureDevice::new(
            Arc::new(platform.clone()),
            Arc::new(FakeLoader::new(embedder.clone())),
            CameraLock::new(),
            SessionConfig::default(),
        );
        Self {
            _dir: dir,
            store,
            platform,
            embedder,
            device,
        }
    }

    async fn enroll_student(&self, name: &str, number: &str) -> Profile {
        let profile = Profile::new(name, number, Role::Student, None).unwrap();
        self.store.create_profile(&profile).await.unwrap();
        profile
    }

    fn verification_at(&self, latitude: f64, longitude: f64) -> VerificationFlow {
        VerificationFlow::new(
            self.store.clone(),
            Arc::new(FixedGeolocator(Coordinate::new(latitude, longitude).unwrap())),
            EuclideanMatcher::default(),
            Duration::from_secs(1),
        )
    }
}

#[tokio::test]
async fn test_register_then_check_in() {
    let school = School::open().await;
    let ana = school.enroll_student("Ana Souza", "RA1001").await;

    school.embedder.push_face(descriptor(0.30));
    let registered = RegistrationFlow::new(school.store.clone())
        .run(ana.id, &school.device)
        .await;
    assert_eq!(registered, RegistrationOutcome::Registered);

    // ~110 m north of the school, a slightly different face.
    school.embedder.push_face(descriptor(0.45));
    let outcome = school
        .verification_at(-23.5495, -46.6333)
        .run(ana.id, &school.device)
        .await;
    assert_eq!(outcome.severity(), Severity::Success, "{}", outcome.message());
    assert_eq!(school.platform.live_tracks(), 0);

    let history = school.store.attendance_history(ana.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_valid);
    assert!((history[0].distance_meters - 111.2).abs() < 1.0);
}

#[tokio::test]
async fn test_far_check_in_recorded_invalid_and_blocks_retry() {
    let school = School::open().await;
    let bruno = school.enroll_student("Bruno Lima", "RA2002").await;
    school
        .store
        .upsert_reference_descriptor(bruno.id, &descriptor(0.0))
        .await
        .unwrap();

    school.embedder.push_face(descriptor(0.0));
    // ~1.1 km away.
    let outcome = school
        .verification_at(-23.5405, -46.6333)
        .run(bruno.id, &school.device)
        .await;
    assert!(
        matches!(outcome, VerificationOutcome::OutOfRange { ref event, .. } if !event.is_valid),
        "{outcome:?}"
    );

    school.embedder.push_face(descriptor(0.0));
    let retry = school
        .verification_at(-23.5505, -46.6333)
        .run(bruno.id, &school.device)
        .await;
    assert_eq!(retry, VerificationOutcome::AlreadyCheckedIn);

    let roll = school
        .store
        .attendance_on(chrono::Local::now().date_naive())
        .await
        .unwrap();
    assert_eq!(roll.len(), 1);
    assert!(!roll[0].is_valid);
}

#[tokio::test]
async fn test_unregistered_student_cannot_check_in() {
    let school = School::open().await;
    let carla = school.enroll_student("Carla Dias", "RA3003").await;

    school.embedder.push_face(descriptor(0.1));
    let outcome = school
        .verification_at(-23.5505, -46.6333)
        .run(carla.id, &school.device)
        .await;
    assert_eq!(outcome, VerificationOutcome::NotRegistered);
    assert!(school.store.attendance_history(carla.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_impostor_rejected() {
    let school = School::open().await;
    let ana = school.enroll_student("Ana Souza", "RA1001").await;
    school
        .store
        .upsert_reference_descriptor(ana.id, &descriptor(0.0))
        .await
        .unwrap();

    school.embedder.push_face(descriptor(0.9));
    let outcome = school
        .verification_at(-23.5505, -46.6333)
        .run(ana.id, &school.device)
        .await;
    assert!(matches!(outcome, VerificationOutcome::FaceRejected { .. }));
    assert!(outcome.is_retryable());
    assert!(school.store.attendance_history(ana.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_impostor_retry_with_real_face_checks_in() {
    let school = School::open().await;
    let ana = school.enroll_student("Ana Souza", "RA1001").await;
    school
        .store
        .upsert_reference_descriptor(ana.id, &descriptor(0.0))
        .await
        .unwrap();
    let flow = school.verification_at(-23.5505, -46.6333);

    school.embedder.push_face(descriptor(0.9));
    let rejected = flow.run(ana.id, &school.device).await;
    assert!(matches!(rejected, VerificationOutcome::FaceRejected { .. }));

    school.embedder.push_face(descriptor(0.2));
    let retried = flow.run(ana.id, &school.device).await;
    assert!(matches!(retried, VerificationOutcome::CheckedIn { .. }), "{retried:?}");
    assert_eq!(school.store.attendance_history(ana.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_profile_is_persistence_error() {
    let school = School::open().await;
    school.embedder.push_face(descriptor(0.1));
    let outcome = school
        .verification_at(-23.5505, -46.6333)
        .run(presenca_core::ProfileId::new(), &school.device)
        .await;
    assert!(matches!(outcome, VerificationOutcome::Persistence(_)));
}
