//! Integration tests for the resource loaders.
//!
//! These drive full sessions against an in-memory LMS and check what ends up
//! in the session's authorization set.

use rollbook_authz::{AuthzError, CacheConfig, Session};
use rollbook_core::fixtures::MockLms;
use rollbook_core::records::SectionRecord;
use rollbook_core::{
    CourseId, LaunchContext, LaunchTarget, LmsError, ResourceKind, Section, SectionId, StudentId,
    UserId,
};
use serde_json::json;

const LAUNCH_URL: &str = "http://localhost:3001";

fn new_session() -> Session {
    Session::new(
        LaunchContext::new(
            UserId::new(42),
            "abc123",
            "https://lms.example",
            LAUNCH_URL,
            LaunchTarget::Course {
                course_id: CourseId::new(1),
            },
        ),
        CacheConfig::default(),
    )
}

#[tokio::test]
async fn test_load_course_when_authorized() {
    let lms = MockLms::new().with_course(1);
    let mut session = new_session();

    let course = session
        .authorizer(&lms)
        .load_and_authorize_course(CourseId::new(1))
        .await
        .unwrap();

    assert_eq!(course.id, CourseId::new(1));
}

#[tokio::test]
async fn test_load_course_when_not_authorized() {
    let denial = LmsError::unauthorized("user not authorized to perform that action");
    let lms = MockLms::new().failing("get_course", denial.clone());
    let mut session = new_session();

    let err = session
        .authorizer(&lms)
        .load_and_authorize_course(CourseId::new(1))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.lms_error(), Some(&denial));
    assert!(session.authorization().is_empty());
}

#[tokio::test]
async fn test_authorized_course_is_not_checked_again() {
    let lms = MockLms::new().with_course(1);
    let mut session = new_session();

    for _ in 0..3 {
        session
            .authorizer(&lms)
            .load_and_authorize_course(CourseId::new(1))
            .await
            .unwrap();
    }

    assert_eq!(lms.calls("get_course"), 1);
}

#[tokio::test]
async fn test_authorization_survives_cache_expiry() {
    let lms = MockLms::new().with_course(1);
    let mut session = Session::new(new_session().launch().clone(), CacheConfig::disabled());

    session
        .authorizer(&lms)
        .load_and_authorize_course(CourseId::new(1))
        .await
        .unwrap();
    assert!(session
        .authorization()
        .is_authorized(ResourceKind::Course, 1_u64));

    // Without a cache the payload is refetched, but the course stays authorized
    // even if the LMS starts refusing.
    let lms = lms.failing("get_course", LmsError::unauthorized("revoked"));
    let err = session
        .authorizer(&lms)
        .load_and_authorize_course(CourseId::new(1))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert!(session
        .authorization()
        .is_authorized(ResourceKind::Course, 1_u64));
}

#[tokio::test]
async fn test_load_sections_in_lms_order() {
    let lms = MockLms::new().with_course(1).with_course_sections(
        1,
        vec![
            MockLms::roster_section(1, 1, &[10, 11]),
            MockLms::roster_section(2, 1, &[12]),
        ],
    );
    let mut session = new_session();

    let sections = session
        .authorizer(&lms)
        .load_and_authorize_sections(CourseId::new(1))
        .await
        .unwrap();

    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].id, SectionId::new(1));
    assert_eq!(sections[1].id, SectionId::new(2));
    assert!(sections.iter().all(Section::is_populated));
    assert!(session
        .authorization()
        .is_authorized(ResourceKind::Course, 1_u64));
}

#[tokio::test]
async fn test_load_sections_requires_course() {
    let lms = MockLms::new()
        .failing("get_course", LmsError::unauthorized("denied"))
        .with_course_sections(1, vec![MockLms::roster_section(1, 1, &[])]);
    let mut session = new_session();

    let err = session
        .authorizer(&lms)
        .load_and_authorize_sections(CourseId::new(1))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(lms.calls("get_sections"), 0);
}

#[tokio::test]
async fn test_load_section() {
    let lms = MockLms::new().with_section(1, 2);
    let mut session = new_session();

    let section = session
        .authorizer(&lms)
        .load_and_authorize_section(SectionId::new(1))
        .await
        .unwrap();

    assert_eq!(section.id, SectionId::new(1));
    assert!(!section.is_populated());
    assert_eq!(
        serde_json::to_value(session.authorization()).unwrap(),
        json!({"section": [1]})
    );
}

#[tokio::test]
async fn test_full_section_comes_from_course_listing() {
    let full_section = Section::try_from(MockLms::roster_section(1, 2, &[])).unwrap();
    let lms = MockLms::new()
        .with_section(1, 2)
        .with_course(2)
        .with_course_sections(
            2,
            vec![
                MockLms::roster_section(1, 2, &[]),
                SectionRecord {
                    id: Some(2),
                    ..SectionRecord::default()
                },
            ],
        );
    let mut session = new_session();

    let section = session
        .authorizer(&lms)
        .load_and_authorize_full_section(SectionId::new(1))
        .await
        .unwrap();

    assert_eq!(section, full_section);
    assert_eq!(section.students, Some(vec![]));
}

#[tokio::test]
async fn test_full_section_when_not_authorized() {
    let lms = MockLms::new().failing("get_section", LmsError::unauthorized("denied"));
    let mut session = new_session();

    let err = session
        .authorizer(&lms)
        .load_and_authorize_full_section(SectionId::new(1))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(lms.calls("get_sections"), 0);
}

#[tokio::test]
async fn test_load_student_uses_submission_access() {
    let lms = MockLms::new()
        .with_assignment(1, 3, LAUNCH_URL)
        .with_submission(1, 3, 2);
    let mut session = new_session();

    session
        .authorizer(&lms)
        .load_and_authorize_student(CourseId::new(1), StudentId::new(2))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(session.authorization()).unwrap(),
        json!({"student": [2]})
    );
    assert_eq!(lms.calls("get_submission"), 1);
    assert_eq!(lms.calls("create_assignment"), 0);
}

#[tokio::test]
async fn test_load_student_when_not_authorized() {
    let lms = MockLms::new().with_assignment(1, 3, LAUNCH_URL);
    let mut session = new_session();

    let err = session
        .authorizer(&lms)
        .load_and_authorize_student(CourseId::new(1), StudentId::new(2))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert!(session.authorization().is_empty());
}

#[tokio::test]
async fn test_remote_failures_are_not_masked() {
    let lms = MockLms::new().failing("get_account", LmsError::remote(503, "maintenance"));
    let mut session = new_session();

    let err = session
        .authorizer(&lms)
        .load_and_authorize_account(rollbook_core::AccountId::new(1), "abc123")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthzError::Lms(LmsError::Remote { status: 503, .. })
    ));
}
