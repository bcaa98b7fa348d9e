//! A course config change flowing through to the gradebook.

use std::sync::Arc;
use std::time::Duration;

use rollbook_core::fixtures::{MockConnector, MockLms};
use rollbook_core::{
    AssignmentId, AttendanceTally, CourseConfig, CourseConfigStore, CourseId, InMemoryAttendance,
    InMemoryCourseConfigStore, LaunchContext, LaunchTarget, StudentId, UserId,
};
use rollbook_tasks::{
    GradeSyncQueue, GradeUpdater, InMemoryLockService, JobSpawner, JobStatus, LockConfig,
    LockKey, LockService, RetryPolicy, SpawnerConfig,
};

const GUID: &str = "abc123";
const LAUNCH_URL: &str = "http://localhost:3001/launch";

fn launch() -> LaunchContext {
    LaunchContext::new(
        UserId::new(42),
        GUID,
        "https://lms.example",
        LAUNCH_URL,
        LaunchTarget::Course {
            course_id: CourseId::new(1),
        },
    )
}

#[tokio::test]
async fn test_saved_weight_is_used_for_regrade() {
    let lms = MockLms::new().with_assignment(1, 3, LAUNCH_URL);
    let attendance = Arc::new(InMemoryAttendance::new());
    attendance.record(
        GUID,
        CourseId::new(1),
        StudentId::new(10),
        AttendanceTally::new(1, 1, 0),
    );
    let configs = Arc::new(InMemoryCourseConfigStore::new());
    let queue = GradeSyncQueue::new(
        GradeUpdater::new(
            Arc::new(MockConnector::new(lms.clone())),
            attendance,
            Arc::clone(&configs),
            Arc::new(InMemoryLockService::new()),
        ),
        Arc::new(JobSpawner::with_config(SpawnerConfig::development())),
    );

    let saved = configs
        .save(CourseConfig::new(CourseId::new(1), GUID).with_tardy_weight(Some(0.5)))
        .await
        .unwrap();
    assert!(saved.needs_regrade);

    let handles = queue
        .enqueue_course(&launch(), CourseId::new(1), [StudentId::new(10)])
        .unwrap();
    for handle in handles {
        handle.join().await.unwrap();
    }

    assert_eq!(
        lms.posted_grade(AssignmentId::new(3), StudentId::new(10)),
        Some(Some("75.00%".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_contended_job_retries_then_posts() {
    let lms = MockLms::new().with_assignment(1, 3, LAUNCH_URL);
    let attendance = Arc::new(InMemoryAttendance::new());
    attendance.record(
        GUID,
        CourseId::new(1),
        StudentId::new(10),
        AttendanceTally::new(1, 0, 0),
    );
    let locks = Arc::new(InMemoryLockService::with_config(LockConfig {
        retry_count: 1,
        retry_delay: Duration::ZERO,
    }));
    let queue = GradeSyncQueue::new(
        GradeUpdater::new(
            Arc::new(MockConnector::new(lms.clone())),
            attendance,
            Arc::new(InMemoryCourseConfigStore::new()),
            Arc::clone(&locks),
        )
        .with_retry_policy(RetryPolicy::new(5, Duration::from_secs(5))),
        Arc::new(JobSpawner::with_config(
            SpawnerConfig::development().without_timeout(),
        )),
    );

    // Another worker is posting the same grade for the same student.
    let key = LockKey::grade_update(
        GUID,
        AssignmentId::new(3),
        StudentId::new(10),
        Some(rollbook_core::Grade::from_percent(100.0)),
    );
    let held = locks.acquire(&key, Duration::from_secs(7)).await.unwrap();

    let handle = queue
        .enqueue(rollbook_tasks::GradeSyncParams::from_launch(
            &launch(),
            CourseId::new(1),
            StudentId::new(10),
        ))
        .unwrap();
    let id = handle.id();

    tokio::time::sleep(Duration::from_secs(6)).await;
    locks.release(held).await;
    handle.join().await.unwrap();

    let info = queue.job(id).unwrap();
    assert_eq!(info.status, JobStatus::Completed);
    assert!(info.retry_count >= 1);
    assert_eq!(
        lms.posted_grade(AssignmentId::new(3), StudentId::new(10)),
        Some(Some("100.00%".to_string()))
    );
}
