//! Resource loaders.
//!
//! Every loader follows the same pattern: gate on the session's authorization
//! set (falling back to a remote LMS check through the resource cache), then
//! build the domain object from the cached payload.

use rollbook_core::records::{AccountRecord, CourseRecord, SectionRecord};
use rollbook_core::{
    AccountId, AssignmentId, AttendanceAssignment, CachedAccount, Course, CourseId, LaunchContext,
    LmsClient, LmsResult, ResourceKind, Section, SectionId, StudentId,
};
use tracing::debug;

use crate::authorization::AuthorizationSet;
use crate::cache::ResourceCache;
use crate::error::{AuthzError, AuthzResult};

/// Loads resources on behalf of one session.
///
/// Borrows the session's authorization set mutably, so only one authorizer
/// can be active per session at a time.
#[derive(Debug)]
pub struct Authorizer<'s, C> {
    client: &'s C,
    launch: &'s LaunchContext,
    authorization: &'s mut AuthorizationSet,
    cache: &'s ResourceCache,
}

impl<'s, C: LmsClient> Authorizer<'s, C> {
    /// Create an authorizer over session state.
    pub fn new(
        client: &'s C,
        launch: &'s LaunchContext,
        authorization: &'s mut AuthorizationSet,
        cache: &'s ResourceCache,
    ) -> Self {
        Self {
            client,
            launch,
            authorization,
            cache,
        }
    }

    /// The session's authorization set.
    pub fn authorization(&self) -> &AuthorizationSet {
        self.authorization
    }

    /// Authorize and load a course.
    pub async fn load_and_authorize_course(&mut self, id: CourseId) -> AuthzResult<Course> {
        let (client, cache) = (self.client, self.cache);
        self.authorization
            .authorize_resource(ResourceKind::Course, id, || cached_course(client, cache, id))
            .await?;

        let record = cached_course(client, cache, id).await?;
        Course::try_from(record).map_err(|e| AuthzError::invalid_payload(ResourceKind::Course, e))
    }

    /// Authorize a course and load its sections, rosters included.
    ///
    /// Sections come back in the order the LMS lists them.
    pub async fn load_and_authorize_sections(
        &mut self,
        course_id: CourseId,
    ) -> AuthzResult<Vec<Section>> {
        self.load_and_authorize_course(course_id).await?;

        let records = cached_sections(self.client, self.cache, course_id).await?;
        records
            .into_iter()
            .map(|record| {
                Section::from_roster_record(record)
                    .map_err(|e| AuthzError::invalid_payload(ResourceKind::Section, e))
            })
            .collect()
    }

    /// Authorize and load a single section, without its roster.
    pub async fn load_and_authorize_section(&mut self, id: SectionId) -> AuthzResult<Section> {
        let (client, cache) = (self.client, self.cache);
        self.authorization
            .authorize_resource(ResourceKind::Section, id, || cached_section(client, cache, id))
            .await?;

        let record = cached_section(client, cache, id).await?;
        Section::try_from(record).map_err(|e| AuthzError::invalid_payload(ResourceKind::Section, e))
    }

    /// Authorize and load a section with its roster populated.
    ///
    /// A section fetched on its own lacks students, so the section is looked
    /// up again in its course's listing.
    pub async fn load_and_authorize_full_section(&mut self, id: SectionId) -> AuthzResult<Section> {
        let section = self.load_and_authorize_section(id).await?;
        let course_id = section.course_id.ok_or_else(|| {
            AuthzError::invalid_payload(
                ResourceKind::Section,
                rollbook_core::ValidationError::missing("course_id"),
            )
        })?;

        self.load_and_authorize_sections(course_id)
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AuthzError::not_found(ResourceKind::Section, id))
    }

    /// Authorize and load an account on the given LMS instance.
    pub async fn load_and_authorize_account(
        &mut self,
        id: AccountId,
        tool_consumer_instance_guid: &str,
    ) -> AuthzResult<CachedAccount> {
        let (client, cache) = (self.client, self.cache);
        self.authorization
            .authorize_resource(ResourceKind::Account, id, || cached_account(client, cache, id))
            .await?;

        let record = cached_account(client, cache, id).await?;
        CachedAccount::from_record(id, tool_consumer_instance_guid, record)
            .map_err(|e| AuthzError::invalid_payload(ResourceKind::Account, e))
    }

    /// Authorize access to a student's attendance record in a course.
    ///
    /// Access follows the LMS: the user may view the student's record iff the
    /// LMS lets them read the student's submission for the attendance
    /// assignment. The assignment is created if the course has none yet.
    pub async fn load_and_authorize_student(
        &mut self,
        course_id: CourseId,
        student_id: StudentId,
    ) -> AuthzResult<()> {
        let (client, launch) = (self.client, self.launch);
        self.authorization
            .authorize_resource(ResourceKind::Student, student_id, || async move {
                let assignment = AttendanceAssignment::new(
                    client,
                    course_id,
                    launch.tool_launch_url.as_str(),
                    launch.tool_consumer_instance_guid.as_str(),
                );
                let record = assignment.fetch_or_create(false).await?;
                debug!(
                    course_id = %course_id,
                    assignment_id = record.id,
                    student_id = %student_id,
                    "checking submission access"
                );
                client
                    .get_submission(course_id, AssignmentId::new(record.id), student_id)
                    .await
            })
            .await?;
        Ok(())
    }
}

async fn cached_course<C: LmsClient>(
    client: &C,
    cache: &ResourceCache,
    id: CourseId,
) -> LmsResult<CourseRecord> {
    cache.fetch(id.get(), || client.get_course(id)).await
}

async fn cached_sections<C: LmsClient>(
    client: &C,
    cache: &ResourceCache,
    course_id: CourseId,
) -> LmsResult<Vec<SectionRecord>> {
    cache
        .fetch(course_id.get(), || client.get_sections(course_id))
        .await
}

async fn cached_section<C: LmsClient>(
    client: &C,
    cache: &ResourceCache,
    id: SectionId,
) -> LmsResult<SectionRecord> {
    cache.fetch(id.get(), || client.get_section(id)).await
}

async fn cached_account<C: LmsClient>(
    client: &C,
    cache: &ResourceCache,
    id: AccountId,
) -> LmsResult<AccountRecord> {
    cache.fetch(id.get(), || client.get_account(id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollbook_core::fixtures::MockLms;
    use rollbook_core::{LaunchTarget, LmsError, UserId};

    fn launch() -> LaunchContext {
        LaunchContext::new(
            UserId::new(7),
            "abc123",
            "https://lms.example",
            "http://localhost:3001",
            LaunchTarget::Course {
                course_id: CourseId::new(1),
            },
        )
    }

    #[tokio::test]
    async fn test_course_is_fetched_once() {
        let lms = MockLms::new().with_course(1);
        let launch = launch();
        let mut set = AuthorizationSet::new();
        let cache = ResourceCache::default();
        let mut authorizer = Authorizer::new(&lms, &launch, &mut set, &cache);

        let course = authorizer.load_and_authorize_course(CourseId::new(1)).await.unwrap();
        assert_eq!(course.id, CourseId::new(1));
        authorizer.load_and_authorize_course(CourseId::new(1)).await.unwrap();

        assert_eq!(lms.calls("get_course"), 1);
        assert!(set.is_authorized(ResourceKind::Course, 1_u64));
    }

    #[tokio::test]
    async fn test_course_denied() {
        let lms = MockLms::new().failing("get_course", LmsError::unauthorized("denied"));
        let launch = launch();
        let mut set = AuthorizationSet::new();
        let cache = ResourceCache::default();
        let mut authorizer = Authorizer::new(&lms, &launch, &mut set, &cache);

        let err = authorizer
            .load_and_authorize_course(CourseId::new(1))
            .await
            .unwrap_err();
        assert_eq!(err.lms_error(), Some(&LmsError::unauthorized("denied")));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_account_loader() {
        let lms = MockLms::new().with_account(1);
        let launch = launch();
        let mut set = AuthorizationSet::new();
        let cache = ResourceCache::default();
        let mut authorizer = Authorizer::new(&lms, &launch, &mut set, &cache);

        let account = authorizer
            .load_and_authorize_account(AccountId::new(1), "tci_guid")
            .await
            .unwrap();
        assert_eq!(account.account_id, AccountId::new(1));
        assert_eq!(account.tool_consumer_instance_guid, "tci_guid");
        assert!(authorizer.authorization().is_authorized(ResourceKind::Account, 1_u64));
    }

    #[tokio::test]
    async fn test_listed_section_with_null_roster_is_empty() {
        let empty = rollbook_core::records::SectionRecord {
            id: Some(1),
            course_id: Some(2),
            students: None,
            ..Default::default()
        };
        let lms = MockLms::new()
            .with_course(2)
            .with_section(1, 2)
            .with_course_sections(2, vec![empty]);
        let launch = launch();
        let mut set = AuthorizationSet::new();
        let cache = ResourceCache::default();
        let mut authorizer = Authorizer::new(&lms, &launch, &mut set, &cache);

        let section = authorizer
            .load_and_authorize_full_section(SectionId::new(1))
            .await
            .unwrap();
        assert!(section.is_populated());
        assert_eq!(section.students, Some(vec![]));
    }

    #[tokio::test]
    async fn test_full_section_missing_from_listing() {
        let lms = MockLms::new()
            .with_course(2)
            .with_section(1, 2)
            .with_course_sections(2, vec![MockLms::roster_section(5, 2, &[])]);
        let launch = launch();
        let mut set = AuthorizationSet::new();
        let cache = ResourceCache::default();
        let mut authorizer = Authorizer::new(&lms, &launch, &mut set, &cache);

        let err = authorizer
            .load_and_authorize_full_section(SectionId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::NotFound { kind: ResourceKind::Section, id: 1 }));
    }

    #[tokio::test]
    async fn test_student_creates_missing_assignment() {
        let lms = MockLms::new().with_submission(1, 1000, 2);
        let launch = launch();
        let mut set = AuthorizationSet::new();
        let cache = ResourceCache::default();
        let mut authorizer = Authorizer::new(&lms, &launch, &mut set, &cache);

        authorizer
            .load_and_authorize_student(CourseId::new(1), StudentId::new(2))
            .await
            .unwrap();
        assert_eq!(lms.calls("create_assignment"), 1);
        assert!(set.is_authorized(ResourceKind::Student, 2_u64));
    }
}
