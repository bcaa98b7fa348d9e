//! Per-session authorization sets.
//!
//! An [`AuthorizationSet`] records which resources the session's user has
//! already been verified to access. Entries are only ever added: once a
//! `(kind, id)` pair is authorized it stays authorized for the rest of the
//! session.

use std::future::Future;

use indexmap::{IndexMap, IndexSet};
use rollbook_core::{LmsResult, ResourceKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use rollbook_telemetry::metrics::record_authz_check;

/// Resources a session is authorized to access, grouped by kind.
///
/// Serializes as a map from kind to the ids authorized for it, in the order
/// they were first authorized: `{"section": [1, 4], "course": [2]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationSet {
    sets: IndexMap<ResourceKind, IndexSet<u64>>,
}

impl AuthorizationSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `id` is authorized for `kind`.
    pub fn is_authorized(&self, kind: ResourceKind, id: impl Into<u64>) -> bool {
        let id = id.into();
        self.sets.get(&kind).is_some_and(|ids| ids.contains(&id))
    }

    /// Marks `id` as authorized for `kind`. Always returns true.
    pub fn authorize(&mut self, kind: ResourceKind, id: impl Into<u64>) -> bool {
        self.sets.entry(kind).or_default().insert(id.into());
        true
    }

    /// Authorizes a resource, running `remote_check` only if needed.
    ///
    /// If `(kind, id)` is already authorized, returns `Ok(true)` without
    /// calling `remote_check`. Otherwise awaits the check once: on success the
    /// resource is authorized and `Ok(true)` returned; on failure the check's
    /// error is returned as is and the set is left untouched.
    pub async fn authorize_resource<T, F, Fut>(
        &mut self,
        kind: ResourceKind,
        id: impl Into<u64>,
        remote_check: F,
    ) -> LmsResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LmsResult<T>>,
    {
        let id = id.into();
        if self.is_authorized(kind, id) {
            record_authz_check(kind.as_str(), "cached");
            return Ok(true);
        }

        match remote_check().await {
            Ok(_) => {
                debug!(kind = %kind, id, "resource authorized");
                record_authz_check(kind.as_str(), "remote");
                Ok(self.authorize(kind, id))
            }
            Err(err) => {
                debug!(kind = %kind, id, error = %err, "remote authorization check failed");
                record_authz_check(
                    kind.as_str(),
                    if err.is_unauthorized() { "denied" } else { "error" },
                );
                Err(err)
            }
        }
    }

    /// Ids authorized for `kind`, in authorization order.
    pub fn ids(&self, kind: ResourceKind) -> impl Iterator<Item = u64> + '_ {
        self.sets.get(&kind).into_iter().flatten().copied()
    }

    /// Kinds with at least one authorized id.
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.sets.keys().copied()
    }

    /// Returns true if nothing is authorized.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollbook_core::{LmsError, SectionId};
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_authorize_caches_id() {
        let mut set = AuthorizationSet::new();
        assert!(set.authorize(ResourceKind::Section, 1_u64));

        assert_eq!(serde_json::to_value(&set).unwrap(), json!({"section": [1]}));
        assert!(set.is_authorized(ResourceKind::Section, 1_u64));
    }

    #[test]
    fn test_authorization_is_scoped_to_kind_and_id() {
        let mut set = AuthorizationSet::new();
        set.authorize(ResourceKind::Section, 1_u64);

        assert!(!set.is_authorized(ResourceKind::Section, 2_u64));
        assert!(!set.is_authorized(ResourceKind::Course, 1_u64));
    }

    #[test]
    fn test_authorize_is_idempotent() {
        let mut set = AuthorizationSet::new();
        set.authorize(ResourceKind::Course, 1_u64);
        set.authorize(ResourceKind::Course, 1_u64);
        set.authorize(ResourceKind::Course, 3_u64);

        assert_eq!(set.ids(ResourceKind::Course).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_typed_ids() {
        let mut set = AuthorizationSet::new();
        set.authorize(ResourceKind::Section, SectionId::new(5));
        assert!(set.is_authorized(ResourceKind::Section, SectionId::new(5)));
        assert!(set.is_authorized(ResourceKind::Section, 5_u64));
    }

    #[tokio::test]
    async fn test_already_authorized_skips_remote_check() {
        let mut set = AuthorizationSet::new();
        set.authorize(ResourceKind::Section, 1_u64);
        let called = Cell::new(false);

        let result = set
            .authorize_resource(ResourceKind::Section, 1_u64, || {
                called.set(true);
                async { Err::<(), _>(LmsError::unauthorized("should not run")) }
            })
            .await;

        assert_eq!(result, Ok(true));
        assert!(!called.get());
    }

    #[tokio::test]
    async fn test_successful_check_authorizes() {
        let mut set = AuthorizationSet::new();

        let result = set
            .authorize_resource(ResourceKind::Section, 1_u64, || async { Ok(()) })
            .await;

        assert_eq!(result, Ok(true));
        assert!(set.is_authorized(ResourceKind::Section, 1_u64));

        // Later checks are answered from the set.
        let again = set
            .authorize_resource(ResourceKind::Section, 1_u64, || async {
                Err::<(), _>(LmsError::unauthorized("should not run"))
            })
            .await;
        assert_eq!(again, Ok(true));
    }

    #[tokio::test]
    async fn test_failed_check_propagates_error_unchanged() {
        let mut set = AuthorizationSet::new();
        let denial = LmsError::unauthorized("user not authorized to perform that action");

        let result = set
            .authorize_resource(ResourceKind::Section, 1_u64, || {
                let denial = denial.clone();
                async move { Err::<(), _>(denial) }
            })
            .await;

        assert_eq!(result, Err(denial));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_other_remote_errors_propagate() {
        let mut set = AuthorizationSet::new();

        let result = set
            .authorize_resource(ResourceKind::Course, 9_u64, || async {
                Err::<(), _>(LmsError::remote(500, "boom"))
            })
            .await;

        assert_eq!(result, Err(LmsError::remote(500, "boom")));
        assert!(!set.is_authorized(ResourceKind::Course, 9_u64));
    }
}
