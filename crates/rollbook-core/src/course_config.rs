//! Per-course grading configuration.
//!
//! A [`CourseConfig`] holds the weights used to turn attendance into a grade.
//! Saving a config reports whether existing grades must be recomputed.

use crate::error::ValidationError;
use crate::ids::CourseId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

/// Grading configuration for one course on one LMS instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
    /// Course id.
    pub course_id: Option<CourseId>,
    /// LMS instance the course lives on.
    pub tool_consumer_instance_guid: Option<String>,
    /// Share of a meeting a late arrival earns, in `0.0..=1.0`.
    pub tardy_weight: Option<f64>,
    /// Whether the attendance assignment is excluded from the final grade.
    #[serde(default)]
    pub omit_from_final_grade: bool,
}

impl CourseConfig {
    /// Creates a config with default weights.
    pub fn new(course_id: CourseId, tool_consumer_instance_guid: impl Into<String>) -> Self {
        Self {
            course_id: Some(course_id),
            tool_consumer_instance_guid: Some(tool_consumer_instance_guid.into()),
            tardy_weight: None,
            omit_from_final_grade: false,
        }
    }

    /// Set the tardy weight.
    pub fn with_tardy_weight(mut self, tardy_weight: Option<f64>) -> Self {
        self.tardy_weight = tardy_weight;
        self
    }

    /// Set whether the assignment is omitted from the final grade.
    pub fn with_omit_from_final_grade(mut self, omit: bool) -> Self {
        self.omit_from_final_grade = omit;
        self
    }

    /// Validate the config.
    ///
    /// The course id and a non-blank instance guid are required. A tardy
    /// weight, when present, must lie in `0.0..=1.0`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();

        if self.course_id.is_none() {
            errors.add("course_id", "can't be blank");
        }
        if self
            .tool_consumer_instance_guid
            .as_deref()
            .map_or(true, |guid| guid.trim().is_empty())
        {
            errors.add("tool_consumer_instance_guid", "can't be blank");
        }
        if let Some(weight) = self.tardy_weight {
            if weight.is_nan() {
                errors.add("tardy_weight", "is not a number");
            } else if weight < 0.0 {
                errors.add("tardy_weight", "must be greater than or equal to 0");
            } else if weight > 1.0 {
                errors.add("tardy_weight", "must be less than or equal to 1");
            }
        }

        errors.into_result()
    }

    /// Returns true if saving `self` over `previous` changes computed grades.
    ///
    /// A new record is compared against an unset tardy weight and a cleared
    /// omit flag. Clearing the tardy weight does not trigger a regrade.
    #[must_use]
    pub fn needs_regrade(&self, previous: Option<&CourseConfig>) -> bool {
        let (prev_weight, prev_omit) =
            previous.map_or((None, false), |p| (p.tardy_weight, p.omit_from_final_grade));

        let weight_changed = self.tardy_weight.is_some() && self.tardy_weight != prev_weight;
        weight_changed || self.omit_from_final_grade != prev_omit
    }

    fn key(&self) -> Option<(CourseId, String)> {
        Some((self.course_id?, self.tool_consumer_instance_guid.clone()?))
    }
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedConfig {
    /// The stored config.
    pub config: CourseConfig,
    /// Whether grades computed with the old config are now stale.
    pub needs_regrade: bool,
}

/// Storage for course configs.
pub trait CourseConfigStore: Send + Sync {
    /// Looks up the config of a course.
    fn find(
        &self,
        course_id: CourseId,
        tool_consumer_instance_guid: &str,
    ) -> impl Future<Output = Option<CourseConfig>> + Send;

    /// Validates and stores a config. Nothing is written when validation fails.
    fn save(
        &self,
        config: CourseConfig,
    ) -> impl Future<Output = Result<SavedConfig, ValidationError>> + Send;
}

/// In-memory [`CourseConfigStore`].
#[derive(Debug, Default)]
pub struct InMemoryCourseConfigStore {
    records: DashMap<(CourseId, String), CourseConfig>,
}

impl InMemoryCourseConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored configs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CourseConfigStore for InMemoryCourseConfigStore {
    async fn find(
        &self,
        course_id: CourseId,
        tool_consumer_instance_guid: &str,
    ) -> Option<CourseConfig> {
        self.records
            .get(&(course_id, tool_consumer_instance_guid.to_string()))
            .map(|entry| entry.value().clone())
    }

    async fn save(&self, config: CourseConfig) -> Result<SavedConfig, ValidationError> {
        config.validate()?;
        let key = config.key().ok_or_else(|| ValidationError::missing("course_id"))?;

        let previous = self.records.insert(key, config.clone());
        let needs_regrade = config.needs_regrade(previous.as_ref());
        debug!(
            course_id = ?config.course_id,
            needs_regrade,
            "Saved course config"
        );

        Ok(SavedConfig {
            config,
            needs_regrade,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CourseConfig {
        CourseConfig::new(CourseId::new(1), "abc123")
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
        assert!(config().with_tardy_weight(Some(0.0)).validate().is_ok());
        assert!(config().with_tardy_weight(Some(1.0)).validate().is_ok());
    }

    #[test]
    fn test_requires_identity() {
        let err = CourseConfig::default().validate().unwrap_err();
        assert!(err.has_error("course_id"));
        assert!(err.has_error("tool_consumer_instance_guid"));

        let blank_guid = CourseConfig {
            tool_consumer_instance_guid: Some("  ".to_string()),
            ..config()
        };
        assert!(blank_guid
            .validate()
            .unwrap_err()
            .has_error("tool_consumer_instance_guid"));
    }

    #[test]
    fn test_tardy_weight_range() {
        for weight in [1.5, -0.1, f64::NAN] {
            let err = config().with_tardy_weight(Some(weight)).validate().unwrap_err();
            assert!(err.has_error("tardy_weight"), "{weight} should be rejected");
        }
    }

    #[test]
    fn test_needs_regrade_on_new_weight() {
        let previous = config();
        let updated = config().with_tardy_weight(Some(0.4));
        assert!(updated.needs_regrade(Some(&previous)));
    }

    #[test]
    fn test_no_regrade_without_change() {
        let previous = config().with_tardy_weight(Some(0.4));
        assert!(!previous.clone().needs_regrade(Some(&previous)));
    }

    #[test]
    fn test_clearing_weight_does_not_regrade() {
        let previous = config().with_tardy_weight(Some(0.4));
        assert!(!config().needs_regrade(Some(&previous)));
    }

    #[test]
    fn test_omit_flag_change_regrades() {
        let previous = config().with_tardy_weight(Some(0.4));
        let updated = previous.clone().with_omit_from_final_grade(true);
        assert!(updated.needs_regrade(Some(&previous)));
    }

    #[test]
    fn test_new_record_compares_against_defaults() {
        assert!(!config().needs_regrade(None));
        assert!(config().with_tardy_weight(Some(0.5)).needs_regrade(None));
        assert!(config().with_omit_from_final_grade(true).needs_regrade(None));
    }

    #[tokio::test]
    async fn test_store_save_and_find() {
        let store = InMemoryCourseConfigStore::new();

        let saved = store.save(config()).await.unwrap();
        assert!(!saved.needs_regrade);

        let saved = store.save(config().with_tardy_weight(Some(0.4))).await.unwrap();
        assert!(saved.needs_regrade);

        let saved = store.save(config().with_tardy_weight(Some(0.4))).await.unwrap();
        assert!(!saved.needs_regrade);

        let found = store.find(CourseId::new(1), "abc123").await.unwrap();
        assert_eq!(found.tardy_weight, Some(0.4));
        assert!(store.find(CourseId::new(1), "other").await.is_none());
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_without_writing() {
        let store = InMemoryCourseConfigStore::new();
        store.save(config().with_tardy_weight(Some(0.4))).await.unwrap();

        let err = store
            .save(config().with_tardy_weight(Some(1.5)))
            .await
            .unwrap_err();
        assert!(err.has_error("tardy_weight"));

        let found = store.find(CourseId::new(1), "abc123").await.unwrap();
        assert_eq!(found.tardy_weight, Some(0.4));
        assert_eq!(store.len(), 1);
    }
}
