//! Attendance tallies and grade computation.
//!
//! A student's attendance grade is the share of recorded class meetings they
//! attended, where a late arrival counts for `tardy_weight` of a meeting.

use crate::ids::{CourseId, StudentId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Tardy weight used when a course has not configured one.
pub const DEFAULT_TARDY_WEIGHT: f64 = 0.8;

/// Counts of recorded attendance statuses for one student in one course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceTally {
    /// Meetings marked present.
    pub present: u32,
    /// Meetings marked late.
    pub late: u32,
    /// Meetings marked absent.
    pub absent: u32,
}

impl AttendanceTally {
    /// Creates a tally.
    #[must_use]
    pub const fn new(present: u32, late: u32, absent: u32) -> Self {
        Self {
            present,
            late,
            absent,
        }
    }

    /// Total recorded meetings.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.present as u64 + self.late as u64 + self.absent as u64
    }

    /// Computes the attendance grade.
    ///
    /// Returns `None` when nothing has been recorded yet.
    #[must_use]
    pub fn grade(&self, tardy_weight: Option<f64>) -> Option<Grade> {
        if self.total() == 0 {
            return None;
        }
        let weight = tardy_weight.unwrap_or(DEFAULT_TARDY_WEIGHT);
        let earned = f64::from(self.present) + f64::from(self.late) * weight;
        let total = f64::from(self.present) + f64::from(self.late) + f64::from(self.absent);
        Some(Grade::from_percent(earned / total * 100.0))
    }
}

/// A percentage grade rounded to two decimals.
///
/// Stored in hundredths of a percent so equal grades compare and hash equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grade(u32);

impl Grade {
    /// Rounds a percentage to a grade. Values are clamped to 0..=100.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_percent(percent: f64) -> Self {
        let clamped = percent.clamp(0.0, 100.0);
        Self((clamped * 100.0).round() as u32)
    }

    /// Returns the grade as a percentage.
    #[must_use]
    pub fn percent(&self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Formats the grade for the LMS `posted_grade` field.
    #[must_use]
    pub fn posted_grade(&self) -> String {
        format!("{self}%")
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Source of recorded attendance.
pub trait AttendanceSource: Send + Sync {
    /// Returns the tally for a student in a course on an LMS instance.
    fn tally(
        &self,
        tool_consumer_instance_guid: &str,
        course_id: CourseId,
        student_id: StudentId,
    ) -> impl Future<Output = AttendanceTally> + Send;
}

/// In-memory [`AttendanceSource`].
#[derive(Debug, Default)]
pub struct InMemoryAttendance {
    tallies: DashMap<(String, CourseId, StudentId), AttendanceTally>,
}

impl InMemoryAttendance {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the tally for a student.
    pub fn record(
        &self,
        tool_consumer_instance_guid: impl Into<String>,
        course_id: CourseId,
        student_id: StudentId,
        tally: AttendanceTally,
    ) {
        self.tallies.insert(
            (tool_consumer_instance_guid.into(), course_id, student_id),
            tally,
        );
    }
}

impl AttendanceSource for InMemoryAttendance {
    async fn tally(
        &self,
        tool_consumer_instance_guid: &str,
        course_id: CourseId,
        student_id: StudentId,
    ) -> AttendanceTally {
        self.tallies
            .get(&(tool_consumer_instance_guid.to_string(), course_id, student_id))
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_records_no_grade() {
        assert_eq!(AttendanceTally::default().grade(None), None);
    }

    #[test]
    fn test_grade_uses_default_tardy_weight() {
        // (3 + 1 * 0.8) / 5
        let grade = AttendanceTally::new(3, 1, 1).grade(None).unwrap();
        assert_eq!(grade.to_string(), "76.00");
        assert_eq!(grade.posted_grade(), "76.00%");
    }

    #[test]
    fn test_grade_uses_configured_tardy_weight() {
        let tally = AttendanceTally::new(1, 1, 0);
        assert_eq!(tally.grade(Some(0.0)).unwrap(), Grade::from_percent(50.0));
        assert_eq!(tally.grade(Some(1.0)).unwrap(), Grade::from_percent(100.0));
    }

    #[test]
    fn test_total_does_not_overflow() {
        let tally = AttendanceTally::new(u32::MAX, u32::MAX, u32::MAX);
        assert_eq!(tally.total(), 3 * u64::from(u32::MAX));
        assert_eq!(tally.grade(Some(1.0)).unwrap().to_string(), "66.67");
    }

    #[test]
    fn test_grade_rounding() {
        let grade = AttendanceTally::new(2, 0, 1).grade(None).unwrap();
        assert_eq!(grade.to_string(), "66.67");
        assert!((grade.percent() - 66.67).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let source = InMemoryAttendance::new();
        source.record(
            "abc123",
            CourseId::new(1),
            StudentId::new(2),
            AttendanceTally::new(4, 0, 0),
        );

        let tally = source.tally("abc123", CourseId::new(1), StudentId::new(2)).await;
        assert_eq!(tally.present, 4);

        let other = source.tally("other", CourseId::new(1), StudentId::new(2)).await;
        assert_eq!(other, AttendanceTally::default());
    }

    proptest::proptest! {
        #[test]
        fn prop_grade_is_a_percentage(present in 0u32..500, late in 0u32..500, absent in 0u32..500, weight in 0.0f64..=1.0) {
            let tally = AttendanceTally::new(present, late, absent);
            match tally.grade(Some(weight)) {
                None => proptest::prop_assert_eq!(tally.total(), 0),
                Some(grade) => proptest::prop_assert!((0.0..=100.0).contains(&grade.percent())),
            }
        }

        #[test]
        fn prop_more_presence_never_lowers_grade(present in 0u32..500, late in 0u32..500, absent in 1u32..500) {
            let base = AttendanceTally::new(present, late, absent).grade(None);
            let better = AttendanceTally::new(present + 1, late, absent - 1).grade(None);
            proptest::prop_assert!(better >= base);
        }
    }
}
