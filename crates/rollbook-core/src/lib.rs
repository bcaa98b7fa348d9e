//! # Rollbook Core
//!
//! Core types and traits for the Rollbook attendance add-on.
//!
//! This crate provides the foundational types used throughout Rollbook:
//!
//! - [`CourseId`], [`SectionId`], [`StudentId`] and friends - typed LMS identifiers
//! - [`ResourceKind`] - the resource kinds a session can be authorized for
//! - [`LmsClient`] / [`LmsConnector`] - the LMS capability interface
//! - [`Course`], [`Section`], [`Student`], [`CachedAccount`] - validated domain objects
//! - [`CourseConfig`] - per-course grading weights and the regrade signal
//! - [`AttendanceAssignment`] - the gradebook column attendance grades are posted to
//! - [`LmsError`] - standard error types

#![doc(html_root_url = "https://docs.rs/rollbook-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod assignment;
pub mod attendance;
pub mod course_config;
mod domain;
mod error;
pub mod fixtures;
pub mod http_client;
mod ids;
mod launch;
mod lms;
pub mod records;

pub use assignment::AttendanceAssignment;
pub use attendance::{AttendanceSource, AttendanceTally, Grade, InMemoryAttendance};
pub use course_config::{CourseConfig, CourseConfigStore, InMemoryCourseConfigStore, SavedConfig};
pub use domain::{CachedAccount, Course, Section, Student};
pub use error::{ErrorCategory, LmsError, LmsResult, ValidationError};
pub use http_client::{HttpLmsClient, HttpLmsConnector};
pub use ids::{
    AccountId, AssignmentId, CourseId, ResourceKind, SectionId, SessionId, StudentId, UserId,
};
pub use launch::{LaunchContext, LaunchTarget};
pub use lms::{LmsClient, LmsConnector, NewAssignment};
