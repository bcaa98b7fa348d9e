//! Rollbook Authorization - session-scoped LMS resource authorization.
//!
//! Every access to a course, section, account or student record goes
//! through this crate. A session remembers which resources its user has
//! already been verified for; anything else is checked against the LMS once,
//! through a short-lived cache of LMS payloads.
//!
//! # Architecture
//!
//! ```text
//!     Request ──► Session ──► Authorizer::load_and_authorize_*
//!                                   │
//!                    ┌──────────────┼─────────────────┐
//!                    ▼              ▼                 ▼
//!           AuthorizationSet   ResourceCache      LmsClient
//!           (already allowed)  (payloads, TTL)   (remote check)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rollbook_authz::{CacheConfig, Session};
//!
//! let mut session = Session::new(launch, CacheConfig::production());
//! let course = session
//!     .authorizer(&client)
//!     .load_and_authorize_course(course_id)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authorization;
pub mod cache;
pub mod error;
pub mod loaders;
pub mod session;

// Re-exports for convenience
pub use authorization::AuthorizationSet;
pub use cache::{CacheConfig, CacheStats, ResourceCache};
pub use error::{AuthzError, AuthzResult};
pub use loaders::Authorizer;
pub use session::Session;
