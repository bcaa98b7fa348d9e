//! # Rollbook Server
//!
//! HTTP front end of the Rollbook attendance add-on.
//!
//! The LMS launches the tool by POSTing to `/launch`; the launch starts a
//! cookie-keyed session. Later requests act as the launching user: every
//! course, section, account and student record is authorized through the
//! session before it is returned.
//!
//! # Architecture
//!
//! ```text
//!   LMS iframe ──► Server (hyper) ──► App::handle ──► Route
//!                                        │
//!                 ┌──────────────────────┼───────────────────────┐
//!                 ▼                      ▼                       ▼
//!           SessionStore           Authorizer              GradeSyncQueue
//!          (cookie → Session)   (LMS access checks)      (regrade on config change)
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | |
//! |--------|------|-|
//! | `POST` | `/launch` | start a session |
//! | `GET` | `/` | redirect to the launch target |
//! | `GET`, `POST` | `/logout` | end the session |
//! | `GET` | `/courses/{id}` | course and its grading config |
//! | `PUT` | `/courses/{id}/config` | save grading config, regrade if needed |
//! | `GET` | `/sections/{id}` | section with roster |
//! | `GET` | `/accounts/{id}` | account |
//! | `GET` | `/students/{id}?course_id=` | attendance tally and grade |
//! | `GET` | `/jobs/{id}` | status of a queued grade sync job |
//! | `GET` | `/health_check`, `/liveness`, `/readiness`, `/metrics` | operations |
//!
//! # Example
//!
//! ```bash
//! $ rollbook --config /etc/rollbook/rollbook.toml
//! ```

#![doc(html_root_url = "https://docs.rs/rollbook-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod bootstrap;
pub mod error;
pub mod health;
pub mod launch;
pub mod routes;
pub mod server;
pub mod session;
pub mod shutdown;

pub use app::{App, AppSettings};
pub use bootstrap::{build_server, RollbookServer};
pub use error::{ErrorResponse, ServerError, ServerResult};
pub use health::{ComponentStatus, HealthChecker, HealthMessage, ReadinessResponse};
pub use launch::LaunchParams;
pub use routes::Route;
pub use server::{Server, ServerSettings};
pub use session::{SessionStore, SharedSession, SESSION_COOKIE};
pub use shutdown::{ConnectionTracker, ShutdownSignal};

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
