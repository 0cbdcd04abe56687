//! Integration tests module
//!
//! End-to-end tests of the cache cascade over a scripted API and an
//! in-memory store, including:
//! - Reloads, warm starts and failure reporting
//! - Event-driven monitoring of finished contests
//! - Ranklist generation with final and predicted deltas
//! - The admin HTTP surface

pub mod contest_test;
pub mod problem_test;
pub mod ranklist_test;
pub mod rating_changes_test;
pub mod server_test;
