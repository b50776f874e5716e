//! Bonsai core types and utilities

pub mod job;
pub mod jwt;

pub use job::{Job, JobMessage, JobOutcome, JobState};
pub use jwt::Claims;
