//! Client-side session and pipeline job logic shared by Bonsai frontends
//!
//! Construct one [`SessionStore`] at startup, hand clones to the
//! [`JobClient`] and anything else that needs the bearer credential, and
//! call [`SessionStore::teardown`] on shutdown.

pub mod config;
pub mod services;
pub mod session;
pub mod stream;

pub use config::{AuthConfig, ClientConfig};
pub use services::{JobClient, JobError, JobObserver};
pub use session::{Clock, Credential, SessionBackend, SessionStore, Subscriber};
pub use stream::{StreamDispatcher, StreamOutcome};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
