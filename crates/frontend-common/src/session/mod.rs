//! In-memory session lifecycle
//!
//! A [`SessionStore`] is constructed once at startup, cloned into whatever
//! needs credentials, and torn down at shutdown. It owns the bearer token,
//! its expiry and the observers that follow it.

pub mod backend;
pub mod clock;
pub mod store;
pub mod subscriber;

pub use backend::SessionBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{Credential, SessionStore};
pub use subscriber::Subscriber;
