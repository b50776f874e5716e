//! Bonsai HTTP clients
//!
//! Typed clients for the storefront backend (session and pipeline endpoints)
//! and the artifact server. Authentication requirements are enforced by the
//! client type: pipeline uploads and file listings are only reachable from an
//! [`client::AuthenticatedClient`].

pub mod client;
pub mod types;

pub use client::{AuthenticatedClient, ClientError, PublicClient, TypedClientBuilder, Upload};
