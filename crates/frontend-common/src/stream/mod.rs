//! Incremental reassembly of the pipeline event stream
//!
//! The response body arrives in arbitrary chunks. Bytes are decoded to text
//! with [`Utf8Decoder`], framed on blank lines and classified into
//! [`JobMessage`](bonsai_core::JobMessage)s by [`StreamDispatcher`].

pub mod decoder;
pub mod dispatcher;

pub use decoder::Utf8Decoder;
pub use dispatcher::{StreamDispatcher, StreamOutcome};
