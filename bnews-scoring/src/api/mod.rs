//! HTTP-facing adapters for the scoring core
//!
//! Routing lives with the embedding service; this module only provides the
//! pieces it plugs in: error responses and the progress SSE stream.

pub mod error;
pub mod sse;

pub use sse::progress_sse_stream;
