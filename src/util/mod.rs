//! Helpers shared by the outbound HTTP clients.

mod http;

pub use http::{read_limited_bytes, BodyError};
