//! OAuth 1.0a request signing.
//!
//! - [`percent`] - RFC 3986 encoding over UTF-8 bytes
//! - [`signer`] - signature base string, HMAC-SHA1 and header assembly

mod percent;
mod signer;

pub use percent::{percent_decode, percent_encode};
pub use signer::{signature_base_string, Credentials, SignError, Signer};
