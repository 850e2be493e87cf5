//! Authenticated client for the social platform API.

mod client;
mod error;
mod types;

pub use client::{ApiClient, ApiSettings, BearerCache, UserLookup};
pub use error::ApiError;
pub use types::{ApiPost, ApiUser, PostedStatus};
