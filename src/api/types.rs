use serde::Deserialize;

use crate::storage::{ContentItem, NewSource};

/// Response of the application-only token exchange.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
}

/// Response of the media upload endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct MediaUploadResponse {
    pub media_id_string: String,
}

/// An account as returned by the batch user lookup. Only the fields a
/// source keeps are read; serde ignores the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    pub id_str: String,
    pub screen_name: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<ApiUser> for NewSource {
    fn from(user: ApiUser) -> Self {
        NewSource {
            user_id: user.id_str,
            handle: user.screen_name,
            display_name: user.name,
        }
    }
}

/// A post as returned by the user timeline endpoint.
///
/// Engagement counters may be missing from the payload; they stay `None`
/// instead of defaulting to zero.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPost {
    pub id_str: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_count: Option<i64>,
    #[serde(default)]
    pub retweet_count: Option<i64>,
    #[serde(default)]
    pub favorite_count: Option<i64>,
    #[serde(default)]
    pub quote_count: Option<i64>,
}

impl From<ApiPost> for ContentItem {
    fn from(post: ApiPost) -> Self {
        ContentItem {
            id: post.id_str,
            created_at: post.created_at,
            text: post.text,
            reply_count: post.reply_count,
            repost_count: post.retweet_count,
            favorite_count: post.favorite_count,
            quote_count: post.quote_count,
        }
    }
}

/// A status accepted by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct PostedStatus {
    pub id_str: String,
}
