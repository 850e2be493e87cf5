use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use super::error::ApiError;
use super::types::{ApiPost, ApiUser, MediaUploadResponse, PostedStatus, TokenResponse};
use crate::oauth::{percent_encode, Signer};
use crate::util::read_limited_bytes;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

const TOKEN_PATH: &str = "/oauth2/token";
const USERS_LOOKUP_PATH: &str = "/1.1/users/lookup.json";
const USER_TIMELINE_PATH: &str = "/1.1/statuses/user_timeline.json";
const STATUS_UPDATE_PATH: &str = "/1.1/statuses/update.json";
const MEDIA_UPLOAD_PATH: &str = "/1.1/media/upload.json";

/// Endpoint roots and transport settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub api_base_url: String,
    pub upload_base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.twitter.com".to_string(),
            upload_base_url: "https://upload.twitter.com".to_string(),
            user_agent: concat!("curator/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Process-lifetime slot for the application-only bearer token.
///
/// Filled at most once; concurrent first callers wait on a single exchange.
/// A failed exchange leaves the slot empty so the next call retries it.
#[derive(Clone, Default)]
pub struct BearerCache(Arc<OnceCell<SecretString>>);

impl BearerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.0.initialized()
    }
}

/// Which identity field a batch user lookup filters on.
#[derive(Debug, Clone, Copy)]
pub enum UserLookup {
    Handle,
    Id,
}

impl UserLookup {
    fn param(self) -> &'static str {
        match self {
            UserLookup::Handle => "screen_name",
            UserLookup::Id => "user_id",
        }
    }
}

/// Authenticated client for the platform API.
///
/// Read calls use the application-only bearer token; writes (status, media)
/// are signed with OAuth 1.0a user context.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    signer: Arc<Signer>,
    bearer: BearerCache,
    settings: Arc<ApiSettings>,
}

impl ApiClient {
    pub fn new(
        settings: ApiSettings,
        signer: Signer,
        bearer: BearerCache,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(ApiError::from_reqwest)?;
        Ok(Self {
            http,
            signer: Arc::new(signer),
            bearer,
            settings: Arc::new(settings),
        })
    }

    // ========================================================================
    // Bearer token
    // ========================================================================

    async fn bearer_token(&self) -> Result<&SecretString, ApiError> {
        self.bearer
            .0
            .get_or_try_init(|| self.exchange_bearer_token())
            .await
    }

    async fn exchange_bearer_token(&self) -> Result<SecretString, ApiError> {
        let creds = self.signer.credentials();
        let basic = BASE64.encode(format!(
            "{}:{}",
            percent_encode(creds.consumer_key.expose_secret()),
            percent_encode(creds.consumer_secret.expose_secret())
        ));

        let response = self
            .http
            .post(self.api_url(TOKEN_PATH)?)
            .header(AUTHORIZATION, format!("Basic {}", basic))
            .header(USER_AGENT, &self.settings.user_agent)
            .header(
                CONTENT_TYPE,
                "application/x-www-form-urlencoded;charset=UTF-8",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let token: TokenResponse = read_json(response, "bearer token exchange").await?;
        if !token.token_type.eq_ignore_ascii_case("bearer") {
            return Err(ApiError::Decode(format!(
                "unexpected token type '{}'",
                token.token_type
            )));
        }

        tracing::info!("Obtained application bearer token");
        Ok(SecretString::from(token.access_token))
    }

    async fn bearer_get<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T, ApiError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()))
            .header(USER_AGENT, &self.settings.user_agent)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        read_json(response, what).await
    }

    // ========================================================================
    // Read operations
    // ========================================================================

    /// Resolve a batch of accounts by handle or id (comma-joined into a single
    /// request).
    pub async fn lookup_users(
        &self,
        by: UserLookup,
        values: &[String],
    ) -> Result<Vec<ApiUser>, ApiError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let mut url = self.api_url(USERS_LOOKUP_PATH)?;
        url.query_pairs_mut()
            .append_pair(by.param(), &values.join(","));

        let users: Vec<ApiUser> = self.bearer_get(url, "users lookup").await?;
        tracing::debug!(requested = values.len(), found = users.len(), "Users lookup");
        Ok(users)
    }

    /// Fetch up to `count` most recent posts of `handle`, newest first.
    pub async fn user_timeline(&self, handle: &str, count: u32) -> Result<Vec<ApiPost>, ApiError> {
        let mut url = self.api_url(USER_TIMELINE_PATH)?;
        url.query_pairs_mut()
            .append_pair("screen_name", handle)
            .append_pair("count", &count.to_string());

        let posts: Vec<ApiPost> = self.bearer_get(url, "user timeline").await?;
        tracing::info!(handle = %handle, posts = posts.len(), "Fetched timeline");
        Ok(posts)
    }

    // ========================================================================
    // Write operations (OAuth 1.0a user context)
    // ========================================================================

    /// Upload binary media and return the opaque media id to attach to a status.
    pub async fn upload_media(&self, media: Vec<u8>) -> Result<String, ApiError> {
        let url = self.upload_url(MEDIA_UPLOAD_PATH)?;
        // Multipart payloads are not part of the signature base string
        let authorization = self.signer.authorization_header("POST", url.as_str(), &[])?;

        let size = media.len();
        let form = reqwest::multipart::Form::new().part(
            "media",
            reqwest::multipart::Part::bytes(media).file_name("media"),
        );

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, authorization)
            .header(USER_AGENT, &self.settings.user_agent)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let uploaded: MediaUploadResponse = read_json(response, "media upload").await?;
        tracing::info!(bytes = size, media_id = %uploaded.media_id_string, "Uploaded media");
        Ok(uploaded.media_id_string)
    }

    /// Publish a status, optionally attaching a previously uploaded media id.
    pub async fn post_status(
        &self,
        text: &str,
        media_id: Option<&str>,
    ) -> Result<PostedStatus, ApiError> {
        let url = self.api_url(STATUS_UPDATE_PATH)?;

        let mut params: Vec<(&str, &str)> = vec![("status", text)];
        if let Some(media_id) = media_id {
            params.push(("media_ids", media_id));
        }

        let authorization = self
            .signer
            .authorization_header("POST", url.as_str(), &params)?;
        let body = params
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, authorization)
            .header(USER_AGENT, &self.settings.user_agent)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let posted: PostedStatus = read_json(response, "status update").await?;
        tracing::info!(status_id = %posted.id_str, with_media = media_id.is_some(), "Status published");
        Ok(posted)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn api_url(&self, path: &str) -> Result<Url, ApiError> {
        join_url(&self.settings.api_base_url, path)
    }

    fn upload_url(&self, path: &str) -> Result<Url, ApiError> {
        join_url(&self.settings.upload_base_url, path)
    }
}

fn join_url(base: &str, path: &str) -> Result<Url, ApiError> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| ApiError::Decode(format!("invalid URL '{}': {}", joined, e)))
}

/// Read a success body as JSON, or turn a non-2xx into [`ApiError::HttpStatus`]
/// carrying the platform's response body.
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE)
        .await
        .map_err(ApiError::from_body)?;

    if !status.is_success() {
        let err = ApiError::http_status(status.as_u16(), &bytes);
        tracing::warn!(call = what, status = status.as_u16(), error = %err, "Platform rejected request");
        return Err(err);
    }

    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::Credentials;
    use wiremock::matchers::{body_string, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_signer() -> Signer {
        Signer::new(Credentials {
            consumer_key: SecretString::from("ckey"),
            consumer_secret: SecretString::from("csecret"),
            access_token: SecretString::from("atoken"),
            access_token_secret: SecretString::from("asecret"),
        })
    }

    fn test_client(server: &MockServer) -> ApiClient {
        let settings = ApiSettings {
            api_base_url: server.uri(),
            upload_base_url: server.uri(),
            user_agent: "curator-test".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        ApiClient::new(settings, test_signer(), BearerCache::new()).unwrap()
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        // base64("ckey:csecret")
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(header("authorization", "Basic Y2tleTpjc2VjcmV0"))
            .and(body_string("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"token_type":"bearer","access_token":"AAAA%2FBBBB"}"#,
            ))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_user_timeline_uses_cached_bearer() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(USER_TIMELINE_PATH))
            .and(query_param("screen_name", "someone"))
            .and(query_param("count", "50"))
            .and(header("authorization", "Bearer AAAA%2FBBBB"))
            .and(header("user-agent", "curator-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id_str":"2","text":"b","favorite_count":1,"retweet_count":2},
                    {"id_str":"1","text":"a"}]"#,
            ))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let first = client.user_timeline("someone", 50).await.unwrap();
        let second = client.user_timeline("someone", 50).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id_str, "2");
        assert_eq!(first[0].retweet_count, Some(2));
        assert_eq!(second.len(), 2);
        assert!(client.bearer.is_initialized());
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_exchange() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(USERS_LOOKUP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let handles = vec!["a".to_string()];
        let (a, b, c) = tokio::join!(
            client.lookup_users(UserLookup::Handle, &handles),
            client.lookup_users(UserLookup::Handle, &handles),
            client.lookup_users(UserLookup::Handle, &handles),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
    }

    #[tokio::test]
    async fn test_failed_token_exchange_is_retried_later() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(USERS_LOOKUP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let handles = vec!["a".to_string()];
        let first = client.lookup_users(UserLookup::Handle, &handles).await;
        assert!(matches!(first, Err(ApiError::HttpStatus { status: 503, .. })));
        assert!(!client.bearer.is_initialized());

        let second = client.lookup_users(UserLookup::Handle, &handles).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_lookup_users_comma_joined() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(USERS_LOOKUP_PATH))
            .and(query_param("screen_name", "alice,bob"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id_str":"10","screen_name":"alice"},{"id_str":"11","screen_name":"bob"}]"#,
            ))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let users = client
            .lookup_users(UserLookup::Handle, &["alice".to_string(), "bob".to_string()])
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].screen_name, "bob");
    }

    #[tokio::test]
    async fn test_lookup_users_by_id() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(USERS_LOOKUP_PATH))
            .and(query_param("user_id", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id_str":"10","screen_name":"alice"}]"#,
            ))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let users = client
            .lookup_users(UserLookup::Id, &["10".to_string()])
            .await
            .unwrap();
        assert_eq!(users[0].id_str, "10");
    }

    #[tokio::test]
    async fn test_lookup_users_empty_makes_no_request() {
        let server = MockServer::start().await;
        let client = test_client(&server);
        let users = client.lookup_users(UserLookup::Handle, &[]).await.unwrap();
        assert!(users.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeline_error_carries_body() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(USER_TIMELINE_PATH))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string(r#"{"errors":[{"code":88,"message":"Rate limit exceeded"}]}"#),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.user_timeline("someone", 50).await.unwrap_err();
        assert!(err.is_rate_limited());
        match err {
            ApiError::HttpStatus { body, .. } => assert!(body.contains("Rate limit exceeded")),
            e => panic!("Expected HttpStatus, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_post_status_signed_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STATUS_UPDATE_PATH))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(header_exists("authorization"))
            .and(body_string("status=ol%C3%A1%20mundo%21&media_ids=777"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id_str":"900"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let posted = client.post_status("olá mundo!", Some("777")).await.unwrap();
        assert_eq!(posted.id_str, "900");

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(auth.starts_with("OAuth oauth_consumer_key=\"ckey\""));
        assert!(auth.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(auth.contains("oauth_token=\"atoken\""));
    }

    #[tokio::test]
    async fn test_post_status_duplicate_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STATUS_UPDATE_PATH))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string(r#"{"errors":[{"code":187,"message":"Status is a duplicate."}]}"#),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.post_status("same again", None).await.unwrap_err();
        assert!(matches!(err, ApiError::HttpStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_upload_media_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MEDIA_UPLOAD_PATH))
            .and(header_exists("authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"media_id":710511363345354753,"media_id_string":"710511363345354753"}"#),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let media_id = client.upload_media(vec![0x89, b'P', b'N', b'G']).await.unwrap();
        assert_eq!(media_id, "710511363345354753");

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"media\""));
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MEDIA_UPLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.upload_media(vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
