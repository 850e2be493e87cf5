use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use thiserror::Error;

use super::percent::percent_encode;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("Invalid HMAC signing key")]
    InvalidKey,
}

/// The four long-lived secrets of a user-context OAuth 1.0a client.
///
/// Fields are `SecretString` so they never show up in `Debug` output or logs.
pub struct Credentials {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub access_token: SecretString,
    pub access_token_secret: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("access_token_secret", &"[REDACTED]")
            .finish()
    }
}

/// Builds `Authorization: OAuth ...` header values.
#[derive(Debug)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Sign a request with a fresh nonce and the current unix timestamp.
    ///
    /// `url` must not contain a query string; query or form parameters go in
    /// `params`. File payloads are never part of `params`.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, SignError> {
        let nonce = generate_nonce();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_header_with(method, url, params, &nonce, &timestamp)
    }

    /// Deterministic variant of [`Signer::authorization_header`] with caller-supplied
    /// nonce and timestamp.
    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, SignError> {
        let creds = &self.credentials;
        let oauth_params: [(&str, &str); 6] = [
            ("oauth_consumer_key", creds.consumer_key.expose_secret()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp),
            ("oauth_token", creds.access_token.expose_secret()),
            ("oauth_version", OAUTH_VERSION),
        ];

        let base_string = signature_base_string(
            method,
            url,
            oauth_params.iter().chain(params.iter()).copied(),
        );
        let signing_key = format!(
            "{}&{}",
            percent_encode(creds.consumer_secret.expose_secret()),
            percent_encode(creds.access_token_secret.expose_secret())
        );

        let mut mac = Hmac::<Sha1>::new_from_slice(signing_key.as_bytes())
            .map_err(|_| SignError::InvalidKey)?;
        mac.update(base_string.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let mut header_params: Vec<(String, String)> = oauth_params
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .collect();
        header_params.push((
            percent_encode("oauth_signature"),
            percent_encode(&signature),
        ));
        header_params.sort();

        let joined = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {}", joined))
    }
}

/// `UPPER(method)&enc(url)&enc(k1=v1&k2=v2...)` with pairs encoded, then sorted
/// by key and value.
pub fn signature_base_string<'a>(
    method: &str,
    url: &str,
    params: impl Iterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut encoded: Vec<(String, String)> = params
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Reference request from the platform's "creating a signature" guide.
    const URL: &str = "https://api.twitter.com/1.1/statuses/update.json";
    const NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const TIMESTAMP: &str = "1318622958";
    const STATUS: &str = "Hello Ladies + Gentlemen, a signed OAuth request!";

    fn reference_signer() -> Signer {
        Signer::new(Credentials {
            consumer_key: SecretString::from("xvz1evFS4wEEPTGEFPHBog"),
            consumer_secret: SecretString::from("kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"),
            access_token: SecretString::from("370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            access_token_secret: SecretString::from("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"),
        })
    }

    #[test]
    fn test_reference_base_string() {
        let params = [
            ("status", STATUS),
            ("include_entities", "true"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", NONCE),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", TIMESTAMP),
            ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("oauth_version", "1.0"),
        ];
        let base = signature_base_string("post", URL, params.into_iter());
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958%26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn test_reference_header() {
        let header = reference_signer()
            .authorization_header_with(
                "POST",
                URL,
                &[("include_entities", "true"), ("status", STATUS)],
                NONCE,
                TIMESTAMP,
            )
            .unwrap();

        assert_eq!(
            header,
            "OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", \
             oauth_nonce=\"kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\", \
             oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\", \
             oauth_signature_method=\"HMAC-SHA1\", \
             oauth_timestamp=\"1318622958\", \
             oauth_token=\"370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb\", \
             oauth_version=\"1.0\""
        );
    }

    #[test]
    fn test_signing_is_deterministic() {
        let signer = reference_signer();
        let params = [("status", "olá mundo ☃")];
        let a = signer
            .authorization_header_with("POST", URL, &params, "abc", "1700000000")
            .unwrap();
        let b = signer
            .authorization_header_with("POST", URL, &params, "abc", "1700000000")
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_request_params_change_signature() {
        let signer = reference_signer();
        let a = signer
            .authorization_header_with("POST", URL, &[("status", "a")], "n", "1")
            .unwrap();
        let b = signer
            .authorization_header_with("POST", URL, &[("status", "b")], "n", "1")
            .unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("status="), "request params stay out of the header");
    }

    #[test]
    fn test_duplicate_keys_sorted_by_value() {
        let base = signature_base_string(
            "GET",
            "https://example.com/",
            [("b", "2"), ("a", "z"), ("a", "y")].into_iter(),
        );
        assert!(base.ends_with(&percent_encode("a=y&a=z&b=2")));
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let signer = reference_signer();
        let a = signer.authorization_header("GET", URL, &[]).unwrap();
        let b = signer.authorization_header("GET", URL, &[]).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\""));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let output = format!("{:?}", reference_signer());
        assert!(!output.contains("kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"));
        assert!(output.contains("[REDACTED]"));
    }
}
