//! Three-legged OAuth2 consent flow.
//!
//! The caller sends the user to [`OAuthFlow::authorization_url`], receives an
//! authorization code back and passes it to [`OAuthFlow::complete`]. The
//! returned [`StoredToken`] is the caller's to persist.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use reqwest::Client;
use tracing::{info, instrument};
use url::Url;

use crate::auth::{expiry_after, request_token, Authenticator, DRIVE_READONLY_SCOPE};
use crate::config::DriveConfig;
use crate::error::{DriveError, Result};
use crate::models::StoredToken;

/// Out-of-band redirect: the consent page shows the code to the user.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Builds consent URLs and exchanges authorization codes.
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_uri: String,
    token_uri: String,
    client: Client,
}

impl OAuthFlow {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        config: &DriveConfig,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: OOB_REDIRECT_URI.to_string(),
            auth_uri: config.auth_uri.clone(),
            token_uri: config.token_uri.clone(),
            client: Client::new(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Consent URL requesting offline access and a forced consent prompt.
    ///
    /// Returns the URL together with the random `state` value it carries.
    pub fn authorization_url(&self) -> Result<(String, String)> {
        let state = random_state();

        let mut url = Url::parse(&self.auth_uri).map_err(|e| {
            DriveError::AuthenticationError(format!("invalid authorization endpoint: {}", e))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", DRIVE_READONLY_SCOPE)
            .append_pair("state", &state)
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent");

        Ok((url.to_string(), state))
    }

    /// Exchange an authorization code for a session and its storable token.
    #[instrument(skip_all)]
    pub async fn complete(&self, code: &str) -> Result<(Authenticator, StoredToken)> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = request_token(&self.client, &self.token_uri, &params).await?;

        let scopes = response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| vec![DRIVE_READONLY_SCOPE.to_string()]);

        let token = StoredToken {
            token: Some(response.access_token),
            refresh_token: response.refresh_token,
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes,
            expiry: response.expires_in.and_then(expiry_after),
        };

        info!("authorization code exchanged for user token");
        Ok((Authenticator::from_token_parts(token.clone()), token))
    }
}

fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_requests_offline_consent() {
        let flow = OAuthFlow::new("cid", "secret", &DriveConfig::default());
        let (auth_url, state) = flow.authorization_url().unwrap();

        let url = Url::parse(&auth_url).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert!(auth_url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("prompt"), Some("consent"));
        assert_eq!(get("scope"), Some(DRIVE_READONLY_SCOPE));
        assert_eq!(get("redirect_uri"), Some(OOB_REDIRECT_URI));
        assert_eq!(get("state"), Some(state.as_str()));
    }

    #[test]
    fn test_state_is_random() {
        assert_ne!(random_state(), random_state());
    }

    #[test]
    fn test_custom_redirect_uri() {
        let flow = OAuthFlow::new("cid", "secret", &DriveConfig::default())
            .with_redirect_uri("http://localhost:8080/callback");
        let (auth_url, _) = flow.authorization_url().unwrap();
        assert!(auth_url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
    }
}
