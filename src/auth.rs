//! Authenticated sessions for Google APIs.
//!
//! A session is backed either by a service account (JWT bearer grant) or by a
//! user-delegated OAuth2 token obtained through [`crate::oauth::OAuthFlow`].
//! Access tokens are refreshed lazily, in place, when they expire.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::{API_TIMEOUT, TOKEN_URI};
use crate::error::{DriveError, Result};
use crate::models::{ServiceAccountCredentials, StoredToken, TokenResponse};

/// Read-only access to file contents and metadata.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: i64,      // Expiration time
    iat: i64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }
}

enum Grant {
    ServiceAccount {
        client_email: String,
        key: EncodingKey,
    },
    User {
        client_id: String,
        client_secret: String,
        scopes: Vec<String>,
    },
}

struct TokenState {
    cached: Option<CachedToken>,
    refresh_token: Option<String>,
}

/// An authenticated session shared by the lister and downloader.
#[derive(Clone)]
pub struct Authenticator {
    grant: Arc<Grant>,
    token_uri: String,
    client: Client,
    state: Arc<RwLock<TokenState>>,
}

impl Authenticator {
    /// Create a service account session from a JSON credentials file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DriveError::AuthenticationError(format!(
                "cannot read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        let credentials: ServiceAccountCredentials =
            serde_json::from_str(&content).map_err(malformed_credentials)?;
        Self::new(credentials)
    }

    /// Create a service account session from any reader yielding JSON.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let credentials: ServiceAccountCredentials =
            serde_json::from_reader(reader).map_err(malformed_credentials)?;
        Self::new(credentials)
    }

    /// Create a service account session from already parsed JSON.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let credentials: ServiceAccountCredentials =
            serde_json::from_value(value).map_err(malformed_credentials)?;
        Self::new(credentials)
    }

    /// Create a service account session from credentials.
    ///
    /// The private key is parsed here so a broken credential fails
    /// construction instead of the first request.
    pub fn new(credentials: ServiceAccountCredentials) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes()).map_err(|e| {
            DriveError::AuthenticationError(format!("invalid service account key: {}", e))
        })?;
        let token_uri = credentials
            .token_uri
            .unwrap_or_else(|| TOKEN_URI.to_string());

        info!(client_email = %credentials.client_email, "service account session created");

        Ok(Self {
            grant: Arc::new(Grant::ServiceAccount {
                client_email: credentials.client_email,
                key,
            }),
            token_uri,
            client: Client::new(),
            state: Arc::new(RwLock::new(TokenState {
                cached: None,
                refresh_token: None,
            })),
        })
    }

    /// Rebuild a user session from a token stored by the caller.
    ///
    /// An expired access token is refreshed right away when a refresh token
    /// is present. Without one the session is still created, and the first
    /// authenticated call fails with [`DriveError::AuthenticationError`].
    pub async fn from_stored_token(token: StoredToken) -> Result<Self> {
        let session = Self::from_token_parts(token);
        let expired = {
            let state = session.state.read().await;
            !state.cached.as_ref().is_some_and(CachedToken::is_fresh)
                && state.refresh_token.is_some()
        };
        if expired {
            session.access_token().await?;
        }
        info!("user session restored from stored token");
        Ok(session)
    }

    pub(crate) fn from_token_parts(token: StoredToken) -> Self {
        let scopes = if token.scopes.is_empty() {
            vec![DRIVE_READONLY_SCOPE.to_string()]
        } else {
            token.scopes
        };
        let cached = token.token.map(|access_token| CachedToken {
            access_token,
            expires_at: token.expiry,
        });

        Self {
            grant: Arc::new(Grant::User {
                client_id: token.client_id,
                client_secret: token.client_secret,
                scopes,
            }),
            token_uri: token.token_uri,
            client: Client::new(),
            state: Arc::new(RwLock::new(TokenState {
                cached,
                refresh_token: token.refresh_token,
            })),
        }
    }

    pub fn is_service_account(&self) -> bool {
        matches!(*self.grant, Grant::ServiceAccount { .. })
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn access_token(&self) -> Result<String> {
        {
            let state = self.state.read().await;
            if let Some(token) = state.cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut state = self.state.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = state.cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        let response = match &*self.grant {
            Grant::ServiceAccount { client_email, key } => {
                self.request_service_token(client_email, key).await?
            }
            Grant::User {
                client_id,
                client_secret,
                ..
            } => {
                let refresh_token = state.refresh_token.clone().ok_or_else(|| {
                    DriveError::AuthenticationError(
                        "access token expired and no refresh token is available".to_string(),
                    )
                })?;
                self.request_refreshed_token(client_id, client_secret, &refresh_token)
                    .await?
            }
        };

        if let Some(refresh_token) = response.refresh_token {
            state.refresh_token = Some(refresh_token);
        }
        let token = CachedToken {
            access_token: response.access_token,
            expires_at: response.expires_in.and_then(expiry_after),
        };
        let access_token = token.access_token.clone();
        state.cached = Some(token);

        Ok(access_token)
    }

    /// Drop `rejected` from the cache after the API refused it, so the next
    /// [`access_token`](Self::access_token) call fetches a new one.
    ///
    /// Returns `false` when the session cannot obtain another token.
    pub async fn invalidate(&self, rejected: &str) -> bool {
        let mut state = self.state.write().await;
        let renewable = match &*self.grant {
            Grant::ServiceAccount { .. } => true,
            Grant::User { .. } => state.refresh_token.is_some(),
        };
        // A concurrent caller may already have replaced it.
        if renewable && state.cached.as_ref().is_some_and(|t| t.access_token == rejected) {
            state.cached = None;
        }
        renewable
    }

    /// Current token in its storable form. `None` for service accounts.
    pub async fn stored_token(&self) -> Option<StoredToken> {
        let Grant::User {
            client_id,
            client_secret,
            scopes,
        } = &*self.grant
        else {
            return None;
        };
        let state = self.state.read().await;
        Some(StoredToken {
            token: state.cached.as_ref().map(|t| t.access_token.clone()),
            refresh_token: state.refresh_token.clone(),
            token_uri: self.token_uri.clone(),
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            scopes: scopes.clone(),
            expiry: state.cached.as_ref().and_then(|t| t.expires_at),
        })
    }

    /// Exchange a signed JWT assertion for an access token.
    #[instrument(skip(self, key))]
    async fn request_service_token(
        &self,
        client_email: &str,
        key: &EncodingKey,
    ) -> Result<TokenResponse> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: client_email.to_string(),
            scope: DRIVE_READONLY_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let jwt = encode(&Header::new(Algorithm::RS256), &claims, key)
            .map_err(|e| DriveError::AuthenticationError(format!("JWT encoding failed: {}", e)))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ];

        debug!("requesting service account access token");
        self.post_token_request(&params).await
    }

    #[instrument(skip_all)]
    async fn request_refreshed_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        debug!("refreshing user access token");
        let response = self.post_token_request(&params).await?;
        info!("access token refreshed");
        Ok(response)
    }

    async fn post_token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        request_token(&self.client, &self.token_uri, params).await
    }
}

/// POST a form to a token endpoint and decode the token response.
pub(crate) async fn request_token(
    client: &Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client
        .post(token_uri)
        .form(params)
        .timeout(API_TIMEOUT)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(DriveError::AuthenticationError(format!(
            "token endpoint returned {}: {}",
            status, body
        )));
    }

    Ok(response.json().await?)
}

/// Absolute expiry `secs` seconds from now. `None` when the lifetime does
/// not fit a timestamp, which leaves the token without a known expiry.
pub(crate) fn expiry_after(secs: u64) -> Option<DateTime<Utc>> {
    let lifetime = i64::try_from(secs).ok().and_then(Duration::try_seconds)?;
    Utc::now().checked_add_signed(lifetime)
}

fn malformed_credentials(err: serde_json::Error) -> DriveError {
    DriveError::AuthenticationError(format!("malformed credentials JSON: {}", err))
}
