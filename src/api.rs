//! Google Drive v3 endpoints used by the authenticated path.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, instrument};

use crate::auth::Authenticator;
use crate::config::API_TIMEOUT;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, FileListResponse, FileRecord};

/// Upper bound of `pageSize`; further pages are not requested.
pub const MAX_PAGE_SIZE: u32 = 1000;

const LIST_FIELDS: &str = "files(id, name, mimeType, size, createdTime)";
const GET_FIELDS: &str = "id, name, mimeType, size, createdTime";

/// Drive API client bound to one session.
#[derive(Clone)]
pub struct DriveApi {
    http: Client,
    api_base: String,
    session: Authenticator,
}

impl DriveApi {
    pub fn new(http: Client, api_base: impl Into<String>, session: Authenticator) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            session,
        }
    }

    pub fn session(&self) -> &Authenticator {
        &self.session
    }

    /// Direct children of a folder, excluding trashed items. Single page.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<FileRecord>> {
        let query = format!("'{}' in parents and trashed=false", folder_id);
        self.query_files(&query).await
    }

    /// Query files using Google Drive query syntax.
    #[instrument(skip(self))]
    pub async fn query_files(&self, query: &str) -> Result<Vec<FileRecord>> {
        let page_size = MAX_PAGE_SIZE.to_string();
        let request = self.http.get(format!("{}/files", self.api_base)).query(&[
            ("q", query),
            ("fields", LIST_FIELDS),
            ("pageSize", page_size.as_str()),
        ]);

        let response = self.send(request).await?;
        let list_response: FileListResponse = response.json().await?;
        Ok(list_response.files)
    }

    /// Get file metadata by ID.
    #[instrument(skip(self))]
    pub async fn get_file(&self, file_id: &str) -> Result<FileRecord> {
        let request = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .query(&[("fields", GET_FIELDS)]);

        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    /// Start a raw content download. The body is left unread.
    pub async fn media(&self, file_id: &str) -> Result<Response> {
        let request = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .query(&[("alt", "media")]);
        self.send_streaming(request).await
    }

    /// Start an export of a Google-native file into `mime_type`.
    pub async fn export(&self, file_id: &str, mime_type: &str) -> Result<Response> {
        let request = self
            .http
            .get(format!("{}/files/{}/export", self.api_base, file_id))
            .query(&[("mimeType", mime_type)]);
        self.send_streaming(request).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.send_streaming(request.timeout(API_TIMEOUT)).await
    }

    /// Send with the session's token. A 401 means the token went stale
    /// before its known expiry (or had none); it is refreshed once and the
    /// request repeated.
    async fn send_streaming(&self, request: RequestBuilder) -> Result<Response> {
        let retry = request.try_clone();
        let token = self.session.access_token().await?;
        let response = send_with_token(request, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(retry) = retry {
                if self.session.invalidate(&token).await {
                    debug!("access token rejected, refreshing");
                    let token = self.session.access_token().await?;
                    return check_status(send_with_token(retry, &token).await?).await;
                }
            }
        }

        check_status(response).await
    }
}

async fn send_with_token(request: RequestBuilder, token: &str) -> Result<Response> {
    Ok(tokio::time::timeout(API_TIMEOUT, request.bearer_auth(token).send()).await??)
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::from_status(
            api_error.error.code,
            api_error.error.message,
        ));
    }
    Err(DriveError::from_status(status.as_u16(), error_body))
}
