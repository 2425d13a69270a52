//! Google Drive client combining public and authenticated access.

use std::future::Future;
use std::path::PathBuf;

use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::api::DriveApi;
use crate::auth::Authenticator;
use crate::config::DriveConfig;
use crate::download::Downloader;
use crate::error::{DriveError, Result};
use crate::lister::AuthenticatedLister;
use crate::models::{DownloadResult, FileRecord};
use crate::scraper::PublicScraper;
use crate::url_parser::extract_id;

/// Run the public operation first; if it fails, run the authenticated one.
///
/// Without a session the public error is returned as
/// [`DriveError::NotAuthenticatedError`]. When both paths fail the result
/// carries both errors.
pub async fn public_then_authenticated<T, P, F, A>(
    resource: &'static str,
    public: P,
    api: Option<DriveApi>,
    authenticated: F,
) -> Result<T>
where
    P: Future<Output = Result<T>>,
    F: FnOnce(DriveApi) -> A,
    A: Future<Output = Result<T>>,
{
    let public_error = match public.await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let Some(api) = api else {
        return Err(DriveError::NotAuthenticatedError {
            resource,
            reason: format!("public access failed ({})", public_error),
        });
    };

    warn!(error = %public_error, "public access failed, using authenticated session");
    authenticated(api)
        .await
        .map_err(|e| DriveError::AllPathsFailed {
            public_error: public_error.to_string(),
            source: Box::new(e),
        })
}

/// Client for reading folders and files from Google Drive.
pub struct DriveClient {
    http: Client,
    config: DriveConfig,
    session: Option<Authenticator>,
}

impl DriveClient {
    /// Create a client without credentials; only public folders are
    /// reachable until a session is attached.
    pub fn new(config: DriveConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            session: None,
        }
    }

    /// Attach an authenticated session used when public access fails.
    pub fn with_session(mut self, session: Authenticator) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Authenticator> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn scraper(&self) -> PublicScraper {
        PublicScraper::new(self.http.clone(), self.config.web_base.clone())
    }

    pub fn downloader(&self) -> Downloader {
        Downloader::new(
            self.http.clone(),
            self.config.web_base.clone(),
            self.config.download_dir.clone(),
        )
    }

    /// API client for the current session, if any.
    pub fn api(&self) -> Option<DriveApi> {
        self.session.as_ref().map(|session| {
            DriveApi::new(
                self.http.clone(),
                self.config.api_base.clone(),
                session.clone(),
            )
        })
    }

    fn require_api(&self, resource: &'static str) -> Result<DriveApi> {
        self.api().ok_or(DriveError::NotAuthenticatedError {
            resource,
            reason: "recursive listing is only available through the Drive API".to_string(),
        })
    }

    /// List files in a folder, publicly first and then through the API.
    #[instrument(skip(self, mime_types))]
    pub async fn list_folder_files(
        &self,
        folder_url: &str,
        mime_types: Option<&[String]>,
    ) -> Result<Vec<FileRecord>> {
        let folder_id = extract_id(folder_url);
        let folder_id = folder_id.as_str();
        let scraper = self.scraper();

        public_then_authenticated(
            "Folder",
            scraper.list_folder(folder_id, mime_types),
            self.api(),
            |api| async move {
                AuthenticatedLister::new(api)
                    .list_folder(folder_id, mime_types)
                    .await
            },
        )
        .await
    }

    /// List every file below a folder. Requires a session.
    #[instrument(skip(self, mime_types))]
    pub async fn list_folder_recursive(
        &self,
        folder_url: &str,
        mime_types: Option<&[String]>,
    ) -> Result<Vec<FileRecord>> {
        let api = self.require_api("Folder")?;
        let folder_id = extract_id(folder_url);
        Ok(AuthenticatedLister::new(api)
            .list_recursive(&folder_id, mime_types)
            .await)
    }

    /// Download one file, publicly first and then through the API.
    ///
    /// `file_name` may contain `/` to place the file in a subdirectory of
    /// the download directory.
    #[instrument(skip(self))]
    pub async fn download_file(&self, file_id: &str, file_name: &str) -> Result<PathBuf> {
        let downloader = &self.downloader();

        public_then_authenticated(
            "File",
            downloader.download_public(file_id, file_name),
            self.api(),
            |api| async move {
                downloader
                    .download_authenticated(&api, file_id, file_name)
                    .await
            },
        )
        .await
    }

    /// Download every file of a folder. Files that fail are logged and
    /// left out of the result.
    #[instrument(skip(self))]
    pub async fn download_folder(
        &self,
        folder_url: &str,
        recursive: bool,
    ) -> Result<Vec<DownloadResult>> {
        let files = if recursive {
            self.list_folder_recursive(folder_url, None).await?
        } else {
            self.list_folder_files(folder_url, None).await?
        };

        let mut downloaded = Vec::with_capacity(files.len());
        for file in files {
            let result = self.download_file(&file.id, file.relative_path()).await;
            match result {
                Ok(local_path) => downloaded.push(DownloadResult { file, local_path }),
                Err(e) => warn!(name = %file.name, error = %e, "failed to download"),
            }
        }

        info!(count = downloaded.len(), "folder download finished");
        Ok(downloaded)
    }
}
