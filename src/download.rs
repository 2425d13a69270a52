//! File downloads, public and authenticated.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::api::DriveApi;
use crate::error::{DriveError, Result};
use crate::models::{GOOGLE_APPS_PREFIX, MIME_PDF};

/// Bound on each network read while downloading.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

static CONFIRM_HREF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(/uc\?export=download[^"]+)""#).expect("Invalid confirm link regex")
});

static DOWNLOAD_FORM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<form[^>]*id="download-form"[^>]*action="([^"]+)"[^>]*>(.*?)</form>"#)
        .expect("Invalid download form regex")
});

static HIDDEN_INPUT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input[^>]*type="hidden"[^>]*name="([^"]+)"[^>]*value="([^"]*)""#)
        .expect("Invalid hidden input regex")
});

/// Where a large-file warning page points to.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmTarget {
    /// Path on the Drive web host, already unescaped.
    Link(String),
    /// Absolute form action plus its hidden fields.
    Form {
        action: String,
        fields: Vec<(String, String)>,
    },
}

/// Find the real download behind a virus-scan warning page.
pub fn find_confirm_target(html: &str) -> Option<ConfirmTarget> {
    if let Some(href) = CONFIRM_HREF_REGEX.captures(html).and_then(|c| c.get(1)) {
        return Some(ConfirmTarget::Link(unescape_html(href.as_str())));
    }

    let form = DOWNLOAD_FORM_REGEX.captures(html)?;
    let action = unescape_html(form.get(1)?.as_str());
    let fields = HIDDEN_INPUT_REGEX
        .captures_iter(form.get(2)?.as_str())
        .filter_map(|c| Some((c.get(1)?.as_str().to_string(), unescape_html(c.get(2)?.as_str()))))
        .collect();
    Some(ConfirmTarget::Form { action, fields })
}

fn unescape_html(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
}

/// Name used for a Google Doc exported as PDF.
pub fn export_file_name(file_name: &str) -> String {
    if let Some(stem) = strip_suffix_ignore_case(file_name, ".gdoc") {
        format!("{}.pdf", stem)
    } else if strip_suffix_ignore_case(file_name, ".pdf").is_some() {
        file_name.to_string()
    } else {
        format!("{}.pdf", file_name)
    }
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    let tail = s.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..split])
}

/// Local path for `relative` below `base`, ignoring anything that would
/// climb out of it.
pub fn local_path(base: &Path, relative: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    for part in relative.split(['/', '\\']) {
        if let Some(Component::Normal(normal)) = Path::new(part).components().next() {
            path.push(normal);
        }
    }
    path
}

/// Writes Drive files into a download directory.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: Client,
    web_base: String,
    download_dir: PathBuf,
}

impl Downloader {
    pub fn new(http: Client, web_base: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            web_base: web_base.into(),
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Download a publicly shared file through the direct download URL.
    #[instrument(skip(self))]
    pub async fn download_public(&self, file_id: &str, file_name: &str) -> Result<PathBuf> {
        let url = format!("{}/uc", self.web_base);
        let request = self
            .http
            .get(&url)
            .query(&[("export", "download"), ("id", file_id)]);
        let response = tokio::time::timeout(DOWNLOAD_TIMEOUT, request.send()).await??;
        let response = check_public_status(response)?;

        let response = if is_html(&response) {
            self.follow_interstitial(response).await?
        } else {
            response
        };

        let path = local_path(&self.download_dir, file_name);
        write_stream(response, &path).await?;
        info!(path = %path.display(), "downloaded (public)");
        Ok(path)
    }

    /// Large files answer with an HTML warning instead of content. Anything
    /// else HTML here is a sign-in or error page.
    async fn follow_interstitial(&self, response: Response) -> Result<Response> {
        let final_url = response.url().to_string();
        let html = tokio::time::timeout(DOWNLOAD_TIMEOUT, response.text()).await??;

        let is_warning = html.to_lowercase().contains("virus scan warning")
            || final_url.to_lowercase().contains("download");
        let target = is_warning.then(|| find_confirm_target(&html)).flatten();

        let request = match target {
            Some(ConfirmTarget::Link(href)) => self.http.get(format!("{}{}", self.web_base, href)),
            Some(ConfirmTarget::Form { action, fields }) => self.http.get(action).query(&fields),
            None => {
                return Err(DriveError::AccessError(
                    "file is not publicly downloadable".to_string(),
                ))
            }
        };

        debug!("following large file confirmation");
        let response = tokio::time::timeout(DOWNLOAD_TIMEOUT, request.send()).await??;
        check_public_status(response)
    }

    /// Download through the API, exporting Google Docs as PDF.
    #[instrument(skip(self, api))]
    pub async fn download_authenticated(
        &self,
        api: &DriveApi,
        file_id: &str,
        file_name: &str,
    ) -> Result<PathBuf> {
        let metadata = api.get_file(file_id).await?;
        let mime_type = metadata.mime_type.unwrap_or_default();

        let (response, file_name) = if mime_type.starts_with(GOOGLE_APPS_PREFIX) {
            if !mime_type.contains("document") {
                return Err(DriveError::UnsupportedTypeError(mime_type));
            }
            (api.export(file_id, MIME_PDF).await?, export_file_name(file_name))
        } else {
            (api.media(file_id).await?, file_name.to_string())
        };

        let path = local_path(&self.download_dir, &file_name);
        write_stream(response, &path).await?;
        info!(path = %path.display(), "downloaded (authenticated)");
        Ok(path)
    }
}

fn check_public_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(DriveError::AccessError(format!(
            "download returned status {}",
            status.as_u16()
        )))
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

/// Stream a response body to `path`, creating parent directories.
async fn write_stream(response: Response, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = tokio::time::timeout(DOWNLOAD_TIMEOUT, stream.next()).await? {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(())
}
