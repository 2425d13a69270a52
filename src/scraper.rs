//! Folder listing for publicly shared folders, without authentication.
//!
//! The Drive web UI has no documented contract. File ids are pulled out of
//! the folder page by a list of independent extractors, and each candidate's
//! name is read from its own view page. Everything here is best effort and
//! may stop working whenever the page markup changes.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};

use crate::error::{DriveError, Result};
use crate::models::{extensions_for_mime, FileRecord, MIME_PDF};

/// Requests without a browser User-Agent are often refused.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const FOLDER_PAGE_TIMEOUT: Duration = Duration::from_secs(15);
const FILE_PAGE_TIMEOUT: Duration = Duration::from_secs(5);
const SHARING_PAGE_TIMEOUT: Duration = Duration::from_secs(10);

const TITLE_SUFFIX: &str = " - Google Drive";

static FILE_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/d/([a-zA-Z0-9_-]+)").expect("Invalid file link regex"));

static ID_PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"id=([a-zA-Z0-9_-]+)").expect("Invalid id param regex"));

static FOLDER_VIEW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"folders/([a-zA-Z0-9_-]+)/view[^"]*id=([a-zA-Z0-9_-]+)"#)
        .expect("Invalid folder view regex")
});

static DATA_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-item-id="([a-zA-Z0-9_-]+)""#).expect("Invalid data-item-id regex")
});

static SCRIPT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script[^>]*>(.*?)</script>").expect("Invalid script regex"));

static SCRIPT_LITERAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']([a-zA-Z0-9_-]{20,})["']"#).expect("Invalid script literal regex")
});

static TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>([^<]+)</title>").expect("Invalid title regex"));

static OG_TITLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+property="og:title"\s+content="([^"]+)""#)
        .expect("Invalid og:title regex")
});

static JSON_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""name"\s*:\s*"([^"]+)""#).expect("Invalid JSON name regex"));

static PDF_REFERENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([^/]+\.pdf)").expect("Invalid PDF reference regex"));

/// Pulls candidate file ids out of a folder page.
pub type Extractor = fn(&str) -> HashSet<String>;

/// Candidate extractors, applied in order and unioned.
pub const EXTRACTORS: &[(&str, Extractor)] = &[
    ("file-permalink", file_permalinks),
    ("id-param", id_params),
    ("folder-view", folder_view_links),
    ("data-item-id", data_item_ids),
    ("script-literal", script_literals),
];

fn first_group(regex: &Regex, html: &str) -> HashSet<String> {
    regex
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn file_permalinks(html: &str) -> HashSet<String> {
    first_group(&FILE_LINK_REGEX, html)
}

pub fn id_params(html: &str) -> HashSet<String> {
    first_group(&ID_PARAM_REGEX, html)
}

/// `folders/<folder>/view...id=<file>`, keeping the file id.
pub fn folder_view_links(html: &str) -> HashSet<String> {
    FOLDER_VIEW_REGEX
        .captures_iter(html)
        .filter_map(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn data_item_ids(html: &str) -> HashSet<String> {
    first_group(&DATA_ITEM_REGEX, html)
}

/// Long quoted literals inside `<script>` blocks; Drive ids are at least
/// 20 characters.
pub fn script_literals(html: &str) -> HashSet<String> {
    SCRIPT_REGEX
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .flat_map(|script| first_group(&SCRIPT_LITERAL_REGEX, script.as_str()))
        .collect()
}

/// Union of every extractor's output, minus the folder's own id.
pub fn extract_candidate_ids(html: &str, folder_id: &str) -> BTreeSet<String> {
    let mut candidates = BTreeSet::new();
    for &(name, extract) in EXTRACTORS {
        let found = extract(html);
        debug!(extractor = name, count = found.len(), "extracted candidate ids");
        candidates.extend(found);
    }
    candidates.remove(folder_id);
    candidates
}

/// Display name from a file view page, or `file_<id>` when none is found.
pub fn derive_file_name(html: &str, file_id: &str) -> String {
    let from_title = TITLE_REGEX
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace(TITLE_SUFFIX, "").trim().to_string());

    let candidates = [
        from_title,
        capture_trimmed(&OG_TITLE_REGEX, html),
        capture_trimmed(&JSON_NAME_REGEX, html),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| format!("file_{}", file_id))
}

fn capture_trimmed(regex: &Regex, html: &str) -> Option<String> {
    regex
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Lowercase file extensions accepted for the requested MIME types.
pub fn allowed_extensions(mime_types: &[String]) -> Vec<&'static str> {
    mime_types
        .iter()
        .flat_map(|mime| extensions_for_mime(mime).iter().copied())
        .collect()
}

fn has_allowed_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext))
}

/// Lists publicly shared folders by scraping the Drive web UI.
#[derive(Debug, Clone)]
pub struct PublicScraper {
    http: Client,
    web_base: String,
}

impl PublicScraper {
    pub fn new(http: Client, web_base: impl Into<String>) -> Self {
        Self {
            http,
            web_base: web_base.into(),
        }
    }

    /// List files in a public folder whose names match `mime_types`
    /// (PDF only when `None`).
    ///
    /// Fails with [`DriveError::AccessError`] when the folder page itself is
    /// not reachable. Candidates that cannot be resolved are skipped.
    #[instrument(skip(self, mime_types))]
    pub async fn list_folder(
        &self,
        folder_id: &str,
        mime_types: Option<&[String]>,
    ) -> Result<Vec<FileRecord>> {
        let default_types = [MIME_PDF.to_string()];
        let extensions = allowed_extensions(mime_types.unwrap_or(&default_types[..]));

        let folder_url = format!("{}/drive/folders/{}", self.web_base, folder_id);
        let html = self
            .fetch_page(&folder_url, FOLDER_PAGE_TIMEOUT)
            .await?
            .map_err(|status| {
                DriveError::AccessError(format!("Cannot access folder. Status: {}", status.as_u16()))
            })?;

        let candidates = extract_candidate_ids(&html, folder_id);
        info!(count = candidates.len(), "found potential file ids");

        let mut files = Vec::new();
        for file_id in candidates {
            let Some(name) = self.resolve_name(&file_id).await else {
                continue;
            };
            if has_allowed_extension(&name, &extensions) {
                info!(file_id = %file_id, name = %name, "found file");
                files.push(FileRecord::scraped(file_id, name));
            }
        }

        if files.is_empty() {
            self.scan_sharing_page(folder_id).await;
        }

        info!(count = files.len(), "listed public folder");
        Ok(files)
    }

    /// Name of one candidate, or `None` when its page is unavailable.
    async fn resolve_name(&self, file_id: &str) -> Option<String> {
        let url = format!("{}/file/d/{}/view", self.web_base, file_id);
        match self.fetch_page(&url, FILE_PAGE_TIMEOUT).await {
            Ok(Ok(html)) => Some(derive_file_name(&html, file_id)),
            Ok(Err(status)) => {
                debug!(file_id = %file_id, status = status.as_u16(), "candidate page unavailable");
                None
            }
            Err(e) => {
                debug!(file_id = %file_id, error = %e, "skipping candidate");
                None
            }
        }
    }

    /// Last resort when no candidate survived: look for bare PDF names in the
    /// sharing view. Only ever produces a warning.
    async fn scan_sharing_page(&self, folder_id: &str) {
        let url = format!("{}/drive/folders/{}?usp=sharing", self.web_base, folder_id);
        if let Ok(Ok(html)) = self.fetch_page(&url, SHARING_PAGE_TIMEOUT).await {
            let references = PDF_REFERENCE_REGEX.find_iter(&html).count();
            if references > 0 {
                warn!(
                    references,
                    "found PDF references but could not extract file ids; \
                     authenticate for better results"
                );
            }
        }
    }

    /// GET a page with a browser User-Agent. The inner `Err` carries a
    /// non-200 status.
    async fn fetch_page(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<std::result::Result<String, StatusCode>> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(Err(status));
        }
        Ok(Ok(response.text().await?))
    }
}
