//! Data models for listings, downloads and Google API payloads.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_GOOGLE_DOC: &str = "application/vnd.google-apps.document";
pub const MIME_WORD_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_FOLDER: &str = "application/vnd.google-apps.folder";

/// Prefix shared by every Google-native (export only) type.
pub const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps";

/// Types accepted by the authenticated listing when the caller gives none.
pub const DEFAULT_API_MIME_TYPES: &[&str] =
    &[MIME_PDF, MIME_GOOGLE_DOC, MIME_WORD_DOCX, MIME_JPEG, MIME_PNG];

/// File name extensions that stand in for a MIME type when scraping.
pub fn extensions_for_mime(mime_type: &str) -> &'static [&'static str] {
    match mime_type {
        MIME_PDF => &[".pdf"],
        MIME_GOOGLE_DOC => &[".gdoc", ".doc", ".docx"],
        MIME_JPEG => &[".jpg", ".jpeg"],
        MIME_PNG => &[".png"],
        _ => &[],
    }
}

/// A file discovered in a folder listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    /// `None` when the type could not be determined (scraped listings).
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: u64,
    #[serde(default)]
    pub created_time: Option<String>,
    /// Path relative to the listed folder, set by recursive listings only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl FileRecord {
    /// Record for a file found by scraping, where only id and name are known.
    pub fn scraped(id: String, name: String) -> Self {
        let mime_type = name
            .to_lowercase()
            .ends_with(".pdf")
            .then(|| MIME_PDF.to_string());
        Self {
            id,
            name,
            mime_type,
            size: 0,
            created_time: None,
            path: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(MIME_FOLDER)
    }

    /// Relative location used when saving the file locally.
    pub fn relative_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

// The Drive API sends `size` as a decimal string.
fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map_err(serde::de::Error::custom),
        None => Ok(0),
    }
}

impl std::fmt::Display for FileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size_str = if self.size > 0 {
            format_size(self.size)
        } else {
            "-".to_string()
        };
        let mime = self.mime_type.as_deref().unwrap_or("unknown");
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.id,
            size_str,
            mime,
            self.relative_path()
        )
    }
}

/// A file that has been fully written to local storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    #[serde(flatten)]
    pub file: FileRecord,
    pub local_path: PathBuf,
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Serializable form of a user-delegated token.
///
/// Returned once the consent flow completes; the caller stores it and hands
/// it back to [`crate::Authenticator::from_stored_token`] on the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_file_record_deserialize() {
        let json = r#"{
            "id": "abc123",
            "name": "test.pdf",
            "mimeType": "application/pdf",
            "size": "1024",
            "createdTime": "2024-01-02T03:04:05.000Z"
        }"#;

        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "abc123");
        assert_eq!(record.mime_type.as_deref(), Some(MIME_PDF));
        assert_eq!(record.size, 1024);
        assert_eq!(record.created_time.as_deref(), Some("2024-01-02T03:04:05.000Z"));
        assert_eq!(record.path, None);
    }

    #[test]
    fn test_scraped_record_infers_pdf_only() {
        let pdf = FileRecord::scraped("a".into(), "Report.PDF".into());
        assert_eq!(pdf.mime_type.as_deref(), Some(MIME_PDF));
        assert_eq!(pdf.size, 0);

        let png = FileRecord::scraped("b".into(), "photo.png".into());
        assert_eq!(png.mime_type, None);
        assert!(png.created_time.is_none());
    }

    #[test]
    fn test_extensions_for_mime() {
        assert_eq!(extensions_for_mime(MIME_PDF), &[".pdf"]);
        assert_eq!(extensions_for_mime(MIME_GOOGLE_DOC).len(), 3);
        assert!(extensions_for_mime("text/plain").is_empty());
    }

    #[test]
    fn test_display_uses_path_when_present() {
        let mut record = FileRecord::scraped("abc".into(), "a.pdf".into());
        record.path = Some("Sub/a.pdf".into());
        record.size = 2048;

        let display = format!("{}", record);
        assert!(display.contains("Sub/a.pdf"));
        assert!(display.contains("2.00 KB"));
    }

    #[test]
    fn test_stored_token_roundtrip_keys() {
        let json = r#"{
            "token": "ya29.x",
            "refresh_token": "1//r",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "cid",
            "client_secret": "secret",
            "scopes": ["https://www.googleapis.com/auth/drive.readonly"]
        }"#;

        let token: StoredToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("1//r"));
        assert!(token.expiry.is_none());
    }
}
