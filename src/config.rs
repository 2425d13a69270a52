//! Endpoint and storage configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Public Drive web UI.
pub const DRIVE_WEB_BASE: &str = "https://drive.google.com";

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google OAuth2 consent endpoint.
pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Timeout for Drive API calls.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Where requests go and where downloads land.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub web_base: String,
    pub api_base: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub download_dir: PathBuf,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            web_base: DRIVE_WEB_BASE.to_string(),
            api_base: DRIVE_API_BASE.to_string(),
            auth_uri: AUTH_URI.to_string(),
            token_uri: TOKEN_URI.to_string(),
            download_dir: std::env::temp_dir(),
        }
    }
}

impl DriveConfig {
    pub fn with_web_base(mut self, web_base: impl Into<String>) -> Self {
        self.web_base = trim_base(web_base.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = trim_base(api_base.into());
        self
    }

    pub fn with_auth_uri(mut self, auth_uri: impl Into<String>) -> Self {
        self.auth_uri = auth_uri.into();
        self
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn with_download_dir(mut self, download_dir: impl Into<PathBuf>) -> Self {
        self.download_dir = download_dir.into();
        self
    }
}

fn trim_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_google() {
        let config = DriveConfig::default();
        assert_eq!(config.web_base, DRIVE_WEB_BASE);
        assert_eq!(config.api_base, DRIVE_API_BASE);
        assert_eq!(config.download_dir, std::env::temp_dir());
    }

    #[test]
    fn test_base_urls_are_trimmed() {
        let config = DriveConfig::default()
            .with_web_base("http://127.0.0.1:1234/")
            .with_api_base("http://127.0.0.1:1234//");
        assert_eq!(config.web_base, "http://127.0.0.1:1234");
        assert_eq!(config.api_base, "http://127.0.0.1:1234");
    }
}
