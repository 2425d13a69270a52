//! URL parser for extracting Google Drive IDs from URLs.

use regex::Regex;
use std::sync::LazyLock;

static FILE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/file/d/([a-zA-Z0-9_-]+)").expect("Invalid file URL regex")
});

/// Extract a folder or file ID from a Google Drive URL.
///
/// Supports the following shapes:
/// - `https://drive.google.com/drive/folders/<ID>?usp=sharing`
/// - `https://drive.google.com/open?id=<ID>&...`
/// - a bare ID, returned unchanged
///
/// The result is not validated; a malformed ID fails at the first request.
///
/// # Examples
///
/// ```
/// use drive_fetch::url_parser::extract_id;
///
/// assert_eq!(extract_id("https://drive.google.com/drive/folders/1abc123"), "1abc123");
/// assert_eq!(extract_id("https://drive.google.com/open?id=1abc123&usp=x"), "1abc123");
/// assert_eq!(extract_id("1abc123"), "1abc123");
/// ```
pub fn extract_id(url_or_id: &str) -> String {
    if let Some((_, rest)) = url_or_id.rsplit_once("/folders/") {
        return rest.split('?').next().unwrap_or_default().to_string();
    }

    if let Some((_, rest)) = url_or_id.rsplit_once("id=") {
        return rest.split('&').next().unwrap_or_default().to_string();
    }

    url_or_id.to_string()
}

/// Extract a file ID, also accepting `/file/d/<ID>/view` permalinks.
pub fn extract_file_id(url_or_id: &str) -> String {
    if let Some(captures) = FILE_URL_REGEX.captures(url_or_id) {
        if let Some(id) = captures.get(1) {
            return id.as_str().to_string();
        }
    }

    extract_id(url_or_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_folder_url() {
        let url = "https://drive.google.com/drive/folders/1abc123XYZ";
        assert_eq!(extract_id(url), "1abc123XYZ");
    }

    #[test]
    fn test_extract_folder_url_with_query() {
        let url = "https://drive.google.com/drive/u/0/folders/1abc123XYZ?usp=sharing";
        assert_eq!(extract_id(url), "1abc123XYZ");
    }

    #[test]
    fn test_extract_open_url() {
        let url = "https://drive.google.com/open?id=1abc123XYZ&authuser=0";
        assert_eq!(extract_id(url), "1abc123XYZ");
    }

    #[test]
    fn test_bare_id_passes_through() {
        assert_eq!(extract_id("1abc123XYZ"), "1abc123XYZ");
        assert_eq!(extract_id("not a valid id"), "not a valid id");
    }

    #[test]
    fn test_extract_file_permalink() {
        let url = "https://drive.google.com/file/d/1abc123XYZ/view?usp=sharing";
        assert_eq!(extract_file_id(url), "1abc123XYZ");
        assert_eq!(extract_file_id("https://drive.google.com/uc?id=F1&export=download"), "F1");
    }
}
