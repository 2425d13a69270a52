//! drive_fetch - read-only access to Google Drive folders.
//!
//! This library provides functionality to:
//! - List files in a publicly shared folder without credentials
//! - List folders (flat or recursive) through the Drive API
//! - Download files, falling back from the public link to the API
//! - Authenticate with a service account or a three-legged OAuth2 flow
//!
//! Progress is reported as `tracing` events; install any subscriber to see it.
//!
//! # Example
//!
//! ```no_run
//! use drive_fetch::{DriveClient, DriveConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DriveClient::new(DriveConfig::default());
//!
//!     let files = client
//!         .list_folder_files("https://drive.google.com/drive/folders/1abc", None)
//!         .await?;
//!     for file in files {
//!         println!("{}", file);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod lister;
pub mod models;
pub mod oauth;
pub mod scraper;
pub mod url_parser;

// Re-exports for convenience
pub use auth::Authenticator;
pub use client::DriveClient;
pub use config::DriveConfig;
pub use error::{DriveError, Result};
pub use models::{DownloadResult, FileRecord, StoredToken};
pub use oauth::OAuthFlow;
pub use url_parser::{extract_file_id, extract_id};
