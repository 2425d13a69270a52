//! Folder listing through the Drive API.

use std::collections::HashSet;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, instrument, warn};

use crate::api::DriveApi;
use crate::error::Result;
use crate::models::{FileRecord, DEFAULT_API_MIME_TYPES};

/// Flat and recursive folder listing for an authenticated session.
#[derive(Clone)]
pub struct AuthenticatedLister {
    api: DriveApi,
}

impl AuthenticatedLister {
    pub fn new(api: DriveApi) -> Self {
        Self { api }
    }

    /// Direct children of `folder_id` whose type is in `mime_types`.
    ///
    /// Without a filter the common document and image types are kept.
    /// Only the first page (up to 1000 entries) is read.
    #[instrument(skip(self, mime_types))]
    pub async fn list_folder(
        &self,
        folder_id: &str,
        mime_types: Option<&[String]>,
    ) -> Result<Vec<FileRecord>> {
        let items = self.api.list_children(folder_id).await?;

        let files: Vec<FileRecord> = items
            .into_iter()
            .filter(|item| match mime_types {
                Some(types) => matches_filter(item, Some(types)),
                None => item
                    .mime_type
                    .as_deref()
                    .is_some_and(|m| DEFAULT_API_MIME_TYPES.contains(&m)),
            })
            .collect();

        info!(count = files.len(), "listed folder via API");
        Ok(files)
    }

    /// Every file below `folder_id`, depth first, each tagged with its path.
    ///
    /// A folder that cannot be listed is logged and skipped; siblings are
    /// still visited, so this never fails as a whole.
    #[instrument(skip(self, mime_types))]
    pub async fn list_recursive(
        &self,
        folder_id: &str,
        mime_types: Option<&[String]>,
    ) -> Vec<FileRecord> {
        let mut walk = Walk {
            api: &self.api,
            mime_types,
            visited: HashSet::new(),
            files: Vec::new(),
        };
        walk.visit(folder_id.to_string(), String::new()).await;

        info!(count = walk.files.len(), "listed folder tree via API");
        walk.files
    }
}

struct Walk<'a> {
    api: &'a DriveApi,
    mime_types: Option<&'a [String]>,
    visited: HashSet<String>,
    files: Vec<FileRecord>,
}

impl<'a> Walk<'a> {
    fn visit<'w>(&'w mut self, folder_id: String, path: String) -> BoxFuture<'w, ()> {
        async move {
            if !self.visited.insert(folder_id.clone()) {
                warn!(folder_id = %folder_id, "folder already visited, skipping cycle");
                return;
            }

            let items = match self.api.list_children(&folder_id).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(folder_id = %folder_id, error = %e, "error processing folder");
                    return;
                }
            };

            for mut item in items {
                let item_path = join_path(&path, &item.name);
                if item.is_folder() {
                    self.visit(item.id.clone(), item_path).await;
                } else if matches_filter(&item, self.mime_types) {
                    item.path = Some(item_path);
                    self.files.push(item);
                }
            }
        }
        .boxed()
    }
}

fn matches_filter(item: &FileRecord, mime_types: Option<&[String]>) -> bool {
    match mime_types {
        None => true,
        Some(types) if types.is_empty() => true,
        Some(types) => item
            .mime_type
            .as_deref()
            .is_some_and(|m| types.iter().any(|t| t == m)),
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MIME_PDF, MIME_PNG};

    fn record(mime: Option<&str>) -> FileRecord {
        FileRecord {
            id: "id".into(),
            name: "name".into(),
            mime_type: mime.map(str::to_string),
            size: 0,
            created_time: None,
            path: None,
        }
    }

    #[test]
    fn test_matches_filter() {
        let pdf_only = vec![MIME_PDF.to_string()];
        let none: Vec<String> = Vec::new();
        assert!(matches_filter(&record(Some(MIME_PDF)), Some(pdf_only.as_slice())));
        assert!(!matches_filter(&record(Some(MIME_PNG)), Some(pdf_only.as_slice())));
        assert!(!matches_filter(&record(None), Some(pdf_only.as_slice())));
        assert!(matches_filter(&record(Some(MIME_PNG)), None));
        assert!(matches_filter(&record(Some(MIME_PNG)), Some(none.as_slice())));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a.pdf"), "a.pdf");
        assert_eq!(join_path("Sub", "a.pdf"), "Sub/a.pdf");
        assert_eq!(join_path("Sub/Deeper", "a.pdf"), "Sub/Deeper/a.pdf");
    }
}
