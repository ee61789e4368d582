use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::api::{is_success, ListCollections, StreamApi};
use crate::core::error::FsError;
use crate::core::types::CollectionEntity;
use crate::resolve::path::normalize;

use super::listing::{all_collections, find_first};

// ---------------------------------------------------------------------------
// Directory <-> collection mapping
// ---------------------------------------------------------------------------

/// Maps directory paths onto collections whose name is the full path.
pub struct Collections<'a, A> {
    api: &'a A,
    items_per_page: u32,
}

impl<'a, A: StreamApi> Collections<'a, A> {
    pub fn new(api: &'a A, items_per_page: u32) -> Self {
        Self {
            api,
            items_per_page,
        }
    }

    /// Look up the collection named exactly `path`.
    ///
    /// The root (absent or empty path) has no collection and costs no call.
    /// The upstream search matches substrings, so its pages are read until
    /// the exact name turns up or the results run out.
    pub async fn find_by_path(&self, path: Option<&str>) -> Result<Option<CollectionEntity>, FsError> {
        let Some(path) = normalize(path).filter(|p| !p.is_empty()) else {
            return Ok(None);
        };

        let items_per_page = self.items_per_page;
        let found = find_first(
            "collection_search",
            |page| {
                let query = ListCollections {
                    page,
                    items_per_page,
                    search: Some(path.clone()),
                };
                async move { self.api.list_collections(&query).await }
            },
            |c: &CollectionEntity| c.name == path,
        )
        .await?;
        debug!(path = %path, found = found.is_some(), "collection lookup");
        Ok(found)
    }

    /// Find the collection for `path`, creating it when missing.
    ///
    /// Two concurrent callers can both miss and both create.
    pub async fn ensure(&self, path: &str) -> Result<CollectionEntity, FsError> {
        if let Some(existing) = self.find_by_path(Some(path)).await? {
            return Ok(existing);
        }
        let name = normalize(Some(path)).unwrap_or_default();
        let created = self.api.create_collection(&name).await?;
        info!(name = %name, collection_id = %created.guid, "created collection");
        Ok(created)
    }

    /// Create the directory. An existing directory is left as is.
    pub async fn make_directory(&self, path: &str) -> Result<(), FsError> {
        let directory = normalize(Some(path)).unwrap_or_default();
        if directory.is_empty() {
            return Err(FsError::InvalidArgument {
                reason: "directory path cannot be empty".to_string(),
            });
        }
        self.ensure(&directory).await.map(|_| ())
    }

    /// Delete the directory's collection.
    ///
    /// A directory that does not exist counts as deleted. Otherwise `true`
    /// iff the platform answered 2xx.
    pub async fn delete_directory(&self, path: &str) -> Result<bool, FsError> {
        let Some(collection) = self.find_by_path(Some(path)).await? else {
            debug!(path, "directory already absent");
            return Ok(true);
        };

        let status = self.api.delete_collection(&collection.guid).await?;
        if is_success(status) {
            info!(name = %collection.name, collection_id = %collection.guid, "deleted collection");
            Ok(true)
        } else {
            warn!(name = %collection.name, status, "collection delete rejected");
            Ok(false)
        }
    }

    /// Names of all collections, in remote order without repeats, optionally
    /// restricted to `prefix` and the directories beneath it.
    pub async fn list_directories(&self, prefix: Option<&str>) -> Vec<String> {
        let prefix = normalize(prefix).filter(|p| !p.is_empty());
        let nested = prefix.as_ref().map(|p| format!("{}/", p));

        let mut seen = HashSet::new();
        let mut names: Vec<String> = Vec::new();
        for collection in all_collections(self.api, self.items_per_page).await {
            let keep = match (&prefix, &nested) {
                (Some(prefix), Some(nested)) => {
                    collection.name == *prefix || collection.name.starts_with(nested.as_str())
                }
                _ => true,
            };
            if keep && seen.insert(collection.name.clone()) {
                names.push(collection.name);
            }
        }
        names
    }
}
