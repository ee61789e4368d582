use std::future::Future;

use tracing::{debug, warn};

use crate::api::{ListCollections, ListVideos, StreamApi};
use crate::core::error::ApiError;
use crate::core::types::{CollectionEntity, Page, VideoEntity};
use crate::observability::metrics;

// ---------------------------------------------------------------------------
// Page aggregation
// ---------------------------------------------------------------------------

/// Fetch pages 1, 2, ... until one comes back empty and concatenate them.
///
/// A failed page ends the listing early: the failure is logged and whatever
/// was accumulated before it is returned.
pub async fn list_all<T, F, Fut>(kind: &'static str, items_per_page: u32, mut fetch_page: F) -> Vec<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        match fetch_page(page).await {
            Ok(fetched) => {
                metrics::inc_listing_page(kind);
                if fetched.items.is_empty() {
                    break;
                }
                items.extend(fetched.items);
            }
            Err(e) => {
                metrics::inc_listing_aborted(kind);
                warn!(
                    kind,
                    page,
                    items_per_page,
                    accumulated = items.len(),
                    error = %e,
                    "listing page failed; returning partial result"
                );
                break;
            }
        }
        page = match page.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    debug!(kind, pages = page, total = items.len(), "listing complete");
    items
}

/// Fetch pages 1, 2, ... until an item satisfies `matches`, stopping early
/// at the first hit. An empty page ends the search with `None`.
///
/// Unlike [`list_all`], a failed page is an error: an unread page may hold
/// the match.
pub async fn find_first<T, F, Fut, P>(
    kind: &'static str,
    mut fetch_page: F,
    mut matches: P,
) -> Result<Option<T>, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
    P: FnMut(&T) -> bool,
{
    let mut page = 1u32;
    loop {
        let fetched = fetch_page(page).await?;
        metrics::inc_listing_page(kind);
        if fetched.items.is_empty() {
            debug!(kind, pages = page, "search exhausted");
            return Ok(None);
        }
        if let Some(found) = fetched.items.into_iter().find(|item| matches(item)) {
            return Ok(Some(found));
        }
        page = match page.checked_add(1) {
            Some(next) => next,
            None => return Ok(None),
        };
    }
}

/// Every video of the library, or of one collection.
pub async fn all_videos<A: StreamApi>(
    api: &A,
    items_per_page: u32,
    collection_id: Option<&str>,
) -> Vec<VideoEntity> {
    list_all("videos", items_per_page, |page| {
        let query = ListVideos {
            page,
            items_per_page,
            collection: collection_id.map(str::to_string),
            search: None,
        };
        async move { api.list_videos(&query).await }
    })
    .await
}

/// Every collection of the library.
pub async fn all_collections<A: StreamApi>(api: &A, items_per_page: u32) -> Vec<CollectionEntity> {
    list_all("collections", items_per_page, |page| {
        let query = ListCollections {
            page,
            items_per_page,
            search: None,
        };
        async move { api.list_collections(&query).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::api::memory::InMemoryStreamApi;

    fn page_of(sizes: &[usize], page: u32) -> Page<u32> {
        let size = sizes.get(page as usize - 1).copied().unwrap_or(0);
        Page::new(page, 1000, 0, vec![page; size])
    }

    #[tokio::test]
    async fn test_concatenates_until_empty_page() {
        let sizes = [1000, 1000, 37, 0];
        let calls = AtomicU32::new(0);
        let items = list_all("videos", 1000, |page| {
            calls.fetch_add(1, Ordering::SeqCst);
            let result = Ok(page_of(&sizes, page));
            async move { result }
        })
        .await;

        assert_eq!(items.len(), 2037);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(items.first(), Some(&1));
        assert_eq!(items.last(), Some(&3));
    }

    #[tokio::test]
    async fn test_failed_page_returns_partial_result() {
        let sizes = [1000, 1000, 1000, 5];
        let calls = AtomicU32::new(0);
        let items = list_all("collections", 1000, |page| {
            calls.fetch_add(1, Ordering::SeqCst);
            let result = if page == 3 {
                Err(ApiError::Transport {
                    reason: "connection reset".to_string(),
                })
            } else {
                Ok(page_of(&sizes, page))
            };
            async move { result }
        })
        .await;

        assert_eq!(items.len(), 2000);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_first_page_is_empty_listing() {
        let items: Vec<u32> =
            list_all("videos", 1000, |page| async move { Ok(page_of(&[], page)) }).await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_find_first_stops_at_match() {
        let calls = AtomicU32::new(0);
        let found = find_first(
            "collections",
            |page| {
                calls.fetch_add(1, Ordering::SeqCst);
                let result = Ok(Page::new(page, 2, 0, vec![page * 10, page * 10 + 1]));
                async move { result }
            },
            |item| *item == 21,
        )
        .await
        .unwrap();

        assert_eq!(found, Some(21));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_find_first_none_after_empty_page() {
        let found = find_first(
            "collections",
            |page| async move { Ok(page_of(&[3, 3], page)) },
            |_| false,
        )
        .await
        .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_find_first_propagates_failed_page() {
        let result = find_first(
            "collections",
            |page| async move {
                if page == 2 {
                    Err(ApiError::Transport {
                        reason: "connection reset".to_string(),
                    })
                } else {
                    Ok(page_of(&[3, 3], page))
                }
            },
            |_| false,
        )
        .await;
        assert!(matches!(result, Err(ApiError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_all_videos_filters_by_collection() {
        let api = InMemoryStreamApi::new();
        let trips = api.seed_collection("trips").await;
        api.seed_video(Some(&trips.guid), "a", 1, "").await;
        api.seed_video(Some(&trips.guid), "b", 1, "").await;
        api.seed_video(None, "c", 1, "").await;

        assert_eq!(all_videos(&api, 1, Some(&trips.guid)).await.len(), 2);
        assert_eq!(all_videos(&api, 2, None).await.len(), 3);
    }

    #[tokio::test]
    async fn test_all_collections_pages_through_backend() {
        let api = InMemoryStreamApi::new();
        for i in 0..5 {
            api.seed_collection(&format!("dir{i}")).await;
        }

        let collections = all_collections(&api, 2).await;
        assert_eq!(collections.len(), 5);
        // Pages of 2, 2, 1, then the empty page.
        assert_eq!(api.calls().list_collections, 4);
    }

    #[tokio::test]
    async fn test_all_collections_partial_on_backend_failure() {
        let api = InMemoryStreamApi::new();
        for i in 0..5 {
            api.seed_collection(&format!("dir{i}")).await;
        }
        api.fail_collection_page(Some(2));

        let collections = all_collections(&api, 2).await;
        assert_eq!(collections.len(), 2);
    }
}
