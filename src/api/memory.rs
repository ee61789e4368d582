use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::error::ApiError;
use crate::core::types::{CollectionEntity, Page, VideoEntity, VideoId};

use super::{CdnReader, CdnSource, CreateVideo, ListCollections, ListVideos, StreamApi, UploadBody};

// ---------------------------------------------------------------------------
// InMemoryStreamApi (for testing and offline use)
// ---------------------------------------------------------------------------

/// In-memory video library implementing both `StreamApi` and `CdnSource`.
///
/// Records are kept in insertion order so pagination is stable. Failures can
/// be injected per endpoint, and every call is counted.
#[derive(Clone, Default)]
pub struct InMemoryStreamApi {
    state: Arc<RwLock<LibraryState>>,
    calls: Arc<Mutex<CallCounts>>,
    faults: Arc<Mutex<Faults>>,
}

#[derive(Default)]
struct LibraryState {
    library_id: u64,
    videos: Vec<VideoEntity>,
    collections: Vec<CollectionEntity>,
    assets: HashMap<String, Bytes>,
}

/// Number of calls issued per endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_video: u32,
    pub create_video: u32,
    pub delete_video: u32,
    pub upload_video: u32,
    pub list_videos: u32,
    pub create_collection: u32,
    pub delete_collection: u32,
    pub list_collections: u32,
    pub cdn_fetch: u32,
}

impl CallCounts {
    /// Calls against the management API (CDN reads excluded).
    pub fn total_api(&self) -> u32 {
        self.get_video
            + self.create_video
            + self.delete_video
            + self.upload_video
            + self.list_videos
            + self.create_collection
            + self.delete_collection
            + self.list_collections
    }
}

#[derive(Default)]
struct Faults {
    video_reads: bool,
    video_page: Option<u32>,
    collection_page: Option<u32>,
    upload_status: Option<u16>,
}

impl InMemoryStreamApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn count(&self, bump: impl FnOnce(&mut CallCounts)) {
        bump(&mut self.calls.lock().unwrap_or_else(|e| e.into_inner()));
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- Fault injection --

    /// Make `get_video` fail with a transport error.
    pub fn fail_video_reads(&self, fail: bool) {
        self.faults().video_reads = fail;
    }

    /// Make `list_videos` fail with a transport error when `page` is requested.
    pub fn fail_video_page(&self, page: Option<u32>) {
        self.faults().video_page = page;
    }

    /// Make `list_collections` fail with a transport error when `page` is requested.
    pub fn fail_collection_page(&self, page: Option<u32>) {
        self.faults().collection_page = page;
    }

    /// Answer every upload with `status` instead of 200.
    pub fn respond_to_uploads_with(&self, status: Option<u16>) {
        self.faults().upload_status = status;
    }

    // -- Seeding --

    /// Insert a finished video and return its id.
    pub async fn seed_video(
        &self,
        collection_id: Option<&str>,
        title: &str,
        storage_size: u64,
        available_resolutions: &str,
    ) -> VideoId {
        let mut state = self.state.write().await;
        let video = VideoEntity {
            guid: Uuid::new_v4().to_string(),
            video_library_id: state.library_id,
            title: title.to_string(),
            storage_size,
            date_uploaded: Utc::now(),
            available_resolutions: available_resolutions.to_string(),
            collection_id: collection_id.map(str::to_string),
            length: 0,
        };
        let id = video.id();
        state.videos.push(video);
        id
    }

    /// Insert a collection and return it.
    pub async fn seed_collection(&self, name: &str) -> CollectionEntity {
        let mut state = self.state.write().await;
        let collection = CollectionEntity {
            guid: Uuid::new_v4().to_string(),
            name: name.to_string(),
            video_count: 0,
            total_size: 0,
        };
        state.collections.push(collection.clone());
        collection
    }

    /// Publish bytes at a CDN asset path such as `{vid}/playlist.m3u8`.
    pub async fn seed_asset(&self, asset_path: &str, data: impl Into<Bytes>) {
        let mut state = self.state.write().await;
        state.assets.insert(asset_path.to_string(), data.into());
    }

    // -- Inspection --

    pub async fn videos(&self) -> Vec<VideoEntity> {
        self.state.read().await.videos.clone()
    }

    pub async fn collections(&self) -> Vec<CollectionEntity> {
        self.state.read().await.collections.clone()
    }

    /// Bytes uploaded for a video, if any.
    pub async fn uploaded_content(&self, video_id: &VideoId) -> Option<Bytes> {
        let asset = format!("{}/original", video_id);
        self.state.read().await.assets.get(&asset).cloned()
    }
}

fn paginate<T: Clone>(items: &[T], page: u32, items_per_page: u32) -> Page<T> {
    let per_page = items_per_page.max(1) as usize;
    let start = (page.max(1) as usize - 1).saturating_mul(per_page);
    let slice: Vec<T> = items.iter().skip(start).take(per_page).cloned().collect();
    Page::new(page, items_per_page, items.len() as u64, slice)
}

fn injected_transport_failure(endpoint: &str, page: u32) -> ApiError {
    ApiError::Transport {
        reason: format!("injected failure on {} page {}", endpoint, page),
    }
}

impl StreamApi for InMemoryStreamApi {
    async fn get_video(&self, video_id: &VideoId) -> Result<VideoEntity, ApiError> {
        self.count(|c| c.get_video += 1);
        if self.faults().video_reads {
            return Err(ApiError::Transport {
                reason: "injected failure on get_video".to_string(),
            });
        }
        let state = self.state.read().await;
        state
            .videos
            .iter()
            .find(|v| v.guid == video_id.as_str())
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("video {}", video_id)))
    }

    async fn create_video(&self, request: &CreateVideo) -> Result<VideoEntity, ApiError> {
        self.count(|c| c.create_video += 1);
        let mut state = self.state.write().await;
        if let Some(collection_id) = &request.collection_id {
            if !state.collections.iter().any(|c| &c.guid == collection_id) {
                return Err(ApiError::not_found(format!("collection {}", collection_id)));
            }
        }
        let video = VideoEntity {
            guid: Uuid::new_v4().to_string(),
            video_library_id: state.library_id,
            title: request.title.clone(),
            storage_size: 0,
            date_uploaded: Utc::now(),
            available_resolutions: String::new(),
            collection_id: request.collection_id.clone(),
            length: 0,
        };
        state.videos.push(video.clone());
        Ok(video)
    }

    async fn delete_video(&self, video_id: &VideoId) -> Result<u16, ApiError> {
        self.count(|c| c.delete_video += 1);
        let mut state = self.state.write().await;
        let before = state.videos.len();
        state.videos.retain(|v| v.guid != video_id.as_str());
        if state.videos.len() == before {
            return Ok(404);
        }
        let prefix = format!("{}/", video_id);
        state.assets.retain(|path, _| !path.starts_with(&prefix));
        Ok(200)
    }

    async fn upload_video(&self, video_id: &VideoId, body: UploadBody) -> Result<u16, ApiError> {
        self.count(|c| c.upload_video += 1);
        let data = match body {
            UploadBody::Bytes(bytes) => bytes,
            UploadBody::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| ApiError::Transport {
                        reason: format!("failed to read upload body: {}", e),
                    })?;
                Bytes::from(buf)
            }
        };

        let forced_status = self.faults().upload_status;
        if let Some(status) = forced_status {
            return Ok(status);
        }

        let mut state = self.state.write().await;
        let Some(video) = state.videos.iter_mut().find(|v| v.guid == video_id.as_str()) else {
            return Ok(404);
        };
        video.storage_size = data.len() as u64;
        video.date_uploaded = Utc::now();
        state.assets.insert(format!("{}/original", video_id), data);
        Ok(200)
    }

    async fn list_videos(&self, query: &ListVideos) -> Result<Page<VideoEntity>, ApiError> {
        self.count(|c| c.list_videos += 1);
        if self.faults().video_page == Some(query.page) {
            return Err(injected_transport_failure("list_videos", query.page));
        }
        let state = self.state.read().await;
        let matching: Vec<VideoEntity> = state
            .videos
            .iter()
            .filter(|v| match &query.collection {
                Some(collection) => v.collection_id.as_deref() == Some(collection.as_str()),
                None => true,
            })
            .filter(|v| match &query.search {
                Some(term) => v.title.to_lowercase().contains(&term.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        Ok(paginate(&matching, query.page, query.items_per_page))
    }

    async fn create_collection(&self, name: &str) -> Result<CollectionEntity, ApiError> {
        self.count(|c| c.create_collection += 1);
        let mut state = self.state.write().await;
        let collection = CollectionEntity {
            guid: Uuid::new_v4().to_string(),
            name: name.to_string(),
            video_count: 0,
            total_size: 0,
        };
        state.collections.push(collection.clone());
        Ok(collection)
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<u16, ApiError> {
        self.count(|c| c.delete_collection += 1);
        let mut state = self.state.write().await;
        let before = state.collections.len();
        state.collections.retain(|c| c.guid != collection_id);
        if state.collections.len() == before {
            Ok(404)
        } else {
            Ok(200)
        }
    }

    async fn list_collections(
        &self,
        query: &ListCollections,
    ) -> Result<Page<CollectionEntity>, ApiError> {
        self.count(|c| c.list_collections += 1);
        if self.faults().collection_page == Some(query.page) {
            return Err(injected_transport_failure("list_collections", query.page));
        }
        let state = self.state.read().await;
        let matching: Vec<CollectionEntity> = state
            .collections
            .iter()
            .filter(|c| match &query.search {
                Some(term) => c.name.to_lowercase().contains(&term.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        Ok(paginate(&matching, query.page, query.items_per_page))
    }
}

impl CdnSource for InMemoryStreamApi {
    async fn fetch(&self, asset_path: &str) -> Result<Bytes, ApiError> {
        self.count(|c| c.cdn_fetch += 1);
        let state = self.state.read().await;
        state
            .assets
            .get(asset_path)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("asset {}", asset_path)))
    }

    async fn open(&self, asset_path: &str) -> Result<CdnReader, ApiError> {
        let data = self.fetch(asset_path).await?;
        Ok(Box::pin(Cursor::new(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_video() {
        let api = InMemoryStreamApi::new();
        let created = api
            .create_video(&CreateVideo {
                title: "clip".to_string(),
                collection_id: None,
            })
            .await
            .unwrap();

        let fetched = api.get_video(&created.id()).await.unwrap();
        assert_eq!(fetched.title, "clip");
        assert_eq!(api.calls().create_video, 1);
        assert_eq!(api.calls().get_video, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_video_is_not_found() {
        let api = InMemoryStreamApi::new();
        let err = api.get_video(&VideoId::new("missing")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_video_in_unknown_collection_fails() {
        let api = InMemoryStreamApi::new();
        let result = api
            .create_video(&CreateVideo {
                title: "clip".to_string(),
                collection_id: Some("nope".to_string()),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_upload_from_reader_stores_original() {
        let api = InMemoryStreamApi::new();
        let video = api
            .create_video(&CreateVideo {
                title: "clip".to_string(),
                collection_id: None,
            })
            .await
            .unwrap();

        let reader = Box::new(Cursor::new(vec![1u8, 2, 3, 4]));
        let status = api
            .upload_video(&video.id(), UploadBody::Reader(reader))
            .await
            .unwrap();
        assert_eq!(status, 200);
        assert_eq!(api.get_video(&video.id()).await.unwrap().storage_size, 4);
        assert_eq!(
            api.uploaded_content(&video.id()).await.unwrap().as_ref(),
            &[1, 2, 3, 4]
        );
    }

    #[tokio::test]
    async fn test_upload_to_unknown_video_is_404() {
        let api = InMemoryStreamApi::new();
        let status = api
            .upload_video(&VideoId::new("missing"), UploadBody::Bytes(Bytes::from("x")))
            .await
            .unwrap();
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_collection_search_is_substring() {
        let api = InMemoryStreamApi::new();
        api.seed_collection("trips").await;
        api.seed_collection("trips/2024").await;
        api.seed_collection("work").await;

        let page = api
            .list_collections(&ListCollections {
                page: 1,
                items_per_page: 100,
                search: Some("trips".to_string()),
            })
            .await
            .unwrap();
        let names: Vec<_> = page.items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["trips", "trips/2024"]);
    }

    #[tokio::test]
    async fn test_pagination_past_end_is_empty() {
        let api = InMemoryStreamApi::new();
        for i in 0..5 {
            api.seed_video(None, &format!("v{i}"), 1, "").await;
        }
        let query = |page| ListVideos {
            page,
            items_per_page: 2,
            collection: None,
            search: None,
        };
        assert_eq!(api.list_videos(&query(1)).await.unwrap().items.len(), 2);
        assert_eq!(api.list_videos(&query(3)).await.unwrap().items.len(), 1);
        assert!(api.list_videos(&query(4)).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_delete_video_removes_assets() {
        let api = InMemoryStreamApi::new();
        let id = api.seed_video(None, "clip", 1, "").await;
        api.seed_asset(&format!("{id}/playlist.m3u8"), "#EXTM3U").await;

        assert_eq!(api.delete_video(&id).await.unwrap(), 200);
        assert!(api.fetch(&format!("{id}/playlist.m3u8")).await.is_err());
        assert_eq!(api.delete_video(&id).await.unwrap(), 404);
    }

    #[tokio::test]
    async fn test_open_streams_asset() {
        let api = InMemoryStreamApi::new();
        api.seed_asset("vid/thumbnail.jpg", vec![9u8; 16]).await;

        let mut reader = api.open("vid/thumbnail.jpg").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len(), 16);
    }

    #[tokio::test]
    async fn test_injected_page_failure() {
        let api = InMemoryStreamApi::new();
        api.fail_collection_page(Some(2));
        let query = |page| ListCollections {
            page,
            items_per_page: 10,
            search: None,
        };
        assert!(api.list_collections(&query(1)).await.is_ok());
        assert!(api.list_collections(&query(2)).await.is_err());
    }
}
