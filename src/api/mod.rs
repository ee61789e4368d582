//! Seam between the filesystem adapter and the remote platform.

#[cfg(feature = "http")]
pub mod http;
pub mod memory;

use std::pin::Pin;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::core::error::ApiError;
use crate::core::types::{CollectionEntity, Page, VideoEntity, VideoId};

// ---------------------------------------------------------------------------
// StreamApi trait
// ---------------------------------------------------------------------------

/// The Stream management API of one video library.
///
/// The production implementation (`BunnyStreamClient`) speaks REST over
/// `reqwest`. Tests use `InMemoryStreamApi`. Every call targets the library
/// fixed at construction and carries its access key.
pub trait StreamApi: Send + Sync {
    /// Fetch a single video record.
    fn get_video(
        &self,
        video_id: &VideoId,
    ) -> impl std::future::Future<Output = Result<VideoEntity, ApiError>> + Send;

    /// Create an empty video record, optionally inside a collection.
    fn create_video(
        &self,
        request: &CreateVideo,
    ) -> impl std::future::Future<Output = Result<VideoEntity, ApiError>> + Send;

    /// Delete a video. Returns the response status.
    fn delete_video(
        &self,
        video_id: &VideoId,
    ) -> impl std::future::Future<Output = Result<u16, ApiError>> + Send;

    /// Stream the binary content of a previously created video. Returns the response status.
    fn upload_video(
        &self,
        video_id: &VideoId,
        body: UploadBody,
    ) -> impl std::future::Future<Output = Result<u16, ApiError>> + Send;

    /// One page of videos.
    fn list_videos(
        &self,
        query: &ListVideos,
    ) -> impl std::future::Future<Output = Result<Page<VideoEntity>, ApiError>> + Send;

    /// Create a collection with the given name.
    fn create_collection(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<CollectionEntity, ApiError>> + Send;

    /// Delete a collection. Returns the response status.
    fn delete_collection(
        &self,
        collection_id: &str,
    ) -> impl std::future::Future<Output = Result<u16, ApiError>> + Send;

    /// One page of collections. `search` is a substring filter upstream.
    fn list_collections(
        &self,
        query: &ListCollections,
    ) -> impl std::future::Future<Output = Result<Page<CollectionEntity>, ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// CdnSource trait
// ---------------------------------------------------------------------------

/// A readable stream of CDN content.
pub type CdnReader = Pin<Box<dyn AsyncRead + Send>>;

/// Read access to the pull zone that serves video assets.
pub trait CdnSource: Send + Sync {
    /// Fetch a whole asset, e.g. `{vid}/playlist.m3u8`.
    fn fetch(
        &self,
        asset_path: &str,
    ) -> impl std::future::Future<Output = Result<Bytes, ApiError>> + Send;

    /// Open an asset for streaming reads.
    fn open(
        &self,
        asset_path: &str,
    ) -> impl std::future::Future<Output = Result<CdnReader, ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /library/{id}/videos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideo {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
}

/// Query of `GET /library/{id}/videos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVideos {
    pub page: u32,
    pub items_per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Query of `GET /library/{id}/collections`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCollections {
    pub page: u32,
    pub items_per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Content handed to [`StreamApi::upload_video`].
pub enum UploadBody {
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl std::fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadBody::Bytes(bytes) => write!(f, "UploadBody::Bytes({} bytes)", bytes.len()),
            UploadBody::Reader(_) => write!(f, "UploadBody::Reader"),
        }
    }
}

/// Whether `status` is in the 2xx range.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
