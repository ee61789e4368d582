use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::api::{is_success, CreateVideo, StreamApi, UploadBody};
use crate::core::error::FsError;
use crate::core::types::DEFAULT_VIDEO_TITLE;
use crate::observability::metrics;
use crate::resolve::path::{normalize_or_root, strip_filename};

use super::collections::Collections;

// ---------------------------------------------------------------------------
// Upload content
// ---------------------------------------------------------------------------

/// What to upload.
pub enum UploadContent {
    /// An already open byte source.
    Stream(Box<dyn AsyncRead + Send + Sync + Unpin>),
    /// A buffered body.
    Bytes(Bytes),
    /// A local file, opened for reading on upload.
    File(PathBuf),
}

impl std::fmt::Debug for UploadContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadContent::Stream(_) => write!(f, "UploadContent::Stream"),
            UploadContent::Bytes(bytes) => write!(f, "UploadContent::Bytes({} bytes)", bytes.len()),
            UploadContent::File(path) => write!(f, "UploadContent::File({})", path.display()),
        }
    }
}

impl From<Bytes> for UploadContent {
    fn from(bytes: Bytes) -> Self {
        UploadContent::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadContent {
    fn from(bytes: Vec<u8>) -> Self {
        UploadContent::Bytes(Bytes::from(bytes))
    }
}

impl From<PathBuf> for UploadContent {
    fn from(path: PathBuf) -> Self {
        UploadContent::File(path)
    }
}

impl UploadContent {
    /// Turn the content into a request body, opening files.
    async fn into_body(self) -> Result<UploadBody, FsError> {
        match self {
            UploadContent::Stream(reader) => Ok(UploadBody::Reader(reader)),
            UploadContent::Bytes(bytes) => Ok(UploadBody::Bytes(bytes)),
            UploadContent::File(path) => {
                let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
                    FsError::InvalidContent {
                        reason: format!("cannot stat {}: {}", path.display(), e),
                    }
                })?;
                if !metadata.is_file() {
                    return Err(FsError::InvalidContent {
                        reason: format!("{} is not a regular file", path.display()),
                    });
                }
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    FsError::InvalidContent {
                        reason: format!("cannot open {}: {}", path.display(), e),
                    }
                })?;
                Ok(UploadBody::Reader(Box::new(file)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Upload `content` as a new video in the directory named by `path`.
///
/// A file-name-looking last segment of `path` is ignored; only its directory
/// part is used. Returns the logical path of the new video, or `None` when
/// the platform rejected the content.
pub async fn upload<A: StreamApi>(
    api: &A,
    items_per_page: u32,
    path: &str,
    content: UploadContent,
    name: Option<&str>,
) -> Result<Option<String>, FsError> {
    let body = match content.into_body().await {
        Ok(body) => body,
        Err(e) => {
            metrics::inc_upload("invalid_content");
            return Err(e);
        }
    };

    let directory = normalize_or_root(strip_filename(&normalize_or_root(path)));
    let collection = if directory.is_empty() {
        None
    } else {
        Some(Collections::new(api, items_per_page).ensure(&directory).await?)
    };

    let title = name.unwrap_or(DEFAULT_VIDEO_TITLE).to_string();
    let video = api
        .create_video(&CreateVideo {
            title: title.clone(),
            collection_id: collection.as_ref().map(|c| c.guid.clone()),
        })
        .await?;
    let video_id = video.id();

    let status = api.upload_video(&video_id, body).await?;
    if !is_success(status) {
        metrics::inc_upload("rejected");
        warn!(%video_id, status, "upload rejected");
        return Ok(None);
    }

    metrics::inc_upload("accepted");
    let logical = match &collection {
        Some(collection) => format!("{}/{}", collection.name, video_id),
        None => video_id.to_string(),
    };
    info!(%video_id, title = %title, path = %logical, "uploaded video");
    Ok(Some(logical))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::api::memory::InMemoryStreamApi;
    use crate::core::types::VideoId;

    #[tokio::test]
    async fn test_missing_file_fails_before_any_remote_call() {
        let api = InMemoryStreamApi::new();
        let err = upload(
            &api,
            1000,
            "videos/trip.mp4",
            UploadContent::File(PathBuf::from("/definitely/not/here.mp4")),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FsError::InvalidContent { .. }));
        assert_eq!(api.calls().total_api(), 0);
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let api = InMemoryStreamApi::new();
        let dir = tempfile::tempdir().unwrap();
        let err = upload(
            &api,
            1000,
            "videos",
            UploadContent::File(dir.path().to_path_buf()),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FsError::InvalidContent { .. }));
        assert_eq!(api.calls().total_api(), 0);
    }

    #[tokio::test]
    async fn test_upload_file_into_new_collection() {
        let api = InMemoryStreamApi::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not really an mp4").unwrap();

        let logical = upload(
            &api,
            1000,
            "/videos/2024/trip.mp4",
            UploadContent::File(file.path().to_path_buf()),
            Some("trip.mp4"),
        )
        .await
        .unwrap()
        .unwrap();

        let (collection, id) = logical.rsplit_once('/').unwrap();
        assert_eq!(collection, "videos/2024");

        let video_id = VideoId::new(id);
        let video = api.get_video(&video_id).await.unwrap();
        assert_eq!(video.title, "trip.mp4");
        assert_eq!(video.storage_size, 17);
        assert_eq!(api.collections().await[0].name, "videos/2024");
        assert_eq!(
            api.uploaded_content(&video_id).await.unwrap().as_ref(),
            b"not really an mp4"
        );
    }

    #[tokio::test]
    async fn test_upload_bytes_at_root_uses_default_title() {
        let api = InMemoryStreamApi::new();
        let logical = upload(&api, 1000, "", Bytes::from_static(b"abc").into(), None)
            .await
            .unwrap()
            .unwrap();

        assert!(!logical.contains('/'));
        let video = api.get_video(&VideoId::new(logical)).await.unwrap();
        assert_eq!(video.title, DEFAULT_VIDEO_TITLE);
        assert!(video.collection_id.is_none());
        assert_eq!(api.calls().list_collections, 0);
        assert_eq!(api.calls().create_collection, 0);
    }

    #[tokio::test]
    async fn test_bare_filename_uploads_to_root() {
        let api = InMemoryStreamApi::new();
        let logical = upload(&api, 1000, "clip.mp4", vec![1u8, 2].into(), Some("clip.mp4"))
            .await
            .unwrap()
            .unwrap();
        assert!(!logical.contains('/'));
        assert!(api.collections().await.is_empty());
    }

    #[tokio::test]
    async fn test_existing_collection_is_reused() {
        let api = InMemoryStreamApi::new();
        let existing = api.seed_collection("work").await;

        upload(&api, 1000, "work", vec![0u8; 4].into(), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(api.calls().create_collection, 0);
        let videos = api.videos().await;
        assert_eq!(videos[0].collection_id.as_deref(), Some(existing.guid.as_str()));
    }

    #[tokio::test]
    async fn test_stream_content() {
        let api = InMemoryStreamApi::new();
        let reader = Box::new(std::io::Cursor::new(vec![7u8; 32]));
        let logical = upload(&api, 1000, "", UploadContent::Stream(reader), None)
            .await
            .unwrap()
            .unwrap();
        let video = api.get_video(&VideoId::new(logical)).await.unwrap();
        assert_eq!(video.storage_size, 32);
    }

    #[tokio::test]
    async fn test_rejected_upload_is_none() {
        let api = InMemoryStreamApi::new();
        api.respond_to_uploads_with(Some(400));

        let result = upload(&api, 1000, "videos", vec![1u8].into(), None)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(api.calls().upload_video, 1);
    }
}
