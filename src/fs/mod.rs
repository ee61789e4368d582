//! The library presented as a filesystem.
//!
//! Directories are collections named by their full path. Files are videos,
//! addressed as `{collection...}/{video id}` plus an optional asset path such
//! as `playlist.m3u8` or `360p/video0.ts`.

pub mod collections;
pub mod listing;
pub mod upload;

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::{is_success, CdnReader, CdnSource, StreamApi};
use crate::core::config::AppConfig;
use crate::core::error::FsError;
use crate::core::types::{ResourceKind, VideoEntity, VideoId};
use crate::observability::metrics;
use crate::resolve::cdn::{rendition_asset_path, resolve_cdn_asset_path, CdnMode, Quality, PLAYLIST_FILE};
use crate::resolve::path::{basename, normalize, normalize_or_root};
use crate::resolve::video_id::{resolve_video_id, ORIGINAL_SENTINEL};

use self::collections::Collections;
pub use self::upload::UploadContent;

/// Mode used by `get` and `read_stream`: the highest advertised MP4.
const READ_MODE: CdnMode = CdnMode::PreferredRendition {
    lowest_first: false,
};

// ---------------------------------------------------------------------------
// StreamFilesystem
// ---------------------------------------------------------------------------

/// Filesystem adapter over one Bunny Stream library.
///
/// Holds immutable configuration and a backend implementing both the
/// management API and CDN reads. Share it across tasks behind an `Arc`.
pub struct StreamFilesystem<A> {
    config: AppConfig,
    api: A,
}

impl<A> StreamFilesystem<A>
where
    A: StreamApi + CdnSource,
{
    pub fn new(config: AppConfig, api: A) -> Self {
        Self { config, api }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn items_per_page(&self) -> u32 {
        self.config.listing.items_per_page
    }

    fn collections(&self) -> Collections<'_, A> {
        Collections::new(&self.api, self.items_per_page())
    }

    // -- Resolution --

    /// The video id a path refers to.
    pub fn path(&self, path: &str) -> VideoId {
        resolve_video_id(path)
    }

    /// Public CDN URL of the asset a path refers to, the adaptive playlist
    /// unless the path names a file.
    pub async fn url(&self, path: &str) -> Result<String, FsError> {
        let asset = resolve_cdn_asset_path(&self.api, path, CdnMode::AdaptivePlaylist).await?;
        Ok(format!("{}/{}", self.config.stream.cdn_base_url(), asset))
    }

    /// The raw video record.
    pub async fn video(&self, video_id: &VideoId) -> Result<VideoEntity, FsError> {
        Ok(self.api.get_video(video_id).await?)
    }

    // -- Metadata --

    /// Whether the video behind `path` exists. Every failure reads as `false`.
    pub async fn exists(&self, path: &str) -> bool {
        let video_id = resolve_video_id(path);
        match self.api.get_video(&video_id).await {
            Ok(video) => !video.guid.is_empty(),
            Err(e) => {
                debug!(%video_id, error = %e, "exists check failed");
                false
            }
        }
    }

    /// Stored size in bytes.
    pub async fn size(&self, path: &str) -> Result<u64, FsError> {
        let video = self.video(&resolve_video_id(path)).await?;
        Ok(video.storage_size)
    }

    /// Upload time of the video.
    pub async fn last_modified(&self, path: &str) -> Result<DateTime<Utc>, FsError> {
        let video = self.video(&resolve_video_id(path)).await?;
        Ok(video.date_uploaded)
    }

    // -- Reads --

    /// Content behind `path`: the named file, else the highest MP4 rendition.
    ///
    /// `None` when the CDN could not serve it.
    pub async fn get(&self, path: &str) -> Result<Option<Bytes>, FsError> {
        let asset = resolve_cdn_asset_path(&self.api, path, READ_MODE).await?;
        Ok(self.fetch_asset(&asset).await)
    }

    /// The video's adaptive-streaming playlist.
    pub async fn get_hls(&self, path: &str) -> Result<Option<Bytes>, FsError> {
        let video_id = resolve_video_id(path);
        Ok(self.fetch_asset(&format!("{}/{}", video_id, PLAYLIST_FILE)).await)
    }

    /// The originally uploaded file.
    pub async fn get_original(&self, path: &str) -> Result<Option<Bytes>, FsError> {
        let video_id = resolve_video_id(path);
        Ok(self
            .fetch_asset(&format!("{}/{}", video_id, ORIGINAL_SENTINEL))
            .await)
    }

    /// An MP4 rendition picked by quality tier.
    ///
    /// Named tiers fetch the video's rendition list first and fail with
    /// `RemoteNotFound` when it is empty.
    pub async fn get_mp4(&self, path: &str, quality: &Quality) -> Result<Option<Bytes>, FsError> {
        let video_id = resolve_video_id(path);
        let asset = if quality.needs_lookup() {
            let video = self.api.get_video(&video_id).await?;
            let resolutions = video.resolutions();
            let Some(picked) = quality.select(&resolutions) else {
                return Err(FsError::RemoteNotFound {
                    resource: format!("renditions of video {}", video_id),
                });
            };
            debug!(%video_id, %quality, picked, "selected rendition");
            rendition_asset_path(&video_id, picked)
        } else {
            rendition_asset_path(&video_id, &quality.to_string())
        };
        Ok(self.fetch_asset(&asset).await)
    }

    pub async fn get_mp4_low(&self, path: &str) -> Result<Option<Bytes>, FsError> {
        self.get_mp4(path, &Quality::Low).await
    }

    pub async fn get_mp4_medium(&self, path: &str) -> Result<Option<Bytes>, FsError> {
        self.get_mp4(path, &Quality::Medium).await
    }

    pub async fn get_mp4_high(&self, path: &str) -> Result<Option<Bytes>, FsError> {
        self.get_mp4(path, &Quality::High).await
    }

    /// Streaming read of the asset `get` would return.
    pub async fn read_stream(&self, path: &str) -> Result<CdnReader, FsError> {
        let asset = resolve_cdn_asset_path(&self.api, path, READ_MODE).await?;
        let kind = resource_label(&asset);
        match self.api.open(&asset).await {
            Ok(reader) => {
                metrics::inc_cdn_fetch(kind, "ok");
                Ok(reader)
            }
            Err(e) => {
                metrics::inc_cdn_fetch(kind, "error");
                Err(e.into())
            }
        }
    }

    async fn fetch_asset(&self, asset: &str) -> Option<Bytes> {
        let kind = resource_label(asset);
        match self.api.fetch(asset).await {
            Ok(bytes) => {
                metrics::inc_cdn_fetch(kind, "ok");
                debug!(asset, kind, bytes = bytes.len(), "cdn fetch");
                Some(bytes)
            }
            Err(e) => {
                metrics::inc_cdn_fetch(kind, "error");
                warn!(asset, kind, error = %e, "cdn fetch failed");
                None
            }
        }
    }

    // -- Writes --

    /// Upload into the directory of `path`, titled by its file name if it has one.
    pub async fn put(&self, path: &str, content: UploadContent) -> Result<Option<String>, FsError> {
        let name = path.contains('.').then(|| basename(&normalize_or_root(path)).to_string());
        self.put_file_as(path, content, name.as_deref()).await
    }

    /// Upload a local file, titled by the file name in `path` or else the file's own name.
    pub async fn put_file(&self, path: &str, file: &Path) -> Result<Option<String>, FsError> {
        let name = if path.contains('.') {
            Some(basename(&normalize_or_root(path)).to_string())
        } else {
            file.file_name().map(|n| n.to_string_lossy().into_owned())
        };
        self.put_file_as(path, UploadContent::File(file.to_path_buf()), name.as_deref())
            .await
    }

    /// Upload with an explicit title.
    pub async fn put_file_as(
        &self,
        path: &str,
        content: UploadContent,
        name: Option<&str>,
    ) -> Result<Option<String>, FsError> {
        upload::upload(&self.api, self.items_per_page(), path, content, name).await
    }

    /// Delete the video behind `path`. `true` iff the platform answered 2xx.
    pub async fn delete(&self, path: &str) -> Result<bool, FsError> {
        let video_id = resolve_video_id(path);
        let status = self.api.delete_video(&video_id).await?;
        let deleted = is_success(status);
        if deleted {
            info!(%video_id, "deleted video");
        } else {
            warn!(%video_id, status, "video delete rejected");
        }
        Ok(deleted)
    }

    /// Delete each path in turn, stopping at the first error.
    /// `true` iff every delete was accepted.
    pub async fn delete_many<S: AsRef<str>>(&self, paths: &[S]) -> Result<bool, FsError> {
        let mut all_deleted = true;
        for path in paths {
            all_deleted &= self.delete(path.as_ref()).await?;
        }
        Ok(all_deleted)
    }

    // -- Directories --

    /// Videos directly in `dir`. Collections do not nest, so `recursive`
    /// yields the same listing.
    pub async fn files(&self, dir: Option<&str>, _recursive: bool) -> Result<Vec<String>, FsError> {
        self.all_files(dir).await
    }

    /// Logical paths of every video in `dir`: `{guid}` at the root,
    /// `{dir}/{guid}` inside a directory. A missing directory is empty.
    pub async fn all_files(&self, dir: Option<&str>) -> Result<Vec<String>, FsError> {
        let dir = normalize(dir).unwrap_or_default();
        if dir.is_empty() {
            let videos = listing::all_videos(&self.api, self.items_per_page(), None).await;
            return Ok(videos.into_iter().map(|v| v.guid).collect());
        }

        let Some(collection) = self.collections().find_by_path(Some(&dir)).await? else {
            debug!(dir = %dir, "listing missing directory");
            return Ok(Vec::new());
        };
        let videos =
            listing::all_videos(&self.api, self.items_per_page(), Some(&collection.guid)).await;
        Ok(videos
            .into_iter()
            .map(|v| format!("{}/{}", dir, v.guid))
            .collect())
    }

    /// Directory names under `dir`, same as [`Self::all_directories`].
    pub async fn directories(&self, dir: Option<&str>, _recursive: bool) -> Vec<String> {
        self.all_directories(dir).await
    }

    /// Every directory equal to or beneath `dir`; all of them at the root.
    pub async fn all_directories(&self, dir: Option<&str>) -> Vec<String> {
        self.collections().list_directories(dir).await
    }

    pub async fn make_directory(&self, path: &str) -> Result<(), FsError> {
        self.collections().make_directory(path).await
    }

    pub async fn delete_directory(&self, path: &str) -> Result<bool, FsError> {
        self.collections().delete_directory(path).await
    }

    // -- Unsupported --

    pub async fn write_stream(&self, _path: &str, _content: UploadContent) -> Result<(), FsError> {
        Err(FsError::UnsupportedOperation {
            operation: "write_stream",
        })
    }

    pub fn visibility(&self, _path: &str) -> Result<String, FsError> {
        Err(FsError::UnsupportedOperation {
            operation: "visibility",
        })
    }

    pub fn set_visibility(&self, _path: &str, _visibility: &str) -> Result<(), FsError> {
        Err(FsError::UnsupportedOperation {
            operation: "set_visibility",
        })
    }

    pub async fn prepend(&self, _path: &str, _data: Bytes) -> Result<(), FsError> {
        Err(FsError::UnsupportedOperation {
            operation: "prepend",
        })
    }

    pub async fn append(&self, _path: &str, _data: Bytes) -> Result<(), FsError> {
        Err(FsError::UnsupportedOperation { operation: "append" })
    }

    pub async fn copy(&self, _from: &str, _to: &str) -> Result<(), FsError> {
        Err(FsError::UnsupportedOperation { operation: "copy" })
    }

    pub async fn move_to(&self, _from: &str, _to: &str) -> Result<(), FsError> {
        Err(FsError::UnsupportedOperation { operation: "move" })
    }
}

fn resource_label(asset: &str) -> &'static str {
    ResourceKind::classify(asset)
        .map(|kind| kind.label())
        .unwrap_or("other")
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::api::memory::InMemoryStreamApi;
    use crate::core::config::StreamConfig;

    fn filesystem() -> StreamFilesystem<InMemoryStreamApi> {
        let config = AppConfig::new(StreamConfig::new("vz-test.b-cdn.net", 7, "key-0123456789"));
        StreamFilesystem::new(config, InMemoryStreamApi::new())
    }

    #[tokio::test]
    async fn test_exists() {
        let fs = filesystem();
        let id = fs.api().seed_video(None, "clip", 10, "").await;

        assert!(fs.exists(&format!("col/{id}")).await);
        assert!(fs.exists(&format!("{id}/playlist.m3u8")).await);
        assert!(!fs.exists("missing").await);

        fs.api().fail_video_reads(true);
        assert!(!fs.exists(id.as_str()).await);
    }

    #[tokio::test]
    async fn test_size_and_last_modified() {
        let fs = filesystem();
        let id = fs.api().seed_video(None, "clip", 4096, "").await;

        assert_eq!(fs.size(&format!("a/b/{id}")).await.unwrap(), 4096);
        let uploaded = fs.last_modified(id.as_str()).await.unwrap();
        assert!(uploaded <= Utc::now());
        assert!(matches!(
            fs.size("missing").await,
            Err(FsError::RemoteNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_highest_rendition() {
        let fs = filesystem();
        let id = fs.api().seed_video(None, "clip", 10, "240p,720p").await;
        fs.api().seed_asset(&format!("{id}/play_720p.mp4"), "hi").await;

        let bytes = fs.get(&format!("trips/{id}")).await.unwrap().unwrap();
        assert_eq!(bytes.as_ref(), b"hi");
    }

    #[tokio::test]
    async fn test_get_direct_file_and_cdn_miss() {
        let fs = filesystem();
        let id = fs.api().seed_video(None, "clip", 10, "").await;
        fs.api().seed_asset(&format!("{id}/thumbnail.jpg"), "jpg").await;

        let thumb = fs.get(&format!("trips/{id}/thumbnail.jpg")).await.unwrap();
        assert_eq!(thumb.unwrap().as_ref(), b"jpg");

        let missing = fs.get(&format!("{id}/nothing.png")).await.unwrap();
        assert!(missing.is_none());
        assert_eq!(fs.api().calls().get_video, 0);
    }

    #[tokio::test]
    async fn test_get_hls_and_original() {
        let fs = filesystem();
        let id = fs.api().seed_video(None, "clip", 10, "").await;
        fs.api().seed_asset(&format!("{id}/playlist.m3u8"), "#EXTM3U").await;
        fs.api().seed_asset(&format!("{id}/original"), "raw").await;

        let hls = fs.get_hls(&format!("x/{id}/360p/video0.ts")).await.unwrap();
        assert_eq!(hls.unwrap().as_ref(), b"#EXTM3U");
        let original = fs.get_original(id.as_str()).await.unwrap();
        assert_eq!(original.unwrap().as_ref(), b"raw");
    }

    #[tokio::test]
    async fn test_get_mp4_tiers() {
        let fs = filesystem();
        let id = fs.api().seed_video(None, "clip", 10, "720p,240p,360p").await;
        for tier in ["240p", "360p", "720p"] {
            fs.api().seed_asset(&format!("{id}/play_{tier}.mp4"), tier).await;
        }

        let low = fs.get_mp4_low(id.as_str()).await.unwrap().unwrap();
        let medium = fs.get_mp4_medium(id.as_str()).await.unwrap().unwrap();
        let high = fs.get_mp4_high(id.as_str()).await.unwrap().unwrap();
        assert_eq!(low.as_ref(), b"240p");
        assert_eq!(medium.as_ref(), b"360p");
        assert_eq!(high.as_ref(), b"720p");
    }

    #[tokio::test]
    async fn test_get_mp4_explicit_skips_lookup() {
        let fs = filesystem();
        let id = VideoId::new("abc");
        fs.api().seed_asset("abc/play_480p.mp4", "480").await;

        let bytes = fs
            .get_mp4(id.as_str(), &Quality::parse("480p"))
            .await
            .unwrap();
        assert_eq!(bytes.unwrap().as_ref(), b"480");
        assert_eq!(fs.api().calls().get_video, 0);
    }

    #[tokio::test]
    async fn test_get_mp4_without_renditions_is_not_found() {
        let fs = filesystem();
        let id = fs.api().seed_video(None, "clip", 10, "").await;
        let err = fs.get_mp4_high(id.as_str()).await.unwrap_err();
        assert!(matches!(err, FsError::RemoteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_stream() {
        let fs = filesystem();
        let id = fs.api().seed_video(None, "clip", 10, "360p").await;
        fs.api().seed_asset(&format!("{id}/play_360p.mp4"), vec![5u8; 64]).await;

        let mut reader = fs.read_stream(id.as_str()).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len(), 64);
    }

    #[tokio::test]
    async fn test_url_and_path() {
        let fs = filesystem();
        let url = fs.url("/trips/abc/").await.unwrap();
        assert_eq!(url, "https://vz-test.b-cdn.net/abc/playlist.m3u8");

        let url = fs.url("trips/abc/thumbnail.jpg").await.unwrap();
        assert_eq!(url, "https://vz-test.b-cdn.net/abc/thumbnail.jpg");

        assert_eq!(fs.path("trips/abc/360p/video.m3u8").as_str(), "abc");
        assert_eq!(fs.api().calls().total_api(), 0);
    }

    #[tokio::test]
    async fn test_put_names_from_path() {
        let fs = filesystem();

        let logical = fs
            .put("videos/trip.mp4", vec![1u8, 2, 3].into())
            .await
            .unwrap()
            .unwrap();
        assert!(logical.starts_with("videos/"));

        let logical = fs.put("videos", vec![1u8].into()).await.unwrap().unwrap();
        let video = fs.video(&fs.path(&logical)).await.unwrap();
        assert_eq!(video.title, "default");

        let titles: Vec<_> = fs.api().videos().await.into_iter().map(|v| v.title).collect();
        assert_eq!(titles, vec!["trip.mp4", "default"]);
        assert_eq!(fs.api().calls().create_collection, 1);
    }

    #[tokio::test]
    async fn test_put_file_names() {
        let fs = filesystem();
        let file = tempfile::Builder::new().suffix(".mov").tempfile().unwrap();
        let own_name = file.path().file_name().unwrap().to_string_lossy().into_owned();

        fs.put_file("holiday", file.path()).await.unwrap().unwrap();
        fs.put_file("holiday/renamed.mov", file.path())
            .await
            .unwrap()
            .unwrap();

        let titles: Vec<_> = fs.api().videos().await.into_iter().map(|v| v.title).collect();
        assert_eq!(titles, vec![own_name, "renamed.mov".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_and_delete_many() {
        let fs = filesystem();
        let a = fs.api().seed_video(None, "a", 1, "").await;
        let b = fs.api().seed_video(None, "b", 1, "").await;
        let c = fs.api().seed_video(None, "c", 1, "").await;

        assert!(fs.delete(&format!("dir/{a}")).await.unwrap());
        assert!(!fs.delete(a.as_str()).await.unwrap());

        let paths = vec![b.to_string(), format!("{c}/playlist.m3u8")];
        assert!(fs.delete_many(&paths[..]).await.unwrap());
        assert!(fs.api().videos().await.is_empty());
    }

    #[tokio::test]
    async fn test_files_root_and_directory() {
        let fs = filesystem();
        let trips = fs.api().seed_collection("trips").await;
        let in_trips = fs.api().seed_video(Some(&trips.guid), "a", 1, "").await;
        let at_root = fs.api().seed_video(None, "b", 1, "").await;

        let root = fs.all_files(None).await.unwrap();
        assert_eq!(root, vec![in_trips.to_string(), at_root.to_string()]);

        let files = fs.files(Some("/trips/"), true).await.unwrap();
        assert_eq!(files, vec![format!("trips/{in_trips}")]);

        assert!(fs.all_files(Some("nowhere")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directories() {
        let fs = filesystem();
        fs.make_directory("a").await.unwrap();
        fs.make_directory("a/b").await.unwrap();
        fs.make_directory("c").await.unwrap();

        assert_eq!(fs.directories(None, false).await, vec!["a", "a/b", "c"]);
        assert_eq!(fs.all_directories(Some("a")).await, vec!["a", "a/b"]);

        assert!(fs.delete_directory("a/b").await.unwrap());
        assert_eq!(fs.all_directories(Some("a")).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let fs = filesystem();
        let unsupported = |r: Result<(), FsError>| {
            matches!(r, Err(FsError::UnsupportedOperation { .. }))
        };

        assert!(unsupported(
            fs.write_stream("x", Bytes::new().into()).await
        ));
        assert!(fs.visibility("x").is_err());
        assert!(unsupported(fs.set_visibility("x", "public")));
        assert!(unsupported(fs.prepend("x", Bytes::new()).await));
        assert!(unsupported(fs.append("x", Bytes::new()).await));
        assert!(unsupported(fs.copy("x", "y").await));
        assert!(unsupported(fs.move_to("x", "y").await));
        assert_eq!(fs.api().calls().total_api(), 0);
    }
}
