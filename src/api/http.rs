use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, warn};

use crate::core::config::{HttpConfig, StreamConfig};
use crate::core::error::ApiError;
use crate::core::redact::{redact_access_key, Redacted};
use crate::core::types::{CollectionEntity, Page, VideoEntity, VideoId};
use crate::observability::metrics::RemoteCallTimer;

use super::{CdnReader, CdnSource, CreateVideo, ListCollections, ListVideos, StreamApi, UploadBody};

const ACCESS_KEY_HEADER: &str = "AccessKey";

// ---------------------------------------------------------------------------
// BunnyStreamClient
// ---------------------------------------------------------------------------

/// REST client for one Bunny Stream library and its CDN pull zone.
#[derive(Clone)]
pub struct BunnyStreamClient {
    client: Client,
    api_base_url: Url,
    library_id: u64,
    api_key: Redacted<String>,
    cdn_base_url: Url,
    /// Pull zone first, then the player embed host.
    referers: [String; 2],
}

impl std::fmt::Debug for BunnyStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BunnyStreamClient")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("library_id", &self.library_id)
            .field("api_key", &redact_access_key(self.api_key.expose()))
            .field("cdn_base_url", &self.cdn_base_url.as_str())
            .finish()
    }
}

impl BunnyStreamClient {
    pub fn new(stream: &StreamConfig, http: &HttpConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_secs))
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        let cdn_base_url = stream.cdn_base_url();
        Ok(Self {
            client,
            api_base_url: parse_base_url("api_base_url", &stream.api_base_url)?,
            library_id: stream.library_id,
            api_key: stream.api_key.clone(),
            cdn_base_url: parse_base_url("hostname", &cdn_base_url)?,
            referers: [cdn_base_url, stream.fallback_referer.clone()],
        })
    }

    /// `{api_base_url}/library/{library_id}/{segments...}`, each segment
    /// percent-encoded on its own.
    fn library_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let library_id = self.library_id.to_string();
        join_segments(
            &self.api_base_url,
            ["library", library_id.as_str()]
                .into_iter()
                .chain(segments.iter().copied()),
        )
    }

    fn cdn_url(&self, asset_path: &str) -> Result<Url, ApiError> {
        join_segments(&self.cdn_base_url, asset_path.trim_matches('/').split('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(ACCESS_KEY_HEADER, self.api_key.expose().as_str())
    }

    fn api_request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.library_url(segments)?;
        Ok(self
            .authorized(self.client.request(method, url))
            .header(ACCEPT, "application/json"))
    }

    fn cdn_request(&self, asset_path: &str, referer: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.cdn_url(asset_path)?;
        Ok(self
            .authorized(self.client.get(url))
            .header(REFERER, referer)
            .header(ACCEPT, "*/*"))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: String,
    ) -> Result<T, ApiError> {
        let response = request.send().await.map_err(map_transport)?;
        let response = expect_success(response, resource).await?;
        response.json::<T>().await.map_err(|e| ApiError::Decode {
            reason: e.to_string(),
        })
    }

    async fn send_for_status(&self, request: RequestBuilder) -> Result<u16, ApiError> {
        let response = request.send().await.map_err(map_transport)?;
        Ok(response.status().as_u16())
    }

    /// One CDN GET with the given referer.
    async fn cdn_get(&self, asset_path: &str, referer: &str) -> Result<Response, ApiError> {
        let response = self
            .cdn_request(asset_path, referer)?
            .send()
            .await
            .map_err(map_transport)?;
        expect_success(response, format!("asset {}", asset_path)).await
    }

    async fn cdn_get_with_fallback(&self, asset_path: &str) -> Result<Response, ApiError> {
        with_referer_fallback(&self.referers, |referer| self.cdn_get(asset_path, referer)).await
    }
}

fn parse_base_url(field: &str, raw: &str) -> Result<Url, ApiError> {
    let url = Url::parse(raw).map_err(|e| ApiError::Transport {
        reason: format!("invalid {} {:?}: {}", field, raw, e),
    })?;
    if url.cannot_be_a_base() {
        return Err(ApiError::Transport {
            reason: format!("invalid {} {:?}: not a base URL", field, raw),
        });
    }
    Ok(url)
}

/// Ids are opaque, but an empty, `.` or `..` segment would address a
/// different resource once the URL is normalized. No such video can exist.
fn addressable(segment: &str) -> Result<&str, ApiError> {
    match segment {
        "" | "." | ".." => Err(ApiError::NotFound {
            resource: format!("path segment {:?}", segment),
        }),
        _ => Ok(segment),
    }
}

fn join_segments<'a>(
    base: &Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, ApiError> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|()| ApiError::Transport {
            reason: format!("{} is not a base URL", base),
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(addressable(segment)?);
        }
    }
    Ok(url)
}

/// Runs `attempt` with each referer in order and returns the first success,
/// or the last failure.
async fn with_referer_fallback<'a, T, F, Fut>(
    referers: &'a [String],
    mut attempt: F,
) -> Result<T, ApiError>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut last_error = ApiError::Transport {
        reason: "no referer configured".to_string(),
    };
    for referer in referers {
        match attempt(referer.as_str()).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(referer = %referer, error = %e, "cdn fetch failed");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

async fn expect_success(response: Response, resource: String) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, resource, body))
}

fn status_error(status: StatusCode, resource: String, body: String) -> ApiError {
    if status == StatusCode::NOT_FOUND {
        ApiError::NotFound { resource }
    } else {
        ApiError::Status {
            status: status.as_u16(),
            body,
        }
    }
}

fn map_transport(err: reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::Decode {
            reason: err.to_string(),
        }
    } else {
        ApiError::Transport {
            reason: err.to_string(),
        }
    }
}

async fn timed<T>(
    op: &'static str,
    call: impl std::future::Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    let timer = RemoteCallTimer::start(op);
    let result = call.await;
    if let Err(e) = &result {
        warn!(op, error = %e, "stream api call failed");
    }
    timer.finish(&result, ApiError::kind);
    result
}

// ---------------------------------------------------------------------------
// StreamApi
// ---------------------------------------------------------------------------

impl StreamApi for BunnyStreamClient {
    async fn get_video(&self, video_id: &VideoId) -> Result<VideoEntity, ApiError> {
        timed("get_video", async {
            let request = self.api_request(Method::GET, &["videos", video_id.as_str()])?;
            self.send_json(request, format!("video {}", video_id)).await
        })
        .await
    }

    async fn create_video(&self, body: &CreateVideo) -> Result<VideoEntity, ApiError> {
        timed("create_video", async {
            let request = self.api_request(Method::POST, &["videos"])?.json(body);
            self.send_json(request, "videos".to_string()).await
        })
        .await
    }

    async fn delete_video(&self, video_id: &VideoId) -> Result<u16, ApiError> {
        timed("delete_video", async {
            let request = self.api_request(Method::DELETE, &["videos", video_id.as_str()])?;
            self.send_for_status(request).await
        })
        .await
    }

    async fn upload_video(&self, video_id: &VideoId, body: UploadBody) -> Result<u16, ApiError> {
        timed("upload_video", async {
            let request = self.api_request(Method::PUT, &["videos", video_id.as_str()])?;
            let body = match body {
                UploadBody::Bytes(bytes) => reqwest::Body::from(bytes),
                UploadBody::Reader(reader) => {
                    reqwest::Body::wrap_stream(ReaderStream::new(reader))
                }
            };
            self.send_for_status(request.body(body)).await
        })
        .await
    }

    async fn list_videos(&self, query: &ListVideos) -> Result<Page<VideoEntity>, ApiError> {
        timed("list_videos", async {
            let request = self.api_request(Method::GET, &["videos"])?.query(query);
            self.send_json(request, "videos".to_string()).await
        })
        .await
    }

    async fn create_collection(&self, name: &str) -> Result<CollectionEntity, ApiError> {
        timed("create_collection", async {
            let request = self
                .api_request(Method::POST, &["collections"])?
                .json(&serde_json::json!({ "name": name }));
            self.send_json(request, "collections".to_string()).await
        })
        .await
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<u16, ApiError> {
        timed("delete_collection", async {
            let request = self.api_request(Method::DELETE, &["collections", collection_id])?;
            self.send_for_status(request).await
        })
        .await
    }

    async fn list_collections(
        &self,
        query: &ListCollections,
    ) -> Result<Page<CollectionEntity>, ApiError> {
        timed("list_collections", async {
            let request = self.api_request(Method::GET, &["collections"])?.query(query);
            self.send_json(request, "collections".to_string()).await
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// CdnSource
// ---------------------------------------------------------------------------

impl CdnSource for BunnyStreamClient {
    async fn fetch(&self, asset_path: &str) -> Result<Bytes, ApiError> {
        let response = self.cdn_get_with_fallback(asset_path).await?;
        response.bytes().await.map_err(map_transport)
    }

    async fn open(&self, asset_path: &str) -> Result<CdnReader, ApiError> {
        let response = self.cdn_get_with_fallback(asset_path).await?;
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }
}
