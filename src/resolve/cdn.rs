use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::api::StreamApi;
use crate::core::error::FsError;
use crate::core::types::{VideoEntity, VideoId};

use super::path::{after_last, basename, normalize_or_root};
use super::video_id::{is_direct_file_name, resolve_video_id};

/// Top-level adaptive-streaming manifest of every video.
pub const PLAYLIST_FILE: &str = "playlist.m3u8";

// ---------------------------------------------------------------------------
// Playback intent
// ---------------------------------------------------------------------------

/// How a path that does not pin a concrete asset should be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdnMode {
    /// `{vid}/playlist.m3u8`
    AdaptivePlaylist,
    /// `{vid}/play_{resolution}.mp4`, taking the first or last advertised resolution.
    PreferredRendition { lowest_first: bool },
}

/// Outcome of resolving a path before any remote lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnPlan {
    /// The asset path is fully known.
    Asset(String),
    /// The video's renditions must be fetched to pick one.
    Rendition { video_id: VideoId, lowest_first: bool },
}

/// Decide which asset `path` refers to, without touching the network.
pub fn plan_cdn_asset(path: &str, mode: CdnMode) -> CdnPlan {
    let normalized = normalize_or_root(path);
    let video_id = resolve_video_id(&normalized);

    if is_direct_file_name(basename(&normalized)) {
        let needle = format!("{}/", video_id);
        let rest = after_last(&normalized, &needle);
        return CdnPlan::Asset(format!("{}/{}", video_id, rest));
    }

    match mode {
        CdnMode::AdaptivePlaylist => CdnPlan::Asset(format!("{}/{}", video_id, PLAYLIST_FILE)),
        CdnMode::PreferredRendition { lowest_first } => CdnPlan::Rendition {
            video_id,
            lowest_first,
        },
    }
}

/// Resolve `path` to the asset path to fetch from the CDN.
///
/// Performs at most one remote read, and only for
/// [`CdnMode::PreferredRendition`] on a path that does not name a file.
pub async fn resolve_cdn_asset_path<A: StreamApi>(
    api: &A,
    path: &str,
    mode: CdnMode,
) -> Result<String, FsError> {
    match plan_cdn_asset(path, mode) {
        CdnPlan::Asset(asset) => Ok(asset),
        CdnPlan::Rendition {
            video_id,
            lowest_first,
        } => {
            let video = api.get_video(&video_id).await?;
            let asset = preferred_rendition_path(&video, lowest_first)?;
            debug!(%video_id, asset, lowest_first, "picked preferred rendition");
            Ok(asset)
        }
    }
}

/// First (lowest) or last (highest) advertised rendition of `video`.
pub fn preferred_rendition_path(video: &VideoEntity, lowest_first: bool) -> Result<String, FsError> {
    let resolutions = video.resolutions();
    let picked = if lowest_first {
        resolutions.first()
    } else {
        resolutions.last()
    };
    match picked {
        Some(resolution) => Ok(rendition_asset_path(&video.id(), resolution)),
        None => Err(FsError::RemoteNotFound {
            resource: format!("renditions of video {}", video.guid),
        }),
    }
}

/// `{vid}/play_{quality}.mp4`
pub fn rendition_asset_path(video_id: &VideoId, quality: &str) -> String {
    format!("{}/play_{}.mp4", video_id, quality)
}

// ---------------------------------------------------------------------------
// Quality tiers
// ---------------------------------------------------------------------------

/// A requested MP4 quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
    /// A concrete tier such as `720p`; used as-is without a lookup.
    Explicit(String),
    /// Anything else. Substituted into the file name unchecked; the CDN
    /// answers 404 when it is not a real rendition.
    Verbatim(String),
}

impl Quality {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "low" | "lowest" => Quality::Low,
            "mid" | "medium" => Quality::Medium,
            "high" | "highest" => Quality::High,
            other if names_explicit_tier(other) => Quality::Explicit(other.to_string()),
            other => Quality::Verbatim(other.to_string()),
        }
    }

    /// Whether picking this tier needs the video's rendition list.
    pub fn needs_lookup(&self) -> bool {
        matches!(self, Quality::Low | Quality::Medium | Quality::High)
    }

    /// Pick a resolution for this tier from a video's advertised list.
    ///
    /// Named tiers sort the list numerically first. `Medium` takes index
    /// `ceil(n / 2) - 1`, i.e. `n / 2 - 1` rounded half up. Returns `None`
    /// for a named tier when the list is empty.
    pub fn select<'a>(&'a self, resolutions: &[&'a str]) -> Option<&'a str> {
        let index = match self {
            Quality::Explicit(tier) | Quality::Verbatim(tier) => return Some(tier.as_str()),
            _ if resolutions.is_empty() => return None,
            Quality::Low => 0,
            Quality::Medium => resolutions.len().div_ceil(2) - 1,
            Quality::High => resolutions.len() - 1,
        };
        let mut sorted = resolutions.to_vec();
        sorted.sort_by_key(|r| leading_number(r));
        sorted.get(index).copied()
    }
}

impl FromStr for Quality {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Quality::parse(s))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Low => f.write_str("low"),
            Quality::Medium => f.write_str("medium"),
            Quality::High => f.write_str("high"),
            Quality::Explicit(tier) | Quality::Verbatim(tier) => f.write_str(tier),
        }
    }
}

/// True when `raw` contains a run of digits followed by `p` (`720p`, `hd1080p`).
fn names_explicit_tier(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes
        .windows(2)
        .any(|pair| pair[0].is_ascii_digit() && pair[1] == b'p')
}

/// Numeric value of the leading digits (`"720p"` is 720); 0 when there are none.
fn leading_number(raw: &str) -> u32 {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
