use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a remote video (GUID-shaped, but treated as opaque).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for VideoId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Remote entities
// ---------------------------------------------------------------------------

/// A video record as returned by the Stream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEntity {
    pub guid: String,
    #[serde(default)]
    pub video_library_id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub storage_size: u64,
    #[serde(default = "epoch", deserialize_with = "deserialize_upload_time")]
    pub date_uploaded: DateTime<Utc>,
    /// Comma-delimited list, e.g. `"240p,360p,720p"`.
    #[serde(default)]
    pub available_resolutions: String,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub collection_id: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub length: u64,
}

impl VideoEntity {
    pub fn id(&self) -> VideoId {
        VideoId::new(self.guid.clone())
    }

    /// Renditions in the order the platform reports them. Empty entries are skipped.
    pub fn resolutions(&self) -> Vec<&str> {
        self.available_resolutions
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .collect()
    }
}

/// A collection record as returned by the Stream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntity {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub video_count: u64,
    #[serde(default)]
    pub total_size: u64,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub items_per_page: u32,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(current_page: u32, items_per_page: u32, total_items: u64, items: Vec<T>) -> Self {
        Self {
            total_items,
            current_page,
            items_per_page,
            items,
        }
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// The platform reports upload times without an offset (`2024-03-01T10:15:30.123`);
/// those are UTC. RFC 3339 values are accepted as well.
fn deserialize_upload_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_upload_time(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("unrecognized upload timestamp: {raw}"))
    })
}

pub fn parse_upload_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Collection links come back as `null`, `""` or a GUID.
fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|id| !id.is_empty()))
}

// ---------------------------------------------------------------------------
// Resource kinds
// ---------------------------------------------------------------------------

/// Which concrete asset inside a video a resolved CDN path denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    AdaptivePlaylist,
    SegmentFile,
    Thumbnail,
    Original,
    Rendition(String),
}

impl ResourceKind {
    /// Classify a resolved asset path such as `{vid}/play_720p.mp4`.
    pub fn classify(asset_path: &str) -> Option<Self> {
        let file = asset_path.rsplit('/').next().unwrap_or(asset_path);
        if file == "original" {
            Some(ResourceKind::Original)
        } else if file.ends_with(".m3u8") {
            Some(ResourceKind::AdaptivePlaylist)
        } else if file.ends_with(".ts") {
            Some(ResourceKind::SegmentFile)
        } else if let Some(quality) = file
            .strip_prefix("play_")
            .and_then(|rest| rest.strip_suffix(".mp4"))
        {
            Some(ResourceKind::Rendition(quality.to_string()))
        } else if file.ends_with(".jpg") || file.ends_with(".webp") || file.ends_with(".png") {
            Some(ResourceKind::Thumbnail)
        } else {
            None
        }
    }

    /// Metric label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::AdaptivePlaylist => "playlist",
            ResourceKind::SegmentFile => "segment",
            ResourceKind::Thumbnail => "thumbnail",
            ResourceKind::Original => "original",
            ResourceKind::Rendition(_) => "rendition",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Rendition(quality) => write!(f, "rendition({quality})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Default title given to uploads that carry no name.
pub const DEFAULT_VIDEO_TITLE: &str = "default";
