use tracing::trace;

use crate::core::types::VideoId;

use super::path::{basename, before_last, normalize_or_root};

// ---------------------------------------------------------------------------
// Path shape rules
// ---------------------------------------------------------------------------

/// Per-rendition HLS manifest name, e.g. `{vid}/360p/video.m3u8`.
pub const TIER_MANIFEST_NAME: &str = "video.m3u8";

/// HLS segment extension, e.g. `{vid}/360p/video0.ts`.
pub const SEGMENT_EXTENSION: &str = ".ts";

/// Directory holding seek-preview sprites, e.g. `{vid}/seek/_0.jpg`.
pub const SEEK_SEGMENT: &str = "/seek/";

/// Extension-less name of the original upload, e.g. `{vid}/original`.
pub const ORIGINAL_SENTINEL: &str = "original";

/// One rewrite step of the video-id grammar.
///
/// Rules run in table order, each at most once, and each sees the output of
/// the rules before it.
#[derive(Clone, Copy)]
pub struct PathRule {
    pub name: &'static str,
    matches: fn(&str) -> bool,
    rewrite: fn(&str) -> &str,
}

impl PathRule {
    /// Apply this rule to `path`, returning it unchanged when it does not match.
    pub fn apply<'a>(&self, path: &'a str) -> &'a str {
        if (self.matches)(path) {
            (self.rewrite)(path)
        } else {
            path
        }
    }
}

/// Whether a final segment names a file inside a video rather than the video.
pub fn is_direct_file_name(segment: &str) -> bool {
    segment.contains('.') || segment == ORIGINAL_SENTINEL
}

fn drop_one(path: &str) -> &str {
    before_last(path, "/")
}

fn drop_two(path: &str) -> &str {
    before_last(before_last(path, "/"), "/")
}

/// `{...}/{vid}/{tier}/video.m3u8` and `{...}/{vid}/{tier}/videoN.ts`
pub const RENDITION_FILE_RULE: PathRule = PathRule {
    name: "rendition_file",
    matches: |p| basename(p) == TIER_MANIFEST_NAME || p.ends_with(SEGMENT_EXTENSION),
    rewrite: drop_two,
};

/// `{...}/{vid}/seek/{frame}.ext`
pub const SEEK_SPRITE_RULE: PathRule = PathRule {
    name: "seek_sprite",
    matches: |p| p.contains(SEEK_SEGMENT) && basename(p).contains('.'),
    rewrite: drop_two,
};

/// `{...}/{vid}/playlist.m3u8`, `{...}/{vid}/thumbnail.jpg`, `{...}/{vid}/original`
pub const DIRECT_FILE_RULE: PathRule = PathRule {
    name: "direct_file",
    matches: |p| p.contains('/') && is_direct_file_name(basename(p)),
    rewrite: drop_one,
};

/// `{collection...}/{vid}` keeps only `{vid}`.
pub const COLLECTION_PREFIX_RULE: PathRule = PathRule {
    name: "collection_prefix",
    matches: |p| p.contains('/'),
    rewrite: basename,
};

/// Rules that peel file artifacts off the end, in the order they must run.
/// [`COLLECTION_PREFIX_RULE`] always runs last.
pub const FILE_SHAPE_RULES: [PathRule; 3] =
    [RENDITION_FILE_RULE, SEEK_SPRITE_RULE, DIRECT_FILE_RULE];

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Deduce the video a path refers to. Pure; never touches the network.
///
/// Must not be called with a path that names only a directory: the last
/// remaining segment is taken as the id regardless.
pub fn resolve_video_id(path: &str) -> VideoId {
    resolve_video_id_with_prefix(path).0
}

/// Like [`resolve_video_id`], also returning the collection-name segments
/// that preceded the id, if any.
pub fn resolve_video_id_with_prefix(path: &str) -> (VideoId, Option<String>) {
    let normalized = normalize_or_root(path);
    let mut current: &str = &normalized;

    for rule in &FILE_SHAPE_RULES {
        let next = rule.apply(current);
        if next.len() != current.len() {
            trace!(rule = rule.name, from = current, to = next, "video id rule applied");
        }
        current = next;
    }

    let prefix = if current.contains('/') {
        Some(before_last(current, "/").to_string())
    } else {
        None
    };
    let id = COLLECTION_PREFIX_RULE.apply(current);
    (VideoId::new(id), prefix)
}
