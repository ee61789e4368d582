//! Pure path resolution: logical paths to video ids and CDN asset paths.

pub mod cdn;
pub mod path;
pub mod video_id;

pub use cdn::{plan_cdn_asset, resolve_cdn_asset_path, CdnMode, CdnPlan, Quality};
pub use path::normalize;
pub use video_id::{resolve_video_id, resolve_video_id_with_prefix};
