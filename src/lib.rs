pub mod api;
pub mod core;
pub mod fs;
pub mod observability;
pub mod resolve;

pub use crate::core::config::AppConfig;
pub use crate::core::error::{ApiError, FsError};
pub use crate::fs::{StreamFilesystem, UploadContent};
