// src/upload.rs
//! Artifact-uploader seam. The crate ships no cloud client; hosts plug in
//! their own implementation (Drive, S3, ...) and the pipeline calls it
//! best-effort after export.

use std::path::Path;

use anyhow::Result;

use crate::config::CrawlConfig;

/// Destination folder id, from config first, then the environment.
pub const ENV_DRIVE_FOLDER_ID: &str = "FUNDINGBOT_DRIVE_FOLDER_ID";

/// What a successful upload hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub file_id: String,
    pub web_link: Option<String>,
}

#[async_trait::async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, path: &Path, folder_id: &str) -> Result<UploadReceipt>;
}

pub fn resolve_folder_id(cfg: &CrawlConfig) -> Option<String> {
    cfg.upload_folder_id
        .clone()
        .or_else(|| std::env::var(ENV_DRIVE_FOLDER_ID).ok())
        .filter(|id| !id.trim().is_empty())
}
