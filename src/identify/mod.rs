//! 錠剤識別サービス連携
//!
//! 表・裏2枚の写真を1回のリクエストで送り、
//! 上位3候補の説明文を受け取る。

pub mod cache;
pub mod side_effects;

pub use cache::ResultCache;
pub use side_effects::{collect_side_effects, OpenFdaClient, SideEffectSource};

use crate::error::{PillIdError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pill_id_common::RecognitionResponse;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// 撮影済みの2枚
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPair {
    pub front: Vec<u8>,
    pub back: Vec<u8>,
}

impl PhotoPair {
    pub fn new(front: Vec<u8>, back: Vec<u8>) -> Self {
        Self { front, back }
    }

    pub fn from_files(front: &Path, back: &Path) -> Result<Self> {
        Ok(Self::new(read_photo(front)?, read_photo(back)?))
    }
}

pub fn read_photo(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(PillIdError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read(path)?)
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn analyze_both(&self, photos: &PhotoPair) -> Result<RecognitionResponse>;
}

/// `/analyze-both` のリクエストボディ
#[derive(Serialize)]
struct AnalyzeBothRequest {
    image1: String,
    image2: String,
}

impl AnalyzeBothRequest {
    fn encode(photos: &PhotoPair) -> Self {
        Self {
            image1: STANDARD.encode(&photos.front),
            image2: STANDARD.encode(&photos.back),
        }
    }
}

/// 識別サービスのHTTPクライアント
pub struct RecognitionClient {
    base_url: String,
    client: reqwest::Client,
}

impl RecognitionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PillIdError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Recognizer for RecognitionClient {
    async fn analyze_both(&self, photos: &PhotoPair) -> Result<RecognitionResponse> {
        let url = format!("{}/analyze-both", self.base_url);
        let body = AnalyzeBothRequest::encode(photos);

        tracing::debug!(
            front_bytes = photos.front.len(),
            back_bytes = photos.back.len(),
            "submitting photos for analysis"
        );

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PillIdError::ApiCall(format!("HTTP {}: {}", status, text.trim())));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| PillIdError::ApiParse(e.to_string()))
    }
}
