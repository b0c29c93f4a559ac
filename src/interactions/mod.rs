//! 薬物相互作用チェック
//!
//! 外部APIは「値が相互作用レコード」のオブジェクトを返す（キーは無意味）。
//! 値を順に取り出して `InteractionWarning` に正規化する。

use crate::error::{PillIdError, Result};
use async_trait::async_trait;
use pill_id_common::{InteractionWarning, MedicationRecord};
use serde_json::Value;
use std::time::Duration;

#[async_trait]
pub trait InteractionSource: Send + Sync {
    async fn fetch(&self, drug_a: &str, drug_b: &str) -> Result<Value>;
}

/// `GET {base}?drug1=A&drug2=B`
pub struct InteractionHttpSource {
    url: String,
    client: reqwest::Client,
}

impl InteractionHttpSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PillIdError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl InteractionSource for InteractionHttpSource {
    async fn fetch(&self, drug_a: &str, drug_b: &str) -> Result<Value> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("drug1", drug_a), ("drug2", drug_b)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PillIdError::ApiCall(format!("interactions: HTTP {}", status)));
        }

        // 本文がJSONでなければ「不正な形」として空扱いにする
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

/// オブジェクトの値を警告列に変換
///
/// オブジェクト以外のペイロードは空。値のうちオブジェクトでないものは読み飛ばす。
pub fn normalize_interactions(payload: &Value) -> Vec<InteractionWarning> {
    let Some(entries) = payload.as_object() else {
        tracing::debug!("interaction payload is not an object");
        return Vec::new();
    };

    entries
        .values()
        .filter(|v| v.is_object())
        .filter_map(|v| match serde_json::from_value::<InteractionWarning>(v.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::debug!("skipping interaction entry: {}", e);
                None
            }
        })
        .collect()
}

pub struct InteractionChecker<S: InteractionSource> {
    source: S,
}

impl<S: InteractionSource> InteractionChecker<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// 失敗をエラーとして返す版
    pub async fn compare_detailed(&self, drug_a: &str, drug_b: &str) -> Result<Vec<InteractionWarning>> {
        let payload = self.source.fetch(drug_a, drug_b).await?;
        let warnings = normalize_interactions(&payload);
        tracing::info!(drug_a, drug_b, count = warnings.len(), "interaction lookup finished");
        Ok(warnings)
    }

    /// 画面表示用: 失敗は1件の "Error" 警告になる
    pub async fn compare(&self, drug_a: &str, drug_b: &str) -> Vec<InteractionWarning> {
        match self.compare_detailed(drug_a, drug_b).await {
            Ok(warnings) => warnings,
            Err(e) => {
                tracing::warn!("interaction lookup failed for {} / {}: {}", drug_a, drug_b, e);
                vec![InteractionWarning::error(format!(
                    "Could not check interactions: {}",
                    e
                ))]
            }
        }
    }

    /// 保存済みレコード2件を比較（名前の先頭語を薬剤名として使う）
    pub async fn compare_records(
        &self,
        a: &MedicationRecord,
        b: &MedicationRecord,
    ) -> Vec<InteractionWarning> {
        self.compare(a.drug_token(), b.drug_token()).await
    }
}
