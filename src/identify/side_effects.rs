//! 副作用検索
//!
//! 候補名の先頭語で有害事象APIを検索し、報告された反応語を集める。
//! 3候補分の検索は並行に投げ、全部が終わるまで待つ。
//! 失敗した候補には既定文言を入れるだけで、候補そのものは落とさない。

use crate::error::{PillIdError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use pill_id_common::{first_word, RecognitionResponse, SideEffects};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// HTTPステータスで失敗した場合
pub const COULD_NOT_FETCH: &str = "Could not fetch side effects";
/// 通信自体が失敗した場合
pub const ERROR_DURING_FETCH: &str = "Error during fetch";

const EVENT_LIMIT: u32 = 10;

#[async_trait]
pub trait SideEffectSource: Send + Sync {
    /// 薬剤名に対する反応語（重複なし、初出順）
    async fn reactions(&self, drug: &str) -> Result<Vec<String>>;
}

/// openFDA `drug/event` エンドポイント
pub struct OpenFdaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OpenFdaClient {
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

#[derive(Debug, Default, Deserialize)]
pub struct EventSearch {
    #[serde(default)]
    results: Vec<AdverseEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct AdverseEvent {
    #[serde(default)]
    patient: Option<Patient>,
}

#[derive(Debug, Default, Deserialize)]
struct Patient {
    #[serde(default)]
    reaction: Vec<Reaction>,
}

#[derive(Debug, Default, Deserialize)]
struct Reaction {
    #[serde(default)]
    reactionmeddrapt: Option<String>,
}

impl EventSearch {
    /// 反応語を初出順・重複なしで集める
    pub fn reaction_terms(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.results
            .iter()
            .filter_map(|event| event.patient.as_ref())
            .flat_map(|patient| patient.reaction.iter())
            .filter_map(|reaction| reaction.reactionmeddrapt.as_deref())
            .filter(|term| seen.insert(*term))
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl SideEffectSource for OpenFdaClient {
    async fn reactions(&self, drug: &str) -> Result<Vec<String>> {
        let url = format!("{}/drug/event.json", self.base_url);
        let search = format!("patient.drug.medicinalproduct:\"{}\"", drug);
        let limit = EVENT_LIMIT.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("search", search.as_str()), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PillIdError::ApiCall(format!("side effects for {}: HTTP {}", drug, status)));
        }

        let payload: EventSearch = response.json().await?;
        Ok(payload.reaction_terms())
    }
}

/// 有効な全候補の副作用を並行取得
///
/// 各検索は `lookup_timeout` で打ち切り、時間切れは通信失敗と同じ扱い。
pub async fn collect_side_effects<S: SideEffectSource + ?Sized>(
    source: &S,
    response: &RecognitionResponse,
    lookup_timeout: Duration,
) -> SideEffects {
    let lookups = response.present_choices().filter_map(|(slot, text)| {
        let drug = first_word(text)?.to_string();
        Some(async move {
            let result = tokio::time::timeout(lookup_timeout, source.reactions(&drug))
                .await
                .unwrap_or_else(|_| Err(PillIdError::Timeout(lookup_timeout.as_secs())));

            let terms = match result {
                Ok(terms) => terms,
                Err(PillIdError::ApiCall(msg)) => {
                    tracing::warn!("side effect lookup failed for {}: {}", slot, msg);
                    vec![COULD_NOT_FETCH.to_string()]
                }
                Err(e) => {
                    tracing::warn!("side effect lookup error for {} ({}): {}", slot, drug, e);
                    vec![ERROR_DURING_FETCH.to_string()]
                }
            };
            (slot, terms)
        })
    });

    join_all(lookups).await.into_iter().collect()
}
