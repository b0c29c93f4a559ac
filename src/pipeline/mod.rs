//! 撮影 → 識別 → 確定 パイプライン
//!
//! ## 状態遷移
//! Idle → CapturingFront/CapturingBack → Submitting → AwaitingCandidates
//!      → Selecting → Confirming → Persisted
//! Submitting / AwaitingCandidates / Confirming からは Error に落ちうる。
//! Error からの復帰は `restart`（表面の撮影からやり直し）のみ。
//!
//! 2枚揃った時点で1回だけ送信する。応答はリクエストごとのトークンで照合し、
//! 取り消し済み・置き換え済みのリクエストの応答は捨てる。

mod state;

pub use state::{ConfirmOutcome, PhotoSide, PipelineFailure, PipelineState, SubmissionOutcome};

use crate::auth::AuthProvider;
use crate::error::{PillIdError, Result};
use crate::history::{HistoryStore, KeyValueStore};
use crate::identify::{collect_side_effects, PhotoPair, Recognizer, ResultCache, SideEffectSource};
use pill_id_common::{extract_candidates, CandidateMatch, RecognitionResponse, SideEffects};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// 送信1回分
#[derive(Debug, Clone)]
pub struct Submission {
    pub token: u64,
    pub photos: PhotoPair,
}

pub struct CapturePipeline {
    state: PipelineState,
    front: Option<Vec<u8>>,
    back: Option<Vec<u8>>,
    cache: ResultCache,
    next_token: u64,
    in_flight: Option<u64>,
    selected: Option<usize>,
    busy: bool,
    timeout: Duration,
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CapturePipeline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: PipelineState::Idle,
            front: None,
            back: None,
            cache: ResultCache::new(),
            next_token: 0,
            in_flight: None,
            selected: None,
            busy: false,
            timeout,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn has_photo(&self, side: PhotoSide) -> bool {
        match side {
            PhotoSide::Front => self.front.is_some(),
            PhotoSide::Back => self.back.is_some(),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// 撮影開始（要ログイン）
    pub fn begin_capture(&mut self, auth: &dyn AuthProvider, side: PhotoSide) -> Result<()> {
        if !auth.is_authenticated() {
            return Err(PillIdError::NotAuthenticated);
        }

        match self.state {
            PipelineState::Idle | PipelineState::CapturingFront | PipelineState::CapturingBack => {}
            // 前回の実行が終わっているので写真を捨てて新しい実行にする
            PipelineState::Selecting | PipelineState::Persisted => {
                self.front = None;
                self.back = None;
                self.selected = None;
            }
            _ => return Err(self.invalid("start a capture")),
        }

        self.state = capturing(side);
        tracing::debug!(%side, "capture started");
        Ok(())
    }

    /// カメラ権限が拒否された: 撮影前の状態に戻してエラーを返す
    pub fn permission_denied(&mut self, side: PhotoSide) -> PillIdError {
        if matches!(
            self.state,
            PipelineState::CapturingFront | PipelineState::CapturingBack
        ) {
            self.state = PipelineState::Idle;
        }
        tracing::warn!(%side, "camera permission denied");
        PillIdError::PermissionDenied(side.to_string())
    }

    /// 撮影済み写真を受け取る
    ///
    /// 2枚揃ったら送信状態に進み `Submission` を返す。
    /// 送信中に再度渡された場合は `None`（二重送信しない）。
    pub fn capture(&mut self, side: PhotoSide, photo: Vec<u8>) -> Result<Option<Submission>> {
        match self.state {
            PipelineState::Idle | PipelineState::CapturingFront | PipelineState::CapturingBack => {}
            ref s if s.is_in_flight() => {
                tracing::debug!(%side, "photo ignored while a submission is in flight");
                return Ok(None);
            }
            _ => return Err(self.invalid("accept a photo")),
        }

        match side {
            PhotoSide::Front => self.front = Some(photo),
            PhotoSide::Back => self.back = Some(photo),
        }

        match (&self.front, &self.back) {
            (Some(front), Some(back)) => {
                self.next_token += 1;
                let token = self.next_token;
                let photos = PhotoPair::new(front.clone(), back.clone());
                self.in_flight = Some(token);
                self.state = PipelineState::Submitting;
                tracing::info!(token, "both photos captured, submitting");
                Ok(Some(Submission { token, photos }))
            }
            (Some(_), None) => {
                self.state = PipelineState::CapturingBack;
                Ok(None)
            }
            _ => {
                self.state = PipelineState::CapturingFront;
                Ok(None)
            }
        }
    }

    /// リクエストを送り出した
    pub fn request_sent(&mut self, token: u64) {
        if self.in_flight == Some(token) && self.state == PipelineState::Submitting {
            self.state = PipelineState::AwaitingCandidates;
        }
    }

    /// 識別結果を反映する
    ///
    /// 現在のトークン以外の応答は無視する。
    pub fn complete_submission(
        &mut self,
        token: u64,
        response: Result<RecognitionResponse>,
        side_effects: &SideEffects,
    ) -> SubmissionOutcome {
        if self.in_flight != Some(token) {
            tracing::debug!(token, "ignoring stale recognition response");
            return SubmissionOutcome::Stale;
        }
        self.in_flight = None;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let failure = match e {
                    PillIdError::Timeout(_) => PipelineFailure::Timeout,
                    other => PipelineFailure::Recognition(other.to_string()),
                };
                tracing::warn!("recognition failed: {}", failure.message());
                return self.fail(failure);
            }
        };

        let candidates = extract_candidates(&response, side_effects);
        if candidates.is_empty() {
            tracing::info!(token, "recognition returned no usable candidates");
            return self.fail(PipelineFailure::NoMatches);
        }

        let count = candidates.len();
        self.cache.set(candidates);
        self.selected = None;
        self.state = PipelineState::Selecting;
        SubmissionOutcome::Candidates(count)
    }

    /// 送信から候補表示までを一括で行う（識別にタイムアウト付き）
    pub async fn identify<R, S>(
        &mut self,
        submission: Submission,
        recognizer: &R,
        side_effect_source: &S,
    ) -> SubmissionOutcome
    where
        R: Recognizer + ?Sized,
        S: SideEffectSource + ?Sized,
    {
        let Submission { token, photos } = submission;
        self.request_sent(token);

        // 時間制限は識別のみ。副作用検索は1件ずつ打ち切られ、候補は落ちない
        let response = tokio::time::timeout(self.timeout, recognizer.analyze_both(&photos))
            .await
            .unwrap_or_else(|_| Err(PillIdError::Timeout(self.timeout.as_secs())));

        match response {
            Ok(response) => {
                let effects = collect_side_effects(side_effect_source, &response, self.timeout).await;
                self.complete_submission(token, Ok(response), &effects)
            }
            Err(e) => self.complete_submission(token, Err(e), &SideEffects::new()),
        }
    }

    /// 画面を離れた: 送信中のリクエストを無効化する
    ///
    /// 結果キャッシュは触らない。
    pub fn cancel(&mut self) {
        if let Some(token) = self.in_flight.take() {
            tracing::debug!(token, "in-flight submission cancelled");
        }
        if self.state.is_in_flight() {
            self.state = PipelineState::Idle;
        }
    }

    /// 確定画面に渡す候補
    pub fn candidates(&self) -> Vec<CandidateMatch> {
        self.cache.get()
    }

    /// 候補を1件だけ選ぶ
    pub fn select(&mut self, index: usize) -> Result<CandidateMatch> {
        if !matches!(self.state, PipelineState::Selecting | PipelineState::Confirming) {
            return Err(self.invalid("select a candidate"));
        }

        let candidates = self.cache.get();
        let candidate = candidates.get(index).cloned().ok_or_else(|| {
            PillIdError::InvalidSelection(format!(
                "candidate {} does not exist ({} available)",
                index + 1,
                candidates.len()
            ))
        })?;

        self.selected = Some(index);
        self.state = PipelineState::Confirming;
        Ok(candidate)
    }

    pub fn selected(&self) -> Option<CandidateMatch> {
        self.selected.and_then(|i| self.cache.get().get(i).cloned())
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// 確定処理の開始（処理中なら `None`）
    pub fn begin_confirm(&mut self) -> Result<Option<CandidateMatch>> {
        if self.busy {
            return Ok(None);
        }
        if !matches!(self.state, PipelineState::Confirming | PipelineState::Persisted) {
            return Err(self.invalid("confirm"));
        }

        let candidate = self
            .selected()
            .ok_or_else(|| PillIdError::InvalidSelection("no candidate selected".into()))?;
        self.busy = true;
        Ok(Some(candidate))
    }

    /// 選択中の候補を履歴に保存する
    ///
    /// 同じ内容のレコードがあれば追記せず成功扱い。
    pub fn finish_confirm<K: KeyValueStore>(
        &mut self,
        candidate: &CandidateMatch,
        store: &mut HistoryStore<K>,
    ) -> Result<ConfirmOutcome> {
        let result = save_candidate(candidate, store);
        self.busy = false;

        match result {
            Ok(outcome) => {
                self.state = PipelineState::Persisted;
                Ok(outcome)
            }
            Err(e) => {
                self.state = PipelineState::Error(PipelineFailure::Persistence(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn confirm<K: KeyValueStore>(&mut self, store: &mut HistoryStore<K>) -> Result<ConfirmOutcome> {
        match self.begin_confirm()? {
            Some(candidate) => self.finish_confirm(&candidate, store),
            None => Ok(ConfirmOutcome::Busy),
        }
    }

    /// 表面の撮影からやり直す（送信中の応答・写真は破棄）
    pub fn restart(&mut self) {
        self.front = None;
        self.back = None;
        self.in_flight = None;
        self.selected = None;
        self.busy = false;
        self.state = PipelineState::CapturingFront;
        tracing::debug!("pipeline restarted");
    }

    fn fail(&mut self, failure: PipelineFailure) -> SubmissionOutcome {
        self.state = PipelineState::Error(failure.clone());
        SubmissionOutcome::Failed(failure)
    }

    fn invalid(&self, action: &'static str) -> PillIdError {
        PillIdError::InvalidState {
            action,
            state: self.state.to_string(),
        }
    }
}

fn capturing(side: PhotoSide) -> PipelineState {
    match side {
        PhotoSide::Front => PipelineState::CapturingFront,
        PhotoSide::Back => PipelineState::CapturingBack,
    }
}

fn save_candidate<K: KeyValueStore>(
    candidate: &CandidateMatch,
    store: &mut HistoryStore<K>,
) -> Result<ConfirmOutcome> {
    store.load()?;

    let (name, shape, color, dosage) = candidate.to_record_fields();
    if store.contains(&name, &shape, &color, &dosage) {
        tracing::info!(name = %name, "candidate already in history, skipping append");
        return Ok(ConfirmOutcome::AlreadySaved);
    }

    let record = store.add_pill(&name, &shape, &color, &dosage)?;
    Ok(ConfirmOutcome::Saved(record))
}
