use pill_id_common::MedicationRecord;

/// 撮影する面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSide {
    Front,
    Back,
}

impl std::fmt::Display for PhotoSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhotoSide::Front => write!(f, "front"),
            PhotoSide::Back => write!(f, "back"),
        }
    }
}

/// エラー状態の理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFailure {
    /// 候補が1件も無い
    NoMatches,
    Recognition(String),
    Timeout,
    Persistence(String),
}

impl PipelineFailure {
    /// 利用者向けメッセージ
    pub fn message(&self) -> String {
        match self {
            PipelineFailure::NoMatches => "No drugs were found! Please try again.".to_string(),
            PipelineFailure::Recognition(e) => format!("Error analyzing photos: {}", e),
            PipelineFailure::Timeout => "Analysis is taking too long. Please try again.".to_string(),
            PipelineFailure::Persistence(e) => format!("Could not save to history: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    CapturingFront,
    CapturingBack,
    Submitting,
    AwaitingCandidates,
    Selecting,
    Confirming,
    Persisted,
    Error(PipelineFailure),
}

impl PipelineState {
    /// 識別リクエストが未完了
    pub fn is_in_flight(&self) -> bool {
        matches!(self, PipelineState::Submitting | PipelineState::AwaitingCandidates)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PipelineState::Error(_))
    }

    pub fn failure(&self) -> Option<&PipelineFailure> {
        match self {
            PipelineState::Error(f) => Some(f),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::CapturingFront => "capturing the front photo",
            PipelineState::CapturingBack => "capturing the back photo",
            PipelineState::Submitting => "submitting photos",
            PipelineState::AwaitingCandidates => "waiting for candidates",
            PipelineState::Selecting => "selecting a candidate",
            PipelineState::Confirming => "confirming a candidate",
            PipelineState::Persisted => "saved",
            PipelineState::Error(_) => "in an error state",
        };
        f.write_str(name)
    }
}

/// 識別リクエストの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// 候補あり（件数）
    Candidates(usize),
    /// 古いリクエストの応答なので無視した
    Stale,
    Failed(PipelineFailure),
}

/// 確定操作の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Saved(MedicationRecord),
    /// 同じ内容が既に履歴にある（追記しない）
    AlreadySaved,
    /// 確定処理中の再入
    Busy,
}

impl ConfirmOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ConfirmOutcome::Busy)
    }
}
