//! 識別パイプラインテスト
//!
//! 偽の識別サービス・副作用APIで撮影から保存までを検証

use async_trait::async_trait;
use pill_id_common::{ChoiceSlot, RecognitionResponse};
use pill_id_rust::auth::{LocalAuth, UserProfile};
use pill_id_rust::error::{PillIdError, Result};
use pill_id_rust::history::HistoryStore;
use pill_id_rust::identify::side_effects::{COULD_NOT_FETCH, ERROR_DURING_FETCH};
use pill_id_rust::identify::{PhotoPair, Recognizer, SideEffectSource};
use pill_id_rust::pipeline::{
    CapturePipeline, ConfirmOutcome, PhotoSide, PipelineFailure, PipelineState, Submission,
    SubmissionOutcome,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;

const IBUPROFEN: &str =
    "Ibuprofen Strength 200mg Imprint IBU 200 Color Orange Shape Round View details";
const SERTRALINE: &str =
    "Sertraline Hydrochloride Strength 50mg Imprint ZOLOFT 50 Color Blue Shape Oval View details";

struct FixedRecognizer {
    response: RecognitionResponse,
    calls: AtomicUsize,
}

impl FixedRecognizer {
    fn new(first: Option<&str>, second: Option<&str>, third: Option<&str>) -> Self {
        Self {
            response: RecognitionResponse::new(first, second, third),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Recognizer for FixedRecognizer {
    async fn analyze_both(&self, _photos: &PhotoPair) -> Result<RecognitionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// 応答しない識別サービス
struct StuckRecognizer;

#[async_trait]
impl Recognizer for StuckRecognizer {
    async fn analyze_both(&self, _photos: &PhotoPair) -> Result<RecognitionResponse> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(RecognitionResponse::default())
    }
}

struct FailingRecognizer;

#[async_trait]
impl Recognizer for FailingRecognizer {
    async fn analyze_both(&self, _photos: &PhotoPair) -> Result<RecognitionResponse> {
        Err(PillIdError::ApiCall("HTTP 500 Internal Server Error".into()))
    }
}

struct FakeSideEffects;

#[async_trait]
impl SideEffectSource for FakeSideEffects {
    async fn reactions(&self, drug: &str) -> Result<Vec<String>> {
        match drug {
            "Ibuprofen" => Ok(vec!["NAUSEA".into(), "DYSPEPSIA".into()]),
            _ => Err(PillIdError::ApiCall("HTTP 404".into())),
        }
    }
}

/// 応答の遅い副作用API
struct SlowSideEffects;

#[async_trait]
impl SideEffectSource for SlowSideEffects {
    async fn reactions(&self, _drug: &str) -> Result<Vec<String>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec!["HEADACHE".into()])
    }
}

fn signed_in() -> LocalAuth {
    LocalAuth::new(UserProfile {
        name: "tester".into(),
        email: "tester@example.com".into(),
    })
}

fn capture_both(pipeline: &mut CapturePipeline) -> Submission {
    let auth = signed_in();
    pipeline.begin_capture(&auth, PhotoSide::Front).unwrap();
    pipeline.capture(PhotoSide::Front, b"front".to_vec()).unwrap();
    pipeline.begin_capture(&auth, PhotoSide::Back).unwrap();
    pipeline
        .capture(PhotoSide::Back, b"back".to_vec())
        .unwrap()
        .expect("2枚揃ったら送信される")
}

/// 撮影から保存まで
#[tokio::test]
async fn test_identify_select_confirm() {
    let dir = tempdir().expect("Failed to create temp dir");
    let recognizer = FixedRecognizer::new(Some(IBUPROFEN), Some(SERTRALINE), Some("N/A"));
    let mut pipeline = CapturePipeline::default();

    let submission = capture_both(&mut pipeline);
    let outcome = pipeline.identify(submission, &recognizer, &FakeSideEffects).await;
    assert_eq!(outcome, SubmissionOutcome::Candidates(2));
    assert_eq!(pipeline.state(), &PipelineState::Selecting);

    let candidates = pipeline.candidates();
    assert_eq!(candidates[0].title, "Ibuprofen");
    assert_eq!(candidates[0].side_effects, vec!["NAUSEA", "DYSPEPSIA"]);
    assert_eq!(candidates[1].title, "Sertraline Hydrochloride");
    assert_eq!(candidates[1].side_effects, vec![COULD_NOT_FETCH]);

    pipeline.select(1).unwrap();
    let mut store = HistoryStore::open(dir.path());
    let outcome = pipeline.confirm(&mut store).expect("保存失敗");
    match outcome {
        ConfirmOutcome::Saved(record) => {
            assert_eq!(record.name(), "Sertraline Hydrochloride");
            assert_eq!(record.dosage(), "50mg");
            assert_eq!(record.shape(), "Oval");
            assert_eq!(record.color(), "Blue");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(pipeline.state(), &PipelineState::Persisted);
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
}

/// 確定を2回押しても1件だけ
#[tokio::test]
async fn test_confirm_is_idempotent() {
    let recognizer = FixedRecognizer::new(Some(IBUPROFEN), None, None);
    let mut pipeline = CapturePipeline::default();
    let submission = capture_both(&mut pipeline);
    pipeline.identify(submission, &recognizer, &FakeSideEffects).await;
    pipeline.select(0).unwrap();

    let mut store = HistoryStore::in_memory();
    assert!(matches!(pipeline.confirm(&mut store).unwrap(), ConfirmOutcome::Saved(_)));
    assert_eq!(pipeline.confirm(&mut store).unwrap(), ConfirmOutcome::AlreadySaved);
    assert_eq!(store.len(), 1);
}

/// 有効な候補が無ければエラー状態、やり直しは表面から
#[tokio::test]
async fn test_no_candidates_is_error() {
    let recognizer = FixedRecognizer::new(Some("N/A"), Some("N/A"), None);
    let mut pipeline = CapturePipeline::default();
    let submission = capture_both(&mut pipeline);

    let outcome = pipeline.identify(submission, &recognizer, &FakeSideEffects).await;
    assert_eq!(outcome, SubmissionOutcome::Failed(PipelineFailure::NoMatches));
    assert_eq!(pipeline.state(), &PipelineState::Error(PipelineFailure::NoMatches));
    assert!(pipeline.candidates().is_empty());

    pipeline.restart();
    assert_eq!(pipeline.state(), &PipelineState::CapturingFront);
}

/// 識別サービスの失敗
#[tokio::test]
async fn test_recognition_failure() {
    let mut pipeline = CapturePipeline::default();
    let submission = capture_both(&mut pipeline);

    let outcome = pipeline.identify(submission, &FailingRecognizer, &FakeSideEffects).await;
    match outcome {
        SubmissionOutcome::Failed(PipelineFailure::Recognition(msg)) => assert!(msg.contains("500")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(pipeline.state().is_error());
}

/// 応答が来なくてもタイムアウトで復帰できる
#[tokio::test]
async fn test_stuck_request_times_out() {
    let mut pipeline = CapturePipeline::new(Duration::from_millis(50));
    let submission = capture_both(&mut pipeline);

    let outcome = pipeline.identify(submission, &StuckRecognizer, &FakeSideEffects).await;
    assert_eq!(outcome, SubmissionOutcome::Failed(PipelineFailure::Timeout));
    assert_eq!(pipeline.state(), &PipelineState::Error(PipelineFailure::Timeout));

    pipeline.restart();
    assert_eq!(pipeline.state(), &PipelineState::CapturingFront);
}

/// 副作用検索が遅くても候補は残り、既定文言が付く
#[tokio::test]
async fn test_slow_side_effects_keep_candidates() {
    let recognizer = FixedRecognizer::new(Some(IBUPROFEN), Some(SERTRALINE), None);
    let mut pipeline = CapturePipeline::new(Duration::from_millis(200));
    let submission = capture_both(&mut pipeline);

    let outcome = pipeline.identify(submission, &recognizer, &SlowSideEffects).await;
    assert_eq!(outcome, SubmissionOutcome::Candidates(2));
    assert_eq!(pipeline.state(), &PipelineState::Selecting);

    let candidates = pipeline.candidates();
    assert_eq!(candidates[0].title, "Ibuprofen");
    assert!(candidates
        .iter()
        .all(|c| c.side_effects == vec![ERROR_DURING_FETCH.to_string()]));
}

/// 取り消し後に届いた応答は無視し、キャッシュは前回のまま
#[tokio::test]
async fn test_cancel_keeps_previous_candidates() {
    let recognizer = FixedRecognizer::new(Some(IBUPROFEN), None, None);
    let mut pipeline = CapturePipeline::default();
    let submission = capture_both(&mut pipeline);
    pipeline.identify(submission, &recognizer, &FakeSideEffects).await;
    assert_eq!(pipeline.candidates().len(), 1);

    // 新しい撮影を始めて送信中に画面を離れる
    let second = capture_both(&mut pipeline);
    pipeline.cancel();
    assert_eq!(pipeline.state(), &PipelineState::Idle);

    let late = RecognitionResponse::new(Some(SERTRALINE), None, None);
    let outcome = pipeline.complete_submission(second.token, Ok(late), &Default::default());
    assert_eq!(outcome, SubmissionOutcome::Stale);
    assert_eq!(pipeline.candidates()[0].title, "Ibuprofen");
}

/// 送信中は写真を渡し直しても送信しない
#[tokio::test]
async fn test_no_double_submission() {
    let mut pipeline = CapturePipeline::default();
    let submission = capture_both(&mut pipeline);
    pipeline.request_sent(submission.token);
    assert_eq!(pipeline.state(), &PipelineState::AwaitingCandidates);

    assert!(pipeline.capture(PhotoSide::Back, b"again".to_vec()).unwrap().is_none());
    assert_eq!(pipeline.state(), &PipelineState::AwaitingCandidates);

    let response = RecognitionResponse::new(Some(IBUPROFEN), None, None);
    let mut effects = pill_id_common::SideEffects::new();
    effects.insert(ChoiceSlot::First, vec!["RASH".into()]);
    let outcome = pipeline.complete_submission(submission.token, Ok(response), &effects);
    assert_eq!(outcome, SubmissionOutcome::Candidates(1));
    assert_eq!(pipeline.candidates()[0].side_effects, vec!["RASH"]);
}

/// 未ログインでは撮影できない
#[test]
fn test_capture_requires_sign_in() {
    use pill_id_rust::auth::AuthProvider;

    let mut auth = signed_in();
    auth.logout();
    let mut pipeline = CapturePipeline::default();
    let err = pipeline.begin_capture(&auth, PhotoSide::Front).unwrap_err();
    assert!(matches!(err, PillIdError::NotAuthenticated));
}

/// 保存に失敗したらエラー状態
#[tokio::test]
async fn test_persistence_failure() {
    let dir = tempdir().expect("Failed to create temp dir");
    // データディレクトリの場所にファイルを置いて書き込みを失敗させる
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "not a directory").unwrap();

    let recognizer = FixedRecognizer::new(Some(IBUPROFEN), None, None);
    let mut pipeline = CapturePipeline::default();
    let submission = capture_both(&mut pipeline);
    pipeline.identify(submission, &recognizer, &FakeSideEffects).await;
    pipeline.select(0).unwrap();

    let mut store = HistoryStore::open(&blocker);
    assert!(pipeline.confirm(&mut store).is_err());
    assert!(matches!(
        pipeline.state(),
        PipelineState::Error(PipelineFailure::Persistence(_))
    ));
    assert!(!pipeline.is_busy());
}
