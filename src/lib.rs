//! pill-id: 錠剤写真の識別と服薬履歴
//!
//! 表・裏の写真 → 識別サービス → 候補抽出 → 確定 → 履歴保存、
//! および保存済み薬剤同士の相互作用チェック。

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod identify;
pub mod interactions;
pub mod logging;
pub mod pipeline;

pub use error::{PillIdError, Result};
pub use history::HistoryStore;
pub use pipeline::{CapturePipeline, PipelineState};
