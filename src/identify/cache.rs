//! 解析結果の受け渡しスロット
//!
//! 識別ステップが書き込み、確定ステップが読む1枠だけのメモリ領域。
//! プロセス終了で消える。書き込みは常に上書き。

use pill_id_common::CandidateMatch;

#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    slot: Vec<CandidateMatch>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, candidates: Vec<CandidateMatch>) {
        tracing::debug!(count = candidates.len(), "result cache updated");
        self.slot = candidates;
    }

    /// 現在の内容のコピー（未設定なら空）
    pub fn get(&self) -> Vec<CandidateMatch> {
        self.slot.clone()
    }

    pub fn len(&self) -> usize {
        self.slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_empty()
    }
}
