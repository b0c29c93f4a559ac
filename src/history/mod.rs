//! 服薬履歴ストア
//!
//! 確定した錠剤を追記していくだけのログ（全消去のみ可能）。
//! `add_pill` は書き込み完了後にだけメモリへ反映する（ライトスルー）。

pub mod format;
pub mod storage;

pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};

use crate::error::{PillIdError, Result};
use pill_id_common::{MedicationRecord, RecordField};
use std::path::PathBuf;

pub const STORAGE_KEY: &str = "pill_history";

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct HistoryStore<S: KeyValueStore> {
    storage: S,
    records: Vec<MedicationRecord>,
    clock: fn() -> i64,
}

impl HistoryStore<FileKeyValueStore> {
    /// データディレクトリ上のストアを開く（読み込みは `load` で行う）
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileKeyValueStore::new(dir))
    }
}

impl HistoryStore<MemoryKeyValueStore> {
    pub fn in_memory() -> Self {
        Self::new(MemoryKeyValueStore::new())
    }
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_clock(storage, now_millis)
    }

    pub fn with_clock(storage: S, clock: fn() -> i64) -> Self {
        Self {
            storage,
            records: Vec::new(),
            clock,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// 永続化済みの履歴でメモリを置き換える
    ///
    /// 未保存なら空で成功。読み込み・解析に失敗した場合も
    /// メモリは空にした上でエラーを返す（呼び出し側で継続可能）。
    pub fn load(&mut self) -> Result<()> {
        let loaded = self
            .storage
            .get(STORAGE_KEY)
            .and_then(|raw| raw.map(|r| format::decode(&r)).transpose());

        match loaded {
            Ok(records) => {
                self.records = records.unwrap_or_default();
                tracing::debug!(count = self.records.len(), "history loaded");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("history load failed, continuing with empty history: {}", e);
                self.records.clear();
                Err(e)
            }
        }
    }

    /// 全件（追加順）のコピー
    pub fn get_all(&self) -> Vec<MedicationRecord> {
        self.records.clone()
    }

    /// 名前・形状・色・用量のいずれかに部分一致（大文字小文字無視）
    pub fn search(&self, term: &str) -> Vec<MedicationRecord> {
        self.records
            .iter()
            .filter(|r| r.matches(term))
            .cloned()
            .collect()
    }

    /// 指定フィールドだけで部分一致
    pub fn filter_by(&self, field: RecordField, value: &str) -> Vec<MedicationRecord> {
        let lower = value.to_lowercase();
        self.records
            .iter()
            .filter(|r| r.field(field).to_lowercase().contains(&lower))
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str, shape: &str, color: &str, dosage: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.same_fields(name, shape, color, dosage))
    }

    /// 比較用に異なる2件を取り出す（番号は1始まり）
    pub fn pick_pair(&self, first: usize, second: usize) -> Result<(MedicationRecord, MedicationRecord)> {
        if first == second {
            return Err(PillIdError::InvalidSelection(format!(
                "pick two different pills (got #{} twice)",
                first
            )));
        }
        Ok((self.record_at(first)?, self.record_at(second)?))
    }

    fn record_at(&self, number: usize) -> Result<MedicationRecord> {
        number
            .checked_sub(1)
            .and_then(|i| self.records.get(i))
            .cloned()
            .ok_or_else(|| {
                PillIdError::InvalidSelection(format!(
                    "no saved pill #{} (history has {})",
                    number,
                    self.records.len()
                ))
            })
    }

    /// レコードを追加して保存する
    ///
    /// 保存に失敗した場合はメモリも元に戻し、エラーを返す。
    pub fn add_pill(
        &mut self,
        name: &str,
        shape: &str,
        color: &str,
        dosage: &str,
    ) -> Result<MedicationRecord> {
        let record = MedicationRecord::new(name, shape, color, dosage, (self.clock)());
        self.records.push(record.clone());

        if let Err(e) = self.persist() {
            self.records.pop();
            tracing::warn!("failed to save {}: {}", name, e);
            return Err(e);
        }

        tracing::info!(name, count = self.records.len(), "pill added to history");
        Ok(record)
    }

    /// 全消去（保存データはキーごと削除）
    pub fn clear(&mut self) -> Result<()> {
        self.storage.remove(STORAGE_KEY)?;
        self.records.clear();
        tracing::info!("history cleared");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&mut self) -> Result<()> {
        let blob = format::encode(&self.records)?;
        self.storage.set(STORAGE_KEY, &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_clock() -> i64 {
        1_700_000_000_000
    }

    fn seeded() -> HistoryStore<MemoryKeyValueStore> {
        let mut store = HistoryStore::with_clock(MemoryKeyValueStore::new(), fixed_clock);
        store.add_pill("Ibuprofen", "Round", "Orange", "200mg").unwrap();
        store.add_pill("Zoloft", "Capsule", "Green", "50mg").unwrap();
        store.add_pill("Adderall", "Oval", "Blue", "20mg").unwrap();
        store
    }

    #[test]
    fn test_add_pill_sets_timestamp() {
        let mut store = HistoryStore::with_clock(MemoryKeyValueStore::new(), fixed_clock);
        let record = store.add_pill("Ibuprofen", "Round", "Orange", "200mg").unwrap();
        assert_eq!(record.timestamp(), 1_700_000_000_000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_all_returns_copy() {
        let store = seeded();
        let mut copy = store.get_all();
        copy.clear();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_search_any_field() {
        let store = seeded();
        let names = |v: Vec<MedicationRecord>| v.iter().map(|r| r.name().to_string()).collect::<Vec<_>>();

        assert_eq!(names(store.search("zol")), vec!["Zoloft"]);
        assert_eq!(names(store.search("OVAL")), vec!["Adderall"]);
        assert_eq!(names(store.search("0mg")), vec!["Ibuprofen", "Zoloft", "Adderall"]);
        assert_eq!(store.search("").len(), 3);
        assert!(store.search("purple").is_empty());
    }

    #[test]
    fn test_filter_by_field() {
        let store = seeded();
        let hits = store.filter_by(RecordField::Color, "green");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name(), "Zoloft");
        // "ou" は名前には無く、形状 "Round" にだけある
        assert!(store.filter_by(RecordField::Name, "ou").is_empty());
        assert_eq!(store.filter_by(RecordField::Shape, "ou").len(), 1);
    }

    #[test]
    fn test_load_without_data_is_empty() {
        let mut store = HistoryStore::in_memory();
        store.load().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_data_degrades_to_empty() {
        let mut store = seeded();
        store.storage_mut().set(STORAGE_KEY, "{ broken").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, PillIdError::HistoryFormat(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_removes_key() {
        let mut store = seeded();
        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(!store.storage().contains_key(STORAGE_KEY));
        store.load().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_contains_exact_fields() {
        let store = seeded();
        assert!(store.contains("Zoloft", "Capsule", "Green", "50mg"));
        assert!(!store.contains("zoloft", "Capsule", "Green", "50mg"));
        assert!(!store.contains("Zoloft", "Capsule", "Green", "100mg"));
    }

    #[test]
    fn test_pick_pair_requires_two_different_records() {
        let store = seeded();
        let (a, b) = store.pick_pair(1, 3).unwrap();
        assert_eq!(a.name(), "Ibuprofen");
        assert_eq!(b.name(), "Adderall");

        assert!(matches!(store.pick_pair(2, 2), Err(PillIdError::InvalidSelection(_))));
        assert!(matches!(store.pick_pair(0, 1), Err(PillIdError::InvalidSelection(_))));
        assert!(matches!(store.pick_pair(1, 4), Err(PillIdError::InvalidSelection(_))));
    }
}
