//! 錠剤識別の型定義
//!
//! CLIとライブラリで共有される型:
//! - RecognitionResponse: 識別サービスの生レスポンス（3候補）
//! - CandidateMatch: 候補文字列を構造化したもの（一時データ）
//! - MedicationRecord: 確定して履歴に保存されるレコード
//! - InteractionWarning: 相互作用チェックの結果

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 値が取れなかったフィールドの既定値
pub const NOT_AVAILABLE: &str = "N/A";

/// 形状・色が空のまま保存される場合の既定値
pub const UNKNOWN: &str = "unknown";

/// 候補の順位スロット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChoiceSlot {
    First,
    Second,
    Third,
}

impl ChoiceSlot {
    pub const ALL: [ChoiceSlot; 3] = [ChoiceSlot::First, ChoiceSlot::Second, ChoiceSlot::Third];

    /// レスポンスJSON上のキー
    pub fn key(&self) -> &'static str {
        match self {
            ChoiceSlot::First => "1st choice",
            ChoiceSlot::Second => "2nd choice",
            ChoiceSlot::Third => "3rd choice",
        }
    }
}

impl std::fmt::Display for ChoiceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// 識別サービス `/analyze-both` のレスポンス
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecognitionResponse {
    #[serde(rename = "1st choice", default)]
    pub first: Option<String>,

    #[serde(rename = "2nd choice", default)]
    pub second: Option<String>,

    #[serde(rename = "3rd choice", default)]
    pub third: Option<String>,
}

impl RecognitionResponse {
    pub fn new(first: Option<&str>, second: Option<&str>, third: Option<&str>) -> Self {
        Self {
            first: first.map(str::to_string),
            second: second.map(str::to_string),
            third: third.map(str::to_string),
        }
    }

    pub fn choice(&self, slot: ChoiceSlot) -> Option<&str> {
        match slot {
            ChoiceSlot::First => self.first.as_deref(),
            ChoiceSlot::Second => self.second.as_deref(),
            ChoiceSlot::Third => self.third.as_deref(),
        }
    }

    /// 順位順にスロットと本文を返す
    pub fn slots(&self) -> impl Iterator<Item = (ChoiceSlot, Option<&str>)> + '_ {
        ChoiceSlot::ALL.into_iter().map(move |slot| (slot, self.choice(slot)))
    }

    /// 欠損・"N/A" を除いた有効な候補
    pub fn present_choices(&self) -> impl Iterator<Item = (ChoiceSlot, &str)> + '_ {
        self.slots().filter_map(|(slot, text)| match text {
            Some(t) if is_present(t) => Some((slot, t)),
            _ => None,
        })
    }
}

/// 空文字でも "N/A" でもない
pub fn is_present(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed != NOT_AVAILABLE
}

/// スロットごとの副作用リスト
pub type SideEffects = HashMap<ChoiceSlot, Vec<String>>;

/// 候補（解析ごとに生成され、確定画面で1度だけ読まれる）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMatch {
    pub title: String,
    pub strength: String,
    pub imprint: String,
    pub color: String,
    pub shape: String,
    #[serde(default)]
    pub side_effects: Vec<String>,
}

impl Default for CandidateMatch {
    fn default() -> Self {
        Self {
            title: String::new(),
            strength: NOT_AVAILABLE.into(),
            imprint: NOT_AVAILABLE.into(),
            color: NOT_AVAILABLE.into(),
            shape: NOT_AVAILABLE.into(),
            side_effects: Vec::new(),
        }
    }
}

impl CandidateMatch {
    /// 重複判定に使う5項目（大文字小文字を区別）
    pub fn identity(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.title,
            &self.strength,
            &self.imprint,
            &self.color,
            &self.shape,
        )
    }

    /// 履歴レコードへの変換: (name, shape, color, dosage)
    pub fn to_record_fields(&self) -> (String, String, String, String) {
        (
            self.title.clone(),
            or_unknown(&self.shape),
            or_unknown(&self.color),
            self.strength.clone(),
        )
    }
}

fn or_unknown(value: &str) -> String {
    if value.trim().is_empty() {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

/// 確定済みの服薬レコード
///
/// 生成後は変更しない。`timestamp` はエポックミリ秒で、
/// 旧形式（ISO-8601文字列）も読み込み時に変換する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRecord {
    name: String,
    #[serde(default = "unknown_field")]
    shape: String,
    #[serde(default = "unknown_field")]
    color: String,
    #[serde(default = "not_available_field")]
    dosage: String,
    #[serde(with = "timestamp_millis")]
    timestamp: i64,
}

fn unknown_field() -> String {
    UNKNOWN.to_string()
}

fn not_available_field() -> String {
    NOT_AVAILABLE.to_string()
}

impl MedicationRecord {
    pub fn new(
        name: impl Into<String>,
        shape: impl Into<String>,
        color: impl Into<String>,
        dosage: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
            color: color.into(),
            dosage: dosage.into(),
            timestamp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &str {
        &self.shape
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn dosage(&self) -> &str {
        &self.dosage
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn field(&self, field: RecordField) -> &str {
        match field {
            RecordField::Name => &self.name,
            RecordField::Shape => &self.shape,
            RecordField::Color => &self.color,
            RecordField::Dosage => &self.dosage,
        }
    }

    /// 4項目が完全一致するか
    pub fn same_fields(&self, name: &str, shape: &str, color: &str, dosage: &str) -> bool {
        self.name == name && self.shape == shape && self.color == color && self.dosage == dosage
    }

    /// 大文字小文字を無視して4項目のいずれかに部分一致するか
    pub fn matches(&self, term: &str) -> bool {
        let lower = term.to_lowercase();
        RecordField::ALL
            .iter()
            .any(|&f| self.field(f).to_lowercase().contains(&lower))
    }

    /// 相互作用APIに渡す薬剤名（名前の先頭語）
    pub fn drug_token(&self) -> &str {
        crate::parser::first_word(&self.name).unwrap_or(&self.name)
    }
}

/// 検索対象フィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Name,
    Shape,
    Color,
    Dosage,
}

impl RecordField {
    pub const ALL: [RecordField; 4] = [
        RecordField::Name,
        RecordField::Shape,
        RecordField::Color,
        RecordField::Dosage,
    ];
}

impl std::str::FromStr for RecordField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(RecordField::Name),
            "shape" => Ok(RecordField::Shape),
            "color" | "colour" => Ok(RecordField::Color),
            "dosage" | "strength" => Ok(RecordField::Dosage),
            _ => Err(format!("Unknown field: {}. Use name, shape, color, or dosage", s)),
        }
    }
}

/// 相互作用の警告
///
/// 欠けたフィールドはデシリアライズ時に既定文言で埋める。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionWarning {
    #[serde(default = "default_warning_title")]
    pub title: String,

    #[serde(default = "default_applies_to", alias = "appliesTo")]
    pub applies_to: String,

    #[serde(default = "default_description")]
    pub description: String,
}

pub const ERROR_WARNING_TITLE: &str = "Error";

fn default_warning_title() -> String {
    "Unknown interaction".to_string()
}

fn default_applies_to() -> String {
    "Unspecified".to_string()
}

fn default_description() -> String {
    "No description available".to_string()
}

impl Default for InteractionWarning {
    fn default() -> Self {
        Self {
            title: default_warning_title(),
            applies_to: default_applies_to(),
            description: default_description(),
        }
    }
}

impl InteractionWarning {
    /// 通信失敗を表す合成警告
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: ERROR_WARNING_TITLE.to_string(),
            applies_to: default_applies_to(),
            description: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.title == ERROR_WARNING_TITLE
    }
}

/// タイムスタンプの読み書き
///
/// 書き込みは常に整数（エポックミリ秒）。
/// 読み込みは整数・数字文字列・RFC 3339文字列を受け付ける。
mod timestamp_millis {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Float(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Millis(ms) => Ok(ms),
            RawTimestamp::Float(ms) => Ok(ms as i64),
            RawTimestamp::Text(text) => super::parse_timestamp(&text).map_err(de::Error::custom),
        }
    }
}

/// 文字列のタイムスタンプをエポックミリ秒に変換
pub fn parse_timestamp(text: &str) -> crate::Result<i64> {
    let trimmed = text.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Ok(ms);
    }
    chrono::DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| crate::Error::Parse(format!("invalid timestamp {:?}: {}", trimmed, e)))
}
