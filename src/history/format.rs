//! 履歴データの保存形式
//!
//! ## 形式
//! - v1（旧）: レコードの素の配列。timestampはISO文字列かエポックミリ秒
//! - v2（現行）: `{"version": 2, "records": [...]}`、timestampはエポックミリ秒
//!
//! 読み込みは両方を受け付け、書き込みは常にv2。

use crate::error::{PillIdError, Result};
use pill_id_common::MedicationRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CURRENT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct HistoryBlob {
    version: u32,
    #[serde(default)]
    records: Vec<MedicationRecord>,
}

pub fn encode(records: &[MedicationRecord]) -> Result<String> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        version: u32,
        records: &'a [MedicationRecord],
    }

    Ok(serde_json::to_string(&Borrowed {
        version: CURRENT_VERSION,
        records,
    })?)
}

pub fn decode(raw: &str) -> Result<Vec<MedicationRecord>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| PillIdError::HistoryFormat(format!("invalid JSON: {}", e)))?;

    match value {
        Value::Array(_) => {
            tracing::debug!("migrating unversioned history blob");
            serde_json::from_value(value)
                .map_err(|e| PillIdError::HistoryFormat(format!("legacy records: {}", e)))
        }
        Value::Object(_) => {
            let blob: HistoryBlob = serde_json::from_value(value)
                .map_err(|e| PillIdError::HistoryFormat(e.to_string()))?;
            if blob.version > CURRENT_VERSION {
                return Err(PillIdError::HistoryFormat(format!(
                    "unsupported version {} (newest known is {})",
                    blob.version, CURRENT_VERSION
                )));
            }
            Ok(blob.records)
        }
        other => Err(PillIdError::HistoryFormat(format!(
            "expected array or object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
