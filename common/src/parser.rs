//! 識別レスポンスパーサー
//!
//! 識別サービスは各候補を1本の文字列で返す:
//! `"Ibuprofen Strength 200mg Imprint IBU200 Color Orange Shape Round View details"`
//!
//! 区切り語の順序と綴りが固定の位置文法として扱い、
//! 見つからない項目は "N/A" に落とす。
//! 上流が構造化JSONに変わった場合は `ChoiceParser` を差し替える。

use crate::types::{CandidateMatch, RecognitionResponse, SideEffects, NOT_AVAILABLE};
use regex::Regex;
use std::collections::HashSet;

/// 候補文字列 → 構造化候補
pub trait ChoiceParser {
    fn parse(&self, text: &str) -> CandidateMatch;
}

/// 既定の位置文法パーサー
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalGrammar;

impl ChoiceParser for PositionalGrammar {
    fn parse(&self, text: &str) -> CandidateMatch {
        lazy_static::lazy_static! {
            static ref STRENGTH_RE: Regex = Regex::new(r"Strength (.*?) Imprint").unwrap();
            static ref IMPRINT_RE: Regex = Regex::new(r"Imprint (.*?) Color").unwrap();
            static ref COLOR_RE: Regex = Regex::new(r"Color (.*?) Shape").unwrap();
            static ref SHAPE_RE: Regex = Regex::new(r"Shape (.*?) View details").unwrap();
        }

        let title = text.split("Strength").next().unwrap_or_default().trim();

        CandidateMatch {
            title: title.to_string(),
            strength: capture_or_na(&STRENGTH_RE, text),
            imprint: capture_or_na(&IMPRINT_RE, text),
            color: capture_or_na(&COLOR_RE, text),
            shape: capture_or_na(&SHAPE_RE, text),
            side_effects: Vec::new(),
        }
    }
}

fn capture_or_na(re: &Regex, text: &str) -> String {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

/// 既定パーサーで候補を抽出
///
/// # Arguments
/// * `response` - 識別サービスのレスポンス
/// * `side_effects` - スロットごとに取得済みの副作用
///
/// # Returns
/// 順位順・重複除去済みの候補。全スロットが欠損/"N/A"なら空
///
/// # Examples
/// ```
/// use pill_id_common::{extract_candidates, RecognitionResponse, SideEffects};
///
/// let response = RecognitionResponse::new(
///     Some("Ibuprofen Strength 200mg Imprint IBU200 Color Orange Shape Round View details"),
///     Some("N/A"),
///     None,
/// );
/// let candidates = extract_candidates(&response, &SideEffects::new());
/// assert_eq!(candidates.len(), 1);
/// assert_eq!(candidates[0].title, "Ibuprofen");
/// ```
pub fn extract_candidates(
    response: &RecognitionResponse,
    side_effects: &SideEffects,
) -> Vec<CandidateMatch> {
    extract_candidates_with(&PositionalGrammar, response, side_effects)
}

/// 任意のパーサーで候補を抽出
pub fn extract_candidates_with<P: ChoiceParser + ?Sized>(
    parser: &P,
    response: &RecognitionResponse,
    side_effects: &SideEffects,
) -> Vec<CandidateMatch> {
    let candidates = response
        .present_choices()
        .map(|(slot, text)| {
            let mut candidate = parser.parse(text);
            candidate.side_effects = side_effects.get(&slot).cloned().unwrap_or_default();
            candidate
        })
        .collect();

    dedupe_candidates(candidates)
}

/// 5項目が完全一致する候補を除去（先勝ち、順位順を保持）
pub fn dedupe_candidates(candidates: Vec<CandidateMatch>) -> Vec<CandidateMatch> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            let (t, s, i, co, sh) = c.identity();
            seen.insert((t.to_string(), s.to_string(), i.to_string(), co.to_string(), sh.to_string()))
        })
        .collect()
}

/// 副作用検索キー（候補文字列の先頭語）
pub fn first_word(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}
