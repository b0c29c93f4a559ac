//! Pill ID Common Library
//!
//! CLIとライブラリ本体で共有される型とレスポンス解析

pub mod error;
pub mod parser;
pub mod types;

pub use error::{Error, Result};
pub use parser::{
    dedupe_candidates, extract_candidates, extract_candidates_with, first_word, ChoiceParser,
    PositionalGrammar,
};
pub use types::{
    is_present, parse_timestamp, CandidateMatch, ChoiceSlot, InteractionWarning,
    MedicationRecord, RecognitionResponse, RecordField, SideEffects, NOT_AVAILABLE, UNKNOWN,
};
