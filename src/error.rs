use thiserror::Error;

#[derive(Error, Debug)]
pub enum PillIdError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("No endpoint configured for {0}. Set it with `pill-id config`")]
    MissingEndpoint(&'static str),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Camera permission denied for the {0} photo")]
    PermissionDenied(String),

    #[error("Sign in to identify pills")]
    NotAuthenticated,

    #[error("Cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("API call failed: {0}")]
    ApiCall(String),

    #[error("Failed to parse API response: {0}")]
    ApiParse(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unreadable history data: {0}")]
    HistoryFormat(String),

    #[error("JSON error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PillIdError {
    /// 画面側で再試行させてよい失敗か
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PillIdError::Config(_) | PillIdError::MissingEndpoint(_))
    }
}

impl From<reqwest::Error> for PillIdError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PillIdError::ApiParse(e.to_string())
        } else if let Some(status) = e.status() {
            PillIdError::ApiCall(format!("HTTP {}", status))
        } else {
            PillIdError::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PillIdError>;
