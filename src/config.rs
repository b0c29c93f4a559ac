use crate::error::{PillIdError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const RECOGNITION_URL_ENV: &str = "PILL_ID_RECOGNITION_URL";
const INTERACTION_URL_ENV: &str = "PILL_ID_INTERACTION_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 識別サービス（`/analyze-both` を持つホスト）
    pub recognition_url: String,
    /// 副作用検索API
    pub side_effect_url: String,
    /// 相互作用API
    pub interaction_url: Option<String>,
    pub timeout_seconds: u64,
    /// 履歴の保存先（省略時はOS標準のデータディレクトリ）
    pub data_dir: Option<PathBuf>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default_config()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| PillIdError::Config("home directory not found".into()))?;
        Ok(home.join(".config").join("pill-id").join("config.json"))
    }

    fn default_config() -> Self {
        Self {
            recognition_url: "http://localhost:5001".into(),
            side_effect_url: "https://api.fda.gov".into(),
            interaction_url: None,
            timeout_seconds: 10,
            data_dir: None,
            user_name: None,
            user_email: None,
        }
    }

    // 環境変数を優先
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(RECOGNITION_URL_ENV) {
            if !url.trim().is_empty() {
                self.recognition_url = url;
            }
        }
        if let Ok(url) = std::env::var(INTERACTION_URL_ENV) {
            if !url.trim().is_empty() {
                self.interaction_url = Some(url);
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_dir()
            .ok_or_else(|| PillIdError::Config("data directory not found".into()))?;
        Ok(base.join("pill-id"))
    }

    pub fn interaction_url(&self) -> Result<&str> {
        self.interaction_url
            .as_deref()
            .ok_or(PillIdError::MissingEndpoint("interaction lookups"))
    }

    pub fn set_recognition_url(&mut self, url: String) -> Result<()> {
        self.recognition_url = url;
        self.save()
    }

    pub fn set_interaction_url(&mut self, url: String) -> Result<()> {
        self.interaction_url = Some(url);
        self.save()
    }
}
