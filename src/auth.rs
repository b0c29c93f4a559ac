//! 認証コラボレータ
//!
//! 識別フローは `is_authenticated()` だけを見る。
//! 履歴ストアと候補抽出は利用者情報に依存しない。

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
}

pub trait AuthProvider {
    fn is_authenticated(&self) -> bool;
    fn is_loading(&self) -> bool;
    fn user(&self) -> Option<&UserProfile>;
    fn login(&mut self);
    fn logout(&mut self);
}

/// 端末ローカルの利用者（CLI用）
#[derive(Debug, Clone)]
pub struct LocalAuth {
    profile: UserProfile,
    signed_in: bool,
}

impl LocalAuth {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            signed_in: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let name = config
            .user_name
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "local".to_string());
        let email = config.user_email.clone().unwrap_or_default();
        Self::new(UserProfile { name, email })
    }
}

impl AuthProvider for LocalAuth {
    fn is_authenticated(&self) -> bool {
        self.signed_in
    }

    fn is_loading(&self) -> bool {
        false
    }

    fn user(&self) -> Option<&UserProfile> {
        self.signed_in.then_some(&self.profile)
    }

    fn login(&mut self) {
        self.signed_in = true;
    }

    fn logout(&mut self) {
        self.signed_in = false;
    }
}
