use crate::model::ConfigError;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    /// Optional chat that receives startup/status messages.
    #[serde(default)]
    pub telegram_admin_chat_id: Option<i64>,
    pub price_api_key: String,
    /// Keepa marketplace id (1 = amazon.com, 8 = amazon.it).
    #[serde(default = "default_domain")]
    pub price_api_domain: u8,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests_per_minute: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cooldown")]
    pub notification_cooldown_seconds: u64,
    #[serde(default = "default_retention_days")]
    pub price_history_retention_days: i64,
    #[serde(default = "default_stats_window")]
    pub stats_window_days: i64,
    #[serde(default = "default_max_items")]
    pub max_items_per_owner: usize,
    #[serde(default = "default_dialogue_timeout")]
    pub dialogue_timeout_seconds: u64,
}

fn default_domain() -> u8 {
    1
}

fn default_database_path() -> String {
    "data.db".to_string()
}

fn default_check_interval() -> u64 {
    300
}

fn default_max_requests() -> usize {
    20
}

fn default_batch_size() -> usize {
    20
}

fn default_cooldown() -> u64 {
    3600
}

fn default_retention_days() -> i64 {
    30
}

fn default_stats_window() -> i64 {
    90
}

fn default_max_items() -> usize {
    5
}

fn default_dialogue_timeout() -> u64 {
    300
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Credential or tunable problems here are the only fatal errors in
    /// the whole process; everything past startup logs and carries on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid("telegram_bot_token is empty".into()));
        }
        if self.price_api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("price_api_key is empty".into()));
        }
        if self.check_interval_seconds == 0 {
            return Err(ConfigError::Invalid("check_interval_seconds must be > 0".into()));
        }
        if self.max_requests_per_minute == 0 {
            return Err(ConfigError::Invalid("max_requests_per_minute must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.price_history_retention_days <= 0 {
            return Err(ConfigError::Invalid(
                "price_history_retention_days must be > 0".into(),
            ));
        }
        if self.stats_window_days <= 0 {
            return Err(ConfigError::Invalid("stats_window_days must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{"telegram_bot_token": "123:abc", "price_api_key": "k"}"#
    }

    #[test]
    fn defaults_fill_in_tunables() {
        let cfg: AppConfig = serde_json::from_str(minimal_json()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.check_interval_seconds, 300);
        assert_eq!(cfg.max_requests_per_minute, 20);
        assert_eq!(cfg.batch_size, 20);
        assert_eq!(cfg.notification_cooldown_seconds, 3600);
        assert_eq!(cfg.price_history_retention_days, 30);
        assert_eq!(cfg.max_items_per_owner, 5);
        assert!(cfg.telegram_admin_chat_id.is_none());
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"telegram_bot_token": " ", "price_api_key": "k"}"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"telegram_bot_token": "t", "price_api_key": "k", "check_interval_seconds": 0}"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }
}
